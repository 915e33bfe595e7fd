// Copyright 2025-2026 CEMAXECUTER LLC

//! `libsdrplay_api` (3.x) binding.
//!
//! Struct layouts follow `sdrplay_api_dev.h`, `sdrplay_api_tuner.h`,
//! `sdrplay_api_control.h` and `sdrplay_api_rx_channel.h`. Only the leading
//! members that this crate touches are declared; every struct is reached
//! through a pointer owned by the service, so trailing members can be
//! omitted.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_double, c_float, c_int, c_uchar, c_uint, c_ushort, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{
    AgcControl, ApiError, ApiResult, Bandwidth, DeviceParams, IfType, SdrApi, UpdateReason,
};
use crate::dispatch::{event_callback, stream_callback, CallbackDispatcher};
use crate::ffi::SdrplayCallbackFns;
use crate::types::{DeviceHandle, DeviceInfo, RspDuoMode, TunerSelect};

const SDRPLAY_SUCCESS: c_int = 0;
const SDRPLAY_API_VERSION: c_float = 3.15;
const SDRPLAY_MAX_DEVICES: usize = 16;
const SDRPLAY_MAX_SER_NO_LEN: usize = 64;

#[repr(C)]
#[derive(Clone, Copy)]
struct SdrplayDevice {
    ser_no: [c_char; SDRPLAY_MAX_SER_NO_LEN],
    hw_ver: c_uchar,
    tuner: c_int,
    rsp_duo_mode: c_int,
    valid: c_uchar,
    rsp_duo_sample_freq: c_double,
    dev: *mut c_void,
}

impl SdrplayDevice {
    fn zeroed() -> Self {
        Self {
            ser_no: [0; SDRPLAY_MAX_SER_NO_LEN],
            hw_ver: 0,
            tuner: 0,
            rsp_duo_mode: 0,
            valid: 0,
            rsp_duo_sample_freq: 0.0,
            dev: ptr::null_mut(),
        }
    }

    fn to_info(&self) -> DeviceInfo {
        // SerNo is NUL-terminated within its fixed array
        let bytes: Vec<u8> = self
            .ser_no
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        DeviceInfo {
            serial_number: String::from_utf8_lossy(&bytes).into_owned(),
            hw_ver: self.hw_ver,
            tuner: TunerSelect::from_raw(self.tuner as u32),
            rsp_duo_mode: RspDuoMode::from_raw(self.rsp_duo_mode as u32),
            rsp_duo_sample_freq: self.rsp_duo_sample_freq,
            valid: self.valid != 0,
            handle: DeviceHandle::from_raw(self.dev),
        }
    }

    fn from_info(info: &DeviceInfo) -> Self {
        let mut raw = Self::zeroed();
        for (dst, &src) in raw
            .ser_no
            .iter_mut()
            .zip(info.serial_number.as_bytes().iter().take(SDRPLAY_MAX_SER_NO_LEN - 1))
        {
            *dst = src as c_char;
        }
        raw.hw_ver = info.hw_ver;
        raw.tuner = info.tuner as c_int;
        raw.rsp_duo_mode = info.rsp_duo_mode as c_int;
        raw.valid = info.valid as c_uchar;
        raw.rsp_duo_sample_freq = info.rsp_duo_sample_freq;
        raw.dev = info.handle.as_raw();
        raw
    }
}

#[repr(C)]
struct FsFreq {
    fs_hz: c_double,
    sync_update: c_uchar,
    re_cal: c_uchar,
}

#[repr(C)]
struct SyncUpdate {
    sample_num: c_uint,
    period: c_uint,
}

#[repr(C)]
struct ResetFlags {
    reset_gain_update: c_uchar,
    reset_rf_update: c_uchar,
    reset_fs_update: c_uchar,
}

#[repr(C)]
struct Rsp1aDevParams {
    rf_notch_enable: c_uchar,
    rf_dab_notch_enable: c_uchar,
}

#[repr(C)]
struct Rsp2DevParams {
    ext_ref_output_en: c_uchar,
}

#[repr(C)]
struct RspDuoDevParams {
    ext_ref_output_en: c_int,
}

#[repr(C)]
struct RspDxDevParams {
    hdr_enable: c_uchar,
    bias_t_enable: c_uchar,
    antenna_sel: c_int,
    rf_notch_enable: c_uchar,
    rf_dab_notch_enable: c_uchar,
}

#[repr(C)]
struct DevParams {
    ppm: c_double,
    fs_freq: FsFreq,
    sync_update: SyncUpdate,
    reset_flags: ResetFlags,
    mode: c_int,
    samples_per_pkt: c_uint,
    rsp1a_params: Rsp1aDevParams,
    rsp2_params: Rsp2DevParams,
    rsp_duo_params: RspDuoDevParams,
    rsp_dx_params: RspDxDevParams,
}

#[repr(C)]
struct GainValues {
    curr: c_float,
    max: c_float,
    min: c_float,
}

#[repr(C)]
struct Gain {
    g_rdb: c_int,
    lna_state: c_uchar,
    sync_update: c_uchar,
    min_gr: c_int,
    gain_vals: GainValues,
}

#[repr(C)]
struct RfFreq {
    rf_hz: c_double,
    sync_update: c_uchar,
}

#[repr(C)]
struct DcOffsetTuner {
    dc_cal: c_uchar,
    speed_up: c_uchar,
    track_time: c_int,
    refresh_rate_time: c_int,
}

#[repr(C)]
struct TunerParams {
    bw_type: c_int,
    if_type: c_int,
    lo_mode: c_int,
    gain: Gain,
    rf_freq: RfFreq,
    dc_offset_tuner: DcOffsetTuner,
}

#[repr(C)]
struct DcOffset {
    dc_enable: c_uchar,
    iq_enable: c_uchar,
}

#[repr(C)]
struct Decimation {
    enable: c_uchar,
    decimation_factor: c_uchar,
    wide_band_signal: c_uchar,
}

#[repr(C)]
struct Agc {
    enable: c_int,
    set_point_dbfs: c_int,
    attack_ms: c_ushort,
    decay_ms: c_ushort,
    decay_delay_ms: c_ushort,
    decay_threshold_db: c_ushort,
    sync_update: c_int,
}

#[repr(C)]
struct ControlParams {
    dc_offset: DcOffset,
    decimation: Decimation,
    agc: Agc,
    adsb_mode: c_int,
}

#[repr(C)]
struct Rsp1aTunerParams {
    bias_t_enable: c_uchar,
}

#[repr(C)]
struct RxChannelParams {
    tuner_params: TunerParams,
    ctrl_params: ControlParams,
    rsp1a_tuner_params: Rsp1aTunerParams,
}

#[repr(C)]
struct SdrplayDeviceParams {
    dev_params: *mut DevParams,
    rx_channel_a: *mut RxChannelParams,
    rx_channel_b: *mut RxChannelParams,
}

extern "C" {
    fn sdrplay_api_Open() -> c_int;
    fn sdrplay_api_Close() -> c_int;
    fn sdrplay_api_ApiVersion(api_ver: *mut c_float) -> c_int;
    fn sdrplay_api_LockDeviceApi() -> c_int;
    fn sdrplay_api_UnlockDeviceApi() -> c_int;
    fn sdrplay_api_GetDevices(
        devices: *mut SdrplayDevice,
        num_devs: *mut c_uint,
        max_devs: c_uint,
    ) -> c_int;
    fn sdrplay_api_SelectDevice(device: *mut SdrplayDevice) -> c_int;
    fn sdrplay_api_ReleaseDevice(device: *mut SdrplayDevice) -> c_int;
    fn sdrplay_api_GetErrorString(err: c_int) -> *const c_char;
    fn sdrplay_api_GetDeviceParams(
        dev: *mut c_void,
        device_params: *mut *mut SdrplayDeviceParams,
    ) -> c_int;
    fn sdrplay_api_Init(
        dev: *mut c_void,
        callback_fns: *mut SdrplayCallbackFns,
        cb_context: *mut c_void,
    ) -> c_int;
    fn sdrplay_api_Uninit(dev: *mut c_void) -> c_int;
    fn sdrplay_api_Update(
        dev: *mut c_void,
        tuner: c_int,
        reason_for_update: c_uint,
        reason_for_update_ext1: c_uint,
    ) -> c_int;
}

/// Trampolines handed to `sdrplay_api_Init`. Tuner B batches of a
/// dual-tuner RSPduo are not consumed, so no stream B callback is set.
fn callback_fns() -> SdrplayCallbackFns {
    SdrplayCallbackFns {
        stream_a: Some(stream_callback),
        stream_b: None,
        event: Some(event_callback),
    }
}

fn check(err: c_int) -> ApiResult<()> {
    if err == SDRPLAY_SUCCESS {
        return Ok(());
    }
    let message = unsafe {
        let s = sdrplay_api_GetErrorString(err);
        if s.is_null() {
            format!("sdrplay_api error {}", err)
        } else {
            CStr::from_ptr(s).to_string_lossy().into_owned()
        }
    };
    Err(ApiError::new(err, message))
}

fn bandwidth_from_raw(v: c_int) -> Bandwidth {
    if v <= 0 {
        Bandwidth::Undefined
    } else {
        Bandwidth::from_khz(v as u32)
    }
}

fn if_type_from_raw(v: c_int) -> IfType {
    if v < 0 {
        IfType::Undefined
    } else {
        IfType::from_khz(v as u32)
    }
}

fn agc_from_raw(v: c_int) -> AgcControl {
    match v {
        1 => AgcControl::Hz100,
        2 => AgcControl::Hz50,
        3 => AgcControl::Hz5,
        4 => AgcControl::Enable,
        _ => AgcControl::Disable,
    }
}

#[derive(Default)]
struct Session {
    open_count: usize,
    // keeps each armed dispatcher alive while the service may call into it
    armed: HashMap<DeviceHandle, Arc<CallbackDispatcher>>,
}

/// Session with the SDRplay API service.
#[derive(Default)]
pub struct SdrplayApi {
    session: Mutex<Session>,
}

impl SdrplayApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn params_ptr(&self, device: &DeviceInfo) -> ApiResult<*mut SdrplayDeviceParams> {
        let mut params: *mut SdrplayDeviceParams = ptr::null_mut();
        check(unsafe { sdrplay_api_GetDeviceParams(device.handle.as_raw(), &mut params) })?;
        if params.is_null() {
            return Err(ApiError::new(-1, "sdrplay_api_GetDeviceParams returned null"));
        }
        Ok(params)
    }

    unsafe fn channel(
        params: *mut SdrplayDeviceParams,
        tuner: TunerSelect,
    ) -> *mut RxChannelParams {
        if tuner == TunerSelect::B && !(*params).rx_channel_b.is_null() {
            (*params).rx_channel_b
        } else {
            (*params).rx_channel_a
        }
    }
}

impl SdrApi for SdrplayApi {
    fn open(&self) -> ApiResult<()> {
        let mut session = self.session();
        if session.open_count == 0 {
            check(unsafe { sdrplay_api_Open() })?;

            let mut version: c_float = 0.0;
            check(unsafe { sdrplay_api_ApiVersion(&mut version) })?;
            if (version - SDRPLAY_API_VERSION).abs() > 0.001 {
                log::warn!(
                    "sdrplay_api version {:.2} differs from the {:.2} headers this binding follows",
                    version,
                    SDRPLAY_API_VERSION
                );
            }
        }
        session.open_count += 1;
        Ok(())
    }

    fn close(&self) -> ApiResult<()> {
        let mut session = self.session();
        match session.open_count {
            0 => Ok(()),
            1 => {
                session.open_count = 0;
                check(unsafe { sdrplay_api_Close() })
            }
            _ => {
                session.open_count -= 1;
                Ok(())
            }
        }
    }

    fn api_version(&self) -> ApiResult<f32> {
        let mut version: c_float = 0.0;
        check(unsafe { sdrplay_api_ApiVersion(&mut version) })?;
        Ok(version)
    }

    fn devices(&self) -> ApiResult<Vec<DeviceInfo>> {
        let mut raw = [SdrplayDevice::zeroed(); SDRPLAY_MAX_DEVICES];
        let mut count: c_uint = 0;

        unsafe {
            check(sdrplay_api_LockDeviceApi())?;
            let result = check(sdrplay_api_GetDevices(
                raw.as_mut_ptr(),
                &mut count,
                SDRPLAY_MAX_DEVICES as c_uint,
            ));
            sdrplay_api_UnlockDeviceApi();
            result?;
        }

        let count = (count as usize).min(SDRPLAY_MAX_DEVICES);
        Ok(raw[..count].iter().map(SdrplayDevice::to_info).collect())
    }

    fn select_device(&self, device: &DeviceInfo) -> ApiResult<DeviceInfo> {
        let mut raw = SdrplayDevice::from_info(device);
        unsafe {
            check(sdrplay_api_LockDeviceApi())?;
            let result = check(sdrplay_api_SelectDevice(&mut raw));
            sdrplay_api_UnlockDeviceApi();
            result?;
        }
        Ok(raw.to_info())
    }

    fn release_device(&self, device: &DeviceInfo) -> ApiResult<()> {
        let mut raw = SdrplayDevice::from_info(device);
        check(unsafe { sdrplay_api_ReleaseDevice(&mut raw) })
    }

    fn device_params(&self, device: &DeviceInfo) -> ApiResult<DeviceParams> {
        let params = self.params_ptr(device)?;
        let mut out = DeviceParams::default();

        unsafe {
            let dev = (*params).dev_params;
            if !dev.is_null() {
                let dev = &*dev;
                out.sample_rate_hz = dev.fs_freq.fs_hz;
                out.rsp1a_rf_notch = dev.rsp1a_params.rf_notch_enable != 0;
                out.rsp1a_dab_notch = dev.rsp1a_params.rf_dab_notch_enable != 0;
                out.rspdx_hdr_enable = dev.rsp_dx_params.hdr_enable != 0;
                out.rspdx_bias_t = dev.rsp_dx_params.bias_t_enable != 0;
            }

            let ch = Self::channel(params, device.tuner);
            if !ch.is_null() {
                let ch = &*ch;
                let tuner = &ch.tuner_params;
                out.rf_freq_hz = tuner.rf_freq.rf_hz;
                out.gain_reduction_db = tuner.gain.g_rdb;
                out.lna_state = tuner.gain.lna_state;
                out.bandwidth = bandwidth_from_raw(tuner.bw_type);
                out.if_type = if_type_from_raw(tuner.if_type);

                let ctrl = &ch.ctrl_params;
                out.dc_enable = ctrl.dc_offset.dc_enable != 0;
                out.iq_enable = ctrl.dc_offset.iq_enable != 0;
                out.decimation_enable = ctrl.decimation.enable != 0;
                out.decimation_factor = ctrl.decimation.decimation_factor;
                out.wide_band_signal = ctrl.decimation.wide_band_signal != 0;
                out.agc = agc_from_raw(ctrl.agc.enable);
                out.agc_set_point_dbfs = ctrl.agc.set_point_dbfs;

                out.rsp1a_bias_t = ch.rsp1a_tuner_params.bias_t_enable != 0;
            }
        }
        Ok(out)
    }

    fn update(&self, device: &DeviceInfo, p: &DeviceParams, reason: UpdateReason) -> ApiResult<()> {
        let params = self.params_ptr(device)?;

        unsafe {
            let dev = (*params).dev_params;
            if let Some(dev) = dev.as_mut() {
                if reason.contains(UpdateReason::DEV_FS) {
                    dev.fs_freq.fs_hz = p.sample_rate_hz;
                }
                if reason.contains(UpdateReason::RSP1A_RF_NOTCH) {
                    dev.rsp1a_params.rf_notch_enable = p.rsp1a_rf_notch as c_uchar;
                }
                if reason.contains(UpdateReason::RSP1A_RF_DAB_NOTCH) {
                    dev.rsp1a_params.rf_dab_notch_enable = p.rsp1a_dab_notch as c_uchar;
                }
                if reason.contains(UpdateReason::RSPDX_HDR_ENABLE) {
                    dev.rsp_dx_params.hdr_enable = p.rspdx_hdr_enable as c_uchar;
                }
                if reason.contains(UpdateReason::RSPDX_BIAS_T) {
                    dev.rsp_dx_params.bias_t_enable = p.rspdx_bias_t as c_uchar;
                }
            }

            if let Some(ch) = Self::channel(params, device.tuner).as_mut() {
                let tuner = &mut ch.tuner_params;
                if reason.contains(UpdateReason::TUNER_FRF) {
                    tuner.rf_freq.rf_hz = p.rf_freq_hz;
                }
                if reason.contains(UpdateReason::TUNER_GR) {
                    tuner.gain.g_rdb = p.gain_reduction_db;
                    tuner.gain.lna_state = p.lna_state;
                }
                if reason.contains(UpdateReason::TUNER_BW_TYPE) {
                    tuner.bw_type = p.bandwidth.khz() as c_int;
                }
                if reason.contains(UpdateReason::TUNER_IF_TYPE) {
                    tuner.if_type = p.if_type as c_int;
                }

                let ctrl = &mut ch.ctrl_params;
                if reason.contains(UpdateReason::CTRL_DC_OFFSET_IQ_IMBALANCE) {
                    ctrl.dc_offset.dc_enable = p.dc_enable as c_uchar;
                    ctrl.dc_offset.iq_enable = p.iq_enable as c_uchar;
                }
                if reason.contains(UpdateReason::CTRL_DECIMATION) {
                    ctrl.decimation.enable = p.decimation_enable as c_uchar;
                    ctrl.decimation.decimation_factor = p.decimation_factor;
                    ctrl.decimation.wide_band_signal = p.wide_band_signal as c_uchar;
                }
                if reason.contains(UpdateReason::CTRL_AGC) {
                    ctrl.agc.enable = p.agc as c_int;
                    ctrl.agc.set_point_dbfs = p.agc_set_point_dbfs;
                }

                if reason.contains(UpdateReason::RSP1A_BIAS_T) {
                    ch.rsp1a_tuner_params.bias_t_enable = p.rsp1a_bias_t as c_uchar;
                }
            }

            check(sdrplay_api_Update(
                device.handle.as_raw(),
                device.tuner as c_int,
                reason.reason,
                reason.ext1,
            ))
        }
    }

    fn init(&self, device: &DeviceInfo, dispatcher: &Arc<CallbackDispatcher>) -> ApiResult<()> {
        let mut session = self.session();
        let mut fns = callback_fns();
        check(unsafe {
            sdrplay_api_Init(device.handle.as_raw(), &mut fns, dispatcher.context())
        })?;
        session.armed.insert(device.handle, dispatcher.clone());
        Ok(())
    }

    fn uninit(&self, device: &DeviceInfo) -> ApiResult<()> {
        check(unsafe { sdrplay_api_Uninit(device.handle.as_raw()) })?;
        // Uninit joins the service's callback thread before returning. On
        // failure the callbacks may still fire, so the dispatcher stays armed.
        self.session().armed.remove(&device.handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_only_tuner_a_stream_is_wired() {
        let fns = callback_fns();
        assert!(fns.stream_a.is_some());
        assert!(fns.stream_b.is_none());
        assert!(fns.event.is_some());
    }

    #[test]
    fn test_device_struct_layout() {
        assert_eq!(offset_of!(SdrplayDevice, hw_ver), 64);
        assert_eq!(offset_of!(SdrplayDevice, tuner), 68);
        assert_eq!(offset_of!(SdrplayDevice, rsp_duo_sample_freq), 80);
        assert_eq!(size_of::<SdrplayDevice>(), 96);
    }

    #[test]
    fn test_serial_roundtrip() {
        let info = DeviceInfo {
            serial_number: "2305012345".into(),
            hw_ver: 255,
            tuner: TunerSelect::A,
            valid: true,
            ..DeviceInfo::default()
        };
        let raw = SdrplayDevice::from_info(&info);
        assert_eq!(raw.to_info(), info);
    }

    #[test]
    fn test_raw_enum_mapping() {
        assert_eq!(bandwidth_from_raw(1536), Bandwidth::Bw1536);
        assert_eq!(bandwidth_from_raw(0), Bandwidth::Undefined);
        assert_eq!(if_type_from_raw(-1), IfType::Undefined);
        assert_eq!(if_type_from_raw(450), IfType::If450);
        assert_eq!(agc_from_raw(4), AgcControl::Enable);
        assert_eq!(agc_from_raw(9), AgcControl::Disable);
    }
}
