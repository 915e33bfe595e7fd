// Copyright 2025-2026 CEMAXECUTER LLC

//! In-process stand-in for the SDRplay service.
//!
//! Keeps a parameter block per simulated unit, records every call, and can
//! be told to fail any operation by name. Samples and events reach the
//! dispatcher through the same `extern "C"` trampolines the real driver
//! calls. With a tone configured, `init` starts a thread that paces
//! synthetic IQ at the configured sample rate.

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::os::raw::c_int;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::api::{ApiError, ApiResult, DeviceParams, SdrApi, UpdateReason};
use crate::dispatch::{event_callback, stream_callback, CallbackDispatcher};
use crate::ffi::{SdrplayEventParams, SdrplayGainCbParam, SdrplayPowerOverloadCbParam};
use crate::ffi::{
    SDRPLAY_EVENT_DEVICE_REMOVED, SDRPLAY_EVENT_GAIN_CHANGE, SDRPLAY_EVENT_POWER_OVERLOAD_CHANGE,
    SDRPLAY_OVERLOAD_CORRECTED, SDRPLAY_OVERLOAD_DETECTED,
};
use crate::types::{
    DeviceHandle, DeviceInfo, RspDuoMode, TunerSelect, RSP1A_HWVER, RSPDXR2_HWVER,
};

// sdrplay_api_ErrT values used by the simulator
const ERR_FAIL: i32 = 1;
const ERR_INVALID_PARAM: i32 = 2;
const ERR_ALREADY_INITIALISED: i32 = 9;
const ERR_NOT_INITIALISED: i32 = 10;

const SIM_API_VERSION: f32 = 3.15;
const SIM_BATCH: usize = 1008;
const SIM_AMPLITUDE: f64 = 4096.0;

/// One recorded vendor call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Open,
    Close,
    ApiVersion,
    Devices,
    SelectDevice(String),
    ReleaseDevice,
    DeviceParams,
    Update(UpdateReason),
    Init,
    Uninit,
}

struct Generator {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Generator {
    fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.thread.join().is_err() {
            log::error!("simulated sample thread panicked");
        }
    }
}

#[derive(Default)]
struct MockState {
    open_count: usize,
    devices: Vec<DeviceInfo>,
    params: Vec<DeviceParams>,
    selected: Vec<bool>,
    calls: Vec<MockCall>,
    failures: HashSet<String>,
    armed: Option<Arc<CallbackDispatcher>>,
    generator: Option<Generator>,
}

impl MockState {
    fn index_of(&self, device: &DeviceInfo) -> ApiResult<usize> {
        self.devices
            .iter()
            .position(|d| d.serial_number == device.serial_number)
            .ok_or_else(|| ApiError::new(ERR_INVALID_PARAM, "sdrplay_api_InvalidParam"))
    }
}

/// Simulated vendor SDK.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
    tone_offset_hz: Option<f64>,
}

impl MockApi {
    /// A session with no attached units.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(serial: &str, hw_ver: u8) -> Self {
        let api = Self::new();
        api.add_device(serial, hw_ver);
        api
    }

    /// An RSP1A and an RSPdxR2 that produce a tone `offset_hz` above the
    /// tuned frequency once streaming starts.
    pub fn simulator(offset_hz: f64) -> Self {
        let api = Self {
            state: Mutex::new(MockState::default()),
            tone_offset_hz: Some(offset_hz),
        };
        api.add_device("SIM1A0001", RSP1A_HWVER);
        api.add_device("SIMDX0002", RSPDXR2_HWVER);
        api
    }

    pub fn add_device(&self, serial: &str, hw_ver: u8) {
        let mut state = self.state();
        let token = state.devices.len() + 1;
        state.devices.push(DeviceInfo {
            serial_number: serial.to_string(),
            hw_ver,
            tuner: TunerSelect::A,
            rsp_duo_mode: RspDuoMode::Unknown,
            rsp_duo_sample_freq: 0.0,
            valid: true,
            handle: DeviceHandle::from_token(token),
        });
        state.params.push(DeviceParams::default());
        state.selected.push(false);
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enumerated unit by position.
    ///
    /// # Panics
    ///
    /// If fewer than `index + 1` units were added.
    pub fn device(&self, index: usize) -> DeviceInfo {
        self.state().devices[index].clone()
    }

    /// Current simulated parameter block of a unit.
    ///
    /// # Panics
    ///
    /// If fewer than `index + 1` units were added.
    pub fn params(&self, index: usize) -> DeviceParams {
        self.state().params[index].clone()
    }

    /// Make every later call to `op` (a [`SdrApi`] method name) fail.
    pub fn fail_on(&self, op: &str) {
        self.state().failures.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    /// Reasons of every `update` call, in order.
    pub fn updates(&self) -> Vec<UpdateReason> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Update(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    /// Dispatcher handed over by the last successful `init`, until `uninit`.
    pub fn armed_dispatcher(&self) -> Option<Arc<CallbackDispatcher>> {
        self.state().armed.clone()
    }

    /// Push one stream callback through the C trampoline. Returns `false`
    /// when streaming is not armed.
    pub fn deliver_samples(&self, iq: &[(i16, i16)], reset: bool) -> bool {
        let Some(dispatcher) = self.armed_dispatcher() else {
            return false;
        };
        let mut xi: Vec<i16> = iq.iter().map(|s| s.0).collect();
        let mut xq: Vec<i16> = iq.iter().map(|s| s.1).collect();
        unsafe {
            stream_callback(
                xi.as_mut_ptr(),
                xq.as_mut_ptr(),
                ptr::null_mut(),
                iq.len() as u32,
                reset as u32,
                dispatcher.context(),
            );
        }
        true
    }

    /// Push one raw event callback through the C trampoline.
    pub fn deliver_event(&self, event_id: c_int, params: Option<SdrplayEventParams>) -> bool {
        let Some(dispatcher) = self.armed_dispatcher() else {
            return false;
        };
        let mut params = params;
        let raw = params
            .as_mut()
            .map_or(ptr::null_mut(), |p| p as *mut SdrplayEventParams);
        unsafe {
            event_callback(event_id, TunerSelect::A as c_int, raw, dispatcher.context());
        }
        true
    }

    pub fn deliver_gain_change(&self, gr_db: u32, lna_gr_db: u32, curr_gain: f64) -> bool {
        self.deliver_event(
            SDRPLAY_EVENT_GAIN_CHANGE,
            Some(SdrplayEventParams {
                gain_params: SdrplayGainCbParam {
                    gr_db,
                    lna_gr_db,
                    curr_gain,
                },
            }),
        )
    }

    pub fn deliver_overload(&self, detected: bool) -> bool {
        let change = if detected {
            SDRPLAY_OVERLOAD_DETECTED
        } else {
            SDRPLAY_OVERLOAD_CORRECTED
        };
        self.deliver_event(
            SDRPLAY_EVENT_POWER_OVERLOAD_CHANGE,
            Some(SdrplayEventParams {
                power_overload_params: SdrplayPowerOverloadCbParam {
                    power_overload_change_type: change,
                },
            }),
        )
    }

    pub fn deliver_device_removed(&self) -> bool {
        self.deliver_event(SDRPLAY_EVENT_DEVICE_REMOVED, None)
    }

    fn begin(&self, call: MockCall, op: &str) -> ApiResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failures.contains(op) {
            return Err(ApiError::new(ERR_FAIL, "sdrplay_api_Fail"));
        }
        Ok(state)
    }
}

fn apply_update(target: &mut DeviceParams, src: &DeviceParams, reason: UpdateReason) {
    if reason.contains(UpdateReason::DEV_FS) {
        target.sample_rate_hz = src.sample_rate_hz;
    }
    if reason.contains(UpdateReason::TUNER_FRF) {
        target.rf_freq_hz = src.rf_freq_hz;
    }
    if reason.contains(UpdateReason::TUNER_GR) {
        target.gain_reduction_db = src.gain_reduction_db;
        target.lna_state = src.lna_state;
    }
    if reason.contains(UpdateReason::TUNER_BW_TYPE) {
        target.bandwidth = src.bandwidth;
    }
    if reason.contains(UpdateReason::TUNER_IF_TYPE) {
        target.if_type = src.if_type;
    }
    if reason.contains(UpdateReason::CTRL_DC_OFFSET_IQ_IMBALANCE) {
        target.dc_enable = src.dc_enable;
        target.iq_enable = src.iq_enable;
    }
    if reason.contains(UpdateReason::CTRL_DECIMATION) {
        target.decimation_enable = src.decimation_enable;
        target.decimation_factor = src.decimation_factor;
        target.wide_band_signal = src.wide_band_signal;
    }
    if reason.contains(UpdateReason::CTRL_AGC) {
        target.agc = src.agc;
        target.agc_set_point_dbfs = src.agc_set_point_dbfs;
    }
    if reason.contains(UpdateReason::RSP1A_BIAS_T) {
        target.rsp1a_bias_t = src.rsp1a_bias_t;
    }
    if reason.contains(UpdateReason::RSP1A_RF_NOTCH) {
        target.rsp1a_rf_notch = src.rsp1a_rf_notch;
    }
    if reason.contains(UpdateReason::RSP1A_RF_DAB_NOTCH) {
        target.rsp1a_dab_notch = src.rsp1a_dab_notch;
    }
    if reason.contains(UpdateReason::RSPDX_HDR_ENABLE) {
        target.rspdx_hdr_enable = src.rspdx_hdr_enable;
    }
    if reason.contains(UpdateReason::RSPDX_BIAS_T) {
        target.rspdx_bias_t = src.rspdx_bias_t;
    }
}

fn spawn_generator(
    dispatcher: Arc<CallbackDispatcher>,
    output_rate_hz: f64,
    offset_hz: f64,
) -> Generator {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let thread = thread::spawn(move || {
        let step = TAU * offset_hz / output_rate_hz;
        let period = Duration::from_secs_f64(SIM_BATCH as f64 / output_rate_hz);
        let mut xi = vec![0i16; SIM_BATCH];
        let mut xq = vec![0i16; SIM_BATCH];
        let mut phase = 0.0f64;
        let mut reset = true;
        let mut next = Instant::now();

        while flag.load(Ordering::Acquire) {
            for (i, q) in xi.iter_mut().zip(xq.iter_mut()) {
                *i = (SIM_AMPLITUDE * phase.cos()) as i16;
                *q = (SIM_AMPLITUDE * phase.sin()) as i16;
                phase = (phase + step) % TAU;
            }
            unsafe {
                stream_callback(
                    xi.as_mut_ptr(),
                    xq.as_mut_ptr(),
                    ptr::null_mut(),
                    SIM_BATCH as u32,
                    reset as u32,
                    dispatcher.context(),
                );
            }
            reset = false;

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
        }
    });

    Generator { running, thread }
}

impl SdrApi for MockApi {
    fn open(&self) -> ApiResult<()> {
        let mut state = self.begin(MockCall::Open, "open")?;
        state.open_count += 1;
        Ok(())
    }

    fn close(&self) -> ApiResult<()> {
        let mut state = self.begin(MockCall::Close, "close")?;
        state.open_count = state.open_count.saturating_sub(1);
        Ok(())
    }

    fn api_version(&self) -> ApiResult<f32> {
        drop(self.begin(MockCall::ApiVersion, "api_version")?);
        Ok(SIM_API_VERSION)
    }

    fn devices(&self) -> ApiResult<Vec<DeviceInfo>> {
        let state = self.begin(MockCall::Devices, "devices")?;
        if state.open_count == 0 {
            return Err(ApiError::new(ERR_NOT_INITIALISED, "sdrplay_api_NotInitialised"));
        }
        Ok(state.devices.clone())
    }

    fn select_device(&self, device: &DeviceInfo) -> ApiResult<DeviceInfo> {
        let mut state = self.begin(
            MockCall::SelectDevice(device.serial_number.clone()),
            "select_device",
        )?;
        let index = state.index_of(device)?;
        if state.selected[index] {
            return Err(ApiError::new(ERR_FAIL, "sdrplay_api_Fail"));
        }
        state.selected[index] = true;
        Ok(state.devices[index].clone())
    }

    fn release_device(&self, device: &DeviceInfo) -> ApiResult<()> {
        let mut state = self.begin(MockCall::ReleaseDevice, "release_device")?;
        let index = state.index_of(device)?;
        state.selected[index] = false;
        Ok(())
    }

    fn device_params(&self, device: &DeviceInfo) -> ApiResult<DeviceParams> {
        let state = self.begin(MockCall::DeviceParams, "device_params")?;
        let index = state.index_of(device)?;
        Ok(state.params[index].clone())
    }

    fn update(
        &self,
        device: &DeviceInfo,
        params: &DeviceParams,
        reason: UpdateReason,
    ) -> ApiResult<()> {
        let mut state = self.begin(MockCall::Update(reason), "update")?;
        let index = state.index_of(device)?;
        apply_update(&mut state.params[index], params, reason);
        Ok(())
    }

    fn init(&self, device: &DeviceInfo, dispatcher: &Arc<CallbackDispatcher>) -> ApiResult<()> {
        let mut state = self.begin(MockCall::Init, "init")?;
        let index = state.index_of(device)?;
        if let Some(armed) = state.armed.as_ref() {
            if !Arc::ptr_eq(armed, dispatcher) {
                return Err(ApiError::new(
                    ERR_ALREADY_INITIALISED,
                    "sdrplay_api_AlreadyInitialised",
                ));
            }
        }
        state.armed = Some(dispatcher.clone());
        // re-arming after a failed uninit replaces the old tone thread
        let stale = state.generator.take();
        if let Some(g) = stale {
            g.stop();
        }

        if let Some(offset_hz) = self.tone_offset_hz {
            let p = &state.params[index];
            let factor = if p.decimation_enable {
                p.decimation_factor.max(1) as f64
            } else {
                1.0
            };
            let rate = p.sample_rate_hz / factor;
            log::info!(
                "simulating {} at {:.3} MS/s, tone at {:+.1} kHz",
                device.serial_number,
                rate / 1e6,
                offset_hz / 1e3
            );
            state.generator = Some(spawn_generator(dispatcher.clone(), rate, offset_hz));
        }
        Ok(())
    }

    fn uninit(&self, _device: &DeviceInfo) -> ApiResult<()> {
        let generator = {
            let mut state = self.begin(MockCall::Uninit, "uninit")?;
            state.armed = None;
            state.generator.take()
        };
        if let Some(g) = generator {
            g.stop();
        }
        Ok(())
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        let generator = self.state().generator.take();
        if let Some(g) = generator {
            g.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sample, StreamConfig};

    #[test]
    fn test_enumeration_requires_open() {
        let api = MockApi::with_device("A", RSP1A_HWVER);
        assert_eq!(api.devices().unwrap_err().code, ERR_NOT_INITIALISED);
        api.open().unwrap();
        let devices = api.devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].valid);
        assert!(!devices[0].handle.is_null());
    }

    #[test]
    fn test_double_select_fails() {
        let api = MockApi::with_device("A", RSP1A_HWVER);
        api.select_device(&api.device(0)).unwrap();
        assert!(api.select_device(&api.device(0)).is_err());
        api.release_device(&api.device(0)).unwrap();
        api.select_device(&api.device(0)).unwrap();
    }

    #[test]
    fn test_update_copies_only_named_groups() {
        let api = MockApi::with_device("A", RSP1A_HWVER);
        let dev = api.device(0);
        let mut p = DeviceParams::default();
        p.rf_freq_hz = 1.0e9;
        p.sample_rate_hz = 8.0e6;
        api.update(&dev, &p, UpdateReason::TUNER_FRF).unwrap();
        assert_eq!(api.params(0).rf_freq_hz, 1.0e9);
        assert_eq!(api.params(0).sample_rate_hz, 2.0e6);
    }

    #[test]
    fn test_failure_injection_is_per_operation() {
        let api = MockApi::with_device("A", RSP1A_HWVER);
        api.fail_on("open");
        assert!(api.open().is_err());
        assert!(api.api_version().is_ok());
        api.clear_failures();
        assert!(api.open().is_ok());
        assert_eq!(api.count(|c| *c == MockCall::Open), 2);
    }

    #[test]
    fn test_generator_delivers_tone() {
        let api = MockApi::simulator(100.0e3);
        let dev = api.device(0);
        let dispatcher = Arc::new(CallbackDispatcher::new(&StreamConfig::default()));
        dispatcher.arm();
        api.init(&dev, &dispatcher).unwrap();
        assert!(dispatcher.wait_for_samples(SIM_BATCH * 2, 2000));
        api.uninit(&dev).unwrap();

        let mut out = vec![Sample::new(0, 0); 4];
        assert_eq!(dispatcher.read_samples(&mut out), 4);
        // first sample of the reset batch sits at phase zero
        assert_eq!(out[0], Sample::new(SIM_AMPLITUDE as i16, 0));
        assert!(api.armed_dispatcher().is_none());
    }

    #[test]
    fn test_deliver_requires_init() {
        let api = MockApi::with_device("A", RSP1A_HWVER);
        assert!(!api.deliver_samples(&[(1, 2)], true));
        assert!(!api.deliver_device_removed());
    }
}
