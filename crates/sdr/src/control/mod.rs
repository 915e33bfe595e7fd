// Copyright 2025-2026 CEMAXECUTER LLC

//! Device lifecycle: `Closed → Opened → Selected → Streaming`.
//!
//! [`ControlCore`] implements the state machine shared by every hardware
//! family. Family types ([`rsp1a::Rsp1aControl`], [`rspdxr2::RspDxR2Control`])
//! wrap a core and implement [`DeviceControl`], overriding the capability
//! methods they support. Capability methods a family does not support are
//! no-ops that return `Ok(())`; [`DeviceControl::capabilities`] tells the
//! caller which ones take effect.

pub mod rsp1a;
pub mod rspdxr2;

use std::any::Any;
use std::sync::Arc;

use crate::api::{ApiError, DeviceParams, SdrApi, UpdateReason};
use crate::dispatch::{CallbackDispatcher, EventCallback, SampleCallback};
use crate::error::{Error, Result};
use crate::types::{DeviceInfo, Sample, StreamConfig, StreamingParams, DECIMATION_FACTORS};

pub use rsp1a::Rsp1aControl;
pub use rspdxr2::RspDxR2Control;

const MIN_SAMPLE_RATE_HZ: f64 = 2.0e6;
const MAX_SAMPLE_RATE_HZ: f64 = 10.66e6;
const MIN_RF_HZ: f64 = 1.0e3;
const MAX_RF_HZ: f64 = 2.0e9;

/// Lifecycle state of a [`DeviceControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Opened,
    Selected,
    Streaming,
}

/// Family-specific controls that take effect on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub gain_reduction: bool,
    pub lna_state: bool,
    pub hdr_mode: bool,
    pub bias_t: bool,
}

/// A device taken with `SelectDevice`. Releasing is guaranteed: either
/// explicitly through [`SelectedDevice::release`] or on drop.
struct SelectedDevice {
    api: Arc<dyn SdrApi>,
    info: DeviceInfo,
    params: DeviceParams,
    released: bool,
}

impl SelectedDevice {
    fn release(mut self) -> std::result::Result<(), ApiError> {
        self.released = true;
        self.api.release_device(&self.info)
    }
}

impl Drop for SelectedDevice {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.api.release_device(&self.info) {
                log::warn!("failed to release {}: {}", self.info.serial_number, e);
            }
        }
    }
}

pub(crate) fn check_frequency(hz: f64) -> Result<()> {
    if !(MIN_RF_HZ..=MAX_RF_HZ).contains(&hz) {
        return Err(Error::ParameterOutOfRange(format!("RF frequency {} Hz", hz)));
    }
    Ok(())
}

pub(crate) fn check_sample_rate(hz: f64) -> Result<()> {
    if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&hz) {
        return Err(Error::ParameterOutOfRange(format!("sample rate {} Hz", hz)));
    }
    Ok(())
}

fn record_failure(last_error: &mut String, context: &str, e: ApiError) -> Error {
    log::error!("{}: {}", context, e);
    last_error.clone_from(&e.message);
    e.context(context)
}

/// State machine and vendor sequencing shared by all families.
pub struct ControlCore {
    api: Arc<dyn SdrApi>,
    opened: bool,
    selected: Option<SelectedDevice>,
    streaming: bool,
    dispatcher: Arc<CallbackDispatcher>,
    config: StreamConfig,
    // values reported while no device is selected
    cached: DeviceParams,
    last_error: String,
}

impl ControlCore {
    pub fn new(api: Arc<dyn SdrApi>, config: StreamConfig) -> Self {
        Self {
            api,
            opened: false,
            selected: None,
            streaming: false,
            dispatcher: Arc::new(CallbackDispatcher::new(&config)),
            config,
            cached: DeviceParams::default(),
            last_error: String::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        match (&self.selected, self.opened, self.streaming) {
            (_, false, _) => DeviceState::Closed,
            (None, true, _) => DeviceState::Opened,
            (Some(_), true, false) => DeviceState::Selected,
            (Some(_), true, true) => DeviceState::Streaming,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<CallbackDispatcher> {
        &self.dispatcher
    }

    pub fn current_device(&self) -> Option<&DeviceInfo> {
        self.selected.as_ref().map(|s| &s.info)
    }

    /// Parameter block of the selected device, or the cached values.
    pub fn params(&self) -> &DeviceParams {
        self.selected.as_ref().map_or(&self.cached, |s| &s.params)
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.api
            .open()
            .map_err(|e| record_failure(&mut self.last_error, "failed to open API", e))?;
        self.opened = true;
        log::info!("SDRplay API opened");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }

        let mut first_err = None;
        if self.selected.is_some() {
            if let Err(e) = self.release_device() {
                first_err = Some(e);
            }
        }

        if let Err(e) = self.api.close() {
            let e = record_failure(&mut self.last_error, "failed to close API", e);
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
        self.opened = false;
        log::info!("SDRplay API closed");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn api_version(&self) -> Result<f32> {
        self.api
            .api_version()
            .map_err(|e| e.context("failed to read API version"))
    }

    /// Enumerate attached devices, opening the session if needed.
    pub fn available_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        self.open()?;
        let devices = self
            .api
            .devices()
            .map_err(|e| record_failure(&mut self.last_error, "failed to get devices", e))?;
        log::info!("found {} device(s)", devices.len());
        Ok(devices)
    }

    pub fn select_device(&mut self, info: &DeviceInfo) -> Result<()> {
        if !info.valid {
            return Err(Error::DeviceNotFound(format!(
                "device is not valid: {}",
                info.serial_number
            )));
        }
        if !self.opened {
            return Err(Error::DeviceNotInitialized);
        }
        if self.selected.is_some() {
            return Err(Error::DeviceAlreadySelected);
        }

        let chosen = self
            .api
            .select_device(info)
            .map_err(|e| record_failure(&mut self.last_error, "failed to select device", e))?;

        let mut device = SelectedDevice {
            api: self.api.clone(),
            info: chosen,
            params: DeviceParams::default(),
            released: false,
        };

        // on failure `device` drops here and the handle is released
        device.params = self.api.device_params(&device.info).map_err(|e| {
            record_failure(&mut self.last_error, "failed to get device parameters", e)
        })?;

        log::info!(
            "selected {} (serial={}, tuner={:?})",
            device.info.model(),
            device.info.serial_number,
            device.info.tuner
        );
        self.selected = Some(device);
        Ok(())
    }

    pub fn release_device(&mut self) -> Result<()> {
        if self.selected.is_none() {
            return Err(Error::DeviceNotSelected);
        }

        if let Err(e) = self.stop_streaming() {
            log::warn!("stopping stream before release: {}", e);
        }

        let Some(device) = self.selected.take() else {
            return Err(Error::DeviceNotSelected);
        };
        let serial = device.info.serial_number.clone();
        device
            .release()
            .map_err(|e| record_failure(&mut self.last_error, "failed to release device", e))?;
        log::info!("released device {}", serial);
        Ok(())
    }

    /// Apply `change` to the parameter block and push the `reason` groups to
    /// the device. Without a selected device only the cached values change.
    pub fn modify(
        &mut self,
        reason: UpdateReason,
        change: impl FnOnce(&mut DeviceParams),
    ) -> Result<()> {
        let Some(device) = self.selected.as_mut() else {
            change(&mut self.cached);
            return Ok(());
        };

        let mut next = device.params.clone();
        change(&mut next);
        self.api
            .update(&device.info, &next, reason)
            .map_err(|e| record_failure(&mut self.last_error, "failed to update parameters", e))?;
        device.params = next;
        Ok(())
    }

    pub fn set_frequency(&mut self, hz: f64) -> Result<()> {
        check_frequency(hz)?;
        self.modify(UpdateReason::TUNER_FRF, |p| p.rf_freq_hz = hz)
    }

    pub fn set_sample_rate(&mut self, hz: f64) -> Result<()> {
        check_sample_rate(hz)?;
        self.modify(UpdateReason::DEV_FS, |p| p.sample_rate_hz = hz)
    }

    pub fn start_streaming(&mut self, params: StreamingParams) -> Result<()> {
        match self.state() {
            DeviceState::Streaming => {
                log::debug!("start_streaming: already streaming");
                return Ok(());
            }
            DeviceState::Selected => {}
            DeviceState::Closed | DeviceState::Opened => return Err(Error::DeviceNotSelected),
        }

        if !DECIMATION_FACTORS.contains(&params.decimation_factor) {
            return Err(Error::ParameterOutOfRange(format!(
                "decimation factor {} (expected one of {:?})",
                params.decimation_factor, DECIMATION_FACTORS
            )));
        }
        if self.config.require_sample_callback && !self.dispatcher.has_sample_callback() {
            return Err(Error::Streaming("no sample callback registered".into()));
        }

        let Some(device) = self.selected.as_mut() else {
            return Err(Error::DeviceNotSelected);
        };

        let dc_changed = device.params.dc_enable != params.enable_dc_correction
            || device.params.iq_enable != params.enable_iq_correction;
        if dc_changed {
            let mut next = device.params.clone();
            next.dc_enable = params.enable_dc_correction;
            next.iq_enable = params.enable_iq_correction;
            self.api
                .update(&device.info, &next, UpdateReason::CTRL_DC_OFFSET_IQ_IMBALANCE)
                .map_err(|e| {
                    record_failure(
                        &mut self.last_error,
                        "failed to update DC offset/IQ parameters",
                        e,
                    )
                })?;
            device.params = next;
        }

        let decimation_changed = device.params.decimation_enable != params.decimate
            || device.params.decimation_factor != params.decimation_factor
            || device.params.wide_band_signal != params.wide_band_signal;
        if decimation_changed {
            let mut next = device.params.clone();
            next.decimation_enable = params.decimate;
            next.decimation_factor = params.decimation_factor;
            next.wide_band_signal = params.wide_band_signal;
            self.api
                .update(&device.info, &next, UpdateReason::CTRL_DECIMATION)
                .map_err(|e| {
                    record_failure(
                        &mut self.last_error,
                        "failed to update decimation parameters",
                        e,
                    )
                })?;
            device.params = next;
        }

        self.dispatcher.arm();
        if let Err(e) = self.api.init(&device.info, &self.dispatcher) {
            self.dispatcher.disarm();
            return Err(record_failure(&mut self.last_error, "failed to start streaming", e));
        }

        self.streaming = true;
        log::info!(
            "streaming started ({:.3} MHz, {:.3} MS/s, decimation={})",
            device.params.rf_freq_hz / 1e6,
            device.params.sample_rate_hz / 1e6,
            if params.decimate { params.decimation_factor } else { 1 }
        );
        Ok(())
    }

    pub fn stop_streaming(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }

        // stopped locally whatever the driver says, so the control stays usable
        self.streaming = false;
        self.dispatcher.disarm();

        let Some(device) = self.selected.as_ref() else {
            return Ok(());
        };
        self.api
            .uninit(&device.info)
            .map_err(|e| record_failure(&mut self.last_error, "failed to stop streaming", e))?;

        if self.dispatcher.has_overflow() {
            log::warn!(
                "{} sample batch(es) dropped during capture",
                self.dispatcher.dropped_batches()
            );
        }
        log::info!("streaming stopped");
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

impl Drop for ControlCore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("closing device control: {}", e);
        }
    }
}

/// Uniform control surface over every RSP hardware family.
///
/// Control-plane methods take `&mut self`, so calls on one control are
/// serialized by the borrow checker. Buffer access takes `&self` and may be
/// used from a consumer thread through the shared [`CallbackDispatcher`].
pub trait DeviceControl: Send {
    fn core(&self) -> &ControlCore;

    fn core_mut(&mut self) -> &mut ControlCore;

    /// Family name, e.g. "RSP1A".
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn state(&self) -> DeviceState {
        self.core().state()
    }

    fn open(&mut self) -> Result<()> {
        self.core_mut().open()
    }

    /// Stop, release and close the session.
    fn close(&mut self) -> Result<()> {
        self.core_mut().close()
    }

    fn api_version(&self) -> Result<f32> {
        self.core().api_version()
    }

    fn available_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        self.core_mut().available_devices()
    }

    fn select_device(&mut self, info: &DeviceInfo) -> Result<()> {
        self.core_mut().select_device(info)
    }

    fn release_device(&mut self) -> Result<()> {
        self.core_mut().release_device()
    }

    fn current_device(&self) -> Option<&DeviceInfo> {
        self.core().current_device()
    }

    fn device_params(&self) -> &DeviceParams {
        self.core().params()
    }

    fn last_error(&self) -> &str {
        self.core().last_error()
    }

    fn set_frequency(&mut self, hz: f64) -> Result<()> {
        self.core_mut().set_frequency(hz)
    }

    fn frequency(&self) -> f64 {
        self.core().params().rf_freq_hz
    }

    fn set_sample_rate(&mut self, hz: f64) -> Result<()> {
        self.core_mut().set_sample_rate(hz)
    }

    fn sample_rate(&self) -> f64 {
        self.core().params().sample_rate_hz
    }

    /// Reject a gain setting the family cannot take. Families without
    /// their own gain range accept anything.
    fn check_gain(&self, _gain_reduction_db: i32, _lna_state: u8) -> Result<()> {
        Ok(())
    }

    fn set_gain_reduction(&mut self, gain_reduction_db: i32) -> Result<()> {
        log::debug!("{}: gain reduction {} dB ignored", self.name(), gain_reduction_db);
        Ok(())
    }

    fn set_lna_state(&mut self, state: u8) -> Result<()> {
        log::debug!("{}: LNA state {} ignored", self.name(), state);
        Ok(())
    }

    fn set_hdr_mode(&mut self, enable: bool) -> Result<()> {
        log::debug!("{}: HDR mode {} ignored", self.name(), enable);
        Ok(())
    }

    fn set_bias_t(&mut self, enable: bool) -> Result<()> {
        log::debug!("{}: bias-T {} ignored", self.name(), enable);
        Ok(())
    }

    /// Factory tuning for this family.
    fn apply_defaults(&mut self) -> Result<()> {
        self.set_frequency(100.0e6)?;
        self.set_sample_rate(2.0e6)
    }

    fn start_streaming(&mut self, params: StreamingParams) -> Result<()> {
        self.core_mut().start_streaming(params)
    }

    fn stop_streaming(&mut self) -> Result<()> {
        self.core_mut().stop_streaming()
    }

    fn is_streaming(&self) -> bool {
        self.core().is_streaming()
    }

    /// Register the per-batch sample callback. Runs on the driver thread;
    /// it must not block or call back into this control.
    fn set_sample_callback(&self, callback: SampleCallback) {
        self.core().dispatcher().set_sample_callback(callback);
    }

    /// Register the driver event callback. Same threading rules as
    /// [`set_sample_callback`](Self::set_sample_callback).
    fn set_event_callback(&self, callback: EventCallback) {
        self.core().dispatcher().set_event_callback(callback);
    }

    fn wait_for_samples(&self, count: usize, timeout_ms: u32) -> bool {
        self.is_streaming() && self.core().dispatcher().wait_for_samples(count, timeout_ms)
    }

    fn read_samples(&self, dest: &mut [Sample]) -> usize {
        if !self.is_streaming() {
            return 0;
        }
        self.core().dispatcher().read_samples(dest)
    }

    fn samples_available(&self) -> usize {
        if !self.is_streaming() {
            return 0;
        }
        self.core().dispatcher().samples_available()
    }

    fn has_overflow(&self) -> bool {
        self.core().dispatcher().has_overflow()
    }

    fn reset_buffer(&self) {
        self.core().dispatcher().reset_buffer();
    }

    fn dispatcher(&self) -> &Arc<CallbackDispatcher> {
        self.core().dispatcher()
    }
}
