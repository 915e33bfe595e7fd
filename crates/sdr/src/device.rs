// Copyright 2025-2026 CEMAXECUTER LLC

//! Single entry point for applications: enumerate, pick a unit, tune it,
//! stream from it.
//!
//! The facade builds the family-specific [`DeviceControl`] from the
//! [`DeviceRegistry`] when a device is selected and tears it down on
//! release. Enumeration before that runs on a session control that stays
//! open until the selected control has opened its own, so the handles in
//! the returned [`DeviceInfo`]s remain valid for selection.

use std::sync::Arc;

use crate::api::SdrApi;
use crate::control::{Capabilities, DeviceControl, DeviceState};
use crate::dispatch::{EventCallback, SampleCallback};
use crate::error::{Error, Result};
use crate::params::{BasicParams, ControlParams, Rsp1aParams, RspDxR2Params, TunerConfig};
use crate::registry::DeviceRegistry;
use crate::types::{DeviceInfo, Sample, StreamConfig, StreamingParams, RSP1A_HWVER, RSP1B_HWVER};

pub struct Device {
    api: Arc<dyn SdrApi>,
    registry: &'static DeviceRegistry,
    config: StreamConfig,
    control: Option<Box<dyn DeviceControl>>,
    // open while nothing is selected, once devices have been enumerated
    session: Option<Box<dyn DeviceControl>>,
}

impl Device {
    pub fn new(api: Arc<dyn SdrApi>) -> Self {
        Self::with_config(api, StreamConfig::default())
    }

    pub fn with_config(api: Arc<dyn SdrApi>, config: StreamConfig) -> Self {
        Self::with_registry(api, config, DeviceRegistry::global())
    }

    pub fn with_registry(
        api: Arc<dyn SdrApi>,
        config: StreamConfig,
        registry: &'static DeviceRegistry,
    ) -> Self {
        Self {
            api,
            registry,
            config,
            control: None,
            session: None,
        }
    }

    /// Control used for queries made before any selection.
    fn probe(&self) -> Result<Box<dyn DeviceControl>> {
        self.registry
            .create_with_config(RSP1A_HWVER, self.api.clone(), self.config)
    }

    /// The pre-selection session, opened on first use.
    fn session(&mut self) -> Result<&mut (dyn DeviceControl + 'static)> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let mut probe = self.probe()?;
                probe.open()?;
                probe
            }
        };
        Ok(&mut **self.session.insert(session))
    }

    fn control(&self) -> Result<&dyn DeviceControl> {
        self.control.as_deref().ok_or(Error::DeviceNotSelected)
    }

    fn control_mut(&mut self) -> Result<&mut (dyn DeviceControl + 'static)> {
        self.control.as_deref_mut().ok_or(Error::DeviceNotSelected)
    }

    pub fn api_version(&self) -> Result<f32> {
        match self.control.as_ref().or(self.session.as_ref()) {
            Some(control) => control.api_version(),
            None => {
                let mut probe = self.probe()?;
                probe.open()?;
                probe.api_version()
            }
        }
    }

    /// Enumerate attached units. With no device selected this opens a
    /// session that is held until [`select_device`](Self::select_device)
    /// or [`release_device`](Self::release_device).
    pub fn available_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        if let Some(control) = self.control.as_mut() {
            return control.available_devices();
        }
        self.session()?.available_devices()
    }

    /// Build the control for `info`'s hardware family, open it and select
    /// the unit.
    pub fn select_device(&mut self, info: &DeviceInfo) -> Result<()> {
        if self.control.is_some() {
            return Err(Error::DeviceAlreadySelected);
        }

        let mut control = self
            .registry
            .create_with_config(info.hw_ver, self.api.clone(), self.config)?;
        control.open()?;
        control.select_device(info)?;
        self.control = Some(control);

        // the selected control holds its own open, so this never closes the API
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                log::warn!("closing enumeration session: {}", e);
            }
        }
        Ok(())
    }

    /// Stop, release and close the current device, and any enumeration
    /// session. Ok when neither is open.
    pub fn release_device(&mut self) -> Result<()> {
        let released = match self.control.take() {
            Some(mut control) => control.close(),
            None => Ok(()),
        };
        let closed = match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        };
        released.and(closed)
    }

    pub fn current_device(&self) -> Option<&DeviceInfo> {
        self.control.as_ref().and_then(|c| c.current_device())
    }

    pub fn state(&self) -> DeviceState {
        self.control
            .as_ref()
            .map_or(DeviceState::Closed, |c| c.state())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.control
            .as_ref()
            .map_or_else(Capabilities::default, |c| c.capabilities())
    }

    /// Vendor diagnostic from the most recent failed call, empty if none.
    pub fn last_error(&self) -> String {
        self.control
            .as_ref()
            .map(|c| c.last_error().to_string())
            .unwrap_or_default()
    }

    pub fn basic_params(&mut self) -> Result<BasicParams<'_>> {
        BasicParams::new(self.control_mut()?)
    }

    pub fn control_params(&mut self) -> Result<ControlParams<'_>> {
        ControlParams::new(self.control_mut()?)
    }

    pub fn rsp1a_params(&mut self) -> Result<Rsp1aParams<'_>> {
        Rsp1aParams::new(self.control_mut()?)
    }

    pub fn rspdxr2_params(&mut self) -> Result<RspDxR2Params<'_>> {
        RspDxR2Params::new(self.control_mut()?)
    }

    pub fn set_frequency(&mut self, hz: f64) -> Result<()> {
        self.control_mut()?.set_frequency(hz)
    }

    pub fn frequency(&self) -> f64 {
        self.control.as_ref().map_or(0.0, |c| c.frequency())
    }

    pub fn set_sample_rate(&mut self, hz: f64) -> Result<()> {
        self.control_mut()?.set_sample_rate(hz)
    }

    pub fn sample_rate(&self) -> f64 {
        self.control.as_ref().map_or(0.0, |c| c.sample_rate())
    }

    pub fn set_gain_reduction(&mut self, gain_reduction_db: i32) -> Result<()> {
        self.control_mut()?.set_gain_reduction(gain_reduction_db)
    }

    pub fn set_lna_state(&mut self, state: u8) -> Result<()> {
        self.control_mut()?.set_lna_state(state)
    }

    pub fn set_hdr_mode(&mut self, enable: bool) -> Result<()> {
        self.control_mut()?.set_hdr_mode(enable)
    }

    pub fn set_bias_t(&mut self, enable: bool) -> Result<()> {
        self.control_mut()?.set_bias_t(enable)
    }

    pub fn apply_defaults(&mut self) -> Result<()> {
        self.control_mut()?.apply_defaults()
    }

    /// Apply a whole tuning profile: basic and control groups first, then
    /// whatever family switches the selected hardware has.
    pub fn configure(&mut self, cfg: &TunerConfig) -> Result<()> {
        {
            let mut basic = self.basic_params()?;
            basic
                .set_sample_rate(cfg.sample_rate_hz)
                .set_rf_frequency(cfg.frequency_hz)
                .set_bandwidth(cfg.bandwidth_khz)
                .set_if_type(cfg.if_khz)
                .set_gain(cfg.gain_reduction_db, cfg.lna_state);
            basic.update()?;
        }
        {
            let mut control = self.control_params()?;
            control.set_agc(cfg.agc, cfg.agc_set_point_dbfs);
            control.update()?;
        }

        let hw_ver = self.current_device().map(|d| d.hw_ver);
        let caps = self.capabilities();
        if matches!(hw_ver, Some(RSP1A_HWVER) | Some(RSP1B_HWVER)) {
            let mut rsp = self.rsp1a_params()?;
            rsp.set_bias_t(cfg.bias_t)
                .set_rf_notch(cfg.rf_notch)
                .set_dab_notch(cfg.dab_notch);
            rsp.update()?;
        } else {
            if caps.bias_t {
                self.set_bias_t(cfg.bias_t)?;
            }
            if caps.hdr_mode {
                self.set_hdr_mode(cfg.hdr_mode)?;
            }
        }

        log::info!(
            "configured {:.3} MHz, {:.3} MS/s, BW {} kHz, GR {} dB, LNA {}",
            cfg.frequency_hz / 1e6,
            cfg.sample_rate_hz / 1e6,
            cfg.bandwidth_khz,
            cfg.gain_reduction_db,
            cfg.lna_state
        );
        Ok(())
    }

    pub fn set_sample_callback(&self, callback: SampleCallback) -> Result<()> {
        self.control()?.set_sample_callback(callback);
        Ok(())
    }

    pub fn set_event_callback(&self, callback: EventCallback) -> Result<()> {
        self.control()?.set_event_callback(callback);
        Ok(())
    }

    pub fn start_streaming(&mut self, params: StreamingParams) -> Result<()> {
        self.control_mut()?.start_streaming(params)
    }

    /// Ok when nothing is streaming or nothing is selected.
    pub fn stop_streaming(&mut self) -> Result<()> {
        match self.control.as_mut() {
            Some(control) => control.stop_streaming(),
            None => Ok(()),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.control.as_ref().is_some_and(|c| c.is_streaming())
    }

    pub fn wait_for_samples(&self, count: usize, timeout_ms: u32) -> bool {
        self.control
            .as_ref()
            .is_some_and(|c| c.wait_for_samples(count, timeout_ms))
    }

    pub fn read_samples(&self, dest: &mut [Sample]) -> usize {
        self.control.as_ref().map_or(0, |c| c.read_samples(dest))
    }

    pub fn samples_available(&self) -> usize {
        self.control.as_ref().map_or(0, |c| c.samples_available())
    }

    pub fn has_overflow(&self) -> bool {
        self.control.as_ref().is_some_and(|c| c.has_overflow())
    }

    /// Usable sample buffer size of the selected device, 0 when none.
    pub fn buffer_capacity(&self) -> usize {
        self.control
            .as_ref()
            .map_or(0, |c| c.dispatcher().buffer().capacity())
    }

    pub fn reset_buffer(&self) {
        if let Some(c) = &self.control {
            c.reset_buffer();
        }
    }

    /// Family control of the selected device.
    pub fn device_control(&self) -> Option<&dyn DeviceControl> {
        self.control.as_deref()
    }
}
