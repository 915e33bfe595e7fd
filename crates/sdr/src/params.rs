// Copyright 2025-2026 CEMAXECUTER LLC

//! Grouped parameter editors handed out by [`Device`](crate::device::Device).
//!
//! Each editor stages changes against a copy of the selected device's
//! parameter block; nothing reaches the hardware until `update()`, which
//! pushes every field of the group in a single vendor update.

use serde::{Deserialize, Serialize};

use crate::api::{AgcControl, Bandwidth, DeviceParams, IfType, UpdateReason};
use crate::control::{check_frequency, check_sample_rate, DeviceControl};
use crate::error::{Error, Result};
use crate::types::{model_name, DECIMATION_FACTORS, RSP1A_HWVER, RSP1B_HWVER, RSPDXR2_HWVER};

const DEFAULT_AGC_SET_POINT_DBFS: i32 = -60;

fn staged_for(control: &dyn DeviceControl, families: &[u8], what: &str) -> Result<DeviceParams> {
    let Some(device) = control.current_device() else {
        return Err(Error::DeviceNotSelected);
    };
    if !families.is_empty() && !families.contains(&device.hw_ver) {
        return Err(Error::DeviceNotSupported(format!(
            "{} parameters are not available on {}",
            what,
            model_name(device.hw_ver)
        )));
    }
    Ok(control.device_params().clone())
}

/// Sample rate, tuning, IF filter and gain.
pub struct BasicParams<'a> {
    control: &'a mut dyn DeviceControl,
    staged: DeviceParams,
}

impl<'a> BasicParams<'a> {
    pub fn new(control: &'a mut dyn DeviceControl) -> Result<Self> {
        let staged = staged_for(control, &[], "basic")?;
        Ok(Self { control, staged })
    }

    pub fn set_sample_rate(&mut self, hz: f64) -> &mut Self {
        self.staged.sample_rate_hz = hz;
        self
    }

    pub fn set_rf_frequency(&mut self, hz: f64) -> &mut Self {
        self.staged.rf_freq_hz = hz;
        self
    }

    /// IF bandwidth in kHz; unsupported widths select 200 kHz.
    pub fn set_bandwidth(&mut self, khz: u32) -> &mut Self {
        self.staged.bandwidth = Bandwidth::from_khz(khz);
        self
    }

    /// IF frequency in kHz (0, 450, 1620 or 2048); anything else is zero-IF.
    pub fn set_if_type(&mut self, khz: u32) -> &mut Self {
        self.staged.if_type = IfType::from_khz(khz);
        self
    }

    pub fn set_gain(&mut self, gain_reduction_db: i32, lna_state: u8) -> &mut Self {
        self.staged.gain_reduction_db = gain_reduction_db;
        self.staged.lna_state = lna_state;
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.staged.sample_rate_hz
    }

    pub fn rf_frequency(&self) -> f64 {
        self.staged.rf_freq_hz
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.staged.bandwidth
    }

    pub fn if_type(&self) -> IfType {
        self.staged.if_type
    }

    pub fn gain_reduction(&self) -> i32 {
        self.staged.gain_reduction_db
    }

    pub fn lna_state(&self) -> u8 {
        self.staged.lna_state
    }

    pub fn update(&mut self) -> Result<()> {
        check_sample_rate(self.staged.sample_rate_hz)?;
        check_frequency(self.staged.rf_freq_hz)?;
        self.control.check_gain(self.staged.gain_reduction_db, self.staged.lna_state)?;

        let reason = UpdateReason::DEV_FS
            | UpdateReason::TUNER_FRF
            | UpdateReason::TUNER_BW_TYPE
            | UpdateReason::TUNER_IF_TYPE
            | UpdateReason::TUNER_GR;
        let s = self.staged.clone();
        self.control.core_mut().modify(reason, move |p| {
            p.sample_rate_hz = s.sample_rate_hz;
            p.rf_freq_hz = s.rf_freq_hz;
            p.bandwidth = s.bandwidth;
            p.if_type = s.if_type;
            p.gain_reduction_db = s.gain_reduction_db;
            p.lna_state = s.lna_state;
        })
    }
}

/// AGC, DC/IQ correction and decimation.
pub struct ControlParams<'a> {
    control: &'a mut dyn DeviceControl,
    staged: DeviceParams,
}

impl<'a> ControlParams<'a> {
    pub fn new(control: &'a mut dyn DeviceControl) -> Result<Self> {
        let staged = staged_for(control, &[], "control")?;
        Ok(Self { control, staged })
    }

    pub fn set_agc(&mut self, enable: bool, set_point_dbfs: i32) -> &mut Self {
        self.staged.agc = if enable {
            AgcControl::Enable
        } else {
            AgcControl::Disable
        };
        self.staged.agc_set_point_dbfs = set_point_dbfs;
        self
    }

    /// Enable AGC at the default -60 dBfs set point.
    pub fn enable_agc(&mut self) -> &mut Self {
        self.set_agc(true, DEFAULT_AGC_SET_POINT_DBFS)
    }

    pub fn set_dc_offset(&mut self, dc_enable: bool, iq_enable: bool) -> &mut Self {
        self.staged.dc_enable = dc_enable;
        self.staged.iq_enable = iq_enable;
        self
    }

    pub fn set_decimation(
        &mut self,
        enable: bool,
        factor: u8,
        wide_band_signal: bool,
    ) -> &mut Self {
        self.staged.decimation_enable = enable;
        self.staged.decimation_factor = factor;
        self.staged.wide_band_signal = wide_band_signal;
        self
    }

    pub fn agc(&self) -> AgcControl {
        self.staged.agc
    }

    pub fn agc_set_point(&self) -> i32 {
        self.staged.agc_set_point_dbfs
    }

    pub fn update(&mut self) -> Result<()> {
        if !DECIMATION_FACTORS.contains(&self.staged.decimation_factor) {
            return Err(Error::ParameterOutOfRange(format!(
                "decimation factor {}",
                self.staged.decimation_factor
            )));
        }

        let reason = UpdateReason::CTRL_DC_OFFSET_IQ_IMBALANCE
            | UpdateReason::CTRL_DECIMATION
            | UpdateReason::CTRL_AGC;
        let s = self.staged.clone();
        self.control.core_mut().modify(reason, move |p| {
            p.agc = s.agc;
            p.agc_set_point_dbfs = s.agc_set_point_dbfs;
            p.dc_enable = s.dc_enable;
            p.iq_enable = s.iq_enable;
            p.decimation_enable = s.decimation_enable;
            p.decimation_factor = s.decimation_factor;
            p.wide_band_signal = s.wide_band_signal;
        })
    }
}

/// RSP1A / RSP1B front-end switches.
pub struct Rsp1aParams<'a> {
    control: &'a mut dyn DeviceControl,
    staged: DeviceParams,
}

impl<'a> Rsp1aParams<'a> {
    pub fn new(control: &'a mut dyn DeviceControl) -> Result<Self> {
        let staged = staged_for(control, &[RSP1A_HWVER, RSP1B_HWVER], "RSP1A")?;
        Ok(Self { control, staged })
    }

    pub fn set_bias_t(&mut self, enable: bool) -> &mut Self {
        self.staged.rsp1a_bias_t = enable;
        self
    }

    pub fn set_rf_notch(&mut self, enable: bool) -> &mut Self {
        self.staged.rsp1a_rf_notch = enable;
        self
    }

    pub fn set_dab_notch(&mut self, enable: bool) -> &mut Self {
        self.staged.rsp1a_dab_notch = enable;
        self
    }

    pub fn bias_t(&self) -> bool {
        self.staged.rsp1a_bias_t
    }

    pub fn rf_notch(&self) -> bool {
        self.staged.rsp1a_rf_notch
    }

    pub fn dab_notch(&self) -> bool {
        self.staged.rsp1a_dab_notch
    }

    pub fn update(&mut self) -> Result<()> {
        let reason = UpdateReason::RSP1A_BIAS_T
            | UpdateReason::RSP1A_RF_NOTCH
            | UpdateReason::RSP1A_RF_DAB_NOTCH;
        let s = self.staged.clone();
        self.control.core_mut().modify(reason, move |p| {
            p.rsp1a_bias_t = s.rsp1a_bias_t;
            p.rsp1a_rf_notch = s.rsp1a_rf_notch;
            p.rsp1a_dab_notch = s.rsp1a_dab_notch;
        })
    }
}

/// RSPdxR2 HDR mode and bias-T.
pub struct RspDxR2Params<'a> {
    control: &'a mut dyn DeviceControl,
    staged: DeviceParams,
}

impl<'a> RspDxR2Params<'a> {
    pub fn new(control: &'a mut dyn DeviceControl) -> Result<Self> {
        let staged = staged_for(control, &[RSPDXR2_HWVER], "RSPdxR2")?;
        Ok(Self { control, staged })
    }

    pub fn set_hdr_mode(&mut self, enable: bool) -> &mut Self {
        self.staged.rspdx_hdr_enable = enable;
        self
    }

    pub fn set_bias_t(&mut self, enable: bool) -> &mut Self {
        self.staged.rspdx_bias_t = enable;
        self
    }

    pub fn hdr_mode(&self) -> bool {
        self.staged.rspdx_hdr_enable
    }

    pub fn bias_t(&self) -> bool {
        self.staged.rspdx_bias_t
    }

    pub fn update(&mut self) -> Result<()> {
        let reason = UpdateReason::RSPDX_HDR_ENABLE | UpdateReason::RSPDX_BIAS_T;
        let s = self.staged.clone();
        self.control.core_mut().modify(reason, move |p| {
            p.rspdx_hdr_enable = s.rspdx_hdr_enable;
            p.rspdx_bias_t = s.rspdx_bias_t;
        })
    }
}

/// Serializable tuning profile, applied with
/// [`Device::configure`](crate::device::Device::configure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub frequency_hz: f64,
    pub sample_rate_hz: f64,
    pub bandwidth_khz: u32,
    pub if_khz: u32,
    pub gain_reduction_db: i32,
    pub lna_state: u8,
    pub agc: bool,
    pub agc_set_point_dbfs: i32,
    pub bias_t: bool,
    pub hdr_mode: bool,
    pub rf_notch: bool,
    pub dab_notch: bool,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 100.0e6,
            sample_rate_hz: 2.0e6,
            bandwidth_khz: 1536,
            if_khz: 0,
            gain_reduction_db: 40,
            lna_state: 0,
            agc: false,
            agc_set_point_dbfs: DEFAULT_AGC_SET_POINT_DBFS,
            bias_t: false,
            hdr_mode: false,
            rf_notch: false,
            dab_notch: false,
        }
    }
}
