// Copyright 2025-2026 CEMAXECUTER LLC

//! The vendor SDK surface consumed by the device control.
//!
//! [`SdrApi`] is implemented by the linked `libsdrplay_api` binding
//! ([`crate::sdrplay::SdrplayApi`], feature `sdrplay-api`) and by the
//! in-process simulator ([`crate::mock::MockApi`]).

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::CallbackDispatcher;
use crate::error::Error;
use crate::types::DeviceInfo;

/// Failure reported by a vendor call: raw error code plus the vendor's
/// diagnostic string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Attach the name of the failed operation.
    pub fn context(self, context: &str) -> Error {
        Error::api(context, self.message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Parameter groups named in a `sdrplay_api_Update` call.
///
/// `reason` holds `sdrplay_api_ReasonForUpdateT` bits, `ext1` holds
/// `sdrplay_api_ReasonForUpdateExtension1T` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReason {
    pub reason: u32,
    pub ext1: u32,
}

impl UpdateReason {
    pub const NONE: UpdateReason = UpdateReason::base(0);

    pub const DEV_FS: UpdateReason = UpdateReason::base(0x0000_0001);
    pub const DEV_PPM: UpdateReason = UpdateReason::base(0x0000_0002);
    pub const RSP1A_BIAS_T: UpdateReason = UpdateReason::base(0x0000_0010);
    pub const RSP1A_RF_NOTCH: UpdateReason = UpdateReason::base(0x0000_0020);
    pub const RSP1A_RF_DAB_NOTCH: UpdateReason = UpdateReason::base(0x0000_0040);
    pub const TUNER_GR: UpdateReason = UpdateReason::base(0x0000_8000);
    pub const TUNER_FRF: UpdateReason = UpdateReason::base(0x0002_0000);
    pub const TUNER_BW_TYPE: UpdateReason = UpdateReason::base(0x0004_0000);
    pub const TUNER_IF_TYPE: UpdateReason = UpdateReason::base(0x0008_0000);
    pub const CTRL_DC_OFFSET_IQ_IMBALANCE: UpdateReason = UpdateReason::base(0x0040_0000);
    pub const CTRL_DECIMATION: UpdateReason = UpdateReason::base(0x0080_0000);
    pub const CTRL_AGC: UpdateReason = UpdateReason::base(0x0100_0000);

    pub const RSPDX_HDR_ENABLE: UpdateReason = UpdateReason::ext(0x0000_0001);
    pub const RSPDX_BIAS_T: UpdateReason = UpdateReason::ext(0x0000_0002);

    pub const fn base(bits: u32) -> Self {
        Self {
            reason: bits,
            ext1: 0,
        }
    }

    pub const fn ext(bits: u32) -> Self {
        Self {
            reason: 0,
            ext1: bits,
        }
    }

    pub fn contains(self, other: UpdateReason) -> bool {
        self.reason & other.reason == other.reason && self.ext1 & other.ext1 == other.ext1
    }

    pub fn is_empty(self) -> bool {
        self.reason == 0 && self.ext1 == 0
    }
}

impl BitOr for UpdateReason {
    type Output = UpdateReason;

    fn bitor(self, rhs: UpdateReason) -> UpdateReason {
        UpdateReason {
            reason: self.reason | rhs.reason,
            ext1: self.ext1 | rhs.ext1,
        }
    }
}

impl BitOrAssign for UpdateReason {
    fn bitor_assign(&mut self, rhs: UpdateReason) {
        *self = *self | rhs;
    }
}

/// IF bandwidth, mirrors `sdrplay_api_Bw_MHzT` (values in kHz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum Bandwidth {
    Undefined = 0,
    #[default]
    Bw200 = 200,
    Bw300 = 300,
    Bw600 = 600,
    Bw1536 = 1536,
    Bw5000 = 5000,
    Bw6000 = 6000,
    Bw7000 = 7000,
    Bw8000 = 8000,
}

impl Bandwidth {
    /// Nearest supported setting; unknown widths fall back to 200 kHz.
    pub fn from_khz(khz: u32) -> Self {
        match khz {
            200 => Bandwidth::Bw200,
            300 => Bandwidth::Bw300,
            600 => Bandwidth::Bw600,
            1536 => Bandwidth::Bw1536,
            5000 => Bandwidth::Bw5000,
            6000 => Bandwidth::Bw6000,
            7000 => Bandwidth::Bw7000,
            8000 => Bandwidth::Bw8000,
            _ => Bandwidth::Bw200,
        }
    }

    pub fn khz(self) -> u32 {
        self as u32
    }
}

/// Intermediate frequency, mirrors `sdrplay_api_If_kHzT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum IfType {
    Undefined = -1,
    #[default]
    Zero = 0,
    If450 = 450,
    If1620 = 1620,
    If2048 = 2048,
}

impl IfType {
    /// Unknown frequencies fall back to zero-IF.
    pub fn from_khz(khz: u32) -> Self {
        match khz {
            450 => IfType::If450,
            1620 => IfType::If1620,
            2048 => IfType::If2048,
            _ => IfType::Zero,
        }
    }
}

/// AGC loop mode, mirrors `sdrplay_api_AgcControlT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum AgcControl {
    #[default]
    Disable = 0,
    Hz100 = 1,
    Hz50 = 2,
    Hz5 = 3,
    Enable = 4,
}

/// Local mirror of the vendor-owned parameter block
/// (`sdrplay_api_DeviceParamsT`, tuner A).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParams {
    pub sample_rate_hz: f64,
    pub rf_freq_hz: f64,
    pub gain_reduction_db: i32,
    pub lna_state: u8,
    pub bandwidth: Bandwidth,
    pub if_type: IfType,
    pub agc: AgcControl,
    pub agc_set_point_dbfs: i32,
    pub dc_enable: bool,
    pub iq_enable: bool,
    pub decimation_enable: bool,
    pub decimation_factor: u8,
    pub wide_band_signal: bool,
    pub rsp1a_bias_t: bool,
    pub rsp1a_rf_notch: bool,
    pub rsp1a_dab_notch: bool,
    pub rspdx_hdr_enable: bool,
    pub rspdx_bias_t: bool,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2.0e6,
            rf_freq_hz: 100.0e6,
            gain_reduction_db: 40,
            lna_state: 0,
            bandwidth: Bandwidth::Bw200,
            if_type: IfType::Zero,
            agc: AgcControl::Disable,
            agc_set_point_dbfs: -60,
            dc_enable: true,
            iq_enable: true,
            decimation_enable: false,
            decimation_factor: 1,
            wide_band_signal: false,
            rsp1a_bias_t: false,
            rsp1a_rf_notch: false,
            rsp1a_dab_notch: false,
            rspdx_hdr_enable: false,
            rspdx_bias_t: false,
        }
    }
}

/// Vendor SDK primitives.
///
/// Implementations only translate calls; sequencing and state checks are
/// the job of [`DeviceControl`](crate::control::DeviceControl).
pub trait SdrApi: Send + Sync {
    /// Open the API session. Sessions are counted: every `open` is paired
    /// with one `close`, and only the last `close` ends the session.
    fn open(&self) -> ApiResult<()>;

    fn close(&self) -> ApiResult<()>;

    fn api_version(&self) -> ApiResult<f32>;

    /// Enumerate attached units.
    fn devices(&self) -> ApiResult<Vec<DeviceInfo>>;

    /// Take exclusive control of `device`. Returns the device as the driver
    /// reports it after selection.
    fn select_device(&self, device: &DeviceInfo) -> ApiResult<DeviceInfo>;

    fn release_device(&self, device: &DeviceInfo) -> ApiResult<()>;

    /// Snapshot of the device's parameter block.
    fn device_params(&self, device: &DeviceInfo) -> ApiResult<DeviceParams>;

    /// Write the groups named by `reason` from `params` into the device's
    /// parameter block and apply them.
    fn update(
        &self,
        device: &DeviceInfo,
        params: &DeviceParams,
        reason: UpdateReason,
    ) -> ApiResult<()>;

    /// Arm the stream and event callbacks and start delivery.
    fn init(&self, device: &DeviceInfo, dispatcher: &Arc<CallbackDispatcher>) -> ApiResult<()>;

    /// Stop delivery.
    fn uninit(&self, device: &DeviceInfo) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_reason_combines_both_words() {
        let r = UpdateReason::DEV_FS | UpdateReason::RSPDX_HDR_ENABLE;
        assert_eq!(r.reason, 0x1);
        assert_eq!(r.ext1, 0x1);
        assert!(r.contains(UpdateReason::DEV_FS));
        assert!(r.contains(UpdateReason::RSPDX_HDR_ENABLE));
        assert!(!r.contains(UpdateReason::TUNER_FRF));
        assert!(UpdateReason::NONE.is_empty());
    }

    #[test]
    fn test_bandwidth_and_if_fallbacks() {
        assert_eq!(Bandwidth::from_khz(1536), Bandwidth::Bw1536);
        assert_eq!(Bandwidth::from_khz(123), Bandwidth::Bw200);
        assert_eq!(Bandwidth::Bw8000.khz(), 8000);
        assert_eq!(IfType::from_khz(2048), IfType::If2048);
        assert_eq!(IfType::from_khz(1), IfType::Zero);
    }

    #[test]
    fn test_api_error_context_keeps_message() {
        let e = ApiError::new(7, "sdrplay_api_HwError").context("failed to update");
        assert_eq!(e.to_string(), "failed to update: sdrplay_api_HwError");
    }
}
