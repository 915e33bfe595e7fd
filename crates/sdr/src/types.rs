// Copyright 2025-2026 CEMAXECUTER LLC

use std::os::raw::c_void;

use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// One complex 16-bit IQ sample as delivered by the RSP driver.
pub type Sample = Complex<i16>;

// Hardware version identifiers reported by the driver in `DeviceInfo::hw_ver`
pub const RSP1_HWVER: u8 = 1;
pub const RSP2_HWVER: u8 = 2;
pub const RSPDUO_HWVER: u8 = 3;
pub const RSPDX_HWVER: u8 = 4;
pub const RSP1B_HWVER: u8 = 6;
pub const RSPDXR2_HWVER: u8 = 7;
pub const RSP1A_HWVER: u8 = 255;

/// Human-readable model name for a hardware version.
pub fn model_name(hw_ver: u8) -> &'static str {
    match hw_ver {
        RSP1_HWVER => "RSP1",
        RSP2_HWVER => "RSP2",
        RSPDUO_HWVER => "RSPduo",
        RSPDX_HWVER => "RSPdx",
        RSP1B_HWVER => "RSP1B",
        RSPDXR2_HWVER => "RSPdxR2",
        RSP1A_HWVER => "RSP1A",
        _ => "unknown",
    }
}

/// Tuner selection, mirrors `sdrplay_api_TunerSelectT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum TunerSelect {
    #[default]
    Neither = 0,
    A = 1,
    B = 2,
    Both = 3,
}

impl TunerSelect {
    pub fn from_raw(v: u32) -> Self {
        match v {
            1 => TunerSelect::A,
            2 => TunerSelect::B,
            3 => TunerSelect::Both,
            _ => TunerSelect::Neither,
        }
    }
}

/// RSPduo operating mode, mirrors `sdrplay_api_RspDuoModeT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum RspDuoMode {
    #[default]
    Unknown = 0,
    SingleTuner = 1,
    DualTuner = 2,
    Master = 4,
    Slave = 8,
}

impl RspDuoMode {
    pub fn from_raw(v: u32) -> Self {
        match v {
            1 => RspDuoMode::SingleTuner,
            2 => RspDuoMode::DualTuner,
            4 => RspDuoMode::Master,
            8 => RspDuoMode::Slave,
            _ => RspDuoMode::Unknown,
        }
    }
}

/// Opaque vendor device handle.
///
/// Stored as an address so it can cross threads; it is only ever turned back
/// into a pointer when handed to the vendor SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    pub const NULL: DeviceHandle = DeviceHandle(0);

    pub fn from_raw(ptr: *mut c_void) -> Self {
        DeviceHandle(ptr as usize)
    }

    /// Build a handle from a plain token (simulated backends).
    pub fn from_token(token: usize) -> Self {
        DeviceHandle(token)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Snapshot of one enumerated RSP unit.
///
/// The handle is borrowed from the vendor SDK; dropping a `DeviceInfo` never
/// releases anything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub hw_ver: u8,
    pub tuner: TunerSelect,
    pub rsp_duo_mode: RspDuoMode,
    pub rsp_duo_sample_freq: f64,
    /// Driver reports the unit ready to use
    pub valid: bool,
    pub handle: DeviceHandle,
}

impl DeviceInfo {
    pub fn model(&self) -> &'static str {
        model_name(self.hw_ver)
    }
}

/// Decimation factors accepted by the driver.
pub const DECIMATION_FACTORS: [u8; 6] = [1, 2, 4, 8, 16, 32];

/// Streaming configuration applied to the device before delivery starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingParams {
    /// Automatic IQ imbalance correction
    pub enable_iq_correction: bool,
    /// Automatic DC offset correction
    pub enable_dc_correction: bool,
    pub decimate: bool,
    /// One of 1, 2, 4, 8, 16, 32
    pub decimation_factor: u8,
    /// Process the signal as wideband (half-band filters)
    pub wide_band_signal: bool,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            enable_iq_correction: true,
            enable_dc_correction: true,
            decimate: false,
            decimation_factor: 1,
            wide_band_signal: false,
        }
    }
}

/// Default sample buffer size, in complex samples (about 0.5 s at 2 MS/s).
pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 20;

/// Behaviour switches for the streaming path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Ring buffer size in complex samples (one slot is reserved)
    pub buffer_capacity: usize,
    /// Drop stream callbacks until the driver signals its first reset
    pub drop_until_reset: bool,
    /// Refuse to start streaming without a registered sample callback
    pub require_sample_callback: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            drop_until_reset: true,
            require_sample_callback: false,
        }
    }
}

/// Kind of driver notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventType {
    GainChange,
    PowerOverload,
    DeviceRemoved,
    RspDuoModeChange,
    #[default]
    None,
}

/// Fields of a driver notification; only those relevant to the
/// [`EventType`] are populated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventParams {
    pub gain_reduction_db: u32,
    pub lna_gain_reduction_db: u32,
    pub current_gain_db: f64,
    pub overload_detected: bool,
    pub device_removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_params_defaults() {
        let p = StreamingParams::default();
        assert!(p.enable_iq_correction);
        assert!(p.enable_dc_correction);
        assert!(!p.decimate);
        assert_eq!(p.decimation_factor, 1);
    }

    #[test]
    fn test_stream_config_partial_json_uses_defaults() {
        let cfg: StreamConfig = serde_json::from_str(r#"{"buffer_capacity": 4096}"#).unwrap();
        assert_eq!(cfg.buffer_capacity, 4096);
        assert!(cfg.drop_until_reset);
        assert!(!cfg.require_sample_callback);
    }

    #[test]
    fn test_handle_roundtrips_pointer() {
        let mut x = 5u32;
        let p = &mut x as *mut u32 as *mut c_void;
        let h = DeviceHandle::from_raw(p);
        assert_eq!(h.as_raw(), p);
        assert!(!h.is_null());
        assert!(DeviceHandle::NULL.is_null());
    }

    #[test]
    fn test_model_names() {
        assert_eq!(model_name(RSP1A_HWVER), "RSP1A");
        assert_eq!(model_name(RSPDXR2_HWVER), "RSPdxR2");
        assert_eq!(model_name(42), "unknown");
    }
}
