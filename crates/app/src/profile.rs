// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rsp_sdr::{StreamConfig, StreamingParams, TunerConfig};

/// Capture profile loaded from `--config`; command-line flags override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Serial number or enumeration index
    pub device: Option<String>,
    pub tuner: TunerConfig,
    pub streaming: StreamingParams,
    pub stream: StreamConfig,
    /// Complex samples per block handed to the writer
    pub block_size: usize,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            device: None,
            tuner: TunerConfig::default(),
            streaming: StreamingParams::default(),
            stream: StreamConfig::default(),
            block_size: 16384,
        }
    }
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid profile: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_profile_is_default() {
        assert_eq!(Profile::parse("{}").unwrap(), Profile::default());
    }

    #[test]
    fn test_nested_sections() {
        let p = Profile::parse(
            r#"{
                "device": "2305012345",
                "tuner": { "frequency_hz": 1090e6, "sample_rate_hz": 8e6, "lna_state": 2 },
                "streaming": { "decimate": true, "decimation_factor": 4 },
                "stream": { "buffer_capacity": 65536 }
            }"#,
        )
        .unwrap();
        assert_eq!(p.device.as_deref(), Some("2305012345"));
        assert_eq!(p.tuner.frequency_hz, 1090e6);
        assert_eq!(p.tuner.gain_reduction_db, 40);
        assert!(p.streaming.decimate);
        assert!(p.streaming.enable_dc_correction);
        assert_eq!(p.stream.buffer_capacity, 65536);
        assert!(p.stream.drop_until_reset);
    }

    #[test]
    fn test_bad_json_is_reported() {
        let err = Profile::parse("{ tuner: }").unwrap_err();
        assert!(err.starts_with("invalid profile"));
    }
}
