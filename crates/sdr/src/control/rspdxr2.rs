// Copyright 2025-2026 CEMAXECUTER LLC

//! RSPdxR2 control. HDR mode and bias-T live in the `ext1` update word.

use std::any::Any;
use std::sync::Arc;

use super::{Capabilities, ControlCore, DeviceControl};
use crate::api::{SdrApi, UpdateReason};
use crate::error::Result;
use crate::types::StreamConfig;

pub struct RspDxR2Control {
    core: ControlCore,
}

impl RspDxR2Control {
    pub fn new(api: Arc<dyn SdrApi>, config: StreamConfig) -> Self {
        Self {
            core: ControlCore::new(api, config),
        }
    }

    pub fn hdr_mode(&self) -> bool {
        self.core.params().rspdx_hdr_enable
    }

    pub fn bias_t(&self) -> bool {
        self.core.params().rspdx_bias_t
    }
}

impl DeviceControl for RspDxR2Control {
    fn core(&self) -> &ControlCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ControlCore {
        &mut self.core
    }

    fn name(&self) -> &'static str {
        "RSPdxR2"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            hdr_mode: true,
            bias_t: true,
            ..Capabilities::default()
        }
    }

    fn set_hdr_mode(&mut self, enable: bool) -> Result<()> {
        self.core
            .modify(UpdateReason::RSPDX_HDR_ENABLE, |p| p.rspdx_hdr_enable = enable)
    }

    fn set_bias_t(&mut self, enable: bool) -> Result<()> {
        self.core
            .modify(UpdateReason::RSPDX_BIAS_T, |p| p.rspdx_bias_t = enable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockApi;
    use crate::types::RSPDXR2_HWVER;

    #[test]
    fn test_hdr_and_bias_t_use_extension_bits() {
        let api = Arc::new(MockApi::with_device("DX0001", RSPDXR2_HWVER));
        let mut ctl = RspDxR2Control::new(api.clone(), StreamConfig::default());
        ctl.open().unwrap();
        ctl.select_device(&api.device(0)).unwrap();

        ctl.set_hdr_mode(true).unwrap();
        ctl.set_bias_t(true).unwrap();
        assert!(ctl.hdr_mode());
        assert!(ctl.bias_t());

        let updates = api.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].reason, 0);
        assert_eq!(updates[0].ext1, UpdateReason::RSPDX_HDR_ENABLE.ext1);
        assert_eq!(updates[1].ext1, UpdateReason::RSPDX_BIAS_T.ext1);
        assert!(api.params(0).rspdx_hdr_enable);
    }

    #[test]
    fn test_gain_controls_are_noops() {
        let api = Arc::new(MockApi::with_device("DX0001", RSPDXR2_HWVER));
        let mut ctl = RspDxR2Control::new(api.clone(), StreamConfig::default());
        ctl.open().unwrap();
        ctl.select_device(&api.device(0)).unwrap();

        let caps = ctl.capabilities();
        assert!(!caps.gain_reduction && !caps.lna_state);
        ctl.set_gain_reduction(30).unwrap();
        ctl.set_lna_state(3).unwrap();
        assert!(api.updates().is_empty());
    }

    #[test]
    fn test_defaults_tune_without_device() {
        let api = Arc::new(MockApi::new());
        let mut ctl = RspDxR2Control::new(api, StreamConfig::default());
        ctl.apply_defaults().unwrap();
        assert_eq!(ctl.frequency(), 100.0e6);
        assert_eq!(ctl.sample_rate(), 2.0e6);
    }
}
