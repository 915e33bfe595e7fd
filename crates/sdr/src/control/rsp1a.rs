// Copyright 2025-2026 CEMAXECUTER LLC

//! RSP1A / RSP1B control.

use std::any::Any;
use std::sync::Arc;

use super::{Capabilities, ControlCore, DeviceControl};
use crate::api::{SdrApi, UpdateReason};
use crate::error::{Error, Result};
use crate::types::StreamConfig;

const MIN_GAIN_REDUCTION_DB: i32 = 20;
const MAX_GAIN_REDUCTION_DB: i32 = 59;
const MAX_LNA_STATE: u8 = 9;

fn check_gain_reduction(gain_reduction_db: i32) -> Result<()> {
    if !(MIN_GAIN_REDUCTION_DB..=MAX_GAIN_REDUCTION_DB).contains(&gain_reduction_db) {
        return Err(Error::ParameterOutOfRange(format!(
            "gain reduction {} dB (expected {}..={})",
            gain_reduction_db, MIN_GAIN_REDUCTION_DB, MAX_GAIN_REDUCTION_DB
        )));
    }
    Ok(())
}

fn check_lna_state(state: u8) -> Result<()> {
    if state > MAX_LNA_STATE {
        return Err(Error::ParameterOutOfRange(format!(
            "LNA state {} (max {})",
            state, MAX_LNA_STATE
        )));
    }
    Ok(())
}

pub struct Rsp1aControl {
    core: ControlCore,
}

impl Rsp1aControl {
    pub fn new(api: Arc<dyn SdrApi>, config: StreamConfig) -> Self {
        Self {
            core: ControlCore::new(api, config),
        }
    }

    pub fn gain_reduction(&self) -> i32 {
        self.core.params().gain_reduction_db
    }

    pub fn lna_state(&self) -> u8 {
        self.core.params().lna_state
    }

    pub fn set_rf_notch(&mut self, enable: bool) -> Result<()> {
        self.core
            .modify(UpdateReason::RSP1A_RF_NOTCH, |p| p.rsp1a_rf_notch = enable)
    }

    pub fn set_dab_notch(&mut self, enable: bool) -> Result<()> {
        self.core
            .modify(UpdateReason::RSP1A_RF_DAB_NOTCH, |p| p.rsp1a_dab_notch = enable)
    }
}

impl DeviceControl for Rsp1aControl {
    fn core(&self) -> &ControlCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ControlCore {
        &mut self.core
    }

    fn name(&self) -> &'static str {
        "RSP1A"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            gain_reduction: true,
            lna_state: true,
            hdr_mode: false,
            bias_t: true,
        }
    }

    fn check_gain(&self, gain_reduction_db: i32, lna_state: u8) -> Result<()> {
        check_gain_reduction(gain_reduction_db)?;
        check_lna_state(lna_state)
    }

    fn set_gain_reduction(&mut self, gain_reduction_db: i32) -> Result<()> {
        check_gain_reduction(gain_reduction_db)?;
        self.core
            .modify(UpdateReason::TUNER_GR, |p| p.gain_reduction_db = gain_reduction_db)
    }

    fn set_lna_state(&mut self, state: u8) -> Result<()> {
        check_lna_state(state)?;
        self.core.modify(UpdateReason::TUNER_GR, |p| p.lna_state = state)
    }

    fn set_bias_t(&mut self, enable: bool) -> Result<()> {
        self.core
            .modify(UpdateReason::RSP1A_BIAS_T, |p| p.rsp1a_bias_t = enable)
    }

    fn apply_defaults(&mut self) -> Result<()> {
        self.set_frequency(100.0e6)?;
        self.set_sample_rate(2.0e6)?;
        self.set_gain_reduction(40)?;
        self.set_lna_state(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockApi;
    use crate::types::RSP1A_HWVER;

    fn selected() -> (Arc<MockApi>, Rsp1aControl) {
        let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
        let mut ctl = Rsp1aControl::new(api.clone(), StreamConfig::default());
        ctl.open().unwrap();
        ctl.select_device(&api.device(0)).unwrap();
        (api, ctl)
    }

    #[test]
    fn test_gain_controls_update_tuner_group() {
        let (api, mut ctl) = selected();
        ctl.set_gain_reduction(30).unwrap();
        ctl.set_lna_state(4).unwrap();
        assert_eq!(ctl.gain_reduction(), 30);
        assert_eq!(ctl.lna_state(), 4);
        assert_eq!(api.updates(), vec![UpdateReason::TUNER_GR, UpdateReason::TUNER_GR]);
        assert_eq!(api.params(0).gain_reduction_db, 30);
        assert_eq!(api.params(0).lna_state, 4);
    }

    #[test]
    fn test_gain_range_checked() {
        let (api, mut ctl) = selected();
        assert!(matches!(
            ctl.set_gain_reduction(10),
            Err(Error::ParameterOutOfRange(_))
        ));
        assert!(matches!(ctl.set_lna_state(12), Err(Error::ParameterOutOfRange(_))));
        assert!(api.updates().is_empty());
    }

    #[test]
    fn test_notches_and_bias_t() {
        let (api, mut ctl) = selected();
        ctl.set_rf_notch(true).unwrap();
        ctl.set_dab_notch(true).unwrap();
        ctl.set_bias_t(true).unwrap();
        assert_eq!(
            api.updates(),
            vec![
                UpdateReason::RSP1A_RF_NOTCH,
                UpdateReason::RSP1A_RF_DAB_NOTCH,
                UpdateReason::RSP1A_BIAS_T
            ]
        );
        let p = api.params(0);
        assert!(p.rsp1a_rf_notch && p.rsp1a_dab_notch && p.rsp1a_bias_t);
    }

    #[test]
    fn test_hdr_is_ignored() {
        let (api, mut ctl) = selected();
        assert!(!ctl.capabilities().hdr_mode);
        ctl.set_hdr_mode(true).unwrap();
        assert!(api.updates().is_empty());
    }

    #[test]
    fn test_defaults() {
        let (_api, mut ctl) = selected();
        ctl.set_frequency(433.0e6).unwrap();
        ctl.set_gain_reduction(50).unwrap();
        ctl.apply_defaults().unwrap();
        assert_eq!(ctl.frequency(), 100.0e6);
        assert_eq!(ctl.sample_rate(), 2.0e6);
        assert_eq!(ctl.gain_reduction(), 40);
        assert_eq!(ctl.lna_state(), 0);
    }

    #[test]
    fn test_failed_update_keeps_previous_value() {
        let (api, mut ctl) = selected();
        api.fail_on("update");
        let err = ctl.set_gain_reduction(25).unwrap_err();
        assert!(err.to_string().contains("failed to update parameters"));
        assert_eq!(ctl.gain_reduction(), 40);
        assert!(!ctl.last_error().is_empty());
    }
}
