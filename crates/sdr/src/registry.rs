// Copyright 2025-2026 CEMAXECUTER LLC

//! Hardware version → [`DeviceControl`] factory table.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::api::SdrApi;
use crate::control::{DeviceControl, Rsp1aControl, RspDxR2Control};
use crate::error::{Error, Result};
use crate::types::{StreamConfig, RSP1A_HWVER, RSP1B_HWVER, RSPDXR2_HWVER};

/// Builds a control for one hardware family on the given vendor session.
pub type DeviceFactory =
    Box<dyn Fn(Arc<dyn SdrApi>, StreamConfig) -> Box<dyn DeviceControl> + Send + Sync>;

fn rsp1a_control(api: Arc<dyn SdrApi>, config: StreamConfig) -> Box<dyn DeviceControl> {
    Box::new(Rsp1aControl::new(api, config))
}

fn rspdxr2_control(api: Arc<dyn SdrApi>, config: StreamConfig) -> Box<dyn DeviceControl> {
    Box::new(RspDxR2Control::new(api, config))
}

pub struct DeviceRegistry {
    factories: RwLock<HashMap<u8, DeviceFactory>>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in families: RSP1A, RSP1B (RSP1A control)
    /// and RSPdxR2.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_factory(RSP1A_HWVER, Box::new(rsp1a_control));
        registry.register_factory(RSP1B_HWVER, Box::new(rsp1a_control));
        registry.register_factory(RSPDXR2_HWVER, Box::new(rspdxr2_control));
        registry
    }

    /// Process-wide registry, populated with the defaults on first use.
    pub fn global() -> &'static DeviceRegistry {
        static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DeviceRegistry::with_defaults)
    }

    /// Register `factory` for `hw_ver`, replacing any previous one.
    pub fn register_factory(&self, hw_ver: u8, factory: DeviceFactory) {
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        if factories.insert(hw_ver, factory).is_some() {
            log::debug!("replaced device factory for hardware version {}", hw_ver);
        }
    }

    pub fn create_device_control(
        &self,
        hw_ver: u8,
        api: Arc<dyn SdrApi>,
    ) -> Result<Box<dyn DeviceControl>> {
        self.create_with_config(hw_ver, api, StreamConfig::default())
    }

    pub fn create_with_config(
        &self,
        hw_ver: u8,
        api: Arc<dyn SdrApi>,
        config: StreamConfig,
    ) -> Result<Box<dyn DeviceControl>> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let factory = factories
            .get(&hw_ver)
            .ok_or(Error::UnsupportedDevice(hw_ver))?;
        Ok(factory(api, config))
    }

    pub fn is_registered(&self, hw_ver: u8) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&hw_ver)
    }

    pub fn clear_factories(&self) {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockApi;

    fn api() -> Arc<dyn SdrApi> {
        Arc::new(MockApi::new())
    }

    #[test]
    fn test_rsp1a_factory_builds_rsp1a_control() {
        let registry = DeviceRegistry::with_defaults();
        let ctl = registry.create_device_control(RSP1A_HWVER, api()).unwrap();
        assert!(ctl.as_any().downcast_ref::<Rsp1aControl>().is_some());
        assert!(ctl.as_any().downcast_ref::<RspDxR2Control>().is_none());
    }

    #[test]
    fn test_rsp1b_shares_rsp1a_control() {
        let registry = DeviceRegistry::with_defaults();
        let ctl = registry.create_device_control(RSP1B_HWVER, api()).unwrap();
        assert!(ctl.as_any().is::<Rsp1aControl>());
    }

    #[test]
    fn test_rspdxr2_factory() {
        let registry = DeviceRegistry::with_defaults();
        let ctl = registry.create_device_control(RSPDXR2_HWVER, api()).unwrap();
        assert!(ctl.as_any().is::<RspDxR2Control>());
        assert!(ctl.capabilities().hdr_mode);
    }

    #[test]
    fn test_unknown_hardware_is_rejected() {
        let registry = DeviceRegistry::with_defaults();
        let err = registry.create_device_control(123, api()).err().unwrap();
        assert!(matches!(err, Error::UnsupportedDevice(123)));
        assert!(err.to_string().contains("123"));
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = DeviceRegistry::new();
        registry.register_factory(42, Box::new(rsp1a_control));
        registry.register_factory(42, Box::new(rspdxr2_control));
        let ctl = registry.create_device_control(42, api()).unwrap();
        assert!(ctl.as_any().is::<RspDxR2Control>());
    }

    #[test]
    fn test_clear_factories() {
        let registry = DeviceRegistry::with_defaults();
        assert!(registry.is_registered(RSP1A_HWVER));
        registry.clear_factories();
        assert!(!registry.is_registered(RSP1A_HWVER));
        assert!(registry.create_device_control(RSP1A_HWVER, api()).is_err());
    }

    #[test]
    fn test_global_has_defaults() {
        let registry = DeviceRegistry::global();
        assert!(registry.is_registered(RSP1A_HWVER));
        assert!(registry.is_registered(RSPDXR2_HWVER));
        assert!(!registry.is_registered(123));
    }

    #[test]
    fn test_config_reaches_control() {
        let registry = DeviceRegistry::with_defaults();
        let config = StreamConfig {
            buffer_capacity: 512,
            ..StreamConfig::default()
        };
        let ctl = registry
            .create_with_config(RSP1A_HWVER, api(), config)
            .unwrap();
        assert_eq!(ctl.dispatcher().buffer().capacity(), 511);
        assert_eq!(ctl.core().config().buffer_capacity, 512);
    }
}
