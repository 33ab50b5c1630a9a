//! Device configuration.

use crate::native::{self, DeviceInfo, DeviceType};

/// Which compute backend the render session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// OptiX, then CUDA, then CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Optix,
}

/// Configuration for creating a [`Device`](crate::Device).
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Preferred compute backend.
    pub device_preference: DevicePreference,
    /// Render tile edge length in pixels.
    pub tile_size: u32,
    /// Let the session pick tile sizes on its own.
    pub use_auto_tile: bool,
    /// Session sample count before the first frame sets its own.
    pub default_samples: u32,
    /// Replaces the enumerated native devices when set.
    pub native_devices: Option<Vec<DeviceInfo>>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_preference: DevicePreference::Auto,
            tile_size: 2048,
            use_auto_tile: false,
            default_samples: 1,
            native_devices: None,
        }
    }
}

impl DeviceConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_device_preference(mut self, preference: DevicePreference) -> Self {
        self.device_preference = preference;
        self
    }

    #[must_use]
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    #[must_use]
    pub fn with_auto_tile(mut self, enabled: bool) -> Self {
        self.use_auto_tile = enabled;
        self
    }

    #[must_use]
    pub fn with_default_samples(mut self, samples: u32) -> Self {
        self.default_samples = samples;
        self
    }

    /// Use this device list instead of enumerating the machine.
    #[must_use]
    pub fn with_native_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.native_devices = Some(devices);
        self
    }

    /// Resolves the device to render on.
    ///
    /// An explicit preference that is not available falls back to the
    /// automatic order with a warning.
    pub fn select_device(&self) -> Option<DeviceInfo> {
        let devices = self
            .native_devices
            .clone()
            .unwrap_or_else(native::available_devices);
        let wanted = match self.device_preference {
            DevicePreference::Auto => None,
            DevicePreference::Cpu => Some(DeviceType::Cpu),
            DevicePreference::Cuda => Some(DeviceType::Cuda),
            DevicePreference::Optix => Some(DeviceType::Optix),
        };
        if let Some(wanted) = wanted {
            if let Some(found) = devices.iter().find(|d| d.device_type == wanted) {
                return Some(found.clone());
            }
            log::warn!(
                "requested {} device is not available, falling back",
                wanted.as_str()
            );
        }
        native::select_device(&devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(device_type: DeviceType) -> DeviceInfo {
        DeviceInfo {
            device_type,
            description: String::new(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::new();
        assert_eq!(config.tile_size, 2048);
        assert!(!config.use_auto_tile);
        assert_eq!(config.default_samples, 1);
    }

    #[test]
    fn test_explicit_preference() {
        let config = DeviceConfig::new()
            .with_device_preference(DevicePreference::Cpu)
            .with_native_devices(vec![device(DeviceType::Optix), device(DeviceType::Cpu)]);
        assert_eq!(config.select_device().unwrap().device_type, DeviceType::Cpu);
    }

    #[test]
    fn test_missing_preference_falls_back() {
        let config = DeviceConfig::new()
            .with_device_preference(DevicePreference::Optix)
            .with_native_devices(vec![device(DeviceType::Cpu)]);
        assert_eq!(config.select_device().unwrap().device_type, DeviceType::Cpu);
    }

    #[test]
    fn test_no_devices() {
        let config = DeviceConfig::new().with_native_devices(Vec::new());
        assert!(config.select_device().is_none());
    }
}
