//! `hmd.toml` configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::display::DisplayConfig;
use crate::distortion::DistortionDefaults;
use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::profile::{DeviceGeometryProvider, EmulatedDevice, FixedDevice, OpticalProfile};

/// Default config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "hmd.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HmdConfig {
    pub logging: LoggingConfig,
    pub distortion: DistortionDefaults,
    pub device: DeviceConfig,
    pub display: DisplayConfig,
}

/// Headset selection. An explicit `profile` wins over `preset`; neither
/// means no headset (emulation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub preset: Option<String>,
    pub profile: Option<OpticalProfile>,
}

impl HmdConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads `hmd.toml` from the working directory, or the defaults if it is
    /// missing or unreadable.
    pub fn load_or_default() -> Self {
        match Self::load_from_file(CONFIG_FILE) {
            Ok(config) => config,
            Err(ConfigError::Io { .. }) => Self::default(),
            Err(err) => {
                log::warn!("Ignoring {}: {}", CONFIG_FILE, err);
                Self::default()
            }
        }
    }

    /// Applies environment overrides; environment wins over the file.
    ///
    /// * `HMD_SCALE_FACTOR` - initial distortion scale factor
    /// * `HMD_LENS_OFFSET` - lens offset used when no headset is attached
    /// * `HMD_LOG` - log filter
    pub fn merge_with_env(&mut self) {
        if let Ok(val) = std::env::var("HMD_SCALE_FACTOR") {
            if let Ok(scale) = val.parse::<f32>() {
                self.distortion.scale_factor = scale;
            }
        }
        if let Ok(val) = std::env::var("HMD_LENS_OFFSET") {
            if let Ok(offset) = val.parse::<f32>() {
                self.distortion.lens_offset = offset;
            }
        }
        if let Ok(filter) = std::env::var("HMD_LOG") {
            self.logging.filter = Some(filter);
        }
    }

    /// `load_or_default` followed by `merge_with_env`.
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }

    /// Geometry source for the configured headset.
    pub fn geometry_provider(&self) -> Result<Box<dyn DeviceGeometryProvider>, ConfigError> {
        if let Some(profile) = self.device.profile {
            return Ok(Box::new(FixedDevice(profile)));
        }
        match &self.device.preset {
            Some(name) => Ok(Box::new(FixedDevice(OpticalProfile::preset(name)?))),
            None => Ok(Box::new(EmulatedDevice)),
        }
    }
}
