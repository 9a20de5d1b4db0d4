//! Device optical geometry.
//!
//! The HMD reports its display and lens layout once at startup. Everything the
//! distortion pass needs is derived from this profile, or from the emulation
//! defaults when no hardware is attached.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Display and lens geometry reported by the headset.
///
/// Distances share one unit (the DK1 preset uses meters); only their ratios
/// reach the shader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalProfile {
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub eye_to_screen_distance: f32,
    pub horizontal_screen_size: f32,
    pub vertical_screen_size: f32,
    /// k0..k3 of the radial warp `r' = r * (k0 + k1 r^2 + k2 r^4 + k3 r^6)`.
    pub distortion_coefficients: [f32; 4],
    /// Distance between the two lens centers.
    pub lens_separation_distance: f32,
}

impl OpticalProfile {
    /// Oculus Rift DK1.
    pub const DK1: Self = Self {
        horizontal_resolution: 1280,
        vertical_resolution: 800,
        eye_to_screen_distance: 0.041,
        horizontal_screen_size: 0.14976,
        vertical_screen_size: 0.0936,
        distortion_coefficients: [1.0, 0.22, 0.24, 0.0],
        lens_separation_distance: 0.0635,
    };

    /// Looks up a built-in profile by name (case-insensitive).
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "dk1" | "rift-dk1" => Ok(Self::DK1),
            _ => Err(ConfigError::UnknownPreset(name.to_string())),
        }
    }

    /// Display aspect ratio, `None` if the reported resolution is unusable.
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.horizontal_resolution == 0 || self.vertical_resolution == 0 {
            return None;
        }
        Some(self.horizontal_resolution as f32 / self.vertical_resolution as f32)
    }

    /// Lens center offset from each eye's screen center, in normalized
    /// screen units: `0.5 - separation / screen_width`.
    pub fn normalized_lens_offset(&self) -> Option<f32> {
        if self.horizontal_screen_size <= 0.0 {
            return None;
        }
        Some(0.5 - self.lens_separation_distance / self.horizontal_screen_size)
    }

    pub(crate) fn log_summary(&self) {
        info!(
            "HMD resolution: {} x {}",
            self.horizontal_resolution, self.vertical_resolution
        );
        info!("Eye to screen distance: {}", self.eye_to_screen_distance);
        info!(
            "Screen size: {} {}",
            self.horizontal_screen_size, self.vertical_screen_size
        );
        info!("Lens separation distance: {}", self.lens_separation_distance);
        if let Some(offset) = self.normalized_lens_offset() {
            info!("Normalized lens offset: {}", offset);
        }
    }
}

/// Source of the headset's optical geometry, queried once at startup.
pub trait DeviceGeometryProvider: Send {
    /// `None` means no headset is attached and emulation defaults apply.
    fn optical_profile(&self) -> Option<OpticalProfile>;
}

/// No hardware attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmulatedDevice;

impl DeviceGeometryProvider for EmulatedDevice {
    fn optical_profile(&self) -> Option<OpticalProfile> {
        None
    }
}

/// A headset whose geometry is known up front (config file or preset).
#[derive(Debug, Clone, Copy)]
pub struct FixedDevice(pub OpticalProfile);

impl DeviceGeometryProvider for FixedDevice {
    fn optical_profile(&self) -> Option<OpticalProfile> {
        Some(self.0)
    }
}
