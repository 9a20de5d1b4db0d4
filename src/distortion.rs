//! Barrel distortion parameters.
//!
//! Turns the device's optical profile (or the emulation defaults) into the
//! uniform values consumed by the correction shader.

use serde::{Deserialize, Serialize};

use crate::profile::OpticalProfile;

/// Center of the left eye's half of the side-by-side surface, in texcoords.
pub const LEFT_SCREEN_CENTER: [f32; 2] = [0.25, 0.5];
/// Center of the right eye's half of the side-by-side surface, in texcoords.
pub const RIGHT_SCREEN_CENTER: [f32; 2] = [0.75, 0.5];

/// Fixed inverse warp scale: maps one eye's half-surface onto [-1, 1].
const INVERSE_WARP_SCALE: f32 = 4.0;
/// Half-width of one eye in texcoords, the base of the forward warp scale.
const EYE_HALF_EXTENT: f32 = 0.25;

/// `[distortion]` section of `hmd.toml`: values used when no device is
/// attached, plus the initial tunable scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionDefaults {
    pub coefficients: [f32; 4],
    pub scale_factor: f32,
    pub aspect_ratio: f32,
    pub lens_offset: f32,
}

impl Default for DistortionDefaults {
    fn default() -> Self {
        Self {
            coefficients: [1.0, 0.5, 0.25, 0.0],
            scale_factor: 0.8,
            aspect_ratio: 1.6,
            lens_offset: 0.0,
        }
    }
}

/// Shader-ready distortion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionUniforms {
    /// Normalized horizontal offset of each lens center from its eye's
    /// screen center.
    pub lens_center_offset: f32,
    /// `Scale`: maps warped [-1, 1] coordinates back to texcoords.
    pub screen_warp_scale: [f32; 2],
    /// `ScaleIn`: maps texcoords around the lens center to [-1, 1].
    pub screen_warp_scale_inverse: [f32; 2],
    /// `HmdWarpParam`: k0..k3.
    pub radial_distortion: [f32; 4],
    pub aspect_ratio: f32,
    pub scale_factor: f32,
}

impl DistortionUniforms {
    pub fn from_parts(
        lens_offset: f32,
        scale_factor: f32,
        coefficients: [f32; 4],
        aspect_ratio: f32,
    ) -> Self {
        Self {
            lens_center_offset: lens_offset,
            screen_warp_scale: [
                EYE_HALF_EXTENT * scale_factor,
                EYE_HALF_EXTENT * scale_factor * aspect_ratio,
            ],
            screen_warp_scale_inverse: [INVERSE_WARP_SCALE, INVERSE_WARP_SCALE / aspect_ratio],
            radial_distortion: coefficients,
            aspect_ratio,
            scale_factor,
        }
    }

    /// The left lens sits inward (toward the nose) of the left screen center.
    pub fn left_lens_center(&self) -> [f32; 2] {
        [
            LEFT_SCREEN_CENTER[0] + self.lens_center_offset,
            LEFT_SCREEN_CENTER[1],
        ]
    }

    pub fn right_lens_center(&self) -> [f32; 2] {
        [
            RIGHT_SCREEN_CENTER[0] - self.lens_center_offset,
            RIGHT_SCREEN_CENTER[1],
        ]
    }
}

/// Resolves shader parameters from an optical profile and a scale factor.
///
/// Pure: identical inputs give bit-identical output. Fields the profile
/// cannot supply (no profile, zero resolution, zero screen width) fall back
/// to `defaults`.
pub fn resolve(
    profile: Option<&OpticalProfile>,
    scale_factor: f32,
    defaults: &DistortionDefaults,
) -> DistortionUniforms {
    let aspect_ratio = profile
        .and_then(OpticalProfile::aspect_ratio)
        .unwrap_or(defaults.aspect_ratio);
    let lens_offset = profile
        .and_then(OpticalProfile::normalized_lens_offset)
        .unwrap_or(defaults.lens_offset);
    let coefficients = profile
        .map(|p| p.distortion_coefficients)
        .unwrap_or(defaults.coefficients);

    DistortionUniforms::from_parts(lens_offset, scale_factor, coefficients, aspect_ratio)
}

/// Applies the barrel warp to a texcoord, mirroring the correction shader.
pub fn warp_texcoord(
    tc: [f32; 2],
    lens_center: [f32; 2],
    uniforms: &DistortionUniforms,
) -> [f32; 2] {
    let theta = [
        (tc[0] - lens_center[0]) * uniforms.screen_warp_scale_inverse[0],
        (tc[1] - lens_center[1]) * uniforms.screen_warp_scale_inverse[1],
    ];
    let r_sq = theta[0] * theta[0] + theta[1] * theta[1];
    let [k0, k1, k2, k3] = uniforms.radial_distortion;
    let radial = k0 + k1 * r_sq + k2 * r_sq * r_sq + k3 * r_sq * r_sq * r_sq;

    [
        lens_center[0] + uniforms.screen_warp_scale[0] * theta[0] * radial,
        lens_center[1] + uniforms.screen_warp_scale[1] * theta[1] * radial,
    ]
}

/// Tunable distortion state with a cached uniform block.
///
/// Starts from the device profile (or defaults); the control layer may then
/// override the lens offset, scale factor and coefficients. The uniform block
/// is recomputed only after a change.
#[derive(Debug, Clone)]
pub struct DistortionParams {
    lens_offset: f32,
    scale_factor: f32,
    coefficients: [f32; 4],
    aspect_ratio: f32,
    cached: Option<DistortionUniforms>,
}

impl DistortionParams {
    pub fn new(profile: Option<&OpticalProfile>, defaults: &DistortionDefaults) -> Self {
        let base = resolve(profile, defaults.scale_factor, defaults);
        Self {
            lens_offset: base.lens_center_offset,
            scale_factor: base.scale_factor,
            coefficients: base.radial_distortion,
            aspect_ratio: base.aspect_ratio,
            cached: Some(base),
        }
    }

    pub fn lens_offset(&self) -> f32 {
        self.lens_offset
    }

    pub fn set_lens_offset(&mut self, value: f32) {
        self.lens_offset = value;
        self.cached = None;
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn set_scale_factor(&mut self, value: f32) {
        self.scale_factor = value;
        self.cached = None;
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn coefficient(&self, index: usize) -> Option<f32> {
        self.coefficients.get(index).copied()
    }

    /// Returns `false` if `index` is not in `0..4`.
    pub fn set_coefficient(&mut self, index: usize, value: f32) -> bool {
        match self.coefficients.get_mut(index) {
            Some(slot) => {
                *slot = value;
                self.cached = None;
                true
            }
            None => false,
        }
    }

    pub fn uniforms(&mut self) -> DistortionUniforms {
        if let Some(uniforms) = self.cached {
            return uniforms;
        }
        let uniforms = DistortionUniforms::from_parts(
            self.lens_offset,
            self.scale_factor,
            self.coefficients,
            self.aspect_ratio,
        );
        self.cached = Some(uniforms);
        uniforms
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self::new(None, &DistortionDefaults::default())
    }
}
