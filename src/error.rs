//! Error types for the HMD postprocessing pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the graphics device after a setup or draw call.
///
/// These never escape a frame callback: the pipeline logs them and retries
/// initialization on the next frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphicsError {
    /// Texture allocation failed.
    #[error("texture creation failed: {0}")]
    Texture(String),

    /// Render target assembly failed.
    #[error("render target creation failed: {0}")]
    RenderTarget(String),

    /// Shader compilation or program linking failed.
    #[error("program creation failed: {0}")]
    Program(String),

    /// A call was issued in a state the device cannot honor.
    #[error("invalid graphics call: {0}")]
    InvalidCall(String),
}

/// Errors loading `hmd.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown device preset `{0}`")]
    UnknownPreset(String),
}

/// Errors surfaced to the scripting/control layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("distortion coefficient index {0} out of range (expected 0..4)")]
    DistortionIndex(usize),
}
