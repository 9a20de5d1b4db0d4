//! Logger initialization.
//!
//! Android builds log through `android_logger`; everything else uses
//! `env_logger`. Both sit behind the `log` facade.

use serde::{Deserialize, Serialize};
use std::sync::Once;

/// `[logging]` section of `hmd.toml`.
///
/// `filter` follows the `env_logger` filter syntax (e.g. "info",
/// "hmd_postprocess=debug,wgpu=warn").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
}

static INIT: Once = Once::new();

/// Initializes the global logger once. Later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        install(config);
        log::debug!("logging initialized");
    });
}

#[cfg(target_os = "android")]
fn install(config: &LoggingConfig) {
    let level = config
        .filter
        .as_deref()
        .and_then(|f| f.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag("HmdPostprocess"),
    );
}

#[cfg(not(target_os = "android"))]
fn install(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();

    if let Some(filter) = &config.filter {
        builder.parse_filters(filter);
    } else if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    // A host may already have installed a logger.
    if builder.try_init().is_err() {
        log::debug!("logger already installed, keeping it");
    }
}
