//! Display tile configuration.

use log::info;
use serde::{Deserialize, Serialize};

/// Tile flag bit marking tiles that get HMD barrel correction during
/// postprocessing. Checking a bit at render time is cheaper than reading the
/// tile settings every frame.
pub const HMD_POSTPROCESS_FLAG: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoMode {
    #[default]
    Mono,
    SideBySide,
}

/// One output tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileConfig {
    pub name: String,
    /// Per-eye pixel size `[width, height]`.
    pub pixel_size: [u32; 2],
    /// Setting read at startup; see [`DisplayConfig::enable_hmd_tiles`].
    #[serde(default)]
    pub hmd_enabled: bool,
    #[serde(default)]
    pub stereo_mode: StereoMode,
    #[serde(skip)]
    pub flags: u32,
    #[serde(skip)]
    pub is_hmd: bool,
}

impl TileConfig {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            pixel_size: [width, height],
            hmd_enabled: false,
            stereo_mode: StereoMode::Mono,
            flags: 0,
            is_hmd: false,
        }
    }

    pub fn with_hmd_enabled(mut self, enabled: bool) -> Self {
        self.hmd_enabled = enabled;
        self
    }

    pub fn wants_hmd_postprocess(&self) -> bool {
        self.flags & HMD_POSTPROCESS_FLAG != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub tiles: Vec<TileConfig>,
}

impl DisplayConfig {
    /// Marks every tile whose `hmd_enabled` setting is on: sets the
    /// postprocess flag, forces side-by-side stereo and tags the tile as an
    /// HMD output. Returns how many tiles were enabled.
    pub fn enable_hmd_tiles(&mut self) -> usize {
        let mut enabled = 0;
        for tile in self.tiles.iter_mut().filter(|t| t.hmd_enabled) {
            tile.flags |= HMD_POSTPROCESS_FLAG;
            tile.stereo_mode = StereoMode::SideBySide;
            tile.is_hmd = true;
            enabled += 1;
            info!("HMD postprocessing enabled for tile {}", tile.name);
        }
        enabled
    }

    pub fn tile(&self, name: &str) -> Option<&TileConfig> {
        self.tiles.iter().find(|t| t.name == name)
    }

    pub fn tile_mut(&mut self, name: &str) -> Option<&mut TileConfig> {
        self.tiles.iter_mut().find(|t| t.name == name)
    }
}
