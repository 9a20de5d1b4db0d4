//! Per-draw context handed to frame observers by the host frame loop.

use crate::display::TileConfig;
use crate::gpu::GraphicsDevice;
use crate::viewport::EyeViewport;

/// Phase of the host's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTask {
    /// 3D scene rendering, once per eye.
    Scene,
    /// 2D overlay rendering after the scene.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
    /// Combined, non-per-eye invocation.
    Cyclop,
}

impl Eye {
    /// Sign of the eye's horizontal offset from the head center.
    pub fn side(self) -> f32 {
        match self {
            Eye::Left => -1.0,
            Eye::Right => 1.0,
            Eye::Cyclop => 0.0,
        }
    }
}

pub struct DrawContext<'a> {
    pub tile: &'a TileConfig,
    pub task: DrawTask,
    pub eye: Eye,
    /// Destination rectangle; observers may override it.
    pub viewport: EyeViewport,
    pub gpu: &'a mut dyn GraphicsDevice,
}

impl<'a> DrawContext<'a> {
    pub fn new(
        tile: &'a TileConfig,
        task: DrawTask,
        eye: Eye,
        viewport: EyeViewport,
        gpu: &'a mut dyn GraphicsDevice,
    ) -> Self {
        Self {
            tile,
            task,
            eye,
            viewport,
            gpu,
        }
    }
}
