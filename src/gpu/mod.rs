//! Graphics device seam.
//!
//! The pipeline talks to the GPU only through [`GraphicsDevice`]. The trait
//! keeps the bind/draw protocol explicit (render target stack, transform
//! stack, shared uniform state) so the ordering rules of the correction pass
//! can be checked without a GPU.

mod wgpu_device;

#[cfg(test)]
pub(crate) mod recording;

pub use wgpu_device::{TransformState, WgpuDevice, STEREO_COLOR_FORMAT, STEREO_DEPTH_FORMAT};

use crate::error::GraphicsError;

/// Number of texture units a device exposes to programs.
pub const MAX_TEXTURE_UNITS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Color,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub kind: TextureKind,
}

/// WGSL source of a fullscreen postprocess program (`vs_main`/`fs_main`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSource {
    pub label: &'static str,
    pub wgsl: &'static str,
}

/// Named uniforms of the distortion program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    LensCenter,
    ScreenCenter,
    Scale,
    ScaleIn,
    HmdWarpParam,
    /// Texture unit the program samples from.
    Texture0,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
}

/// Textured quad in normalized device coordinates.
///
/// `position` is `(x, y, w, h)` with `(x, y)` the bottom-left corner;
/// `texcoords` is `(u, v, uw, vh)` in GL convention (v grows upward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeQuad {
    pub position: [f32; 4],
    pub texcoords: [f32; 4],
}

impl EyeQuad {
    /// Left half of the screen, sampling the left half of the surface.
    pub const LEFT: Self = Self {
        position: [-1.0, -1.0, 1.0, 2.0],
        texcoords: [0.0, 0.0, 0.5, 1.0],
    };

    /// Right half of the screen, sampling the right half of the surface.
    pub const RIGHT: Self = Self {
        position: [0.0, -1.0, 1.0, 2.0],
        texcoords: [0.5, 0.0, 0.5, 1.0],
    };

    /// Corners as `(x, y, u, v)` in counter-clockwise order from bottom-left.
    pub fn corners(&self) -> [[f32; 4]; 4] {
        let [x, y, w, h] = self.position;
        let [u, v, uw, vh] = self.texcoords;
        [
            [x, y, u, v],
            [x + w, y, u + uw, v],
            [x + w, y + h, u + uw, v + vh],
            [x, y + h, u, v + vh],
        ]
    }
}

/// GPU operations used by the HMD pipeline.
///
/// Creation calls do not return errors directly; failures are picked up by
/// the following [`GraphicsDevice::check_error`], which returns and clears
/// the first pending error.
pub trait GraphicsDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle;
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Assembles a color+depth pair into a render destination.
    fn create_render_target(
        &mut self,
        color: TextureHandle,
        depth: TextureHandle,
    ) -> RenderTargetHandle;
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    fn create_program(&mut self, source: &ProgramSource) -> ProgramHandle;
    fn destroy_program(&mut self, program: ProgramHandle);

    fn check_error(&mut self) -> Result<(), GraphicsError>;

    /// Redirects subsequent drawing into `target`, remembering the previous
    /// destination.
    fn bind_render_target(&mut self, target: RenderTargetHandle);
    /// Restores the destination that was active before the matching bind.
    fn unbind_render_target(&mut self, target: RenderTargetHandle);
    fn clear_render_target(&mut self, target: RenderTargetHandle);

    /// Saves modelview and projection and resets both to identity.
    fn push_transforms(&mut self);
    fn pop_transforms(&mut self);

    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);
    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue);
    fn draw_quad(&mut self, quad: &EyeQuad);
}
