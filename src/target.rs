//! Off-screen stereo render target.
//!
//! Owns the color+depth pair the scene pass renders into. The surface is
//! created lazily on the first scene pass of an HMD tile, because the tile's
//! pixel size is not known when the service initializes.

use log::{debug, info, warn};

use crate::error::GraphicsError;
use crate::gpu::{GraphicsDevice, RenderTargetHandle, TextureDesc, TextureHandle, TextureKind};

/// GPU resources of a built stereo surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoSurface {
    pub color: TextureHandle,
    pub depth: TextureHandle,
    pub target: RenderTargetHandle,
    pub width: u32,
    pub height: u32,
}

impl StereoSurface {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Ready(StereoSurface),
    /// Last build failed; the next scene pass retries.
    Failed { attempts: u32 },
}

/// Stereo surface sized to twice the tile's per-eye pixel size in each axis.
#[derive(Debug)]
pub struct StereoRenderTarget {
    state: SurfaceState,
    bound: bool,
}

impl StereoRenderTarget {
    pub fn new() -> Self {
        Self {
            state: SurfaceState::Uninitialized,
            bound: false,
        }
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn surface(&self) -> Option<&StereoSurface> {
        match &self.state {
            SurfaceState::Ready(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SurfaceState::Ready(_))
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Surface size required by a tile of the given per-eye pixel size.
    pub fn size_for_tile(pixel_size: [u32; 2]) -> (u32, u32) {
        (pixel_size[0] * 2, pixel_size[1] * 2)
    }

    /// Makes sure a surface matching `pixel_size` exists.
    ///
    /// Uninitialized and failed states build a new surface; a ready surface
    /// of the wrong size (the tile was resized) is released and rebuilt.
    pub fn prepare(
        &mut self,
        gpu: &mut dyn GraphicsDevice,
        pixel_size: [u32; 2],
    ) -> Result<(), GraphicsError> {
        let wanted = Self::size_for_tile(pixel_size);
        let current = self.surface().map(StereoSurface::size);

        match current {
            Some(size) if size == wanted => Ok(()),
            Some(size) => {
                info!(
                    "Tile resized, rebuilding stereo surface {}x{} -> {}x{}",
                    size.0, size.1, wanted.0, wanted.1
                );
                self.release(gpu);
                self.build(gpu, wanted)
            }
            None => self.build(gpu, wanted),
        }
    }

    fn build(
        &mut self,
        gpu: &mut dyn GraphicsDevice,
        (width, height): (u32, u32),
    ) -> Result<(), GraphicsError> {
        let color = gpu.create_texture(&TextureDesc {
            label: "HMD Stereo Color",
            width,
            height,
            kind: TextureKind::Color,
        });
        let depth = gpu.create_texture(&TextureDesc {
            label: "HMD Stereo Depth",
            width,
            height,
            kind: TextureKind::Depth,
        });
        if let Err(err) = gpu.check_error() {
            gpu.destroy_texture(color);
            gpu.destroy_texture(depth);
            self.record_failure();
            return Err(err);
        }

        let target = gpu.create_render_target(color, depth);
        if let Err(err) = gpu.check_error() {
            gpu.destroy_render_target(target);
            gpu.destroy_texture(color);
            gpu.destroy_texture(depth);
            self.record_failure();
            return Err(err);
        }

        info!("Stereo surface created: {}x{}", width, height);
        self.state = SurfaceState::Ready(StereoSurface {
            color,
            depth,
            target,
            width,
            height,
        });
        Ok(())
    }

    fn record_failure(&mut self) {
        let attempts = match self.state {
            SurfaceState::Failed { attempts } => attempts.saturating_add(1),
            _ => 1,
        };
        self.state = SurfaceState::Failed { attempts };
    }

    /// Releases any built surface and records a failed build, e.g. when a
    /// resource created alongside the surface could not be built.
    pub fn mark_failed(&mut self, gpu: &mut dyn GraphicsDevice) {
        self.release(gpu);
        self.record_failure();
    }

    /// Redirects drawing into the stereo surface. Returns `false` if there
    /// is no surface or it is already bound.
    pub fn bind(&mut self, gpu: &mut dyn GraphicsDevice) -> bool {
        let Some(surface) = self.surface().copied() else {
            return false;
        };
        if self.bound {
            warn!("Stereo surface bound twice in one scene pass");
            return false;
        }
        gpu.bind_render_target(surface.target);
        self.bound = true;
        true
    }

    /// Restores the destination active before [`StereoRenderTarget::bind`].
    pub fn unbind(&mut self, gpu: &mut dyn GraphicsDevice) -> bool {
        if !self.bound {
            debug!("Stereo surface not bound, nothing to unbind");
            return false;
        }
        if let Some(surface) = self.surface() {
            gpu.unbind_render_target(surface.target);
        }
        self.bound = false;
        true
    }

    /// Clears the surface so the next scene pass starts clean.
    pub fn clear(&mut self, gpu: &mut dyn GraphicsDevice) {
        if let Some(surface) = self.surface() {
            gpu.clear_render_target(surface.target);
        }
    }

    /// Destroys the surface's GPU resources.
    pub fn release(&mut self, gpu: &mut dyn GraphicsDevice) {
        if self.bound {
            self.unbind(gpu);
        }
        if let SurfaceState::Ready(surface) = self.state {
            gpu.destroy_render_target(surface.target);
            gpu.destroy_texture(surface.color);
            gpu.destroy_texture(surface.depth);
            debug!("Stereo surface released");
        }
        self.state = SurfaceState::Uninitialized;
    }
}

impl Default for StereoRenderTarget {
    fn default() -> Self {
        Self::new()
    }
}
