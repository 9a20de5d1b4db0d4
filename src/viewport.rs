//! Per-eye viewport partitioning of the side-by-side stereo surface.

use crate::draw::Eye;

/// Pixel rectangle inside a render destination.
///
/// `width`/`height` are the far edge (max corner) in the side-by-side
/// layout's convention, so the right eye of a `W`-wide surface is
/// `(W/2, 0, W, H)`. Use [`EyeViewport::extent`] for the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EyeViewport {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

impl EyeViewport {
    pub const fn new(origin_x: u32, origin_y: u32, width: u32, height: u32) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }

    /// Full destination of the given size.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Size of the rectangle (max corner minus origin).
    pub fn extent(&self) -> (u32, u32) {
        (
            self.width.saturating_sub(self.origin_x),
            self.height.saturating_sub(self.origin_y),
        )
    }

    pub fn aspect(&self) -> f32 {
        let (w, h) = self.extent();
        if h == 0 {
            return 1.0;
        }
        w as f32 / h as f32
    }
}

/// Viewport for one eye's scene pass inside a `surface_width` x
/// `surface_height` stereo surface. Eyes other than left/right get no
/// override.
pub fn partition(eye: Eye, surface_width: u32, surface_height: u32) -> Option<EyeViewport> {
    let half = surface_width / 2;
    match eye {
        Eye::Left => Some(EyeViewport::new(0, 0, half, surface_height)),
        Eye::Right => Some(EyeViewport::new(half, 0, surface_width, surface_height)),
        Eye::Cyclop => None,
    }
}
