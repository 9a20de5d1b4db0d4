//! Render camera and its frame observers.

use std::sync::{Arc, Mutex, PoisonError};

use glam::{Mat4, Quat, Vec3, Vec4};
use log::debug;

use crate::draw::{DrawContext, Eye};

/// Default interpupillary distance in meters.
pub const DEFAULT_IPD: f32 = 0.063;

/// Hooks the camera fires around each of its draw invocations.
pub trait FrameObserver: Send {
    fn on_frame_begin(&mut self, ctx: &mut DrawContext<'_>);
    fn on_frame_end(&mut self, ctx: &mut DrawContext<'_>);
}

pub type SharedObserver = Arc<Mutex<dyn FrameObserver>>;
pub type SharedCamera = Arc<Mutex<Camera>>;

pub struct Camera {
    pub position: Vec3,
    pub orientation: Quat,
    /// Signed half distance between the eye cameras. Each eye sits at
    /// `-side * eye_separation` along the head's x axis, so negative values
    /// put the left eye on the left.
    pub eye_separation: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    observers: Vec<SharedObserver>,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            eye_separation: -DEFAULT_IPD / 2.0,
            fov_y: 90.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
            observers: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedCamera {
        Arc::new(Mutex::new(self))
    }

    /// Registers `observer`. Registering the same observer twice is a no-op;
    /// returns whether it was added.
    pub fn add_observer(&mut self, observer: SharedObserver) -> bool {
        if self.observers.iter().any(|o| same_observer(o, &observer)) {
            debug!("Observer already registered with camera");
            return false;
        }
        self.observers.push(observer);
        true
    }

    pub fn remove_observer(&mut self, observer: &SharedObserver) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !same_observer(o, observer));
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Runs every observer's `on_frame_begin`, in registration order.
    pub fn begin_draw(&self, ctx: &mut DrawContext<'_>) {
        for observer in &self.observers {
            observer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_frame_begin(ctx);
        }
    }

    /// Runs every observer's `on_frame_end`, in registration order.
    pub fn end_draw(&self, ctx: &mut DrawContext<'_>) {
        for observer in &self.observers {
            observer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_frame_end(ctx);
        }
    }

    /// Horizontal offset of `eye` from the head center, in head space.
    pub fn eye_offset(&self, eye: Eye) -> f32 {
        -eye.side() * self.eye_separation
    }

    pub fn eye_position(&self, eye: Eye) -> Vec3 {
        self.position + self.orientation * Vec3::new(self.eye_offset(eye), 0.0, 0.0)
    }

    pub fn view_matrix(&self, eye: Eye) -> Mat4 {
        Mat4::from_quat(self.orientation.inverse())
            * Mat4::from_translation(-self.eye_position(eye))
    }

    /// Off-axis projection for one eye. The projection center moves by
    /// `2 * lens_offset` in NDC (toward the nose for the left eye) so the
    /// scene's optical center lands on the lens center.
    pub fn eye_projection(&self, eye: Eye, aspect: f32, lens_offset: f32) -> Mat4 {
        let shift_x = match eye {
            Eye::Left => lens_offset,
            Eye::Right => -lens_offset,
            Eye::Cyclop => 0.0,
        };

        let near = self.near;
        let far = self.far;
        let top = near * (self.fov_y / 2.0).tan();
        let bottom = -top;

        let half_width = top * aspect;
        let shift_near = shift_x * half_width * 2.0;

        let left = -half_width - shift_near;
        let right = half_width - shift_near;

        let x_scale = 2.0 * near / (right - left);
        let y_scale = 2.0 * near / (top - bottom);
        let x_offset = (right + left) / (right - left);
        let y_offset = (top + bottom) / (top - bottom);
        let z_scale = far / (near - far);
        let z_offset = near * far / (near - far);

        Mat4::from_cols(
            Vec4::new(x_scale, 0.0, 0.0, 0.0),
            Vec4::new(0.0, y_scale, 0.0, 0.0),
            Vec4::new(x_offset, y_offset, z_scale, -1.0),
            Vec4::new(0.0, 0.0, z_offset, 0.0),
        )
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

fn same_observer(a: &SharedObserver, b: &SharedObserver) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
