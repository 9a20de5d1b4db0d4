//! Head orientation input.
//!
//! Sensor fusion runs outside the render loop. Producers publish into a
//! [`FusedOrientation`] mailbox; the tracking bridge reads the most recent
//! sample once per tick and never waits for a new one.

use std::sync::{Arc, Mutex, PoisonError};

use glam::Quat;
use log::info;

/// Fused head orientation as reported by the sensor, `(w, x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl OrientationSample {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Both conventions are right-handed, +Y up, -Z forward, so the
    /// components copy straight across.
    pub fn to_quat(self) -> Quat {
        Quat::from_xyzw(self.x, self.y, self.z, self.w)
    }

    pub fn from_quat(q: Quat) -> Self {
        Self::new(q.w, q.x, q.y, q.z)
    }
}

/// Non-blocking orientation reader.
pub trait OrientationSource: Send {
    /// Most recent sample, or `None` if nothing has been produced yet.
    fn latest(&self) -> Option<OrientationSample>;
}

/// Last-value-wins orientation mailbox shared between a producer and the
/// tracking bridge.
#[derive(Debug, Clone, Default)]
pub struct FusedOrientation {
    slot: Arc<Mutex<Option<OrientationSample>>>,
}

impl FusedOrientation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, sample: OrientationSample) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    /// Drops the current sample; readers see `None` until the next publish.
    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl OrientationSource for FusedOrientation {
    fn latest(&self) -> Option<OrientationSample> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Source for runs without any sensor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOrientation;

impl OrientationSource for NoOrientation {
    fn latest(&self) -> Option<OrientationSample> {
        None
    }
}

/// Gentle simulated head motion for sensorless runs.
pub struct EmulatedMotion {
    sink: FusedOrientation,
    time: f32,
}

impl EmulatedMotion {
    pub fn new(sink: FusedOrientation) -> Self {
        Self { sink, time: 0.0 }
    }

    /// Advances the motion by `dt` seconds and publishes the new pose.
    pub fn update(&mut self, dt: f32) {
        self.time += dt;
        let breathing = (self.time * 0.5).sin() * 0.01;
        let sway = (self.time * 0.3).sin() * 0.005;
        let orientation = Quat::from_euler(glam::EulerRot::YXZ, 0.0, breathing, sway);
        self.sink.publish(OrientationSample::from_quat(orientation));
    }

    /// Restarts the motion at identity.
    pub fn recenter(&mut self) {
        self.time = 0.0;
        self.sink.publish(OrientationSample::IDENTITY);
        info!("Orientation reset to identity");
    }
}
