//! Per-tick feed of head orientation and eye separation into the render
//! camera.

use std::sync::PoisonError;

use log::{info, trace};

use crate::camera::{SharedCamera, SharedObserver};
use crate::profile::OpticalProfile;
use crate::sensors::OrientationSource;
use crate::service::ServiceHost;

pub struct HeadTrackingBridge {
    observer: SharedObserver,
    orientation: Box<dyn OrientationSource>,
    profile: Option<OpticalProfile>,
    camera: Option<SharedCamera>,
}

impl HeadTrackingBridge {
    /// `observer` is registered with the host camera once it exists.
    pub fn new(observer: SharedObserver, orientation: Box<dyn OrientationSource>) -> Self {
        Self {
            observer,
            orientation,
            profile: None,
            camera: None,
        }
    }

    pub fn set_profile(&mut self, profile: Option<OpticalProfile>) {
        self.profile = profile;
    }

    pub fn is_attached(&self) -> bool {
        self.camera.is_some()
    }

    pub fn tick(&mut self, host: &dyn ServiceHost) {
        if self.camera.is_none() {
            let Some(camera) = host.default_camera() else {
                trace!("No default camera yet, head tracking deferred");
                return;
            };
            camera
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .add_observer(self.observer.clone());
            info!("HMD pipeline registered with default camera");
            self.camera = Some(camera);
        }
        let Some(camera) = &self.camera else {
            return;
        };

        let mut camera = camera.lock().unwrap_or_else(PoisonError::into_inner);
        // Keep the previous pose when the sensor has nothing new.
        if let Some(sample) = self.orientation.latest() {
            camera.orientation = sample.to_quat();
        }
        if let Some(profile) = &self.profile {
            camera.eye_separation = -(profile.lens_separation_distance / 2.0);
        }
    }

    /// Unregisters the observer from the camera it was attached to.
    pub fn detach(&mut self) {
        if let Some(camera) = self.camera.take() {
            camera
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove_observer(&self.observer);
            info!("HMD pipeline detached from camera");
        }
    }
}
