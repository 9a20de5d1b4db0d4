//! Service lifecycle and the control surface exposed to scripting.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use crate::camera::{SharedCamera, SharedObserver};
use crate::display::DisplayConfig;
use crate::distortion::DistortionDefaults;
use crate::error::ServiceError;
use crate::gpu::GraphicsDevice;
use crate::pipeline::HmdPipeline;
use crate::profile::{DeviceGeometryProvider, EmulatedDevice, OpticalProfile};
use crate::sensors::{NoOrientation, OrientationSource};
use crate::tracking::HeadTrackingBridge;

/// What the host exposes to services while polling.
pub trait ServiceHost {
    /// Camera used for scene rendering. May be `None` early in startup.
    fn default_camera(&self) -> Option<SharedCamera>;
}

/// Host-driven service lifecycle.
pub trait Service: Send {
    fn initialize(&mut self, display: &mut DisplayConfig);
    fn start(&mut self) {}
    /// Called once per host tick, before the frame is drawn.
    fn poll(&mut self, host: &dyn ServiceHost);
    fn stop(&mut self) {}
    fn dispose(&mut self);
}

pub struct HmdService {
    pipeline: Arc<Mutex<HmdPipeline>>,
    tracking: HeadTrackingBridge,
    device: Box<dyn DeviceGeometryProvider>,
    defaults: DistortionDefaults,
    profile: Option<OpticalProfile>,
    running: bool,
}

impl HmdService {
    pub fn new(
        device: Box<dyn DeviceGeometryProvider>,
        orientation: Box<dyn OrientationSource>,
        defaults: DistortionDefaults,
    ) -> Self {
        let pipeline = Arc::new(Mutex::new(HmdPipeline::default()));
        let observer: SharedObserver = pipeline.clone();
        Self {
            pipeline,
            tracking: HeadTrackingBridge::new(observer, orientation),
            device,
            defaults,
            profile: None,
            running: false,
        }
    }

    /// No headset and no sensor.
    pub fn emulated() -> Self {
        Self::new(
            Box::new(EmulatedDevice),
            Box::new(NoOrientation),
            DistortionDefaults::default(),
        )
    }

    pub fn pipeline(&self) -> Arc<Mutex<HmdPipeline>> {
        self.pipeline.clone()
    }

    pub fn profile(&self) -> Option<&OpticalProfile> {
        self.profile.as_ref()
    }

    /// True when no device profile was found at initialization.
    pub fn is_emulated(&self) -> bool {
        self.profile.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_attached()
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, HmdPipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lens_offset(&self) -> f32 {
        self.lock_pipeline().params().lens_offset()
    }

    pub fn set_lens_offset(&mut self, value: f32) {
        self.lock_pipeline().params_mut().set_lens_offset(value);
    }

    pub fn scale_factor(&self) -> f32 {
        self.lock_pipeline().params().scale_factor()
    }

    pub fn set_scale_factor(&mut self, value: f32) {
        self.lock_pipeline().params_mut().set_scale_factor(value);
    }

    pub fn distortion_param(&self, index: usize) -> Result<f32, ServiceError> {
        self.lock_pipeline()
            .params()
            .coefficient(index)
            .ok_or(ServiceError::DistortionIndex(index))
    }

    pub fn set_distortion_param(&mut self, index: usize, value: f32) -> Result<(), ServiceError> {
        if self.lock_pipeline().params_mut().set_coefficient(index, value) {
            Ok(())
        } else {
            Err(ServiceError::DistortionIndex(index))
        }
    }

    /// Destroys the pipeline's GPU resources; call before dropping the
    /// device they were created on.
    pub fn release_graphics(&mut self, gpu: &mut dyn GraphicsDevice) {
        self.lock_pipeline().release_graphics(gpu);
    }
}

impl Service for HmdService {
    fn initialize(&mut self, display: &mut DisplayConfig) {
        info!("Initializing HMD postprocess service");
        let enabled = display.enable_hmd_tiles();
        if enabled == 0 {
            info!("No tile has HMD postprocessing enabled");
        }

        self.profile = self.device.optical_profile();
        match &self.profile {
            Some(profile) => profile.log_summary(),
            None => info!("No HMD attached, using emulation defaults"),
        }

        self.lock_pipeline()
            .set_profile(self.profile.as_ref(), &self.defaults);
        self.tracking.set_profile(self.profile);
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn poll(&mut self, host: &dyn ServiceHost) {
        self.tracking.tick(host);
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn dispose(&mut self) {
        self.running = false;
        self.tracking.detach();
        info!("HMD postprocess service disposed");
    }
}
