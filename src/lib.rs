//! HMD postprocessing pipeline.
//!
//! Renders a side-by-side stereo scene into an off-screen surface, then warps
//! each eye's half with a barrel-distortion pass to cancel the headset's lens
//! optics. Head orientation from the sensor layer is fed into the render
//! camera every tick.
//!
//! The host drives everything through draw callbacks: [`camera::Camera`]
//! fires its [`camera::FrameObserver`]s around each draw, and
//! [`pipeline::HmdPipeline`] is the observer that does the work. GPU access
//! goes through [`gpu::GraphicsDevice`], implemented on wgpu by
//! [`gpu::WgpuDevice`].

pub mod camera;
pub mod compositor;
pub mod config;
pub mod display;
pub mod distortion;
pub mod draw;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod pipeline;
pub mod profile;
pub mod registry;
pub mod sensors;
pub mod service;
pub mod target;
pub mod tracking;
pub mod viewport;

pub use camera::{Camera, FrameObserver, SharedCamera};
pub use config::HmdConfig;
pub use display::{DisplayConfig, TileConfig, HMD_POSTPROCESS_FLAG};
pub use distortion::{DistortionDefaults, DistortionParams, DistortionUniforms};
pub use draw::{DrawContext, DrawTask, Eye};
pub use error::{ConfigError, GraphicsError, ServiceError};
pub use pipeline::HmdPipeline;
pub use profile::OpticalProfile;
pub use service::{HmdService, Service, ServiceHost};
pub use viewport::EyeViewport;
