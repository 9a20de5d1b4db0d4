//! Desktop viewer for the HMD postprocess pipeline.
//!
//! Opens a window sized like a headset panel, renders a test scene in
//! side-by-side stereo and shows the barrel-corrected result.
//!
//! Keys: `[`/`]` scale factor, `-`/`=` lens offset, `R` recenter, `Esc` quit.

mod scene;

use std::sync::{Arc, PoisonError};
use std::time::Instant;

use log::{error, info, warn};
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use hmd_postprocess::gpu::WgpuDevice;
use hmd_postprocess::logging::init_logging;
use hmd_postprocess::registry::{self, ServiceHandle, SERVICE_NAME};
use hmd_postprocess::sensors::{EmulatedMotion, FusedOrientation};
use hmd_postprocess::{
    Camera, ConfigError, DisplayConfig, DrawContext, DrawTask, Eye, EyeViewport, HmdConfig,
    HmdService, Service, ServiceHost, SharedCamera, TileConfig,
};

use scene::SceneRenderer;

const HMD_TILE: &str = "hmd";
const EYE_HEIGHT: f32 = 1.6;
const SCALE_STEP: f32 = 0.05;
const LENS_OFFSET_STEP: f32 = 0.005;

#[derive(Debug, Error)]
enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no usable format")]
    NoSurfaceFormat,
}

struct ViewerHost {
    camera: SharedCamera,
}

impl ServiceHost for ViewerHost {
    fn default_camera(&self) -> Option<SharedCamera> {
        Some(self.camera.clone())
    }
}

struct Graphics {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    gpu: WgpuDevice,
    scene: SceneRenderer,
}

impl Graphics {
    async fn new(window: Arc<Window>) -> Result<Self, ViewerError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ViewerError::NoAdapter)?;
        info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .ok_or(ViewerError::NoSurfaceFormat)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let gpu = WgpuDevice::new(device, queue, format);
        let scene = SceneRenderer::new(&gpu);

        Ok(Self {
            surface,
            config,
            gpu,
            scene,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(self.gpu.device(), &self.config);
        }
    }
}

struct Viewer {
    display: DisplayConfig,
    host: ViewerHost,
    service: ServiceHandle,
    motion: EmulatedMotion,
    window: Option<Arc<Window>>,
    graphics: Option<Graphics>,
    last_frame_time: Instant,
}

impl Viewer {
    fn new(config: HmdConfig) -> Result<Self, ViewerError> {
        let mut display = config.display.clone();
        if display.tile(HMD_TILE).is_none() {
            display
                .tiles
                .push(TileConfig::new(HMD_TILE, 640, 400).with_hmd_enabled(true));
        }

        let mut camera = Camera::new();
        camera.position.y = EYE_HEIGHT;
        let host = ViewerHost {
            camera: camera.shared(),
        };

        let fused = FusedOrientation::new();
        let geometry = config.geometry_provider()?;
        let defaults = config.distortion;
        let orientation = Box::new(fused.clone());
        let service = registry::register_service(SERVICE_NAME, move || {
            HmdService::new(geometry, orientation, defaults)
        });
        {
            let mut service = service.lock().unwrap_or_else(PoisonError::into_inner);
            service.initialize(&mut display);
            service.start();
        }

        Ok(Self {
            display,
            host,
            service,
            motion: EmulatedMotion::new(fused),
            window: None,
            graphics: None,
            last_frame_time: Instant::now(),
        })
    }

    fn service(&self) -> std::sync::MutexGuard<'_, HmdService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Per-eye tile size follows the window at half resolution, so the
    /// stereo surface matches the window.
    fn fit_tile_to_window(&mut self, width: u32, height: u32) {
        if let Some(tile) = self.display.tile_mut(HMD_TILE) {
            tile.pixel_size = [(width / 2).max(1), (height / 2).max(1)];
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::BracketLeft | KeyCode::BracketRight => {
                let step = if code == KeyCode::BracketLeft { -SCALE_STEP } else { SCALE_STEP };
                let mut service = self.service();
                let scale = (service.scale_factor() + step).max(SCALE_STEP);
                service.set_scale_factor(scale);
                info!("Scale factor: {:.2}", scale);
            }
            KeyCode::Minus | KeyCode::Equal => {
                let step = if code == KeyCode::Minus {
                    -LENS_OFFSET_STEP
                } else {
                    LENS_OFFSET_STEP
                };
                let mut service = self.service();
                let offset = service.lens_offset() + step;
                service.set_lens_offset(offset);
                info!("Lens offset: {:.3}", offset);
            }
            KeyCode::KeyR => self.motion.recenter(),
            _ => {}
        }
    }

    fn render(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        self.motion.update(dt);
        let lens_offset = {
            let mut service = self.service();
            service.poll(&self.host);
            service.lens_offset()
        };

        let Some(graphics) = self.graphics.as_mut() else {
            return;
        };
        let Some(tile) = self.display.tile(HMD_TILE) else {
            return;
        };

        let output = match graphics.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                warn!("Surface lost ({}), reconfiguring", err);
                graphics.surface.configure(graphics.gpu.device(), &graphics.config);
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let full = EyeViewport::full(graphics.config.width, graphics.config.height);

        let gpu = &mut graphics.gpu;
        gpu.begin_frame(view);

        let camera = self.host.camera.lock().unwrap_or_else(PoisonError::into_inner);
        let eyes: &[Eye] = if tile.is_hmd {
            &[Eye::Left, Eye::Right]
        } else {
            &[Eye::Cyclop]
        };
        for &eye in eyes {
            let viewport = {
                let mut ctx = DrawContext::new(tile, DrawTask::Scene, eye, full, gpu);
                camera.begin_draw(&mut ctx);
                ctx.viewport
            };
            graphics.scene.draw_eye(gpu, &camera, eye, viewport, lens_offset);
            let mut ctx = DrawContext::new(tile, DrawTask::Scene, eye, viewport, gpu);
            camera.end_draw(&mut ctx);
        }

        let mut ctx = DrawContext::new(tile, DrawTask::Overlay, Eye::Cyclop, full, gpu);
        camera.begin_draw(&mut ctx);
        camera.end_draw(&mut ctx);
        drop(camera);

        gpu.end_frame();
        output.present();
    }

    fn shutdown(&mut self) {
        if let Some(graphics) = self.graphics.as_mut() {
            self.service
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release_graphics(&mut graphics.gpu);
        }
        registry::deregister_service(SERVICE_NAME);
        self.graphics = None;
        self.window = None;
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        info!("Creating viewer window");

        let attrs = Window::default_attributes()
            .with_title("HMD Postprocess Viewer")
            .with_inner_size(winit::dpi::PhysicalSize::new(1280, 800));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("{}", ViewerError::from(err));
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(Graphics::new(window.clone())) {
            Ok(graphics) => {
                let size = window.inner_size();
                self.fit_tile_to_window(size.width, size.height);
                self.graphics = Some(graphics);
                info!("Renderer initialized");
            }
            Err(err) => {
                error!("{}", err);
                event_loop.exit();
                return;
            }
        }

        window.request_redraw();
        self.window = Some(window);
        self.last_frame_time = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(graphics) = self.graphics.as_mut() {
                    graphics.resize(size.width, size.height);
                }
                self.fit_tile_to_window(size.width, size.height);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::RedrawRequested => {
                self.render();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<(), ViewerError> {
    let config = HmdConfig::load();
    init_logging(&config.logging);

    let event_loop = EventLoop::new()?;
    let mut viewer = Viewer::new(config)?;
    event_loop.run_app(&mut viewer)?;
    Ok(())
}
