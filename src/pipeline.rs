//! Frame observer tying the stereo surface, viewport partitioning and the
//! distortion compositor into the host's draw callbacks.
//!
//! Per frame, for a tile with the HMD flag:
//!
//! * scene begin (left, right): build resources if needed, override the
//!   viewport with the eye's half of the surface, bind the surface;
//! * scene end: unbind;
//! * overlay begin, combined eye: composite to the framebuffer, then clear
//!   the surface for the next frame.
//!
//! Other tiles, phases and eyes pass through untouched.

use log::{trace, warn};

use crate::camera::FrameObserver;
use crate::compositor::DistortionCompositor;
use crate::distortion::{DistortionDefaults, DistortionParams};
use crate::draw::{DrawContext, DrawTask, Eye};
use crate::error::GraphicsError;
use crate::gpu::GraphicsDevice;
use crate::profile::OpticalProfile;
use crate::target::StereoRenderTarget;
use crate::viewport;

#[derive(Debug, Default)]
pub struct HmdPipeline {
    target: StereoRenderTarget,
    compositor: DistortionCompositor,
    params: DistortionParams,
}

impl HmdPipeline {
    pub fn new(params: DistortionParams) -> Self {
        Self {
            target: StereoRenderTarget::new(),
            compositor: DistortionCompositor::new(),
            params,
        }
    }

    /// Rebuilds the distortion parameters from a device profile.
    pub fn set_profile(&mut self, profile: Option<&OpticalProfile>, defaults: &DistortionDefaults) {
        self.params = DistortionParams::new(profile, defaults);
    }

    pub fn params(&self) -> &DistortionParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut DistortionParams {
        &mut self.params
    }

    pub fn target(&self) -> &StereoRenderTarget {
        &self.target
    }

    pub fn compositor(&self) -> &DistortionCompositor {
        &self.compositor
    }

    /// Destroys all GPU resources. They are rebuilt on the next HMD scene
    /// pass.
    pub fn release_graphics(&mut self, gpu: &mut dyn GraphicsDevice) {
        self.target.release(gpu);
        self.compositor.release(gpu);
    }

    fn ensure_graphics(
        &mut self,
        gpu: &mut dyn GraphicsDevice,
        pixel_size: [u32; 2],
    ) -> Result<(), GraphicsError> {
        self.target.prepare(gpu, pixel_size)?;
        if let Err(err) = self.compositor.prepare(gpu) {
            // Never run with half a pipeline.
            self.target.mark_failed(gpu);
            return Err(err);
        }
        Ok(())
    }

    fn begin_scene(&mut self, ctx: &mut DrawContext<'_>) {
        if let Err(err) = self.ensure_graphics(ctx.gpu, ctx.tile.pixel_size) {
            warn!(
                "HMD postprocess setup failed for tile {}, retrying next frame: {}",
                ctx.tile.name, err
            );
            return;
        }
        let Some(surface) = self.target.surface().copied() else {
            return;
        };

        if let Some(eye_viewport) = viewport::partition(ctx.eye, surface.width, surface.height) {
            ctx.viewport = eye_viewport;
        }
        self.target.bind(ctx.gpu);
    }

    fn composite(&mut self, ctx: &mut DrawContext<'_>) {
        let Some(surface) = self.target.surface().copied() else {
            trace!("No stereo surface yet, skipping composite");
            return;
        };
        if self.compositor.is_ready() {
            let uniforms = self.params.uniforms();
            if let Err(err) = self.compositor.composite(ctx.gpu, &surface, &uniforms) {
                warn!("HMD distortion pass failed: {}", err);
            }
        }
        self.target.clear(ctx.gpu);
    }
}

impl FrameObserver for HmdPipeline {
    fn on_frame_begin(&mut self, ctx: &mut DrawContext<'_>) {
        if !ctx.tile.wants_hmd_postprocess() {
            return;
        }
        match (ctx.task, ctx.eye) {
            (DrawTask::Scene, _) => self.begin_scene(ctx),
            (DrawTask::Overlay, Eye::Cyclop) => self.composite(ctx),
            (DrawTask::Overlay, _) => {}
        }
    }

    fn on_frame_end(&mut self, ctx: &mut DrawContext<'_>) {
        if ctx.tile.wants_hmd_postprocess() && ctx.task == DrawTask::Scene {
            self.target.unbind(ctx.gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayConfig, TileConfig};
    use crate::gpu::recording::{Call, RecordingDevice};
    use crate::gpu::{EyeQuad, RenderTargetHandle};
    use crate::target::SurfaceState;
    use crate::viewport::EyeViewport;

    fn hmd_tile(w: u32, h: u32) -> TileConfig {
        let mut display = DisplayConfig {
            tiles: vec![TileConfig::new("hmd", w, h).with_hmd_enabled(true)],
        };
        display.enable_hmd_tiles();
        display.tiles.remove(0)
    }

    fn phase(
        pipeline: &mut HmdPipeline,
        gpu: &mut RecordingDevice,
        tile: &TileConfig,
        task: DrawTask,
        eye: Eye,
    ) -> EyeViewport {
        let mut ctx = DrawContext::new(tile, task, eye, EyeViewport::full(1, 1), gpu);
        pipeline.on_frame_begin(&mut ctx);
        let viewport = ctx.viewport;
        pipeline.on_frame_end(&mut ctx);
        viewport
    }

    fn frame(
        pipeline: &mut HmdPipeline,
        gpu: &mut RecordingDevice,
        tile: &TileConfig,
    ) -> [EyeViewport; 2] {
        let left = phase(pipeline, gpu, tile, DrawTask::Scene, Eye::Left);
        let right = phase(pipeline, gpu, tile, DrawTask::Scene, Eye::Right);
        phase(pipeline, gpu, tile, DrawTask::Overlay, Eye::Cyclop);
        [left, right]
    }

    #[test]
    fn full_frame_on_hmd_tile() {
        let tile = hmd_tile(960, 1080);
        let mut gpu = RecordingDevice::new();
        let mut pipeline = HmdPipeline::default();

        let [left, right] = frame(&mut pipeline, &mut gpu, &tile);

        assert_eq!(left, EyeViewport::new(0, 0, 960, 2160));
        assert_eq!(right, EyeViewport::new(960, 0, 1920, 2160));
        assert_eq!(pipeline.target().surface().unwrap().size(), (1920, 2160));

        let binds = gpu.count(|c| matches!(c, Call::BindTarget(_)));
        let unbinds = gpu.count(|c| matches!(c, Call::UnbindTarget(_)));
        assert_eq!((binds, unbinds), (2, 2));
        assert!(gpu.target_stack.is_empty());

        let right_draw = gpu.position(|c| *c == Call::DrawQuad(EyeQuad::RIGHT)).unwrap();
        let clear = gpu.position(|c| matches!(c, Call::ClearTarget(_))).unwrap();
        assert!(right_draw < clear);
        assert!(gpu.check_error().is_ok());
    }

    #[test]
    fn resources_are_built_once() {
        let tile = hmd_tile(640, 800);
        let mut gpu = RecordingDevice::new();
        let mut pipeline = HmdPipeline::default();

        for _ in 0..3 {
            frame(&mut pipeline, &mut gpu, &tile);
        }

        assert_eq!(gpu.count(|c| matches!(c, Call::CreateRenderTarget(_))), 1);
        assert_eq!(gpu.count(|c| matches!(c, Call::CreateProgram(_))), 1);
        assert_eq!(gpu.count(|c| matches!(c, Call::DrawQuad(_))), 6);
    }

    #[test]
    fn unflagged_tile_is_untouched() {
        let tile = TileConfig::new("monitor", 960, 1080);
        let mut gpu = RecordingDevice::new();
        let mut pipeline = HmdPipeline::default();

        let [left, _] = frame(&mut pipeline, &mut gpu, &tile);

        assert!(gpu.calls.is_empty());
        assert_eq!(left, EyeViewport::full(1, 1));
        assert_eq!(*pipeline.target().state(), SurfaceState::Uninitialized);
    }

    #[test]
    fn per_eye_overlay_passes_do_not_composite() {
        let tile = hmd_tile(64, 64);
        let mut gpu = RecordingDevice::new();
        let mut pipeline = HmdPipeline::default();
        phase(&mut pipeline, &mut gpu, &tile, DrawTask::Scene, Eye::Left);
        gpu.clear_calls();

        phase(&mut pipeline, &mut gpu, &tile, DrawTask::Overlay, Eye::Left);
        phase(&mut pipeline, &mut gpu, &tile, DrawTask::Overlay, Eye::Right);

        assert!(gpu.calls.is_empty());
    }

    #[test]
    fn program_failure_skips_pass_and_retries() {
        let tile = hmd_tile(64, 64);
        let mut gpu = RecordingDevice::new();
        gpu.failing_programs = 1;
        let mut pipeline = HmdPipeline::default();

        let left = phase(&mut pipeline, &mut gpu, &tile, DrawTask::Scene, Eye::Left);
        assert_eq!(left, EyeViewport::full(1, 1));
        assert_eq!(
            *pipeline.target().state(),
            SurfaceState::Failed { attempts: 1 }
        );
        assert_eq!(gpu.count(|c| matches!(c, Call::BindTarget(_))), 0);
        assert_eq!(gpu.count(|c| matches!(c, Call::DestroyTexture(_))), 2);

        let right = phase(&mut pipeline, &mut gpu, &tile, DrawTask::Scene, Eye::Right);
        assert_eq!(right, EyeViewport::new(64, 0, 128, 128));
        assert!(pipeline.compositor().is_ready());

        phase(&mut pipeline, &mut gpu, &tile, DrawTask::Overlay, Eye::Cyclop);
        assert_eq!(gpu.count(|c| matches!(c, Call::DrawQuad(_))), 2);
    }

    #[test]
    fn outer_destination_survives_scene_pass() {
        let tile = hmd_tile(64, 64);
        let mut gpu = RecordingDevice::new();
        let outer = RenderTargetHandle(500);
        gpu.bind_render_target(outer);
        let mut pipeline = HmdPipeline::default();

        phase(&mut pipeline, &mut gpu, &tile, DrawTask::Scene, Eye::Left);

        assert_eq!(gpu.target_stack, vec![outer]);
    }

    #[test]
    fn tuned_parameters_reach_the_compositor() {
        use crate::gpu::{Uniform, UniformValue};

        let tile = hmd_tile(64, 64);
        let mut gpu = RecordingDevice::new();
        let mut pipeline = HmdPipeline::default();
        pipeline.params_mut().set_lens_offset(0.1);

        frame(&mut pipeline, &mut gpu, &tile);

        assert!(gpu.calls.contains(&Call::SetUniform(
            Uniform::LensCenter,
            UniformValue::Vec2([0.25 + 0.1, 0.5])
        )));
    }

    #[test]
    fn release_graphics_destroys_everything() {
        let tile = hmd_tile(64, 64);
        let mut gpu = RecordingDevice::new();
        let mut pipeline = HmdPipeline::default();
        frame(&mut pipeline, &mut gpu, &tile);

        pipeline.release_graphics(&mut gpu);

        assert!(!pipeline.target().is_ready());
        assert!(!pipeline.compositor().is_ready());
        assert_eq!(gpu.count(|c| matches!(c, Call::DestroyProgram(_))), 1);
        assert_eq!(gpu.count(|c| matches!(c, Call::DestroyRenderTarget(_))), 1);
    }
}
