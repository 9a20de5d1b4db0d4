//! Fullscreen barrel-correction pass.
//!
//! Samples the side-by-side stereo surface and draws one warped quad per eye
//! into the real framebuffer.

use log::{debug, info};

use crate::distortion::{DistortionUniforms, LEFT_SCREEN_CENTER, RIGHT_SCREEN_CENTER};
use crate::error::GraphicsError;
use crate::gpu::{
    EyeQuad, GraphicsDevice, ProgramHandle, ProgramSource, Uniform, UniformValue,
};
use crate::target::StereoSurface;

/// Texture unit the stereo color texture is bound to.
const SOURCE_TEXTURE_UNIT: u32 = 0;

pub const DISTORTION_PROGRAM: ProgramSource = ProgramSource {
    label: "HMD Distortion",
    wgsl: include_str!("shaders/distortion.wgsl"),
};

#[derive(Debug, Default)]
pub struct DistortionCompositor {
    program: Option<ProgramHandle>,
}

impl DistortionCompositor {
    pub fn new() -> Self {
        Self { program: None }
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    /// Compiles the distortion program if it does not exist yet.
    pub fn prepare(&mut self, gpu: &mut dyn GraphicsDevice) -> Result<(), GraphicsError> {
        if self.program.is_some() {
            return Ok(());
        }
        let program = gpu.create_program(&DISTORTION_PROGRAM);
        if let Err(err) = gpu.check_error() {
            gpu.destroy_program(program);
            return Err(err);
        }
        info!("Distortion program created");
        self.program = Some(program);
        Ok(())
    }

    pub fn release(&mut self, gpu: &mut dyn GraphicsDevice) {
        if let Some(program) = self.program.take() {
            gpu.destroy_program(program);
        }
    }

    /// Draws the corrected composite of `surface` into the current
    /// destination. Transform state is restored even when the pass fails.
    pub fn composite(
        &self,
        gpu: &mut dyn GraphicsDevice,
        surface: &StereoSurface,
        uniforms: &DistortionUniforms,
    ) -> Result<(), GraphicsError> {
        let program = self.program.ok_or_else(|| {
            GraphicsError::InvalidCall("distortion program not created".to_string())
        })?;

        // The quads are in normalized device space, independent of the
        // scene camera.
        gpu.push_transforms();
        let result = Self::draw_eyes(gpu, program, surface, uniforms);
        gpu.pop_transforms();
        result
    }

    fn draw_eyes(
        gpu: &mut dyn GraphicsDevice,
        program: ProgramHandle,
        surface: &StereoSurface,
        uniforms: &DistortionUniforms,
    ) -> Result<(), GraphicsError> {
        gpu.use_program(Some(program));
        gpu.bind_texture(SOURCE_TEXTURE_UNIT, Some(surface.color));
        if let Err(err) = gpu.check_error() {
            Self::end_eye_draw(gpu);
            return Err(err);
        }

        // Shared by both eyes.
        gpu.set_uniform(Uniform::Scale, UniformValue::Vec2(uniforms.screen_warp_scale));
        gpu.set_uniform(
            Uniform::ScaleIn,
            UniformValue::Vec2(uniforms.screen_warp_scale_inverse),
        );
        gpu.set_uniform(
            Uniform::HmdWarpParam,
            UniformValue::Vec4(uniforms.radial_distortion),
        );
        gpu.set_uniform(
            Uniform::Texture0,
            UniformValue::Int(SOURCE_TEXTURE_UNIT as i32),
        );

        // Lens and screen centers are shared shader state, so each eye sets
        // them right before its own draw. Left always goes first.
        Self::draw_eye(
            gpu,
            uniforms.left_lens_center(),
            LEFT_SCREEN_CENTER,
            &EyeQuad::LEFT,
        );
        Self::draw_eye(
            gpu,
            uniforms.right_lens_center(),
            RIGHT_SCREEN_CENTER,
            &EyeQuad::RIGHT,
        );

        Self::end_eye_draw(gpu);
        let result = gpu.check_error();
        if result.is_ok() {
            debug!("Distortion composite drawn");
        }
        result
    }

    fn draw_eye(
        gpu: &mut dyn GraphicsDevice,
        lens_center: [f32; 2],
        screen_center: [f32; 2],
        quad: &EyeQuad,
    ) {
        gpu.set_uniform(Uniform::LensCenter, UniformValue::Vec2(lens_center));
        gpu.set_uniform(Uniform::ScreenCenter, UniformValue::Vec2(screen_center));
        gpu.draw_quad(quad);
    }

    fn end_eye_draw(gpu: &mut dyn GraphicsDevice) {
        gpu.bind_texture(SOURCE_TEXTURE_UNIT, None);
        gpu.use_program(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::{resolve, DistortionDefaults};
    use crate::gpu::recording::{Call, RecordingDevice};
    use crate::profile::OpticalProfile;
    use crate::target::StereoRenderTarget;

    fn ready(gpu: &mut RecordingDevice) -> (DistortionCompositor, StereoSurface) {
        let mut target = StereoRenderTarget::new();
        target.prepare(gpu, [640, 800]).unwrap();
        let mut compositor = DistortionCompositor::new();
        compositor.prepare(gpu).unwrap();
        gpu.clear_calls();
        (compositor, *target.surface().unwrap())
    }

    fn uniforms() -> DistortionUniforms {
        resolve(Some(&OpticalProfile::DK1), 0.8, &DistortionDefaults::default())
    }

    #[test]
    fn left_eye_triplet_precedes_right_eye_triplet() {
        let mut gpu = RecordingDevice::new();
        let (compositor, surface) = ready(&mut gpu);
        let u = uniforms();

        compositor.composite(&mut gpu, &surface, &u).unwrap();

        let vec2 = |uniform, value| Call::SetUniform(uniform, UniformValue::Vec2(value));
        let left_lens = gpu
            .position(|c| *c == vec2(Uniform::LensCenter, u.left_lens_center()))
            .unwrap();
        let left_screen = gpu
            .position(|c| *c == vec2(Uniform::ScreenCenter, LEFT_SCREEN_CENTER))
            .unwrap();
        let left_draw = gpu.position(|c| *c == Call::DrawQuad(EyeQuad::LEFT)).unwrap();
        let right_lens = gpu
            .position(|c| *c == vec2(Uniform::LensCenter, u.right_lens_center()))
            .unwrap();
        let right_screen = gpu
            .position(|c| *c == vec2(Uniform::ScreenCenter, RIGHT_SCREEN_CENTER))
            .unwrap();
        let right_draw = gpu.position(|c| *c == Call::DrawQuad(EyeQuad::RIGHT)).unwrap();

        assert!(left_lens < left_screen && left_screen < left_draw);
        assert!(left_draw < right_lens);
        assert!(right_lens < right_screen && right_screen < right_draw);
    }

    #[test]
    fn eye_centers_are_set_right_before_each_draw() {
        let mut gpu = RecordingDevice::new();
        let (compositor, surface) = ready(&mut gpu);
        compositor.composite(&mut gpu, &surface, &uniforms()).unwrap();

        for (i, call) in gpu.calls.iter().enumerate() {
            if matches!(call, Call::DrawQuad(_)) {
                assert!(matches!(gpu.calls[i - 1], Call::SetUniform(Uniform::ScreenCenter, _)));
                assert!(matches!(gpu.calls[i - 2], Call::SetUniform(Uniform::LensCenter, _)));
            }
        }
        assert_eq!(gpu.count(|c| matches!(c, Call::DrawQuad(_))), 2);
    }

    #[test]
    fn shared_uniforms_match_resolved_values() {
        let mut gpu = RecordingDevice::new();
        let (compositor, surface) = ready(&mut gpu);
        let u = uniforms();
        compositor.composite(&mut gpu, &surface, &u).unwrap();

        assert!(gpu.calls.contains(&Call::SetUniform(
            Uniform::Scale,
            UniformValue::Vec2(u.screen_warp_scale)
        )));
        assert!(gpu.calls.contains(&Call::SetUniform(
            Uniform::ScaleIn,
            UniformValue::Vec2(u.screen_warp_scale_inverse)
        )));
        assert!(gpu.calls.contains(&Call::SetUniform(
            Uniform::HmdWarpParam,
            UniformValue::Vec4([1.0, 0.22, 0.24, 0.0])
        )));
        assert!(gpu
            .calls
            .contains(&Call::SetUniform(Uniform::Texture0, UniformValue::Int(0))));
    }

    #[test]
    fn state_is_bracketed_and_restored() {
        let mut gpu = RecordingDevice::new();
        let (compositor, surface) = ready(&mut gpu);
        compositor.composite(&mut gpu, &surface, &uniforms()).unwrap();

        let calls = &gpu.calls;
        assert_eq!(calls.first(), Some(&Call::PushTransforms));
        assert_eq!(calls[1], Call::UseProgram(compositor.program));
        assert_eq!(calls[2], Call::BindTexture(0, Some(surface.color)));
        assert_eq!(
            &calls[calls.len() - 3..],
            &[
                Call::BindTexture(0, None),
                Call::UseProgram(None),
                Call::PopTransforms
            ]
        );
        assert_eq!(gpu.transform_depth, 0);
    }

    #[test]
    fn composite_without_program_is_an_error() {
        let mut gpu = RecordingDevice::new();
        let (_, surface) = ready(&mut gpu);
        let compositor = DistortionCompositor::new();

        assert!(matches!(
            compositor.composite(&mut gpu, &surface, &uniforms()),
            Err(GraphicsError::InvalidCall(_))
        ));
        assert!(gpu.calls.is_empty());
    }

    #[test]
    fn program_failure_is_reported_and_cleaned_up() {
        let mut gpu = RecordingDevice::new();
        gpu.failing_programs = 1;
        let mut compositor = DistortionCompositor::new();

        assert!(matches!(
            compositor.prepare(&mut gpu),
            Err(GraphicsError::Program(_))
        ));
        assert!(!compositor.is_ready());
        assert_eq!(gpu.count(|c| matches!(c, Call::DestroyProgram(_))), 1);

        compositor.prepare(&mut gpu).unwrap();
        assert!(compositor.is_ready());
    }
}
