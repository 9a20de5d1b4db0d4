//! Call-recording graphics device for tests.

use super::{
    EyeQuad, GraphicsDevice, ProgramHandle, ProgramSource, RenderTargetHandle, TextureDesc,
    TextureHandle, Uniform, UniformValue,
};
use crate::error::GraphicsError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTexture(TextureHandle, TextureDesc),
    DestroyTexture(TextureHandle),
    CreateRenderTarget(RenderTargetHandle),
    DestroyRenderTarget(RenderTargetHandle),
    CreateProgram(ProgramHandle),
    DestroyProgram(ProgramHandle),
    BindTarget(RenderTargetHandle),
    UnbindTarget(RenderTargetHandle),
    ClearTarget(RenderTargetHandle),
    PushTransforms,
    PopTransforms,
    UseProgram(Option<ProgramHandle>),
    BindTexture(u32, Option<TextureHandle>),
    SetUniform(Uniform, UniformValue),
    DrawQuad(EyeQuad),
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub calls: Vec<Call>,
    /// Render destinations, innermost last. Empty means the framebuffer.
    pub target_stack: Vec<RenderTargetHandle>,
    pub transform_depth: usize,
    /// Number of upcoming `create_program` calls that should fail.
    pub failing_programs: usize,
    /// Number of upcoming `create_texture` calls that should fail.
    pub failing_textures: usize,
    pending_error: Option<GraphicsError>,
    next_id: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_target(&self) -> Option<RenderTargetHandle> {
        self.target_stack.last().copied()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn fail(&mut self, error: GraphicsError) {
        self.pending_error.get_or_insert(error);
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle {
        let handle = TextureHandle(self.next());
        if self.failing_textures > 0 {
            self.failing_textures -= 1;
            self.fail(GraphicsError::Texture(desc.label.to_string()));
        }
        self.calls.push(Call::CreateTexture(handle, *desc));
        handle
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.calls.push(Call::DestroyTexture(texture));
    }

    fn create_render_target(
        &mut self,
        _color: TextureHandle,
        _depth: TextureHandle,
    ) -> RenderTargetHandle {
        let handle = RenderTargetHandle(self.next());
        self.calls.push(Call::CreateRenderTarget(handle));
        handle
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        self.calls.push(Call::DestroyRenderTarget(target));
    }

    fn create_program(&mut self, source: &ProgramSource) -> ProgramHandle {
        let handle = ProgramHandle(self.next());
        if self.failing_programs > 0 {
            self.failing_programs -= 1;
            self.fail(GraphicsError::Program(source.label.to_string()));
        }
        self.calls.push(Call::CreateProgram(handle));
        handle
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.calls.push(Call::DestroyProgram(program));
    }

    fn check_error(&mut self) -> Result<(), GraphicsError> {
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bind_render_target(&mut self, target: RenderTargetHandle) {
        self.target_stack.push(target);
        self.calls.push(Call::BindTarget(target));
    }

    fn unbind_render_target(&mut self, target: RenderTargetHandle) {
        if self.target_stack.last() == Some(&target) {
            self.target_stack.pop();
        } else {
            self.fail(GraphicsError::InvalidCall(format!(
                "unbind of {target:?} which is not the active target"
            )));
        }
        self.calls.push(Call::UnbindTarget(target));
    }

    fn clear_render_target(&mut self, target: RenderTargetHandle) {
        self.calls.push(Call::ClearTarget(target));
    }

    fn push_transforms(&mut self) {
        self.transform_depth += 1;
        self.calls.push(Call::PushTransforms);
    }

    fn pop_transforms(&mut self) {
        self.transform_depth = self.transform_depth.saturating_sub(1);
        self.calls.push(Call::PopTransforms);
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.calls.push(Call::UseProgram(program));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        self.calls.push(Call::BindTexture(unit, texture));
    }

    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue) {
        self.calls.push(Call::SetUniform(uniform, value));
    }

    fn draw_quad(&mut self, quad: &EyeQuad) {
        self.calls.push(Call::DrawQuad(*quad));
    }
}
