//! wgpu implementation of the graphics device.
//!
//! Handles the GL-style bind/draw protocol on top of wgpu command
//! encoding. Every operation that touches pixels is encoded into the current
//! frame's command encoder in call order. Uniform state is snapshotted into a
//! dynamic-offset ring for each quad, so per-eye values set right before a
//! draw are the values that draw sees.

use std::collections::HashMap;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::{debug, warn};

use super::{
    EyeQuad, GraphicsDevice, ProgramHandle, ProgramSource, RenderTargetHandle, TextureDesc,
    TextureHandle, TextureKind, Uniform, UniformValue, MAX_TEXTURE_UNITS,
};
use crate::error::GraphicsError;
use crate::viewport::EyeViewport;

pub const STEREO_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const STEREO_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Stride between uniform snapshots; the default uniform offset alignment.
const UNIFORM_SLOT_SIZE: u64 = 256;
/// Quads that can be drawn per frame.
const UNIFORM_SLOTS: u64 = 16;
const POST_UNIFORMS_SIZE: u64 = size_of::<PostUniforms>() as u64;

// Postprocess uniforms, layout matches `PostUniforms` in the WGSL programs
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct PostUniforms {
    lens_center: [f32; 2],
    screen_center: [f32; 2],
    scale: [f32; 2],
    scale_in: [f32; 2],
    hmd_warp_param: [f32; 4],
    quad_position: [f32; 4],
    quad_texcoords: [f32; 4],
}

/// Fixed-function style transform state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub modelview: Mat4,
    pub projection: Mat4,
}

impl TransformState {
    pub const IDENTITY: Self = Self {
        modelview: Mat4::IDENTITY,
        projection: Mat4::IDENTITY,
    };

    /// Maps an `(x, y, w, h)` rectangle on the z = 0 plane through
    /// `projection * modelview`.
    pub fn map_rect(&self, [x, y, w, h]: [f32; 4]) -> [f32; 4] {
        let m = self.projection * self.modelview;
        let lo = m.project_point3(Vec3::new(x, y, 0.0));
        let hi = m.project_point3(Vec3::new(x + w, y + h, 0.0));
        [lo.x, lo.y, hi.x - lo.x, hi.y - lo.y]
    }
}

struct GpuTexture {
    view: wgpu::TextureView,
    kind: TextureKind,
    texture: wgpu::Texture,
}

struct GpuTarget {
    color: TextureHandle,
    depth: TextureHandle,
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    framebuffer: wgpu::TextureView,
    next_slot: u64,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    output_format: wgpu::TextureFormat,

    textures: HashMap<TextureHandle, GpuTexture>,
    targets: HashMap<RenderTargetHandle, GpuTarget>,
    programs: HashMap<ProgramHandle, wgpu::RenderPipeline>,
    next_id: u32,

    // Shared by all postprocess programs
    sampler: wgpu::Sampler,
    post_bind_group_layout: wgpu::BindGroupLayout,
    post_pipeline_layout: wgpu::PipelineLayout,
    uniform_ring: wgpu::Buffer,

    // GL-style state
    target_stack: Vec<RenderTargetHandle>,
    transforms: TransformState,
    saved_transforms: Vec<TransformState>,
    program: Option<ProgramHandle>,
    texture_units: [Option<TextureHandle>; MAX_TEXTURE_UNITS as usize],
    sampler_unit: u32,
    uniforms: PostUniforms,

    pending_error: Option<GraphicsError>,
    frame: Option<Frame>,
}

impl WgpuDevice {
    /// `output_format` is the framebuffer (swapchain) format the correction
    /// pass draws into.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Postprocess Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let post_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Postprocess Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: wgpu::BufferSize::new(POST_UNIFORMS_SIZE),
                        },
                        count: None,
                    },
                ],
            });

        let post_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Postprocess Pipeline Layout"),
            bind_group_layouts: &[&post_bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_ring = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Postprocess Uniform Ring"),
            size: UNIFORM_SLOT_SIZE * UNIFORM_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            output_format,
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            next_id: 0,
            sampler,
            post_bind_group_layout,
            post_pipeline_layout,
            uniform_ring,
            target_stack: Vec::new(),
            transforms: TransformState::IDENTITY,
            saved_transforms: Vec::new(),
            program: None,
            texture_units: [None; MAX_TEXTURE_UNITS as usize],
            sampler_unit: 0,
            uniforms: PostUniforms::default(),
            pending_error: None,
            frame: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn transforms(&self) -> TransformState {
        self.transforms
    }

    pub fn set_transforms(&mut self, transforms: TransformState) {
        self.transforms = transforms;
    }

    /// Color and depth formats of the current render destination.
    pub fn active_formats(&self) -> (wgpu::TextureFormat, Option<wgpu::TextureFormat>) {
        if self.target_stack.is_empty() {
            (self.output_format, None)
        } else {
            (STEREO_COLOR_FORMAT, Some(STEREO_DEPTH_FORMAT))
        }
    }

    /// Starts recording a frame that ends up in `framebuffer`, which is
    /// cleared to black.
    pub fn begin_frame(&mut self, framebuffer: wgpu::TextureView) {
        if self.frame.is_some() {
            warn!("begin_frame called twice, dropping unfinished frame");
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("HMD Frame Encoder"),
        });
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Framebuffer Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &framebuffer,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.frame = Some(Frame {
            encoder,
            framebuffer,
            next_slot: 0,
        });
    }

    /// Submits the recorded frame.
    pub fn end_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            warn!("end_frame without begin_frame");
            return;
        };
        if !self.target_stack.is_empty() {
            warn!(
                "{} render target(s) still bound at end of frame",
                self.target_stack.len()
            );
        }
        self.queue.submit(std::iter::once(frame.encoder.finish()));
    }

    /// Opens a render pass on the current destination (the bound render
    /// target, or the framebuffer) restricted to `viewport`, and hands it to
    /// `draw`. Used by hosts for the scene pass.
    pub fn scene_pass<F>(&mut self, label: &str, viewport: EyeViewport, draw: F)
    where
        F: FnOnce(&mut wgpu::RenderPass<'_>),
    {
        let Some(frame) = self.frame.as_mut() else {
            self.pending_error
                .get_or_insert(GraphicsError::InvalidCall("scene pass outside a frame".into()));
            return;
        };

        let (color_view, depth_view) = match self.target_stack.last() {
            Some(handle) => match Self::target_views(&self.textures, &self.targets, *handle) {
                Some((color, depth)) => (color, Some(depth)),
                None => {
                    self.pending_error.get_or_insert(GraphicsError::InvalidCall(format!(
                        "bound render target {handle:?} no longer exists"
                    )));
                    return;
                }
            },
            None => (&frame.framebuffer, None),
        };

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let (w, h) = viewport.extent();
        pass.set_viewport(
            viewport.origin_x as f32,
            viewport.origin_y as f32,
            w as f32,
            h as f32,
            0.0,
            1.0,
        );
        draw(&mut pass);
    }

    fn target_views<'a>(
        textures: &'a HashMap<TextureHandle, GpuTexture>,
        targets: &HashMap<RenderTargetHandle, GpuTarget>,
        handle: RenderTargetHandle,
    ) -> Option<(&'a wgpu::TextureView, &'a wgpu::TextureView)> {
        let target = targets.get(&handle)?;
        let color = textures.get(&target.color)?;
        let depth = textures.get(&target.depth)?;
        Some((&color.view, &depth.view))
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, error: GraphicsError) {
        debug!("graphics error recorded: {}", error);
        self.pending_error.get_or_insert(error);
    }

    /// Runs `create` inside a validation error scope; a captured error is
    /// recorded through `wrap`.
    fn scoped<T>(
        &mut self,
        wrap: fn(String) -> GraphicsError,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> T {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            self.record(wrap(err.to_string()));
        }
        value
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureHandle {
        let handle = TextureHandle(self.allocate_id());
        let (format, usage) = match desc.kind {
            TextureKind::Color => (
                STEREO_COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            ),
            TextureKind::Depth => (STEREO_DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        };

        let label = desc.label;
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let (texture, view) = self.scoped(GraphicsError::Texture, |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        self.textures.insert(
            handle,
            GpuTexture {
                view,
                kind: desc.kind,
                texture,
            },
        );
        handle
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(gpu_texture) = self.textures.remove(&texture) {
            gpu_texture.texture.destroy();
        }
        for unit in self.texture_units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    fn create_render_target(
        &mut self,
        color: TextureHandle,
        depth: TextureHandle,
    ) -> RenderTargetHandle {
        let handle = RenderTargetHandle(self.allocate_id());
        let color_ok = self.textures.get(&color).map(|t| t.kind) == Some(TextureKind::Color);
        let depth_ok = self.textures.get(&depth).map(|t| t.kind) == Some(TextureKind::Depth);
        if !(color_ok && depth_ok) {
            self.record(GraphicsError::RenderTarget(format!(
                "needs a color and a depth texture, got {color:?} and {depth:?}"
            )));
            return handle;
        }
        self.targets.insert(handle, GpuTarget { color, depth });
        handle
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        self.targets.remove(&target);
    }

    fn create_program(&mut self, source: &ProgramSource) -> ProgramHandle {
        let handle = ProgramHandle(self.allocate_id());
        let output_format = self.output_format;
        let label = source.label;
        let wgsl = source.wgsl;
        let layout = &self.post_pipeline_layout;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            self.record(GraphicsError::Program(err.to_string()));
        }

        self.programs.insert(handle, pipeline);
        handle
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn check_error(&mut self) -> Result<(), GraphicsError> {
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bind_render_target(&mut self, target: RenderTargetHandle) {
        if !self.targets.contains_key(&target) {
            self.record(GraphicsError::InvalidCall(format!(
                "bind of unknown render target {target:?}"
            )));
            return;
        }
        self.target_stack.push(target);
    }

    fn unbind_render_target(&mut self, target: RenderTargetHandle) {
        if self.target_stack.last() == Some(&target) {
            self.target_stack.pop();
        } else {
            self.record(GraphicsError::InvalidCall(format!(
                "unbind of {target:?} which is not the active target"
            )));
        }
    }

    fn clear_render_target(&mut self, target: RenderTargetHandle) {
        let Some(frame) = self.frame.as_mut() else {
            self.pending_error
                .get_or_insert(GraphicsError::InvalidCall("clear outside a frame".into()));
            return;
        };
        let Some((color, depth)) = Self::target_views(&self.textures, &self.targets, target) else {
            self.pending_error.get_or_insert(GraphicsError::InvalidCall(format!(
                "clear of unknown render target {target:?}"
            )));
            return;
        };

        let _clear = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Stereo Surface Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn push_transforms(&mut self) {
        self.saved_transforms.push(self.transforms);
        self.transforms = TransformState::IDENTITY;
    }

    fn pop_transforms(&mut self) {
        match self.saved_transforms.pop() {
            Some(saved) => self.transforms = saved,
            None => self.record(GraphicsError::InvalidCall(
                "pop_transforms without push".into(),
            )),
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        if let Some(handle) = program {
            if !self.programs.contains_key(&handle) {
                self.record(GraphicsError::InvalidCall(format!(
                    "use of unknown program {handle:?}"
                )));
                return;
            }
        }
        self.program = program;
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        let Some(slot) = self.texture_units.get_mut(unit as usize) else {
            self.record(GraphicsError::InvalidCall(format!(
                "texture unit {unit} out of range"
            )));
            return;
        };
        *slot = texture;
        if let Some(handle) = texture {
            match self.textures.get(&handle).map(|t| t.kind) {
                Some(TextureKind::Color) => {}
                Some(TextureKind::Depth) => self.record(GraphicsError::InvalidCall(format!(
                    "depth texture {handle:?} cannot be sampled"
                ))),
                None => self.record(GraphicsError::InvalidCall(format!(
                    "bind of unknown texture {handle:?}"
                ))),
            }
        }
    }

    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue) {
        match (uniform, value) {
            (Uniform::LensCenter, UniformValue::Vec2(v)) => self.uniforms.lens_center = v,
            (Uniform::ScreenCenter, UniformValue::Vec2(v)) => self.uniforms.screen_center = v,
            (Uniform::Scale, UniformValue::Vec2(v)) => self.uniforms.scale = v,
            (Uniform::ScaleIn, UniformValue::Vec2(v)) => self.uniforms.scale_in = v,
            (Uniform::HmdWarpParam, UniformValue::Vec4(v)) => self.uniforms.hmd_warp_param = v,
            (Uniform::Texture0, UniformValue::Int(unit))
                if (0..MAX_TEXTURE_UNITS as i32).contains(&unit) =>
            {
                self.sampler_unit = unit as u32;
            }
            (uniform, value) => self.record(GraphicsError::InvalidCall(format!(
                "uniform {uniform:?} cannot take {value:?}"
            ))),
        }
    }

    fn draw_quad(&mut self, quad: &EyeQuad) {
        if !self.target_stack.is_empty() {
            self.record(GraphicsError::InvalidCall(
                "quads are drawn to the framebuffer, unbind render targets first".into(),
            ));
            return;
        }
        let Some(pipeline) = self.program.and_then(|p| self.programs.get(&p)) else {
            self.pending_error
                .get_or_insert(GraphicsError::InvalidCall("draw without a program".into()));
            return;
        };
        let Some(source) = self.texture_units[self.sampler_unit as usize]
            .and_then(|t| self.textures.get(&t))
        else {
            self.pending_error.get_or_insert(GraphicsError::InvalidCall(format!(
                "no texture bound to unit {}",
                self.sampler_unit
            )));
            return;
        };
        let Some(frame) = self.frame.as_mut() else {
            self.pending_error
                .get_or_insert(GraphicsError::InvalidCall("draw outside a frame".into()));
            return;
        };
        if frame.next_slot >= UNIFORM_SLOTS {
            self.pending_error
                .get_or_insert(GraphicsError::InvalidCall("uniform ring exhausted".into()));
            return;
        }

        let offset = frame.next_slot * UNIFORM_SLOT_SIZE;
        frame.next_slot += 1;

        let snapshot = PostUniforms {
            quad_position: self.transforms.map_rect(quad.position),
            quad_texcoords: quad.texcoords,
            ..self.uniforms
        };
        self.queue
            .write_buffer(&self.uniform_ring, offset, bytemuck::bytes_of(&snapshot));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Postprocess Bind Group"),
            layout: &self.post_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_ring,
                        offset: 0,
                        size: wgpu::BufferSize::new(POST_UNIFORMS_SIZE),
                    }),
                },
            ],
        });

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Distortion Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.framebuffer,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[offset as u32]);
        pass.draw(0..4, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FrameObserver;
    use crate::compositor::DistortionCompositor;
    use crate::distortion::{DistortionDefaults, DistortionParams};
    use crate::display::{DisplayConfig, TileConfig};
    use crate::draw::{DrawContext, DrawTask, Eye};
    use crate::pipeline::HmdPipeline;
    use crate::target::StereoRenderTarget;

    const FRAMEBUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
    const SIZE: u32 = 16;
    const PADDED_ROW: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    // Red on the left half, green on the right, blue added on the top half.
    const QUADRANT_SCENE: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) p: vec4<f32>) -> @location(0) vec4<f32> {
    let left = select(0.0, 1.0, p.x < 8.0);
    let top = select(0.0, 1.0, p.y < 8.0);
    return vec4<f32>(left, 1.0 - left, top, 1.0);
}
"#;

    /// `None` when the machine has no usable adapter.
    fn test_device() -> Option<WgpuDevice> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )?;
        let (device, queue) = pollster::block_on(
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
        )
        .ok()?;
        Some(WgpuDevice::new(device, queue, FRAMEBUFFER_FORMAT))
    }

    fn framebuffer(gpu: &WgpuDevice) -> wgpu::Texture {
        gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Framebuffer"),
            size: wgpu::Extent3d {
                width: SIZE,
                height: SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAMEBUFFER_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    fn scene_pipeline(gpu: &WgpuDevice) -> wgpu::RenderPipeline {
        let device = gpu.device();
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quadrant Scene"),
            source: wgpu::ShaderSource::Wgsl(QUADRANT_SCENE.into()),
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quadrant Scene"),
            layout: None,
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: STEREO_COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: STEREO_DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    /// Reads an RGBA8 texture back as rows of `[r, g, b, a]`.
    fn read_pixels(gpu: &WgpuDevice, texture: &wgpu::Texture) -> Vec<Vec<[u8; 4]>> {
        let device = gpu.device();
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: (PADDED_ROW * SIZE) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(PADDED_ROW),
                    rows_per_image: Some(SIZE),
                },
            },
            wgpu::Extent3d {
                width: SIZE,
                height: SIZE,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue().submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, |result| result.unwrap());
        let _ = device.poll(wgpu::Maintain::Wait);
        let data = slice.get_mapped_range();
        let rows = data
            .chunks(PADDED_ROW as usize)
            .map(|row| {
                row[..(SIZE * 4) as usize]
                    .chunks(4)
                    .map(|px| [px[0], px[1], px[2], px[3]])
                    .collect()
            })
            .collect();
        rows
    }

    fn hmd_tile() -> TileConfig {
        let mut display = DisplayConfig {
            tiles: vec![TileConfig::new("hmd", SIZE / 2, SIZE / 2).with_hmd_enabled(true)],
        };
        display.enable_hmd_tiles();
        display.tiles.remove(0)
    }

    /// No warp: the correction pass becomes a straight copy of each half.
    fn identity_warp() -> DistortionParams {
        DistortionParams::new(
            None,
            &DistortionDefaults {
                coefficients: [1.0, 0.0, 0.0, 0.0],
                scale_factor: 1.0,
                aspect_ratio: 1.0,
                lens_offset: 0.0,
            },
        )
    }

    #[test]
    fn map_rect_applies_projection_after_modelview() {
        let rect = [-1.0, -1.0, 1.0, 2.0];
        assert_eq!(TransformState::IDENTITY.map_rect(rect), rect);

        let shifted = TransformState {
            modelview: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            projection: Mat4::from_scale(Vec3::new(0.5, 0.5, 1.0)),
        };
        assert_eq!(shifted.map_rect(rect), [0.0, -0.5, 0.5, 1.0]);
    }

    #[test]
    fn hmd_frame_places_eyes_upright() {
        let Some(mut gpu) = test_device() else {
            return;
        };
        let output = framebuffer(&gpu);
        let scene = scene_pipeline(&gpu);
        let tile = hmd_tile();
        let mut pipeline = HmdPipeline::new(identity_warp());
        let full = EyeViewport::full(SIZE, SIZE);

        gpu.begin_frame(output.create_view(&wgpu::TextureViewDescriptor::default()));
        for eye in [Eye::Left, Eye::Right] {
            let viewport = {
                let mut ctx = DrawContext::new(&tile, DrawTask::Scene, eye, full, &mut gpu);
                pipeline.on_frame_begin(&mut ctx);
                ctx.viewport
            };
            gpu.scene_pass("Quadrant Scene Pass", viewport, |pass| {
                pass.set_pipeline(&scene);
                pass.draw(0..3, 0..1);
            });
            let mut ctx = DrawContext::new(&tile, DrawTask::Scene, eye, viewport, &mut gpu);
            pipeline.on_frame_end(&mut ctx);
        }

        // Scene camera state must not leak into the correction quads.
        let scene_transforms = TransformState {
            modelview: Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0)),
            projection: Mat4::from_scale(Vec3::new(0.25, 0.25, 1.0)),
        };
        gpu.set_transforms(scene_transforms);
        let mut ctx = DrawContext::new(&tile, DrawTask::Overlay, Eye::Cyclop, full, &mut gpu);
        pipeline.on_frame_begin(&mut ctx);
        pipeline.on_frame_end(&mut ctx);

        assert!(gpu.check_error().is_ok());
        assert_eq!(gpu.transforms(), scene_transforms);
        assert!(gpu.target_stack.is_empty());
        gpu.end_frame();

        let pixels = read_pixels(&gpu, &output);
        let (near, far) = (SIZE as usize / 4, SIZE as usize * 3 / 4);
        assert_eq!(pixels[near][near], [255, 0, 255, 255]);
        assert_eq!(pixels[near][far], [0, 255, 255, 255]);
        assert_eq!(pixels[far][near], [255, 0, 0, 255]);
        assert_eq!(pixels[far][far], [0, 255, 0, 255]);

        // The stereo surface is cleared after the quads sampled it.
        let surface = pipeline.target().surface().copied().unwrap();
        let color = &gpu.textures[&surface.color].texture;
        let stereo = read_pixels(&gpu, color);
        assert!(stereo.iter().flatten().all(|px| *px == [0, 0, 0, 255]));
    }

    #[test]
    fn composite_with_bound_target_is_rejected() {
        let Some(mut gpu) = test_device() else {
            return;
        };
        let output = framebuffer(&gpu);
        let mut target = StereoRenderTarget::new();
        let mut compositor = DistortionCompositor::new();
        target.prepare(&mut gpu, [4, 4]).unwrap();
        compositor.prepare(&mut gpu).unwrap();
        let surface = target.surface().copied().unwrap();
        let uniforms = identity_warp().uniforms();

        gpu.begin_frame(output.create_view(&wgpu::TextureViewDescriptor::default()));
        assert!(target.bind(&mut gpu));
        let result = compositor.composite(&mut gpu, &surface, &uniforms);
        assert!(matches!(result, Err(GraphicsError::InvalidCall(_))));
        assert_eq!(gpu.transforms(), TransformState::IDENTITY);
        assert!(gpu.saved_transforms.is_empty());

        assert!(target.unbind(&mut gpu));
        assert!(compositor.composite(&mut gpu, &surface, &uniforms).is_ok());
        gpu.end_frame();
    }
}
