//! Scene drawn by the viewer for each eye.

use std::mem::size_of;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use wgpu::TextureFormat;
use hmd_postprocess::gpu::{TransformState, WgpuDevice, STEREO_COLOR_FORMAT, STEREO_DEPTH_FORMAT};
use hmd_postprocess::{Camera, Eye, EyeViewport};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    inv_view_proj: [[f32; 4]; 4],
    eye_position: [f32; 4],
}

pub struct SceneRenderer {
    // Into the stereo surface (color + depth)
    stereo_pipeline: wgpu::RenderPipeline,
    // Straight to the framebuffer, for tiles without HMD postprocessing
    direct_pipeline: wgpu::RenderPipeline,
    // One per eye, so both eyes can be encoded before submit
    eye_buffers: [wgpu::Buffer; 3],
    eye_bind_groups: [wgpu::BindGroup; 3],
    start_time: Instant,
}

impl SceneRenderer {
    pub fn new(gpu: &WgpuDevice) -> Self {
        let device = gpu.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/scene.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, format: TextureFormat, depth: Option<TextureFormat>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: depth.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let stereo_pipeline = make_pipeline(
            "Scene Pipeline (Stereo)",
            STEREO_COLOR_FORMAT,
            Some(STEREO_DEPTH_FORMAT),
        );
        let direct_pipeline = make_pipeline("Scene Pipeline (Direct)", gpu.output_format(), None);

        let eye_buffers = ["Left", "Right", "Cyclop"].map(|eye| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Scene Uniforms ({eye})")),
                size: size_of::<SceneUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let eye_bind_groups = [0, 1, 2].map(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Scene Bind Group"),
                layout: &bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: eye_buffers[i].as_entire_binding(),
                }],
            })
        });

        Self {
            stereo_pipeline,
            direct_pipeline,
            eye_buffers,
            eye_bind_groups,
            start_time: Instant::now(),
        }
    }

    /// Draws `eye`'s view into whatever destination `gpu` currently has
    /// bound, restricted to `viewport`.
    pub fn draw_eye(
        &self,
        gpu: &mut WgpuDevice,
        camera: &Camera,
        eye: Eye,
        viewport: EyeViewport,
        lens_offset: f32,
    ) {
        let slot = match eye {
            Eye::Left => 0,
            Eye::Right => 1,
            Eye::Cyclop => 2,
        };

        let transforms = TransformState {
            modelview: camera.view_matrix(eye),
            projection: camera.eye_projection(eye, viewport.aspect(), lens_offset),
        };
        let view_proj = transforms.projection * transforms.modelview;
        // Left in place for the overlay; the correction pass resets it.
        gpu.set_transforms(transforms);
        let position = camera.eye_position(eye);
        let uniforms = SceneUniforms {
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            eye_position: [
                position.x,
                position.y,
                position.z,
                self.start_time.elapsed().as_secs_f32(),
            ],
        };
        gpu.queue()
            .write_buffer(&self.eye_buffers[slot], 0, bytemuck::bytes_of(&uniforms));

        let pipeline = match gpu.active_formats() {
            (_, Some(_)) => &self.stereo_pipeline,
            (_, None) => &self.direct_pipeline,
        };
        let bind_group = &self.eye_bind_groups[slot];

        gpu.scene_pass("Eye Scene Pass", viewport, |pass| {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        });
    }
}
