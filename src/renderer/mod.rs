//! Particle cloud renderer
//!
//! Owns the GPU pipeline and buffers for the point cloud. Each frame the shell
//! hands it the current hand sample and appearance; the renderer advances its
//! smoothing state and uploads one uniform block. Point positions stay on the
//! GPU and are only re-uploaded when the particle count changes.

pub mod cloud;
pub mod field;
pub mod motion;
pub mod uniforms;

use std::time::Instant;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::appearance::AppearanceConfig;
use crate::state::HandSample;

pub use cloud::{Particle, ParticleCloud, CLOUD_RADIUS};
pub use motion::{Momentum, MotionFrame, MotionState};
pub use uniforms::{CloudUniforms, SceneCamera};

/// Draws the particle cloud into the frame
pub struct ParticleRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    particle_buffer: wgpu::Buffer,
    particle_count: u32,
    motion: MotionState,
    camera: SceneCamera,
    started_at: Instant,
}

impl ParticleRenderer {
    pub fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        appearance: &AppearanceConfig,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/particles.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Bind Group Layout"),
            entries: &[
                // Particle storage buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Pipeline"),
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
                    format: target_format,
                    // Additive: overlapping points accumulate brightness
                    blend: Some(wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloud Uniform Buffer"),
            size: std::mem::size_of::<CloudUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let cloud = ParticleCloud::generate(appearance.particle_count);
        let particle_buffer = Self::create_particle_buffer(device, &cloud);
        let bind_group =
            Self::create_bind_group(device, &bind_group_layout, &particle_buffer, &uniform_buffer);

        log::info!("Particle cloud ready with {} points", cloud.len());

        Self {
            pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            particle_buffer,
            particle_count: appearance.particle_count,
            motion: MotionState::new(appearance.interaction_radius),
            camera: SceneCamera::new(width, height),
            started_at: Instant::now(),
        }
    }

    fn create_particle_buffer(device: &wgpu::Device, cloud: &ParticleCloud) -> wgpu::Buffer {
        // Storage bindings cannot be zero-sized
        let placeholder = [Particle::zeroed()];
        let contents: &[Particle] = if cloud.is_empty() {
            &placeholder
        } else {
            cloud.particles()
        };

        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Buffer"),
            contents: bytemuck::cast_slice(contents),
            usage: wgpu::BufferUsages::STORAGE,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        particle_buffer: &wgpu::Buffer,
        uniform_buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Regenerate the cloud if the configured count changed
    fn sync_cloud(&mut self, device: &wgpu::Device, appearance: &AppearanceConfig) {
        if appearance.particle_count == self.particle_count {
            return;
        }

        let cloud = ParticleCloud::generate(appearance.particle_count);
        self.particle_buffer = Self::create_particle_buffer(device, &cloud);
        self.bind_group = Self::create_bind_group(
            device,
            &self.bind_group_layout,
            &self.particle_buffer,
            &self.uniform_buffer,
        );
        self.particle_count = appearance.particle_count;

        log::info!("Regenerated particle cloud with {} points", cloud.len());
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
    }

    /// Advance one frame and upload the uniforms
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        hand: &HandSample,
        appearance: &AppearanceConfig,
    ) {
        self.sync_cloud(device, appearance);

        let frame = self.motion.step(hand, appearance.interaction_radius);
        let time = self.started_at.elapsed().as_secs_f32();
        let uniforms = CloudUniforms::new(&self.camera, &frame, appearance, time);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        log::trace!(
            "scale {:.3}, momentum {:.4}, hand active {}",
            frame.scale,
            self.motion.momentum().length(),
            frame.hand_active
        );
    }

    /// Record the draw into an open render pass
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        if self.particle_count == 0 {
            return;
        }
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        // Instanced rendering: 6 vertices per quad, one instance per particle
        render_pass.draw(0..6, 0..self.particle_count);
    }
}
