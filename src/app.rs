//! Application shell
//!
//! Owns the wgpu context, the egui overlay and the three producers/consumers
//! of shared state: the hand tracker, the config generator and the particle
//! renderer.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::appearance::AppearanceConfig;
use crate::camera::CameraFrame;
use crate::generator::{ConfigGenerator, GenerationOutcome, FAILURE_MESSAGE};
use crate::renderer::ParticleRenderer;
use crate::settings::Settings;
use crate::state::{StateChange, StateReader, StateStore, TrackerStatus};
use crate::tracker::HandTracker;
use crate::ui::{ShellUi, UiAction, UiSnapshot};

/// Fatal startup failures
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Camera feed texture shown in the preview panel
struct CameraPreview {
    texture: wgpu::Texture,
    texture_id: egui::TextureId,
    size: [u32; 2],
}

/// Main application state
pub struct App {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    // Shared state
    state: StateReader,
    changes: Receiver<StateChange>,
    appearance: AppearanceConfig,
    tracker_status: TrackerStatus,

    // Components
    tracker: Option<HandTracker>,
    generator: Option<ConfigGenerator>,
    renderer: ParticleRenderer,

    // Camera preview
    camera_preview: Option<CameraPreview>,
    last_camera_frame: u64,

    // egui
    ui: ShellUi,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Create the GPU context and start tracking and generation
    pub async fn new(window: Arc<Window>, settings: Settings) -> Result<Self, AppError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(AppError::NoAdapter)?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Gesture Cloud Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        log::info!("Surface format: {:?}", surface_format);

        let present_mode = if surface_caps
            .present_modes
            .contains(&wgpu::PresentMode::Mailbox)
        {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        log::info!("Present mode: {:?}", present_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };

        surface.configure(&device, &config);

        // Shared state and its writers
        let (state, hand_writer, config_writer) = StateStore::default().split();
        let changes = state.subscribe(&[StateChange::Appearance, StateChange::TrackerStatus]);
        let appearance = state.appearance();

        let renderer = ParticleRenderer::new(
            &device,
            surface_format,
            config.width,
            config.height,
            &appearance,
        );

        let mut tracker_status = TrackerStatus::Starting;
        let tracker = match HandTracker::start(&settings, hand_writer) {
            Ok(tracker) => Some(tracker),
            Err(e) => {
                log::error!("Failed to start hand tracker: {}", e);
                tracker_status = TrackerStatus::Failed(e.to_string());
                None
            }
        };

        let generator = match ConfigGenerator::from_settings(&settings, config_writer) {
            Ok(generator) => Some(generator),
            Err(e) => {
                log::error!("Failed to start config generator: {}", e);
                None
            }
        };

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            state,
            changes,
            appearance,
            tracker_status,
            tracker,
            generator,
            renderer,
            camera_preview: None,
            last_camera_frame: 0,
            ui: ShellUi::default(),
            egui_ctx,
            egui_state,
            egui_renderer,
            fps: 60.0,
            last_fps_update: Instant::now(),
            frames_since_update: 0,
        })
    }

    /// Handle a window event, returning true if egui consumed it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Whether a text field currently has keyboard focus
    pub fn wants_keyboard_input(&self) -> bool {
        self.egui_ctx.wants_keyboard_input()
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.renderer.resize(new_size.width, new_size.height);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn toggle_prompt_panel(&mut self) {
        self.ui.toggle_panel();
    }

    /// Per-frame work before drawing: apply finished generations, pick up
    /// store changes, refresh the camera preview and advance the cloud.
    pub fn update(&mut self) {
        if let Some(generator) = &mut self.generator {
            match generator.poll() {
                Some(GenerationOutcome::Applied) => self.ui.clear_error(),
                Some(GenerationOutcome::Failed(message)) => self.ui.set_error(message),
                None => {}
            }
        }

        self.apply_state_changes();
        self.update_camera_preview();

        let hand = self.state.hand();
        self.renderer
            .update(&self.device, &self.queue, &hand, &self.appearance);
    }

    /// Refresh cached snapshots for whatever changed since the last frame
    fn apply_state_changes(&mut self) {
        for change in self.changes.try_iter() {
            match change {
                StateChange::Appearance => {
                    self.appearance = self.state.appearance();
                }
                StateChange::TrackerStatus => {
                    self.tracker_status = self.state.tracker_status();
                    match &self.tracker_status {
                        TrackerStatus::Failed(message) => {
                            log::warn!("Hand tracking unavailable: {}", message)
                        }
                        status => log::info!("Tracker status: {:?}", status),
                    }
                }
                StateChange::Hand => {}
            }
        }
    }

    /// Upload the newest camera frame for the preview panel
    fn update_camera_preview(&mut self) {
        let Some(tracker) = &self.tracker else { return };
        let preview = tracker.preview();

        // Only copy pixels when a new frame arrived
        match preview.latest_frame_number() {
            Some(n) if n > self.last_camera_frame => {}
            _ => return,
        }
        let Some(frame) = preview.latest() else { return };
        self.last_camera_frame = frame.frame_number;

        let needs_new_texture = match &self.camera_preview {
            None => true,
            Some(p) => p.size != [frame.width, frame.height],
        };
        if needs_new_texture {
            self.create_camera_texture(&frame);
        }

        if let Some(preview) = &self.camera_preview {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &preview.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &frame.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.width * 4),
                    rows_per_image: Some(frame.height),
                },
                wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn create_camera_texture(&mut self, frame: &CameraFrame) {
        log::info!("Creating camera texture: {}x{}", frame.width, frame.height);

        if let Some(old) = self.camera_preview.take() {
            self.egui_renderer.free_texture(&old.texture_id);
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Texture"),
            size: wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let texture_id =
            self.egui_renderer
                .register_native_texture(&self.device, &view, wgpu::FilterMode::Linear);

        self.camera_preview = Some(CameraPreview {
            texture,
            texture_id,
            size: [frame.width, frame.height],
        });
    }

    /// Render a frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
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

            self.renderer.draw(&mut render_pass);
        }

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        let snapshot = UiSnapshot {
            hand: self.state.hand(),
            tracker_status: &self.tracker_status,
            appearance: &self.appearance,
            loading: self.generator.as_ref().is_some_and(|g| g.is_loading()),
            camera_texture: self
                .camera_preview
                .as_ref()
                .map(|p| (p.texture_id, p.size)),
            fps: self.fps,
        };

        let ui = &mut self.ui;
        let mut actions = Vec::new();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            actions = ui.show(ctx, &snapshot);
        });

        for action in actions {
            self.apply_action(action);
        }

        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();

            self.egui_renderer
                .render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn apply_action(&mut self, action: UiAction) {
        match action {
            UiAction::Generate(prompt) => {
                let Some(generator) = &mut self.generator else {
                    self.ui.set_error(FAILURE_MESSAGE);
                    return;
                };
                if let Err(e) = generator.submit(&prompt) {
                    log::warn!("Generation not started: {}", e);
                    self.ui.set_error(FAILURE_MESSAGE);
                }
            }
            UiAction::Reset => {
                if let Some(generator) = &self.generator {
                    generator.reset();
                    log::info!("Appearance reset to defaults");
                }
            }
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}
