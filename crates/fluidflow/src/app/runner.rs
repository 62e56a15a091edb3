use std::sync::Arc;

use glam::Vec2;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::config::SimConfig;
use crate::error::{FlowError, FlowResult};
use crate::gpu::kernels::ShaderLoader;
use crate::gpu::present::Presenter;
use crate::gpu::{GpuContext, WindowSurface};
use crate::input::{PointerForce, PointerSampler};
use crate::pipeline::FluidPipeline;

/// Open the window and run the visualization until it is closed.
///
/// Any initialization error (window, adapter, kernel compilation, field
/// allocation) stops the event loop and is returned here.
pub fn run(config: SimConfig) -> FlowResult<()> {
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = FlowRunner::new(config);
    event_loop.run_app(&mut runner)?;

    match runner.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Everything that exists once the window does.
struct Session {
    window: Arc<Window>,
    ctx: GpuContext,
    surface: WindowSurface,
    pipeline: FluidPipeline,
    presenter: Presenter,
}

impl Session {
    fn start(event_loop: &ActiveEventLoop, config: &SimConfig) -> FlowResult<Self> {
        let attrs = Window::default_attributes()
            .with_title(config.window_title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(
                config.window_width,
                config.window_height,
            ));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let (ctx, surface) = GpuContext::for_window(window.clone())?;
        let (width, height) = surface.size();

        let pipeline = FluidPipeline::new(&ctx, config.clone(), width, height)?;
        let loader = ShaderLoader::new(config.shader_dir.clone());
        let presenter = Presenter::new(&ctx, &loader, surface.format())?;

        Ok(Self {
            window,
            ctx,
            surface,
            pipeline,
            presenter,
        })
    }

    fn resize(&mut self, width: u32, height: u32) -> FlowResult<()> {
        self.surface.resize(&self.ctx, width, height);
        self.pipeline.resize(&self.ctx, width, height)
    }

    /// One tick plus presentation.
    fn frame(&mut self, force: &PointerForce) -> FlowResult<()> {
        if self.ctx.is_device_lost() {
            return Err(FlowError::DeviceLost);
        }
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.pipeline.encode_tick(&self.ctx, &mut encoder, force);

        let frame = match self.surface.acquire() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.reconfigure(&self.ctx);
                self.ctx.queue.submit(Some(encoder.finish()));
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface timed out, skipping frame");
                self.ctx.queue.submit(Some(encoder.finish()));
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.presenter.encode(
            &self.ctx,
            &mut encoder,
            &view,
            self.pipeline.dye(),
            self.surface.size(),
        );

        self.ctx.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        self.window.request_redraw();
        Ok(())
    }
}

struct FlowRunner {
    config: SimConfig,
    session: Option<Session>,
    sampler: PointerSampler,
    shutdown: bool,
    error: Option<FlowError>,
}

impl FlowRunner {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            session: None,
            sampler: PointerSampler::new(),
            shutdown: false,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: FlowError) {
        log::debug!("stopping event loop: {error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if self.shutdown {
            event_loop.exit();
            return;
        }
        let force = self.sampler.sample();
        let result = match &mut self.session {
            Some(session) => session.frame(&force),
            None => return,
        };
        if let Err(error) = result {
            self.fail(event_loop, error);
        }
    }
}

impl ApplicationHandler for FlowRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() || self.error.is_some() {
            return;
        }
        match Session::start(event_loop, &self.config) {
            Ok(session) => {
                session.window.request_redraw();
                self.session = Some(session);
            }
            Err(error) => self.fail(event_loop, error),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown = true,
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => self.shutdown = true,
                        PhysicalKey::Code(KeyCode::KeyR) => {
                            if let Some(session) = &self.session {
                                log::info!("resetting fields");
                                session.pipeline.reset(&session.ctx);
                            }
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.sampler.set_pressed(state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.sampler
                    .move_to(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::Resized(size) => {
                let result = match &mut self.session {
                    Some(session) => session.resize(size.width, size.height),
                    None => Ok(()),
                };
                if let Err(error) = result {
                    self.fail(event_loop, error);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.shutdown {
            event_loop.exit();
            return;
        }
        if let Some(session) = &self.session {
            session.window.request_redraw();
        }
    }
}
