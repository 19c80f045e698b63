//! Frame pipeline demo
//!
//! Opens a window and drives the pipeline lifecycle from the winit event
//! loop: `initialize` on resume, `update` + `render_frame` on every redraw,
//! `shutdown` once when the loop exits.
//!
//! Usage: `frame_pipeline_demo [--sample clear|triangle|textured] [-warp]
//! [--width N] [--height N] [--debug|--no-debug] [--stall]`

use std::sync::Arc;
use std::time::Instant;

use raw_window_handle::{DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use frame_pipeline::gpu::device::{GraphicsDevice, PresentationSurface, SurfaceSize};
use frame_pipeline::gpu::{Capabilities, Error, FramePipeline, LifecycleState, PipelineConfig};
use frame_pipeline::{pipeline_error, pipeline_info, pipeline_warn};
use frame_pipeline_renderer_vulkan::gpu::{print_validation_stats_report, SpirvShaderCompiler, VulkanGraphicsDevice};

const CONFIG_PATH: &str = "pipeline.toml";

/// Which sample to draw, from `--sample`
fn parse_sample(args: &[String]) -> Result<Capabilities, Error> {
    let mut args = args.iter();
    let mut capabilities = Capabilities::TEXTURED;
    while let Some(arg) = args.next() {
        if arg != "--sample" {
            continue;
        }
        capabilities = match args.next().map(String::as_str) {
            Some("clear") => Capabilities::CLEAR_ONLY,
            Some("triangle") => Capabilities::TRIANGLE,
            Some("textured") => Capabilities::TEXTURED,
            other => {
                return Err(Error::InitializationFailed(format!(
                    "--sample expects clear, triangle or textured (got {:?})",
                    other
                )))
            }
        };
    }
    Ok(capabilities)
}

/// winit window exposed to the pipeline as a presentation surface
struct WindowSurface {
    window: Arc<Window>,
}

impl HasWindowHandle for WindowSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WindowSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl PresentationSurface for WindowSurface {
    fn size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }
}

struct App {
    config: PipelineConfig,
    capabilities: Capabilities,
    surface: Option<WindowSurface>,
    pipeline: Option<FramePipeline>,
    last_frame: Instant,
    /// First fatal error, reported after the loop exits
    error: Option<Error>,
}

impl App {
    fn new(config: PipelineConfig, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
            surface: None,
            pipeline: None,
            last_frame: Instant::now(),
            error: None,
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Error> {
        let attributes = Window::default_attributes()
            .with_title(self.config.app_name.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = event_loop.create_window(attributes).map_err(|e| {
            Error::InitializationFailed(format!("Failed to create window: {}", e))
        })?;
        let surface = WindowSurface {
            window: Arc::new(window),
        };

        let device: Arc<dyn GraphicsDevice> = Arc::new(VulkanGraphicsDevice::new(&surface, &self.config)?);
        let compiler = SpirvShaderCompiler::with_spirv_dir(env!("OUT_DIR"));
        let pipeline = FramePipeline::initialize(
            device,
            &surface,
            &compiler,
            self.config.clone(),
            self.capabilities,
        )?;

        self.pipeline = Some(pipeline);
        self.surface = Some(surface);
        self.last_frame = Instant::now();
        Ok(())
    }

    /// Record the first fatal error and leave the loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        pipeline_error!("frame_pipeline_demo", "{}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn render(&mut self) -> Result<(), Error> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        // Out-of-date surfaces do not always come with a Resized event
        if pipeline.is_surface_stale() {
            if let Some(surface) = self.surface.as_ref() {
                let size = surface.size();
                pipeline.resize(size.width, size.height)?;
            }
        }
        let now = Instant::now();
        pipeline.update(now - self.last_frame)?;
        self.last_frame = now;
        pipeline.render_frame()
    }

    /// Exactly one shutdown, whatever ended the loop
    fn shutdown(&mut self) {
        let Some(mut pipeline) = self.pipeline.take() else {
            return;
        };
        if pipeline.lifecycle_state() == LifecycleState::ShutDown {
            return;
        }

        let stats = pipeline.stats();
        if let Err(e) = pipeline.shutdown() {
            pipeline_error!("frame_pipeline_demo", "{}", e);
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
        pipeline_info!("frame_pipeline_demo",
            "{} frames, {} presents, {} skipped, {} blocking waits, {} staging buffers released",
            stats.frames_rendered, stats.presents, stats.frames_skipped, stats.blocking_waits,
            stats.staging_buffers_released);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.pipeline.is_some() || self.error.is_some() {
            return;
        }
        match self.initialize(event_loop) {
            Ok(()) => pipeline_info!("frame_pipeline_demo", "Initialization complete, entering main loop"),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                pipeline_info!("frame_pipeline_demo", "Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(pipeline) = self.pipeline.as_mut() {
                    if let Err(e) = pipeline.resize(size.width, size.height) {
                        self.fail(event_loop, e);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(surface) = self.surface.as_ref() {
            surface.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config = PipelineConfig::load_from_path(CONFIG_PATH)?;
    config.apply_args(&args)?;
    config.validate()?;
    let capabilities = parse_sample(&args)?;

    pipeline_info!("frame_pipeline_demo",
        "Starting {:?} sample ({}x{}, {:?}{})",
        capabilities, config.width, config.height, config.sync_strategy,
        if config.use_warp_device { ", software adapter" } else { "" });

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let debug_layer = config.enable_debug_layer;
    let mut app = App::new(config, capabilities);
    event_loop.run_app(&mut app)?;
    app.shutdown();

    if debug_layer {
        print_validation_stats_report();
    }

    match app.error.take() {
        Some(e) => {
            pipeline_warn!("frame_pipeline_demo", "Exiting after a fatal error");
            Err(Box::new(e))
        }
        None => Ok(()),
    }
}
