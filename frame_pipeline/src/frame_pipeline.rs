/// Frame pipeline - the initialize / update / render_frame / shutdown lifecycle
///
/// Owns every GPU object of the session and drives the per-frame sequence:
///
/// ```text
/// wait for slot -> release staging -> record -> submit -> signal -> present
/// ```
///
/// Any error is fatal: the pipeline moves to `Failed`, the host is expected
/// to call `shutdown` (or drop the pipeline) and exit. An out-of-date surface
/// is not an error: frames are skipped until the next `resize`.

use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use crate::command_recorder::{CommandRecorder, FrameCommands};
use crate::config::{PipelineConfig, SyncStrategy};
use crate::descriptor_allocator::DescriptorAllocator;
use crate::error::{Error, PipelineStage, Result};
use crate::frame_slots::FrameSlots;
use crate::graphics_device::{
    AdapterInfo, Buffer, DescriptorTableParameter, GraphicsDevice, PipelineState,
    PipelineStateDesc, PresentationSurface, Rect, RootSignature, RootSignatureDesc,
    ShaderCompileRequest, ShaderCompiler, ShaderStage, StaticSampler, SurfaceSize, Swapchain,
    Texture, TextureDesc, TextureFormat, TextureUsage, VertexBufferView, Viewport,
};
use crate::resource_uploader::ResourceUploader;
use crate::sync::{FrameSynchronizer, WaitOutcome};
use crate::checkerboard::generate_checkerboard;
use crate::vertex::{triangle_colored, triangle_textured, ColorVertex, TexturedVertex};
use crate::{pipeline_bail, pipeline_debug, pipeline_info, pipeline_trace, pipeline_warn};

/// Side length of the checkerboard texture
pub const TEXTURE_SIZE: u32 = 256;

bitflags! {
    /// What the pipeline draws on top of the clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        /// Draw the sample triangle from a vertex buffer
        const HAS_VERTEX_BUFFER = 1 << 0;
        /// Sample the checkerboard texture
        const HAS_TEXTURE = 1 << 1;
        /// Root signature carries a descriptor table and a static sampler
        const HAS_ROOT_PARAMETERS = 1 << 2;
    }
}

impl Capabilities {
    /// Clear the back buffer and present
    pub const CLEAR_ONLY: Self = Self::empty();
    /// Per-vertex colored triangle
    pub const TRIANGLE: Self = Self::HAS_VERTEX_BUFFER;
    /// Checkerboard-textured triangle
    pub const TEXTURED: Self = Self::HAS_VERTEX_BUFFER
        .union(Self::HAS_TEXTURE)
        .union(Self::HAS_ROOT_PARAMETERS);

    fn validate(self) -> Result<()> {
        if self.contains(Self::HAS_TEXTURE)
            && !self.contains(Self::HAS_VERTEX_BUFFER | Self::HAS_ROOT_PARAMETERS)
        {
            return Err(Error::InitializationFailed(format!(
                "texturing needs a vertex buffer and root parameters ({:?})",
                self
            )));
        }
        Ok(())
    }
}

/// Where the pipeline is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Initialized, frames may be rendered
    Running,
    /// A fatal error escaped; only shutdown remains
    Failed,
    /// Shut down, every GPU object released
    ShutDown,
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    pub presents: u64,
    /// Fence waits that actually blocked the CPU
    pub blocking_waits: u64,
    /// Fence waits satisfied without blocking
    pub immediate_waits: u64,
    pub staging_buffers_released: u64,
    /// Frames dropped because the swap chain no longer matched the surface
    pub frames_skipped: u64,
}

/// Objects created during asset loading
#[derive(Default)]
struct Assets {
    root_signature: Option<Arc<dyn RootSignature>>,
    pipeline_state: Option<Arc<dyn PipelineState>>,
    vertex_buffer: Option<Arc<dyn Buffer>>,
    vertex_stride: u32,
    vertex_count: u32,
    texture: Option<Arc<dyn Texture>>,
}

pub struct FramePipeline {
    device: Arc<dyn GraphicsDevice>,
    config: PipelineConfig,
    capabilities: Capabilities,
    swapchain: Box<dyn Swapchain>,
    descriptors: DescriptorAllocator,
    slots: FrameSlots,
    recorder: CommandRecorder,
    sync: FrameSynchronizer,
    uploader: ResourceUploader,
    assets: Assets,
    viewport: Viewport,
    scissor: Rect,
    state: LifecycleState,
    /// Swap chain must be recreated before the next present
    surface_stale: bool,
    frames_rendered: u64,
    frames_skipped: u64,
    presents: u64,
}

impl FramePipeline {
    /// Create every GPU object and load the assets `capabilities` asks for
    ///
    /// # Arguments
    ///
    /// * `device` - Backend device (hardware or software adapter)
    /// * `surface` - Window the swap chain presents to
    /// * `compiler` - Shader compiler for the vertex and pixel stages
    /// * `config` - Validated pipeline configuration
    /// * `capabilities` - What each frame draws
    ///
    /// Errors are annotated with `DeviceCreation` or `AssetLoading`. Work
    /// already submitted when asset loading fails is drained before returning.
    pub fn initialize(
        device: Arc<dyn GraphicsDevice>,
        surface: &dyn PresentationSurface,
        compiler: &dyn ShaderCompiler,
        config: PipelineConfig,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let mut pipeline = Self::create_device_objects(device, surface, config, capabilities)
            .map_err(|e| e.at_stage(PipelineStage::DeviceCreation))?;

        if let Err(e) = pipeline.load_assets(compiler) {
            pipeline.abort();
            return Err(e.at_stage(PipelineStage::AssetLoading));
        }

        pipeline_info!(
            "frame_pipeline",
            "Pipeline ready: {}x{}, {} frame slots, {:?}",
            pipeline.viewport.width,
            pipeline.viewport.height,
            pipeline.slots.len(),
            pipeline.sync.strategy()
        );
        Ok(pipeline)
    }

    fn create_device_objects(
        device: Arc<dyn GraphicsDevice>,
        surface: &dyn PresentationSurface,
        mut config: PipelineConfig,
        capabilities: Capabilities,
    ) -> Result<Self> {
        config.validate()?;
        capabilities.validate()?;

        let adapter = device.adapter_info();
        pipeline_info!(
            "frame_pipeline",
            "Adapter: {} (vendor 0x{:04X}, device 0x{:04X}{})",
            adapter.name,
            adapter.vendor_id,
            adapter.device_id,
            if adapter.is_software { ", software" } else { "" }
        );
        if config.use_warp_device && !adapter.is_software {
            pipeline_warn!(
                "frame_pipeline",
                "Software adapter requested but '{}' is a hardware adapter",
                adapter.name
            );
        }

        let swapchain = device.create_swapchain(surface, config.frame_count, config.vsync)?;
        let buffer_count = swapchain.buffer_count();
        let extent = swapchain.extent();
        if extent.is_empty() {
            pipeline_bail!("frame_pipeline", "Swap chain created with an empty extent");
        }
        // The compositor may impose its own extent
        config.width = extent.width;
        config.height = extent.height;

        let srv_capacity = if capabilities.contains(Capabilities::HAS_TEXTURE) { 1 } else { 0 };
        let descriptors = DescriptorAllocator::new(device.as_ref(), buffer_count, srv_capacity)?;
        let mut slots = FrameSlots::new(device.as_ref(), buffer_count)?;
        attach_back_buffers(device.as_ref(), swapchain.as_ref(), &descriptors, &mut slots)?;

        let recorder = CommandRecorder::new(device.as_ref(), slots.get(0)?)?;
        let sync = FrameSynchronizer::new(device.as_ref(), config.sync_strategy, config.wait_timeout())?;
        let uploader = ResourceUploader::new(device.clone());

        pipeline_debug!(
            "frame_pipeline",
            "Device objects created: {} back buffers, {:?} surface",
            buffer_count,
            extent
        );

        Ok(Self {
            device,
            config,
            capabilities,
            swapchain,
            descriptors,
            slots,
            recorder,
            sync,
            uploader,
            assets: Assets::default(),
            viewport: Viewport::full(extent.width, extent.height),
            scissor: Rect::full(extent.width, extent.height),
            state: LifecycleState::Running,
            surface_stale: false,
            frames_rendered: 0,
            frames_skipped: 0,
            presents: 0,
        })
    }

    fn load_assets(&mut self, compiler: &dyn ShaderCompiler) -> Result<()> {
        if !self.capabilities.contains(Capabilities::HAS_VERTEX_BUFFER) {
            pipeline_debug!("frame_pipeline", "Clear-only pipeline, no assets to load");
            return Ok(());
        }
        let textured = self.capabilities.contains(Capabilities::HAS_TEXTURE);

        let mut root_desc = RootSignatureDesc {
            allow_input_layout: true,
            ..Default::default()
        };
        if self.capabilities.contains(Capabilities::HAS_ROOT_PARAMETERS) {
            root_desc.srv_tables.push(DescriptorTableParameter {
                base_register: 0,
                descriptor_count: 1,
                visibility: ShaderStage::Pixel,
            });
            root_desc.static_samplers.push(StaticSampler::point_border(0));
        }
        let root_signature = self.device.create_root_signature(&root_desc)?;

        let shader_path = self
            .config
            .shader_dir
            .join(if textured { "textured.hlsl" } else { "triangle.hlsl" });
        let debug = self.config.enable_debug_layer;
        let vertex_shader =
            compiler.compile(&ShaderCompileRequest::for_stage(shader_path.clone(), ShaderStage::Vertex, debug))?;
        let pixel_shader =
            compiler.compile(&ShaderCompileRequest::for_stage(shader_path.clone(), ShaderStage::Pixel, debug))?;
        if vertex_shader.stage != ShaderStage::Vertex || pixel_shader.stage != ShaderStage::Pixel {
            return Err(Error::InvalidResource(format!(
                "{:?} compiled to {:?}/{:?} stages",
                shader_path, vertex_shader.stage, pixel_shader.stage
            )));
        }

        let (input_layout, vertex_stride) = if textured {
            (TexturedVertex::input_layout(), std::mem::size_of::<TexturedVertex>() as u32)
        } else {
            (ColorVertex::input_layout(), std::mem::size_of::<ColorVertex>() as u32)
        };
        let pipeline_state = self.device.create_pipeline_state(&PipelineStateDesc {
            root_signature: root_signature.as_ref(),
            vertex_shader: &vertex_shader,
            pixel_shader: &pixel_shader,
            input_layout,
            vertex_stride,
            render_target_format: self.swapchain.format(),
        })?;

        // Three vertices, read by the GPU straight from the upload heap
        let aspect_ratio = self.config.aspect_ratio();
        let vertex_buffer = if textured {
            let vertices = triangle_textured(aspect_ratio);
            self.uploader
                .create_mapped_buffer("vertex_buffer", bytemuck::cast_slice(&vertices))?
        } else {
            let vertices = triangle_colored(aspect_ratio);
            self.uploader
                .create_mapped_buffer("vertex_buffer", bytemuck::cast_slice(&vertices))?
        };

        self.assets = Assets {
            root_signature: Some(root_signature),
            pipeline_state: Some(pipeline_state),
            vertex_buffer: Some(vertex_buffer),
            vertex_stride,
            vertex_count: 3,
            texture: None,
        };

        if textured {
            self.upload_checkerboard()?;
        }
        Ok(())
    }

    /// Record, submit and signal the checkerboard upload on slot 0
    ///
    /// The first frame rendered on slot 0 waits for it; its staging buffer
    /// is released by the first collect after that.
    fn upload_checkerboard(&mut self) -> Result<()> {
        let desc = TextureDesc {
            name: "checkerboard".to_string(),
            width: TEXTURE_SIZE,
            height: TEXTURE_SIZE,
            format: TextureFormat::R8G8B8A8_UNORM,
            usage: TextureUsage::Sampled,
        };
        let pixels = generate_checkerboard(desc.width, desc.height, desc.format.bytes_per_pixel());

        self.recorder.begin(
            self.slots.get_mut(0)?,
            &self.sync,
            self.assets.pipeline_state.as_deref(),
        )?;
        let texture = self.uploader.upload_texture(self.recorder.list_mut()?, &desc, &pixels)?;

        let srv = self.descriptors.allocate_srv(0)?;
        self.device.create_shader_resource_view(texture.as_ref(), srv)?;
        self.assets.texture = Some(texture);

        self.recorder.end()?;
        let slot = self.recorder.submit(self.device.as_ref(), &mut self.sync)?;
        let value = self.sync.signal_and_advance(self.device.as_ref())?;
        self.slots.get_mut(slot)?.mark_submitted(value)?;
        self.uploader.retire_staging(value);

        pipeline_debug!("frame_pipeline", "Texture upload submitted at fence value {}", value);
        Ok(())
    }

    /// Per-frame simulation hook, nothing is animated
    pub fn update(&mut self, _delta: Duration) -> Result<()> {
        self.ensure_running("update", PipelineStage::FrameSubmission)
    }

    /// Record, submit and present one frame
    ///
    /// While the surface is out of date the frame is skipped and `Ok` is
    /// returned; the host recreates the swap chain through `resize`.
    pub fn render_frame(&mut self) -> Result<()> {
        self.ensure_running("render_frame", PipelineStage::FrameSubmission)?;
        if self.surface_stale {
            self.frames_skipped += 1;
            pipeline_trace!("frame_pipeline", "Frame skipped, surface out of date");
            return Ok(());
        }
        match self.record_and_present() {
            Ok(()) => Ok(()),
            Err(e) if e.is_surface_out_of_date() => {
                self.frames_skipped += 1;
                self.mark_surface_stale(&e);
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                Err(e.at_stage(PipelineStage::FrameSubmission))
            }
        }
    }

    fn mark_surface_stale(&mut self, cause: &Error) {
        if !self.surface_stale {
            pipeline_warn!("frame_pipeline", "{}, rendering paused until resize", cause);
        }
        self.surface_stale = true;
    }

    fn record_and_present(&mut self) -> Result<()> {
        let index = self.swapchain.current_back_buffer_index();

        // Double buffered: returns at once unless the slot is still in flight.
        // Stall per frame: the previous frame was already waited for.
        self.sync.wait_for_slot(self.slots.get(index)?)?.into_result()?;
        self.uploader.collect(self.sync.completed_value()?);

        self.recorder.begin(
            self.slots.get_mut(index)?,
            &self.sync,
            self.assets.pipeline_state.as_deref(),
        )?;

        let slot = self.slots.get(index)?;
        let descriptor_table = if self.capabilities.contains(Capabilities::HAS_TEXTURE) {
            Some((self.descriptors.srv_heap()?.as_ref(), self.descriptors.srv_gpu_handle(0)?))
        } else {
            None
        };
        let vertex_buffer = self.assets.vertex_buffer.as_ref().map(|buffer| VertexBufferView {
            buffer: buffer.as_ref(),
            size_in_bytes: buffer.size() as u32,
            stride_in_bytes: self.assets.vertex_stride,
        });
        let frame = FrameCommands {
            root_signature: self.assets.root_signature.as_deref(),
            descriptor_table,
            viewport: self.viewport,
            scissor: self.scissor,
            back_buffer: slot.back_buffer()?.as_ref(),
            rtv: slot.rtv()?,
            clear_color: self.config.clear_color,
            vertex_buffer,
            vertex_count: self.assets.vertex_count,
        };
        self.recorder.record_frame(&frame)?;
        self.recorder.end()?;
        let submitted = self.recorder.submit(self.device.as_ref(), &mut self.sync)?;

        // Signal before present so a failed present leaves no unfenced work
        let value = self.sync.signal_and_advance(self.device.as_ref())?;
        self.slots.get_mut(submitted)?.mark_submitted(value)?;
        self.uploader.retire_staging(value);

        self.swapchain.present()?;
        self.presents += 1;

        if self.sync.strategy() == SyncStrategy::StallPerFrame {
            self.sync.wait_for_value(value)?.into_result()?;
            self.uploader.collect(self.sync.completed_value()?);
        }

        self.frames_rendered += 1;
        pipeline_trace!(
            "frame_pipeline",
            "Frame {} presented from slot {} (fence value {})",
            self.frames_rendered,
            submitted,
            value
        );
        Ok(())
    }

    /// Recreate the swap chain buffers for a new surface size
    ///
    /// Zero-sized requests (minimized window) are ignored. Unchanged sizes
    /// are ignored too, unless the surface went out of date. Drains the GPU
    /// first: no back buffer may be referenced while resizing.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_running("resize", PipelineStage::FrameSubmission)?;
        if width == 0 || height == 0 {
            pipeline_debug!("frame_pipeline", "Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        if !self.surface_stale && self.swapchain.extent() == SurfaceSize::new(width, height) {
            return Ok(());
        }

        match self.recreate_back_buffers(width, height) {
            Ok(()) => {
                self.surface_stale = false;
                Ok(())
            }
            Err(e) if e.is_surface_out_of_date() => {
                self.mark_surface_stale(&e);
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                Err(e.at_stage(PipelineStage::FrameSubmission))
            }
        }
    }

    fn recreate_back_buffers(&mut self, width: u32, height: u32) -> Result<()> {
        self.sync.drain(self.device.as_ref())?.into_result()?;
        self.uploader.collect(self.sync.completed_value()?);

        for slot in self.slots.iter_mut() {
            slot.release_back_buffer();
        }
        self.swapchain.resize(width, height)?;
        if self.swapchain.buffer_count() as usize != self.slots.len() {
            return Err(Error::InitializationFailed(format!(
                "swap chain came back with {} buffers, expected {}",
                self.swapchain.buffer_count(),
                self.slots.len()
            )));
        }
        attach_back_buffers(
            self.device.as_ref(),
            self.swapchain.as_ref(),
            &self.descriptors,
            &mut self.slots,
        )?;

        let extent = self.swapchain.extent();
        self.viewport = Viewport::full(extent.width, extent.height);
        self.scissor = Rect::full(extent.width, extent.height);
        self.config.width = extent.width;
        self.config.height = extent.height;

        pipeline_info!("frame_pipeline", "Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Drain the GPU and release everything
    ///
    /// Valid once, from `Running` or `Failed`.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == LifecycleState::ShutDown {
            return Err(Error::SynchronizationMisuse("shutdown called twice".to_string())
                .at_stage(PipelineStage::Shutdown));
        }
        self.state = LifecycleState::ShutDown;

        let drained = self
            .sync
            .drain(self.device.as_ref())
            .and_then(WaitOutcome::into_result)
            .and_then(|_| self.sync.completed_value());
        match drained {
            Ok(completed) => {
                self.uploader.collect(completed);
            }
            Err(e) => return Err(e.at_stage(PipelineStage::Shutdown)),
        }
        // Presents are not fenced, the queue must be idle before the swap chain goes
        self.device
            .wait_idle()
            .map_err(|e| e.at_stage(PipelineStage::Shutdown))?;

        pipeline_info!(
            "frame_pipeline",
            "Pipeline shut down after {} frames (last fence value {})",
            self.frames_rendered,
            self.sync.last_signaled()
        );
        Ok(())
    }

    /// Best-effort cleanup when asset loading fails
    fn abort(&mut self) {
        self.state = LifecycleState::ShutDown;
        self.uploader.retire_staging(self.sync.last_signaled());
        match self.sync.drain(self.device.as_ref()).and_then(WaitOutcome::into_result) {
            Ok(_) => {
                if let Ok(completed) = self.sync.completed_value() {
                    self.uploader.collect(completed);
                }
            }
            Err(e) => {
                pipeline_warn!("frame_pipeline", "Drain after failed initialization: {}", e);
            }
        }
    }

    fn ensure_running(&self, operation: &str, stage: PipelineStage) -> Result<()> {
        match self.state {
            LifecycleState::Running => Ok(()),
            other => Err(Error::SynchronizationMisuse(format!(
                "{} called on a pipeline in state {:?}",
                operation, other
            ))
            .at_stage(stage)),
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state
    }

    /// True while frames are skipped until the swap chain is recreated
    pub fn is_surface_stale(&self) -> bool {
        self.surface_stale
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn adapter_info(&self) -> AdapterInfo {
        self.device.adapter_info()
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.swapchain.extent()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn frame_slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Checkerboard texture, when the pipeline samples one
    pub fn texture(&self) -> Option<&Arc<dyn Texture>> {
        self.assets.texture.as_ref()
    }

    pub fn vertex_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.assets.vertex_buffer.as_ref()
    }

    pub fn stats(&self) -> FrameStats {
        let sync = self.sync.stats();
        FrameStats {
            frames_rendered: self.frames_rendered,
            presents: self.presents,
            blocking_waits: sync.blocking_waits,
            immediate_waits: sync.immediate_waits,
            staging_buffers_released: self.uploader.stats().staging_buffers_released,
            frames_skipped: self.frames_skipped,
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if self.state == LifecycleState::ShutDown {
            return;
        }
        pipeline_warn!("frame_pipeline", "Pipeline dropped without shutdown, draining the GPU");
        if let Err(e) = self.shutdown() {
            pipeline_warn!("frame_pipeline", "Drain on drop failed: {}", e);
        }
    }
}

/// Create one render target view per back buffer and hand both to the slot
fn attach_back_buffers(
    device: &dyn GraphicsDevice,
    swapchain: &dyn Swapchain,
    descriptors: &DescriptorAllocator,
    slots: &mut FrameSlots,
) -> Result<()> {
    for slot in slots.iter_mut() {
        let back_buffer = swapchain.back_buffer(slot.index())?;
        let rtv = descriptors.allocate_rtv(slot.index())?;
        device.create_render_target_view(back_buffer.as_ref(), rtv)?;
        slot.attach_back_buffer(back_buffer, rtv);
    }
    Ok(())
}

#[cfg(test)]
#[path = "frame_pipeline_tests.rs"]
mod tests;
