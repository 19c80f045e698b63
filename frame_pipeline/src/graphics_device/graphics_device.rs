/// GraphicsDevice trait - the Device Context
///
/// One adapter, one logical device, one direct queue. Every GPU object the
/// pipeline uses is created here, and all queue operations (execute, signal)
/// go through it so their relative order is the submission order.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandAllocator, CommandList, CpuDescriptorHandle, DescriptorHeap,
    DescriptorHeapKind, Fence, PipelineState, PipelineStateDesc, RootSignature,
    RootSignatureDesc, Swapchain, Texture, TextureDesc,
};

/// Adapter description, logged at initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Driver-reported device name
    pub name: String,
    /// True for software rasterizers (WARP, lavapipe)
    pub is_software: bool,
    pub vendor_id: u32,
    pub device_id: u32,
}

/// Drawable size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either extent is zero (minimized window)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Presentation surface provider
///
/// Supplied by the host window loop. The pipeline only reads the native
/// handles and the current size; resize notifications arrive through
/// `FramePipeline::resize`.
pub trait PresentationSurface: HasWindowHandle + HasDisplayHandle {
    /// Current drawable size
    fn size(&self) -> SurfaceSize;
}

/// Graphics device trait
///
/// Implemented by backend-specific devices (e.g., VulkanGraphicsDevice).
/// All methods take `&self`: backends keep the little mutable state they
/// need (queue, allocator) behind their own locks.
pub trait GraphicsDevice: Send + Sync {
    /// Describe the selected adapter
    fn adapter_info(&self) -> AdapterInfo;

    /// Create a fence starting at `initial_value`
    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>>;

    /// Create a command allocator (backing memory for one recording at a time)
    fn create_command_allocator(&self) -> Result<Box<dyn CommandAllocator>>;

    /// Create a command list, initially closed, associated with `allocator`
    fn create_command_list(&self, allocator: &dyn CommandAllocator) -> Result<Box<dyn CommandList>>;

    /// Create a descriptor heap with a fixed capacity
    ///
    /// Shader-resource heaps are shader visible, render-target heaps are not.
    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Arc<dyn DescriptorHeap>>;

    /// Distance between two consecutive descriptors of `kind`
    fn descriptor_stride(&self, kind: DescriptorHeapKind) -> u64;

    /// Write a render-target view of `texture` at `handle`
    fn create_render_target_view(&self, texture: &dyn Texture, handle: CpuDescriptorHandle) -> Result<()>;

    /// Write a shader-resource view of `texture` at `handle`
    fn create_shader_resource_view(&self, texture: &dyn Texture, handle: CpuDescriptorHandle) -> Result<()>;

    /// Create a buffer in the heap named by `desc`
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a device-local 2D texture
    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a root signature (resource binding layout)
    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<Arc<dyn RootSignature>>;

    /// Create a graphics pipeline state object
    fn create_pipeline_state(&self, desc: &PipelineStateDesc<'_>) -> Result<Arc<dyn PipelineState>>;

    /// Create the presentation chain for `surface`
    fn create_swapchain(
        &self,
        surface: &dyn PresentationSurface,
        buffer_count: u32,
        vsync: bool,
    ) -> Result<Box<dyn Swapchain>>;

    /// Submit closed command lists to the queue, in order
    fn execute_command_lists(&self, lists: &[&dyn CommandList]) -> Result<()>;

    /// Enqueue a fence signal after all previously submitted work
    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()>;

    /// Required row pitch alignment for buffer <-> texture copies
    fn texture_pitch_alignment(&self) -> u32;

    /// Block until the queue is idle (backend teardown only)
    fn wait_idle(&self) -> Result<()>;
}
