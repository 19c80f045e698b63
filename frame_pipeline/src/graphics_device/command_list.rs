/// CommandList and CommandAllocator traits - for recording GPU work

use std::any::Any;

use crate::error::Result;
use crate::graphics_device::{
    Buffer, CpuDescriptorHandle, DescriptorHeap, GpuDescriptorHandle, PipelineState,
    RootSignature, Texture,
};

/// Backing memory for command recording
///
/// Resetting an allocator while the GPU still executes commands recorded
/// from it is undefined behavior on real hardware. Callers must prove the
/// previous submission completed first (see `FrameSynchronizer`).
pub trait CommandAllocator: Send + Sync {
    /// Reclaim the memory of every recording made from this allocator
    fn reset(&mut self) -> Result<()>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

/// Command list for recording one batch of GPU work
///
/// Lists are created closed. `reset` opens a recording against an
/// allocator, `close` makes the list submittable.
pub trait CommandList: Send + Sync {
    /// Begin a new recording backed by `allocator`
    ///
    /// # Arguments
    ///
    /// * `allocator` - Allocator that backs the new recording
    /// * `initial_state` - Pipeline state bound at the start of the recording
    fn reset(
        &mut self,
        allocator: &dyn CommandAllocator,
        initial_state: Option<&dyn PipelineState>,
    ) -> Result<()>;

    /// Close the recording
    fn close(&mut self) -> Result<()>;

    /// Bind a graphics pipeline state
    fn set_pipeline_state(&mut self, pipeline_state: &dyn PipelineState) -> Result<()>;

    /// Bind the root signature used by subsequent root arguments
    fn set_graphics_root_signature(&mut self, root_signature: &dyn RootSignature) -> Result<()>;

    /// Bind shader-visible descriptor heaps
    fn set_descriptor_heaps(&mut self, heaps: &[&dyn DescriptorHeap]) -> Result<()>;

    /// Point a root descriptor table parameter at `base`
    fn set_graphics_root_descriptor_table(
        &mut self,
        parameter_index: u32,
        base: GpuDescriptorHandle,
    ) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn set_scissor(&mut self, rect: Rect) -> Result<()>;

    /// Record a resource state transition
    fn resource_barrier(&mut self, barrier: &ResourceBarrier<'_>) -> Result<()>;

    /// Bind a single render target
    fn set_render_target(&mut self, rtv: CpuDescriptorHandle) -> Result<()>;

    /// Clear a render target to `color` (RGBA)
    fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) -> Result<()>;

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()>;

    /// Bind a vertex buffer to slot 0
    fn set_vertex_buffer(&mut self, view: &VertexBufferView<'_>) -> Result<()>;

    /// Draw non-indexed, instanced primitives
    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;

    /// Copy `size` bytes between buffers
    fn copy_buffer_region(
        &mut self,
        dst: &dyn Buffer,
        dst_offset: u64,
        src: &dyn Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Copy a pitched image footprint from a buffer into a texture
    fn copy_buffer_to_texture(
        &mut self,
        dst: &dyn Texture,
        src: &dyn Buffer,
        layout: &TextureCopyLayout,
    ) -> Result<()>;

    /// Copy a texture into a pitched image footprint inside a buffer
    fn copy_texture_to_buffer(
        &mut self,
        dst: &dyn Buffer,
        src: &dyn Texture,
        layout: &TextureCopyLayout,
    ) -> Result<()>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with depth range [0, 1]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Integer rectangle (left, top, right, bottom)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Full-surface scissor rectangle
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

/// Resource usage state, as declared by barriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    /// Back buffer ready to be presented
    Present,
    RenderTarget,
    CopySource,
    CopyDest,
    PixelShaderResource,
    VertexAndConstantBuffer,
    /// CPU-written upload memory read directly by the GPU
    GenericRead,
}

/// Resource referenced by a barrier
#[derive(Clone, Copy)]
pub enum BarrierTarget<'a> {
    Buffer(&'a dyn Buffer),
    Texture(&'a dyn Texture),
}

/// State transition barrier
#[derive(Clone, Copy)]
pub struct ResourceBarrier<'a> {
    pub target: BarrierTarget<'a>,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl<'a> ResourceBarrier<'a> {
    pub fn texture(texture: &'a dyn Texture, before: ResourceState, after: ResourceState) -> Self {
        Self {
            target: BarrierTarget::Texture(texture),
            before,
            after,
        }
    }

    pub fn buffer(buffer: &'a dyn Buffer, before: ResourceState, after: ResourceState) -> Self {
        Self {
            target: BarrierTarget::Buffer(buffer),
            before,
            after,
        }
    }
}

/// Primitive topology for draw calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// Vertex buffer binding
#[derive(Clone, Copy)]
pub struct VertexBufferView<'a> {
    pub buffer: &'a dyn Buffer,
    /// Size of the bound range in bytes
    pub size_in_bytes: u32,
    /// Distance between consecutive vertices in bytes
    pub stride_in_bytes: u32,
}

/// Placement of a tightly described image inside a linear buffer
///
/// Row `y` of the image starts at `offset + y * row_pitch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyLayout {
    pub offset: u64,
    /// Bytes between row starts (padded to the device alignment)
    pub row_pitch: u32,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl TextureCopyLayout {
    /// Footprint of a `width x height` image with rows padded to `alignment`
    pub fn padded(width: u32, height: u32, bytes_per_pixel: u32, alignment: u32) -> Self {
        let tight = width * bytes_per_pixel;
        let alignment = alignment.max(1);
        let row_pitch = tight.div_ceil(alignment) * alignment;
        Self {
            offset: 0,
            row_pitch,
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Bytes actually occupied by pixel data in one row
    pub fn tight_row_size(&self) -> u32 {
        self.width * self.bytes_per_pixel
    }

    /// Buffer bytes needed to hold the footprint
    pub fn total_size(&self) -> u64 {
        if self.height == 0 {
            return self.offset;
        }
        self.offset
            + self.row_pitch as u64 * (self.height as u64 - 1)
            + self.tight_row_size() as u64
    }
}
