/// Buffer and Texture traits and their descriptors

use std::any::Any;

use crate::error::Result;

/// Memory heap a resource lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// Device-local, not CPU accessible
    Default,
    /// CPU-writable, GPU-readable (staging, small direct-mapped buffers)
    Upload,
    /// GPU-writable, CPU-readable (copy-back)
    Readback,
}

impl HeapType {
    /// True if the CPU can map memory in this heap
    pub fn is_cpu_visible(&self) -> bool {
        !matches!(self, HeapType::Default)
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub heap: HeapType,
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// The buffer is destroyed when the last reference is dropped; callers keep
/// a reference alive until the GPU is done with it.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Heap this buffer was created in
    fn heap(&self) -> HeapType;

    /// Write through the CPU mapping (Upload heap only)
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Read through the CPU mapping (Readback or Upload heap)
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

/// Texel formats used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    B8G8R8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_SRGB,
}

impl TextureFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_SRGB => 4,
        }
    }
}

/// How a texture will be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Sampled by shaders, filled by copies
    Sampled,
    /// Swap chain back buffer
    RenderTarget,
}

/// Descriptor for creating a 2D texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    /// Debug name
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Tightly packed size of the top mip level
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Texture resource trait
pub trait Texture: Send + Sync {
    fn desc(&self) -> &TextureDesc;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
