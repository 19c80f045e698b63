/// DescriptorHeap trait and descriptor handles

use std::any::Any;

/// Kind of descriptor a heap holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Render-target views (not shader visible)
    RenderTarget,
    /// Shader-resource views (shader visible)
    ShaderResource,
}

/// CPU-side descriptor address, used to write views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    pub fn offset(self, bytes: u64) -> Self {
        CpuDescriptorHandle(self.0 + bytes)
    }
}

/// GPU-side descriptor address, used to bind descriptor tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

impl GpuDescriptorHandle {
    pub fn offset(self, bytes: u64) -> Self {
        GpuDescriptorHandle(self.0 + bytes)
    }
}

/// Fixed-capacity array of descriptors
pub trait DescriptorHeap: Send + Sync {
    fn kind(&self) -> DescriptorHeapKind;

    /// Number of descriptors, fixed at creation
    fn capacity(&self) -> u32;

    /// Handle of descriptor 0 for CPU writes
    fn cpu_start(&self) -> CpuDescriptorHandle;

    /// Handle of descriptor 0 for GPU binding, None if not shader visible
    fn gpu_start(&self) -> Option<GpuDescriptorHandle>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
