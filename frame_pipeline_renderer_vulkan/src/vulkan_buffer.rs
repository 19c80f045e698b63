/// Buffer - Vulkan implementation of Buffer trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::any::Any;
use std::sync::Arc;

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{Buffer as PipelineBuffer, BufferDesc, HeapType};
use frame_pipeline::{pipeline_bail, pipeline_error};

use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_format::{heap_to_memory_location, vk_result_to_error};

/// Vulkan buffer implementation
pub struct Buffer {
    /// Shared GPU context (device, allocator, queue)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    pub(crate) size: u64,
    heap: HeapType,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory from `desc.heap`
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", desc.name)));
        }

        let usage = vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::VERTEX_BUFFER;
        let info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let buffer = ctx.device.create_buffer(&info, None).map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create buffer '{}': {:?}", desc.name, e);
                vk_result_to_error(e, "Failed to create buffer")
            })?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = lock(&ctx.allocator).allocate(&AllocationCreateDesc {
                name: &desc.name,
                requirements,
                location: heap_to_memory_location(desc.heap),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    pipeline_error!("frame_pipeline::vulkan",
                        "Failed to allocate {} bytes for buffer '{}': {:?}", desc.size, desc.name, e);
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                pipeline_error!("frame_pipeline::vulkan", "Failed to bind buffer memory: {:?}", e);
                lock(&ctx.allocator).free(allocation).ok();
                ctx.device.destroy_buffer(buffer, None);
                return Err(vk_result_to_error(e, "Failed to bind buffer memory"));
            }

            Ok(Self {
                ctx,
                buffer,
                allocation: Some(allocation),
                size: desc.size,
                heap: desc.heap,
            })
        }
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(Error::InvalidResource(format!(
                "Range {}..{} exceeds buffer size {}",
                offset,
                offset.saturating_add(len as u64),
                self.size
            )));
        }
        Ok(())
    }

    fn mapped_ptr(&self) -> Result<*mut u8> {
        let allocation = match &self.allocation {
            Some(allocation) => allocation,
            None => pipeline_bail!("frame_pipeline::vulkan", "Buffer has no GPU allocation"),
        };
        allocation
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| Error::InvalidResource("Buffer is not CPU-accessible".to_string()))
    }
}

impl PipelineBuffer for Buffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn heap(&self) -> HeapType {
        self.heap
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.heap != HeapType::Upload {
            return Err(Error::InvalidResource(format!(
                "write to a buffer in the {:?} heap",
                self.heap
            )));
        }
        self.check_range(offset, data.len())?;
        let mapped = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        if !self.heap.is_cpu_visible() {
            return Err(Error::InvalidResource(
                "read from a buffer in the Default heap".to_string(),
            ));
        }
        self.check_range(offset, out.len())?;
        let mapped = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(mapped.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                lock(&self.ctx.allocator).free(allocation).ok();
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
