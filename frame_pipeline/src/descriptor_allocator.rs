/// Descriptor allocator - fixed-capacity RTV and SRV heaps
///
/// Handles are computed as `heap start + index * stride`, with the stride
/// reported by the device. Heaps never grow; an index past the capacity is
/// a `DescriptorOutOfRange` error rather than a write into a neighbour.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    CpuDescriptorHandle, DescriptorHeap, DescriptorHeapKind, GpuDescriptorHandle, GraphicsDevice,
};
use crate::pipeline_debug;

pub struct DescriptorAllocator {
    rtv_heap: Arc<dyn DescriptorHeap>,
    rtv_stride: u64,
    srv_heap: Option<Arc<dyn DescriptorHeap>>,
    srv_stride: u64,
}

impl DescriptorAllocator {
    /// Create an RTV heap of `rtv_capacity` and, if `srv_capacity > 0`, a
    /// shader-visible SRV heap
    pub fn new(device: &dyn GraphicsDevice, rtv_capacity: u32, srv_capacity: u32) -> Result<Self> {
        let rtv_heap = device.create_descriptor_heap(DescriptorHeapKind::RenderTarget, rtv_capacity)?;
        let srv_heap = if srv_capacity > 0 {
            Some(device.create_descriptor_heap(DescriptorHeapKind::ShaderResource, srv_capacity)?)
        } else {
            None
        };

        pipeline_debug!(
            "frame_pipeline::descriptors",
            "Created descriptor heaps (rtv: {}, srv: {})",
            rtv_capacity,
            srv_capacity
        );

        Ok(Self {
            rtv_heap,
            rtv_stride: device.descriptor_stride(DescriptorHeapKind::RenderTarget),
            srv_heap,
            srv_stride: device.descriptor_stride(DescriptorHeapKind::ShaderResource),
        })
    }

    /// Render-target view handle `index`
    pub fn allocate_rtv(&self, index: u32) -> Result<CpuDescriptorHandle> {
        check_index(self.rtv_heap.as_ref(), index)?;
        Ok(self.rtv_heap.cpu_start().offset(index as u64 * self.rtv_stride))
    }

    /// Shader-resource view handle `index`, for writing the view
    pub fn allocate_srv(&self, index: u32) -> Result<CpuDescriptorHandle> {
        let heap = self.srv_heap()?;
        check_index(heap.as_ref(), index)?;
        Ok(heap.cpu_start().offset(index as u64 * self.srv_stride))
    }

    /// Shader-resource view handle `index`, for binding a descriptor table
    pub fn srv_gpu_handle(&self, index: u32) -> Result<GpuDescriptorHandle> {
        let heap = self.srv_heap()?;
        check_index(heap.as_ref(), index)?;
        let start = heap.gpu_start().ok_or_else(|| {
            Error::InvalidResource("shader-resource heap is not shader visible".to_string())
        })?;
        Ok(start.offset(index as u64 * self.srv_stride))
    }

    pub fn rtv_heap(&self) -> &Arc<dyn DescriptorHeap> {
        &self.rtv_heap
    }

    pub fn srv_heap(&self) -> Result<&Arc<dyn DescriptorHeap>> {
        self.srv_heap
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("no shader-resource heap was created".to_string()))
    }

    pub fn has_srv_heap(&self) -> bool {
        self.srv_heap.is_some()
    }
}

fn check_index(heap: &dyn DescriptorHeap, index: u32) -> Result<()> {
    if index >= heap.capacity() {
        return Err(Error::DescriptorOutOfRange {
            kind: heap.kind(),
            index,
            capacity: heap.capacity(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "descriptor_allocator_tests.rs"]
mod tests;
