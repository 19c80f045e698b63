/// DescriptorHeap - Vulkan implementation of DescriptorHeap trait
///
/// Handles are `(heap id << 32) | index` with a stride of one. Render-target
/// heaps only reserve handles: the device records which image view each
/// handle names. Shader-resource heaps own one descriptor set whose binding 0
/// is an array of `capacity` sampled images.

use ash::vk;
use std::any::Any;
use std::sync::Arc;

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{
    CpuDescriptorHandle, DescriptorHeap as PipelineDescriptorHeap, DescriptorHeapKind,
    GpuDescriptorHandle,
};
use frame_pipeline::pipeline_error;

use crate::vulkan_context::{make_handle, GpuContext};
use crate::vulkan_format::vk_result_to_error;

/// Vulkan descriptor heap implementation
pub struct DescriptorHeap {
    ctx: Arc<GpuContext>,
    pub(crate) heap_id: u32,
    kind: DescriptorHeapKind,
    capacity: u32,
    /// Shader-resource heaps only
    pool: Option<vk::DescriptorPool>,
    pub(crate) set: Option<vk::DescriptorSet>,
}

impl DescriptorHeap {
    pub(crate) fn new(ctx: Arc<GpuContext>, kind: DescriptorHeapKind, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidResource(format!("{:?} heap with zero capacity", kind)));
        }

        let heap_id = ctx.next_heap_id();

        let (pool, set) = match kind {
            DescriptorHeapKind::RenderTarget => (None, None),
            DescriptorHeapKind::ShaderResource => {
                let layout = ctx.srv_set_layout(capacity)?;
                let pool_sizes = [vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::SAMPLED_IMAGE,
                    descriptor_count: capacity,
                }];
                let pool_info = vk::DescriptorPoolCreateInfo::default()
                    .pool_sizes(&pool_sizes)
                    .max_sets(1);

                unsafe {
                    let pool = ctx.device.create_descriptor_pool(&pool_info, None).map_err(|e| {
                        pipeline_error!("frame_pipeline::vulkan", "Failed to create descriptor pool: {:?}", e);
                        vk_result_to_error(e, "Failed to create descriptor pool")
                    })?;

                    let layouts = [layout];
                    let alloc_info = vk::DescriptorSetAllocateInfo::default()
                        .descriptor_pool(pool)
                        .set_layouts(&layouts);
                    let set = match ctx.device.allocate_descriptor_sets(&alloc_info) {
                        Ok(sets) => sets[0],
                        Err(e) => {
                            pipeline_error!("frame_pipeline::vulkan", "Failed to allocate descriptor set: {:?}", e);
                            ctx.device.destroy_descriptor_pool(pool, None);
                            return Err(vk_result_to_error(e, "Failed to allocate descriptor set"));
                        }
                    };

                    ctx.register_srv_heap(heap_id, set, capacity);
                    (Some(pool), Some(set))
                }
            }
        };

        Ok(Self {
            ctx,
            heap_id,
            kind,
            capacity,
            pool,
            set,
        })
    }
}

impl PipelineDescriptorHeap for DescriptorHeap {
    fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(make_handle(self.heap_id, 0))
    }

    fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        match self.kind {
            DescriptorHeapKind::ShaderResource => Some(GpuDescriptorHandle(make_handle(self.heap_id, 0))),
            DescriptorHeapKind::RenderTarget => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for DescriptorHeap {
    fn drop(&mut self) {
        match self.kind {
            DescriptorHeapKind::RenderTarget => self.ctx.forget_heap_views(self.heap_id),
            DescriptorHeapKind::ShaderResource => self.ctx.unregister_srv_heap(self.heap_id),
        }
        if let Some(pool) = self.pool.take() {
            unsafe {
                self.ctx.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}
