/// CommandAllocator and CommandList - Vulkan implementations
///
/// An allocator is a command pool with one primary command buffer. A list
/// records into the buffer of the allocator it was last reset with, so one
/// list can rotate across the per-slot allocators.
///
/// Render targets use dynamic rendering. A rendering scope opens lazily on
/// the first clear or draw and closes before barriers, copies and `close`.

use ash::vk;
use std::any::Any;
use std::sync::Arc;

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{
    BarrierTarget, Buffer as PipelineBuffer, CommandAllocator as CommandAllocatorTrait,
    CommandList as CommandListTrait, CpuDescriptorHandle, DescriptorHeap as PipelineDescriptorHeap,
    DescriptorHeapKind, GpuDescriptorHandle, PipelineState as PipelineStateTrait,
    PrimitiveTopology, Rect, ResourceBarrier, RootSignature as RootSignatureTrait,
    Texture as PipelineTexture, TextureCopyLayout, VertexBufferView, Viewport,
};
use frame_pipeline::{pipeline_err, pipeline_error, pipeline_misuse};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::{split_handle, GpuContext, RenderTargetView};
use crate::vulkan_descriptor_heap::DescriptorHeap;
use crate::vulkan_format::{resource_state_to_vk, topology_to_vk, vk_result_to_error};
use crate::vulkan_pipeline::{PipelineState, RootSignature};
use crate::vulkan_texture::{color_subresource_range, Texture};

// ============================================================================
// DOWNCAST HELPERS
// ============================================================================

fn vk_buffer(buffer: &dyn PipelineBuffer) -> Result<&Buffer> {
    buffer
        .as_any()
        .downcast_ref::<Buffer>()
        .ok_or_else(|| Error::InvalidResource("Buffer is not a Vulkan buffer".to_string()))
}

fn vk_texture(texture: &dyn PipelineTexture) -> Result<&Texture> {
    texture
        .as_any()
        .downcast_ref::<Texture>()
        .ok_or_else(|| Error::InvalidResource("Texture is not a Vulkan texture".to_string()))
}

// ============================================================================
// COMMAND ALLOCATOR
// ============================================================================

/// Vulkan command allocator implementation
pub struct CommandAllocator {
    ctx: Arc<GpuContext>,
    pool: vk::CommandPool,
    pub(crate) buffer: vk::CommandBuffer,
}

impl CommandAllocator {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        unsafe {
            let pool = ctx.device.create_command_pool(&pool_info, None).map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create command pool: {:?}", e);
                vk_result_to_error(e, "Failed to create command pool")
            })?;

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffer = match ctx.device.allocate_command_buffers(&alloc_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to allocate command buffer: {:?}", e);
                    ctx.device.destroy_command_pool(pool, None);
                    return Err(vk_result_to_error(e, "Failed to allocate command buffer"));
                }
            };

            Ok(Self { ctx, pool, buffer })
        }
    }
}

impl CommandAllocatorTrait for CommandAllocator {
    fn reset(&mut self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| vk_result_to_error(e, "Failed to reset command pool"))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for CommandAllocator {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_command_pool(self.pool, None);
        }
    }
}

// ============================================================================
// COMMAND LIST
// ============================================================================

/// Vulkan command list implementation
pub struct CommandList {
    ctx: Arc<GpuContext>,
    /// Buffer of the allocator passed to the last `reset`
    pub(crate) buffer: vk::CommandBuffer,
    recording: bool,
    /// Render target of the open rendering scope
    rendering: Option<RenderTargetView>,
    render_target: Option<RenderTargetView>,
    pipeline_layout: Option<vk::PipelineLayout>,
    /// (heap id, set) of bound shader-resource heaps
    bound_heaps: Vec<(u32, vk::DescriptorSet)>,
    /// True once the recording transitioned a swapchain back buffer
    pub(crate) touches_back_buffer: bool,
}

impl CommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>, allocator: &dyn CommandAllocatorTrait) -> Result<Self> {
        let allocator = allocator
            .as_any()
            .downcast_ref::<CommandAllocator>()
            .ok_or_else(|| Error::InvalidResource("Allocator is not a Vulkan command allocator".to_string()))?;

        Ok(Self {
            ctx,
            buffer: allocator.buffer,
            recording: false,
            rendering: None,
            render_target: None,
            pipeline_layout: None,
            bound_heaps: Vec::new(),
            touches_back_buffer: false,
        })
    }

    /// True while the list accepts commands
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn cmd(&self) -> Result<vk::CommandBuffer> {
        if !self.recording {
            pipeline_misuse!("frame_pipeline::vulkan", "Command recorded into a closed command list");
        }
        Ok(self.buffer)
    }

    fn lookup_render_target(&self, rtv: CpuDescriptorHandle) -> Result<RenderTargetView> {
        self.ctx.render_target_view(rtv).ok_or_else(|| {
            pipeline_error!("frame_pipeline::vulkan", "No render target view at handle {:#x}", rtv.0);
            Error::InvalidResource(format!("No render target view at handle {:#x}", rtv.0))
        })
    }

    fn begin_rendering(&mut self, target: RenderTargetView, clear: Option<[f32; 4]>) -> Result<()> {
        let cmd = self.cmd()?;
        self.end_rendering();

        let (load_op, clear_value) = match clear {
            Some(color) => (
                vk::AttachmentLoadOp::CLEAR,
                vk::ClearValue {
                    color: vk::ClearColorValue { float32: color },
                },
            ),
            None => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
        };

        let attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(target.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value)];
        let info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            })
            .layer_count(1)
            .color_attachments(&attachments);

        unsafe {
            self.ctx.device.cmd_begin_rendering(cmd, &info);
        }
        self.rendering = Some(target);
        Ok(())
    }

    fn end_rendering(&mut self) {
        if self.rendering.take().is_some() {
            unsafe {
                self.ctx.device.cmd_end_rendering(self.buffer);
            }
        }
    }

    /// Move a texture out of UNDEFINED before its first copy
    fn prepare_first_copy(&self, cmd: vk::CommandBuffer, texture: &Texture) {
        if !texture.take_first_use() {
            return;
        }
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(color_subresource_range())
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[], &[], &[barrier],
            );
        }
    }
}

/// Region describing a pitched footprint for buffer <-> image copies
pub(crate) fn buffer_image_copy(layout: &TextureCopyLayout) -> Result<vk::BufferImageCopy> {
    if layout.bytes_per_pixel == 0 || layout.row_pitch % layout.bytes_per_pixel != 0 {
        return Err(Error::InvalidResource(format!(
            "Row pitch {} is not a whole number of {}-byte texels",
            layout.row_pitch, layout.bytes_per_pixel
        )));
    }
    Ok(vk::BufferImageCopy {
        buffer_offset: layout.offset,
        buffer_row_length: layout.row_pitch / layout.bytes_per_pixel,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: layout.width,
            height: layout.height,
            depth: 1,
        },
    })
}

/// Flip a viewport so +Y points up, matching the clip space the shaders assume
pub(crate) fn flipped_viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y + viewport.height,
        width: viewport.width,
        height: -viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub(crate) fn scissor_to_vk(rect: &Rect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.left,
            y: rect.top,
        },
        extent: vk::Extent2D {
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        },
    }
}

impl CommandListTrait for CommandList {
    fn reset(
        &mut self,
        allocator: &dyn CommandAllocatorTrait,
        initial_state: Option<&dyn PipelineStateTrait>,
    ) -> Result<()> {
        if self.recording {
            pipeline_misuse!("frame_pipeline::vulkan", "reset of a command list that is still recording");
        }
        let allocator = allocator
            .as_any()
            .downcast_ref::<CommandAllocator>()
            .ok_or_else(|| Error::InvalidResource("Allocator is not a Vulkan command allocator".to_string()))?;

        self.buffer = allocator.buffer;
        self.rendering = None;
        self.render_target = None;
        self.pipeline_layout = None;
        self.bound_heaps.clear();
        self.touches_back_buffer = false;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.ctx
                .device
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(|e| vk_result_to_error(e, "Failed to begin command buffer"))?;
        }
        self.recording = true;

        if let Some(state) = initial_state {
            self.set_pipeline_state(state)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let cmd = self.cmd()?;
        self.end_rendering();
        unsafe {
            self.ctx
                .device
                .end_command_buffer(cmd)
                .map_err(|e| vk_result_to_error(e, "Failed to end command buffer"))?;
        }
        self.recording = false;
        Ok(())
    }

    fn set_pipeline_state(&mut self, pipeline_state: &dyn PipelineStateTrait) -> Result<()> {
        let cmd = self.cmd()?;
        let pipeline = pipeline_state
            .as_any()
            .downcast_ref::<PipelineState>()
            .ok_or_else(|| Error::InvalidResource("Pipeline is not a Vulkan pipeline".to_string()))?;
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
        }
        Ok(())
    }

    fn set_graphics_root_signature(&mut self, root_signature: &dyn RootSignatureTrait) -> Result<()> {
        let cmd = self.cmd()?;
        let root = root_signature
            .as_any()
            .downcast_ref::<RootSignature>()
            .ok_or_else(|| Error::InvalidResource("Root signature is not a Vulkan root signature".to_string()))?;

        self.pipeline_layout = Some(root.pipeline_layout);
        if let Some((set_index, set)) = root.sampler_set {
            unsafe {
                self.ctx.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    root.pipeline_layout,
                    set_index,
                    &[set],
                    &[],
                );
            }
        }
        Ok(())
    }

    fn set_descriptor_heaps(&mut self, heaps: &[&dyn PipelineDescriptorHeap]) -> Result<()> {
        self.cmd()?;
        self.bound_heaps.clear();
        for heap in heaps {
            let heap = heap
                .as_any()
                .downcast_ref::<DescriptorHeap>()
                .ok_or_else(|| Error::InvalidResource("Heap is not a Vulkan descriptor heap".to_string()))?;
            match (heap.kind(), heap.set) {
                (DescriptorHeapKind::ShaderResource, Some(set)) => self.bound_heaps.push((heap.heap_id, set)),
                _ => {
                    return Err(Error::InvalidResource(
                        "Only shader-resource heaps can be bound".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    fn set_graphics_root_descriptor_table(
        &mut self,
        parameter_index: u32,
        base: GpuDescriptorHandle,
    ) -> Result<()> {
        let cmd = self.cmd()?;
        let layout = match self.pipeline_layout {
            Some(layout) => layout,
            None => pipeline_misuse!("frame_pipeline::vulkan",
                "Descriptor table bound before a root signature"),
        };

        let (heap_id, index) = split_handle(base.0);
        if index != 0 {
            return Err(pipeline_err!("frame_pipeline::vulkan",
                "Descriptor tables must start at the heap start (index {} requested)", index));
        }
        let set = match self.bound_heaps.iter().find(|(id, _)| *id == heap_id) {
            Some(&(_, set)) => set,
            None => pipeline_misuse!("frame_pipeline::vulkan",
                "Descriptor table points into heap {} which is not bound", heap_id),
        };

        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                parameter_index,
                &[set],
                &[],
            );
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let cmd = self.cmd()?;
        unsafe {
            self.ctx.device.cmd_set_viewport(cmd, 0, &[flipped_viewport(&viewport)]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, rect: Rect) -> Result<()> {
        let cmd = self.cmd()?;
        unsafe {
            self.ctx.device.cmd_set_scissor(cmd, 0, &[scissor_to_vk(&rect)]);
        }
        Ok(())
    }

    fn resource_barrier(&mut self, barrier: &ResourceBarrier<'_>) -> Result<()> {
        let cmd = self.cmd()?;
        self.end_rendering();

        let src = resource_state_to_vk(barrier.before, true);
        let dst = resource_state_to_vk(barrier.after, false);

        match barrier.target {
            BarrierTarget::Texture(texture) => {
                let texture = vk_texture(texture)?;
                if texture.is_swapchain_image() {
                    self.touches_back_buffer = true;
                }
                let image_barrier = vk::ImageMemoryBarrier::default()
                    .old_layout(src.layout)
                    .new_layout(dst.layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(texture.image)
                    .subresource_range(color_subresource_range())
                    .src_access_mask(src.access)
                    .dst_access_mask(dst.access);
                unsafe {
                    self.ctx.device.cmd_pipeline_barrier(
                        cmd,
                        src.stage,
                        dst.stage,
                        vk::DependencyFlags::empty(),
                        &[], &[], &[image_barrier],
                    );
                }
            }
            BarrierTarget::Buffer(buffer) => {
                let buffer = vk_buffer(buffer)?;
                let buffer_barrier = vk::BufferMemoryBarrier::default()
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(buffer.buffer)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .src_access_mask(src.access)
                    .dst_access_mask(dst.access);
                unsafe {
                    self.ctx.device.cmd_pipeline_barrier(
                        cmd,
                        src.stage,
                        dst.stage,
                        vk::DependencyFlags::empty(),
                        &[], &[buffer_barrier], &[],
                    );
                }
            }
        }
        Ok(())
    }

    fn set_render_target(&mut self, rtv: CpuDescriptorHandle) -> Result<()> {
        self.cmd()?;
        let target = self.lookup_render_target(rtv)?;
        if self.rendering.map_or(false, |current| current.view != target.view) {
            self.end_rendering();
        }
        self.render_target = Some(target);
        Ok(())
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) -> Result<()> {
        let target = self.lookup_render_target(rtv)?;
        self.begin_rendering(target, Some(color))
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()> {
        let cmd = self.cmd()?;
        unsafe {
            self.ctx.device.cmd_set_primitive_topology(cmd, topology_to_vk(topology));
        }
        Ok(())
    }

    fn set_vertex_buffer(&mut self, view: &VertexBufferView<'_>) -> Result<()> {
        let cmd = self.cmd()?;
        let buffer = vk_buffer(view.buffer)?;
        if view.size_in_bytes as u64 > buffer.size {
            return Err(Error::InvalidResource(format!(
                "Vertex buffer view of {} bytes exceeds buffer size {}",
                view.size_in_bytes, buffer.size
            )));
        }
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer.buffer], &[0]);
        }
        Ok(())
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        let cmd = self.cmd()?;
        if self.rendering.is_none() {
            let target = match self.render_target {
                Some(target) => target,
                None => pipeline_misuse!("frame_pipeline::vulkan", "Draw without a render target"),
            };
            self.begin_rendering(target, None)?;
        }
        unsafe {
            self.ctx
                .device
                .cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }

    fn copy_buffer_region(
        &mut self,
        dst: &dyn PipelineBuffer,
        dst_offset: u64,
        src: &dyn PipelineBuffer,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        let cmd = self.cmd()?;
        self.end_rendering();
        let dst = vk_buffer(dst)?;
        let src = vk_buffer(src)?;
        if src_offset + size > src.size || dst_offset + size > dst.size {
            return Err(Error::InvalidResource(format!(
                "Copy of {} bytes out of range (src {}+{}, dst {}+{})",
                size, src.size, src_offset, dst.size, dst_offset
            )));
        }
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
        }
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        dst: &dyn PipelineTexture,
        src: &dyn PipelineBuffer,
        layout: &TextureCopyLayout,
    ) -> Result<()> {
        let cmd = self.cmd()?;
        self.end_rendering();
        let texture = vk_texture(dst)?;
        let buffer = vk_buffer(src)?;
        if layout.total_size() > buffer.size {
            return Err(Error::InvalidResource(format!(
                "Copy footprint of {} bytes exceeds staging buffer size {}",
                layout.total_size(),
                buffer.size
            )));
        }
        let region = buffer_image_copy(layout)?;

        self.prepare_first_copy(cmd, texture);
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                cmd,
                buffer.buffer,
                texture.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    }

    fn copy_texture_to_buffer(
        &mut self,
        dst: &dyn PipelineBuffer,
        src: &dyn PipelineTexture,
        layout: &TextureCopyLayout,
    ) -> Result<()> {
        let cmd = self.cmd()?;
        self.end_rendering();
        let buffer = vk_buffer(dst)?;
        let texture = vk_texture(src)?;
        if layout.total_size() > buffer.size {
            return Err(Error::InvalidResource(format!(
                "Copy footprint of {} bytes exceeds readback buffer size {}",
                layout.total_size(),
                buffer.size
            )));
        }
        let region = buffer_image_copy(layout)?;
        unsafe {
            self.ctx.device.cmd_copy_image_to_buffer(
                cmd,
                texture.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer.buffer,
                &[region],
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;
