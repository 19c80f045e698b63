/// Texture - Vulkan implementation of Texture trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{Texture as PipelineTexture, TextureDesc, TextureUsage};
use frame_pipeline::pipeline_error;

use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_format::{texture_format_to_vk, vk_result_to_error};

/// Vulkan texture implementation
///
/// Swapchain back buffers wrap an image owned by the swapchain: only the
/// view is destroyed with them.
pub struct Texture {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
    owns_image: bool,
    desc: TextureDesc,
    /// False until the first copy moved the image out of UNDEFINED
    initialized: AtomicBool,
}

fn color_view(ctx: &GpuContext, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(color_subresource_range());

    unsafe {
        ctx.device.create_image_view(&info, None).map_err(|e| {
            pipeline_error!("frame_pipeline::vulkan", "Failed to create image view: {:?}", e);
            vk_result_to_error(e, "Failed to create image view")
        })
    }
}

/// The single color mip and layer every pipeline texture has
pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Texture {
    /// Create a device-local 2D texture with one mip level
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!(
                "Texture '{}' has zero extent ({}x{})",
                desc.name, desc.width, desc.height
            )));
        }

        let format = texture_format_to_vk(desc.format);
        let usage = match desc.usage {
            TextureUsage::Sampled => {
                vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC
            }
            TextureUsage::RenderTarget => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
            }
        };

        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = ctx.device.create_image(&info, None).map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create image '{}': {:?}", desc.name, e);
                vk_result_to_error(e, "Failed to create image")
            })?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = lock(&ctx.allocator).allocate(&AllocationCreateDesc {
                name: &desc.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    pipeline_error!("frame_pipeline::vulkan",
                        "Failed to allocate memory for texture '{}': {:?}", desc.name, e);
                    ctx.device.destroy_image(image, None);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                pipeline_error!("frame_pipeline::vulkan", "Failed to bind image memory: {:?}", e);
                lock(&ctx.allocator).free(allocation).ok();
                ctx.device.destroy_image(image, None);
                return Err(vk_result_to_error(e, "Failed to bind image memory"));
            }

            let view = match color_view(&ctx, image, format) {
                Ok(view) => view,
                Err(e) => {
                    lock(&ctx.allocator).free(allocation).ok();
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            Ok(Self {
                ctx,
                image,
                view,
                allocation: Some(allocation),
                owns_image: true,
                desc: desc.clone(),
                initialized: AtomicBool::new(false),
            })
        }
    }

    /// Wrap a swapchain image
    pub(crate) fn from_swapchain_image(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        desc: TextureDesc,
    ) -> Result<Self> {
        let view = color_view(&ctx, image, texture_format_to_vk(desc.format))?;
        Ok(Self {
            ctx,
            image,
            view,
            allocation: None,
            owns_image: false,
            desc,
            initialized: AtomicBool::new(true),
        })
    }

    pub(crate) fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.desc.width,
            height: self.desc.height,
        }
    }

    pub(crate) fn is_swapchain_image(&self) -> bool {
        !self.owns_image
    }

    /// Mark the image as initialized, returning true on the first call
    pub(crate) fn take_first_use(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }
}

impl PipelineTexture for Texture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.ctx.forget_render_target_views(self.view);
        unsafe {
            self.ctx.device.destroy_image_view(self.view, None);
            if self.owns_image {
                if let Some(allocation) = self.allocation.take() {
                    lock(&self.ctx.allocator).free(allocation).ok();
                }
                self.ctx.device.destroy_image(self.image, None);
            }
        }
    }
}
