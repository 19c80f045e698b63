/// Swapchain - Vulkan implementation of Swapchain trait
///
/// Manages presentation to the window. The next image is acquired eagerly,
/// right after creation and after every present, so the current back
/// buffer index is always known before the frame is recorded.
///
/// The acquire semaphore and the render-finished semaphore of the current
/// image are published in the shared context; the next submission that
/// touches a back buffer waits on the first and signals the second.

use ash::vk;
use std::sync::Arc;

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{
    PresentationSurface, SurfaceSize, Swapchain as PipelineSwapchain, Texture as PipelineTexture,
    TextureDesc, TextureFormat, TextureUsage,
};
use frame_pipeline::{pipeline_debug, pipeline_error, pipeline_info, pipeline_misuse, pipeline_warn};

use crate::vulkan_context::{lock, GpuContext, PresentSync};
use crate::vulkan_format::{texture_format_from_vk, vk_result_to_error};
use crate::vulkan_texture::Texture;

/// Pick the surface format, preferring linear 8-bit BGRA/RGBA
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<(vk::SurfaceFormatKHR, TextureFormat)> {
    let preferred = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];
    preferred
        .iter()
        .find_map(|wanted| formats.iter().find(|f| f.format == *wanted))
        .or_else(|| formats.iter().find(|f| texture_format_from_vk(f.format).is_some()))
        .and_then(|f| texture_format_from_vk(f.format).map(|format| (*f, format)))
}

/// Pick the present mode: FIFO with vsync, otherwise the lowest-latency mode available
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Clamp the requested image count to what the surface supports
pub(crate) fn choose_image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Surface extent: the compositor's if fixed, otherwise the requested size clamped
pub(crate) fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Vulkan swapchain implementation
pub struct Swapchain {
    ctx: Arc<GpuContext>,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    back_buffers: Vec<Arc<Texture>>,
    format: TextureFormat,
    extent: vk::Extent2D,

    requested_count: u32,
    vsync: bool,
    current_index: u32,

    /// Acquire semaphore last used for each image
    acquire_semaphores: Vec<vk::Semaphore>,
    /// Semaphore handed to the next acquire
    spare_acquire: vk::Semaphore,
    /// One semaphore per swapchain image (for present)
    render_finished: Vec<vk::Semaphore>,
}

fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    unsafe {
        device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            .map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create semaphore: {:?}", e);
                vk_result_to_error(e, "Failed to create semaphore")
            })
    }
}

impl Swapchain {
    /// Create a swapchain for the window behind `surface`
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `surface` - Window providing native handles and the initial size
    /// * `buffer_count` - Requested number of back buffers
    /// * `vsync` - Present on vertical blank
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        surface: &dyn PresentationSurface,
        buffer_count: u32,
        vsync: bool,
    ) -> Result<Self> {
        let display_handle = surface.display_handle().map_err(|e| {
            pipeline_error!("frame_pipeline::vulkan", "Failed to get display handle: {}", e);
            Error::InitializationFailed(format!("Failed to get display handle: {}", e))
        })?;
        let window_handle = surface.window_handle().map_err(|e| {
            pipeline_error!("frame_pipeline::vulkan", "Failed to get window handle: {}", e);
            Error::InitializationFailed(format!("Failed to get window handle: {}", e))
        })?;

        let surface_loader = ash::khr::surface::Instance::new(&ctx.entry, &ctx.instance);
        let vk_surface = unsafe {
            ash_window::create_surface(
                &ctx.entry,
                &ctx.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?
        };

        let supported = unsafe {
            surface_loader
                .get_physical_device_surface_support(ctx.physical_device, ctx.queue_family, vk_surface)
                .unwrap_or(false)
        };
        if !supported {
            unsafe { surface_loader.destroy_surface(vk_surface, None) };
            pipeline_error!("frame_pipeline::vulkan", "Queue family cannot present to this surface");
            return Err(Error::InitializationFailed(
                "Queue family cannot present to this surface".to_string(),
            ));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);
        let spare_acquire = match create_semaphore(&ctx.device) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(vk_surface, None) };
                return Err(e);
            }
        };

        let size = surface.size();
        let mut chain = Self {
            ctx,
            surface: vk_surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            back_buffers: Vec::new(),
            format: TextureFormat::B8G8R8A8_UNORM,
            extent: vk::Extent2D::default(),
            requested_count: buffer_count,
            vsync,
            current_index: 0,
            acquire_semaphores: Vec::new(),
            spare_acquire,
            render_finished: Vec::new(),
        };

        // Drop releases whatever was created if a step below fails
        chain.create_chain(size.width, size.height)?;
        chain.acquire()?;

        pipeline_info!("frame_pipeline::vulkan",
            "Swapchain created: {} x {}x{} {:?}, vsync {}",
            chain.back_buffers.len(), chain.extent.width, chain.extent.height, chain.format, vsync);
        Ok(chain)
    }

    /// (Re)create the swapchain, its back buffers and per-image semaphores
    fn create_chain(&mut self, width: u32, height: u32) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, self.surface)
                .map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, self.surface)
                .map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;
            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, self.surface)
                .map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to query present modes: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get present modes: {:?}", e))
                })?;

            let (surface_format, format) = choose_surface_format(&formats).ok_or_else(|| {
                pipeline_error!("frame_pipeline::vulkan", "No supported 8-bit RGBA surface format");
                Error::InitializationFailed("No supported surface format".to_string())
            })?;
            let extent = choose_extent(&capabilities, width, height);
            let image_count = choose_image_count(self.requested_count, &capabilities);
            let present_mode = choose_present_mode(&present_modes, self.vsync);

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self
                .swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to create swapchain: {:?}", e);
                    vk_result_to_error(e, "Failed to create swapchain")
                })?;
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;

            let images = self.swapchain_loader.get_swapchain_images(swapchain).map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to get swapchain images: {:?}", e);
                vk_result_to_error(e, "Failed to get swapchain images")
            })?;

            self.format = format;
            self.extent = extent;

            for (index, image) in images.iter().enumerate() {
                let desc = TextureDesc {
                    name: format!("back_buffer_{}", index),
                    width: extent.width,
                    height: extent.height,
                    format,
                    usage: TextureUsage::RenderTarget,
                };
                let texture = Texture::from_swapchain_image(Arc::clone(&ctx), *image, desc)?;
                self.back_buffers.push(Arc::new(texture));
            }

            for _ in 0..images.len() {
                self.render_finished.push(create_semaphore(&ctx.device)?);
                self.acquire_semaphores.push(create_semaphore(&ctx.device)?);
            }

            pipeline_debug!("frame_pipeline::vulkan",
                "Swapchain images: {} (requested {}), present mode {:?}, color space {:?}",
                images.len(), self.requested_count, present_mode, surface_format.color_space);
        }
        Ok(())
    }

    /// Destroy back buffers and every semaphore, keeping the swapchain handle
    fn release_images(&mut self) {
        self.back_buffers.clear();
        unsafe {
            for semaphore in self.render_finished.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.acquire_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
        }
        *lock(&self.ctx.present_sync) = PresentSync::default();
    }

    /// Acquire the next image and publish its semaphores
    fn acquire(&mut self) -> Result<()> {
        let semaphore = self.spare_acquire;
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
                .map_err(|e| {
                    // No image is held, the next submission must not wait on a stale acquire
                    *lock(&self.ctx.present_sync) = PresentSync::default();
                    if e == vk::Result::ERROR_OUT_OF_DATE_KHR {
                        pipeline_warn!("frame_pipeline::vulkan",
                            "Swapchain out of date during acquire, resize required");
                    } else {
                        pipeline_error!("frame_pipeline::vulkan",
                            "Failed to acquire next swapchain image: {:?}", e);
                    }
                    vk_result_to_error(e, "Failed to acquire swapchain image")
                })?
        };
        if suboptimal {
            pipeline_debug!("frame_pipeline::vulkan", "Swapchain is suboptimal for the surface");
        }

        // The semaphore this image used last time becomes the next spare
        self.spare_acquire = std::mem::replace(&mut self.acquire_semaphores[index as usize], semaphore);
        self.current_index = index;

        *lock(&self.ctx.present_sync) = PresentSync {
            acquire_wait: Some(semaphore),
            render_signal: Some(self.render_finished[index as usize]),
            submitted_signal: None,
        };
        Ok(())
    }
}

impl PipelineSwapchain for Swapchain {
    fn buffer_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current_index
    }

    fn back_buffer(&self, index: u32) -> Result<Arc<dyn PipelineTexture>> {
        match self.back_buffers.get(index as usize) {
            Some(texture) => Ok(Arc::clone(texture) as Arc<dyn PipelineTexture>),
            None => Err(Error::InvalidResource(format!(
                "Back buffer index {} out of range (count: {})",
                index,
                self.back_buffers.len()
            ))),
        }
    }

    fn present(&mut self) -> Result<()> {
        let wait = lock(&self.ctx.present_sync).submitted_signal.take();
        let wait = match wait {
            Some(semaphore) => semaphore,
            None => pipeline_misuse!("frame_pipeline::vulkan",
                "present without a submission that rendered back buffer {}", self.current_index),
        };

        let swapchains = [self.swapchain];
        let image_indices = [self.current_index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let queue = lock(&self.ctx.queue);
            unsafe { self.swapchain_loader.queue_present(*queue, &present_info) }
        };
        match result {
            Ok(false) => {}
            Ok(true) => {
                pipeline_debug!("frame_pipeline::vulkan", "Swapchain is suboptimal for the surface");
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                pipeline_warn!("frame_pipeline::vulkan",
                    "Swapchain no longer matches the surface, waiting for a resize");
                *lock(&self.ctx.present_sync) = PresentSync::default();
                return Err(vk_result_to_error(vk::Result::ERROR_OUT_OF_DATE_KHR, "Failed to present"));
            }
            Err(e) => {
                pipeline_error!("frame_pipeline::vulkan", "Failed to present: {:?}", e);
                return Err(vk_result_to_error(e, "Failed to present"));
            }
        }

        self.acquire()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if let Some(index) = self.back_buffers.iter().position(|b| Arc::strong_count(b) > 1) {
            pipeline_misuse!("frame_pipeline::vulkan",
                "resize while back buffer {} is still referenced", index);
        }

        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| vk_result_to_error(e, "Failed to wait for device idle"))?;
        }

        // The pending acquire signaled its semaphore without a waiter, so
        // every binary semaphore is recreated with the chain
        self.release_images();
        unsafe {
            self.ctx.device.destroy_semaphore(self.spare_acquire, None);
        }
        self.spare_acquire = create_semaphore(&self.ctx.device)?;

        self.create_chain(width, height)?;
        self.acquire()?;

        pipeline_info!("frame_pipeline::vulkan",
            "Swapchain resized to {}x{}", self.extent.width, self.extent.height);
        Ok(())
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn extent(&self) -> SurfaceSize {
        SurfaceSize::new(self.extent.width, self.extent.height)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
        }
        self.release_images();
        unsafe {
            self.ctx.device.destroy_semaphore(self.spare_acquire, None);
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
