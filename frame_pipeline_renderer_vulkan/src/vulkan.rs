/// VulkanGraphicsDevice - Vulkan implementation of GraphicsDevice trait
///
/// Central object for creating resources and submitting work. It owns
/// nothing but a handle on the shared `GpuContext`: every object it creates
/// keeps the context alive, so the device can be dropped before them.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::sync::Arc;

use frame_pipeline::gpu::{Error, PipelineConfig, Result};
use frame_pipeline::gpu::device::{
    AdapterInfo, Buffer as PipelineBuffer, BufferDesc, CommandAllocator as PipelineCommandAllocator,
    CommandList as PipelineCommandList, CpuDescriptorHandle, DescriptorHeap as PipelineDescriptorHeap,
    DescriptorHeapKind, Fence as PipelineFence, GraphicsDevice, PipelineState as PipelineStateTrait,
    PipelineStateDesc, PresentationSurface, RootSignature as RootSignatureTrait, RootSignatureDesc,
    Swapchain as PipelineSwapchain, Texture as PipelineTexture, TextureDesc, TextureUsage,
};
use frame_pipeline::{pipeline_debug, pipeline_error, pipeline_info, pipeline_misuse, pipeline_warn};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_command_list::{CommandAllocator, CommandList};
use crate::vulkan_context::{lock, split_handle, GpuContext, RenderTargetView};
use crate::vulkan_descriptor_heap::DescriptorHeap;
use crate::vulkan_fence::Fence;
use crate::vulkan_format::vk_result_to_error;
use crate::vulkan_pipeline::{PipelineState, RootSignature};
use crate::vulkan_swapchain::Swapchain;
use crate::vulkan_texture::Texture;

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

/// Rank a physical device type, lower is better
///
/// With `use_warp` only CPU (software) implementations qualify, which is how
/// the WARP adapter request maps onto Vulkan (lavapipe, SwiftShader).
pub(crate) fn rank_device(device_type: vk::PhysicalDeviceType, use_warp: bool) -> Option<u32> {
    if use_warp {
        return (device_type == vk::PhysicalDeviceType::CPU).then_some(0);
    }
    let rank = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 4,
        _ => 3,
    };
    Some(rank)
}

/// True when `api_version` is at least Vulkan 1.3
pub(crate) fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Adapter candidate found during enumeration
struct Candidate {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    rank: u32,
    properties: vk::PhysicalDeviceProperties,
}

/// Destroy what `VulkanGraphicsDevice::new` created before a failure
unsafe fn destroy_partial(
    instance: &ash::Instance,
    debug_utils: Option<&ash::ext::debug_utils::Instance>,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
    device: Option<&ash::Device>,
) {
    if let Some(device) = device {
        device.destroy_device(None);
    }
    if let (Some(debug_utils), Some(messenger)) = (debug_utils, messenger) {
        debug_utils.destroy_debug_utils_messenger(messenger, None);
    }
    instance.destroy_instance(None);
}

fn init_failed(what: &str, e: impl std::fmt::Debug) -> Error {
    pipeline_error!("frame_pipeline::vulkan", "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

fn vk_command_list(list: &dyn PipelineCommandList) -> Result<&CommandList> {
    list.as_any()
        .downcast_ref::<CommandList>()
        .ok_or_else(|| Error::InvalidResource("Command list is not a Vulkan command list".to_string()))
}

fn vk_texture(texture: &dyn PipelineTexture) -> Result<&Texture> {
    texture
        .as_any()
        .downcast_ref::<Texture>()
        .ok_or_else(|| Error::InvalidResource("Texture is not a Vulkan texture".to_string()))
}

/// Vulkan graphics device implementation
pub struct VulkanGraphicsDevice {
    ctx: Arc<GpuContext>,
    adapter: AdapterInfo,
    /// optimalBufferCopyRowPitchAlignment, at least 1
    pitch_alignment: u32,
}

impl VulkanGraphicsDevice {
    /// Create the device for the window behind `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Any window exposing raw handles (queue family must present to it)
    /// * `config` - Adapter choice (`use_warp_device`) and debug layer request
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &PipelineConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_failed("Failed to load Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_failed("Invalid application name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"FramePipeline")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window
                .display_handle()
                .map_err(|e| init_failed("Failed to get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_failed("Failed to get required extensions", e))?
                .to_vec();

            let enable_validation = Self::validation_requested(&entry, config);
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if enable_validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_failed("Failed to create Vulkan instance", e))?;

            let (debug_utils_loader, debug_messenger) = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                crate::vulkan_debug::init_debug_config();

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(
                        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                    )
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));

                let messenger = match debug_utils.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => messenger,
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(init_failed("Failed to create debug messenger", e));
                    }
                };
                (Some(debug_utils), Some(messenger))
            } else {
                (None, None)
            };

            // Until GpuContext owns them, failures destroy these by hand
            let teardown = |device: Option<&ash::Device>| {
                destroy_partial(&instance, debug_utils_loader.as_ref(), debug_messenger, device)
            };

            // Temporary surface, only to find a queue family that can present
            let window_handle = window.window_handle().map_err(|e| {
                teardown(None);
                init_failed("Failed to get window handle", e)
            })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                teardown(None);
                init_failed("Failed to create surface", e)
            })?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let candidate = Self::pick_adapter(&instance, &surface_loader, surface, config.use_warp_device);
            surface_loader.destroy_surface(surface, None);
            let candidate = candidate.map_err(|e| {
                teardown(None);
                e
            })?;

            let adapter = AdapterInfo {
                name: candidate
                    .properties
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "Unknown adapter".to_string()),
                is_software: candidate.properties.device_type == vk::PhysicalDeviceType::CPU,
                vendor_id: candidate.properties.vendor_id,
                device_id: candidate.properties.device_id,
            };
            pipeline_info!("frame_pipeline::vulkan",
                "Selected adapter '{}' ({:?}, vendor {:#06x}, device {:#06x})",
                adapter.name, candidate.properties.device_type, adapter.vendor_id, adapter.device_id);

            // One direct queue for graphics, copies and present
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(candidate.queue_family)
                .queue_priorities(&queue_priorities)];

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

            let mut features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
            let mut features13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .push_next(&mut features12)
                .push_next(&mut features13);

            let device = instance
                .create_device(candidate.physical_device, &device_create_info, None)
                .map_err(|e| {
                    teardown(None);
                    init_failed("Failed to create logical device", e)
                })?;

            let queue = device.get_device_queue(candidate.queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device: candidate.physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                teardown(Some(&device));
                init_failed("Failed to create GPU allocator", e)
            })?;

            let pitch_alignment = (candidate.properties.limits.optimal_buffer_copy_row_pitch_alignment as u32).max(1);

            // GpuContext owns device, instance, and debug messenger destruction
            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                candidate.physical_device,
                device,
                allocator,
                queue,
                candidate.queue_family,
                debug_utils_loader,
                debug_messenger,
            ));

            pipeline_debug!("frame_pipeline::vulkan",
                "Device created (queue family {}, copy pitch alignment {})",
                candidate.queue_family, pitch_alignment);

            Ok(Self {
                ctx,
                adapter,
                pitch_alignment,
            })
        }
    }

    /// Debug layer requested, compiled in, and installed
    fn validation_requested(entry: &ash::Entry, config: &PipelineConfig) -> bool {
        if !config.enable_debug_layer {
            return false;
        }
        if !cfg!(feature = "vulkan-validation") {
            pipeline_warn!("frame_pipeline::vulkan",
                "Debug layer requested but the vulkan-validation feature is disabled");
            return false;
        }

        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let available = layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .map(|name| name == VALIDATION_LAYER)
                .unwrap_or(false)
        });
        if !available {
            pipeline_warn!("frame_pipeline::vulkan",
                "Debug layer requested but {:?} is not installed", VALIDATION_LAYER);
        }
        available
    }

    /// Best Vulkan 1.3 adapter with a queue family that draws and presents
    unsafe fn pick_adapter(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        use_warp: bool,
    ) -> Result<Candidate> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| init_failed("Failed to enumerate physical devices", e))?;

        let mut best: Option<Candidate> = None;
        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            let Some(rank) = rank_device(properties.device_type, use_warp) else {
                continue;
            };
            if !supports_vulkan_1_3(properties.api_version) {
                pipeline_debug!("frame_pipeline::vulkan",
                    "Skipping adapter {:?}: Vulkan 1.3 not supported", properties.device_name_as_c_str());
                continue;
            }

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let queue_family = (0..queue_families.len() as u32).find(|&i| {
                queue_families[i as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && surface_loader
                        .get_physical_device_surface_support(physical_device, i, surface)
                        .unwrap_or(false)
            });
            let Some(queue_family) = queue_family else {
                continue;
            };

            if best.as_ref().map_or(true, |b| rank < b.rank) {
                best = Some(Candidate {
                    physical_device,
                    queue_family,
                    rank,
                    properties,
                });
            }
        }

        best.ok_or_else(|| {
            let what = if use_warp {
                "No software (WARP) Vulkan adapter found"
            } else {
                "No Vulkan 1.3 adapter able to present found"
            };
            pipeline_error!("frame_pipeline::vulkan", "{}", what);
            Error::InitializationFailed(what.to_string())
        })
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn adapter_info(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn PipelineFence>> {
        Ok(Arc::new(Fence::new(Arc::clone(&self.ctx), initial_value)?))
    }

    fn create_command_allocator(&self) -> Result<Box<dyn PipelineCommandAllocator>> {
        Ok(Box::new(CommandAllocator::new(Arc::clone(&self.ctx))?))
    }

    fn create_command_list(&self, allocator: &dyn PipelineCommandAllocator) -> Result<Box<dyn PipelineCommandList>> {
        Ok(Box::new(CommandList::new(Arc::clone(&self.ctx), allocator)?))
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Arc<dyn PipelineDescriptorHeap>> {
        Ok(Arc::new(DescriptorHeap::new(Arc::clone(&self.ctx), kind, capacity)?))
    }

    fn descriptor_stride(&self, _kind: DescriptorHeapKind) -> u64 {
        1
    }

    fn create_render_target_view(&self, texture: &dyn PipelineTexture, handle: CpuDescriptorHandle) -> Result<()> {
        let texture = vk_texture(texture)?;
        if texture.desc().usage != TextureUsage::RenderTarget && !texture.is_swapchain_image() {
            return Err(Error::InvalidResource(format!(
                "Texture '{}' is not a render target",
                texture.desc().name
            )));
        }

        self.ctx.register_render_target_view(
            handle,
            RenderTargetView {
                view: texture.view,
                extent: texture.extent(),
            },
        );
        Ok(())
    }

    fn create_shader_resource_view(&self, texture: &dyn PipelineTexture, handle: CpuDescriptorHandle) -> Result<()> {
        let texture = vk_texture(texture)?;
        let (heap_id, index) = split_handle(handle.0);
        let Some((set, capacity)) = self.ctx.srv_heap_set(heap_id) else {
            return Err(Error::InvalidResource(format!(
                "Handle {:#x} is not in a shader-resource heap",
                handle.0
            )));
        };
        if index >= capacity {
            pipeline_error!("frame_pipeline::vulkan",
                "Shader-resource view at index {} outside heap capacity {}", index, capacity);
            return Err(Error::DescriptorOutOfRange {
                kind: DescriptorHeapKind::ShaderResource,
                index,
                capacity,
            });
        }

        let image_infos = [vk::DescriptorImageInfo::default()
            .image_view(texture.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .image_info(&image_infos);

        unsafe {
            self.ctx.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn PipelineBuffer>> {
        Ok(Arc::new(Buffer::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn PipelineTexture>> {
        Ok(Arc::new(Texture::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<Arc<dyn RootSignatureTrait>> {
        Ok(Arc::new(RootSignature::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc<'_>) -> Result<Arc<dyn PipelineStateTrait>> {
        Ok(Arc::new(PipelineState::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_swapchain(
        &self,
        surface: &dyn PresentationSurface,
        buffer_count: u32,
        vsync: bool,
    ) -> Result<Box<dyn PipelineSwapchain>> {
        Ok(Box::new(Swapchain::new(Arc::clone(&self.ctx), surface, buffer_count, vsync)?))
    }

    fn execute_command_lists(&self, lists: &[&dyn PipelineCommandList]) -> Result<()> {
        let mut buffers = Vec::with_capacity(lists.len());
        let mut touches_back_buffer = false;
        for list in lists {
            let list = vk_command_list(*list)?;
            if list.is_recording() {
                pipeline_misuse!("frame_pipeline::vulkan", "Executing a command list that is still recording");
            }
            touches_back_buffer |= list.touches_back_buffer;
            buffers.push(list.buffer);
        }

        // A back buffer submission waits for the acquire and signals present
        let (wait, signal) = if touches_back_buffer {
            let mut sync = lock(&self.ctx.present_sync);
            let wait = sync.acquire_wait.take();
            let signal = sync.render_signal.take();
            if signal.is_some() {
                sync.submitted_signal = signal;
            }
            (wait, signal)
        } else {
            (None, None)
        };

        let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semaphores.len()];
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal_semaphores);

        let queue = lock(&self.ctx.queue);
        unsafe {
            self.ctx
                .device
                .queue_submit(*queue, &[submit_info], vk::Fence::null())
                .map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to submit command lists: {:?}", e);
                    vk_result_to_error(e, "Failed to submit command lists")
                })
        }
    }

    fn signal(&self, fence: &dyn PipelineFence, value: u64) -> Result<()> {
        let fence = fence
            .as_any()
            .downcast_ref::<Fence>()
            .ok_or_else(|| Error::InvalidResource("Fence is not a Vulkan fence".to_string()))?;

        let signal_semaphores = [fence.semaphore];
        let signal_values = [value];
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        let queue = lock(&self.ctx.queue);
        unsafe {
            self.ctx
                .device
                .queue_submit(*queue, &[submit_info], vk::Fence::null())
                .map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to signal fence to {}: {:?}", value, e);
                    vk_result_to_error(e, "Failed to signal fence")
                })
        }
    }

    fn texture_pitch_alignment(&self) -> u32 {
        self.pitch_alignment
    }

    fn wait_idle(&self) -> Result<()> {
        let queue = lock(&self.ctx.queue);
        unsafe {
            self.ctx
                .device
                .queue_wait_idle(*queue)
                .map_err(|e| vk_result_to_error(e, "Failed to wait for queue idle"))
        }
    }
}
