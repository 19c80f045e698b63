/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything resources need after creation:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue for submissions (signal, execute, present)
/// - Descriptor bookkeeping that maps descriptor handles to Vulkan objects
/// - Presentation semaphores handed from the swapchain to the next submission

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use rustc_hash::FxHashMap;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use frame_pipeline::gpu::Result;
use frame_pipeline::gpu::device::CpuDescriptorHandle;
use frame_pipeline::pipeline_err;

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pack a heap id and a descriptor index into a handle value
pub(crate) fn make_handle(heap_id: u32, index: u32) -> u64 {
    ((heap_id as u64) << 32) | index as u64
}

/// Split a handle value into (heap id, descriptor index)
pub(crate) fn split_handle(handle: u64) -> (u32, u32) {
    ((handle >> 32) as u32, (handle & 0xFFFF_FFFF) as u32)
}

/// Render target view written into an RTV heap slot
///
/// Non-owning: the texture that created the view destroys it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderTargetView {
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Semaphores linking the swapchain to the queue
#[derive(Debug, Default)]
pub(crate) struct PresentSync {
    /// Signaled by the pending acquire, waited on by the next back buffer submission
    pub acquire_wait: Option<vk::Semaphore>,
    /// Signaled by the next back buffer submission, waited on by present
    pub render_signal: Option<vk::Semaphore>,
    /// Set once a submission took `render_signal`
    pub submitted_signal: Option<vk::Semaphore>,
}

/// Shared GPU context for all Vulkan resources.
///
/// Shared (via `Arc`) by every object the device creates, so the last one
/// dropped tears the device down.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,

    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// The single direct queue; the lock orders execute, signal and present
    pub(crate) queue: Mutex<vk::Queue>,
    pub(crate) queue_family: u32,

    /// Debug utils loader (for validation layers)
    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    /// Sampled-image set layouts, keyed by descriptor count
    srv_set_layouts: Mutex<FxHashMap<u32, vk::DescriptorSetLayout>>,
    /// RTV handle -> view
    render_target_views: Mutex<FxHashMap<CpuDescriptorHandle, RenderTargetView>>,
    /// SRV heap id -> (descriptor set backing it, capacity)
    srv_heap_sets: Mutex<FxHashMap<u32, (vk::DescriptorSet, u32)>>,
    next_heap_id: AtomicU32,

    pub(crate) present_sync: Mutex<PresentSync>,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// # Arguments
    ///
    /// * `entry` - Loaded Vulkan library
    /// * `instance` - Vulkan instance
    /// * `physical_device` - Selected adapter
    /// * `device` - Vulkan logical device
    /// * `allocator` - GPU memory allocator
    /// * `queue` - Direct queue
    /// * `queue_family` - Family of `queue`
    /// * `debug_utils_loader` - Debug utils loader (if validation enabled)
    /// * `debug_messenger` - Debug messenger handle (if validation enabled)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        queue: vk::Queue,
        queue_family: u32,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue: Mutex::new(queue),
            queue_family,
            debug_utils_loader,
            debug_messenger,
            srv_set_layouts: Mutex::new(FxHashMap::default()),
            render_target_views: Mutex::new(FxHashMap::default()),
            srv_heap_sets: Mutex::new(FxHashMap::default()),
            next_heap_id: AtomicU32::new(1),
            present_sync: Mutex::new(PresentSync::default()),
        }
    }

    /// Unique id for a new descriptor heap (0 is never handed out)
    pub(crate) fn next_heap_id(&self) -> u32 {
        self.next_heap_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Set layout with `count` sampled images at binding 0
    ///
    /// Layouts are cached so a heap and a root signature table of the same
    /// size share one layout and are compatible at bind time.
    pub(crate) fn srv_set_layout(&self, count: u32) -> Result<vk::DescriptorSetLayout> {
        let mut layouts = lock(&self.srv_set_layouts);
        if let Some(&layout) = layouts.get(&count) {
            return Ok(layout);
        }

        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .descriptor_count(count)
            .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)];
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            self.device
                .create_descriptor_set_layout(&info, None)
                .map_err(|e| {
                    pipeline_err!("frame_pipeline::vulkan", "Failed to create SRV set layout: {:?}", e)
                })?
        };
        layouts.insert(count, layout);
        Ok(layout)
    }

    pub(crate) fn register_render_target_view(&self, handle: CpuDescriptorHandle, view: RenderTargetView) {
        lock(&self.render_target_views).insert(handle, view);
    }

    pub(crate) fn render_target_view(&self, handle: CpuDescriptorHandle) -> Option<RenderTargetView> {
        lock(&self.render_target_views).get(&handle).copied()
    }

    /// Forget every view that points at `view` (its texture is being destroyed)
    pub(crate) fn forget_render_target_views(&self, view: vk::ImageView) {
        lock(&self.render_target_views).retain(|_, entry| entry.view != view);
    }

    /// Forget every view written into heap `heap_id`
    pub(crate) fn forget_heap_views(&self, heap_id: u32) {
        lock(&self.render_target_views).retain(|handle, _| split_handle(handle.0).0 != heap_id);
    }

    pub(crate) fn register_srv_heap(&self, heap_id: u32, set: vk::DescriptorSet, capacity: u32) {
        lock(&self.srv_heap_sets).insert(heap_id, (set, capacity));
    }

    pub(crate) fn srv_heap_set(&self, heap_id: u32) -> Option<(vk::DescriptorSet, u32)> {
        lock(&self.srv_heap_sets).get(&heap_id).copied()
    }

    pub(crate) fn unregister_srv_heap(&self, heap_id: u32) {
        lock(&self.srv_heap_sets).remove(&heap_id);
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            for (_, layout) in lock(&self.srv_set_layouts).drain() {
                self.device.destroy_descriptor_set_layout(layout, None);
            }

            // Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            crate::vulkan_debug::cleanup_debug_config();

            // Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils_loader, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
