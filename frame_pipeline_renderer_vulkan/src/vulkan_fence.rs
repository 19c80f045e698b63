/// Fence - Vulkan implementation of Fence trait
///
/// Backed by a timeline semaphore: the counter value is the fence value,
/// host waits use `vkWaitSemaphores`.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use frame_pipeline::gpu::Result;
use frame_pipeline::gpu::device::{Fence as PipelineFence, WaitStatus};
use frame_pipeline::pipeline_error;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::vk_result_to_error;

/// Vulkan fence implementation
pub struct Fence {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl Fence {
    pub(crate) fn new(ctx: Arc<GpuContext>, initial_value: u64) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe {
            ctx.device.create_semaphore(&info, None).map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create timeline semaphore: {:?}", e);
                vk_result_to_error(e, "Failed to create fence")
            })?
        };

        Ok(Self { ctx, semaphore })
    }
}

/// Convert an optional deadline to the nanosecond timeout Vulkan expects
pub(crate) fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    match timeout {
        Some(duration) => u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
        None => u64::MAX,
    }
}

impl PipelineFence for Fence {
    fn completed_value(&self) -> Result<u64> {
        unsafe {
            self.ctx
                .device
                .get_semaphore_counter_value(self.semaphore)
                .map_err(|e| vk_result_to_error(e, "Failed to read fence value"))
        }
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> Result<WaitStatus> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        unsafe {
            match self.ctx.device.wait_semaphores(&wait_info, timeout_nanos(timeout)) {
                Ok(()) => Ok(WaitStatus::Reached),
                Err(vk::Result::TIMEOUT) => Ok(WaitStatus::TimedOut),
                Err(e) => {
                    pipeline_error!("frame_pipeline::vulkan", "Fence wait for {} failed: {:?}", value, e);
                    Err(vk_result_to_error(e, "Fence wait failed"))
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
