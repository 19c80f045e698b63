/*!
# Frame Pipeline - Vulkan Backend

Vulkan implementation of the frame_pipeline device traits.

This crate provides a Vulkan backend using the Ash library for Vulkan
bindings and gpu-allocator for memory management. Fences are timeline
semaphores, render targets use dynamic rendering, and shaders are loaded as
SPIR-V compiled ahead of time.

```no_run
use frame_pipeline::gpu::PipelineConfig;
use frame_pipeline_renderer_vulkan::gpu::VulkanGraphicsDevice;

# fn run(window: &winit::window::Window) -> frame_pipeline::gpu::Result<()> {
let config = PipelineConfig::default();
let device = VulkanGraphicsDevice::new(window, &config)?;
# Ok(())
# }
```
*/

// Vulkan implementation modules
mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod vulkan_debug;
mod vulkan_fence;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_descriptor_heap;
mod vulkan_pipeline;
mod vulkan_command_list;
mod vulkan_swapchain;
mod vulkan_shader;

// Main namespace module
pub mod gpu {
    pub use crate::vulkan::VulkanGraphicsDevice;
    pub use crate::vulkan_shader::SpirvShaderCompiler;
    pub use crate::vulkan_command_list::{CommandAllocator, CommandList};
    pub use crate::vulkan_swapchain::Swapchain;

    // Validation layer statistics
    pub use crate::vulkan_debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
}
