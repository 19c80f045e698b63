/// Graphics device module - every trait a backend implements

// Module declarations
pub mod graphics_device;
pub mod fence;
pub mod command_list;
pub mod resource;
pub mod descriptor_heap;
pub mod swapchain;
pub mod shader;
pub mod pipeline_state;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use fence::*;
pub use command_list::*;
pub use resource::*;
pub use descriptor_heap::*;
pub use swapchain::*;
pub use shader::*;
pub use pipeline_state::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
