/*!
# Frame Pipeline

Core traits and types for a minimal explicit-GPU frame pipeline.

This crate provides the backend-agnostic half of the pipeline: the graphics
device traits a backend implements (device, queue, fences, command lists,
descriptor heaps, resources, swap chain), plus the pieces that carry the
actual CPU/GPU synchronization discipline.

## Architecture

- **FrameSynchronizer**: fence counter, per-slot fence values, blocking waits
- **CommandRecorder**: one allocator per frame slot, strict recording order
- **ResourceUploader**: staging-buffer uploads with deferred release
- **DescriptorAllocator**: fixed-capacity RTV/SRV heaps with checked indices
- **FramePipeline**: the initialize / update / render_frame / shutdown lifecycle

Backend implementations (Vulkan) provide concrete types for the device traits.
*/

// Internal modules
mod error;
mod config;
pub mod log;
pub mod graphics_device;
pub mod sync;
mod frame_slots;
mod descriptor_allocator;
mod command_recorder;
mod resource_uploader;
mod checkerboard;
mod vertex;
mod frame_pipeline;

// Main namespace module
pub mod gpu {
    // Error types
    pub use crate::error::{Error, PipelineStage, Result};

    // Configuration
    pub use crate::config::{PipelineConfig, SyncStrategy};

    // Lifecycle
    pub use crate::frame_pipeline::{
        Capabilities, FramePipeline, FrameStats, LifecycleState, TEXTURE_SIZE,
    };

    // Core components
    pub use crate::sync::{DeferredReleaseQueue, FrameSynchronizer, SyncStats, WaitOutcome};
    pub use crate::frame_slots::{FrameSlot, FrameSlots};
    pub use crate::descriptor_allocator::DescriptorAllocator;
    pub use crate::command_recorder::{CommandRecorder, FrameCommands, RecorderState};
    pub use crate::resource_uploader::{read_unpadded_rows, ResourceUploader, UploaderStats};
    pub use crate::checkerboard::{generate_checkerboard, CHECKER_CELLS};
    pub use crate::vertex::{ColorVertex, TexturedVertex, triangle_colored, triangle_textured};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
        pub use crate::log::{reset_logger, set_logger, set_min_severity};
    }

    // Device sub-module with all backend-facing traits
    pub mod device {
        pub use crate::graphics_device::*;
    }
}

// Re-export math library at crate root
pub use glam;
