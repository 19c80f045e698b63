//! Error types for the frame pipeline
//!
//! Every failure in this crate is fatal for the session: there is no local
//! recovery once GPU state may be inconsistent. Errors bubble up to the host,
//! wrapped with the lifecycle stage that produced them.
//!
//! The one exception is `SurfaceOutOfDate`: the swap chain no longer matches
//! the window and must be recreated, but the device itself is healthy.

use std::fmt;

use crate::graphics_device::DescriptorHeapKind;

/// Result type for frame pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle stage in which an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Adapter, device, queue, swap chain, heaps, fence creation
    DeviceCreation,
    /// Root signature, shaders, pipeline state, vertex/texture upload
    AssetLoading,
    /// Per-frame recording, submission, present and waits
    FrameSubmission,
    /// Final drain and release
    Shutdown,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::DeviceCreation => "device creation",
            PipelineStage::AssetLoading => "asset loading",
            PipelineStage::FrameSubmission => "frame submission",
            PipelineStage::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Frame pipeline errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan result codes, driver rejections)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, texture, heap, shader blob)
    InvalidResource(String),

    /// Initialization failed (adapter, device, swap chain, configuration)
    InitializationFailed(String),

    /// The device was lost or stopped responding
    DeviceLost(String),

    /// A synchronization precondition was violated by the caller
    SynchronizationMisuse(String),

    /// A fence wait expired before the fence reached its target value
    WaitTimedOut {
        /// Fence value waited for
        target: u64,
        /// Fence value observed when the wait expired
        completed: u64,
    },

    /// The swap chain no longer matches its surface and must be recreated
    SurfaceOutOfDate(String),

    /// Descriptor index outside the heap's fixed capacity
    DescriptorOutOfRange {
        kind: DescriptorHeapKind,
        index: u32,
        capacity: u32,
    },

    /// An error annotated with the lifecycle stage that failed
    Stage {
        stage: PipelineStage,
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the stage it escaped from.
    ///
    /// Already-annotated errors keep their original stage.
    pub fn at_stage(self, stage: PipelineStage) -> Error {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage annotation, if any
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, with stage annotations stripped
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True when the swap chain must be recreated before the next present
    pub fn is_surface_out_of_date(&self) -> bool {
        matches!(self.root_cause(), Error::SurfaceOutOfDate(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
            Error::SynchronizationMisuse(msg) => write!(f, "Synchronization misuse: {}", msg),
            Error::WaitTimedOut { target, completed } => write!(
                f,
                "Fence wait timed out (target {}, completed {}): device may be hung",
                target, completed
            ),
            Error::SurfaceOutOfDate(msg) => write!(f, "Surface out of date: {}", msg),
            Error::DescriptorOutOfRange { kind, index, capacity } => write!(
                f,
                "Descriptor index {} out of range for {:?} heap (capacity {})",
                index, kind, capacity
            ),
            Error::Stage { stage, source } => write!(f, "{} failed: {}", stage, source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

// ===== ERROR MACROS =====

/// Log an error at ERROR severity and evaluate to `Error::BackendError`
///
/// # Example
///
/// ```ignore
/// device.submit().map_err(|e| pipeline_err!("frame_pipeline::vulkan", "Submit failed: {:?}", e))?;
/// ```
#[macro_export]
macro_rules! pipeline_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!(),
        );
        $crate::gpu::Error::BackendError(message)
    }};
}

/// Log an error at ERROR severity and return early with `Error::BackendError`
#[macro_export]
macro_rules! pipeline_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::pipeline_err!($source, $($arg)*))
    };
}

/// Log a synchronization misuse and return early with `Error::SynchronizationMisuse`
#[macro_export]
macro_rules! pipeline_misuse {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!(),
        );
        return Err($crate::gpu::Error::SynchronizationMisuse(message));
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
