/// Swapchain trait - the Presentation Chain

use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{SurfaceSize, Texture, TextureFormat};

/// Rotating set of back buffers presented to a window
///
/// The current back buffer index is owned by the chain and advances after
/// every `present`. It selects the frame slot the pipeline records into.
pub trait Swapchain: Send + Sync {
    /// Number of back buffers
    fn buffer_count(&self) -> u32;

    /// Index of the back buffer the next frame renders into
    fn current_back_buffer_index(&self) -> u32;

    /// Back buffer texture at `index`
    fn back_buffer(&self, index: u32) -> Result<Arc<dyn Texture>>;

    /// Queue the current back buffer for display and rotate
    ///
    /// Ordered after every command list executed before this call.
    fn present(&mut self) -> Result<()>;

    /// Resize every back buffer
    ///
    /// The caller must have dropped every reference to the old back buffers
    /// and made sure the GPU no longer uses them.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Back buffer pixel format
    fn format(&self) -> TextureFormat;

    /// Back buffer size in pixels
    fn extent(&self) -> SurfaceSize;
}
