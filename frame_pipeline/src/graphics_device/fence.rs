/// Fence trait - a GPU-tracked 64-bit counter

use std::any::Any;
use std::time::Duration;

use crate::error::Result;

/// Result of a bounded fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The fence reached the requested value
    Reached,
    /// The deadline expired first
    TimedOut,
}

/// Monotonic GPU timeline
///
/// The completed value only ever grows. A value is reached once every
/// command submitted before the matching `GraphicsDevice::signal` finished.
pub trait Fence: Send + Sync {
    /// Last value the GPU has reached
    fn completed_value(&self) -> Result<u64>;

    /// Block the calling thread until `value` is reached or `timeout` expires
    ///
    /// `None` waits without a deadline.
    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> Result<WaitStatus>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
