/// CPU/GPU synchronization: the fence counter and deferred releases

pub mod frame_synchronizer;
pub mod deferred_release;

pub use frame_synchronizer::{FrameSynchronizer, SyncStats, WaitOutcome};
pub use deferred_release::DeferredReleaseQueue;
