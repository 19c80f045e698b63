/// Frame synchronizer - the fence counter protecting frame slot reuse
///
/// The CPU owns `next_value`, the value the next signal will carry. The GPU
/// owns the fence's completed value. Each frame slot remembers the value
/// signaled after its last submission; value 0 means "never submitted" and
/// is always treated as complete.
///
/// Work submitted since the last signal is tracked, so a drain can cover
/// a submission whose frame never reached its own signal.
///
/// Two strategies are supported:
/// - `StallPerFrame`: wait for the value just signaled, every frame
/// - `DoubleBuffered`: wait only when the slot about to be reused is still
///   in flight, allowing up to N frames of CPU/GPU overlap

use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncStrategy;
use crate::error::{Error, Result};
use crate::frame_slots::FrameSlot;
use crate::graphics_device::{Fence, GraphicsDevice, WaitStatus};
use crate::{pipeline_debug, pipeline_error, pipeline_misuse, pipeline_trace};

/// Outcome of a wait request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target was already complete, the CPU did not block
    Ready,
    /// The CPU blocked until the target completed
    Completed,
    /// The deadline expired first, the device may be hung
    TimedOut { target: u64, completed: u64 },
}

impl WaitOutcome {
    /// Turn a timeout into `Error::WaitTimedOut`
    pub fn into_result(self) -> Result<WaitOutcome> {
        match self {
            WaitOutcome::TimedOut { target, completed } => Err(Error::WaitTimedOut { target, completed }),
            other => Ok(other),
        }
    }
}

/// Synchronizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub signals: u64,
    pub blocking_waits: u64,
    pub immediate_waits: u64,
    pub timeouts: u64,
}

/// Fence counter and wait logic
pub struct FrameSynchronizer {
    fence: Arc<dyn Fence>,
    next_value: u64,
    last_signaled: u64,
    /// Command lists executed after `last_signaled` was enqueued
    unsignaled_submission: bool,
    strategy: SyncStrategy,
    wait_timeout: Option<Duration>,
    stats: SyncStats,
}

impl FrameSynchronizer {
    /// Create the fence (initial value 0) and the counter (first signal = 1)
    pub fn new(
        device: &dyn GraphicsDevice,
        strategy: SyncStrategy,
        wait_timeout: Option<Duration>,
    ) -> Result<Self> {
        let fence = device.create_fence(0)?;
        Ok(Self {
            fence,
            next_value: 1,
            last_signaled: 0,
            unsignaled_submission: false,
            strategy,
            wait_timeout,
            stats: SyncStats::default(),
        })
    }

    /// Enqueue a signal at the current counter value, then advance
    ///
    /// Returns the value signaled. Consecutive calls return consecutive values.
    pub fn signal_and_advance(&mut self, device: &dyn GraphicsDevice) -> Result<u64> {
        let value = self.next_value;
        device.signal(self.fence.as_ref(), value)?;
        self.last_signaled = value;
        self.unsignaled_submission = false;
        self.next_value += 1;
        self.stats.signals += 1;
        pipeline_trace!("frame_pipeline::sync", "Signaled fence value {}", value);
        Ok(value)
    }

    /// Record that a command list was executed on the queue
    pub fn note_submitted(&mut self) {
        self.unsignaled_submission = true;
    }

    /// True when executed work has no signal behind it yet
    pub fn has_unsignaled_work(&self) -> bool {
        self.unsignaled_submission
    }

    /// Wait until the fence reaches `value`
    ///
    /// Returns immediately for 0 and for values already completed. Waiting
    /// on a value that was never signaled can never succeed and is rejected.
    pub fn wait_for_value(&mut self, value: u64) -> Result<WaitOutcome> {
        let completed = self.fence.completed_value()?;
        if value == 0 || completed >= value {
            self.stats.immediate_waits += 1;
            return Ok(WaitOutcome::Ready);
        }

        if value > self.last_signaled {
            pipeline_misuse!(
                "frame_pipeline::sync",
                "Wait for fence value {} which was never signaled (last signaled {})",
                value,
                self.last_signaled
            );
        }

        self.stats.blocking_waits += 1;
        pipeline_debug!(
            "frame_pipeline::sync",
            "Blocking on fence value {} (completed {})",
            value,
            completed
        );

        match self.fence.wait_for_value(value, self.wait_timeout)? {
            WaitStatus::Reached => Ok(WaitOutcome::Completed),
            WaitStatus::TimedOut => {
                let completed = self.fence.completed_value()?;
                self.stats.timeouts += 1;
                pipeline_error!(
                    "frame_pipeline::sync",
                    "Fence wait timed out: target {}, completed {}",
                    value,
                    completed
                );
                Ok(WaitOutcome::TimedOut { target: value, completed })
            }
        }
    }

    /// Wait until `slot`'s last submission has completed
    pub fn wait_for_slot(&mut self, slot: &FrameSlot) -> Result<WaitOutcome> {
        pipeline_trace!(
            "frame_pipeline::sync",
            "Waiting for slot {} (fence value {})",
            slot.index(),
            slot.fence_value()
        );
        self.wait_for_value(slot.fence_value())
    }

    /// Fail unless `slot`'s last submission has completed
    ///
    /// Guards allocator resets: a slot still in flight must never be rewritten.
    pub fn ensure_slot_available(&self, slot: &FrameSlot) -> Result<()> {
        let completed = self.fence.completed_value()?;
        if slot.fence_value() > completed {
            pipeline_misuse!(
                "frame_pipeline::sync",
                "Frame slot {} reused while in flight (fence value {}, completed {})",
                slot.index(),
                slot.fence_value(),
                completed
            );
        }
        Ok(())
    }

    /// Wait for all work submitted so far
    ///
    /// Submissions without a signal behind them (a frame that failed between
    /// execute and signal) get a fresh signal first. A second drain with no
    /// new submissions returns `Ready` without blocking.
    pub fn drain(&mut self, device: &dyn GraphicsDevice) -> Result<WaitOutcome> {
        if self.unsignaled_submission {
            pipeline_debug!("frame_pipeline::sync", "Signaling unsignaled work before draining");
            self.signal_and_advance(device)?;
        }
        pipeline_debug!(
            "frame_pipeline::sync",
            "Draining GPU work up to fence value {}",
            self.last_signaled
        );
        self.wait_for_value(self.last_signaled)
    }

    /// Fence value the GPU has completed
    pub fn completed_value(&self) -> Result<u64> {
        self.fence.completed_value()
    }

    /// Value carried by the most recent signal (0 if none)
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    /// Value the next signal will carry
    pub fn next_value(&self) -> u64 {
        self.next_value
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}

#[cfg(test)]
#[path = "frame_synchronizer_tests.rs"]
mod tests;
