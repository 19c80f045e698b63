/// Deferred-release queue
///
/// Holds GPU-referenced objects until the fence value of the last submission
/// that uses them has completed. Dropping an item is the release.

use std::collections::VecDeque;

/// Objects waiting for a fence value
pub struct DeferredReleaseQueue<T> {
    pending: VecDeque<(u64, T)>,
}

impl<T> DeferredReleaseQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Queue `item` for release once the fence reaches `fence_value`
    pub fn push(&mut self, fence_value: u64, item: T) {
        // Keep the queue sorted so collection can stop at the first live entry
        let position = self
            .pending
            .iter()
            .rposition(|(value, _)| *value <= fence_value)
            .map_or(0, |p| p + 1);
        self.pending.insert(position, (fence_value, item));
    }

    /// Remove and return every item whose fence value is `<= completed`
    pub fn collect(&mut self, completed: u64) -> Vec<T> {
        let mut released = Vec::new();
        while let Some((value, _)) = self.pending.front() {
            if *value > completed {
                break;
            }
            if let Some((_, item)) = self.pending.pop_front() {
                released.push(item);
            }
        }
        released
    }

    /// Remove every item regardless of fence state (after a full drain)
    pub fn drain_all(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Highest fence value still guarding an item
    pub fn last_fence_value(&self) -> Option<u64> {
        self.pending.back().map(|(value, _)| *value)
    }
}

impl<T> Default for DeferredReleaseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "deferred_release_tests.rs"]
mod tests;
