/// Frame slots - per back buffer state in one indexed arena
///
/// Slot `i` owns the command allocator, the back buffer reference, the
/// render-target view and the last fence value submitted against back
/// buffer `i`. Keeping them together makes "one allocator, one fence value,
/// one back buffer per index" a structural property.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{CommandAllocator, CpuDescriptorHandle, GraphicsDevice, Texture};

/// One in-flight frame slot
pub struct FrameSlot {
    index: u32,
    allocator: Box<dyn CommandAllocator>,
    back_buffer: Option<Arc<dyn Texture>>,
    rtv: Option<CpuDescriptorHandle>,
    /// 0 = never submitted
    fence_value: u64,
}

impl FrameSlot {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Fence value of the last submission recorded from this slot
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub fn allocator(&self) -> &dyn CommandAllocator {
        self.allocator.as_ref()
    }

    pub fn allocator_mut(&mut self) -> &mut dyn CommandAllocator {
        self.allocator.as_mut()
    }

    /// Back buffer attached to this slot
    pub fn back_buffer(&self) -> Result<&Arc<dyn Texture>> {
        self.back_buffer.as_ref().ok_or_else(|| {
            Error::InvalidResource(format!("frame slot {} has no back buffer", self.index))
        })
    }

    /// Render-target view of the back buffer
    pub fn rtv(&self) -> Result<CpuDescriptorHandle> {
        self.rtv.ok_or_else(|| {
            Error::InvalidResource(format!("frame slot {} has no render target view", self.index))
        })
    }

    /// Attach the slot's back buffer and its render-target view
    pub fn attach_back_buffer(&mut self, back_buffer: Arc<dyn Texture>, rtv: CpuDescriptorHandle) {
        self.back_buffer = Some(back_buffer);
        self.rtv = Some(rtv);
    }

    /// Drop the back buffer reference (before a swap chain resize)
    pub fn release_back_buffer(&mut self) {
        self.back_buffer = None;
        self.rtv = None;
    }

    /// Record the fence value that completes this slot's latest submission
    ///
    /// Fence values only grow: a smaller value than the current one is a bug.
    pub fn mark_submitted(&mut self, fence_value: u64) -> Result<()> {
        if fence_value < self.fence_value {
            return Err(Error::SynchronizationMisuse(format!(
                "frame slot {} fence value moved backwards ({} -> {})",
                self.index, self.fence_value, fence_value
            )));
        }
        self.fence_value = fence_value;
        Ok(())
    }
}

/// Fixed-capacity array of frame slots, one per back buffer
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    /// Create `count` slots, each with its own command allocator
    pub fn new(device: &dyn GraphicsDevice, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::InitializationFailed("at least one frame slot is required".to_string()));
        }
        let slots = (0..count)
            .map(|index| {
                Ok(FrameSlot {
                    index,
                    allocator: device.create_command_allocator()?,
                    back_buffer: None,
                    rtv: None,
                    fence_value: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: u32) -> Result<&FrameSlot> {
        let count = self.slots.len();
        self.slots.get(index as usize).ok_or_else(|| {
            Error::InvalidResource(format!("frame slot {} out of range ({} slots)", index, count))
        })
    }

    pub fn get_mut(&mut self, index: u32) -> Result<&mut FrameSlot> {
        let count = self.slots.len();
        self.slots.get_mut(index as usize).ok_or_else(|| {
            Error::InvalidResource(format!("frame slot {} out of range ({} slots)", index, count))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot> {
        self.slots.iter_mut()
    }

    /// Highest fence value submitted from any slot
    pub fn max_fence_value(&self) -> u64 {
        self.slots.iter().map(|s| s.fence_value).max().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "frame_slots_tests.rs"]
mod tests;
