/// Command recorder - one command list, one allocator per frame slot
///
/// State machine of the recording:
///
/// ```text
/// Idle -> Recording -> Closed -> Submitted -> Recording -> ...
/// ```
///
/// `begin` may only reopen a recording once the slot's previous submission
/// has completed. The check goes through `FrameSynchronizer` so an allocator
/// still in use by the GPU is never reset.

use crate::error::{Error, Result};
use crate::frame_slots::FrameSlot;
use crate::graphics_device::{
    CommandList, CpuDescriptorHandle, DescriptorHeap, GpuDescriptorHandle, GraphicsDevice,
    PipelineState, PrimitiveTopology, Rect, ResourceBarrier, ResourceState, RootSignature, Texture,
    VertexBufferView, Viewport,
};
use crate::sync::FrameSynchronizer;
use crate::{pipeline_misuse, pipeline_trace};

/// Where the command list is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Never opened
    Idle,
    /// Open for slot `slot`
    Recording { slot: u32 },
    /// Closed, ready to execute
    Closed { slot: u32 },
    /// Handed to the queue
    Submitted { slot: u32 },
}

/// Everything one frame draws
///
/// Optional parts are skipped: a clear-only frame has no pipeline, no
/// descriptor table and no vertex buffer.
pub struct FrameCommands<'a> {
    pub root_signature: Option<&'a dyn RootSignature>,
    /// Shader-visible heap and table bound to root parameter 0
    pub descriptor_table: Option<(&'a dyn DescriptorHeap, GpuDescriptorHandle)>,
    pub viewport: Viewport,
    pub scissor: Rect,
    pub back_buffer: &'a dyn Texture,
    pub rtv: CpuDescriptorHandle,
    pub clear_color: [f32; 4],
    pub vertex_buffer: Option<VertexBufferView<'a>>,
    pub vertex_count: u32,
}

pub struct CommandRecorder {
    list: Box<dyn CommandList>,
    state: RecorderState,
}

impl CommandRecorder {
    /// Create the command list against `slot`'s allocator
    ///
    /// The list starts closed; nothing is recorded until `begin`.
    pub fn new(device: &dyn GraphicsDevice, slot: &FrameSlot) -> Result<Self> {
        let list = device.create_command_list(slot.allocator())?;
        Ok(Self {
            list,
            state: RecorderState::Idle,
        })
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Reset `slot`'s allocator and open a recording on it
    ///
    /// # Arguments
    ///
    /// * `slot` - Frame slot whose allocator backs the recording
    /// * `sync` - Synchronizer proving the slot's last submission completed
    /// * `initial_state` - Pipeline state bound at the start of the list
    pub fn begin(
        &mut self,
        slot: &mut FrameSlot,
        sync: &FrameSynchronizer,
        initial_state: Option<&dyn PipelineState>,
    ) -> Result<()> {
        match self.state {
            RecorderState::Recording { slot: open } | RecorderState::Closed { slot: open } => {
                pipeline_misuse!(
                    "frame_pipeline::recorder",
                    "begin on slot {} while the recording for slot {} was never submitted",
                    slot.index(),
                    open
                );
            }
            RecorderState::Idle | RecorderState::Submitted { .. } => {}
        }

        sync.ensure_slot_available(slot)?;
        slot.allocator_mut().reset()?;
        self.list.reset(slot.allocator(), initial_state)?;
        self.state = RecorderState::Recording { slot: slot.index() };

        pipeline_trace!("frame_pipeline::recorder", "Recording slot {}", slot.index());
        Ok(())
    }

    /// Open command list, for recording copies and barriers
    pub fn list_mut(&mut self) -> Result<&mut dyn CommandList> {
        match self.state {
            RecorderState::Recording { .. } => Ok(self.list.as_mut()),
            other => Err(Error::SynchronizationMisuse(format!(
                "command list is not recording ({:?})",
                other
            ))),
        }
    }

    /// Record one frame, in the fixed order the GPU expects
    pub fn record_frame(&mut self, frame: &FrameCommands<'_>) -> Result<()> {
        let list = self.list_mut()?;

        if let Some(root_signature) = frame.root_signature {
            list.set_graphics_root_signature(root_signature)?;
        }
        if let Some((heap, table)) = frame.descriptor_table {
            list.set_descriptor_heaps(&[heap])?;
            list.set_graphics_root_descriptor_table(0, table)?;
        }
        list.set_viewport(frame.viewport)?;
        list.set_scissor(frame.scissor)?;

        list.resource_barrier(&ResourceBarrier::texture(
            frame.back_buffer,
            ResourceState::Present,
            ResourceState::RenderTarget,
        ))?;

        list.set_render_target(frame.rtv)?;
        list.clear_render_target(frame.rtv, frame.clear_color)?;

        if let Some(view) = &frame.vertex_buffer {
            list.set_primitive_topology(PrimitiveTopology::TriangleList)?;
            list.set_vertex_buffer(view)?;
            list.draw_instanced(frame.vertex_count, 1, 0, 0)?;
        }

        list.resource_barrier(&ResourceBarrier::texture(
            frame.back_buffer,
            ResourceState::RenderTarget,
            ResourceState::Present,
        ))?;
        Ok(())
    }

    /// Close the recording
    pub fn end(&mut self) -> Result<()> {
        let slot = match self.state {
            RecorderState::Recording { slot } => slot,
            other => {
                pipeline_misuse!(
                    "frame_pipeline::recorder",
                    "end called without an open recording ({:?})",
                    other
                );
            }
        };
        self.list.close()?;
        self.state = RecorderState::Closed { slot };
        Ok(())
    }

    /// Execute the closed list on the device queue
    ///
    /// Returns the slot the list was recorded for. The caller signals the
    /// fence next and stores the value in that slot; until then `sync`
    /// counts the list as unsignaled work.
    pub fn submit(&mut self, device: &dyn GraphicsDevice, sync: &mut FrameSynchronizer) -> Result<u32> {
        let slot = match self.state {
            RecorderState::Closed { slot } => slot,
            other => {
                pipeline_misuse!(
                    "frame_pipeline::recorder",
                    "submit of a command list that is not closed ({:?})",
                    other
                );
            }
        };
        device.execute_command_lists(&[self.list.as_ref()])?;
        sync.note_submitted();
        self.state = RecorderState::Submitted { slot };
        Ok(slot)
    }
}

#[cfg(test)]
#[path = "command_recorder_tests.rs"]
mod tests;
