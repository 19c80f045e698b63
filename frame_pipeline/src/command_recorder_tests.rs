//! Unit tests for command_recorder.rs

use std::sync::Arc;

use crate::command_recorder::{CommandRecorder, FrameCommands, RecorderState};
use crate::config::SyncStrategy;
use crate::error::Error;
use crate::frame_slots::FrameSlots;
use crate::graphics_device::mock_graphics_device::{MockCommand, MockGraphicsDevice, MockSurface};
use crate::graphics_device::{
    BufferDesc, CpuDescriptorHandle, GraphicsDevice, HeapType, Rect, Texture, VertexBufferView,
    Viewport,
};
use crate::sync::FrameSynchronizer;

// ============================================================================
// TEST HELPERS
// ============================================================================

struct Fixture {
    device: MockGraphicsDevice,
    slots: FrameSlots,
    sync: FrameSynchronizer,
    recorder: CommandRecorder,
    back_buffer: Arc<dyn Texture>,
}

fn fixture() -> Fixture {
    let device = MockGraphicsDevice::new();
    let slots = FrameSlots::new(&device, 2).unwrap();
    let sync = FrameSynchronizer::new(&device, SyncStrategy::DoubleBuffered, None).unwrap();
    let recorder = CommandRecorder::new(&device, slots.get(0).unwrap()).unwrap();
    let swapchain = device.create_swapchain(&MockSurface::new(8, 8), 2, false).unwrap();
    let back_buffer = swapchain.back_buffer(0).unwrap();
    Fixture { device, slots, sync, recorder, back_buffer }
}

fn clear_only(back_buffer: &dyn Texture) -> FrameCommands<'_> {
    FrameCommands {
        root_signature: None,
        descriptor_table: None,
        viewport: Viewport::full(8, 8),
        scissor: Rect::full(8, 8),
        back_buffer,
        rtv: CpuDescriptorHandle(1),
        clear_color: [0.0, 0.2, 0.4, 1.0],
        vertex_buffer: None,
        vertex_count: 0,
    }
}

fn last_executed(device: &MockGraphicsDevice) -> Vec<&'static str> {
    device.flush();
    device
        .executed_lists()
        .last()
        .map(|list| list.iter().map(MockCommand::name).collect())
        .unwrap_or_default()
}

// ============================================================================
// RECORDING ORDER
// ============================================================================

#[test]
fn test_clear_only_frame_order() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.record_frame(&clear_only(f.back_buffer.as_ref())).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();

    assert_eq!(
        last_executed(&f.device),
        vec!["viewport", "scissor", "barrier", "render_target", "clear", "barrier"]
    );
}

#[test]
fn test_draw_frame_order() {
    let mut f = fixture();
    let vertices = f
        .device
        .create_buffer(&BufferDesc { name: "vb".to_string(), size: 84, heap: HeapType::Upload })
        .unwrap();
    let root_signature = f.device.create_root_signature(&Default::default()).unwrap();

    let mut frame = clear_only(f.back_buffer.as_ref());
    frame.root_signature = Some(root_signature.as_ref());
    frame.vertex_buffer = Some(VertexBufferView {
        buffer: vertices.as_ref(),
        size_in_bytes: 84,
        stride_in_bytes: 28,
    });
    frame.vertex_count = 3;

    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.record_frame(&frame).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();

    assert_eq!(
        last_executed(&f.device),
        vec![
            "root_signature",
            "viewport",
            "scissor",
            "barrier",
            "render_target",
            "clear",
            "topology",
            "vertex_buffer",
            "draw",
            "barrier",
        ]
    );
}

#[test]
fn test_barriers_bracket_the_frame() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.record_frame(&clear_only(f.back_buffer.as_ref())).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();
    f.device.flush();

    let executed = f.device.executed_lists();
    let barriers: Vec<_> = executed[0]
        .iter()
        .filter_map(|c| match c {
            MockCommand::Barrier { before, after, .. } => Some((*before, *after)),
            _ => None,
        })
        .collect();

    use crate::graphics_device::ResourceState::{Present, RenderTarget};
    assert_eq!(barriers, vec![(Present, RenderTarget), (RenderTarget, Present)]);
}

#[test]
fn test_clear_writes_back_buffer() {
    let mut f = fixture();
    let rtv = CpuDescriptorHandle(1);
    f.device.create_render_target_view(f.back_buffer.as_ref(), rtv).unwrap();

    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.record_frame(&clear_only(f.back_buffer.as_ref())).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();
    f.device.flush();

    let pixels = f.device.texture_contents(f.back_buffer.as_ref());
    assert_eq!(&pixels[..4], &[0, 51, 102, 255]);
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[test]
fn test_state_transitions() {
    let mut f = fixture();
    assert_eq!(f.recorder.state(), RecorderState::Idle);

    f.recorder.begin(f.slots.get_mut(1).unwrap(), &f.sync, None).unwrap();
    assert_eq!(f.recorder.state(), RecorderState::Recording { slot: 1 });
    f.recorder.end().unwrap();
    assert_eq!(f.recorder.state(), RecorderState::Closed { slot: 1 });
    assert_eq!(f.recorder.submit(&f.device, &mut f.sync).unwrap(), 1);
    assert_eq!(f.recorder.state(), RecorderState::Submitted { slot: 1 });
}

#[test]
fn test_end_twice_is_misuse() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.end().unwrap();
    assert!(matches!(f.recorder.end(), Err(Error::SynchronizationMisuse(_))));
}

#[test]
fn test_end_without_begin_is_misuse() {
    let mut f = fixture();
    assert!(matches!(f.recorder.end(), Err(Error::SynchronizationMisuse(_))));
}

#[test]
fn test_begin_while_recording_is_misuse() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    let err = f.recorder.begin(f.slots.get_mut(1).unwrap(), &f.sync, None).unwrap_err();
    assert!(matches!(err, Error::SynchronizationMisuse(_)));
}

#[test]
fn test_record_requires_open_list() {
    let mut f = fixture();
    assert!(f.recorder.record_frame(&clear_only(f.back_buffer.as_ref())).is_err());
    assert!(f.recorder.submit(&f.device, &mut f.sync).is_err());
}

#[test]
fn test_begin_on_in_flight_slot_is_rejected() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();
    let value = f.sync.signal_and_advance(&f.device).unwrap();
    f.slots.get_mut(0).unwrap().mark_submitted(value).unwrap();

    // GPU has not run slot 0 yet
    let err = f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap_err();
    assert!(matches!(err, Error::SynchronizationMisuse(_)));
    assert_eq!(f.recorder.state(), RecorderState::Submitted { slot: 0 });

    // Slot 1 is free
    f.recorder.begin(f.slots.get_mut(1).unwrap(), &f.sync, None).unwrap();
}

#[test]
fn test_begin_after_wait_succeeds() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();
    let value = f.sync.signal_and_advance(&f.device).unwrap();
    f.slots.get_mut(0).unwrap().mark_submitted(value).unwrap();

    f.sync.wait_for_slot(f.slots.get(0).unwrap()).unwrap();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    assert_eq!(f.recorder.state(), RecorderState::Recording { slot: 0 });
}

#[test]
fn test_drain_covers_submission_without_signal() {
    let mut f = fixture();
    f.recorder.begin(f.slots.get_mut(0).unwrap(), &f.sync, None).unwrap();
    f.recorder.record_frame(&clear_only(f.back_buffer.as_ref())).unwrap();
    f.recorder.end().unwrap();
    f.recorder.submit(&f.device, &mut f.sync).unwrap();
    assert_eq!(f.device.pending_work(), 1);

    // The frame failed before its own signal
    f.sync.drain(&f.device).unwrap().into_result().unwrap();
    assert_eq!(f.device.pending_work(), 0);
    assert_eq!(f.device.stats().executed_command_lists, 1);
}
