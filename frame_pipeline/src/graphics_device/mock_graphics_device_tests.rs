/// Unit tests for MockGraphicsDevice and associated mock types.
///
/// The rest of the crate relies on the mock behaving like an asynchronous
/// GPU, so its timeline rules are tested on their own here.

use crate::error::Error;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandAllocator, CommandList, DescriptorHeap, DescriptorHeapKind,
    Fence, GraphicsDevice, HeapType, ShaderCompileRequest, ShaderCompiler, ShaderStage,
    Swapchain, Texture, TextureCopyLayout, TextureDesc, TextureFormat, TextureUsage, WaitStatus,
};

fn upload_desc(size: u64) -> BufferDesc {
    BufferDesc { name: "upload".to_string(), size, heap: HeapType::Upload }
}

fn default_desc(size: u64) -> BufferDesc {
    BufferDesc { name: "default".to_string(), size, heap: HeapType::Default }
}

// ============================================================================
// Fence timeline
// ============================================================================

#[test]
fn test_signal_is_lazy_until_waited() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(0).unwrap();

    device.signal(fence.as_ref(), 1).unwrap();
    assert_eq!(fence.completed_value().unwrap(), 0);
    assert_eq!(device.pending_work(), 1);

    assert_eq!(fence.wait_for_value(1, None).unwrap(), WaitStatus::Reached);
    assert_eq!(fence.completed_value().unwrap(), 1);
    assert_eq!(device.stats().blocking_waits, 1);
}

#[test]
fn test_wait_on_reached_value_does_not_block() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(5).unwrap();

    assert_eq!(fence.wait_for_value(3, None).unwrap(), WaitStatus::Reached);
    assert_eq!(device.stats().blocking_waits, 0);
}

#[test]
fn test_wait_on_unsignaled_value_times_out() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(0).unwrap();
    device.signal(fence.as_ref(), 1).unwrap();

    assert_eq!(fence.wait_for_value(2, None).unwrap(), WaitStatus::TimedOut);
    assert_eq!(fence.completed_value().unwrap(), 1);
}

#[test]
fn test_stalled_gpu_never_progresses() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(0).unwrap();
    device.set_stalled(true);
    device.signal(fence.as_ref(), 1).unwrap();

    assert_eq!(fence.wait_for_value(1, None).unwrap(), WaitStatus::TimedOut);
    assert!(matches!(device.wait_idle(), Err(Error::DeviceLost(_))));
}

#[test]
fn test_auto_complete_runs_on_submit() {
    let device = MockGraphicsDevice::new();
    device.set_auto_complete(true);
    let fence = device.create_fence(0).unwrap();

    device.signal(fence.as_ref(), 4).unwrap();
    assert_eq!(fence.completed_value().unwrap(), 4);
    assert_eq!(device.pending_work(), 0);
}

// ============================================================================
// Command lists
// ============================================================================

#[test]
fn test_command_list_lifecycle() {
    let device = MockGraphicsDevice::new();
    let allocator = device.create_command_allocator().unwrap();
    let mut list = device.create_command_list(allocator.as_ref()).unwrap();

    // Created closed
    assert!(list.close().is_err());

    list.reset(allocator.as_ref(), None).unwrap();
    assert!(list.reset(allocator.as_ref(), None).is_err());
    list.close().unwrap();
    assert!(list.close().is_err());
}

#[test]
fn test_execute_requires_closed_list() {
    let device = MockGraphicsDevice::new();
    let allocator = device.create_command_allocator().unwrap();
    let mut list = device.create_command_list(allocator.as_ref()).unwrap();
    list.reset(allocator.as_ref(), None).unwrap();

    assert!(device.execute_command_lists(&[list.as_ref()]).is_err());
}

#[test]
fn test_allocator_reset_while_in_flight_is_rejected() {
    let device = MockGraphicsDevice::new();
    let mut allocator = device.create_command_allocator().unwrap();
    let mut list = device.create_command_list(allocator.as_ref()).unwrap();
    let fence = device.create_fence(0).unwrap();

    list.reset(allocator.as_ref(), None).unwrap();
    list.close().unwrap();
    device.execute_command_lists(&[list.as_ref()]).unwrap();
    device.signal(fence.as_ref(), 1).unwrap();

    assert!(matches!(allocator.reset(), Err(Error::SynchronizationMisuse(_))));

    fence.wait_for_value(1, None).unwrap();
    assert!(allocator.reset().is_ok());
}

// ============================================================================
// Resources
// ============================================================================

#[test]
fn test_buffer_copy_moves_bytes() {
    let device = MockGraphicsDevice::new();
    let src = device.create_buffer(&upload_desc(8)).unwrap();
    let dst = device.create_buffer(&default_desc(8)).unwrap();
    src.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let allocator = device.create_command_allocator().unwrap();
    let mut list = device.create_command_list(allocator.as_ref()).unwrap();
    list.reset(allocator.as_ref(), None).unwrap();
    list.copy_buffer_region(dst.as_ref(), 0, src.as_ref(), 0, 8).unwrap();
    list.close().unwrap();
    device.execute_command_lists(&[list.as_ref()]).unwrap();

    assert_eq!(device.buffer_contents(dst.as_ref()), vec![0; 8]);
    device.flush();
    assert_eq!(device.buffer_contents(dst.as_ref()), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_default_heap_is_not_cpu_accessible() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&default_desc(4)).unwrap();
    assert!(buffer.write(0, &[1]).is_err());
    let mut out = [0u8; 4];
    assert!(buffer.read(0, &mut out).is_err());
}

#[test]
fn test_pitched_texture_copy() {
    let device = MockGraphicsDevice::new();
    let desc = TextureDesc {
        name: "tex".to_string(),
        width: 2,
        height: 2,
        format: TextureFormat::R8G8B8A8_UNORM,
        usage: TextureUsage::Sampled,
    };
    let texture = device.create_texture(&desc).unwrap();
    let layout = TextureCopyLayout::padded(2, 2, 4, 16);
    let staging = device.create_buffer(&upload_desc(layout.total_size())).unwrap();
    staging.write(0, &[1; 8]).unwrap();
    staging.write(16, &[2; 8]).unwrap();

    let allocator = device.create_command_allocator().unwrap();
    let mut list = device.create_command_list(allocator.as_ref()).unwrap();
    list.reset(allocator.as_ref(), None).unwrap();
    list.copy_buffer_to_texture(texture.as_ref(), staging.as_ref(), &layout).unwrap();
    list.close().unwrap();
    device.execute_command_lists(&[list.as_ref()]).unwrap();
    device.flush();

    let mut expected = vec![1u8; 8];
    expected.extend_from_slice(&[2; 8]);
    assert_eq!(device.texture_contents(texture.as_ref()), expected);
}

#[test]
fn test_memory_budget() {
    let device = MockGraphicsDevice::new().with_memory_budget(100);
    let first = device.create_buffer(&upload_desc(60)).unwrap();
    assert!(matches!(device.create_buffer(&upload_desc(60)), Err(Error::OutOfMemory)));

    drop(first);
    assert!(device.create_buffer(&upload_desc(60)).is_ok());
}

#[test]
fn test_dropped_resources_are_freed() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(&upload_desc(16)).unwrap();
    assert_eq!(device.live_resources(), 1);
    drop(buffer);
    assert_eq!(device.live_resources(), 0);
    assert_eq!(device.stats().allocated_bytes, 0);
}

// ============================================================================
// Descriptors / swap chain / shaders
// ============================================================================

#[test]
fn test_descriptor_heaps() {
    let device = MockGraphicsDevice::new();
    let rtv = device.create_descriptor_heap(DescriptorHeapKind::RenderTarget, 2).unwrap();
    let srv = device.create_descriptor_heap(DescriptorHeapKind::ShaderResource, 1).unwrap();

    assert_eq!(rtv.capacity(), 2);
    assert!(rtv.gpu_start().is_none());
    assert!(srv.gpu_start().is_some());
    assert_ne!(rtv.cpu_start(), srv.cpu_start());
    assert!(device.create_descriptor_heap(DescriptorHeapKind::RenderTarget, 0).is_err());
}

#[test]
fn test_swapchain_rotation_and_presents() {
    let device = MockGraphicsDevice::new();
    let surface = MockSurface::new(64, 32);
    let mut swapchain = device.create_swapchain(&surface, 2, true).unwrap();

    assert_eq!(swapchain.buffer_count(), 2);
    assert_eq!(swapchain.current_back_buffer_index(), 0);
    swapchain.present().unwrap();
    assert_eq!(swapchain.current_back_buffer_index(), 1);
    swapchain.present().unwrap();
    assert_eq!(swapchain.current_back_buffer_index(), 0);
    assert_eq!(device.stats().presents, 2);
    assert_eq!(swapchain.back_buffer(0).unwrap().desc().width, 64);
}

#[test]
fn test_swapchain_resize_requires_released_back_buffers() {
    let device = MockGraphicsDevice::new();
    let surface = MockSurface::new(64, 32);
    let mut swapchain = device.create_swapchain(&surface, 2, true).unwrap();

    let held = swapchain.back_buffer(1).unwrap();
    assert!(swapchain.resize(128, 64).is_err());
    drop(held);

    swapchain.resize(128, 64).unwrap();
    assert_eq!(swapchain.extent().width, 128);
    assert_eq!(swapchain.back_buffer(0).unwrap().desc().height, 64);
}

#[test]
fn test_shader_compiler_records_requests() {
    let compiler = MockShaderCompiler::default();
    let request = ShaderCompileRequest::for_stage("shaders.hlsl", ShaderStage::Vertex, true);
    let blob = compiler.compile(&request).unwrap();

    assert_eq!(blob.stage, ShaderStage::Vertex);
    assert_eq!(blob.entry_point, "VSMain");
    assert!(!blob.is_empty());
    assert_eq!(compiler.requests.lock().unwrap().len(), 1);
}

#[test]
fn test_shader_compiler_failure() {
    let compiler = MockShaderCompiler {
        fail_on: Some("broken".to_string()),
        ..Default::default()
    };
    let request = ShaderCompileRequest::for_stage("broken.hlsl", ShaderStage::Pixel, false);
    assert!(compiler.compile(&request).is_err());
}
