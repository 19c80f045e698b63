//! Unit tests for the swapchain selection helpers (no GPU required)

use ash::vk;
use frame_pipeline::gpu::device::TextureFormat;

use crate::vulkan_swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
};

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min,
        max_image_count: max,
        current_extent: vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D {
            width: 4096,
            height: 4096,
        },
        ..Default::default()
    }
}

// ============================================================================
// SURFACE FORMAT TESTS
// ============================================================================

#[test]
fn test_prefers_linear_bgra() {
    let formats = [
        surface_format(vk::Format::B8G8R8A8_SRGB),
        surface_format(vk::Format::R8G8B8A8_UNORM),
        surface_format(vk::Format::B8G8R8A8_UNORM),
    ];
    let (chosen, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(format, TextureFormat::B8G8R8A8_UNORM);
}

#[test]
fn test_falls_back_to_srgb() {
    let formats = [
        surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
        surface_format(vk::Format::B8G8R8A8_SRGB),
    ];
    let (_, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(format, TextureFormat::B8G8R8A8_SRGB);
}

#[test]
fn test_no_usable_format() {
    let formats = [surface_format(vk::Format::R16G16B16A16_SFLOAT)];
    assert!(choose_surface_format(&formats).is_none());
}

// ============================================================================
// PRESENT MODE TESTS
// ============================================================================

#[test]
fn test_vsync_always_fifo() {
    let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_no_vsync_prefers_mailbox_then_immediate() {
    let all = [
        vk::PresentModeKHR::FIFO,
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::MAILBOX,
    ];
    assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

    let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
    assert_eq!(choose_present_mode(&no_mailbox, false), vk::PresentModeKHR::IMMEDIATE);

    let fifo_only = [vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&fifo_only, false), vk::PresentModeKHR::FIFO);
}

// ============================================================================
// IMAGE COUNT AND EXTENT TESTS
// ============================================================================

#[test]
fn test_image_count_clamped() {
    assert_eq!(choose_image_count(2, &capabilities(2, 8)), 2);
    assert_eq!(choose_image_count(2, &capabilities(3, 8)), 3);
    assert_eq!(choose_image_count(3, &capabilities(1, 2)), 2);
    // max_image_count 0 means no upper limit
    assert_eq!(choose_image_count(3, &capabilities(2, 0)), 3);
}

#[test]
fn test_extent_follows_compositor_when_fixed() {
    let mut caps = capabilities(2, 3);
    caps.current_extent = vk::Extent2D { width: 800, height: 600 };
    let extent = choose_extent(&caps, 1280, 720);
    assert_eq!((extent.width, extent.height), (800, 600));
}

#[test]
fn test_extent_clamped_when_free() {
    let caps = capabilities(2, 3);
    let extent = choose_extent(&caps, 8000, 0);
    assert_eq!((extent.width, extent.height), (4096, 1));
}
