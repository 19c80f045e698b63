/// Format and state conversions between frame_pipeline types and Vulkan
///
/// Pure functions, no device access. Kept apart from the device so the
/// mappings can be unit tested without a GPU.

use ash::vk;
use frame_pipeline::gpu::Error;
use frame_pipeline::gpu::device::{
    AddressMode, BorderColor, Filter, HeapType, PrimitiveTopology, ResourceState, ShaderStage,
    TextureFormat, VertexFormat,
};
use gpu_allocator::MemoryLocation;

/// Convert a texture format to its Vulkan equivalent
pub(crate) fn texture_format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
    }
}

/// Convert a Vulkan surface format back, None if the pipeline cannot render to it
pub(crate) fn texture_format_from_vk(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::R8G8B8A8_UNORM),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::B8G8R8A8_UNORM),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::R8G8B8A8_SRGB),
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::B8G8R8A8_SRGB),
        _ => None,
    }
}

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::R32G32_FLOAT => vk::Format::R32G32_SFLOAT,
        VertexFormat::R32G32B32_FLOAT => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32_FLOAT => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub(crate) fn shader_stage_to_vk(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Pixel => vk::ShaderStageFlags::FRAGMENT,
    }
}

/// Vulkan-side meaning of a resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateInfo {
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags,
    pub stage: vk::PipelineStageFlags,
}

/// Map a resource state to an image layout, access mask and pipeline stage
///
/// `Present` used as the source of a transition maps to `UNDEFINED`: back
/// buffers are always cleared after leaving it, and the first frame finds
/// a freshly created image in no defined layout.
pub(crate) fn resource_state_to_vk(state: ResourceState, is_source: bool) -> StateInfo {
    match state {
        ResourceState::Common => StateInfo {
            layout: vk::ImageLayout::GENERAL,
            access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            stage: vk::PipelineStageFlags::ALL_COMMANDS,
        },
        ResourceState::Present if is_source => StateInfo {
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags::empty(),
            stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        },
        ResourceState::Present => StateInfo {
            layout: vk::ImageLayout::PRESENT_SRC_KHR,
            access: vk::AccessFlags::empty(),
            stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        },
        ResourceState::RenderTarget => StateInfo {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            access: vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        },
        ResourceState::CopySource => StateInfo {
            layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            access: vk::AccessFlags::TRANSFER_READ,
            stage: vk::PipelineStageFlags::TRANSFER,
        },
        ResourceState::CopyDest => StateInfo {
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            access: vk::AccessFlags::TRANSFER_WRITE,
            stage: vk::PipelineStageFlags::TRANSFER,
        },
        ResourceState::PixelShaderResource => StateInfo {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            access: vk::AccessFlags::SHADER_READ,
            stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        ResourceState::VertexAndConstantBuffer => StateInfo {
            layout: vk::ImageLayout::GENERAL,
            access: vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ,
            stage: vk::PipelineStageFlags::VERTEX_INPUT | vk::PipelineStageFlags::VERTEX_SHADER,
        },
        ResourceState::GenericRead => StateInfo {
            layout: vk::ImageLayout::GENERAL,
            access: vk::AccessFlags::HOST_WRITE,
            stage: vk::PipelineStageFlags::HOST,
        },
    }
}

pub(crate) fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Point => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn mipmap_mode_to_vk(filter: Filter) -> vk::SamplerMipmapMode {
    match filter {
        Filter::Point => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub(crate) fn border_color_to_vk(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

/// gpu-allocator memory location for a heap type
pub(crate) fn heap_to_memory_location(heap: HeapType) -> MemoryLocation {
    match heap {
        HeapType::Default => MemoryLocation::GpuOnly,
        HeapType::Upload => MemoryLocation::CpuToGpu,
        HeapType::Readback => MemoryLocation::GpuToCpu,
    }
}

/// Map a failed Vulkan call to a pipeline error
pub(crate) fn vk_result_to_error(result: vk::Result, what: &str) -> Error {
    match result {
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost(format!("{}: {:?}", what, result)),
        vk::Result::ERROR_OUT_OF_DATE_KHR => Error::SurfaceOutOfDate(format!("{}: {:?}", what, result)),
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            Error::OutOfMemory
        }
        _ => Error::BackendError(format!("{}: {:?}", what, result)),
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
