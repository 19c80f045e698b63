/// Root signature and pipeline state descriptors

use std::any::Any;

use crate::graphics_device::{ShaderBlob, ShaderStage, TextureFormat};

/// Vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    R32G32_FLOAT,
    R32G32B32_FLOAT,
    R32G32B32A32_FLOAT,
}

impl VertexFormat {
    /// Returns size in bytes for this format
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::R32G32_FLOAT => 8,
            VertexFormat::R32G32B32_FLOAT => 12,
            VertexFormat::R32G32B32A32_FLOAT => 16,
        }
    }
}

/// One vertex attribute of the input layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputElement {
    /// HLSL semantic name (POSITION, COLOR, TEXCOORD)
    pub semantic: &'static str,
    pub semantic_index: u32,
    pub format: VertexFormat,
    /// Byte offset inside the vertex
    pub offset: u32,
    /// Shader input location (Vulkan backends)
    pub location: u32,
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Point,
    Linear,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Sampler baked into the root signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSampler {
    pub filter: Filter,
    pub address_mode: AddressMode,
    pub border_color: BorderColor,
    pub shader_register: u32,
    pub visibility: ShaderStage,
}

impl StaticSampler {
    /// Point-filtered, border-addressed sampler with a transparent black border
    pub fn point_border(shader_register: u32) -> Self {
        Self {
            filter: Filter::Point,
            address_mode: AddressMode::Border,
            border_color: BorderColor::TransparentBlack,
            shader_register,
            visibility: ShaderStage::Pixel,
        }
    }
}

/// Root parameter: a table of shader-resource views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTableParameter {
    /// First shader register (t0 = 0)
    pub base_register: u32,
    pub descriptor_count: u32,
    pub visibility: ShaderStage,
}

/// Root signature layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSignatureDesc {
    /// SRV tables, one root parameter each, in parameter order
    pub srv_tables: Vec<DescriptorTableParameter>,
    pub static_samplers: Vec<StaticSampler>,
    /// Allow an input assembler layout
    pub allow_input_layout: bool,
}

/// Root signature trait
pub trait RootSignature: Send + Sync {
    fn desc(&self) -> &RootSignatureDesc;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

/// Graphics pipeline description
pub struct PipelineStateDesc<'a> {
    pub root_signature: &'a dyn RootSignature,
    pub vertex_shader: &'a ShaderBlob,
    pub pixel_shader: &'a ShaderBlob,
    pub input_layout: Vec<InputElement>,
    /// Vertex stride in bytes
    pub vertex_stride: u32,
    pub render_target_format: TextureFormat,
}

/// Pipeline state trait
pub trait PipelineState: Send + Sync {
    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
