/// RootSignature and PipelineState - Vulkan implementations
///
/// A root signature becomes a pipeline layout: set `i` holds SRV table `i`,
/// the set after the last table holds the static samplers as immutable
/// samplers. The sampler set is allocated once here and bound together with
/// the root signature.

use ash::vk;
use std::any::Any;
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{
    PipelineState as PipelineStateTrait, PipelineStateDesc, RootSignature as RootSignatureTrait,
    RootSignatureDesc, ShaderBlob,
};
use frame_pipeline::{pipeline_debug, pipeline_err, pipeline_error};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    address_mode_to_vk, border_color_to_vk, filter_to_vk, mipmap_mode_to_vk, shader_stage_to_vk,
    texture_format_to_vk, vertex_format_to_vk, vk_result_to_error,
};

// ============================================================================
// ROOT SIGNATURE
// ============================================================================

/// Vulkan root signature implementation
pub struct RootSignature {
    ctx: Arc<GpuContext>,
    desc: RootSignatureDesc,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    samplers: Vec<vk::Sampler>,
    sampler_set_layout: Option<vk::DescriptorSetLayout>,
    sampler_pool: Option<vk::DescriptorPool>,
    /// (set index, set) of the static sampler set
    pub(crate) sampler_set: Option<(u32, vk::DescriptorSet)>,
}

impl RootSignature {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &RootSignatureDesc) -> Result<Self> {
        let mut root = Self {
            ctx,
            desc: desc.clone(),
            pipeline_layout: vk::PipelineLayout::null(),
            samplers: Vec::new(),
            sampler_set_layout: None,
            sampler_pool: None,
            sampler_set: None,
        };

        // Partially built objects are released by Drop on error
        let mut set_layouts = Vec::with_capacity(desc.srv_tables.len() + 1);
        for table in &desc.srv_tables {
            if table.base_register != 0 {
                return Err(Error::InvalidResource(format!(
                    "SRV table must start at register t0 (got t{})",
                    table.base_register
                )));
            }
            set_layouts.push(root.ctx.srv_set_layout(table.descriptor_count)?);
        }

        if !desc.static_samplers.is_empty() {
            let set_index = desc.srv_tables.len() as u32;
            root.create_sampler_set(set_index)?;
            if let Some(layout) = root.sampler_set_layout {
                set_layouts.push(layout);
            }
        }

        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        root.pipeline_layout = unsafe {
            root.ctx.device.create_pipeline_layout(&layout_info, None).map_err(|e| {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create pipeline layout: {:?}", e);
                vk_result_to_error(e, "Failed to create pipeline layout")
            })?
        };

        pipeline_debug!("frame_pipeline::vulkan",
            "Root signature: {} SRV table(s), {} static sampler(s)",
            desc.srv_tables.len(), desc.static_samplers.len());
        Ok(root)
    }

    fn create_sampler_set(&mut self, set_index: u32) -> Result<()> {
        let device = &self.ctx.device;

        for sampler in &self.desc.static_samplers {
            let info = vk::SamplerCreateInfo::default()
                .mag_filter(filter_to_vk(sampler.filter))
                .min_filter(filter_to_vk(sampler.filter))
                .mipmap_mode(mipmap_mode_to_vk(sampler.filter))
                .address_mode_u(address_mode_to_vk(sampler.address_mode))
                .address_mode_v(address_mode_to_vk(sampler.address_mode))
                .address_mode_w(address_mode_to_vk(sampler.address_mode))
                .border_color(border_color_to_vk(sampler.border_color))
                .min_lod(0.0)
                .max_lod(vk::LOD_CLAMP_NONE);
            let handle = unsafe {
                device.create_sampler(&info, None).map_err(|e| {
                    pipeline_error!("frame_pipeline::vulkan", "Failed to create sampler: {:?}", e);
                    vk_result_to_error(e, "Failed to create sampler")
                })?
            };
            self.samplers.push(handle);
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .desc
            .static_samplers
            .iter()
            .zip(self.samplers.iter())
            .map(|(sampler, handle)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(sampler.shader_register)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .stage_flags(shader_stage_to_vk(sampler.visibility))
                    .immutable_samplers(std::slice::from_ref(handle))
            })
            .collect();

        unsafe {
            let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let layout = device.create_descriptor_set_layout(&layout_info, None).map_err(|e| {
                pipeline_err!("frame_pipeline::vulkan", "Failed to create sampler set layout: {:?}", e)
            })?;
            self.sampler_set_layout = Some(layout);

            let pool_sizes = [vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: self.samplers.len() as u32,
            }];
            let pool_info = vk::DescriptorPoolCreateInfo::default()
                .pool_sizes(&pool_sizes)
                .max_sets(1);
            let pool = device.create_descriptor_pool(&pool_info, None).map_err(|e| {
                pipeline_err!("frame_pipeline::vulkan", "Failed to create sampler pool: {:?}", e)
            })?;
            self.sampler_pool = Some(pool);

            let layouts = [layout];
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            let sets = device.allocate_descriptor_sets(&alloc_info).map_err(|e| {
                pipeline_err!("frame_pipeline::vulkan", "Failed to allocate sampler set: {:?}", e)
            })?;
            self.sampler_set = Some((set_index, sets[0]));
        }
        Ok(())
    }
}

impl RootSignatureTrait for RootSignature {
    fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for RootSignature {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            if self.pipeline_layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            if let Some(pool) = self.sampler_pool.take() {
                device.destroy_descriptor_pool(pool, None);
            }
            if let Some(layout) = self.sampler_set_layout.take() {
                device.destroy_descriptor_set_layout(layout, None);
            }
            for sampler in self.samplers.drain(..) {
                device.destroy_sampler(sampler, None);
            }
        }
    }
}

// ============================================================================
// PIPELINE STATE
// ============================================================================

/// Vulkan graphics pipeline implementation
///
/// Built for dynamic rendering: no render pass, the color format is baked in.
/// Viewport, scissor and topology are dynamic.
pub struct PipelineState {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
}

/// Decode a SPIR-V blob into words
pub(crate) fn blob_words(blob: &ShaderBlob) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(&blob.bytecode)).map_err(|e| {
        Error::InvalidResource(format!(
            "{:?} shader '{}' is not valid SPIR-V: {}",
            blob.stage, blob.entry_point, e
        ))
    })
}

fn create_module(device: &ash::Device, blob: &ShaderBlob) -> Result<vk::ShaderModule> {
    let words = blob_words(blob)?;
    let info = vk::ShaderModuleCreateInfo::default().code(&words);
    unsafe {
        device.create_shader_module(&info, None).map_err(|e| {
            pipeline_error!("frame_pipeline::vulkan", "Failed to create shader module: {:?}", e);
            vk_result_to_error(e, "Failed to create shader module")
        })
    }
}

impl PipelineState {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &PipelineStateDesc<'_>) -> Result<Self> {
        let root = desc
            .root_signature
            .as_any()
            .downcast_ref::<RootSignature>()
            .ok_or_else(|| Error::InvalidResource("Root signature is not a Vulkan root signature".to_string()))?;

        let vs_entry = CString::new(desc.vertex_shader.entry_point.as_str())
            .map_err(|e| Error::InvalidResource(format!("Invalid entry point name: {}", e)))?;
        let ps_entry = CString::new(desc.pixel_shader.entry_point.as_str())
            .map_err(|e| Error::InvalidResource(format!("Invalid entry point name: {}", e)))?;

        let device = &ctx.device;
        let vs_module = create_module(device, desc.vertex_shader)?;
        let ps_module = match create_module(device, desc.pixel_shader) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vs_module, None) };
                return Err(e);
            }
        };

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vs_module)
                .name(&vs_entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(ps_module)
                .name(&ps_entry),
        ];

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .input_layout
            .iter()
            .map(|element| vk::VertexInputAttributeDescription {
                location: element.location,
                binding: 0,
                format: vertex_format_to_vk(element.format),
                offset: element.offset,
            })
            .collect();
        let vertex_input = if desc.root_signature.desc().allow_input_layout {
            vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes)
        } else {
            vk::PipelineVertexInputStateCreateInfo::default()
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&blend_attachments);
        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::PRIMITIVE_TOPOLOGY,
        ];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let color_formats = [texture_format_to_vk(desc.render_target_format)];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(root.pipeline_layout)
            .push_next(&mut rendering_info);

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        unsafe {
            device.destroy_shader_module(vs_module, None);
            device.destroy_shader_module(ps_module, None);
        }

        let pipeline = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                pipeline_error!("frame_pipeline::vulkan", "Failed to create graphics pipeline: {:?}", e);
                return Err(vk_result_to_error(e, "Failed to create graphics pipeline"));
            }
        };

        Ok(Self { ctx, pipeline })
    }
}

impl PipelineStateTrait for PipelineState {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for PipelineState {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
