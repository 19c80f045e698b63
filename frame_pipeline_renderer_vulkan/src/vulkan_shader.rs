/// SpirvShaderCompiler - ShaderCompiler backed by precompiled SPIR-V
///
/// HLSL sources are compiled ahead of time (the demo's build script runs
/// glslc). For a request on `shaders/textured.hlsl` the compiler loads
/// `textured.vert.spv` or `textured.frag.spv`, checks the module and the
/// requested entry point with spirq, and returns the bytes as the blob.

use std::path::{Path, PathBuf};

use frame_pipeline::gpu::{Error, Result};
use frame_pipeline::gpu::device::{
    ShaderBlob, ShaderCompileFlags, ShaderCompileRequest, ShaderCompiler, ShaderStage,
};
use frame_pipeline::{pipeline_debug, pipeline_error};

/// SPIR-V magic number, first word of every module
pub(crate) const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader compiler that loads SPIR-V produced at build time
#[derive(Debug, Clone, Default)]
pub struct SpirvShaderCompiler {
    /// Directory holding the .spv files; None looks next to the source
    spirv_dir: Option<PathBuf>,
}

impl SpirvShaderCompiler {
    /// Look for SPIR-V next to each source file
    pub fn new() -> Self {
        Self { spirv_dir: None }
    }

    /// Look for SPIR-V in `dir`, whatever the source directory
    pub fn with_spirv_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            spirv_dir: Some(dir.into()),
        }
    }
}

/// File extension suffix glslc-style tools use per stage
pub(crate) fn stage_suffix(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vert",
        ShaderStage::Pixel => "frag",
    }
}

/// Path of the SPIR-V module compiled from `source` for `stage`
pub(crate) fn spv_path(source: &Path, stage: ShaderStage, spirv_dir: Option<&Path>) -> Result<PathBuf> {
    let stem = source.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::InvalidResource(format!("Shader source {:?} has no file name", source))
    })?;
    let file_name = format!("{}.{}.spv", stem, stage_suffix(stage));
    let dir = match spirv_dir {
        Some(dir) => dir,
        None => source.parent().unwrap_or_else(|| Path::new("")),
    };
    Ok(dir.join(file_name))
}

/// Reinterpret SPIR-V bytes as little-endian words, checking size and magic
pub(crate) fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(Error::InvalidResource(format!(
            "SPIR-V size {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return Err(Error::InvalidResource(format!(
            "Bad SPIR-V magic number {:#010x}",
            words[0]
        )));
    }
    Ok(words)
}

/// Names of the entry points declared by a module
fn entry_point_names(words: &[u32]) -> Result<Vec<String>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| {
            pipeline_error!("frame_pipeline::vulkan", "SPIR-V reflection failed: {:?}", e);
            Error::InvalidResource(format!("SPIR-V reflection failed: {:?}", e))
        })?;
    Ok(entry_points.into_iter().map(|entry| entry.name).collect())
}

impl ShaderCompiler for SpirvShaderCompiler {
    fn compile(&self, request: &ShaderCompileRequest) -> Result<ShaderBlob> {
        let stage = request.stage().ok_or_else(|| {
            Error::InvalidResource(format!("Unknown target profile '{}'", request.target_profile))
        })?;
        let path = spv_path(&request.source_path, stage, self.spirv_dir.as_deref())?;

        let bytes = std::fs::read(&path).map_err(|e| {
            pipeline_error!("frame_pipeline::vulkan", "Failed to read SPIR-V {:?}: {}", path, e);
            Error::InvalidResource(format!("Failed to read SPIR-V {:?}: {}", path, e))
        })?;
        let words = bytes_to_words(&bytes)?;

        let names = entry_point_names(&words)?;
        if !names.iter().any(|name| name == &request.entry_point) {
            pipeline_error!("frame_pipeline::vulkan",
                "{:?} has no entry point '{}' (found {:?})", path, request.entry_point, names);
            return Err(Error::InvalidResource(format!(
                "{:?} has no entry point '{}'",
                path, request.entry_point
            )));
        }

        if request.flags.contains(ShaderCompileFlags::DEBUG) {
            pipeline_debug!("frame_pipeline::vulkan",
                "Debug shader requested, using {:?} as built", path);
        }
        pipeline_debug!("frame_pipeline::vulkan",
            "Loaded {:?} shader {:?} ({} bytes)", stage, path, bytes.len());

        Ok(ShaderBlob {
            stage,
            entry_point: request.entry_point.clone(),
            bytecode: bytes,
        })
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
