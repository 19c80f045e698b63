/// Shader compiler interface
///
/// Compilation is external to the pipeline: a compiler turns a source path,
/// an entry point and a target profile into an opaque bytecode blob.

use std::path::PathBuf;

use bitflags::bitflags;

use crate::error::Result;

/// Pipeline stage a shader runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    /// Conventional entry point name
    pub fn default_entry_point(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VSMain",
            ShaderStage::Pixel => "PSMain",
        }
    }

    /// Conventional target profile
    pub fn default_profile(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_5_1",
            ShaderStage::Pixel => "ps_5_1",
        }
    }
}

bitflags! {
    /// Shader compilation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderCompileFlags: u32 {
        /// Keep debug information in the blob
        const DEBUG = 1 << 0;
        /// Disable optimizations
        const SKIP_OPTIMIZATION = 1 << 1;
    }
}

/// A request to compile one shader stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderCompileRequest {
    pub source_path: PathBuf,
    pub entry_point: String,
    /// Target profile string (e.g., "vs_5_1")
    pub target_profile: String,
    pub flags: ShaderCompileFlags,
}

impl ShaderCompileRequest {
    /// Request for `stage` with the conventional entry point and profile
    ///
    /// Debug builds get `DEBUG | SKIP_OPTIMIZATION`.
    pub fn for_stage(source_path: impl Into<PathBuf>, stage: ShaderStage, debug: bool) -> Self {
        let flags = if debug {
            ShaderCompileFlags::DEBUG | ShaderCompileFlags::SKIP_OPTIMIZATION
        } else {
            ShaderCompileFlags::empty()
        };
        Self {
            source_path: source_path.into(),
            entry_point: stage.default_entry_point().to_string(),
            target_profile: stage.default_profile().to_string(),
            flags,
        }
    }

    /// Stage implied by the target profile prefix
    pub fn stage(&self) -> Option<ShaderStage> {
        if self.target_profile.starts_with("vs_") {
            Some(ShaderStage::Vertex)
        } else if self.target_profile.starts_with("ps_") {
            Some(ShaderStage::Pixel)
        } else {
            None
        }
    }
}

/// Compiled shader bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlob {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub bytecode: Vec<u8>,
}

impl ShaderBlob {
    pub fn len(&self) -> usize {
        self.bytecode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }
}

/// External shader compiler
pub trait ShaderCompiler: Send + Sync {
    /// Compile one stage
    fn compile(&self, request: &ShaderCompileRequest) -> Result<ShaderBlob>;
}
