/// Pipeline configuration - scalar options supplied by the host
///
/// Options come from three layers, each overriding the previous one:
/// built-in defaults, an optional TOML file, then command line switches.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::{pipeline_debug, pipeline_info};

/// CPU/GPU synchronization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Single shared counter, the CPU waits after every submission
    StallPerFrame,
    /// One fence value per frame slot, the CPU waits only before reusing a slot
    DoubleBuffered,
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::DoubleBuffered
    }
}

/// Frame pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Application name (window title, Vulkan application info)
    pub app_name: String,
    /// Initial surface width in pixels
    pub width: u32,
    /// Initial surface height in pixels
    pub height: u32,
    /// Use a software (CPU) adapter instead of a hardware one
    pub use_warp_device: bool,
    /// Enable the API debug/validation layer
    pub enable_debug_layer: bool,
    /// Number of back buffers / frame slots (2 or 3)
    pub frame_count: u32,
    /// Synchronization strategy
    pub sync_strategy: SyncStrategy,
    /// Fence wait deadline in milliseconds (None = wait forever)
    pub wait_timeout_ms: Option<u64>,
    /// Render target clear color (RGBA)
    pub clear_color: [f32; 4],
    /// Synchronize presents with the display refresh
    pub vsync: bool,
    /// Directory holding the shader sources handed to the shader compiler
    pub shader_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_name: "Frame Pipeline".to_string(),
            width: 1280,
            height: 720,
            use_warp_device: false,
            enable_debug_layer: cfg!(debug_assertions),
            frame_count: 2,
            sync_strategy: SyncStrategy::DoubleBuffered,
            wait_timeout_ms: Some(5_000),
            clear_color: [0.0, 0.2, 0.4, 1.0],
            vsync: true,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an `InitializationFailed` error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            pipeline_info!(
                "frame_pipeline::config",
                "Config file not found at {:?}, using defaults",
                path
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InitializationFailed(format!("Failed to read {:?}: {}", path, e))
        })?;

        let config: PipelineConfig = toml::from_str(&content).map_err(|e| {
            Error::InitializationFailed(format!("Failed to parse {:?}: {}", path, e))
        })?;

        pipeline_info!("frame_pipeline::config", "Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply command line switches
    ///
    /// Recognized switches:
    /// - `-warp` / `/warp` (any case): software adapter
    /// - `--width N`, `--height N`: initial surface size
    /// - `--debug` / `--no-debug`: debug layer toggle
    /// - `--stall`: stall-per-frame synchronization
    ///
    /// Unknown arguments are ignored.
    pub fn apply_args<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            let lowered = arg.to_ascii_lowercase();

            match lowered.as_str() {
                "-warp" | "/warp" => {
                    self.use_warp_device = true;
                    pipeline_debug!("frame_pipeline::config", "Software adapter requested");
                }
                "--width" => self.width = parse_extent("--width", args.next())?,
                "--height" => self.height = parse_extent("--height", args.next())?,
                "--debug" => self.enable_debug_layer = true,
                "--no-debug" => self.enable_debug_layer = false,
                "--stall" => self.sync_strategy = SyncStrategy::StallPerFrame,
                _ => {}
            }
        }

        Ok(())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InitializationFailed(format!(
                "Surface extent must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }
        if !(2..=3).contains(&self.frame_count) {
            return Err(Error::InitializationFailed(format!(
                "frame_count must be 2 or 3 (got {})",
                self.frame_count
            )));
        }
        Ok(())
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Fence wait deadline
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_extent<S: AsRef<str>>(flag: &str, value: Option<S>) -> Result<u32> {
    let value = value
        .ok_or_else(|| Error::InitializationFailed(format!("{} expects a value", flag)))?;
    value.as_ref().parse::<u32>().map_err(|e| {
        Error::InitializationFailed(format!(
            "{} expects an unsigned integer, got '{}': {}",
            flag,
            value.as_ref(),
            e
        ))
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
