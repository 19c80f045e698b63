/// Resource uploader - moves CPU-authored content into GPU memory
///
/// Uploads go through a transient staging buffer in the upload heap:
/// write on the CPU, record a copy into the default-heap destination, then
/// a barrier out of the copy-destination state. The staging buffer is kept
/// alive until the fence value of the submission carrying the copy has
/// completed:
///
/// 1. `upload_*` records the copy and parks the staging buffer as unretired
/// 2. `retire_staging(v)` tags every parked buffer with fence value `v`
/// 3. `collect(completed)` drops buffers whose value is `<= completed`
///
/// Small buffers may skip staging entirely via `create_mapped_buffer`.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, GraphicsDevice, HeapType, ResourceBarrier, ResourceState,
    Texture, TextureCopyLayout, TextureDesc,
};
use crate::sync::DeferredReleaseQueue;
use crate::{pipeline_debug, pipeline_trace, pipeline_warn};

/// Uploader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploaderStats {
    pub bytes_uploaded: u64,
    pub staging_buffers_created: u64,
    pub staging_buffers_released: u64,
    pub mapped_buffers_created: u64,
}

pub struct ResourceUploader {
    device: Arc<dyn GraphicsDevice>,
    /// Staging buffers recorded into the open list, no fence value yet
    unretired: Vec<Arc<dyn Buffer>>,
    releases: DeferredReleaseQueue<Arc<dyn Buffer>>,
    stats: UploaderStats,
}

impl ResourceUploader {
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            unretired: Vec::new(),
            releases: DeferredReleaseQueue::new(),
            stats: UploaderStats::default(),
        }
    }

    /// Upload `bytes` into a new default-heap buffer
    ///
    /// The buffer ends in `final_state` once the recorded copy executes.
    pub fn upload_buffer(
        &mut self,
        list: &mut dyn CommandList,
        name: &str,
        bytes: &[u8],
        final_state: ResourceState,
    ) -> Result<Arc<dyn Buffer>> {
        if bytes.is_empty() {
            return Err(Error::InvalidResource(format!("'{}' has no content to upload", name)));
        }
        let size = bytes.len() as u64;

        let destination = self.device.create_buffer(&BufferDesc {
            name: name.to_string(),
            size,
            heap: HeapType::Default,
        })?;
        let staging = self.create_staging(name, size)?;
        staging.write(0, bytes)?;

        list.copy_buffer_region(destination.as_ref(), 0, staging.as_ref(), 0, size)?;
        list.resource_barrier(&ResourceBarrier::buffer(
            destination.as_ref(),
            ResourceState::CopyDest,
            final_state,
        ))?;

        self.unretired.push(staging);
        self.stats.bytes_uploaded += size;
        pipeline_debug!("frame_pipeline::uploader", "Recorded upload of '{}' ({} bytes)", name, size);
        Ok(destination)
    }

    /// Upload tightly packed `pixels` into a new sampled texture
    ///
    /// Staging rows are padded to the device's copy pitch alignment. The
    /// texture ends in the pixel-shader-resource state.
    pub fn upload_texture(
        &mut self,
        list: &mut dyn CommandList,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> Result<Arc<dyn Texture>> {
        if pixels.len() as u64 != desc.byte_size() {
            return Err(Error::InvalidResource(format!(
                "'{}' expects {} bytes of pixels, got {}",
                desc.name,
                desc.byte_size(),
                pixels.len()
            )));
        }

        let layout = TextureCopyLayout::padded(
            desc.width,
            desc.height,
            desc.format.bytes_per_pixel(),
            self.device.texture_pitch_alignment(),
        );

        let texture = self.device.create_texture(desc)?;
        let staging = self.create_staging(&desc.name, layout.total_size())?;
        write_padded_rows(staging.as_ref(), &layout, pixels)?;

        list.copy_buffer_to_texture(texture.as_ref(), staging.as_ref(), &layout)?;
        list.resource_barrier(&ResourceBarrier::texture(
            texture.as_ref(),
            ResourceState::CopyDest,
            ResourceState::PixelShaderResource,
        ))?;

        self.unretired.push(staging);
        self.stats.bytes_uploaded += pixels.len() as u64;
        pipeline_debug!(
            "frame_pipeline::uploader",
            "Recorded upload of '{}' ({}x{}, row pitch {})",
            desc.name,
            desc.width,
            desc.height,
            layout.row_pitch
        );
        Ok(texture)
    }

    /// Create an upload-heap buffer and write `bytes` through its mapping
    ///
    /// No copy and no staging: the GPU reads the upload heap directly
    /// (generic-read state). Meant for a handful of vertices.
    pub fn create_mapped_buffer(&mut self, name: &str, bytes: &[u8]) -> Result<Arc<dyn Buffer>> {
        if bytes.is_empty() {
            return Err(Error::InvalidResource(format!("'{}' has no content to upload", name)));
        }
        let buffer = self.device.create_buffer(&BufferDesc {
            name: name.to_string(),
            size: bytes.len() as u64,
            heap: HeapType::Upload,
        })?;
        buffer.write(0, bytes)?;
        self.stats.mapped_buffers_created += 1;
        self.stats.bytes_uploaded += bytes.len() as u64;
        Ok(buffer)
    }

    /// Record a copy of `source` into a new readback buffer
    ///
    /// `state` is the source's current state; it is restored after the copy.
    /// The returned buffer is readable once the submission completes.
    pub fn read_back_buffer(
        &mut self,
        list: &mut dyn CommandList,
        source: &dyn Buffer,
        state: ResourceState,
    ) -> Result<Arc<dyn Buffer>> {
        let readback = self.device.create_buffer(&BufferDesc {
            name: "readback".to_string(),
            size: source.size(),
            heap: HeapType::Readback,
        })?;
        list.resource_barrier(&ResourceBarrier::buffer(source, state, ResourceState::CopySource))?;
        list.copy_buffer_region(readback.as_ref(), 0, source, 0, source.size())?;
        list.resource_barrier(&ResourceBarrier::buffer(source, ResourceState::CopySource, state))?;
        Ok(readback)
    }

    /// Record a copy of `source` into a new pitched readback buffer
    pub fn read_back_texture(
        &mut self,
        list: &mut dyn CommandList,
        source: &dyn Texture,
        state: ResourceState,
    ) -> Result<(Arc<dyn Buffer>, TextureCopyLayout)> {
        let desc = source.desc();
        let layout = TextureCopyLayout::padded(
            desc.width,
            desc.height,
            desc.format.bytes_per_pixel(),
            self.device.texture_pitch_alignment(),
        );
        let readback = self.device.create_buffer(&BufferDesc {
            name: format!("{}_readback", desc.name),
            size: layout.total_size(),
            heap: HeapType::Readback,
        })?;
        list.resource_barrier(&ResourceBarrier::texture(source, state, ResourceState::CopySource))?;
        list.copy_texture_to_buffer(readback.as_ref(), source, &layout)?;
        list.resource_barrier(&ResourceBarrier::texture(source, ResourceState::CopySource, state))?;
        Ok((readback, layout))
    }

    /// Tag every staging buffer recorded since the last call with `fence_value`
    ///
    /// Call right after the signal that follows the submission.
    pub fn retire_staging(&mut self, fence_value: u64) -> usize {
        let count = self.unretired.len();
        for staging in self.unretired.drain(..) {
            self.releases.push(fence_value, staging);
        }
        if count > 0 {
            pipeline_trace!(
                "frame_pipeline::uploader",
                "{} staging buffer(s) released at fence value {}",
                count,
                fence_value
            );
        }
        count
    }

    /// Drop every staging buffer whose fence value has completed
    pub fn collect(&mut self, completed: u64) -> usize {
        let released = self.releases.collect(completed).len();
        if released > 0 {
            self.stats.staging_buffers_released += released as u64;
            pipeline_debug!(
                "frame_pipeline::uploader",
                "Released {} staging buffer(s) (completed {})",
                released,
                completed
            );
        }
        released
    }

    /// Staging buffers still alive (unretired + waiting for a fence)
    pub fn pending_staging(&self) -> usize {
        self.unretired.len() + self.releases.len()
    }

    pub fn stats(&self) -> UploaderStats {
        self.stats
    }

    fn create_staging(&mut self, name: &str, size: u64) -> Result<Arc<dyn Buffer>> {
        let staging = self.device.create_buffer(&BufferDesc {
            name: format!("{}_staging", name),
            size,
            heap: HeapType::Upload,
        })?;
        self.stats.staging_buffers_created += 1;
        Ok(staging)
    }
}

impl Drop for ResourceUploader {
    fn drop(&mut self) {
        if !self.unretired.is_empty() {
            pipeline_warn!(
                "frame_pipeline::uploader",
                "{} staging buffer(s) dropped before their copy was submitted",
                self.unretired.len()
            );
        }
    }
}

/// Read a pitched footprint back into a tightly packed image
pub fn read_unpadded_rows(buffer: &dyn Buffer, layout: &TextureCopyLayout) -> Result<Vec<u8>> {
    let tight = layout.tight_row_size() as usize;
    let mut pixels = vec![0u8; tight * layout.height as usize];
    for (row, chunk) in pixels.chunks_mut(tight.max(1)).enumerate() {
        buffer.read(layout.offset + row as u64 * layout.row_pitch as u64, chunk)?;
    }
    Ok(pixels)
}

fn write_padded_rows(buffer: &dyn Buffer, layout: &TextureCopyLayout, pixels: &[u8]) -> Result<()> {
    let tight = layout.tight_row_size() as usize;
    for (row, chunk) in pixels.chunks(tight.max(1)).enumerate() {
        buffer.write(layout.offset + row as u64 * layout.row_pitch as u64, chunk)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "resource_uploader_tests.rs"]
mod tests;
