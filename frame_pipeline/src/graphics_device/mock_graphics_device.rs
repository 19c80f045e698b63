/// Mock graphics device for unit tests (no GPU required)
///
/// Simulates a single-queue GPU timeline. Executed command lists and fence
/// signals are queued in submission order and only run when the CPU waits
/// (or immediately in auto-complete mode), so a test can observe every
/// state in which the GPU lags behind the CPU. Copies and clears really
/// move bytes between simulated resources.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawWindowHandle,
    WebWindowHandle, WindowHandle,
};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphics_device::{
    AdapterInfo, BarrierTarget, Buffer, BufferDesc, CommandAllocator, CommandList,
    CpuDescriptorHandle, DescriptorHeap, DescriptorHeapKind, Fence, GpuDescriptorHandle,
    GraphicsDevice, HeapType, PipelineState, PipelineStateDesc, PresentationSurface,
    PrimitiveTopology, Rect, ResourceBarrier, ResourceState, RootSignature, RootSignatureDesc,
    ShaderBlob, ShaderCompileRequest, ShaderCompiler, SurfaceSize, Swapchain, Texture,
    TextureCopyLayout, TextureDesc, TextureFormat, TextureUsage, VertexBufferView, Viewport,
    WaitStatus,
};

pub const MOCK_RTV_STRIDE: u64 = 32;
pub const MOCK_SRV_STRIDE: u64 = 64;
pub const MOCK_PITCH_ALIGNMENT: u32 = 256;

// ============================================================================
// Recorded commands
// ============================================================================

/// One recorded command, with resources referenced by mock id
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    SetPipelineState,
    SetRootSignature,
    SetDescriptorHeaps(usize),
    SetRootTable { parameter_index: u32, base: u64 },
    SetViewport(Viewport),
    SetScissor(Rect),
    Barrier { resource: u64, before: ResourceState, after: ResourceState },
    SetRenderTarget(u64),
    Clear { rtv: u64, color: [f32; 4] },
    SetTopology(PrimitiveTopology),
    SetVertexBuffer { buffer: u64, size: u32, stride: u32 },
    Draw { vertex_count: u32, instance_count: u32 },
    CopyBuffer { dst: u64, dst_offset: u64, src: u64, src_offset: u64, size: u64 },
    CopyBufferToTexture { dst: u64, src: u64, layout: TextureCopyLayout },
    CopyTextureToBuffer { dst: u64, src: u64, layout: TextureCopyLayout },
}

impl MockCommand {
    /// Short name, used to assert recording order
    pub fn name(&self) -> &'static str {
        match self {
            MockCommand::SetPipelineState => "pipeline",
            MockCommand::SetRootSignature => "root_signature",
            MockCommand::SetDescriptorHeaps(_) => "heaps",
            MockCommand::SetRootTable { .. } => "root_table",
            MockCommand::SetViewport(_) => "viewport",
            MockCommand::SetScissor(_) => "scissor",
            MockCommand::Barrier { .. } => "barrier",
            MockCommand::SetRenderTarget(_) => "render_target",
            MockCommand::Clear { .. } => "clear",
            MockCommand::SetTopology(_) => "topology",
            MockCommand::SetVertexBuffer { .. } => "vertex_buffer",
            MockCommand::Draw { .. } => "draw",
            MockCommand::CopyBuffer { .. } => "copy_buffer",
            MockCommand::CopyBufferToTexture { .. } => "copy_buffer_to_texture",
            MockCommand::CopyTextureToBuffer { .. } => "copy_texture_to_buffer",
        }
    }
}

// ============================================================================
// Shared GPU state
// ============================================================================

enum QueueItem {
    Execute { allocator: u64, commands: Vec<MockCommand> },
    Signal { fence: u64, value: u64 },
}

/// Counters exposed to tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockGpuStats {
    pub presents: u64,
    pub submitted_command_lists: u64,
    pub executed_command_lists: u64,
    pub signals: u64,
    /// Fence waits that found the fence behind its target
    pub blocking_waits: u64,
    pub idle_waits: u64,
    pub allocated_bytes: u64,
}

pub struct MockGpuState {
    next_id: u64,
    memory: FxHashMap<u64, Vec<u8>>,
    fences: FxHashMap<u64, u64>,
    views: FxHashMap<u64, u64>,
    queue: VecDeque<QueueItem>,
    executed: Vec<Vec<MockCommand>>,
    auto_complete: bool,
    stalled: bool,
    /// Presents still to fail with `SurfaceOutOfDate`
    out_of_date_presents: u32,
    memory_budget: Option<u64>,
    stats: MockGpuStats,
}

impl MockGpuState {
    fn new() -> Self {
        Self {
            next_id: 1,
            memory: FxHashMap::default(),
            fences: FxHashMap::default(),
            views: FxHashMap::default(),
            queue: VecDeque::new(),
            executed: Vec::new(),
            auto_complete: false,
            stalled: false,
            out_of_date_presents: 0,
            memory_budget: None,
            stats: MockGpuStats::default(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn allocate(&mut self, size: u64, budgeted: bool) -> Result<u64> {
        if budgeted {
            if let Some(budget) = self.memory_budget {
                if self.stats.allocated_bytes + size > budget {
                    return Err(Error::OutOfMemory);
                }
            }
            self.stats.allocated_bytes += size;
        }
        let id = self.next_id();
        self.memory.insert(id, vec![0u8; size as usize]);
        Ok(id)
    }

    fn free(&mut self, id: u64, budgeted: bool) {
        if let Some(bytes) = self.memory.remove(&id) {
            if budgeted {
                self.stats.allocated_bytes -= bytes.len() as u64;
            }
        }
    }

    fn fence_value(&self, fence: u64) -> u64 {
        self.fences.get(&fence).copied().unwrap_or(0)
    }

    /// Run the oldest queued item, false if the queue is empty
    fn run_next(&mut self) -> bool {
        match self.queue.pop_front() {
            Some(QueueItem::Execute { commands, .. }) => {
                for command in &commands {
                    self.apply(command);
                }
                self.stats.executed_command_lists += 1;
                self.executed.push(commands);
                true
            }
            Some(QueueItem::Signal { fence, value }) => {
                let current = self.fences.entry(fence).or_insert(0);
                *current = (*current).max(value);
                true
            }
            None => false,
        }
    }

    fn run_all(&mut self) {
        while self.run_next() {}
    }

    fn apply(&mut self, command: &MockCommand) {
        match *command {
            MockCommand::Clear { rtv, color } => {
                let Some(&texture) = self.views.get(&rtv) else { return };
                let texel: Vec<u8> = color.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8).collect();
                if let Some(bytes) = self.memory.get_mut(&texture) {
                    for chunk in bytes.chunks_mut(4) {
                        chunk.copy_from_slice(&texel[..chunk.len()]);
                    }
                }
            }
            MockCommand::CopyBuffer { dst, dst_offset, src, src_offset, size } => {
                let data = self.read(src, src_offset, size as usize);
                self.write(dst, dst_offset, &data);
            }
            MockCommand::CopyBufferToTexture { dst, src, layout } => {
                let tight = layout.tight_row_size() as usize;
                for row in 0..layout.height as u64 {
                    let data = self.read(src, layout.offset + row * layout.row_pitch as u64, tight);
                    self.write(dst, row * tight as u64, &data);
                }
            }
            MockCommand::CopyTextureToBuffer { dst, src, layout } => {
                let tight = layout.tight_row_size() as usize;
                for row in 0..layout.height as u64 {
                    let data = self.read(src, row * tight as u64, tight);
                    self.write(dst, layout.offset + row * layout.row_pitch as u64, &data);
                }
            }
            _ => {}
        }
    }

    fn read(&self, id: u64, offset: u64, len: usize) -> Vec<u8> {
        let offset = offset as usize;
        self.memory
            .get(&id)
            .and_then(|bytes| bytes.get(offset..offset + len))
            .map(|slice| slice.to_vec())
            .unwrap_or_else(|| vec![0u8; len])
    }

    fn write(&mut self, id: u64, offset: u64, data: &[u8]) {
        let offset = offset as usize;
        if let Some(bytes) = self.memory.get_mut(&id) {
            if let Some(dst) = bytes.get_mut(offset..offset + data.len()) {
                dst.copy_from_slice(data);
            }
        }
    }

    fn allocator_in_flight(&self, allocator: u64) -> bool {
        self.queue.iter().any(|item| matches!(item, QueueItem::Execute { allocator: a, .. } if *a == allocator))
    }
}

type SharedState = Arc<Mutex<MockGpuState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockGpuState> {
    state.lock().unwrap()
}

// ============================================================================
// Mock Fence
// ============================================================================

pub struct MockFence {
    pub id: u64,
    state: SharedState,
}

impl Fence for MockFence {
    fn completed_value(&self) -> Result<u64> {
        Ok(lock(&self.state).fence_value(self.id))
    }

    fn wait_for_value(&self, value: u64, _timeout: Option<Duration>) -> Result<WaitStatus> {
        let mut state = lock(&self.state);
        if state.fence_value(self.id) >= value {
            return Ok(WaitStatus::Reached);
        }

        state.stats.blocking_waits += 1;
        if !state.stalled {
            while state.fence_value(self.id) < value && state.run_next() {}
        }

        // A value never signaled would block forever on real hardware
        if state.fence_value(self.id) >= value {
            Ok(WaitStatus::Reached)
        } else {
            Ok(WaitStatus::TimedOut)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Buffer / Texture
// ============================================================================

pub struct MockBuffer {
    pub id: u64,
    pub desc: BufferDesc,
    state: SharedState,
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.desc.size
    }

    fn heap(&self) -> HeapType {
        self.desc.heap
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.desc.heap != HeapType::Upload {
            return Err(Error::InvalidResource(format!("'{}' is not CPU writable", self.desc.name)));
        }
        if offset + data.len() as u64 > self.desc.size {
            return Err(Error::InvalidResource(format!("write past the end of '{}'", self.desc.name)));
        }
        lock(&self.state).write(self.id, offset, data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        if !self.desc.heap.is_cpu_visible() {
            return Err(Error::InvalidResource(format!("'{}' is not CPU readable", self.desc.name)));
        }
        if offset + out.len() as u64 > self.desc.size {
            return Err(Error::InvalidResource(format!("read past the end of '{}'", self.desc.name)));
        }
        let data = lock(&self.state).read(self.id, offset, out.len());
        out.copy_from_slice(&data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.free(self.id, true);
        }
    }
}

pub struct MockTexture {
    pub id: u64,
    pub desc: TextureDesc,
    budgeted: bool,
    state: SharedState,
}

impl Texture for MockTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockTexture {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.free(self.id, self.budgeted);
        }
    }
}

fn buffer_id(buffer: &dyn Buffer) -> Result<u64> {
    buffer
        .as_any()
        .downcast_ref::<MockBuffer>()
        .map(|b| b.id)
        .ok_or_else(|| Error::InvalidResource("not a mock buffer".to_string()))
}

fn texture_id(texture: &dyn Texture) -> Result<u64> {
    texture
        .as_any()
        .downcast_ref::<MockTexture>()
        .map(|t| t.id)
        .ok_or_else(|| Error::InvalidResource("not a mock texture".to_string()))
}

// ============================================================================
// Mock Descriptor Heap / Root Signature / Pipeline State
// ============================================================================

pub struct MockDescriptorHeap {
    pub id: u64,
    pub kind: DescriptorHeapKind,
    pub capacity: u32,
}

impl DescriptorHeap for MockDescriptorHeap {
    fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.id << 32)
    }

    fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        match self.kind {
            DescriptorHeapKind::ShaderResource => Some(GpuDescriptorHandle(self.id << 32)),
            DescriptorHeapKind::RenderTarget => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockRootSignature {
    pub desc: RootSignatureDesc,
}

impl RootSignature for MockRootSignature {
    fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockPipelineState {
    pub vertex_entry: String,
    pub pixel_entry: String,
    pub input_element_count: usize,
    pub vertex_stride: u32,
}

impl PipelineState for MockPipelineState {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Command Allocator / Command List
// ============================================================================

pub struct MockCommandAllocator {
    pub id: u64,
    pub reset_count: u32,
    state: SharedState,
}

impl CommandAllocator for MockCommandAllocator {
    fn reset(&mut self) -> Result<()> {
        if lock(&self.state).allocator_in_flight(self.id) {
            return Err(Error::SynchronizationMisuse(format!(
                "command allocator {} reset while the GPU still executes its commands",
                self.id
            )));
        }
        self.reset_count += 1;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockCommandList {
    pub allocator: u64,
    pub commands: Vec<MockCommand>,
    pub closed: bool,
}

impl MockCommandList {
    fn record(&mut self, command: MockCommand) -> Result<()> {
        if self.closed {
            return Err(Error::BackendError(format!(
                "'{}' recorded into a closed command list",
                command.name()
            )));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Names of the recorded commands, in order
    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands.iter().map(|c| c.name()).collect()
    }
}

impl CommandList for MockCommandList {
    fn reset(
        &mut self,
        allocator: &dyn CommandAllocator,
        initial_state: Option<&dyn PipelineState>,
    ) -> Result<()> {
        if !self.closed {
            return Err(Error::BackendError("command list reset while still recording".to_string()));
        }
        self.allocator = allocator
            .as_any()
            .downcast_ref::<MockCommandAllocator>()
            .map(|a| a.id)
            .ok_or_else(|| Error::InvalidResource("not a mock allocator".to_string()))?;
        self.commands.clear();
        self.closed = false;
        if initial_state.is_some() {
            self.commands.push(MockCommand::SetPipelineState);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::BackendError("command list closed twice".to_string()));
        }
        self.closed = true;
        Ok(())
    }

    fn set_pipeline_state(&mut self, _pipeline_state: &dyn PipelineState) -> Result<()> {
        self.record(MockCommand::SetPipelineState)
    }

    fn set_graphics_root_signature(&mut self, _root_signature: &dyn RootSignature) -> Result<()> {
        self.record(MockCommand::SetRootSignature)
    }

    fn set_descriptor_heaps(&mut self, heaps: &[&dyn DescriptorHeap]) -> Result<()> {
        self.record(MockCommand::SetDescriptorHeaps(heaps.len()))
    }

    fn set_graphics_root_descriptor_table(&mut self, parameter_index: u32, base: GpuDescriptorHandle) -> Result<()> {
        self.record(MockCommand::SetRootTable { parameter_index, base: base.0 })
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.record(MockCommand::SetViewport(viewport))
    }

    fn set_scissor(&mut self, rect: Rect) -> Result<()> {
        self.record(MockCommand::SetScissor(rect))
    }

    fn resource_barrier(&mut self, barrier: &ResourceBarrier<'_>) -> Result<()> {
        let resource = match barrier.target {
            BarrierTarget::Buffer(buffer) => buffer_id(buffer)?,
            BarrierTarget::Texture(texture) => texture_id(texture)?,
        };
        self.record(MockCommand::Barrier { resource, before: barrier.before, after: barrier.after })
    }

    fn set_render_target(&mut self, rtv: CpuDescriptorHandle) -> Result<()> {
        self.record(MockCommand::SetRenderTarget(rtv.0))
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) -> Result<()> {
        self.record(MockCommand::Clear { rtv: rtv.0, color })
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()> {
        self.record(MockCommand::SetTopology(topology))
    }

    fn set_vertex_buffer(&mut self, view: &VertexBufferView<'_>) -> Result<()> {
        let buffer = buffer_id(view.buffer)?;
        self.record(MockCommand::SetVertexBuffer {
            buffer,
            size: view.size_in_bytes,
            stride: view.stride_in_bytes,
        })
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) -> Result<()> {
        self.record(MockCommand::Draw { vertex_count, instance_count })
    }

    fn copy_buffer_region(&mut self, dst: &dyn Buffer, dst_offset: u64, src: &dyn Buffer, src_offset: u64, size: u64) -> Result<()> {
        if dst_offset + size > dst.size() || src_offset + size > src.size() {
            return Err(Error::InvalidResource("buffer copy out of bounds".to_string()));
        }
        let (dst, src) = (buffer_id(dst)?, buffer_id(src)?);
        self.record(MockCommand::CopyBuffer { dst, dst_offset, src, src_offset, size })
    }

    fn copy_buffer_to_texture(&mut self, dst: &dyn Texture, src: &dyn Buffer, layout: &TextureCopyLayout) -> Result<()> {
        if layout.total_size() > src.size() {
            return Err(Error::InvalidResource("texture footprint exceeds the source buffer".to_string()));
        }
        let (dst, src) = (texture_id(dst)?, buffer_id(src)?);
        self.record(MockCommand::CopyBufferToTexture { dst, src, layout: *layout })
    }

    fn copy_texture_to_buffer(&mut self, dst: &dyn Buffer, src: &dyn Texture, layout: &TextureCopyLayout) -> Result<()> {
        if layout.total_size() > dst.size() {
            return Err(Error::InvalidResource("texture footprint exceeds the destination buffer".to_string()));
        }
        let (dst, src) = (buffer_id(dst)?, texture_id(src)?);
        self.record(MockCommand::CopyTextureToBuffer { dst, src, layout: *layout })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    state: SharedState,
    buffers: Vec<Arc<MockTexture>>,
    current: u32,
    extent: SurfaceSize,
    pub resize_count: u32,
}

impl MockSwapchain {
    fn create_buffers(state: &SharedState, count: u32, extent: SurfaceSize) -> Result<Vec<Arc<MockTexture>>> {
        let mut buffers = Vec::with_capacity(count as usize);
        for index in 0..count {
            let desc = TextureDesc {
                name: format!("back_buffer_{}", index),
                width: extent.width,
                height: extent.height,
                format: TextureFormat::R8G8B8A8_UNORM,
                usage: TextureUsage::RenderTarget,
            };
            let id = lock(state).allocate(desc.byte_size(), false)?;
            buffers.push(Arc::new(MockTexture { id, desc, budgeted: false, state: state.clone() }));
        }
        Ok(buffers)
    }
}

impl Swapchain for MockSwapchain {
    fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn back_buffer(&self, index: u32) -> Result<Arc<dyn Texture>> {
        self.buffers
            .get(index as usize)
            .map(|b| b.clone() as Arc<dyn Texture>)
            .ok_or_else(|| Error::InvalidResource(format!("no back buffer {}", index)))
    }

    fn present(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.out_of_date_presents > 0 {
            state.out_of_date_presents -= 1;
            return Err(Error::SurfaceOutOfDate("mock surface changed".to_string()));
        }
        state.stats.presents += 1;
        drop(state);
        self.current = (self.current + 1) % self.buffer_count();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.buffers.iter().any(|b| Arc::strong_count(b) > 1) {
            return Err(Error::InvalidResource(
                "back buffers still referenced during resize".to_string(),
            ));
        }
        if !lock(&self.state).queue.is_empty() {
            return Err(Error::SynchronizationMisuse(
                "swap chain resized with GPU work in flight".to_string(),
            ));
        }
        let count = self.buffer_count();
        self.buffers.clear();
        self.extent = SurfaceSize::new(width, height);
        self.buffers = Self::create_buffers(&self.state, count, self.extent)?;
        self.current = 0;
        self.resize_count += 1;
        Ok(())
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::R8G8B8A8_UNORM
    }

    fn extent(&self) -> SurfaceSize {
        self.extent
    }
}

// ============================================================================
// Mock Graphics Device
// ============================================================================

pub struct MockGraphicsDevice {
    state: SharedState,
    adapter: AdapterInfo,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockGpuState::new())),
            adapter: AdapterInfo {
                name: "Mock Adapter".to_string(),
                is_software: false,
                vendor_id: 0,
                device_id: 0,
            },
        }
    }

    /// Budget for buffers and textures (back buffers are not counted)
    pub fn with_memory_budget(self, bytes: u64) -> Self {
        lock(&self.state).memory_budget = Some(bytes);
        self
    }

    pub fn software(mut self) -> Self {
        self.adapter.name = "Mock Software Adapter".to_string();
        self.adapter.is_software = true;
        self
    }

    /// Run queued work as soon as it is submitted
    pub fn set_auto_complete(&self, enabled: bool) {
        let mut state = lock(&self.state);
        state.auto_complete = enabled;
        if enabled {
            state.run_all();
        }
    }

    /// Simulate a hung GPU: queued work never runs
    pub fn set_stalled(&self, stalled: bool) {
        lock(&self.state).stalled = stalled;
    }

    /// Fail the next `count` presents as if the window changed under the swap chain
    pub fn fail_next_presents(&self, count: u32) {
        lock(&self.state).out_of_date_presents = count;
    }

    pub fn stats(&self) -> MockGpuStats {
        lock(&self.state).stats
    }

    /// Queued items (command lists and signals) not yet run
    pub fn pending_work(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Run every queued item
    pub fn flush(&self) {
        lock(&self.state).run_all();
    }

    /// Command streams of every executed command list, in execution order
    pub fn executed_lists(&self) -> Vec<Vec<MockCommand>> {
        lock(&self.state).executed.clone()
    }

    /// Number of live buffers and textures, back buffers included
    pub fn live_resources(&self) -> usize {
        lock(&self.state).memory.len()
    }

    /// Current contents of a mock texture (tightly packed)
    pub fn texture_contents(&self, texture: &dyn Texture) -> Vec<u8> {
        let state = lock(&self.state);
        let id = texture_id(texture).unwrap();
        state.memory.get(&id).cloned().unwrap_or_default()
    }

    /// Current contents of a mock buffer, whatever its heap
    pub fn buffer_contents(&self, buffer: &dyn Buffer) -> Vec<u8> {
        let state = lock(&self.state);
        let id = buffer_id(buffer).unwrap();
        state.memory.get(&id).cloned().unwrap_or_default()
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn adapter_info(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>> {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.fences.insert(id, initial_value);
        Ok(Arc::new(MockFence { id, state: self.state.clone() }))
    }

    fn create_command_allocator(&self) -> Result<Box<dyn CommandAllocator>> {
        let id = lock(&self.state).next_id();
        Ok(Box::new(MockCommandAllocator { id, reset_count: 0, state: self.state.clone() }))
    }

    fn create_command_list(&self, allocator: &dyn CommandAllocator) -> Result<Box<dyn CommandList>> {
        let allocator = allocator
            .as_any()
            .downcast_ref::<MockCommandAllocator>()
            .map(|a| a.id)
            .ok_or_else(|| Error::InvalidResource("not a mock allocator".to_string()))?;
        Ok(Box::new(MockCommandList { allocator, commands: Vec::new(), closed: true }))
    }

    fn create_descriptor_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<Arc<dyn DescriptorHeap>> {
        if capacity == 0 {
            return Err(Error::InvalidResource("descriptor heap capacity must be non-zero".to_string()));
        }
        let id = lock(&self.state).next_id();
        Ok(Arc::new(MockDescriptorHeap { id, kind, capacity }))
    }

    fn descriptor_stride(&self, kind: DescriptorHeapKind) -> u64 {
        match kind {
            DescriptorHeapKind::RenderTarget => MOCK_RTV_STRIDE,
            DescriptorHeapKind::ShaderResource => MOCK_SRV_STRIDE,
        }
    }

    fn create_render_target_view(&self, texture: &dyn Texture, handle: CpuDescriptorHandle) -> Result<()> {
        let id = texture_id(texture)?;
        lock(&self.state).views.insert(handle.0, id);
        Ok(())
    }

    fn create_shader_resource_view(&self, texture: &dyn Texture, handle: CpuDescriptorHandle) -> Result<()> {
        let id = texture_id(texture)?;
        lock(&self.state).views.insert(handle.0, id);
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        let id = lock(&self.state).allocate(desc.size, true)?;
        Ok(Arc::new(MockBuffer { id, desc: desc.clone(), state: self.state.clone() }))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        let id = lock(&self.state).allocate(desc.byte_size(), true)?;
        Ok(Arc::new(MockTexture { id, desc: desc.clone(), budgeted: true, state: self.state.clone() }))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<Arc<dyn RootSignature>> {
        Ok(Arc::new(MockRootSignature { desc: desc.clone() }))
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc<'_>) -> Result<Arc<dyn PipelineState>> {
        if desc.vertex_shader.is_empty() || desc.pixel_shader.is_empty() {
            return Err(Error::InvalidResource("empty shader blob".to_string()));
        }
        Ok(Arc::new(MockPipelineState {
            vertex_entry: desc.vertex_shader.entry_point.clone(),
            pixel_entry: desc.pixel_shader.entry_point.clone(),
            input_element_count: desc.input_layout.len(),
            vertex_stride: desc.vertex_stride,
        }))
    }

    fn create_swapchain(&self, surface: &dyn PresentationSurface, buffer_count: u32, _vsync: bool) -> Result<Box<dyn Swapchain>> {
        surface
            .window_handle()
            .map_err(|e| Error::InitializationFailed(format!("surface has no window handle: {}", e)))?;
        let extent = surface.size();
        let buffers = MockSwapchain::create_buffers(&self.state, buffer_count, extent)?;
        Ok(Box::new(MockSwapchain {
            state: self.state.clone(),
            buffers,
            current: 0,
            extent,
            resize_count: 0,
        }))
    }

    fn execute_command_lists(&self, lists: &[&dyn CommandList]) -> Result<()> {
        let mut items = Vec::with_capacity(lists.len());
        for list in lists {
            let list = list
                .as_any()
                .downcast_ref::<MockCommandList>()
                .ok_or_else(|| Error::InvalidResource("not a mock command list".to_string()))?;
            if !list.closed {
                return Err(Error::BackendError("executed a command list that is still recording".to_string()));
            }
            items.push(QueueItem::Execute { allocator: list.allocator, commands: list.commands.clone() });
        }

        let mut state = lock(&self.state);
        state.stats.submitted_command_lists += items.len() as u64;
        state.queue.extend(items);
        if state.auto_complete {
            state.run_all();
        }
        Ok(())
    }

    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()> {
        let fence = fence
            .as_any()
            .downcast_ref::<MockFence>()
            .map(|f| f.id)
            .ok_or_else(|| Error::InvalidResource("not a mock fence".to_string()))?;
        let mut state = lock(&self.state);
        state.stats.signals += 1;
        state.queue.push_back(QueueItem::Signal { fence, value });
        if state.auto_complete {
            state.run_all();
        }
        Ok(())
    }

    fn texture_pitch_alignment(&self) -> u32 {
        MOCK_PITCH_ALIGNMENT
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.stats.idle_waits += 1;
        if state.stalled {
            return Err(Error::DeviceLost("mock GPU is stalled".to_string()));
        }
        state.run_all();
        Ok(())
    }
}

// ============================================================================
// Mock Surface / Shader Compiler
// ============================================================================

/// Presentation surface with a fake web window handle
pub struct MockSurface {
    pub size: SurfaceSize,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { size: SurfaceSize::new(width, height) }
    }
}

impl HasWindowHandle for MockSurface {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(1));
        // SAFETY: a web handle is a plain id, nothing behind it is dereferenced
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for MockSurface {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        Ok(DisplayHandle::web())
    }
}

impl PresentationSurface for MockSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }
}

/// Shader compiler returning fake bytecode, recording every request
#[derive(Default)]
pub struct MockShaderCompiler {
    pub requests: Mutex<Vec<ShaderCompileRequest>>,
    /// Fail any request whose source path contains this string
    pub fail_on: Option<String>,
}

impl ShaderCompiler for MockShaderCompiler {
    fn compile(&self, request: &ShaderCompileRequest) -> Result<ShaderBlob> {
        self.requests.lock().unwrap().push(request.clone());

        let path = request.source_path.to_string_lossy();
        if let Some(pattern) = &self.fail_on {
            if path.contains(pattern.as_str()) {
                return Err(Error::InvalidResource(format!("failed to compile {}", path)));
            }
        }

        let stage = request
            .stage()
            .ok_or_else(|| Error::InvalidResource(format!("unknown profile {}", request.target_profile)))?;
        Ok(ShaderBlob {
            stage,
            entry_point: request.entry_point.clone(),
            bytecode: format!("{}:{}:{}", path, request.entry_point, request.target_profile).into_bytes(),
        })
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
