//! Mock implementation of GraphicsDevice for testing.
//!
//! This module provides a mock device that records operations and keeps a
//! CPU copy of every buffer, without touching a GPU. Indexed draws are
//! resolved against the buffer contents at the time of the draw, so tests can
//! check exactly which vertex records each draw call would have rasterized.

use parking_lot::Mutex;
use tessera_core::alloc::{HashMap, HashSet};

use crate::error::{DeviceError, DeviceResult, ProgramError, ShaderStage};
use crate::gpu_types::*;
use crate::layout::VertexLayout;
use crate::state::{RenderState, StateCache};
use crate::device::GraphicsDevice;

/// Records a device call for verification in tests.
///
/// Binds and state applies that the device's [`StateCache`] deems redundant
/// are not recorded, mirroring what a real driver would receive.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        buffer: BufferId,
        size: u64,
        kind: BufferKind,
    },
    DeleteBuffer {
        buffer: BufferId,
    },
    UploadRegion {
        buffer: BufferId,
        offset: u64,
        size: usize,
    },
    CreateProgram {
        program: ProgramId,
        label: Option<String>,
    },
    DeleteProgram {
        program: ProgramId,
    },
    BindProgram {
        program: ProgramId,
    },
    SetUniforms {
        program: ProgramId,
        size: usize,
    },
    BindBuffers {
        vertex: BufferId,
        index: BufferId,
        stride: u32,
    },
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    DeleteTexture {
        texture: TextureId,
    },
    BindTexture {
        slot: u32,
        texture: TextureId,
    },
    ApplyRenderState {
        state: RenderState,
    },
    DrawIndexed(DrawRecord),
}

/// A resolved indexed draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub index_count: u32,
    pub first_index: u32,
    pub program: ProgramId,
    /// Texture bound to slot 0 at draw time.
    pub texture: Option<TextureId>,
    pub render_state: Option<RenderState>,
    /// Index values read from the index buffer.
    pub indices: Vec<u16>,
    /// One vertex record (stride bytes) per index, in index order.
    pub vertices: Vec<Vec<u8>>,
}

impl DrawRecord {
    /// Read a two-component float attribute at `offset` from every resolved vertex.
    pub fn read_f32x2(&self, offset: usize) -> Vec<[f32; 2]> {
        self.vertices
            .iter()
            .map(|v| bytemuck::pod_read_unaligned(&v[offset..offset + 8]))
            .collect()
    }

    /// Read a four-byte attribute at `offset` from every resolved vertex.
    pub fn read_u8x4(&self, offset: usize) -> Vec<[u8; 4]> {
        self.vertices
            .iter()
            .map(|v| bytemuck::pod_read_unaligned(&v[offset..offset + 4]))
            .collect()
    }

    /// Number of quads covered, assuming six indices per quad.
    pub fn quad_count(&self) -> u32 {
        self.index_count / 6
    }
}

#[derive(Debug)]
struct MockBuffer {
    kind: BufferKind,
    data: Vec<u8>,
}

#[derive(Debug)]
struct MockProgram {
    uniforms: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<DeviceCall>,
    buffers: HashMap<u32, MockBuffer>,
    programs: HashMap<u32, MockProgram>,
    textures: HashSet<u32>,
    cache: StateCache,
    /// (vertex, index, stride) last bound.
    bound: Option<(BufferId, BufferId, u32)>,
    next_id: u32,
    lost: bool,
    program_failure: Option<(ShaderStage, String)>,
}

impl MockState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mock implementation of GraphicsDevice for testing.
///
/// # Borrow Checking Pattern: Interior Mutability
///
/// Trait methods take `&self` but need to mutate internal state (record
/// calls, store buffer contents). A single `parking_lot::Mutex` guards it,
/// which keeps the mock `Send + Sync` like the real device.
///
/// # Example
///
/// ```rust
/// use tessera_gpu::{BufferDescriptor, BufferKind, GraphicsDevice, MockDevice};
///
/// let mock = MockDevice::new();
/// let buffer = mock
///     .create_buffer(&BufferDescriptor {
///         label: None,
///         size: 16,
///         kind: BufferKind::Vertex,
///     })
///     .unwrap();
///
/// mock.upload_region(buffer, 4, &[1, 2, 3, 4]).unwrap();
///
/// assert_eq!(mock.count_uploads(), 1);
/// assert_eq!(&mock.buffer_contents(buffer).unwrap()[4..8], &[1, 2, 3, 4]);
/// ```
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Create a new mock device.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| pred(call)).count()
    }

    /// All resolved draws, in submission order.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::DrawIndexed(draw) => Some(draw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count_draws(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::DrawIndexed(_)))
    }

    pub fn count_uploads(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::UploadRegion { .. }))
    }

    /// Count effective (non-redundant) render state applies.
    pub fn count_state_applies(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::ApplyRenderState { .. }))
    }

    /// Count effective (non-redundant) texture binds.
    pub fn count_texture_binds(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::BindTexture { .. }))
    }

    pub fn count_buffer_creates(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::CreateBuffer { .. }))
    }

    pub fn count_program_creates(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::CreateProgram { .. }))
    }

    /// Current contents of a live buffer.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(&buffer.raw())
            .map(|b| b.data.clone())
    }

    /// Number of buffers created and not yet deleted.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of programs created and not yet deleted.
    pub fn live_programs(&self) -> usize {
        self.state.lock().programs.len()
    }

    /// Last uniform block written for a program.
    pub fn uniforms(&self, program: ProgramId) -> Option<Vec<u8>> {
        self.state
            .lock()
            .programs
            .get(&program.raw())
            .map(|p| p.uniforms.clone())
    }

    /// Make the next `create_program` fail at `stage` with `log`.
    pub fn fail_next_program(&self, stage: ShaderStage, log: impl Into<String>) {
        self.state.lock().program_failure = Some((stage, log.into()));
    }

    /// Simulate losing the GPU context: every resource is dropped and every
    /// operation reports [`DeviceError::Lost`] until [`restore`](Self::restore).
    pub fn simulate_device_loss(&self) {
        tracing::warn!("MockDevice: simulating device loss");
        let mut state = self.state.lock();
        state.lost = true;
        state.buffers.clear();
        state.programs.clear();
        state.textures.clear();
        state.cache.invalidate();
        state.bound = None;
    }

    /// Bring up a fresh context after a simulated loss. Old handles stay invalid.
    pub fn restore(&self) {
        tracing::debug!("MockDevice: restored after device loss");
        self.state.lock().lost = false;
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockDevice {
    fn create_buffer(&self, desc: &BufferDescriptor) -> DeviceResult<BufferId> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(DeviceError::Lost);
        }

        let buffer = BufferId::from_raw(state.next_id());
        state.buffers.insert(
            buffer.raw(),
            MockBuffer {
                kind: desc.kind,
                data: vec![0; desc.size as usize],
            },
        );
        state.calls.push(DeviceCall::CreateBuffer {
            buffer,
            size: desc.size,
            kind: desc.kind,
        });

        Ok(buffer)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer.raw()).is_some() {
            state.cache.forget_buffer(buffer);
            if matches!(state.bound, Some((v, i, _)) if v == buffer || i == buffer) {
                state.bound = None;
            }
            state.calls.push(DeviceCall::DeleteBuffer { buffer });
        }
    }

    fn upload_region(&self, buffer: BufferId, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(DeviceError::Lost);
        }

        let Some(target) = state.buffers.get_mut(&buffer.raw()) else {
            return Err(DeviceError::InvalidHandle {
                kind: "buffer",
                id: buffer.raw(),
            });
        };

        let start = offset as usize;
        let end = start + data.len();
        if end > target.data.len() {
            return Err(DeviceError::OutOfBounds {
                id: buffer.raw(),
                offset,
                len: data.len() as u64,
                size: target.data.len() as u64,
            });
        }
        target.data[start..end].copy_from_slice(data);

        state.calls.push(DeviceCall::UploadRegion {
            buffer,
            offset,
            size: data.len(),
        });
        Ok(())
    }

    fn create_program(&self, desc: &ProgramDescriptor) -> Result<ProgramId, ProgramError> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(ProgramError::new(ShaderStage::Link, "", "device lost"));
        }

        if let Some((stage, log)) = state.program_failure.take() {
            let source = match stage {
                ShaderStage::VertexCompile => desc.vertex_source.to_string(),
                ShaderStage::FragmentCompile => desc.fragment_source.to_string(),
                ShaderStage::Link => format!("{}\n{}", desc.vertex_source, desc.fragment_source),
            };
            return Err(ProgramError::new(stage, source, log));
        }

        if let Err(err) = desc.layout.validate() {
            return Err(ProgramError::new(
                ShaderStage::Link,
                desc.vertex_source,
                err.to_string(),
            ));
        }

        let program = ProgramId::from_raw(state.next_id());
        state.programs.insert(
            program.raw(),
            MockProgram {
                uniforms: vec![0; desc.uniform_size as usize],
            },
        );
        state.calls.push(DeviceCall::CreateProgram {
            program,
            label: desc.label.map(str::to_string),
        });

        Ok(program)
    }

    fn delete_program(&self, program: ProgramId) {
        let mut state = self.state.lock();
        if state.programs.remove(&program.raw()).is_some() {
            state.cache.forget_program(program);
            state.calls.push(DeviceCall::DeleteProgram { program });
        }
    }

    fn bind_program(&self, program: ProgramId) {
        let mut state = self.state.lock();
        if state.cache.bind_program(program) {
            state.calls.push(DeviceCall::BindProgram { program });
        }
    }

    fn set_uniforms(&self, program: ProgramId, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(DeviceError::Lost);
        }

        let Some(target) = state.programs.get_mut(&program.raw()) else {
            return Err(DeviceError::InvalidHandle {
                kind: "program",
                id: program.raw(),
            });
        };
        if data.len() > target.uniforms.len() {
            return Err(DeviceError::OutOfBounds {
                id: program.raw(),
                offset: 0,
                len: data.len() as u64,
                size: target.uniforms.len() as u64,
            });
        }
        target.uniforms[..data.len()].copy_from_slice(data);

        state.calls.push(DeviceCall::SetUniforms {
            program,
            size: data.len(),
        });
        Ok(())
    }

    fn bind_buffers(&self, vertex: BufferId, index: BufferId, layout: &VertexLayout) {
        let mut state = self.state.lock();
        let changed = state.cache.bind_buffers(vertex, index);
        let stride = layout.stride();
        let stride_changed = !matches!(state.bound, Some((_, _, s)) if s == stride);
        state.bound = Some((vertex, index, stride));
        if changed || stride_changed {
            state.calls.push(DeviceCall::BindBuffers {
                vertex,
                index,
                stride,
            });
        }
    }

    fn create_texture(&self, desc: &TextureDescriptor, pixels: &[u8]) -> DeviceResult<TextureId> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(DeviceError::Lost);
        }
        if pixels.len() != desc.byte_len() {
            return Err(DeviceError::Creation(format!(
                "expected {} bytes of RGBA8 pixels, got {}",
                desc.byte_len(),
                pixels.len()
            )));
        }

        let texture = TextureId::from_raw(state.next_id());
        state.textures.insert(texture.raw());
        state.calls.push(DeviceCall::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.lock();
        if state.textures.remove(&texture.raw()) {
            state.cache.forget_texture(texture);
            state.calls.push(DeviceCall::DeleteTexture { texture });
        }
    }

    fn bind_texture(&self, slot: u32, texture: TextureId) {
        let mut state = self.state.lock();
        if state.cache.bind_texture(slot, texture) {
            state.calls.push(DeviceCall::BindTexture { slot, texture });
        }
    }

    fn apply_render_state(&self, render_state: &RenderState) {
        let mut state = self.state.lock();
        if state.cache.apply_render_state(render_state) {
            state.calls.push(DeviceCall::ApplyRenderState {
                state: *render_state,
            });
        }
    }

    fn draw_indexed(&self, index_count: u32, first_index: u32) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(DeviceError::Lost);
        }

        let program = state.cache.program().ok_or(DeviceError::NotBound("program"))?;
        let (vertex, index, stride) = state.bound.ok_or(DeviceError::NotBound("buffers"))?;

        let index_buffer = state
            .buffers
            .get(&index.raw())
            .filter(|b| b.kind == BufferKind::Index)
            .ok_or(DeviceError::InvalidHandle {
                kind: "index buffer",
                id: index.raw(),
            })?;
        let vertex_buffer = state
            .buffers
            .get(&vertex.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: "vertex buffer",
                id: vertex.raw(),
            })?;

        let start = first_index as usize * 2;
        let end = start + index_count as usize * 2;
        if end > index_buffer.data.len() {
            return Err(DeviceError::OutOfBounds {
                id: index.raw(),
                offset: start as u64,
                len: (end - start) as u64,
                size: index_buffer.data.len() as u64,
            });
        }

        let indices: Vec<u16> = index_buffer.data[start..end]
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();

        let stride = stride as usize;
        let mut vertices = Vec::with_capacity(indices.len());
        for &i in &indices {
            let v_start = i as usize * stride;
            let v_end = v_start + stride;
            if v_end > vertex_buffer.data.len() {
                return Err(DeviceError::OutOfBounds {
                    id: vertex.raw(),
                    offset: v_start as u64,
                    len: stride as u64,
                    size: vertex_buffer.data.len() as u64,
                });
            }
            vertices.push(vertex_buffer.data[v_start..v_end].to_vec());
        }

        let record = DrawRecord {
            index_count,
            first_index,
            program,
            texture: state.cache.texture(0),
            render_state: state.cache.render_state().copied(),
            indices,
            vertices,
        };
        state.calls.push(DeviceCall::DrawIndexed(record));
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.state.lock().lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ElementType, VertexAttribute};

    fn layout() -> VertexLayout {
        VertexLayout::new(8).with(VertexAttribute::new("position", ElementType::F32, 0, 2))
    }

    fn buffer(mock: &MockDevice, size: u64, kind: BufferKind) -> BufferId {
        mock.create_buffer(&BufferDescriptor {
            label: None,
            size,
            kind,
        })
        .unwrap()
    }

    fn program(mock: &MockDevice, layout: &VertexLayout) -> ProgramId {
        mock.create_program(&ProgramDescriptor {
            label: Some("test"),
            vertex_source: "vs",
            fragment_source: "fs",
            layout,
            uniform_size: 64,
        })
        .unwrap()
    }

    #[test]
    fn test_mock_upload_bounds() {
        let mock = MockDevice::new();
        let buffer = buffer(&mock, 8, BufferKind::Vertex);

        assert!(mock.upload_region(buffer, 4, &[0; 4]).is_ok());
        assert!(matches!(
            mock.upload_region(buffer, 6, &[0; 4]),
            Err(DeviceError::OutOfBounds { size: 8, .. })
        ));
        assert_eq!(mock.count_uploads(), 1);
    }

    #[test]
    fn test_mock_resolves_indexed_draw() {
        let mock = MockDevice::new();
        let layout = layout();
        let program = program(&mock, &layout);
        let vertices = buffer(&mock, 32, BufferKind::Vertex);
        let indices = buffer(&mock, 12, BufferKind::Index);

        let positions: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let quad: [u16; 6] = [0, 1, 2, 0, 2, 3];
        mock.upload_region(vertices, 0, bytemuck::cast_slice(&positions)).unwrap();
        mock.upload_region(indices, 0, bytemuck::cast_slice(&quad)).unwrap();

        mock.bind_program(program);
        mock.bind_buffers(vertices, indices, &layout);
        mock.draw_indexed(6, 0).unwrap();

        let draws = mock.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].indices, quad.to_vec());
        assert_eq!(draws[0].read_f32x2(0)[2], [1.0, 1.0]);
        assert_eq!(draws[0].quad_count(), 1);
    }

    #[test]
    fn test_mock_skips_redundant_binds() {
        let mock = MockDevice::new();
        let layout = layout();
        let program = program(&mock, &layout);
        let texture = mock
            .create_texture(
                &TextureDescriptor {
                    label: None,
                    width: 1,
                    height: 1,
                    filter_linear: false,
                },
                &[255; 4],
            )
            .unwrap();

        mock.bind_program(program);
        mock.bind_program(program);
        mock.bind_texture(0, texture);
        mock.bind_texture(0, texture);
        mock.apply_render_state(&RenderState::default());
        mock.apply_render_state(&RenderState::default());

        assert_eq!(mock.count_texture_binds(), 1);
        assert_eq!(mock.count_state_applies(), 1);
        assert_eq!(
            mock.calls()
                .iter()
                .filter(|c| matches!(c, DeviceCall::BindProgram { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_mock_program_failure() {
        let mock = MockDevice::new();
        let layout = layout();
        mock.fail_next_program(ShaderStage::FragmentCompile, "unknown identifier");

        let err = mock
            .create_program(&ProgramDescriptor {
                label: None,
                vertex_source: "vs",
                fragment_source: "fs source",
                layout: &layout,
                uniform_size: 64,
            })
            .unwrap_err();
        assert_eq!(err.stage, ShaderStage::FragmentCompile);
        assert_eq!(err.source, "fs source");
        assert_eq!(mock.live_programs(), 0);

        // Only the next program fails
        program(&mock, &layout);
        assert_eq!(mock.live_programs(), 1);
    }

    #[test]
    fn test_mock_device_loss() {
        let mock = MockDevice::new();
        let buffer = buffer(&mock, 16, BufferKind::Vertex);

        mock.simulate_device_loss();
        assert!(mock.is_lost());
        assert_eq!(mock.upload_region(buffer, 0, &[0; 4]), Err(DeviceError::Lost));
        assert_eq!(mock.live_buffers(), 0);

        mock.restore();
        assert!(!mock.is_lost());
        assert!(matches!(
            mock.upload_region(buffer, 0, &[0; 4]),
            Err(DeviceError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_clear_calls() {
        let mock = MockDevice::new();
        buffer(&mock, 4, BufferKind::Uniform);
        assert_eq!(mock.call_count(), 1);

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }
}
