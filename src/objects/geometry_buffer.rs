//! Vertex and index storage.
//!
//! A geometry buffer is either carved into `Geometry` ranges (static and dynamic
//! buffers), or used as the bounded storage of immediate-mode drawing.

use smallvec::SmallVec;

use crate::backends::{BackendId, BufferKind, Capabilities, Visitor};
use crate::errors::*;
use crate::utils::out_of_range;
use crate::immediate::ImmediateBatch;

use super::{Claim, GpuObject, ObjectType};

impl_handle!(GeometryBufferHandle);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryBufferKind {
    /// Contents are uploaded once, usually right after creation.
    Static,
    /// Contents are changed frequently.
    Dynamic,
    /// Storage of immediate-mode primitives.
    Immediate,
}

/// The data type of a vertex component.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexComponentKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl VertexComponentKind {
    /// The size in bytes.
    pub fn size(self) -> u32 {
        match self {
            VertexComponentKind::Float => 4,
            VertexComponentKind::Vec2 => 8,
            VertexComponentKind::Vec3 => 12,
            VertexComponentKind::Vec4 => 16,
            VertexComponentKind::Mat2 => 16,
            VertexComponentKind::Mat3 => 36,
            VertexComponentKind::Mat4 => 64,
        }
    }
}

/// One component of a vertex. The name is matched against the attributes of the
/// program, an empty name only occupies space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexComponent {
    pub kind: VertexComponentKind,
    pub name: String,
}

/// How a single vertex structure looks like. Components are packed in order, the
/// first component starts at offset 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexDecl {
    components: SmallVec<[VertexComponent; 8]>,
}

impl VertexDecl {
    #[inline]
    pub fn build() -> VertexDeclBuilder {
        VertexDeclBuilder::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn stride(&self) -> u32 {
        self.components.iter().map(|v| v.kind.size()).sum()
    }

    /// Iterates over the components with their offsets.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a VertexComponent, u32)> + 'a {
        self.components.iter().scan(0, |offset, v| {
            let item = (v, *offset);
            *offset += v.kind.size();
            Some(item)
        })
    }
}

#[derive(Default)]
pub struct VertexDeclBuilder(VertexDecl);

impl VertexDeclBuilder {
    #[inline]
    pub fn with<T: Into<String>>(mut self, kind: VertexComponentKind, name: T) -> Self {
        self.0.components.push(VertexComponent {
            kind,
            name: name.into(),
        });
        self
    }

    /// Skips `kind`-sized bytes of each vertex.
    #[inline]
    pub fn padding(self, kind: VertexComponentKind) -> Self {
        self.with(kind, "")
    }

    #[inline]
    pub fn finish(self) -> VertexDecl {
        self.0
    }
}

/// Vertex indices can be either 16- or 32-bit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    #[inline]
    pub fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryBufferParams {
    pub kind: GeometryBufferKind,
    pub decl: VertexDecl,
    pub vertex_count: u32,
    #[serde(default)]
    pub index_count: u32,
    /// The format of indices, `None` for non-indexed buffers.
    #[serde(default)]
    pub index_format: Option<IndexFormat>,
    #[serde(default)]
    pub sparse: bool,
}

impl GeometryBufferParams {
    pub fn validate(&self, caps: &Capabilities) -> Result<()> {
        if self.decl.is_empty() {
            bail_format!(InvalidValue, "Geometry buffer without vertex components.");
        }

        if self.vertex_count == 0 {
            bail_format!(InvalidValue, "Geometry buffer without vertices.");
        }

        if self.index_count > 0 && self.index_format.is_none() {
            bail_format!(InvalidValue, "Indexed geometry buffer without index format.");
        }

        if self.sparse {
            if !caps.sparse_buffer {
                bail_format!(Incompatible, "Sparse buffers are not supported.");
            }

            if self.kind == GeometryBufferKind::Immediate {
                bail_format!(InvalidValue, "Immediate buffers could not be sparse.");
            }
        }

        // Immediate buffers keep a staging copy of their whole storage.
        if self.kind == GeometryBufferKind::Immediate {
            let max = u32::max_value() as usize;
            if self.vertex_buffer_len() > max || self.index_buffer_len() > max {
                bail_format!(
                    InvalidValue,
                    "Immediate buffers are limited to {} bytes per storage.",
                    max
                );
            }
        }

        Ok(())
    }

    #[inline]
    pub fn vertex_buffer_len(&self) -> usize {
        self.vertex_count as usize * self.decl.stride() as usize
    }

    #[inline]
    pub fn index_buffer_len(&self) -> usize {
        let size = self.index_format.map(|v| v.size()).unwrap_or(0);
        self.index_count as usize * size as usize
    }
}

#[derive(Debug)]
pub struct GeometryBuffer {
    params: GeometryBufferParams,
    vertices: Option<BackendId>,
    indices: Option<BackendId>,
    allocated_vertices: u32,
    allocated_indices: u32,
    immediate: Option<ImmediateBatch>,
}

impl GeometryBuffer {
    pub fn allocate(
        visitor: &mut dyn Visitor,
        caps: &Capabilities,
        params: GeometryBufferParams,
    ) -> Result<Self> {
        params.validate(caps)?;

        let mut buffer = GeometryBuffer {
            immediate: None,
            vertices: None,
            indices: None,
            allocated_vertices: 0,
            allocated_indices: 0,
            params,
        };

        if let Err(err) = buffer.create_storage(visitor) {
            buffer.release_renderer_resources(visitor);
            return Err(err);
        }

        if buffer.params.kind == GeometryBufferKind::Immediate {
            buffer.immediate = Some(ImmediateBatch::new(
                buffer.params.vertex_count,
                buffer.params.index_count,
                buffer.params.decl.stride(),
                buffer.params.index_format,
            ));
        }

        Ok(buffer)
    }

    fn create_storage(&mut self, visitor: &mut dyn Visitor) -> Result<()> {
        let len = self.params.vertex_buffer_len();
        self.vertices = Some(visitor.create_buffer(BufferKind::Vertex, len)?);

        if self.params.index_count > 0 {
            let len = self.params.index_buffer_len();
            self.indices = Some(visitor.create_buffer(BufferKind::Index, len)?);
        }

        Ok(())
    }

    #[inline]
    pub fn params(&self) -> &GeometryBufferParams {
        &self.params
    }

    #[inline]
    pub fn kind(&self) -> GeometryBufferKind {
        self.params.kind
    }

    #[inline]
    pub fn decl(&self) -> &VertexDecl {
        &self.params.decl
    }

    #[inline]
    pub fn index_format(&self) -> Option<IndexFormat> {
        self.params.index_format
    }

    #[inline]
    pub fn vertex_buffer(&self) -> Option<BackendId> {
        self.vertices
    }

    #[inline]
    pub fn index_buffer(&self) -> Option<BackendId> {
        self.indices
    }

    #[inline]
    pub fn immediate(&self) -> Option<&ImmediateBatch> {
        self.immediate.as_ref()
    }

    #[inline]
    pub fn immediate_mut(&mut self) -> Option<&mut ImmediateBatch> {
        self.immediate.as_mut()
    }

    /// Reserves a range of vertices and indices. Ranges are handed out in order and
    /// never given back.
    pub fn allocate_range(&mut self, vertex_count: u32, index_count: u32) -> Result<(u32, u32)> {
        if self.params.kind == GeometryBufferKind::Immediate {
            bail_format!(
                InvalidOperation,
                "Geometries could not be allocated from immediate buffers."
            );
        }

        let vertices = u64::from(self.allocated_vertices) + u64::from(vertex_count);
        let indices = u64::from(self.allocated_indices) + u64::from(index_count);
        if vertices > u64::from(self.params.vertex_count)
            || indices > u64::from(self.params.index_count)
        {
            bail_format!(
                InvalidValue,
                "Geometry buffer is out of space for {} vertices and {} indices.",
                vertex_count,
                index_count
            );
        }

        let v = (self.allocated_vertices, self.allocated_indices);
        self.allocated_vertices += vertex_count;
        self.allocated_indices += index_count;
        Ok(v)
    }

    /// Writes raw vertices, starting at vertex `first`.
    pub fn update_vertices(
        &self,
        visitor: &mut dyn Visitor,
        first: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let stride = self.params.decl.stride() as usize;
        let offset = (first as usize).saturating_mul(stride);
        if bytes.len() % stride != 0
            || out_of_range(offset, bytes.len(), self.params.vertex_buffer_len())
        {
            bail_format!(InvalidValue, "Vertex data does not fit the geometry buffer.");
        }

        match self.vertices {
            Some(id) => visitor.update_buffer(id, offset, bytes),
            None => Err(err_format!(InvalidState, "Geometry buffer has no renderer resources.")),
        }
    }

    /// Writes raw indices, starting at index `first`.
    pub fn update_indices(
        &self,
        visitor: &mut dyn Visitor,
        first: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let size = self.params.index_format.map(|v| v.size()).unwrap_or(0) as usize;
        let offset = (first as usize).saturating_mul(size);
        if size == 0
            || bytes.len() % size != 0
            || out_of_range(offset, bytes.len(), self.params.index_buffer_len())
        {
            bail_format!(InvalidValue, "Index data does not fit the geometry buffer.");
        }

        match self.indices {
            Some(id) => visitor.update_buffer(id, offset, bytes),
            None => Err(err_format!(InvalidState, "Geometry buffer has no renderer resources.")),
        }
    }
}

impl GpuObject for GeometryBuffer {
    const TYPE: ObjectType = ObjectType::GeometryBuffer;

    fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Claim> {
        for id in self.vertices.take().into_iter().chain(self.indices.take()) {
            if let Err(err) = visitor.delete_buffer(id) {
                warn!("{}", err);
            }
        }

        if let Some(ref mut batch) = self.immediate {
            batch.reset();
        }

        Vec::new()
    }
}
