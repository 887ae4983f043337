use crate::backends::{DrawCall, Visitor};
use crate::errors::*;

use super::geometry_buffer::{GeometryBuffer, GeometryBufferHandle, IndexFormat};
use super::{Claim, GpuObject, Object, ObjectType};

impl_handle!(GeometryHandle);

/// Defines how the input vertex data is used to assemble primitives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    /// Separate points.
    Points,
    /// Separate lines.
    Lines,
    /// Line strips.
    LineStrip,
    /// Separate triangles.
    Triangles,
    /// Triangle strips.
    TriangleStrip,
    /// Triangle fans.
    TriangleFan,
    /// Patches consumed by tessellation stages, with a fixed number of vertices each.
    Patches(u32),
}

impl Primitive {
    /// The number of primitives assembled from `vertices` vertices.
    pub fn assemble(self, vertices: u32) -> u32 {
        match self {
            Primitive::Points => vertices,
            Primitive::Lines => vertices / 2,
            Primitive::LineStrip => vertices.saturating_sub(1),
            Primitive::Triangles => vertices / 3,
            Primitive::TriangleStrip | Primitive::TriangleFan => vertices.saturating_sub(2),
            Primitive::Patches(n) => vertices / n.max(1),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryParams {
    pub buffer: GeometryBufferHandle,
    pub primitive: Primitive,
    pub vertex_count: u32,
    #[serde(default)]
    pub index_count: u32,
}

/// A range of vertices and indices in a geometry buffer.
#[derive(Debug, Clone)]
pub struct Geometry {
    params: GeometryParams,
    index_format: Option<IndexFormat>,
    first_vertex: u32,
    first_index: u32,
    claims: Vec<Claim>,
}

impl Geometry {
    /// Carves the range out of `buffer`. The caller adds the claim on the buffer.
    pub fn allocate(buffer: &mut GeometryBuffer, params: GeometryParams) -> Result<Self> {
        if params.vertex_count == 0 {
            bail_format!(InvalidValue, "Geometry without vertices.");
        }

        if params.index_count > 0 && buffer.index_format().is_none() {
            bail_format!(InvalidValue, "Indexed geometry in a buffer without indices.");
        }

        let (first_vertex, first_index) =
            buffer.allocate_range(params.vertex_count, params.index_count)?;

        Ok(Geometry {
            params,
            index_format: buffer.index_format(),
            first_vertex,
            first_index,
            claims: vec![Claim::Object(Object::GeometryBuffer(params.buffer))],
        })
    }

    #[inline]
    pub fn buffer(&self) -> GeometryBufferHandle {
        self.params.buffer
    }

    #[inline]
    pub fn primitive(&self) -> Primitive {
        self.params.primitive
    }

    #[inline]
    pub fn first_vertex(&self) -> u32 {
        self.first_vertex
    }

    #[inline]
    pub fn first_index(&self) -> u32 {
        self.first_index
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.params.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.params.index_count
    }

    pub fn draw_call(&self, instances: u32) -> DrawCall {
        DrawCall {
            primitive: self.params.primitive,
            first_vertex: self.first_vertex,
            vertex_count: self.params.vertex_count,
            first_index: self.first_index,
            index_count: self.params.index_count,
            index_format: if self.params.index_count > 0 {
                self.index_format
            } else {
                None
            },
            instances,
        }
    }
}

impl GpuObject for Geometry {
    const TYPE: ObjectType = ObjectType::Geometry;

    fn release_renderer_resources(&mut self, _: &mut dyn Visitor) -> Vec<Claim> {
        ::std::mem::replace(&mut self.claims, Vec::new())
    }
}
