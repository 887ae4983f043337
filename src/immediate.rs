//! Immediate-mode batching.
//!
//! An `ImmediateBatch` lives inside a geometry buffer created with the `Immediate`
//! kind. While recording, primitives are admitted one after another into the fixed
//! vertex and index capacity of the buffer. A primitive that does not fit is refused,
//! the session then flushes everything queued so far as draw calls and retries the
//! admission exactly once on the emptied batch.
//!
//! The batch also keeps a CPU staging copy of the vertex and index storage. Callers
//! fill it with `write` and the admitted region is uploaded right before the flush.

use byteorder::{ByteOrder, NativeEndian};

use crate::errors::*;
use crate::objects::geometry::Primitive;
use crate::objects::geometry_buffer::IndexFormat;

/// Where an admitted primitive lives in the immediate buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImmediatePrimitive {
    pub primitive: Primitive,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub first_index: u32,
    pub index_count: u32,
}

/// The queued primitives and the staged bytes to upload, taken out of a batch by
/// `ImmediateBatch::drain`.
#[derive(Debug, Default)]
pub struct ImmediateFlush {
    pub primitives: Vec<ImmediatePrimitive>,
    pub vertices: Vec<u8>,
    pub indices: Vec<u8>,
}

#[derive(Debug)]
pub struct ImmediateBatch {
    vertex_capacity: u32,
    index_capacity: u32,
    stride: usize,
    index_size: usize,
    index_format: Option<IndexFormat>,

    vertices_used: u32,
    indices_used: u32,
    primitives: Vec<ImmediatePrimitive>,
    recording: bool,

    vertices: Vec<u8>,
    indices: Vec<u8>,
}

impl ImmediateBatch {
    pub fn new(
        vertex_capacity: u32,
        index_capacity: u32,
        stride: u32,
        index_format: Option<IndexFormat>,
    ) -> Self {
        let stride = stride as usize;
        let index_size = index_format.map(|v| v.size()).unwrap_or(0) as usize;

        ImmediateBatch {
            vertex_capacity,
            index_capacity,
            stride,
            index_size,
            index_format,
            vertices_used: 0,
            indices_used: 0,
            primitives: Vec::new(),
            recording: false,
            vertices: vec![0; vertex_capacity as usize * stride],
            indices: vec![0; index_capacity as usize * index_size],
        }
    }

    #[inline]
    pub fn vertex_capacity(&self) -> u32 {
        self.vertex_capacity
    }

    #[inline]
    pub fn index_capacity(&self) -> u32 {
        self.index_capacity
    }

    #[inline]
    pub fn index_format(&self) -> Option<IndexFormat> {
        self.index_format
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// The primitives admitted since the last flush.
    #[inline]
    pub fn primitives(&self) -> &[ImmediatePrimitive] {
        &self.primitives
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.recording {
            bail_format!(InvalidState, "Immediate batch is already recording.");
        }

        self.recording = true;
        Ok(())
    }

    pub fn end(&mut self) {
        self.recording = false;
    }

    /// Checks if a primitive of this size could ever be admitted.
    pub fn validate(&self, vertex_count: u32, index_count: u32) -> Result<()> {
        if vertex_count == 0 {
            bail_format!(InvalidValue, "Immediate primitive without vertices.");
        }

        if index_count > 0 && self.index_format.is_none() {
            bail_format!(
                InvalidValue,
                "Indexed immediate primitive on a buffer without indices."
            );
        }

        Ok(())
    }

    #[inline]
    pub fn fits(&self, vertex_count: u32, index_count: u32) -> bool {
        u64::from(self.vertices_used) + u64::from(vertex_count) <= u64::from(self.vertex_capacity)
            && u64::from(self.indices_used) + u64::from(index_count)
                <= u64::from(self.index_capacity)
    }

    /// Admits a primitive into the remaining capacity. Nothing is queued if it does
    /// not fit.
    pub fn emit(
        &mut self,
        primitive: Primitive,
        vertex_count: u32,
        index_count: u32,
    ) -> Option<ImmediatePrimitive> {
        if !self.recording || !self.fits(vertex_count, index_count) {
            return None;
        }

        let v = ImmediatePrimitive {
            primitive,
            first_vertex: self.vertices_used,
            vertex_count,
            first_index: self.indices_used,
            index_count,
        };

        self.vertices_used += vertex_count;
        self.indices_used += index_count;
        self.primitives.push(v);
        Some(v)
    }

    /// Fills the staged storage of an admitted primitive. `indices` are relative to
    /// the first vertex of the primitive.
    pub fn write(
        &mut self,
        prim: &ImmediatePrimitive,
        vertices: &[u8],
        indices: &[u32],
    ) -> Result<()> {
        if !self.primitives.contains(prim) {
            bail_format!(
                InvalidValue,
                "Primitive is not queued in the current immediate batch."
            );
        }

        let len = prim.vertex_count as usize * self.stride;
        if vertices.len() != len {
            bail_format!(
                InvalidValue,
                "Expects {} bytes of vertices, got {}.",
                len,
                vertices.len()
            );
        }

        if indices.len() != prim.index_count as usize {
            bail_format!(
                InvalidValue,
                "Expects {} indices, got {}.",
                prim.index_count,
                indices.len()
            );
        }

        if let Some(&v) = indices.iter().find(|&&v| v >= prim.vertex_count) {
            bail_format!(InvalidValue, "Index {} is out of the primitive.", v);
        }

        let start = prim.first_vertex as usize * self.stride;
        self.vertices[start..start + len].copy_from_slice(vertices);

        if let Some(format) = self.index_format {
            let size = self.index_size;
            let start = prim.first_index as usize * size;
            let dst = &mut self.indices[start..start + indices.len() * size];

            match format {
                IndexFormat::U16 => {
                    for (chunk, &v) in dst.chunks_mut(2).zip(indices) {
                        NativeEndian::write_u16(chunk, v as u16);
                    }
                }
                IndexFormat::U32 => NativeEndian::write_u32_into(indices, dst),
            }
        }

        Ok(())
    }

    /// Copies the queued primitives and the staged bytes they cover. The batch is
    /// left as it is.
    pub fn pending(&self) -> ImmediateFlush {
        let vertices = self.vertices_used as usize * self.stride;
        let indices = self.indices_used as usize * self.index_size;
        ImmediateFlush {
            primitives: self.primitives.clone(),
            vertices: self.vertices[..vertices].to_vec(),
            indices: self.indices[..indices].to_vec(),
        }
    }

    /// Empties the queue once its primitives were submitted. The recording flag is
    /// left untouched.
    pub fn clear_queue(&mut self) {
        self.primitives.clear();
        self.vertices_used = 0;
        self.indices_used = 0;
    }

    /// Takes the queued primitives and the staged bytes they cover, and empties the
    /// batch.
    pub fn drain(&mut self) -> ImmediateFlush {
        let flush = self.pending();
        self.clear_queue();
        flush
    }

    /// Drops everything queued without drawing it.
    pub fn reset(&mut self) {
        self.primitives.clear();
        self.vertices_used = 0;
        self.indices_used = 0;
        self.recording = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn admission() {
        let mut batch = ImmediateBatch::new(100, 0, 12, None);
        assert!(batch.emit(Primitive::Triangles, 3, 0).is_none());

        batch.begin().unwrap();
        assert_eq!(batch.begin().unwrap_err().kind(), ErrorKind::InvalidState);

        let p1 = batch.emit(Primitive::Triangles, 60, 0).unwrap();
        assert_eq!(p1.first_vertex, 0);
        assert!(batch.emit(Primitive::Triangles, 60, 0).is_none());
        assert_eq!(batch.primitives().len(), 1);

        assert_eq!(batch.pending().primitives, vec![p1]);
        assert_eq!(batch.primitives().len(), 1);

        let flush = batch.drain();
        assert_eq!(flush.primitives, vec![p1]);
        assert_eq!(flush.vertices.len(), 60 * 12);
        assert!(batch.is_recording());

        let p2 = batch.emit(Primitive::Triangles, 60, 0).unwrap();
        assert_eq!(p2.first_vertex, 0);
        assert!(batch.emit(Primitive::Triangles, 40, 0).is_some());
        assert!(batch.emit(Primitive::Points, 1, 0).is_none());
    }

    #[test]
    fn indices() {
        let mut batch = ImmediateBatch::new(8, 8, 4, Some(IndexFormat::U16));
        batch.begin().unwrap();
        assert!(batch.validate(1, 0).is_ok());
        assert_eq!(batch.validate(0, 0).unwrap_err().kind(), ErrorKind::InvalidValue);

        batch.emit(Primitive::Points, 1, 2).unwrap();
        let prim = batch.emit(Primitive::Triangles, 3, 3).unwrap();
        assert_eq!((prim.first_vertex, prim.first_index), (1, 2));

        let bytes = [0u8; 12];
        assert!(batch.write(&prim, &bytes, &[0, 1, 3]).is_err());
        batch.write(&prim, &bytes, &[2, 1, 0]).unwrap();

        let flush = batch.drain();
        assert_eq!(flush.indices.len(), 5 * 2);
        assert_eq!(NativeEndian::read_u16(&flush.indices[4..6]), 2);
        assert_eq!(NativeEndian::read_u16(&flush.indices[8..10]), 0);
    }
}
