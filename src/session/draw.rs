use crate::backends::{DrawCall, QueryKind};
use crate::errors::*;
use crate::immediate::ImmediatePrimitive;
use crate::objects::geometry::{GeometryHandle, Primitive};
use crate::objects::geometry_buffer::{GeometryBufferHandle, GeometryBufferKind};
use crate::objects::Object;

use super::query::{wait, QueryWait};
use super::{bound_state, Capture, Session, Stage, READY, RENDERER};

impl Session {
    /// The buffer bound to the primary slot of the bound state, either statically or
    /// through the bound input.
    fn primary_buffer(&self) -> Result<Option<GeometryBufferHandle>> {
        let (handle, state) = bound_state(&self.objects, self.state)?;

        if state.input_available() > 0 {
            let input = self
                .input
                .and_then(|v| self.objects.inputs.get(v))
                .ok_or_else(|| err_format!(InvalidState, "No input is bound for {}.", handle))?;

            return Ok(input.primary_buffer());
        }

        Ok(state.primary_buffer())
    }

    fn draw_call(&self, geometry: GeometryHandle, instances: u32) -> Result<DrawCall> {
        if instances == 0 {
            bail_format!(InvalidValue, "Draws take at least one instance.");
        }

        let v = self
            .objects
            .geometries
            .get(geometry)
            .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", geometry))?;

        if let Some(primary) = self.primary_buffer()? {
            if primary != v.buffer() {
                bail_format!(
                    InvalidObject,
                    "{} does not live in the buffer of the primary input slot.",
                    geometry
                );
            }
        }

        Ok(v.draw_call(instances))
    }

    fn submit(&mut self, geometries: &[GeometryHandle], instances: &[u32]) -> Result<()> {
        self.expect_stage(READY)?;
        self.expect_immediate(false)?;

        if geometries.len() != instances.len() {
            bail_format!(
                InvalidValue,
                "Got {} geometries with {} instance counts.",
                geometries.len(),
                instances.len()
            );
        }

        let mut calls = Vec::with_capacity(geometries.len());
        for (&g, &n) in geometries.iter().zip(instances) {
            calls.push(self.draw_call(g, n)?);
        }

        for v in &calls {
            self.visitor.draw(v)?;
        }

        Ok(())
    }

    pub fn draw(&mut self, geometry: GeometryHandle) -> Result<()> {
        self.tracked(move |s| s.submit(&[geometry], &[1]))
    }

    pub fn draw_instanced(&mut self, geometry: GeometryHandle, instances: u32) -> Result<()> {
        self.tracked(move |s| s.submit(&[geometry], &[instances]))
    }

    /// Draws every geometry once. Nothing is drawn unless all of them could be.
    pub fn draw_multi(&mut self, geometries: &[GeometryHandle]) -> Result<()> {
        let instances = vec![1; geometries.len()];
        self.tracked(|s| s.submit(geometries, &instances))
    }

    pub fn draw_multi_instanced(
        &mut self,
        geometries: &[GeometryHandle],
        instances: &[u32],
    ) -> Result<()> {
        self.tracked(|s| s.submit(geometries, instances))
    }
}

impl Session {
    /// Starts recording immediate primitives into `buffer`, which has to be an
    /// immediate buffer bound to the primary input slot.
    pub fn begin_immediate_drawing(&mut self, buffer: GeometryBufferHandle) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;

            let v = s
                .objects
                .geometry_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            if v.kind() != GeometryBufferKind::Immediate {
                bail_format!(InvalidObject, "{} is not an immediate buffer.", buffer);
            }

            if s.primary_buffer()? != Some(buffer) {
                bail_format!(
                    InvalidObject,
                    "{} is not bound to the primary input slot.",
                    buffer
                );
            }

            if let Some(batch) = s
                .objects
                .geometry_buffers
                .get_mut(buffer)
                .and_then(|v| v.immediate_mut())
            {
                batch.begin()?;
            }

            s.objects.add_ref(Object::GeometryBuffer(buffer))?;
            s.immediate = Some(buffer);
            Ok(())
        })
    }

    /// Admits a primitive into the immediate buffer. If the buffer is full, everything
    /// queued so far is drawn and the admission is retried once.
    pub fn immediate_primitive(
        &mut self,
        primitive: Primitive,
        vertex_count: u32,
        index_count: u32,
    ) -> Result<ImmediatePrimitive> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(true)?;

            if let Some(v) = s.emit_immediate(primitive, vertex_count, index_count)? {
                return Ok(v);
            }

            s.flush_immediate()?;

            match s.emit_immediate(primitive, vertex_count, index_count)? {
                Some(v) => Ok(v),
                None => Err(err_format!(
                    InvalidValue,
                    "Primitive of {} vertices and {} indices exceeds the immediate buffer.",
                    vertex_count,
                    index_count
                )),
            }
        })
    }

    /// Fills the vertices and indices of an admitted primitive.
    pub fn write_immediate(
        &mut self,
        primitive: &ImmediatePrimitive,
        vertices: &[u8],
        indices: &[u32],
    ) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.expect_immediate(true)?;
            s.immediate_batch()?.write(primitive, vertices, indices)
        })
    }

    /// Draws whatever is still queued and stops recording.
    pub fn end_immediate_drawing(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.expect_immediate(true)?;
            s.flush_immediate()?;
            s.immediate_batch()?.end();

            if let Some(buffer) = s.immediate.take() {
                s.release_object(Object::GeometryBuffer(buffer))?;
            }

            Ok(())
        })
    }

    fn immediate_batch(&mut self) -> Result<&mut crate::immediate::ImmediateBatch> {
        let buffer = self
            .immediate
            .ok_or_else(|| err_format!(InvalidState, "Immediate drawing is not active."))?;

        self.objects
            .geometry_buffers
            .get_mut(buffer)
            .and_then(|v| v.immediate_mut())
            .ok_or_else(|| err_format!(InvalidObject, "{} is not an immediate buffer.", buffer))
    }

    fn emit_immediate(
        &mut self,
        primitive: Primitive,
        vertex_count: u32,
        index_count: u32,
    ) -> Result<Option<ImmediatePrimitive>> {
        let batch = self.immediate_batch()?;
        batch.validate(vertex_count, index_count)?;
        Ok(batch.emit(primitive, vertex_count, index_count))
    }

    /// Uploads the staged storage and draws every queued primitive, one call each.
    /// The queue is only emptied once every draw was submitted.
    fn flush_immediate(&mut self) -> Result<()> {
        let buffer = self
            .immediate
            .ok_or_else(|| err_format!(InvalidState, "Immediate drawing is not active."))?;

        let (flush, format, vertices, indices) = {
            let v = self
                .objects
                .geometry_buffers
                .get_mut(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            let (vertices, indices) = (v.vertex_buffer(), v.index_buffer());
            let batch = v.immediate_mut().ok_or_else(|| {
                err_format!(InvalidObject, "{} is not an immediate buffer.", buffer)
            })?;

            (batch.pending(), batch.index_format(), vertices, indices)
        };

        if flush.primitives.is_empty() {
            return Ok(());
        }

        if let Some(id) = vertices {
            self.visitor.update_buffer(id, 0, &flush.vertices)?;
        }

        if let Some(id) = indices {
            if !flush.indices.is_empty() {
                self.visitor.update_buffer(id, 0, &flush.indices)?;
            }
        }

        for v in &flush.primitives {
            let dc = DrawCall {
                primitive: v.primitive,
                first_vertex: v.first_vertex,
                vertex_count: v.vertex_count,
                first_index: v.first_index,
                index_count: v.index_count,
                index_format: if v.index_count > 0 { format } else { None },
                instances: 1,
            };

            self.visitor.draw(&dc)?;
        }

        if let Some(batch) = self
            .objects
            .geometry_buffers
            .get_mut(buffer)
            .and_then(|v| v.immediate_mut())
        {
            batch.clear_queue();
        }

        debug!("Flushed {} immediate primitives.", flush.primitives.len());
        Ok(())
    }
}

impl Session {
    /// Records the primitives drawn from now on into `buffer`, which the bound state
    /// writes through its feedback outputs.
    pub fn begin_capture(
        &mut self,
        primitive: Primitive,
        buffer: GeometryBufferHandle,
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let (handle, state) = bound_state(&s.objects, s.state)?;
            if state.feedback().is_empty() {
                bail_format!(InvalidOperation, "{} has no feedback outputs.", handle);
            }

            let id = {
                let v = s
                    .objects
                    .geometry_buffers
                    .get(buffer)
                    .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

                v.vertex_buffer().ok_or_else(|| {
                    err_format!(InvalidObject, "{} has no renderer resources.", buffer)
                })?
            };

            let query = s.visitor.create_query(QueryKind::PrimitivesWritten)?;
            if let Err(err) = s.visitor.begin_capture(primitive, id, query) {
                if let Err(cleanup) = s.visitor.delete_query(query) {
                    warn!("Failed to delete capture query: {}", cleanup);
                }
                return Err(err);
            }

            s.objects.add_ref(Object::GeometryBuffer(buffer))?;
            s.capture = Some(Capture { buffer, query });
            s.stage = Stage::Capture;
            Ok(())
        })
    }

    /// Stops capturing and returns the number of primitives written, `None` if the
    /// count was not available within `mode`.
    pub fn end_capture(&mut self, mode: QueryWait) -> Result<Option<u64>> {
        self.tracked(move |s| {
            s.expect_stage(&[Stage::Capture])?;
            s.expect_immediate(false)?;

            let capture = s
                .capture
                .take()
                .ok_or_else(|| err_format!(InvalidState, "No capture is running."))?;

            s.stage = Stage::RendererReady;
            let result = match s.visitor.end_capture() {
                Ok(()) => wait(&mut *s.visitor, capture.query, mode, s.settings.spin_limit),
                Err(err) => Err(err),
            };

            if let Err(err) = s.visitor.delete_query(capture.query) {
                warn!("{}", err);
            }

            s.release_object(Object::GeometryBuffer(capture.buffer))?;
            result
        })
    }
}
