use crate::backends::{VertexBufferBinding, Visitor};
use crate::errors::*;

use super::geometry_buffer::GeometryBufferHandle;
use super::state::{SlotKind, StateHandle};
use super::{Claim, GpuObject, Object, ObjectType, Objects};

impl_handle!(InputHandle);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParams {
    pub state: StateHandle,
    /// Buffers bound to the dynamic slots of the state, by slot index.
    pub bindings: Vec<(usize, GeometryBufferHandle)>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub slot: usize,
    pub buffer: GeometryBufferHandle,
    pub stride: u32,
    pub divisor: u32,
}

/// Run-time buffers of the dynamic input slots of a `State`.
#[derive(Debug)]
pub struct Input {
    state: StateHandle,
    bindings: Vec<InputBinding>,
    primary: Option<GeometryBufferHandle>,
    claims: Vec<Claim>,
}

impl Input {
    pub fn allocate(objects: &Objects, params: &InputParams) -> Result<Self> {
        let state = objects
            .states
            .get(params.state)
            .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", params.state))?;

        let mut input = Input {
            state: params.state,
            bindings: Vec::new(),
            primary: state.primary_buffer(),
            claims: vec![Claim::Object(Object::State(params.state))],
        };

        for &(slot, buffer) in &params.bindings {
            let desc = state
                .slots()
                .get(slot)
                .ok_or_else(|| err_format!(InvalidValue, "Input slot {} is undefined.", slot))?;

            if desc.kind != SlotKind::Dynamic {
                bail_format!(InvalidValue, "Input slot {} is bound statically.", slot);
            }

            if input.bindings.iter().any(|v| v.slot == slot) {
                bail_format!(InvalidValue, "Input slot {} is bound twice.", slot);
            }

            let gb = objects
                .geometry_buffers
                .get(buffer)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

            if gb.decl() != &desc.decl {
                bail_format!(
                    InvalidValue,
                    "The vertex declaration of {} does not match slot {}.",
                    buffer,
                    slot
                );
            }

            if Some(slot) == state.primary_slot() {
                input.primary = Some(buffer);
            }

            input.bindings.push(InputBinding {
                slot,
                buffer,
                stride: desc.decl.stride(),
                divisor: desc.divisor,
            });

            input.claims.push(Claim::Object(Object::GeometryBuffer(buffer)));
        }

        if input.bindings.len() != state.input_available() as usize {
            bail_format!(
                InvalidValue,
                "{} dynamic slots of {} are left unbound.",
                state.input_available() as usize - input.bindings.len(),
                params.state
            );
        }

        input.bindings.sort_by_key(|v| v.slot);
        Ok(input)
    }

    #[inline]
    pub fn state(&self) -> StateHandle {
        self.state
    }

    #[inline]
    pub fn bindings(&self) -> &[InputBinding] {
        &self.bindings
    }

    /// The buffer of the primary slot, either bound here or statically by the state.
    #[inline]
    pub fn primary_buffer(&self) -> Option<GeometryBufferHandle> {
        self.primary
    }

    #[inline]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Binds the vertex streams, and the indices of the primary buffer.
    pub fn apply(&self, visitor: &mut dyn Visitor, objects: &Objects) -> Result<()> {
        let mut streams = Vec::with_capacity(self.bindings.len());
        for v in &self.bindings {
            let buffer = objects
                .geometry_buffers
                .get(v.buffer)
                .and_then(|gb| gb.vertex_buffer())
                .ok_or_else(|| {
                    err_format!(InvalidObject, "{} has no renderer resources.", v.buffer)
                })?;

            streams.push(VertexBufferBinding {
                slot: v.slot as u32,
                buffer,
                stride: v.stride,
                divisor: v.divisor,
            });
        }

        let indices = self
            .primary
            .and_then(|h| objects.geometry_buffers.get(h))
            .and_then(|gb| gb.index_buffer());

        visitor.bind_vertex_buffers(&streams, indices)
    }
}

impl GpuObject for Input {
    const TYPE: ObjectType = ObjectType::Input;

    fn release_renderer_resources(&mut self, _: &mut dyn Visitor) -> Vec<Claim> {
        ::std::mem::replace(&mut self.claims, Vec::new())
    }
}
