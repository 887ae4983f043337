//! Shader-visible values.
//!
//! The parameter layout of a `State` is a flat table of `ParameterSlot`s, partitioned
//! into contiguous `ParameterSet`s. Values of a dynamic set are supplied by a
//! `Parameters` object built against it, values of a static set are captured when the
//! `State` is allocated.

use cgmath::{Matrix2, Matrix3, Matrix4, Vector2, Vector3, Vector4};

use crate::backends::{Capabilities, Visitor};
use crate::errors::*;
use crate::utils::out_of_range;

use super::data_buffer::{DataBufferHandle, DataBufferKind};
use super::state::StateHandle;
use super::texture::TextureHandle;
use super::{Claim, GpuObject, Object, ObjectType, Objects};

impl_handle!(ParametersHandle);

/// Uniform variable type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

/// Uniform variable value. Matrices are supplied in column major order.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2([[f32; 2]; 2]),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn uniform_type(&self) -> UniformType {
        match *self {
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat2(_) => UniformType::Mat2,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vector2<f32>> for UniformValue {
    fn from(v: Vector2<f32>) -> Self {
        UniformValue::Vec2(*v.as_ref())
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vector3<f32>> for UniformValue {
    fn from(v: Vector3<f32>) -> Self {
        UniformValue::Vec3(*v.as_ref())
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Vector4<f32>> for UniformValue {
    fn from(v: Vector4<f32>) -> Self {
        UniformValue::Vec4(*v.as_ref())
    }
}

impl From<[[f32; 2]; 2]> for UniformValue {
    fn from(v: [[f32; 2]; 2]) -> Self {
        UniformValue::Mat2(v)
    }
}

impl From<Matrix2<f32>> for UniformValue {
    fn from(v: Matrix2<f32>) -> Self {
        UniformValue::Mat2(*v.as_ref())
    }
}

impl From<[[f32; 3]; 3]> for UniformValue {
    fn from(v: [[f32; 3]; 3]) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<Matrix3<f32>> for UniformValue {
    fn from(v: Matrix3<f32>) -> Self {
        UniformValue::Mat3(*v.as_ref())
    }
}

impl From<[[f32; 4]; 4]> for UniformValue {
    fn from(v: [[f32; 4]; 4]) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<Matrix4<f32>> for UniformValue {
    fn from(v: Matrix4<f32>) -> Self {
        UniformValue::Mat4(*v.as_ref())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    /// A plain uniform variable.
    Constant,
    /// A uniform block sourced from a data buffer.
    Block,
    /// A texture sampled through one of the session samplers.
    Texture,
}

/// Declares one parameter of a set, matched by name against the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub kind: ParameterKind,
    pub name: String,
    /// The element of an array-valued parameter.
    #[serde(default)]
    pub index: u32,
}

impl ParameterDecl {
    pub fn new<T: Into<String>>(kind: ParameterKind, name: T) -> Self {
        ParameterDecl {
            kind,
            name: name.into(),
            index: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterSetKind {
    /// Values are captured with the `State` and applied along with it.
    Static,
    /// Values are supplied at run time by a `Parameters` object.
    Dynamic,
}

/// A contiguous range of the parameter table of a `State`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub kind: ParameterSetKind,
    pub first: usize,
    pub onepastlast: usize,
    pub first_sampler: u32,
    pub onepastlast_sampler: u32,
    pub constant_count: u32,
}

impl ParameterSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.onepastlast - self.first
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first == self.onepastlast
    }

    /// Resolves a slot relative to this set into an index of the parameter table.
    #[inline]
    pub fn resolve(&self, slot: usize) -> Option<usize> {
        if slot < self.len() {
            Some(self.first + slot)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    pub kind: ParameterKind,
    pub name: String,
    /// The resolved backend location, `None` if the program has no such input. Texture
    /// slots store their sampler index relative to the owning set instead.
    pub location: Option<u32>,
    pub index: u32,
    /// The declared type of a constant, if the backend reported one.
    pub ty: Option<UniformType>,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Constant(UniformValue),
    Block {
        buffer: DataBufferHandle,
        offset: usize,
        size: usize,
    },
    Texture {
        /// `None` unbinds the unit.
        texture: Option<TextureHandle>,
        sampler: usize,
    },
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match *self {
            ParameterValue::Constant(_) => ParameterKind::Constant,
            ParameterValue::Block { .. } => ParameterKind::Block,
            ParameterValue::Texture { .. } => ParameterKind::Texture,
        }
    }

    /// The references this value holds while it is stored.
    pub fn claims(&self) -> Vec<Claim> {
        match *self {
            ParameterValue::Constant(_) => Vec::new(),
            ParameterValue::Block { buffer, .. } => {
                vec![Claim::Object(Object::DataBuffer(buffer))]
            }
            ParameterValue::Texture { texture, sampler } => {
                let mut claims = vec![Claim::Sampler(sampler)];
                if let Some(texture) = texture {
                    claims.push(Claim::Object(Object::Texture(texture)));
                }
                claims
            }
        }
    }

    /// Checks the value against the slot it is going to be stored into.
    pub fn validate(
        &self,
        slot: &ParameterSlot,
        objects: &Objects,
        caps: &Capabilities,
    ) -> Result<()> {
        if self.kind() != slot.kind {
            bail_format!(
                InvalidOperation,
                "Parameter \"{}\" takes {:?} values, got {:?}.",
                slot.name,
                slot.kind,
                self.kind()
            );
        }

        match *self {
            ParameterValue::Constant(v) => {
                if let Some(ty) = slot.ty {
                    if ty != v.uniform_type() {
                        bail_format!(
                            InvalidEnum,
                            "Parameter \"{}\" is {:?}, got {:?}.",
                            slot.name,
                            ty,
                            v.uniform_type()
                        );
                    }
                }
            }
            ParameterValue::Block {
                buffer,
                offset,
                size,
            } => {
                let v = objects
                    .data_buffers
                    .get(buffer)
                    .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", buffer))?;

                if v.params().kind != DataBufferKind::Uniform {
                    bail_format!(InvalidObject, "{} is not a uniform buffer.", buffer);
                }

                if size == 0 || out_of_range(offset, size, v.size()) {
                    bail_format!(InvalidValue, "Block range is out of {}.", buffer);
                }

                if caps.ubo_alignment > 0 && offset % caps.ubo_alignment as usize != 0 {
                    bail_format!(
                        InvalidValue,
                        "Block offset {} is not aligned to {} bytes.",
                        offset,
                        caps.ubo_alignment
                    );
                }
            }
            ParameterValue::Texture { texture, sampler } => {
                if let Some(texture) = texture {
                    if !objects.textures.contains(texture) {
                        bail_format!(InvalidObject, "{} is not alive.", texture);
                    }
                }

                if sampler >= objects.samplers.len() {
                    bail_format!(InvalidValue, "Sampler {} does not exist.", sampler);
                }
            }
        }

        Ok(())
    }
}

/// The values stored for one parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametersState {
    set: usize,
    values: Vec<Option<ParameterValue>>,
}

impl ParametersState {
    /// Checks and stores `values`, which are either empty or one per slot of the set.
    pub fn new(
        set: usize,
        layout: &ParameterSet,
        slots: &[ParameterSlot],
        values: &[ParameterValue],
        objects: &Objects,
        caps: &Capabilities,
    ) -> Result<Self> {
        if !values.is_empty() && values.len() != layout.len() {
            bail_format!(
                InvalidValue,
                "Parameter set {} has {} slots, got {} values.",
                set,
                layout.len(),
                values.len()
            );
        }

        let mut state = ParametersState {
            set,
            values: vec![None; layout.len()],
        };

        for (i, v) in values.iter().enumerate() {
            // A value of the wrong kind is a malformed descriptor here.
            v.validate(&slots[layout.first + i], objects, caps)
                .map_err(|err| match err {
                    Error::InvalidOperation(text) => Error::InvalidValue(text),
                    err => err,
                })?;
            state.values[i] = Some(*v);
        }

        Ok(state)
    }

    #[inline]
    pub fn set(&self) -> usize {
        self.set
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&ParameterValue> {
        self.values.get(slot).and_then(|v| v.as_ref())
    }

    /// Stores `value` and returns the one it replaces.
    #[inline]
    pub fn replace(&mut self, slot: usize, value: ParameterValue) -> Option<ParameterValue> {
        self.values[slot].replace(value)
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.values.iter().flatten().flat_map(|v| v.claims()).collect()
    }

    /// Applies every stored value of the set.
    pub fn apply(
        &self,
        visitor: &mut dyn Visitor,
        objects: &Objects,
        layout: &ParameterSet,
        slots: &[ParameterSlot],
    ) -> Result<()> {
        for (i, v) in self.values.iter().enumerate() {
            if let Some(ref v) = *v {
                apply_value(visitor, objects, layout, &slots[layout.first + i], v)?;
            }
        }

        Ok(())
    }
}

/// Sends a single parameter value to the backend.
pub fn apply_value(
    visitor: &mut dyn Visitor,
    objects: &Objects,
    layout: &ParameterSet,
    slot: &ParameterSlot,
    value: &ParameterValue,
) -> Result<()> {
    let location = match slot.location {
        Some(location) => location,
        None => return Ok(()),
    };

    match *value {
        ParameterValue::Constant(ref v) => visitor.set_uniform(location, slot.index, v),
        ParameterValue::Block {
            buffer,
            offset,
            size,
        } => {
            let id = objects
                .data_buffers
                .get(buffer)
                .and_then(|v| v.id())
                .ok_or_else(|| {
                    err_format!(InvalidObject, "{} has no renderer resources.", buffer)
                })?;

            visitor.bind_uniform_block(location, id, offset, size)
        }
        ParameterValue::Texture { texture, sampler } => {
            let unit = layout.first_sampler + location;
            let id = match texture {
                Some(texture) => {
                    let v = objects.textures.get(texture).ok_or_else(|| {
                        err_format!(InvalidObject, "{} is not alive.", texture)
                    })?;

                    v.id()
                }
                None => None,
            };

            visitor.bind_texture(unit, id, objects.samplers.id(sampler))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersParams {
    pub state: StateHandle,
    pub set: usize,
    /// Either empty, or one value per slot of the set.
    #[serde(default)]
    pub values: Vec<ParameterValue>,
}

/// Runtime values of one dynamic parameter set of a `State`.
#[derive(Debug)]
pub struct Parameters {
    state: StateHandle,
    values: ParametersState,
    alive: bool,
}

impl Parameters {
    pub fn allocate(
        objects: &Objects,
        caps: &Capabilities,
        params: &ParametersParams,
    ) -> Result<Self> {
        let state = objects
            .states
            .get(params.state)
            .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", params.state))?;

        let layout = state.set(params.set)?;
        if layout.kind == ParameterSetKind::Static {
            bail_format!(
                InvalidOperation,
                "Parameter set {} is static and takes its values from the state.",
                params.set
            );
        }

        let values = ParametersState::new(
            params.set,
            layout,
            state.parameter_slots(),
            &params.values,
            objects,
            caps,
        )?;

        Ok(Parameters {
            state: params.state,
            values,
            alive: true,
        })
    }

    #[inline]
    pub fn state(&self) -> StateHandle {
        self.state
    }

    #[inline]
    pub fn set(&self) -> usize {
        self.values.set()
    }

    #[inline]
    pub fn values(&self) -> &ParametersState {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut ParametersState {
        &mut self.values
    }

    /// References held on creation: the state and the stored values.
    pub fn claims(&self) -> Vec<Claim> {
        let mut claims = vec![Claim::Object(Object::State(self.state))];
        claims.extend(self.values.claims());
        claims
    }
}

impl GpuObject for Parameters {
    const TYPE: ObjectType = ObjectType::Parameters;

    fn release_renderer_resources(&mut self, _: &mut dyn Visitor) -> Vec<Claim> {
        if !self.alive {
            return Vec::new();
        }

        self.alive = false;
        self.claims()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve() {
        let sets = [
            ParameterSet {
                kind: ParameterSetKind::Dynamic,
                first: 0,
                onepastlast: 3,
                first_sampler: 0,
                onepastlast_sampler: 1,
                constant_count: 2,
            },
            ParameterSet {
                kind: ParameterSetKind::Dynamic,
                first: 3,
                onepastlast: 5,
                first_sampler: 1,
                onepastlast_sampler: 1,
                constant_count: 2,
            },
        ];

        assert_eq!(sets[0].resolve(2), Some(2));
        assert_eq!(sets[1].resolve(1), Some(4));
        assert_eq!(sets[1].resolve(2), None);
    }

    #[test]
    fn conversions() {
        let v: UniformValue = Vector3::new(1.0, 2.0, 3.0).into();
        assert_eq!(v, UniformValue::Vec3([1.0, 2.0, 3.0]));

        let v: UniformValue = Matrix2::new(1.0, 2.0, 3.0, 4.0).into();
        assert_eq!(v, UniformValue::Mat2([[1.0, 2.0], [3.0, 4.0]]));
        assert_eq!(v.uniform_type(), UniformType::Mat2);
    }
}
