//! The reference-counted object model.
//!
//! Every GPU-visible resource is addressed by a typed handle into a per-kind pool. A
//! record is created with one reference owned by the caller, and destroyed when the
//! last reference is released. Objects that depend on other objects (a `State` on its
//! static geometry buffers, a `FrameBuffer` on its textures, etc.) hold a `Claim` on
//! them, which is one reference released along with the dependent object.
//!
//! Bindings made through the `Session` (the bound state, input and parameters) never
//! add references.

pub mod data_buffer;
pub mod framebuffer;
pub mod geometry;
pub mod geometry_buffer;
pub mod input;
pub mod parameters;
pub mod registry;
pub mod sampler;
pub mod state;
pub mod texture;

use std::fmt;

use crate::backends::Visitor;
use crate::errors::*;
use crate::utils::prelude::HandleLike;

use self::data_buffer::{DataBuffer, DataBufferHandle, DataBufferParams};
use self::framebuffer::{FrameBuffer, FrameBufferHandle, FrameBufferParams};
use self::geometry::{Geometry, GeometryHandle, GeometryParams};
use self::geometry_buffer::{GeometryBuffer, GeometryBufferHandle, GeometryBufferParams};
use self::input::{Input, InputHandle, InputParams};
use self::parameters::{Parameters, ParametersHandle, ParametersParams};
use self::registry::{RefPool, Released};
use self::sampler::SamplerTable;
use self::state::{State, StateHandle, StateParams};
use self::texture::{Texture, TextureHandle, TextureParams};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Geometry,
    GeometryBuffer,
    DataBuffer,
    Texture,
    FrameBuffer,
    State,
    Input,
    Parameters,
}

/// A handle to any kind of object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Object {
    Geometry(GeometryHandle),
    GeometryBuffer(GeometryBufferHandle),
    DataBuffer(DataBufferHandle),
    Texture(TextureHandle),
    FrameBuffer(FrameBufferHandle),
    State(StateHandle),
    Input(InputHandle),
    Parameters(ParametersHandle),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match *self {
            Object::Geometry(_) => ObjectType::Geometry,
            Object::GeometryBuffer(_) => ObjectType::GeometryBuffer,
            Object::DataBuffer(_) => ObjectType::DataBuffer,
            Object::Texture(_) => ObjectType::Texture,
            Object::FrameBuffer(_) => ObjectType::FrameBuffer,
            Object::State(_) => ObjectType::State,
            Object::Input(_) => ObjectType::Input,
            Object::Parameters(_) => ObjectType::Parameters,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Object::Geometry(h) => write!(f, "{}", h),
            Object::GeometryBuffer(h) => write!(f, "{}", h),
            Object::DataBuffer(h) => write!(f, "{}", h),
            Object::Texture(h) => write!(f, "{}", h),
            Object::FrameBuffer(h) => write!(f, "{}", h),
            Object::State(h) => write!(f, "{}", h),
            Object::Input(h) => write!(f, "{}", h),
            Object::Parameters(h) => write!(f, "{}", h),
        }
    }
}

macro_rules! impl_object_from {
    ($handle:ident, $variant:ident) => {
        impl From<$handle> for Object {
            fn from(handle: $handle) -> Self {
                Object::$variant(handle)
            }
        }
    };
}

impl_object_from!(GeometryHandle, Geometry);
impl_object_from!(GeometryBufferHandle, GeometryBuffer);
impl_object_from!(DataBufferHandle, DataBuffer);
impl_object_from!(TextureHandle, Texture);
impl_object_from!(FrameBufferHandle, FrameBuffer);
impl_object_from!(StateHandle, State);
impl_object_from!(InputHandle, Input);
impl_object_from!(ParametersHandle, Parameters);

/// The descriptor of any kind of object, consumed by `Session::create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectDesc {
    Geometry(GeometryParams),
    GeometryBuffer(GeometryBufferParams),
    DataBuffer(DataBufferParams),
    Texture(TextureParams),
    FrameBuffer(FrameBufferParams),
    State(StateParams),
    Input(InputParams),
    Parameters(ParametersParams),
}

impl ObjectDesc {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn object_type(&self) -> ObjectType {
        match *self {
            ObjectDesc::Geometry(_) => ObjectType::Geometry,
            ObjectDesc::GeometryBuffer(_) => ObjectType::GeometryBuffer,
            ObjectDesc::DataBuffer(_) => ObjectType::DataBuffer,
            ObjectDesc::Texture(_) => ObjectType::Texture,
            ObjectDesc::FrameBuffer(_) => ObjectType::FrameBuffer,
            ObjectDesc::State(_) => ObjectType::State,
            ObjectDesc::Input(_) => ObjectType::Input,
            ObjectDesc::Parameters(_) => ObjectType::Parameters,
        }
    }
}

/// One reference held by an object on something else.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Claim {
    Object(Object),
    /// A session sampler, by index.
    Sampler(usize),
}

pub trait GpuObject {
    const TYPE: ObjectType;

    /// Destroys whatever the object created on the backend and hands back the claims
    /// it holds. Calling it a second time does nothing and returns no claims.
    fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Claim>;
}

/// The pools of every object kind.
#[derive(Default)]
pub struct Objects {
    pub geometries: RefPool<GeometryHandle, Geometry>,
    pub geometry_buffers: RefPool<GeometryBufferHandle, GeometryBuffer>,
    pub data_buffers: RefPool<DataBufferHandle, DataBuffer>,
    pub textures: RefPool<TextureHandle, Texture>,
    pub framebuffers: RefPool<FrameBufferHandle, FrameBuffer>,
    pub states: RefPool<StateHandle, State>,
    pub inputs: RefPool<InputHandle, Input>,
    pub parameters: RefPool<ParametersHandle, Parameters>,
    pub samplers: SamplerTable,
}

macro_rules! dispatch {
    ($objects:expr, $object:expr, |$pool:ident, $handle:ident| $body:expr) => {
        match $object {
            Object::Geometry($handle) => {
                let $pool = &$objects.geometries;
                $body
            }
            Object::GeometryBuffer($handle) => {
                let $pool = &$objects.geometry_buffers;
                $body
            }
            Object::DataBuffer($handle) => {
                let $pool = &$objects.data_buffers;
                $body
            }
            Object::Texture($handle) => {
                let $pool = &$objects.textures;
                $body
            }
            Object::FrameBuffer($handle) => {
                let $pool = &$objects.framebuffers;
                $body
            }
            Object::State($handle) => {
                let $pool = &$objects.states;
                $body
            }
            Object::Input($handle) => {
                let $pool = &$objects.inputs;
                $body
            }
            Object::Parameters($handle) => {
                let $pool = &$objects.parameters;
                $body
            }
        }
    };
}

macro_rules! dispatch_mut {
    ($objects:expr, $object:expr, |$pool:ident, $handle:ident| $body:expr) => {
        match $object {
            Object::Geometry($handle) => {
                let $pool = &mut $objects.geometries;
                $body
            }
            Object::GeometryBuffer($handle) => {
                let $pool = &mut $objects.geometry_buffers;
                $body
            }
            Object::DataBuffer($handle) => {
                let $pool = &mut $objects.data_buffers;
                $body
            }
            Object::Texture($handle) => {
                let $pool = &mut $objects.textures;
                $body
            }
            Object::FrameBuffer($handle) => {
                let $pool = &mut $objects.framebuffers;
                $body
            }
            Object::State($handle) => {
                let $pool = &mut $objects.states;
                $body
            }
            Object::Input($handle) => {
                let $pool = &mut $objects.inputs;
                $body
            }
            Object::Parameters($handle) => {
                let $pool = &mut $objects.parameters;
                $body
            }
        }
    };
}

/// Drops one reference of `handle`. Returns the remaining count, and the claims of the
/// record if it was disposed.
fn release_in<H, T>(
    pool: &mut RefPool<H, T>,
    visitor: &mut dyn Visitor,
    handle: H,
) -> Result<(u32, Vec<Claim>)>
where
    H: HandleLike + fmt::Display,
    T: GpuObject,
{
    match pool.release(handle) {
        Some(Released::Alive(rc)) => Ok((rc, Vec::new())),
        Some(Released::Disposed(mut value)) => {
            let claims = value.release_renderer_resources(visitor);
            info!("{:?} object destroyed.", T::TYPE);
            Ok((0, claims))
        }
        None => Err(err_format!(InvalidObject, "{} is not alive.", handle)),
    }
}

fn collect_claims<H, T>(
    pool: &mut RefPool<H, T>,
    visitor: &mut dyn Visitor,
    claims: &mut Vec<Claim>,
)
where
    H: HandleLike,
    T: GpuObject,
{
    for v in pool.values_mut() {
        claims.extend(v.release_renderer_resources(visitor));
    }
}

impl Objects {
    pub fn new() -> Self {
        Objects::default()
    }

    #[inline]
    pub fn is_alive(&self, object: Object) -> bool {
        dispatch!(self, object, |pool, h| pool.contains(h))
    }

    #[inline]
    pub fn ref_count(&self, object: Object) -> Option<u32> {
        dispatch!(self, object, |pool, h| pool.ref_count(h))
    }

    /// The number of live objects of every kind.
    pub fn len(&self) -> usize {
        self.geometries.len()
            + self.geometry_buffers.len()
            + self.data_buffers.len()
            + self.textures.len()
            + self.framebuffers.len()
            + self.states.len()
            + self.inputs.len()
            + self.parameters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_ref(&mut self, object: Object) -> Result<u32> {
        dispatch_mut!(self, object, |pool, h| pool.add_ref(h))
            .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", object))
    }

    /// Adds the references listed in `claims`. Nothing is added unless every claimed
    /// object is alive.
    pub fn acquire(&mut self, claims: &[Claim]) -> Result<()> {
        for v in claims {
            match *v {
                Claim::Object(object) => {
                    if !self.is_alive(object) {
                        bail_format!(InvalidObject, "{} is not alive.", object);
                    }
                }
                Claim::Sampler(index) => {
                    if index >= self.samplers.len() {
                        bail_format!(InvalidValue, "Sampler {} does not exist.", index);
                    }
                }
            }
        }

        for v in claims {
            match *v {
                Claim::Object(object) => {
                    self.add_ref(object)?;
                }
                Claim::Sampler(index) => self.samplers.add_ref(index)?,
            }
        }

        Ok(())
    }

    /// Drops one reference of `object`, destroying it and cascading into its claims when
    /// it was the last one. Every destroyed object is appended to `destroyed`.
    pub fn release(
        &mut self,
        visitor: &mut dyn Visitor,
        object: Object,
        destroyed: &mut Vec<Object>,
    ) -> Result<u32> {
        let (rc, claims) = dispatch_mut!(self, object, |pool, h| release_in(pool, visitor, h))?;

        if rc == 0 {
            destroyed.push(object);
            self.release_claims(visitor, claims, destroyed);
        }

        Ok(rc)
    }

    /// Drops the references listed in `claims`.
    pub fn release_claims(
        &mut self,
        visitor: &mut dyn Visitor,
        claims: Vec<Claim>,
        destroyed: &mut Vec<Object>,
    ) {
        for v in claims {
            match v {
                Claim::Object(object) => {
                    if let Err(err) = self.release(visitor, object, destroyed) {
                        warn!("Dangling claim on {}: {}", object, err);
                    }
                }
                Claim::Sampler(index) => self.samplers.release(index),
            }
        }
    }

    /// Destroys the backend resources of every live object. The records stay alive
    /// until their references are dropped, which then finds nothing left to destroy.
    pub fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Object> {
        let mut claims = Vec::new();
        collect_claims(&mut self.parameters, visitor, &mut claims);
        collect_claims(&mut self.inputs, visitor, &mut claims);
        collect_claims(&mut self.states, visitor, &mut claims);
        collect_claims(&mut self.framebuffers, visitor, &mut claims);
        collect_claims(&mut self.geometries, visitor, &mut claims);
        collect_claims(&mut self.geometry_buffers, visitor, &mut claims);
        collect_claims(&mut self.data_buffers, visitor, &mut claims);
        collect_claims(&mut self.textures, visitor, &mut claims);

        let mut destroyed = Vec::new();
        self.release_claims(visitor, claims, &mut destroyed);
        self.samplers.release_renderer_resources(visitor);
        destroyed
    }
}
