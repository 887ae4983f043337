pub use crate::backends::headless::{Command, HeadlessLog, HeadlessVisitor};
pub use crate::backends::{
    BackendInfo, Capabilities, ClearParams, ImageRegion, ShaderStage, Viewport, Visitor,
};
pub use crate::errors::{Error, ErrorKind, Result};
pub use crate::immediate::ImmediatePrimitive;
pub use crate::objects::data_buffer::{DataBufferHandle, DataBufferKind, DataBufferParams};
pub use crate::objects::framebuffer::{FrameBufferAttachment, FrameBufferHandle, FrameBufferParams};
pub use crate::objects::geometry::{GeometryHandle, GeometryParams, Primitive};
pub use crate::objects::geometry_buffer::{
    GeometryBufferHandle, GeometryBufferKind, GeometryBufferParams, IndexFormat,
    VertexComponentKind, VertexDecl,
};
pub use crate::objects::input::{InputHandle, InputParams};
pub use crate::objects::parameters::{
    ParameterValue, ParametersHandle, ParametersParams, UniformType, UniformValue,
};
pub use crate::objects::sampler::SamplerParams;
pub use crate::objects::state::{StateHandle, StateParams};
pub use crate::objects::texture::{TextureFormat, TextureHandle, TextureKind, TextureParams};
pub use crate::objects::{Object, ObjectDesc, ObjectType};
pub use crate::session::query::QueryWait;
pub use crate::session::{Session, Stage};
pub use crate::settings::{RendererParams, Settings};
