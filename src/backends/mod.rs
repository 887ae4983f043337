//! The backend of the rendering layer, which should be responsible for only one thing:
//! talking to a native graphics API.
//!
//! Everything above this module is backend-neutral. A native implementation receives
//! opaque `BackendId`s for the resources it creates and is never asked to validate
//! anything the layer above could check itself.

pub mod headless;

use cgmath::Vector2;

use crate::errors::*;
use crate::objects::geometry::Primitive;
use crate::objects::geometry_buffer::{IndexFormat, VertexComponentKind};
use crate::objects::parameters::{UniformType, UniformValue};
use crate::objects::sampler::SamplerParams;
use crate::objects::state::{BlendParameters, ColorMask, DepthStencilState, RasterizerState};
use crate::objects::texture::{TextureFormat, TextureParams};
use crate::settings::RendererParams;
use crate::MAX_COLOR_TARGETS;

/// An opaque name of a native resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub u32);

/// What the backend is able to do, reported once the renderer is created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub max_active_attribs: u32,
    pub max_texture_units: u32,
    pub max_draw_buffers: u32,
    pub max_texture_size: u32,
    pub max_3d_texture_size: u32,
    pub max_array_texture_layers: u32,
    pub max_ubo_size: u32,
    pub ubo_alignment: u32,
    pub multi_bind: bool,
    pub multi_blend: bool,
    pub texture_srgb: bool,
    pub texture_float: bool,
    pub texture_depth: bool,
    pub texture_depthstencil: bool,
    pub copy_image: bool,
    pub sparse_texture: bool,
    pub sparse_buffer: bool,
    pub sparse_buffer_page_size: u32,
    /// Frame buffers without any attachment are allowed.
    pub no_attachments: bool,
}

/// The format of the native render target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    pub color: TextureFormat,
    pub depth_stencil: Option<TextureFormat>,
    pub multisample: u32,
}

impl PixelFormat {
    #[inline]
    pub fn srgb(&self) -> bool {
        self.color.is_srgb()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub capabilities: Capabilities,
    pub pixel_format: PixelFormat,
    pub size: Vector2<u32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    Storage,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
}

/// Everything besides compiled units the backend needs to finalize a program.
#[derive(Debug, Clone, Copy)]
pub struct LinkParams<'a> {
    /// Varyings recorded by stream output, in buffer order.
    pub feedback: &'a [String],
    /// Fragment outputs with explicit color target locations.
    pub outputs: &'a [(String, u32)],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedVariable {
    pub name: String,
    pub location: u32,
    /// Array size, 1 for plain variables.
    pub size: u32,
    /// `None` for types this layer does not model (samplers, blocks, integer vectors).
    pub ty: Option<UniformType>,
}

/// The active inputs of a linked program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reflection {
    pub attributes: Vec<ReflectedVariable>,
    pub uniforms: Vec<ReflectedVariable>,
    pub samplers: Vec<ReflectedVariable>,
    pub blocks: Vec<ReflectedVariable>,
}

impl Reflection {
    fn find<'a>(vars: &'a [ReflectedVariable], name: &str) -> Option<&'a ReflectedVariable> {
        vars.iter().find(|v| v.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&ReflectedVariable> {
        Self::find(&self.attributes, name)
    }

    pub fn uniform(&self, name: &str) -> Option<&ReflectedVariable> {
        Self::find(&self.uniforms, name)
    }

    pub fn sampler(&self, name: &str) -> Option<&ReflectedVariable> {
        Self::find(&self.samplers, name)
    }

    pub fn block(&self, name: &str) -> Option<&ReflectedVariable> {
        Self::find(&self.blocks, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub kind: VertexComponentKind,
    pub offset: u32,
}

/// One vertex stream of the fixed input description of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBinding {
    pub slot: u32,
    pub stride: u32,
    pub divisor: u32,
    /// The statically bound vertex buffer, `None` for slots bound at run time.
    pub buffer: Option<BackendId>,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLayout {
    pub bindings: Vec<VertexBinding>,
    /// The index buffer of the statically bound primary slot.
    pub index_buffer: Option<BackendId>,
}

/// A run-time vertex stream binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub slot: u32,
    pub buffer: BackendId,
    pub stride: u32,
    pub divisor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    Texture {
        id: BackendId,
        level: u32,
        slice: u32,
    },
    Renderbuffer(BackendId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBufferLayout {
    pub width: u32,
    pub height: u32,
    pub colors: [Option<AttachmentTarget>; MAX_COLOR_TARGETS],
    pub depth_stencil: Option<AttachmentTarget>,
}

/// Backend-neutral fixed-function state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedState {
    pub rasterizer: RasterizerState,
    /// Effective blend parameters per color target.
    pub blend: [BlendParameters; MAX_COLOR_TARGETS],
    pub write_mask: ColorMask,
    pub depth_stencil: DepthStencilState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub primitive: Primitive,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub first_index: u32,
    /// Zero for non-indexed draws.
    pub index_count: u32,
    pub index_format: Option<IndexFormat>,
    pub instances: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryKind {
    TimeElapsed,
    Timestamp,
    PrimitivesWritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearParams {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

/// A rectangle in backend coordinates, with its origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageRegion {
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

pub trait Visitor {
    /// Brings up the system stage. Failing here leaves the session not ready.
    fn initialize(&mut self) -> Result<()>;

    fn create_renderer(&mut self, params: &RendererParams) -> Result<BackendInfo>;

    fn destroy_renderer(&mut self) -> Result<()>;

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BackendId>;

    fn update_buffer(&mut self, id: BackendId, offset: usize, bytes: &[u8]) -> Result<()>;

    fn delete_buffer(&mut self, id: BackendId) -> Result<()>;

    fn create_texture(&mut self, params: &TextureParams) -> Result<BackendId>;

    fn build_mips(&mut self, id: BackendId) -> Result<()>;

    fn delete_texture(&mut self, id: BackendId) -> Result<()>;

    fn create_renderbuffer(
        &mut self,
        format: TextureFormat,
        dimensions: Vector2<u32>,
        multisample: u32,
    ) -> Result<BackendId>;

    fn delete_renderbuffer(&mut self, id: BackendId) -> Result<()>;

    fn create_framebuffer(&mut self, layout: &FrameBufferLayout) -> Result<BackendId>;

    /// Makes the frame buffer current, `None` restores the native render target.
    fn bind_framebuffer(&mut self, id: Option<BackendId>, srgb: bool) -> Result<()>;

    fn delete_framebuffer(&mut self, id: BackendId) -> Result<()>;

    fn create_sampler(&mut self, params: &SamplerParams) -> Result<BackendId>;

    fn delete_sampler(&mut self, id: BackendId) -> Result<()>;

    /// Compiles the sources of one stage. Diagnostics are returned as plain text.
    fn compile(
        &mut self,
        stage: ShaderStage,
        sources: &[String],
    ) -> ::std::result::Result<BackendId, String>;

    /// Links compiled units into a program. Units are consumed either way.
    fn link(
        &mut self,
        units: &[BackendId],
        params: LinkParams,
    ) -> ::std::result::Result<BackendId, String>;

    fn delete_shader(&mut self, unit: BackendId) -> Result<()>;

    fn reflect(&mut self, program: BackendId) -> Result<Reflection>;

    /// Routes the sampler uniform at `location` to texture `unit`.
    fn bind_sampler_unit(&mut self, program: BackendId, location: u32, unit: u32) -> Result<()>;

    fn delete_program(&mut self, program: BackendId) -> Result<()>;

    fn create_input_layout(&mut self, program: BackendId, layout: &InputLayout)
        -> Result<BackendId>;

    fn delete_input_layout(&mut self, id: BackendId) -> Result<()>;

    fn apply_pipeline(
        &mut self,
        program: BackendId,
        layout: Option<BackendId>,
        state: &FixedState,
    ) -> Result<()>;

    fn set_uniform(&mut self, location: u32, index: u32, value: &UniformValue) -> Result<()>;

    fn bind_uniform_block(
        &mut self,
        location: u32,
        buffer: BackendId,
        offset: usize,
        size: usize,
    ) -> Result<()>;

    fn bind_texture(
        &mut self,
        unit: u32,
        texture: Option<BackendId>,
        sampler: Option<BackendId>,
    ) -> Result<()>;

    fn bind_vertex_buffers(
        &mut self,
        streams: &[VertexBufferBinding],
        indices: Option<BackendId>,
    ) -> Result<()>;

    fn set_stencil_reference(&mut self, reference: u32) -> Result<()>;

    fn set_blend_color(&mut self, color: [f32; 4]) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn clear(&mut self, params: ClearParams) -> Result<()>;

    fn display(&mut self) -> Result<()>;

    fn draw(&mut self, dc: &DrawCall) -> Result<()>;

    fn copy_buffer(
        &mut self,
        src: BackendId,
        dst: BackendId,
        read_offset: usize,
        write_offset: usize,
        size: usize,
    ) -> Result<()>;

    /// Only called when `Capabilities::copy_image` is reported.
    fn copy_image(
        &mut self,
        _src: BackendId,
        _src_region: ImageRegion,
        _dst: BackendId,
        _dst_region: ImageRegion,
    ) -> Result<()> {
        bail_format!(Unimplemented, "Image copies are not supported by this backend.");
    }

    /// Only called when `Capabilities::sparse_buffer` is reported.
    fn commit_buffer_pages(
        &mut self,
        _id: BackendId,
        _offset: usize,
        _size: usize,
        _commit: bool,
    ) -> Result<()> {
        bail_format!(Unimplemented, "Sparse buffers are not supported by this backend.");
    }

    /// Only called when `Capabilities::sparse_texture` is reported.
    fn commit_texture_pages(
        &mut self,
        _id: BackendId,
        _region: ImageRegion,
        _commit: bool,
    ) -> Result<()> {
        bail_format!(Unimplemented, "Sparse textures are not supported by this backend.");
    }

    fn create_query(&mut self, kind: QueryKind) -> Result<BackendId>;

    fn begin_query(&mut self, query: BackendId) -> Result<()>;

    fn end_query(&mut self, query: BackendId) -> Result<()>;

    /// Records the GPU time into `query` once all previous commands are done.
    fn timestamp(&mut self, query: BackendId) -> Result<()>;

    /// Returns the result of `query` if it is available, without waiting.
    fn poll_query(&mut self, query: BackendId) -> Result<Option<u64>>;

    fn delete_query(&mut self, query: BackendId) -> Result<()>;

    fn begin_capture(&mut self, primitive: Primitive, buffer: BackendId, query: BackendId)
        -> Result<()>;

    fn end_capture(&mut self) -> Result<()>;
}

/// Creates the headless backend, which accepts every request and renders nothing.
pub fn new_headless() -> Box<dyn Visitor> {
    Box::new(self::headless::HeadlessVisitor::new())
}
