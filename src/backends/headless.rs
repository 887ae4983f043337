//! A backend that renders nothing.
//!
//! Every request is accepted and recorded as a `Command` into a `HeadlessLog`, which
//! could be shared with whoever wants to inspect what the layer above asked for.
//! Shader sources are scanned line by line for GLSL-style declarations to fake a
//! reflection of the linked program.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use cgmath::Vector2;

use crate::errors::*;
use crate::objects::geometry::Primitive;
use crate::objects::parameters::{UniformType, UniformValue};
use crate::objects::sampler::SamplerParams;
use crate::objects::texture::{TextureFormat, TextureParams};
use crate::settings::RendererParams;

use super::*;

/// One request received by the headless backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Initialize,
    CreateRenderer(RendererParams),
    DestroyRenderer,
    CreateBuffer(BackendId, BufferKind, usize),
    UpdateBuffer(BackendId, usize, Vec<u8>),
    DeleteBuffer(BackendId),
    CreateTexture(BackendId, TextureParams),
    BuildMips(BackendId),
    DeleteTexture(BackendId),
    CreateRenderbuffer(BackendId, TextureFormat, Vector2<u32>, u32),
    DeleteRenderbuffer(BackendId),
    CreateFrameBuffer(BackendId, FrameBufferLayout),
    BindFrameBuffer(Option<BackendId>, bool),
    DeleteFrameBuffer(BackendId),
    CreateSampler(BackendId, SamplerParams),
    DeleteSampler(BackendId),
    Compile(BackendId, ShaderStage),
    Link(BackendId, Vec<String>),
    DeleteShader(BackendId),
    BindSamplerUnit(BackendId, u32, u32),
    DeleteProgram(BackendId),
    CreateInputLayout(BackendId, InputLayout),
    DeleteInputLayout(BackendId),
    ApplyPipeline(BackendId, Option<BackendId>, FixedState),
    SetUniform(u32, u32, UniformValue),
    BindUniformBlock(u32, BackendId, usize, usize),
    BindTexture(u32, Option<BackendId>, Option<BackendId>),
    BindVertexBuffers(Vec<VertexBufferBinding>, Option<BackendId>),
    SetStencilReference(u32),
    SetBlendColor([f32; 4]),
    SetViewport(Viewport),
    Clear(ClearParams),
    Display,
    Draw(DrawCall),
    CopyBuffer(BackendId, BackendId, usize, usize, usize),
    CopyImage(BackendId, ImageRegion, BackendId, ImageRegion),
    CommitBufferPages(BackendId, usize, usize, bool),
    CommitTexturePages(BackendId, ImageRegion, bool),
    CreateQuery(BackendId, QueryKind),
    BeginQuery(BackendId),
    EndQuery(BackendId),
    Timestamp(BackendId),
    DeleteQuery(BackendId),
    BeginCapture(Primitive, BackendId, BackendId),
    EndCapture,
}

/// The commands received so far, and the resources currently alive on the headless
/// backend.
#[derive(Debug, Default)]
pub struct HeadlessLog {
    pub commands: Vec<Command>,
    live: HashMap<BackendId, &'static str>,
}

impl HeadlessLog {
    #[inline]
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// The draw calls received, in submission order.
    pub fn draws(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|v| match *v {
                Command::Draw(dc) => Some(dc),
                _ => None,
            })
            .collect()
    }

    pub fn count<F>(&self, filter: F) -> usize
    where
        F: Fn(&Command) -> bool,
    {
        self.commands.iter().filter(|v| filter(v)).count()
    }

    /// The number of native resources created and not deleted yet.
    #[inline]
    pub fn live_resources(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_live(&self, id: BackendId) -> bool {
        self.live.contains_key(&id)
    }
}

struct Unit {
    stage: ShaderStage,
    sources: Vec<String>,
}

#[derive(Default)]
struct Query {
    kind: Option<QueryKind>,
    started: u64,
    value: Option<u64>,
    polls: u32,
}

pub struct HeadlessVisitor {
    log: Rc<RefCell<HeadlessLog>>,
    capabilities: Capabilities,
    query_latency: u32,
    next_id: u32,
    clock: u64,
    units: HashMap<BackendId, Unit>,
    programs: HashMap<BackendId, Reflection>,
    queries: HashMap<BackendId, Query>,
    capture: Option<(Primitive, BackendId)>,
    captured: u64,
}

impl Default for HeadlessVisitor {
    fn default() -> Self {
        HeadlessVisitor::new()
    }
}

impl HeadlessVisitor {
    pub fn new() -> Self {
        HeadlessVisitor::with_capabilities(HeadlessVisitor::default_capabilities())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        HeadlessVisitor {
            log: Rc::new(RefCell::new(HeadlessLog::default())),
            capabilities,
            query_latency: 0,
            next_id: 1,
            clock: 0,
            units: HashMap::new(),
            programs: HashMap::new(),
            queries: HashMap::new(),
            capture: None,
            captured: 0,
        }
    }

    /// Everything is supported, with the limits of a common desktop GPU.
    pub fn default_capabilities() -> Capabilities {
        Capabilities {
            max_active_attribs: 16,
            max_texture_units: 16,
            max_draw_buffers: 8,
            max_texture_size: 4096,
            max_3d_texture_size: 256,
            max_array_texture_layers: 256,
            max_ubo_size: 16384,
            ubo_alignment: 256,
            multi_bind: true,
            multi_blend: true,
            texture_srgb: true,
            texture_float: true,
            texture_depth: true,
            texture_depthstencil: true,
            copy_image: true,
            sparse_texture: true,
            sparse_buffer: true,
            sparse_buffer_page_size: 65536,
            no_attachments: true,
        }
    }

    /// Sets the number of polls a query answers with "not ready" before its result
    /// becomes available.
    pub fn with_query_latency(mut self, polls: u32) -> Self {
        self.query_latency = polls;
        self
    }

    /// A shared view of the commands received by this backend.
    #[inline]
    pub fn log(&self) -> Rc<RefCell<HeadlessLog>> {
        self.log.clone()
    }

    fn record(&mut self, cmd: Command) {
        self.clock += 1000;
        self.log.borrow_mut().commands.push(cmd);
    }

    fn allocate(&mut self, kind: &'static str) -> BackendId {
        let id = BackendId(self.next_id);
        self.next_id += 1;
        self.log.borrow_mut().live.insert(id, kind);
        id
    }

    fn free(&mut self, id: BackendId, kind: &'static str) -> Result<()> {
        let mut log = self.log.borrow_mut();
        if log.live.get(&id) != Some(&kind) {
            bail_format!(Backend, "{:?} is not a live {}.", id, kind);
        }

        log.live.remove(&id);
        Ok(())
    }

    fn check(&self, id: BackendId, kind: &'static str) -> Result<()> {
        match self.log.borrow().live.get(&id) {
            Some(&v) if v == kind => Ok(()),
            _ => Err(err_format!(Backend, "{:?} is not a live {}.", id, kind)),
        }
    }

    fn query_mut(&mut self, id: BackendId) -> Result<&mut Query> {
        self.queries
            .get_mut(&id)
            .ok_or_else(|| err_format!(Backend, "{:?} is not a live query.", id))
    }

    fn finish_query(&mut self, id: BackendId, value: u64) -> Result<()> {
        let latency = self.query_latency;
        let query = self.query_mut(id)?;
        query.value = Some(value);
        query.polls = latency;
        Ok(())
    }
}

impl Visitor for HeadlessVisitor {
    fn initialize(&mut self) -> Result<()> {
        self.record(Command::Initialize);
        Ok(())
    }

    fn create_renderer(&mut self, params: &RendererParams) -> Result<BackendInfo> {
        self.record(Command::CreateRenderer(*params));
        Ok(BackendInfo {
            capabilities: self.capabilities,
            pixel_format: PixelFormat {
                color: params.color_format,
                depth_stencil: params.depth_stencil_format,
                multisample: params.multisample,
            },
            size: Vector2::new(params.width, params.height),
        })
    }

    fn destroy_renderer(&mut self) -> Result<()> {
        self.record(Command::DestroyRenderer);
        Ok(())
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BackendId> {
        let id = self.allocate("buffer");
        self.record(Command::CreateBuffer(id, kind, size));
        Ok(id)
    }

    fn update_buffer(&mut self, id: BackendId, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check(id, "buffer")?;
        self.record(Command::UpdateBuffer(id, offset, bytes.to_vec()));
        Ok(())
    }

    fn delete_buffer(&mut self, id: BackendId) -> Result<()> {
        self.free(id, "buffer")?;
        self.record(Command::DeleteBuffer(id));
        Ok(())
    }

    fn create_texture(&mut self, params: &TextureParams) -> Result<BackendId> {
        let id = self.allocate("texture");
        self.record(Command::CreateTexture(id, *params));
        Ok(id)
    }

    fn build_mips(&mut self, id: BackendId) -> Result<()> {
        self.check(id, "texture")?;
        self.record(Command::BuildMips(id));
        Ok(())
    }

    fn delete_texture(&mut self, id: BackendId) -> Result<()> {
        self.free(id, "texture")?;
        self.record(Command::DeleteTexture(id));
        Ok(())
    }

    fn create_renderbuffer(
        &mut self,
        format: TextureFormat,
        dimensions: Vector2<u32>,
        multisample: u32,
    ) -> Result<BackendId> {
        let id = self.allocate("renderbuffer");
        self.record(Command::CreateRenderbuffer(id, format, dimensions, multisample));
        Ok(id)
    }

    fn delete_renderbuffer(&mut self, id: BackendId) -> Result<()> {
        self.free(id, "renderbuffer")?;
        self.record(Command::DeleteRenderbuffer(id));
        Ok(())
    }

    fn create_framebuffer(&mut self, layout: &FrameBufferLayout) -> Result<BackendId> {
        let id = self.allocate("framebuffer");
        self.record(Command::CreateFrameBuffer(id, layout.clone()));
        Ok(id)
    }

    fn bind_framebuffer(&mut self, id: Option<BackendId>, srgb: bool) -> Result<()> {
        if let Some(id) = id {
            self.check(id, "framebuffer")?;
        }

        self.record(Command::BindFrameBuffer(id, srgb));
        Ok(())
    }

    fn delete_framebuffer(&mut self, id: BackendId) -> Result<()> {
        self.free(id, "framebuffer")?;
        self.record(Command::DeleteFrameBuffer(id));
        Ok(())
    }

    fn create_sampler(&mut self, params: &SamplerParams) -> Result<BackendId> {
        let id = self.allocate("sampler");
        self.record(Command::CreateSampler(id, *params));
        Ok(id)
    }

    fn delete_sampler(&mut self, id: BackendId) -> Result<()> {
        self.free(id, "sampler")?;
        self.record(Command::DeleteSampler(id));
        Ok(())
    }

    fn compile(
        &mut self,
        stage: ShaderStage,
        sources: &[String],
    ) -> ::std::result::Result<BackendId, String> {
        for source in sources {
            if let Some(line) = source.lines().find(|v| v.trim().starts_with("#error")) {
                return Err(line.trim().to_owned());
            }
        }

        let id = self.allocate("shader");
        self.units.insert(
            id,
            Unit {
                stage,
                sources: sources.to_vec(),
            },
        );

        self.record(Command::Compile(id, stage));
        Ok(id)
    }

    fn link(
        &mut self,
        units: &[BackendId],
        params: LinkParams,
    ) -> ::std::result::Result<BackendId, String> {
        let mut reflection = Reflection::default();
        let mut missing = None;

        for id in units {
            match self.units.remove(id) {
                Some(unit) => {
                    let _ = self.free(*id, "shader");
                    for source in &unit.sources {
                        reflect(&mut reflection, unit.stage, source);
                    }
                }
                None => missing = Some(*id),
            }
        }

        if let Some(id) = missing {
            return Err(format!("{:?} is not a compiled shader.", id));
        }

        let id = self.allocate("program");
        self.programs.insert(id, reflection);
        self.record(Command::Link(id, params.feedback.to_vec()));
        Ok(id)
    }

    fn delete_shader(&mut self, unit: BackendId) -> Result<()> {
        self.units.remove(&unit);
        self.free(unit, "shader")?;
        self.record(Command::DeleteShader(unit));
        Ok(())
    }

    fn reflect(&mut self, program: BackendId) -> Result<Reflection> {
        self.programs
            .get(&program)
            .cloned()
            .ok_or_else(|| err_format!(Backend, "{:?} is not a live program.", program))
    }

    fn bind_sampler_unit(&mut self, program: BackendId, location: u32, unit: u32) -> Result<()> {
        self.check(program, "program")?;
        self.record(Command::BindSamplerUnit(program, location, unit));
        Ok(())
    }

    fn delete_program(&mut self, program: BackendId) -> Result<()> {
        self.programs.remove(&program);
        self.free(program, "program")?;
        self.record(Command::DeleteProgram(program));
        Ok(())
    }

    fn create_input_layout(
        &mut self,
        program: BackendId,
        layout: &InputLayout,
    ) -> Result<BackendId> {
        self.check(program, "program")?;
        let id = self.allocate("input layout");
        self.record(Command::CreateInputLayout(id, layout.clone()));
        Ok(id)
    }

    fn delete_input_layout(&mut self, id: BackendId) -> Result<()> {
        self.free(id, "input layout")?;
        self.record(Command::DeleteInputLayout(id));
        Ok(())
    }

    fn apply_pipeline(
        &mut self,
        program: BackendId,
        layout: Option<BackendId>,
        state: &FixedState,
    ) -> Result<()> {
        self.check(program, "program")?;
        self.record(Command::ApplyPipeline(program, layout, *state));
        Ok(())
    }

    fn set_uniform(&mut self, location: u32, index: u32, value: &UniformValue) -> Result<()> {
        self.record(Command::SetUniform(location, index, *value));
        Ok(())
    }

    fn bind_uniform_block(
        &mut self,
        location: u32,
        buffer: BackendId,
        offset: usize,
        size: usize,
    ) -> Result<()> {
        self.check(buffer, "buffer")?;
        self.record(Command::BindUniformBlock(location, buffer, offset, size));
        Ok(())
    }

    fn bind_texture(
        &mut self,
        unit: u32,
        texture: Option<BackendId>,
        sampler: Option<BackendId>,
    ) -> Result<()> {
        self.record(Command::BindTexture(unit, texture, sampler));
        Ok(())
    }

    fn bind_vertex_buffers(
        &mut self,
        streams: &[VertexBufferBinding],
        indices: Option<BackendId>,
    ) -> Result<()> {
        self.record(Command::BindVertexBuffers(streams.to_vec(), indices));
        Ok(())
    }

    fn set_stencil_reference(&mut self, reference: u32) -> Result<()> {
        self.record(Command::SetStencilReference(reference));
        Ok(())
    }

    fn set_blend_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.record(Command::SetBlendColor(color));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.record(Command::SetViewport(viewport));
        Ok(())
    }

    fn clear(&mut self, params: ClearParams) -> Result<()> {
        self.record(Command::Clear(params));
        Ok(())
    }

    fn display(&mut self) -> Result<()> {
        self.record(Command::Display);
        Ok(())
    }

    fn draw(&mut self, dc: &DrawCall) -> Result<()> {
        if let Some((primitive, _)) = self.capture {
            let vertices = if dc.index_count > 0 {
                dc.index_count
            } else {
                dc.vertex_count
            };

            self.captured += u64::from(primitive.assemble(vertices)) * u64::from(dc.instances);
        }

        self.record(Command::Draw(*dc));
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: BackendId,
        dst: BackendId,
        read_offset: usize,
        write_offset: usize,
        size: usize,
    ) -> Result<()> {
        self.check(src, "buffer")?;
        self.check(dst, "buffer")?;
        self.record(Command::CopyBuffer(src, dst, read_offset, write_offset, size));
        Ok(())
    }

    fn copy_image(
        &mut self,
        src: BackendId,
        src_region: ImageRegion,
        dst: BackendId,
        dst_region: ImageRegion,
    ) -> Result<()> {
        if !self.capabilities.copy_image {
            bail_format!(Unimplemented, "Image copies are disabled.");
        }

        self.check(src, "texture")?;
        self.check(dst, "texture")?;
        self.record(Command::CopyImage(src, src_region, dst, dst_region));
        Ok(())
    }

    fn commit_buffer_pages(
        &mut self,
        id: BackendId,
        offset: usize,
        size: usize,
        commit: bool,
    ) -> Result<()> {
        if !self.capabilities.sparse_buffer {
            bail_format!(Unimplemented, "Sparse buffers are disabled.");
        }

        self.check(id, "buffer")?;
        self.record(Command::CommitBufferPages(id, offset, size, commit));
        Ok(())
    }

    fn commit_texture_pages(
        &mut self,
        id: BackendId,
        region: ImageRegion,
        commit: bool,
    ) -> Result<()> {
        if !self.capabilities.sparse_texture {
            bail_format!(Unimplemented, "Sparse textures are disabled.");
        }

        self.check(id, "texture")?;
        self.record(Command::CommitTexturePages(id, region, commit));
        Ok(())
    }

    fn create_query(&mut self, kind: QueryKind) -> Result<BackendId> {
        let id = self.allocate("query");
        self.queries.insert(
            id,
            Query {
                kind: Some(kind),
                ..Query::default()
            },
        );

        self.record(Command::CreateQuery(id, kind));
        Ok(id)
    }

    fn begin_query(&mut self, query: BackendId) -> Result<()> {
        let clock = self.clock;
        {
            let v = self.query_mut(query)?;
            v.started = clock;
            v.value = None;
        }

        self.record(Command::BeginQuery(query));
        Ok(())
    }

    fn end_query(&mut self, query: BackendId) -> Result<()> {
        let clock = self.clock;
        let started = self.query_mut(query)?.started;
        self.finish_query(query, clock - started)?;
        self.record(Command::EndQuery(query));
        Ok(())
    }

    fn timestamp(&mut self, query: BackendId) -> Result<()> {
        let clock = self.clock;
        self.finish_query(query, clock)?;
        self.record(Command::Timestamp(query));
        Ok(())
    }

    fn poll_query(&mut self, query: BackendId) -> Result<Option<u64>> {
        let v = self.query_mut(query)?;
        if v.value.is_none() {
            return Ok(None);
        }

        if v.polls > 0 {
            v.polls -= 1;
            return Ok(None);
        }

        Ok(v.value)
    }

    fn delete_query(&mut self, query: BackendId) -> Result<()> {
        self.queries.remove(&query);
        self.free(query, "query")?;
        self.record(Command::DeleteQuery(query));
        Ok(())
    }

    fn begin_capture(
        &mut self,
        primitive: Primitive,
        buffer: BackendId,
        query: BackendId,
    ) -> Result<()> {
        self.check(buffer, "buffer")?;
        if self.query_mut(query)?.kind != Some(QueryKind::PrimitivesWritten) {
            bail_format!(Backend, "{:?} does not count written primitives.", query);
        }

        self.query_mut(query)?.value = None;
        self.capture = Some((primitive, query));
        self.captured = 0;
        self.record(Command::BeginCapture(primitive, buffer, query));
        Ok(())
    }

    fn end_capture(&mut self) -> Result<()> {
        match self.capture.take() {
            Some((_, query)) => {
                let captured = self.captured;
                self.finish_query(query, captured)?;
                self.record(Command::EndCapture);
                Ok(())
            }
            None => Err(err_format!(Backend, "No capture is running.")),
        }
    }
}

fn uniform_type(name: &str) -> Option<UniformType> {
    match name {
        "int" => Some(UniformType::Int),
        "float" => Some(UniformType::Float),
        "vec2" => Some(UniformType::Vec2),
        "vec3" => Some(UniformType::Vec3),
        "vec4" => Some(UniformType::Vec4),
        "mat2" => Some(UniformType::Mat2),
        "mat3" => Some(UniformType::Mat3),
        "mat4" => Some(UniformType::Mat4),
        _ => None,
    }
}

/// Splits `name[N]` into its name and array size.
fn array(name: &str) -> (String, u32) {
    match name.find('[') {
        Some(pos) => {
            let size = name[pos + 1..]
                .trim_end_matches(']')
                .parse()
                .unwrap_or(1);
            (name[..pos].to_owned(), size)
        }
        None => (name.to_owned(), 1),
    }
}

fn push(vars: &mut Vec<ReflectedVariable>, name: String, size: u32, ty: Option<UniformType>) {
    if vars.iter().any(|v| v.name == name) {
        return;
    }

    let location = vars.last().map(|v| v.location + v.size).unwrap_or(0);
    vars.push(ReflectedVariable {
        name,
        location,
        size,
        ty,
    });
}

/// Collects declarations like `in vec3 position;`, `uniform mat4 mvp;`,
/// `uniform sampler2D tex;` or `uniform Block {`.
fn reflect(reflection: &mut Reflection, stage: ShaderStage, source: &str) {
    for line in source.lines() {
        let mut line = line.trim();
        if line.starts_with("layout") {
            line = match line.find(')') {
                Some(pos) => line[pos + 1..].trim(),
                None => continue,
            };
        }

        let tokens: Vec<&str> = line
            .trim_end_matches(';')
            .split_whitespace()
            .filter(|v| !["lowp", "mediump", "highp", "flat"].contains(v))
            .collect();

        match tokens.as_slice() {
            ["in", ty, name, ..] | ["attribute", ty, name, ..] if stage == ShaderStage::Vertex => {
                let (name, size) = array(name);
                push(&mut reflection.attributes, name, size, uniform_type(ty));
            }
            ["uniform", name, "{", ..] => {
                push(&mut reflection.blocks, (*name).to_owned(), 1, None);
            }
            ["uniform", name] if name.ends_with('{') => {
                let name = name.trim_end_matches('{').to_owned();
                push(&mut reflection.blocks, name, 1, None);
            }
            ["uniform", ty, name, ..] if ty.starts_with("sampler") => {
                let (name, size) = array(name);
                push(&mut reflection.samplers, name, size, None);
            }
            ["uniform", ty, name, ..] => {
                let (name, size) = array(name);
                push(&mut reflection.uniforms, name, size, uniform_type(ty));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reflection() {
        let source = "
            #version 330
            layout(location = 0) in vec3 position;
            in vec2 texcoord;
            uniform highp mat4 mvp;
            uniform float weights[4];
            uniform vec4 tint;
            uniform sampler2D albedo;
            uniform Lights {
                vec4 colors[8];
            };
        ";

        let mut r = Reflection::default();
        reflect(&mut r, ShaderStage::Vertex, source);

        assert_eq!(r.attributes.len(), 2);
        assert_eq!(r.attribute("texcoord").map(|v| v.location), Some(1));
        assert_eq!(r.uniform("mvp").and_then(|v| v.ty), Some(UniformType::Mat4));
        assert_eq!(r.uniform("weights").map(|v| v.size), Some(4));
        assert_eq!(r.uniform("tint").map(|v| v.location), Some(5));
        assert_eq!(r.sampler("albedo").map(|v| v.location), Some(0));
        assert!(r.block("Lights").is_some());

        let mut r = Reflection::default();
        reflect(&mut r, ShaderStage::Fragment, source);
        assert!(r.attributes.is_empty());
    }

    #[test]
    fn compile_error() {
        let mut visitor = HeadlessVisitor::new();
        let sources = vec!["void main() {}\n  #error broken\n".to_owned()];
        let err = visitor.compile(ShaderStage::Vertex, &sources).unwrap_err();
        assert_eq!(err, "#error broken");
        assert_eq!(visitor.log().borrow().live_resources(), 0);
    }

    #[test]
    fn query_latency() {
        let mut visitor = HeadlessVisitor::new().with_query_latency(2);
        let q = visitor.create_query(QueryKind::Timestamp).unwrap();
        assert_eq!(visitor.poll_query(q).unwrap(), None);

        visitor.timestamp(q).unwrap();
        assert_eq!(visitor.poll_query(q).unwrap(), None);
        assert_eq!(visitor.poll_query(q).unwrap(), None);
        assert!(visitor.poll_query(q).unwrap().is_some());

        visitor.delete_query(q).unwrap();
        assert!(visitor.delete_query(q).is_err());
    }

    #[test]
    fn unsupported_features() {
        let caps = Capabilities {
            copy_image: false,
            sparse_buffer: false,
            sparse_texture: false,
            ..HeadlessVisitor::default_capabilities()
        };

        let mut visitor = HeadlessVisitor::with_capabilities(caps);
        let log = visitor.log();
        let buffer = visitor.create_buffer(BufferKind::Storage, 64).unwrap();
        let region = ImageRegion::default();

        let err = visitor.copy_image(buffer, region, buffer, region).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        let err = visitor.commit_buffer_pages(buffer, 0, 64, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        let err = visitor.commit_texture_pages(buffer, region, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);

        assert_eq!(log.borrow().commands.len(), 1);
    }
}
