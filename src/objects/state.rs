//! Pipeline state object that contains the compiled program, the input slots, the
//! parameter layout and the fixed-function state.

use smallvec::SmallVec;

use crate::backends::{
    BackendId, Capabilities, FixedState, InputLayout, LinkParams, Reflection, ShaderStage,
    VertexAttribute, VertexBinding, Visitor,
};
use crate::errors::*;
use crate::{MAX_COLOR_TARGETS, MAX_INPUT_SLOTS, MAX_PARAMETER_SETS};

use super::geometry_buffer::{GeometryBufferHandle, VertexDecl};
use super::parameters::{
    ParameterDecl, ParameterKind, ParameterSet, ParameterSetKind, ParameterSlot, ParameterValue,
    ParametersState, UniformType,
};
use super::texture::TextureFormat;
use super::{Claim, GpuObject, Object, ObjectType, Objects};

impl_handle!(StateHandle);

/// Specify whether front- or back-facing polygons can be culled.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum CullFace {
    Nothing,
    Front,
    Back,
}

/// Define front- and back-facing polygons.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum FrontFaceOrder {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum FillMode {
    Solid,
    Wireframe,
    Points,
}

/// A pixel-wise comparison function.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Comparison {
    Never,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Always,
}

/// Specifies how incoming RGBA values (source) and the RGBA in framebuffer (destination)
/// are combined.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Equation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend values.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum BlendValue {
    SourceColor,
    SourceAlpha,
    DestinationColor,
    DestinationAlpha,
    /// The color set with `Session::set_blend_color`.
    ConstantColor,
    ConstantAlpha,
}

/// Blend factors.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    Value(BlendValue),
    OneMinusValue(BlendValue),
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerState {
    pub fill: FillMode,
    pub cull_face: CullFace,
    pub front_face_order: FrontFaceOrder,
    pub point_size: f32,
    /// Primitives are discarded before rasterization, nothing is rendered.
    pub discard: bool,
    /// Factor and units of the depth offset.
    pub polygon_offset: Option<(f32, f32)>,
    pub multisample: bool,
    /// The minimum fraction of samples shaded per fragment.
    pub sample_shading: Option<f32>,
}

impl Default for RasterizerState {
    fn default() -> Self {
        RasterizerState {
            fill: FillMode::Solid,
            cull_face: CullFace::Nothing,
            front_face_order: FrontFaceOrder::CounterClockwise,
            point_size: 1.0,
            discard: false,
            polygon_offset: None,
            multisample: true,
            sample_shading: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendParameters {
    pub color: Option<(Equation, BlendFactor, BlendFactor)>,
    /// `None` blends alpha the way colors are blended.
    pub alpha: Option<(Equation, BlendFactor, BlendFactor)>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct ColorMask {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub alpha: bool,
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask {
            red: true,
            green: true,
            blue: true,
            alpha: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendState {
    /// Every color target takes its own parameters. Only honored if the backend
    /// supports independent blending, target 0 is used for all targets otherwise.
    pub separate: bool,
    pub targets: [BlendParameters; MAX_COLOR_TARGETS],
    pub write_mask: ColorMask,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStencilState {
    /// `None` disables depth testing.
    pub depth_test: Option<Comparison>,
    pub depth_write: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test: None,
            depth_write: false,
        }
    }
}

/// How the vertex stream of an input slot is provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSlotDesc {
    /// The slot is bound to `buffer` for the whole lifetime of the state.
    Static {
        buffer: GeometryBufferHandle,
        #[serde(default)]
        divisor: u32,
    },
    /// The slot is bound at run time through an `Input` object.
    Dynamic {
        decl: VertexDecl,
        #[serde(default)]
        divisor: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputDesc {
    /// A varying recorded by stream output, in buffer order.
    Feedback(String),
    /// A fragment output written into color target `target`.
    FrameBuffer { name: String, target: u32 },
}

/// The format a state expects at one render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFormat {
    /// The format of the render target that is active when the state is created.
    Default,
    /// The target is not written.
    Unused,
    Format(TextureFormat),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSources {
    /// Required.
    pub vertex: Vec<String>,
    pub tess_control: Vec<String>,
    pub tess_evaluation: Vec<String>,
    pub geometry: Vec<String>,
    pub fragment: Vec<String>,
}

impl ShaderSources {
    fn stages<'a>(&'a self) -> impl Iterator<Item = (ShaderStage, &'a [String])> + 'a {
        vec![
            (ShaderStage::Vertex, self.vertex.as_slice()),
            (ShaderStage::TessControl, self.tess_control.as_slice()),
            (ShaderStage::TessEvaluation, self.tess_evaluation.as_slice()),
            (ShaderStage::Geometry, self.geometry.as_slice()),
            (ShaderStage::Fragment, self.fragment.as_slice()),
        ]
        .into_iter()
        .filter(|v| !v.1.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSetDesc {
    pub kind: ParameterSetKind,
    pub parameters: Vec<ParameterDecl>,
    /// The values of a static set, one per parameter.
    #[serde(default)]
    pub values: Vec<ParameterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateParams {
    pub inputs: Vec<InputSlotDesc>,
    pub outputs: Vec<OutputDesc>,
    pub color_formats: [TargetFormat; MAX_COLOR_TARGETS],
    pub depth_stencil_format: TargetFormat,
    pub shaders: ShaderSources,
    pub parameters: Vec<ParameterSetDesc>,
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
}

impl Default for StateParams {
    fn default() -> Self {
        let mut color_formats = [TargetFormat::Unused; MAX_COLOR_TARGETS];
        color_formats[0] = TargetFormat::Default;

        StateParams {
            inputs: Vec::new(),
            outputs: Vec::new(),
            color_formats,
            depth_stencil_format: TargetFormat::Default,
            shaders: ShaderSources::default(),
            parameters: Vec::new(),
            rasterizer: RasterizerState::default(),
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::default(),
        }
    }
}

impl StateParams {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSlot {
    pub kind: SlotKind,
    pub decl: VertexDecl,
    pub buffer: Option<GeometryBufferHandle>,
    pub divisor: u32,
}

/// What `State::allocate` needs to know besides the descriptor.
pub struct StateContext<'a> {
    pub visitor: &'a mut dyn Visitor,
    pub objects: &'a Objects,
    pub caps: &'a Capabilities,
    pub color_formats: [Option<TextureFormat>; MAX_COLOR_TARGETS],
    pub depth_stencil_format: Option<TextureFormat>,
}

#[derive(Debug)]
pub struct State {
    slots: SmallVec<[InputSlot; 4]>,
    primary: Option<usize>,
    input_available: u32,
    feedback: Vec<String>,
    color_formats: [Option<TextureFormat>; MAX_COLOR_TARGETS],
    depth_stencil_format: Option<TextureFormat>,
    sets: SmallVec<[ParameterSet; 4]>,
    parameters: Vec<ParameterSlot>,
    static_values: Vec<ParametersState>,
    fixed: FixedState,
    units: Vec<BackendId>,
    program: Option<BackendId>,
    layout: Option<BackendId>,
    claims: Vec<Claim>,
}

impl State {
    /// Builds the state. Either everything succeeds, or whatever was created on the
    /// backend is destroyed again before the error is returned. References on other
    /// objects are listed in `claims` and acquired by the caller afterwards.
    pub fn allocate(ctx: &mut StateContext, params: &StateParams) -> Result<Self> {
        if params.inputs.len() > MAX_INPUT_SLOTS {
            bail_format!(
                InvalidValue,
                "At most {} input slots are supported.",
                MAX_INPUT_SLOTS
            );
        }

        if params.parameters.len() > MAX_PARAMETER_SETS {
            bail_format!(
                InvalidValue,
                "At most {} parameter sets are supported.",
                MAX_PARAMETER_SETS
            );
        }

        if params.shaders.vertex.is_empty() {
            bail_format!(
                InvalidValue,
                "Vertex shader is required to describe a proper state."
            );
        }

        let mut state = State {
            slots: SmallVec::new(),
            primary: None,
            input_available: 0,
            feedback: Vec::new(),
            color_formats: [None; MAX_COLOR_TARGETS],
            depth_stencil_format: None,
            sets: SmallVec::new(),
            parameters: Vec::new(),
            static_values: Vec::new(),
            fixed: FixedState {
                rasterizer: params.rasterizer,
                blend: [Default::default(); MAX_COLOR_TARGETS],
                write_mask: params.blend.write_mask,
                depth_stencil: params.depth_stencil,
            },
            units: Vec::new(),
            program: None,
            layout: None,
            claims: Vec::new(),
        };

        match state.build(ctx, params) {
            Ok(()) => Ok(state),
            Err(err) => {
                state.release_renderer_resources(ctx.visitor);
                Err(err)
            }
        }
    }

    fn build(&mut self, ctx: &mut StateContext, params: &StateParams) -> Result<()> {
        self.allocate_inputs(ctx, params)?;

        let mut outputs = Vec::new();
        for v in &params.outputs {
            match *v {
                OutputDesc::Feedback(ref name) => self.feedback.push(name.clone()),
                OutputDesc::FrameBuffer { ref name, target } => {
                    if target as usize >= MAX_COLOR_TARGETS {
                        bail_format!(InvalidValue, "Output {} targets {}.", name, target);
                    }

                    outputs.push((name.clone(), target));
                }
            }
        }

        for (i, v) in params.color_formats.iter().enumerate() {
            self.color_formats[i] = match *v {
                TargetFormat::Default => ctx.color_formats[i],
                TargetFormat::Unused => None,
                TargetFormat::Format(format) => {
                    if format.is_depth() {
                        bail_format!(InvalidValue, "{:?} is not a color format.", format);
                    }
                    Some(format)
                }
            };
        }

        self.depth_stencil_format = match params.depth_stencil_format {
            TargetFormat::Default => ctx.depth_stencil_format,
            TargetFormat::Unused => None,
            TargetFormat::Format(format) => {
                if !format.is_depth() {
                    bail_format!(InvalidValue, "{:?} is not a depth format.", format);
                }
                Some(format)
            }
        };

        let program = self.compile(ctx, &params.shaders, &outputs)?;
        let reflection = ctx.visitor.reflect(program)?;

        self.create_input_layout(ctx, program, &reflection)?;
        self.allocate_parameters(ctx, program, &reflection, &params.parameters)?;

        let blend = &params.blend;
        for i in 0..MAX_COLOR_TARGETS {
            self.fixed.blend[i] = if blend.separate && ctx.caps.multi_blend {
                blend.targets[i]
            } else {
                blend.targets[0]
            };
        }

        Ok(())
    }

    fn allocate_inputs(&mut self, ctx: &mut StateContext, params: &StateParams) -> Result<()> {
        for (i, v) in params.inputs.iter().enumerate() {
            let slot = match *v {
                InputSlotDesc::Static { buffer, divisor } => {
                    let gb = ctx.objects.geometry_buffers.get(buffer).ok_or_else(|| {
                        err_format!(InvalidObject, "Static slot {} without a valid buffer.", i)
                    })?;

                    self.claims.push(Claim::Object(Object::GeometryBuffer(buffer)));
                    InputSlot {
                        kind: SlotKind::Static,
                        decl: gb.decl().clone(),
                        buffer: Some(buffer),
                        divisor,
                    }
                }
                InputSlotDesc::Dynamic { ref decl, divisor } => {
                    if decl.is_empty() {
                        bail_format!(InvalidValue, "Dynamic slot {} without components.", i);
                    }

                    self.input_available += 1;
                    InputSlot {
                        kind: SlotKind::Dynamic,
                        decl: decl.clone(),
                        buffer: None,
                        divisor,
                    }
                }
            };

            if slot.divisor == 0 && self.primary.is_none() {
                self.primary = Some(i);
            }

            self.slots.push(slot);
        }

        Ok(())
    }

    fn compile(
        &mut self,
        ctx: &mut StateContext,
        shaders: &ShaderSources,
        outputs: &[(String, u32)],
    ) -> Result<BackendId> {
        for (stage, sources) in shaders.stages() {
            match ctx.visitor.compile(stage, sources) {
                Ok(unit) => self.units.push(unit),
                Err(diagnostic) => {
                    error!("Failed to compile {:?} shader: {}", stage, diagnostic);
                    bail_format!(InvalidValue, "{:?} shader: {}", stage, diagnostic);
                }
            }
        }

        let link = LinkParams {
            feedback: &self.feedback,
            outputs,
        };

        let units = ::std::mem::replace(&mut self.units, Vec::new());
        match ctx.visitor.link(&units, link) {
            Ok(program) => {
                self.program = Some(program);
                Ok(program)
            }
            Err(diagnostic) => {
                error!("Failed to link program: {}", diagnostic);
                bail_format!(InvalidValue, "Program: {}", diagnostic);
            }
        }
    }

    fn create_input_layout(
        &mut self,
        ctx: &mut StateContext,
        program: BackendId,
        reflection: &Reflection,
    ) -> Result<()> {
        let mut layout = InputLayout::default();

        for (i, slot) in self.slots.iter().enumerate() {
            let buffer = slot
                .buffer
                .and_then(|h| ctx.objects.geometry_buffers.get(h));

            let mut binding = VertexBinding {
                slot: i as u32,
                stride: slot.decl.stride(),
                divisor: slot.divisor,
                buffer: buffer.and_then(|v| v.vertex_buffer()),
                attributes: Vec::new(),
            };

            for (component, offset) in slot.decl.iter() {
                if component.name.is_empty() {
                    continue;
                }

                match reflection.attribute(&component.name) {
                    Some(v) => binding.attributes.push(VertexAttribute {
                        location: v.location,
                        kind: component.kind,
                        offset,
                    }),
                    None => debug!("Vertex component \"{}\" is not used.", component.name),
                }
            }

            if Some(i) == self.primary {
                layout.index_buffer = buffer.and_then(|v| v.index_buffer());
            }

            layout.bindings.push(binding);
        }

        let used = layout.bindings.iter().map(|v| v.attributes.len()).sum::<usize>();
        if ctx.caps.max_active_attribs > 0 && used > ctx.caps.max_active_attribs as usize {
            bail_format!(
                InvalidValue,
                "{} vertex attributes exceed the limit of {}.",
                used,
                ctx.caps.max_active_attribs
            );
        }

        self.layout = Some(ctx.visitor.create_input_layout(program, &layout)?);
        Ok(())
    }

    fn allocate_parameters(
        &mut self,
        ctx: &mut StateContext,
        program: BackendId,
        reflection: &Reflection,
        sets: &[ParameterSetDesc],
    ) -> Result<()> {
        let mut sampler = 0;

        for (i, desc) in sets.iter().enumerate() {
            let mut set = ParameterSet {
                kind: desc.kind,
                first: self.parameters.len(),
                onepastlast: self.parameters.len(),
                first_sampler: sampler,
                onepastlast_sampler: sampler,
                constant_count: 0,
            };

            for decl in &desc.parameters {
                let found = match decl.kind {
                    ParameterKind::Constant => reflection.uniform(&decl.name),
                    ParameterKind::Block => reflection.block(&decl.name),
                    ParameterKind::Texture => reflection.sampler(&decl.name),
                };

                let found = found.filter(|v| decl.index < v.size.max(1));
                if found.is_none() {
                    warn!(
                        "Requested parameter \"{}\" not found in program parameters",
                        decl.name
                    );
                }

                let mut slot = ParameterSlot {
                    kind: decl.kind,
                    name: decl.name.clone(),
                    location: found.map(|v| v.location),
                    index: decl.index,
                    ty: found.and_then(|v| v.ty),
                };

                match decl.kind {
                    ParameterKind::Constant => set.constant_count += 1,
                    ParameterKind::Block => {}
                    ParameterKind::Texture => {
                        let unit = sampler;
                        sampler += 1;

                        if ctx.caps.max_texture_units > 0 && sampler > ctx.caps.max_texture_units {
                            bail_format!(
                                InvalidValue,
                                "{} textures exceed the limit of {} units.",
                                sampler,
                                ctx.caps.max_texture_units
                            );
                        }

                        if let Some(v) = found {
                            ctx.visitor.bind_sampler_unit(program, v.location, unit)?;
                        }

                        slot.location = Some(unit - set.first_sampler);
                        slot.ty = None;
                    }
                }

                self.parameters.push(slot);
            }

            set.onepastlast = self.parameters.len();
            set.onepastlast_sampler = sampler;

            match desc.kind {
                ParameterSetKind::Static => {
                    let values = ParametersState::new(
                        i,
                        &set,
                        &self.parameters,
                        &desc.values,
                        ctx.objects,
                        ctx.caps,
                    )?;

                    self.claims.extend(values.claims());
                    self.static_values.push(values);
                }
                ParameterSetKind::Dynamic => {
                    if !desc.values.is_empty() {
                        bail_format!(
                            InvalidValue,
                            "Dynamic parameter set {} takes its values from Parameters objects.",
                            i
                        );
                    }
                }
            }

            self.sets.push(set);
        }

        Ok(())
    }

    /// Checks if this state could render into targets of the given formats.
    pub fn validate(
        &self,
        color_formats: &[Option<TextureFormat>; MAX_COLOR_TARGETS],
        depth_stencil_format: Option<TextureFormat>,
    ) -> bool {
        if self.fixed.rasterizer.discard {
            return true;
        }

        for (lhs, rhs) in self.color_formats.iter().zip(color_formats.iter()) {
            if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                if lhs != rhs {
                    return false;
                }
            }
        }

        match (self.depth_stencil_format, depth_stencil_format) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            (Some(_), None) => self.fixed.depth_stencil.depth_test.is_none(),
            _ => true,
        }
    }

    /// Activates the pipeline on the backend and applies the values of static
    /// parameter sets.
    pub fn apply(&self, visitor: &mut dyn Visitor, objects: &Objects) -> Result<()> {
        let program = self
            .program
            .ok_or_else(|| err_format!(InvalidObject, "State has no renderer resources."))?;

        visitor.apply_pipeline(program, self.layout, &self.fixed)?;

        for values in &self.static_values {
            values.apply(visitor, objects, &self.sets[values.set()], &self.parameters)?;
        }

        Ok(())
    }

    #[inline]
    pub fn slots(&self) -> &[InputSlot] {
        &self.slots
    }

    #[inline]
    pub fn primary_slot(&self) -> Option<usize> {
        self.primary
    }

    /// The buffer statically bound to the primary slot.
    #[inline]
    pub fn primary_buffer(&self) -> Option<GeometryBufferHandle> {
        self.primary.and_then(|i| self.slots[i].buffer)
    }

    /// The number of slots that are bound at run time.
    #[inline]
    pub fn input_available(&self) -> u32 {
        self.input_available
    }

    #[inline]
    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    #[inline]
    pub fn formats(
        &self,
    ) -> (&[Option<TextureFormat>; MAX_COLOR_TARGETS], Option<TextureFormat>) {
        (&self.color_formats, self.depth_stencil_format)
    }

    #[inline]
    pub fn fixed(&self) -> &FixedState {
        &self.fixed
    }

    #[inline]
    pub fn sets(&self) -> &[ParameterSet] {
        &self.sets
    }

    pub fn set(&self, set: usize) -> Result<&ParameterSet> {
        self.sets
            .get(set)
            .ok_or_else(|| err_format!(InvalidEnum, "Parameter set {} is undefined.", set))
    }

    #[inline]
    pub fn parameter_slots(&self) -> &[ParameterSlot] {
        &self.parameters
    }

    /// Resolves a `(set, slot)` address into an index of the parameter table.
    pub fn locate(&self, set: usize, slot: usize) -> Result<usize> {
        self.set(set)?.resolve(slot).ok_or_else(|| {
            err_format!(InvalidEnum, "Slot {} of parameter set {} is undefined.", slot, set)
        })
    }

    /// The type of the constant at `(set, slot)`.
    pub fn constant_type(&self, set: usize, slot: usize) -> Result<Option<UniformType>> {
        let v = &self.parameters[self.locate(set, slot)?];
        if v.kind != ParameterKind::Constant {
            bail_format!(InvalidOperation, "Parameter \"{}\" is not a constant.", v.name);
        }

        Ok(v.ty)
    }

    #[inline]
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }
}

impl GpuObject for State {
    const TYPE: ObjectType = ObjectType::State;

    fn release_renderer_resources(&mut self, visitor: &mut dyn Visitor) -> Vec<Claim> {
        if let Some(id) = self.layout.take() {
            if let Err(err) = visitor.delete_input_layout(id) {
                warn!("{}", err);
            }
        }

        if let Some(id) = self.program.take() {
            if let Err(err) = visitor.delete_program(id) {
                warn!("{}", err);
            }
        }

        for id in self.units.drain(..) {
            if let Err(err) = visitor.delete_shader(id) {
                warn!("{}", err);
            }
        }

        ::std::mem::replace(&mut self.claims, Vec::new())
    }
}
