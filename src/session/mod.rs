//! The device session, which owns the backend and every object created through it.
//!
//! A session walks through `NotReady -> SystemReady -> RendererReady <-> Capture`.
//! Every operation checks the stage it is allowed in, and whatever binding it needs,
//! before it touches anything. A failed check leaves the session untouched. The kind
//! of the last failure is kept until the next successful call, see `last_error`.

pub mod draw;
pub mod query;
pub mod transfer;

use cgmath::Vector2;

use crate::backends::{BackendId, BackendInfo, Capabilities, ClearParams, Viewport, Visitor};
use crate::errors::*;
use crate::objects::data_buffer::{DataBuffer, DataBufferHandle, DataBufferParams};
use crate::objects::framebuffer::{FrameBuffer, FrameBufferHandle, FrameBufferParams};
use crate::objects::geometry::{Geometry, GeometryHandle, GeometryParams};
use crate::objects::geometry_buffer::{GeometryBuffer, GeometryBufferHandle, GeometryBufferParams};
use crate::objects::input::{Input, InputHandle, InputParams};
use crate::objects::parameters::{
    apply_value, ParameterSetKind, ParameterValue, Parameters, ParametersHandle, ParametersParams,
    UniformValue,
};
use crate::objects::state::{State, StateContext, StateHandle, StateParams};
use crate::objects::texture::{Texture, TextureFormat, TextureHandle, TextureParams};
use crate::objects::{Claim, GpuObject, Object, ObjectDesc, Objects};
use crate::settings::{RendererParams, Settings};
use crate::{MAX_COLOR_TARGETS, MAX_PARAMETER_SETS};

use self::query::{QueryWait, TimerQueries};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    NotReady,
    SystemReady,
    RendererReady,
    /// Primitives are recorded into a capture buffer.
    Capture,
}

const READY: &[Stage] = &[Stage::RendererReady, Stage::Capture];
const RENDERER: &[Stage] = &[Stage::RendererReady];

/// The bound state, `InvalidState` if there is none.
fn bound_state(objects: &Objects, handle: Option<StateHandle>) -> Result<(StateHandle, &State)> {
    let handle = handle.ok_or_else(|| err_format!(InvalidState, "No state is bound."))?;
    let state = objects
        .states
        .get(handle)
        .ok_or_else(|| err_format!(InvalidState, "The bound state is gone."))?;

    Ok((handle, state))
}

struct Capture {
    buffer: GeometryBufferHandle,
    query: BackendId,
}

/// Stores a freshly allocated object once the references it claims are acquired.
macro_rules! adopt {
    ($session:expr, $pool:ident, $value:expr, $claims:expr) => {{
        let mut value = $value;
        let claims: Vec<Claim> = $claims;
        if let Err(err) = $session.objects.acquire(&claims) {
            value.release_renderer_resources(&mut *$session.visitor);
            return Err(err);
        }

        let handle = $session.objects.$pool.create(value);
        info!("{:?} object created.", Object::from(handle).object_type());
        handle
    }};
}

pub struct Session {
    visitor: Box<dyn Visitor>,
    settings: Settings,
    stage: Stage,
    last_error: Option<ErrorKind>,
    info: Option<BackendInfo>,
    objects: Objects,

    render_target: Option<FrameBufferHandle>,
    color_formats: [Option<TextureFormat>; MAX_COLOR_TARGETS],
    depth_stencil_format: Option<TextureFormat>,

    state: Option<StateHandle>,
    input: Option<InputHandle>,
    parameters: [Option<ParametersHandle>; MAX_PARAMETER_SETS],

    immediate: Option<GeometryBufferHandle>,
    capture: Option<Capture>,
    timers: TimerQueries,
}

impl Session {
    pub fn new(visitor: Box<dyn Visitor>, settings: Settings) -> Self {
        Session {
            timers: TimerQueries::new(settings.max_timer_queries),
            visitor,
            settings,
            stage: Stage::NotReady,
            last_error: None,
            info: None,
            objects: Objects::new(),
            render_target: None,
            color_formats: [None; MAX_COLOR_TARGETS],
            depth_stencil_format: None,
            state: None,
            input: None,
            parameters: [None; MAX_PARAMETER_SETS],
            immediate: None,
            capture: None,
        }
    }

    /// Creates a session over the headless backend.
    pub fn headless(settings: Settings) -> Self {
        Session::new(crate::backends::new_headless(), settings)
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The kind of the error returned by the last operation, `None` if it succeeded.
    #[inline]
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// What the backend reported when the renderer was created.
    #[inline]
    pub fn info(&self) -> Option<&BackendInfo> {
        self.info.as_ref()
    }

    #[inline]
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.info.as_ref().map(|v| &v.capabilities)
    }

    #[inline]
    pub fn objects(&self) -> &Objects {
        &self.objects
    }

    #[inline]
    pub fn is_immediate_drawing(&self) -> bool {
        self.immediate.is_some()
    }

    #[inline]
    pub fn bound_state(&self) -> Option<StateHandle> {
        self.state
    }

    #[inline]
    pub fn bound_input(&self) -> Option<InputHandle> {
        self.input
    }

    #[inline]
    pub fn bound_parameters(&self, set: usize) -> Option<ParametersHandle> {
        self.parameters.get(set).cloned().and_then(|v| v)
    }

    #[inline]
    pub fn render_target(&self) -> Option<FrameBufferHandle> {
        self.render_target
    }

    /// The color and depth-stencil formats draws currently render into.
    #[inline]
    pub fn render_target_formats(
        &self,
    ) -> ([Option<TextureFormat>; MAX_COLOR_TARGETS], Option<TextureFormat>) {
        (self.color_formats, self.depth_stencil_format)
    }

    #[inline]
    pub fn ref_count<T: Into<Object>>(&self, object: T) -> Option<u32> {
        self.objects.ref_count(object.into())
    }

    #[inline]
    pub fn is_alive<T: Into<Object>>(&self, object: T) -> bool {
        self.objects.is_alive(object.into())
    }

    /// Runs `f` and records the kind of its error as the last one.
    fn tracked<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let result = f(self);
        self.last_error = result.as_ref().err().map(|v| v.kind());
        result
    }

    fn expect_stage(&self, stages: &[Stage]) -> Result<()> {
        if !stages.contains(&self.stage) {
            bail_format!(
                InvalidState,
                "Operation is not allowed in the {:?} stage.",
                self.stage
            );
        }

        Ok(())
    }

    fn expect_immediate(&self, active: bool) -> Result<()> {
        if self.immediate.is_some() != active {
            if active {
                bail_format!(InvalidState, "Immediate drawing is not active.");
            } else {
                bail_format!(InvalidState, "Operation is not allowed while drawing immediately.");
            }
        }

        Ok(())
    }

    fn caps(&self) -> Result<Capabilities> {
        self.capabilities()
            .cloned()
            .ok_or_else(|| err_format!(InvalidState, "Renderer is not created."))
    }

    fn unbind_pipeline(&mut self) {
        self.state = None;
        self.input = None;
        self.parameters = [None; MAX_PARAMETER_SETS];
    }

    /// Drops the non-owning bindings of destroyed objects.
    fn forget(&mut self, destroyed: &[Object]) {
        for v in destroyed {
            match *v {
                Object::State(h) if Some(h) == self.state => self.unbind_pipeline(),
                Object::Input(h) if Some(h) == self.input => self.input = None,
                Object::Parameters(h) => {
                    for p in &mut self.parameters {
                        if *p == Some(h) {
                            *p = None;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn release_object(&mut self, object: Object) -> Result<u32> {
        let mut destroyed = Vec::new();
        let rc = self
            .objects
            .release(&mut *self.visitor, object, &mut destroyed)?;
        self.forget(&destroyed);
        Ok(rc)
    }
}

impl Session {
    /// Brings up the backend system.
    pub fn initialize(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(&[Stage::NotReady])?;
            s.visitor.initialize()?;
            s.stage = Stage::SystemReady;
            Ok(())
        })
    }

    /// Creates the native render target and moves to `RendererReady`.
    pub fn create_renderer(&mut self, params: &RendererParams) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(&[Stage::SystemReady])?;

            let info = s.visitor.create_renderer(params)?;
            if s.settings.log_capabilities {
                info!("{:#?}", info.capabilities);
            }

            s.info = Some(info);
            s.stage = Stage::RendererReady;
            s.bind_default_target()
        })
    }

    /// Destroys the backend resources of every object and the native render target.
    /// Object records stay alive until they are released.
    pub fn destroy_renderer(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;
            s.teardown()
        })
    }

    fn teardown(&mut self) -> Result<()> {
        self.unbind_pipeline();
        if let Some(fb) = self.render_target.take() {
            self.release_object(Object::FrameBuffer(fb))?;
        }

        self.timers.release(&mut *self.visitor);
        let destroyed = self
            .objects
            .release_renderer_resources(&mut *self.visitor);
        self.forget(&destroyed);

        self.visitor.destroy_renderer()?;
        self.info = None;
        self.stage = Stage::SystemReady;
        Ok(())
    }

    /// Creates an object of the described kind, with one reference owned by the caller.
    pub fn create(&mut self, desc: ObjectDesc) -> Result<Object> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            let object = match desc {
                ObjectDesc::Geometry(v) => Object::from(s.create_geometry_object(v)?),
                ObjectDesc::GeometryBuffer(v) => Object::from(s.create_geometry_buffer_object(v)?),
                ObjectDesc::DataBuffer(v) => Object::from(s.create_data_buffer_object(v)?),
                ObjectDesc::Texture(v) => Object::from(s.create_texture_object(v)?),
                ObjectDesc::FrameBuffer(v) => Object::from(s.create_framebuffer_object(&v)?),
                ObjectDesc::State(v) => Object::from(s.create_state_object(&v)?),
                ObjectDesc::Input(v) => Object::from(s.create_input_object(&v)?),
                ObjectDesc::Parameters(v) => Object::from(s.create_parameters_object(&v)?),
            };

            Ok(object)
        })
    }

    pub fn create_geometry(&mut self, params: GeometryParams) -> Result<GeometryHandle> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.create_geometry_object(params)
        })
    }

    pub fn create_geometry_buffer(
        &mut self,
        params: GeometryBufferParams,
    ) -> Result<GeometryBufferHandle> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.create_geometry_buffer_object(params)
        })
    }

    pub fn create_data_buffer(&mut self, params: DataBufferParams) -> Result<DataBufferHandle> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.create_data_buffer_object(params)
        })
    }

    pub fn create_texture(&mut self, params: TextureParams) -> Result<TextureHandle> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.create_texture_object(params)
        })
    }

    pub fn create_framebuffer(&mut self, params: &FrameBufferParams) -> Result<FrameBufferHandle> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.create_framebuffer_object(params)
        })
    }

    /// Creates a pipeline state. Formats left as default resolve against the formats
    /// of the current render target.
    pub fn create_state(&mut self, params: &StateParams) -> Result<StateHandle> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.create_state_object(params)
        })
    }

    pub fn create_input(&mut self, params: &InputParams) -> Result<InputHandle> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.create_input_object(params)
        })
    }

    pub fn create_parameters(&mut self, params: &ParametersParams) -> Result<ParametersHandle> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.create_parameters_object(params)
        })
    }

    fn create_geometry_object(&mut self, params: GeometryParams) -> Result<GeometryHandle> {
        let buffer = self
            .objects
            .geometry_buffers
            .get_mut(params.buffer)
            .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", params.buffer))?;

        let geometry = Geometry::allocate(buffer, params)?;
        let claims = vec![Claim::Object(Object::GeometryBuffer(params.buffer))];
        Ok(adopt!(self, geometries, geometry, claims))
    }

    fn create_geometry_buffer_object(
        &mut self,
        params: GeometryBufferParams,
    ) -> Result<GeometryBufferHandle> {
        let caps = self.caps()?;
        let buffer = GeometryBuffer::allocate(&mut *self.visitor, &caps, params)?;
        Ok(adopt!(self, geometry_buffers, buffer, Vec::new()))
    }

    fn create_data_buffer_object(&mut self, params: DataBufferParams) -> Result<DataBufferHandle> {
        let caps = self.caps()?;
        let buffer = DataBuffer::allocate(&mut *self.visitor, &caps, params)?;
        Ok(adopt!(self, data_buffers, buffer, Vec::new()))
    }

    fn create_texture_object(&mut self, params: TextureParams) -> Result<TextureHandle> {
        let caps = self.caps()?;
        let texture = Texture::allocate(&mut *self.visitor, &caps, params)?;
        Ok(adopt!(self, textures, texture, Vec::new()))
    }

    fn create_framebuffer_object(
        &mut self,
        params: &FrameBufferParams,
    ) -> Result<FrameBufferHandle> {
        let caps = self.caps()?;
        let fb = FrameBuffer::allocate(&mut *self.visitor, &caps, &self.objects.textures, params)?;
        let claims = fb.claims().to_vec();
        Ok(adopt!(self, framebuffers, fb, claims))
    }

    fn create_state_object(&mut self, params: &StateParams) -> Result<StateHandle> {
        let caps = self.caps()?;
        let state = {
            let mut ctx = StateContext {
                visitor: &mut *self.visitor,
                objects: &self.objects,
                caps: &caps,
                color_formats: self.color_formats,
                depth_stencil_format: self.depth_stencil_format,
            };

            State::allocate(&mut ctx, params)?
        };

        let claims = state.claims().to_vec();
        Ok(adopt!(self, states, state, claims))
    }

    fn create_input_object(&mut self, params: &InputParams) -> Result<InputHandle> {
        let input = Input::allocate(&self.objects, params)?;
        let claims = input.claims().to_vec();
        Ok(adopt!(self, inputs, input, claims))
    }

    fn create_parameters_object(&mut self, params: &ParametersParams) -> Result<ParametersHandle> {
        let caps = self.caps()?;
        let parameters = Parameters::allocate(&self.objects, &caps, params)?;
        let claims = parameters.claims();
        Ok(adopt!(self, parameters, parameters, claims))
    }

    /// Adds a reference to `object`, returns the new count.
    pub fn add_ref<T: Into<Object>>(&mut self, object: T) -> Result<u32> {
        let object = object.into();
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.objects.add_ref(object)
        })
    }

    /// Drops a reference of `object`, returns the remaining count. The object is
    /// destroyed once it reaches zero, along with every reference it held.
    pub fn release<T: Into<Object>>(&mut self, object: T) -> Result<u32> {
        let object = object.into();
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.release_object(object)
        })
    }
}

impl Session {
    fn bind_default_target(&mut self) -> Result<()> {
        let info = self
            .info
            .ok_or_else(|| err_format!(InvalidState, "Renderer is not created."))?;

        self.visitor
            .bind_framebuffer(None, info.pixel_format.srgb())?;

        self.color_formats = [None; MAX_COLOR_TARGETS];
        self.color_formats[0] = Some(info.pixel_format.color);
        self.depth_stencil_format = info.pixel_format.depth_stencil;
        self.apply_viewport(0, 0, info.size.x, info.size.y)
    }

    fn apply_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<()> {
        let target = self.target_size()?;
        let viewport = Viewport {
            x,
            y: target.y as i32 - y - height as i32,
            width,
            height,
        };

        self.visitor.set_viewport(viewport)
    }

    fn target_size(&self) -> Result<Vector2<u32>> {
        if let Some(fb) = self.render_target {
            if let Some(v) = self.objects.framebuffers.get(fb) {
                return Ok(v.size());
            }
        }

        self.info
            .map(|v| v.size)
            .ok_or_else(|| err_format!(InvalidState, "Renderer is not created."))
    }

    /// Renders into `fb` from now on, or into the native render target for `None`.
    /// The bound state, input and parameters are dropped.
    pub fn set_render_target(&mut self, fb: Option<FrameBufferHandle>) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            match fb {
                Some(handle) => {
                    let (size, formats) = {
                        let v = s
                            .objects
                            .framebuffers
                            .get(handle)
                            .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", handle))?;

                        v.bind(&mut *s.visitor)?;
                        (v.size(), v.formats())
                    };

                    s.objects.add_ref(Object::FrameBuffer(handle))?;
                    if let Some(prev) = s.render_target.replace(handle) {
                        s.release_object(Object::FrameBuffer(prev))?;
                    }

                    s.color_formats = formats.0;
                    s.depth_stencil_format = formats.1;
                    s.unbind_pipeline();
                    s.apply_viewport(0, 0, size.x, size.y)
                }
                None => {
                    if let Some(prev) = s.render_target.take() {
                        s.release_object(Object::FrameBuffer(prev))?;
                    }

                    s.unbind_pipeline();
                    s.bind_default_target()
                }
            }
        })
    }

    /// The size of the current render target.
    pub fn render_target_size(&mut self) -> Result<Vector2<u32>> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.target_size()
        })
    }

    /// Sets the viewport, with its origin at the top-left corner of the render target.
    pub fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;
            s.apply_viewport(x, y, width, height)
        })
    }

    /// Validates `state` against the formats of the render target and activates it.
    /// The bound input and parameters are dropped.
    pub fn set_state(&mut self, state: StateHandle) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;

            let v = s
                .objects
                .states
                .get(state)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", state))?;

            if !v.validate(&s.color_formats, s.depth_stencil_format) {
                bail_format!(
                    Incompatible,
                    "{} could not render into the formats of the current target.",
                    state
                );
            }

            // The backend may already run the new program when a static value fails.
            let applied = v.apply(&mut *s.visitor, &s.objects);
            s.unbind_pipeline();
            applied?;
            s.state = Some(state);
            Ok(())
        })
    }

    /// Binds the run-time vertex buffers of the bound state.
    pub fn set_input(&mut self, input: InputHandle) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;

            let (state, _) = bound_state(&s.objects, s.state)?;
            let v = s
                .objects
                .inputs
                .get(input)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", input))?;

            if v.state() != state {
                bail_format!(InvalidObject, "{} was not built for the bound state.", input);
            }

            v.apply(&mut *s.visitor, &s.objects)?;
            s.input = Some(input);
            Ok(())
        })
    }

    /// Binds the values of one dynamic parameter set of the bound state.
    pub fn set_parameters(&mut self, parameters: ParametersHandle) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;

            let set = {
                let (handle, state) = bound_state(&s.objects, s.state)?;
                let v = s.objects.parameters.get(parameters).ok_or_else(|| {
                    err_format!(InvalidObject, "{} is not alive.", parameters)
                })?;

                if v.state() != handle {
                    bail_format!(
                        InvalidObject,
                        "{} was not built for the bound state.",
                        parameters
                    );
                }

                let layout = state.set(v.set())?;
                v.values().apply(
                    &mut *s.visitor,
                    &s.objects,
                    layout,
                    state.parameter_slots(),
                )?;

                v.set()
            };

            s.parameters[set] = Some(parameters);
            Ok(())
        })
    }

    /// Writes a constant of a dynamic set of the bound state, through the parameters
    /// bound at that set. Constants the program does not use are ignored.
    pub fn set_uniform_value<T>(&mut self, set: usize, slot: usize, value: T) -> Result<()>
    where
        T: Into<UniformValue>,
    {
        let value = value.into();
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;

            let (_, state) = bound_state(&s.objects, s.state)?;
            let ty = state.constant_type(set, slot)?;
            if let Some(ty) = ty {
                if ty != value.uniform_type() {
                    bail_format!(
                        InvalidEnum,
                        "Constant ({}, {}) is {:?}, got {:?}.",
                        set,
                        slot,
                        ty,
                        value.uniform_type()
                    );
                }
            }

            if state.sets()[set].kind == ParameterSetKind::Static {
                bail_format!(
                    InvalidOperation,
                    "Parameter set {} is static and takes its values from the state.",
                    set
                );
            }

            let handle = s.parameters[set]
                .ok_or_else(|| err_format!(InvalidState, "No parameters bound at set {}.", set))?;

            s.write_parameter(handle, slot, ParameterValue::Constant(value))
        })
    }

    /// Replaces the value of `slot` of `parameters`. The value is applied right away if
    /// the parameters are bound.
    pub fn update_parameters(
        &mut self,
        parameters: ParametersHandle,
        slot: usize,
        value: ParameterValue,
    ) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;
            s.write_parameter(parameters, slot, value)
        })
    }

    fn write_parameter(
        &mut self,
        handle: ParametersHandle,
        slot: usize,
        value: ParameterValue,
    ) -> Result<()> {
        let caps = self.caps()?;
        let (state, set) = {
            let v = self
                .objects
                .parameters
                .get(handle)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", handle))?;
            (v.state(), v.set())
        };

        let index = {
            let v = self
                .objects
                .states
                .get(state)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", state))?;

            let index = v.locate(set, slot)?;
            value.validate(&v.parameter_slots()[index], &self.objects, &caps)?;
            index
        };

        self.objects.acquire(&value.claims())?;
        let prev = match self.objects.parameters.get_mut(handle) {
            Some(v) => v.values_mut().replace(slot, value),
            None => None,
        };

        if let Some(prev) = prev {
            let mut destroyed = Vec::new();
            self.objects
                .release_claims(&mut *self.visitor, prev.claims(), &mut destroyed);
            self.forget(&destroyed);
        }

        if self.state == Some(state) && self.parameters[set] == Some(handle) {
            let v = self
                .objects
                .states
                .get(state)
                .ok_or_else(|| err_format!(InvalidObject, "{} is not alive.", state))?;

            apply_value(
                &mut *self.visitor,
                &self.objects,
                &v.sets()[set],
                &v.parameter_slots()[index],
                &value,
            )?;
        }

        Ok(())
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;
            bound_state(&s.objects, s.state)?;
            s.visitor.set_stencil_reference(reference)
        })
    }

    pub fn set_blend_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            s.expect_immediate(false)?;
            bound_state(&s.objects, s.state)?;
            s.visitor.set_blend_color(color)
        })
    }

    pub fn clear(&mut self, params: ClearParams) -> Result<()> {
        self.tracked(move |s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;
            s.visitor.clear(params)
        })
    }

    /// Presents the native render target.
    pub fn display(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(RENDERER)?;
            s.expect_immediate(false)?;
            s.visitor.display()
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.immediate.is_some() {
            if let Err(err) = self.end_immediate_drawing() {
                warn!("Failed to end immediate drawing: {}", err);
            }
        }

        if self.stage == Stage::Capture {
            if let Err(err) = self.end_capture(QueryWait::Poll) {
                warn!("Failed to end capture: {}", err);
            }
        }

        if self.stage == Stage::RendererReady {
            if let Err(err) = self.teardown() {
                warn!("Failed to destroy renderer: {}", err);
            }
        }
    }
}
