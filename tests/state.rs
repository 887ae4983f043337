extern crate env_logger;
extern crate pigment;
extern crate rand;

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;

use pigment::objects::framebuffer::FrameBufferAttachment;
use pigment::objects::parameters::{ParameterDecl, ParameterKind, ParameterSetKind};
use pigment::objects::state::{
    Comparison, InputSlotDesc, OutputDesc, ParameterSetDesc, TargetFormat,
};
use pigment::prelude::*;
use pigment::MAX_COLOR_TARGETS;

const VS: &str = "
    in vec3 position;
    in vec2 texcoord;
    uniform mat4 mvp;
    uniform vec4 tint;
    uniform float scale;
    uniform int mode;
    uniform float bias;
    void main() {}
";

const FS: &str = "
    uniform sampler2D albedo;
    out vec4 color;
    void main() {}
";

const BLOCK_VS: &str = "
    in vec3 position;
    in vec2 texcoord;
    uniform Lights {
        vec4 colors[4];
    };
    void main() {}
";

fn session() -> (Session, Rc<RefCell<HeadlessLog>>) {
    let _ = env_logger::try_init();

    let visitor = HeadlessVisitor::new();
    let log = visitor.log();
    let mut session = Session::new(Box::new(visitor), Settings::default());
    session.initialize().unwrap();
    session.create_renderer(&RendererParams::default()).unwrap();
    (session, log)
}

fn decl() -> VertexDecl {
    VertexDecl::build()
        .with(VertexComponentKind::Vec3, "position")
        .with(VertexComponentKind::Vec2, "texcoord")
        .finish()
}

fn params() -> StateParams {
    let mut params = StateParams::default();
    params.inputs.push(InputSlotDesc::Dynamic {
        decl: decl(),
        divisor: 0,
    });
    params.outputs.push(OutputDesc::FrameBuffer {
        name: "color".into(),
        target: 0,
    });
    params.shaders.vertex.push(VS.into());
    params.shaders.fragment.push(FS.into());
    params
}

fn constants(kind: ParameterSetKind, names: &[&str]) -> ParameterSetDesc {
    ParameterSetDesc {
        kind,
        parameters: names
            .iter()
            .map(|v| ParameterDecl::new(ParameterKind::Constant, *v))
            .collect(),
        values: Vec::new(),
    }
}

const COLORS: [Option<TextureFormat>; 4] = [
    None,
    Some(TextureFormat::Rgba8),
    Some(TextureFormat::Rgba16F),
    Some(TextureFormat::SRgba8),
];

const DEPTHS: [Option<TextureFormat>; 3] = [
    None,
    Some(TextureFormat::Depth24),
    Some(TextureFormat::Depth24Stencil8),
];

fn target(format: Option<TextureFormat>) -> TargetFormat {
    match format {
        Some(v) => TargetFormat::Format(v),
        None => TargetFormat::Unused,
    }
}

fn compatible(lhs: Option<TextureFormat>, rhs: Option<TextureFormat>) -> bool {
    lhs.is_none() || rhs.is_none() || lhs == rhs
}

#[test]
fn validation_wildcards() {
    let (mut session, _) = session();
    let mut rng = rand::thread_rng();

    for _ in 0..64 {
        let mut lhs = [None; MAX_COLOR_TARGETS];
        let mut rhs = [None; MAX_COLOR_TARGETS];
        for i in 0..MAX_COLOR_TARGETS {
            lhs[i] = COLORS[rng.gen_range(0, COLORS.len())];
            rhs[i] = COLORS[rng.gen_range(0, COLORS.len())];
        }

        let depth = (
            DEPTHS[rng.gen_range(0, DEPTHS.len())],
            DEPTHS[rng.gen_range(0, DEPTHS.len())],
        );

        let discard = rng.gen_range(0, 4) == 0;

        let mut params = params();
        for i in 0..MAX_COLOR_TARGETS {
            params.color_formats[i] = target(lhs[i]);
        }
        params.depth_stencil_format = target(depth.0);
        params.rasterizer.discard = discard;

        let handle = session.create_state(&params).unwrap();
        let state = session.objects().states.get(handle).unwrap();

        let expected = discard
            || (lhs.iter().zip(rhs.iter()).all(|(a, b)| compatible(*a, *b))
                && compatible(depth.0, depth.1));

        assert_eq!(state.validate(&rhs, depth.1), expected);
        session.release(handle).unwrap();
    }
}

#[test]
fn depth_test_requires_depth_target() {
    let (mut session, _) = session();

    let color = session
        .create_texture(TextureParams {
            width: 32,
            height: 32,
            ..TextureParams::default()
        })
        .unwrap();

    let mut fb = FrameBufferParams::default();
    fb.colors[0] = Some(FrameBufferAttachment::texture(color));
    let fb = session.create_framebuffer(&fb).unwrap();

    // Created against the native target, which has a depth-stencil surface.
    let mut params = params();
    params.depth_stencil.depth_test = Some(Comparison::Less);
    let tested = session.create_state(&params).unwrap();

    params.depth_stencil_format = TargetFormat::Unused;
    let untested = session.create_state(&params).unwrap();

    session.set_render_target(Some(fb)).unwrap();

    let err = session.set_state(tested).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);
    assert_eq!(session.bound_state(), None);

    session.set_state(untested).unwrap();
    assert_eq!(session.bound_state(), Some(untested));

    // Binding a render target drops the pipeline.
    session.set_render_target(None).unwrap();
    assert_eq!(session.bound_state(), None);
    session.set_state(tested).unwrap();
}

#[test]
fn compile_failure() {
    let (mut session, log) = session();
    let live = log.borrow().live_resources();

    let mut params = params();
    params.shaders.fragment = vec!["#error missing color output".into()];

    let err = session.create_state(&params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert!(format!("{}", err).contains("missing color output"));
    assert_eq!(log.borrow().live_resources(), live);
    assert_eq!(session.objects().states.len(), 0);

    let mut params = StateParams::default();
    params.shaders.fragment.push(FS.into());
    let err = session.create_state(&params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn static_buffers_are_claimed() {
    let (mut session, log) = session();

    let buffer = session
        .create_geometry_buffer(GeometryBufferParams {
            kind: GeometryBufferKind::Static,
            decl: decl(),
            vertex_count: 3,
            index_count: 0,
            index_format: None,
            sparse: false,
        })
        .unwrap();

    let mut params = params();
    params.inputs = vec![InputSlotDesc::Static { buffer, divisor: 0 }];
    let state = session.create_state(&params).unwrap();
    assert_eq!(session.ref_count(buffer), Some(2));

    session.release(buffer).unwrap();
    session.release(state).unwrap();
    assert!(!session.is_alive(buffer));
    assert_eq!(log.borrow().live_resources(), 0);
}

#[test]
fn unknown_variant() {
    let err = StateParams::from_json(r#"{ "rasterizer": { "cull_face": "Sideways" } }"#)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEnum);

    let err = StateParams::from_json(r#"{ "inputs": 3 }"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn primary_slot() {
    let (mut session, _) = session();

    let mut params = params();
    params.inputs = vec![
        InputSlotDesc::Dynamic {
            decl: decl(),
            divisor: 1,
        },
        InputSlotDesc::Dynamic {
            decl: decl(),
            divisor: 0,
        },
        InputSlotDesc::Dynamic {
            decl: decl(),
            divisor: 0,
        },
    ];

    let handle = session.create_state(&params).unwrap();
    let state = session.objects().states.get(handle).unwrap();
    assert_eq!(state.primary_slot(), Some(1));
    assert_eq!(state.input_available(), 3);
}

#[test]
fn parameter_addressing() {
    let (mut session, _) = session();

    let mut params = params();
    params.parameters = vec![
        constants(ParameterSetKind::Dynamic, &["mvp", "tint", "scale"]),
        constants(ParameterSetKind::Dynamic, &["mode", "bias"]),
    ];

    let handle = session.create_state(&params).unwrap();
    {
        let state = session.objects().states.get(handle).unwrap();
        assert_eq!(state.sets()[0].first, 0);
        assert_eq!(state.sets()[0].onepastlast, 3);
        assert_eq!(state.sets()[1].first, 3);
        assert_eq!(state.sets()[1].onepastlast, 5);

        assert_eq!(state.locate(1, 1).unwrap(), 4);
        assert_eq!(state.locate(1, 2).unwrap_err().kind(), ErrorKind::InvalidEnum);
        assert_eq!(state.locate(2, 0).unwrap_err().kind(), ErrorKind::InvalidEnum);
    }

    session.set_state(handle).unwrap();
    let err = session.set_uniform_value(1, 2, 1.0f32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEnum);
    assert_eq!(session.last_error(), Some(ErrorKind::InvalidEnum));
}

#[test]
fn uniform_values() {
    let (mut session, log) = session();

    let mut params = params();
    params.parameters = vec![
        constants(ParameterSetKind::Static, &["scale"]),
        ParameterSetDesc {
            kind: ParameterSetKind::Dynamic,
            parameters: vec![
                ParameterDecl::new(ParameterKind::Constant, "mvp"),
                ParameterDecl::new(ParameterKind::Texture, "albedo"),
            ],
            values: Vec::new(),
        },
    ];
    params.parameters[0].values = vec![ParameterValue::Constant(UniformValue::Float(2.0))];

    let state = session.create_state(&params).unwrap();
    let parameters = session
        .create_parameters(&ParametersParams {
            state,
            set: 1,
            values: Vec::new(),
        })
        .unwrap();

    // The state is not bound.
    let err = session.set_uniform_value(1, 0, [[0.0f32; 4]; 4]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    session.set_state(state).unwrap();
    assert_eq!(
        log.borrow().commands.last(),
        Some(&Command::SetUniform(2, 0, UniformValue::Float(2.0)))
    );

    let err = session.set_uniform_value(1, 0, [[0.0f32; 4]; 4]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    session.set_parameters(parameters).unwrap();
    assert_eq!(session.bound_parameters(1), Some(parameters));

    let identity: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    session.set_uniform_value(1, 0, identity).unwrap();
    assert_eq!(
        log.borrow().commands.last(),
        Some(&Command::SetUniform(0, 0, UniformValue::Mat4(identity)))
    );

    let err = session.set_uniform_value(1, 0, 1.0f32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEnum);

    let err = session.set_uniform_value(1, 1, 1.0f32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let err = session.set_uniform_value(0, 0, 1.0f32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    // Static sets could not be instantiated.
    let err = session
        .create_parameters(&ParametersParams {
            state,
            set: 0,
            values: Vec::new(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    // Destroying the bound parameters drops the binding.
    session.release(parameters).unwrap();
    assert_eq!(session.bound_parameters(1), None);
    assert_eq!(session.bound_state(), Some(state));
}

#[test]
fn textures_and_samplers() {
    let (mut session, log) = session();

    session.create_samplers(&[SamplerParams::default()]).unwrap();
    let texture = session.create_texture(TextureParams::default()).unwrap();

    let mut params = params();
    params.parameters = vec![ParameterSetDesc {
        kind: ParameterSetKind::Dynamic,
        parameters: vec![ParameterDecl::new(ParameterKind::Texture, "albedo")],
        values: Vec::new(),
    }];

    let state = session.create_state(&params).unwrap();
    let value = ParameterValue::Texture {
        texture: Some(texture),
        sampler: 0,
    };

    let parameters = session
        .create_parameters(&ParametersParams {
            state,
            set: 0,
            values: vec![value],
        })
        .unwrap();

    assert_eq!(session.ref_count(texture), Some(2));
    assert_eq!(session.ref_count(state), Some(2));

    // A sampler in use could not be replaced.
    assert!(session.create_samplers(&[SamplerParams::default()]).is_err());

    let err = session
        .update_parameters(
            parameters,
            0,
            ParameterValue::Texture {
                texture: Some(texture),
                sampler: 3,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    session.set_state(state).unwrap();
    session.set_parameters(parameters).unwrap();
    let binds = log.borrow().count(|v| match *v {
        Command::BindTexture(0, Some(_), Some(_)) => true,
        _ => false,
    });
    assert_eq!(binds, 1);

    session
        .update_parameters(
            parameters,
            0,
            ParameterValue::Texture {
                texture: None,
                sampler: 0,
            },
        )
        .unwrap();
    assert_eq!(session.ref_count(texture), Some(1));
    match log.borrow().commands.last() {
        Some(&Command::BindTexture(0, None, Some(_))) => {}
        v => panic!("unexpected command {:?}", v),
    }

    session.release(texture).unwrap();
    session.release(parameters).unwrap();
    session.release(state).unwrap();
    assert!(!session.is_alive(texture));
    session.create_samplers(&[SamplerParams::default()]).unwrap();
}

#[test]
fn inputs_belong_to_their_state() {
    let (mut session, log) = session();

    let buffer = session
        .create_geometry_buffer(GeometryBufferParams {
            kind: GeometryBufferKind::Dynamic,
            decl: decl(),
            vertex_count: 6,
            index_count: 0,
            index_format: None,
            sparse: false,
        })
        .unwrap();

    let a = session.create_state(&params()).unwrap();
    let b = session.create_state(&params()).unwrap();

    let input = session
        .create_input(&InputParams {
            state: a,
            bindings: vec![(0, buffer)],
        })
        .unwrap();

    assert_eq!(session.ref_count(buffer), Some(2));
    assert_eq!(session.ref_count(a), Some(2));

    let err = session
        .create_input(&InputParams {
            state: a,
            bindings: vec![(1, buffer)],
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    assert_eq!(session.set_input(input).unwrap_err().kind(), ErrorKind::InvalidState);

    session.set_state(b).unwrap();
    assert_eq!(session.set_input(input).unwrap_err().kind(), ErrorKind::InvalidObject);

    session.set_state(a).unwrap();
    session.set_input(input).unwrap();
    assert_eq!(session.bound_input(), Some(input));
    let binds = log.borrow().count(|v| match *v {
        Command::BindVertexBuffers(..) => true,
        _ => false,
    });
    assert_eq!(binds, 1);

    session.release(input).unwrap();
    assert_eq!(session.bound_input(), None);
    assert_eq!(session.ref_count(buffer), Some(1));
}

fn blocks(kind: ParameterSetKind) -> StateParams {
    let mut params = params();
    params.shaders.vertex = vec![BLOCK_VS.into()];
    params.parameters = vec![ParameterSetDesc {
        kind,
        parameters: vec![ParameterDecl::new(ParameterKind::Block, "Lights")],
        values: Vec::new(),
    }];
    params
}

fn uniform_buffer(session: &mut Session) -> DataBufferHandle {
    session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Uniform,
            size: 256,
            sparse: false,
        })
        .unwrap()
}

#[test]
fn unresolved_parameters() {
    let (mut session, log) = session();

    let mut params = params();
    params.parameters = vec![constants(ParameterSetKind::Dynamic, &["nope", "scale"])];

    let state = session.create_state(&params).unwrap();
    {
        let v = session.objects().states.get(state).unwrap();
        assert_eq!(v.parameter_slots()[0].location, None);
        assert!(v.parameter_slots()[1].location.is_some());
    }

    let parameters = session
        .create_parameters(&ParametersParams {
            state,
            set: 0,
            values: Vec::new(),
        })
        .unwrap();

    session.set_state(state).unwrap();
    session.set_parameters(parameters).unwrap();

    let uniforms = |log: &Rc<RefCell<HeadlessLog>>| {
        log.borrow().count(|v| match *v {
            Command::SetUniform(..) => true,
            _ => false,
        })
    };

    let before = uniforms(&log);
    session.set_uniform_value(0, 0, 1.0f32).unwrap();
    assert_eq!(uniforms(&log), before);

    session.set_uniform_value(0, 1, 1.0f32).unwrap();
    assert_eq!(uniforms(&log), before + 1);
}

#[test]
fn block_ranges() {
    let (mut session, _) = session();

    let buffer = uniform_buffer(&mut session);
    let state = session
        .create_state(&blocks(ParameterSetKind::Dynamic))
        .unwrap();

    let block = |offset, size| ParametersParams {
        state,
        set: 0,
        values: vec![ParameterValue::Block {
            buffer,
            offset,
            size,
        }],
    };

    let err = session.create_parameters(&block(::std::usize::MAX, 2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.create_parameters(&block(0, 257)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert_eq!(session.ref_count(buffer), Some(1));

    session.create_parameters(&block(0, 256)).unwrap();
    assert_eq!(session.ref_count(buffer), Some(2));
}

#[test]
fn failed_state_unbinds_pipeline() {
    let (mut session, _) = session();

    // Records outlive the renderer, their backend resources do not.
    let buffer = uniform_buffer(&mut session);
    session.destroy_renderer().unwrap();
    session.create_renderer(&RendererParams::default()).unwrap();

    let mut params = blocks(ParameterSetKind::Static);
    params.parameters[0].values = vec![ParameterValue::Block {
        buffer,
        offset: 0,
        size: 256,
    }];

    let broken = session.create_state(&params).unwrap();
    let plain = session.create_state(&self::params()).unwrap();

    session.set_state(plain).unwrap();
    assert_eq!(session.bound_state(), Some(plain));

    let err = session.set_state(broken).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidObject);
    assert_eq!(session.bound_state(), None);
    assert_eq!(session.bound_input(), None);

    // Format mismatches fail before anything reaches the backend.
    session.set_state(plain).unwrap();
    let mut params = self::params();
    params.color_formats[0] = TargetFormat::Format(TextureFormat::Rgba16F);
    let other = session.create_state(&params).unwrap();
    assert_eq!(session.set_state(other).unwrap_err().kind(), ErrorKind::Incompatible);
    assert_eq!(session.bound_state(), Some(plain));
}
