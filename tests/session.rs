extern crate env_logger;
extern crate pigment;

use std::cell::RefCell;
use std::rc::Rc;

use pigment::objects::data_buffer::DataBufferKind;
use pigment::objects::state::{InputSlotDesc, OutputDesc};
use pigment::prelude::*;

const VS: &str = "
    in vec3 position;
    out vec3 captured;
    void main() {}
";

type Log = Rc<RefCell<HeadlessLog>>;

fn session_with(visitor: HeadlessVisitor, settings: Settings) -> (Session, Log) {
    let _ = env_logger::try_init();

    let log = visitor.log();
    let mut session = Session::new(Box::new(visitor), settings);
    session.initialize().unwrap();
    session.create_renderer(&RendererParams::default()).unwrap();
    (session, log)
}

fn session() -> (Session, Log) {
    session_with(HeadlessVisitor::new(), Settings::default())
}

fn geometry_buffer(kind: GeometryBufferKind, vertex_count: u32) -> GeometryBufferParams {
    GeometryBufferParams {
        kind,
        decl: VertexDecl::build()
            .with(VertexComponentKind::Vec3, "position")
            .finish(),
        vertex_count,
        index_count: 0,
        index_format: None,
        sparse: false,
    }
}

fn geometry(buffer: GeometryBufferHandle, vertex_count: u32) -> GeometryParams {
    GeometryParams {
        buffer,
        primitive: Primitive::Triangles,
        vertex_count,
        index_count: 0,
    }
}

/// A state drawing from `buffer`, optionally recording its vertex output.
fn state(session: &mut Session, buffer: GeometryBufferHandle, feedback: bool) -> StateHandle {
    let mut params = StateParams::default();
    params.inputs.push(InputSlotDesc::Static { buffer, divisor: 0 });
    params.shaders.vertex.push(VS.into());
    if feedback {
        params.outputs.push(OutputDesc::Feedback("captured".into()));
    }

    session.create_state(&params).unwrap()
}

fn count(log: &Log, f: fn(&Command) -> bool) -> usize {
    log.borrow().count(f)
}

#[test]
fn stages() {
    let _ = env_logger::try_init();
    let mut session = Session::headless(Settings::default());
    assert_eq!(session.stage(), Stage::NotReady);

    let err = session.create_renderer(&RendererParams::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(session.last_error(), Some(ErrorKind::InvalidState));

    session.initialize().unwrap();
    assert_eq!(session.stage(), Stage::SystemReady);
    assert_eq!(session.last_error(), None);
    assert_eq!(session.initialize().unwrap_err().kind(), ErrorKind::InvalidState);

    let err = session.create_texture(TextureParams::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(session.destroy_renderer().unwrap_err().kind(), ErrorKind::InvalidState);
    assert!(session.info().is_none());

    session.create_renderer(&RendererParams::default()).unwrap();
    assert_eq!(session.stage(), Stage::RendererReady);
    assert_eq!(session.capabilities(), Some(&HeadlessVisitor::default_capabilities()));
    assert_eq!(session.render_target_size().unwrap(), cgmath::Vector2::new(640, 480));

    session.destroy_renderer().unwrap();
    assert_eq!(session.stage(), Stage::SystemReady);
    assert!(session.capabilities().is_none());
}

#[test]
fn viewport_origin_is_top_left() {
    let (mut session, log) = session();

    session.set_viewport(10, 20, 100, 50).unwrap();
    assert_eq!(
        log.borrow().commands.last(),
        Some(&Command::SetViewport(Viewport {
            x: 10,
            y: 410,
            width: 100,
            height: 50,
        }))
    );

    session
        .clear(ClearParams {
            color: Some([0.0, 0.0, 0.0, 1.0]),
            depth: Some(1.0),
            stencil: None,
        })
        .unwrap();
    session.display().unwrap();
    assert_eq!(log.borrow().commands.last(), Some(&Command::Display));
}

#[test]
fn draws() {
    let (mut session, log) = session();

    let buffer = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Static, 64))
        .unwrap();
    let other = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Static, 64))
        .unwrap();

    let a = session.create_geometry(geometry(buffer, 3)).unwrap();
    let b = session.create_geometry(geometry(buffer, 6)).unwrap();
    let c = session.create_geometry(geometry(other, 3)).unwrap();

    assert_eq!(session.draw(a).unwrap_err().kind(), ErrorKind::InvalidState);

    let state = state(&mut session, buffer, false);
    session.set_state(state).unwrap();

    session.draw(a).unwrap();
    session.draw_instanced(b, 4).unwrap();
    session.draw_multi(&[a, b]).unwrap();

    let draws = log.borrow().draws();
    assert_eq!(draws.len(), 4);
    assert_eq!((draws[0].first_vertex, draws[0].vertex_count), (0, 3));
    assert_eq!((draws[1].first_vertex, draws[1].vertex_count), (3, 6));
    assert_eq!(draws[1].instances, 4);
    assert_eq!(draws[1].primitive, Primitive::Triangles);

    // Nothing is drawn unless every geometry could be.
    log.borrow_mut().clear();
    let err = session.draw_multi_instanced(&[a, b], &[1, 0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.draw_multi_instanced(&[a, b], &[1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.draw_multi(&[a, c]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidObject);
    assert!(log.borrow().draws().is_empty());

    session.release(b).unwrap();
    assert_eq!(session.draw(b).unwrap_err().kind(), ErrorKind::InvalidObject);
    session.draw_multi_instanced(&[a, a], &[2, 3]).unwrap();
    assert_eq!(log.borrow().draws().len(), 2);
    assert_eq!(session.last_error(), None);
}

#[test]
fn draws_need_an_input() {
    let (mut session, _) = session();

    let buffer = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Dynamic, 16))
        .unwrap();
    let geometry = session.create_geometry(geometry(buffer, 3)).unwrap();

    let mut params = StateParams::default();
    params.inputs.push(InputSlotDesc::Dynamic {
        decl: VertexDecl::build()
            .with(VertexComponentKind::Vec3, "position")
            .finish(),
        divisor: 0,
    });
    params.shaders.vertex.push(VS.into());

    let state = session.create_state(&params).unwrap();
    session.set_state(state).unwrap();
    assert_eq!(session.draw(geometry).unwrap_err().kind(), ErrorKind::InvalidState);

    let input = session
        .create_input(&InputParams {
            state,
            bindings: vec![(0, buffer)],
        })
        .unwrap();
    session.set_input(input).unwrap();
    session.draw(geometry).unwrap();
}

#[test]
fn timers() {
    let settings = Settings {
        max_timer_queries: 2,
        ..Settings::default()
    };

    let (mut session, log) = session_with(HeadlessVisitor::new(), settings);
    let creates = |log: &Log| {
        count(log, |v| match *v {
            Command::CreateQuery(..) => true,
            _ => false,
        })
    };

    let err = session.gather_timers(QueryWait::Block).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(session.end_timer_query().unwrap_err().kind(), ErrorKind::InvalidOperation);

    session.begin_timer_query().unwrap();
    assert_eq!(session.begin_timer_query().unwrap_err().kind(), ErrorKind::InvalidOperation);
    session.display().unwrap();

    let err = session.gather_timers(QueryWait::Block).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    session.end_timer_query().unwrap();
    session.timestamp_query().unwrap();
    assert_eq!(session.timestamp_query().unwrap_err().kind(), ErrorKind::InvalidOperation);

    let values = session.gather_timers(QueryWait::Block).unwrap().unwrap();
    assert_eq!(values.len(), 2);
    assert!(values[0] > 0);
    assert!(values[1] > values[0]);
    assert_eq!(creates(&log), 2);

    // Slots are reused after a gather.
    session.begin_timer_query().unwrap();
    session.end_timer_query().unwrap();
    assert_eq!(session.gather_timers(QueryWait::Poll).unwrap().map(|v| v.len()), Some(1));
    assert_eq!(creates(&log), 2);
}

#[test]
fn timers_wait_for_results() {
    let settings = Settings {
        spin_limit: Some(2),
        ..Settings::default()
    };

    let visitor = HeadlessVisitor::new().with_query_latency(4);
    let (mut session, _) = session_with(visitor, settings);

    session.timestamp_query().unwrap();
    assert_eq!(session.gather_timers(QueryWait::Poll).unwrap(), None);
    assert_eq!(session.gather_timers(QueryWait::Block).unwrap(), None);

    // Results are kept until they are gathered.
    let values = session.gather_timers(QueryWait::Attempts(8)).unwrap();
    assert_eq!(values.map(|v| v.len()), Some(1));
}

#[test]
fn capture() {
    let (mut session, log) = session();

    let buffer = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Static, 64))
        .unwrap();
    let target = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Dynamic, 64))
        .unwrap();
    let triangles = session.create_geometry(geometry(buffer, 6)).unwrap();

    let plain = state(&mut session, buffer, false);
    let recording = state(&mut session, buffer, true);

    let err = session.begin_capture(Primitive::Triangles, target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    session.set_state(plain).unwrap();
    let err = session.begin_capture(Primitive::Triangles, target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    session.set_state(recording).unwrap();
    session.begin_capture(Primitive::Triangles, target).unwrap();
    assert_eq!(session.stage(), Stage::Capture);
    assert_eq!(session.ref_count(target), Some(2));

    session.draw_instanced(triangles, 2).unwrap();
    assert_eq!(session.set_state(plain).unwrap_err().kind(), ErrorKind::InvalidState);
    let err = session.begin_capture(Primitive::Triangles, target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    assert_eq!(session.end_capture(QueryWait::Block).unwrap(), Some(4));
    assert_eq!(session.stage(), Stage::RendererReady);
    assert_eq!(session.ref_count(target), Some(1));
    assert_eq!(session.end_capture(QueryWait::Block).unwrap_err().kind(), ErrorKind::InvalidState);

    let queries = count(&log, |v| match *v {
        Command::CreateQuery(..) => true,
        _ => false,
    });
    let deleted = count(&log, |v| match *v {
        Command::DeleteQuery(..) => true,
        _ => false,
    });
    assert_eq!((queries, deleted), (1, 1));
}

#[test]
fn copies() {
    let (mut session, log) = session();

    let vertices = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Static, 16))
        .unwrap();
    let data = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: 1024,
            sparse: false,
        })
        .unwrap();
    let storage = session
        .create_texture(TextureParams {
            kind: TextureKind::Buffer,
            width: 16,
            ..TextureParams::default()
        })
        .unwrap();

    session.copy_data(vertices, data, 0, 512, 16 * 12).unwrap();
    session.copy_data(data, storage, 512, 0, 64).unwrap();
    assert_eq!(
        count(&log, |v| match *v {
            Command::CopyBuffer(..) => true,
            _ => false,
        }),
        2
    );

    let err = session.copy_data(vertices, data, 0, 1000, 64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.copy_data(data, storage, 0, 0, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.copy_data(data, data, 0, 16, 64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let state = state(&mut session, vertices, false);
    let err = session.copy_data(state, data, 0, 0, 4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let image = TextureParams {
        width: 64,
        height: 64,
        mipmaps: 2,
        ..TextureParams::default()
    };
    let a = session.create_texture(image).unwrap();
    let b = session.create_texture(image).unwrap();

    let region = ImageRegion {
        level: 1,
        x: 16,
        y: 16,
        z: 0,
        width: 16,
        height: 16,
        depth: 1,
    };

    session.copy_image(a, region, b, ImageRegion { level: 0, ..region }).unwrap();

    let err = session
        .copy_image(a, ImageRegion { x: 24, ..region }, b, region)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = session
        .copy_image(a, region, b, ImageRegion { width: 8, ..region })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = session.copy_image(a, region, storage, region).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidObject);

    session.update_data_buffer(data, 1000, &[0; 24]).unwrap();
    let err = session.update_data_buffer(data, 1000, &[0; 25]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn copy_image_needs_support() {
    let caps = Capabilities {
        copy_image: false,
        ..HeadlessVisitor::default_capabilities()
    };

    let visitor = HeadlessVisitor::with_capabilities(caps);
    let (mut session, _) = session_with(visitor, Settings::default());

    let a = session.create_texture(TextureParams::default()).unwrap();
    let b = session.create_texture(TextureParams::default()).unwrap();
    let region = ImageRegion {
        width: 1,
        height: 1,
        depth: 1,
        ..ImageRegion::default()
    };

    let err = session.copy_image(a, region, b, region).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);
}

#[test]
fn sparse_commitment() {
    let (mut session, log) = session();
    const PAGE: usize = 65536;

    let sparse = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: 4 * PAGE,
            sparse: true,
        })
        .unwrap();
    let dense = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: PAGE,
            sparse: false,
        })
        .unwrap();

    session.buffer_commitment(sparse, PAGE, 2 * PAGE, true).unwrap();
    let err = session.buffer_commitment(sparse, 100, PAGE, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.buffer_commitment(sparse, 3 * PAGE, 2 * PAGE, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.buffer_commitment(dense, 0, PAGE, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let buffer = session
        .create_geometry_buffer(GeometryBufferParams {
            sparse: true,
            ..geometry_buffer(GeometryBufferKind::Static, 65536)
        })
        .unwrap();
    let other = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Static, 16))
        .unwrap();
    let a = session.create_geometry(geometry(buffer, 300)).unwrap();
    let b = session.create_geometry(geometry(other, 3)).unwrap();

    log.borrow_mut().clear();
    session.geometry_buffer_commitment(buffer, &[a, b], true).unwrap();
    {
        let log = log.borrow();
        assert_eq!(log.commands.len(), 1);
        match log.commands[0] {
            Command::CommitBufferPages(_, 0, size, true) => assert_eq!(size, PAGE),
            ref v => panic!("unexpected command {:?}", v),
        }
    }

    let err = session.geometry_buffer_commitment(other, &[b], true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let texture = session
        .create_texture(TextureParams {
            width: 256,
            height: 256,
            sparse: true,
            ..TextureParams::default()
        })
        .unwrap();

    let region = ImageRegion {
        width: 128,
        height: 128,
        depth: 1,
        ..ImageRegion::default()
    };

    session.texture_commitment(texture, region, true).unwrap();
    session.texture_commitment(texture, region, false).unwrap();
    let err = session
        .texture_commitment(texture, ImageRegion { x: 200, ..region }, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let dense = session.create_texture(TextureParams::default()).unwrap();
    let err = session.texture_commitment(dense, region, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn sparse_needs_support() {
    let caps = Capabilities {
        sparse_buffer: false,
        sparse_texture: false,
        ..HeadlessVisitor::default_capabilities()
    };

    let visitor = HeadlessVisitor::with_capabilities(caps);
    let (mut session, _) = session_with(visitor, Settings::default());

    let err = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: 1024,
            sparse: true,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);

    let buffer = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: 1024,
            sparse: false,
        })
        .unwrap();
    let err = session.buffer_commitment(buffer, 0, 1024, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);

    let texture = session.create_texture(TextureParams::default()).unwrap();
    let err = session
        .texture_commitment(texture, ImageRegion::default(), true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);
}

#[test]
fn teardown_on_drop() {
    let (mut session, log) = session();

    session.create_texture(TextureParams::default()).unwrap();
    session.create_samplers(&[SamplerParams::default()]).unwrap();
    session.timestamp_query().unwrap();

    drop(session);

    assert_eq!(log.borrow().live_resources(), 0);
    assert_eq!(log.borrow().commands.last(), Some(&Command::DestroyRenderer));
}

#[test]
fn fixed_function_values() {
    let (mut session, log) = session();

    let err = session.set_stencil_reference(3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(session.set_blend_color([1.0; 4]).unwrap_err().kind(), ErrorKind::InvalidState);

    let buffer = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Static, 16))
        .unwrap();
    let state = state(&mut session, buffer, false);
    session.set_state(state).unwrap();

    session.set_stencil_reference(3).unwrap();
    session.set_blend_color([0.5, 0.25, 0.0, 1.0]).unwrap();

    let log = log.borrow();
    let n = log.commands.len();
    assert_eq!(log.commands[n - 2], Command::SetStencilReference(3));
    assert_eq!(log.commands[n - 1], Command::SetBlendColor([0.5, 0.25, 0.0, 1.0]));
}

#[test]
fn vertex_updates() {
    let (mut session, log) = session();

    let buffer = session
        .create_geometry_buffer(geometry_buffer(GeometryBufferKind::Dynamic, 4))
        .unwrap();

    session.update_vertices(buffer, 1, &[7; 3 * 12]).unwrap();
    match log.borrow().commands.last() {
        Some(Command::UpdateBuffer(_, offset, bytes)) => {
            assert_eq!(*offset, 12);
            assert_eq!(bytes.len(), 36);
        }
        v => panic!("unexpected command {:?}", v),
    }

    // Partial vertices and overruns.
    let err = session.update_vertices(buffer, 0, &[0; 13]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.update_vertices(buffer, 2, &[0; 3 * 12]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    // No index storage.
    let err = session.update_indices(buffer, 0, &[0; 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn huge_offsets_are_out_of_range() {
    let (mut session, log) = session();
    let max = ::std::usize::MAX;

    let data = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: 1024,
            sparse: false,
        })
        .unwrap();
    let sparse = session
        .create_data_buffer(DataBufferParams {
            kind: DataBufferKind::Generic,
            size: 2 * 65536,
            sparse: true,
        })
        .unwrap();
    let buffer = session
        .create_geometry_buffer(GeometryBufferParams {
            index_count: 6,
            index_format: Some(IndexFormat::U16),
            ..geometry_buffer(GeometryBufferKind::Dynamic, 4)
        })
        .unwrap();

    let commands = log.borrow().commands.len();

    let err = session.copy_data(data, sparse, max, 0, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.copy_data(data, sparse, 0, max, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = session.update_data_buffer(data, max, &[0; 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    // Aligned to the page, but past the end of the address space.
    let err = session
        .buffer_commitment(sparse, max - 65535, 65536, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = session.update_vertices(buffer, ::std::u32::MAX, &[0; 12]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    let err = session.update_indices(buffer, ::std::u32::MAX, &[0; 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    assert_eq!(log.borrow().commands.len(), commands);
}
