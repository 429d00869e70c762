use std::sync::Arc;
use std::time::Duration;

use wintrack::{
    ChannelSink, HostConfig, PlatformError, Rect, WindowEvent, WindowHandle, WindowHost,
    listener_fn,
};
use wt_platform::testing::{
    DESKTOP_TINT, FakeAccelerated, FakeDesktop, FakeEventBackend, Mutation, WindowSpec,
    expected_rgba, fake_backend, wait_until,
};
use wt_platform::{CaptureMode, EventChannel, MovePhase, RawEvent, ShapeOp};

const WAIT: Duration = Duration::from_secs(2);

struct Rig {
    desk: Arc<FakeDesktop>,
    accel: Arc<FakeAccelerated>,
    events: Arc<FakeEventBackend>,
    host: WindowHost,
}

fn rig_with(config: HostConfig) -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();
    let desk = Arc::new(FakeDesktop::new(1920, 1080));
    let accel = Arc::new(FakeAccelerated::new());
    let events = Arc::new(FakeEventBackend::new());
    let host = WindowHost::from_backend(fake_backend(&desk, Some(&accel), &events), &config).unwrap();
    Rig {
        desk,
        accel,
        events,
        host,
    }
}

fn rig() -> Rig {
    rig_with(HostConfig::default())
}

#[test]
fn named_capture_keeps_names_and_sizes() {
    let rig = rig();
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(100, 50, 400, 300).tint(0x11));
    let out = rig
        .host
        .capture_multi(
            game,
            "window",
            vec![
                ("chat", Rect::new(0, 200, 100, 50)),
                ("minimap", Rect::new(300, 0, 100, 100)),
            ],
        )
        .unwrap();
    let names: Vec<&str> = out.iter().map(|(k, _)| *k).collect();
    assert_eq!(names, ["chat", "minimap"]);
    assert_eq!(out[0].1.as_bytes().len(), 100 * 50 * 4);
    assert_eq!(out[1].1.as_bytes().len(), 100 * 100 * 4);
    assert_eq!(out[1].1.pixel(0, 0), Some(expected_rgba(300, 0, 0x11)));
    assert_eq!(rig.desk.snapshots_taken(), 1);
}

#[test]
fn unknown_mode_fails_before_capturing() {
    let rig = rig();
    let err = rig
        .host
        .capture_multi(WindowHandle::NULL, "gpu", vec![("a", Rect::new(0, 0, 10, 10))])
        .unwrap_err();
    assert!(matches!(err, PlatformError::UnknownCaptureMode(m) if m == "gpu"));
    assert_eq!(rig.desk.snapshots_taken(), 0);
}

#[test]
fn desktop_capture_of_the_null_window_uses_screen_coordinates() {
    let rig = rig();
    let out = rig
        .host
        .capture(WindowHandle::NULL, CaptureMode::Desktop, &[Rect::new(0, 0, 100, 100)])
        .unwrap();
    assert_eq!(out[0].as_bytes().len(), 40_000);
    assert_eq!(out[0].pixel(7, 3), Some(expected_rgba(7, 3, DESKTOP_TINT)));
    assert!(out[0].as_bytes().chunks(4).all(|p| p[3] == 0xFF));
}

#[test]
fn desktop_capture_is_relative_to_the_target() {
    let rig = rig();
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(100, 50, 400, 300));
    let out = rig
        .host
        .capture(game, CaptureMode::Desktop, &[Rect::new(0, 0, 4, 4)])
        .unwrap();
    assert_eq!(out[0].pixel(0, 0), Some(expected_rgba(100, 50, DESKTOP_TINT)));
}

#[test]
fn default_mode_comes_from_the_config() {
    let rig = rig_with(HostConfig {
        capture_mode: "accelerated".into(),
        ..HostConfig::default()
    });
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(0, 0, 200, 200));
    let buffer = rig.host.capture_window(game, Rect::new(10, 10, 20, 20)).unwrap();
    assert_eq!(buffer.width(), 20);
    assert_eq!(rig.accel.calls(), 1);
    assert_eq!(rig.desk.snapshots_taken(), 0);

    rig.host.release_capture_target(game);
    assert_eq!(rig.accel.live_targets(), 0);
}

#[test]
fn host_refuses_an_unknown_default_mode() {
    let desk = Arc::new(FakeDesktop::new(100, 100));
    let events = Arc::new(FakeEventBackend::new());
    let config = HostConfig {
        capture_mode: "fast".into(),
        ..HostConfig::default()
    };
    assert!(WindowHost::from_backend(fake_backend(&desk, None, &events), &config).is_err());
}

#[test]
fn invalid_rectangles_are_rejected() {
    let rig = rig();
    let err = rig
        .host
        .capture_default(WindowHandle::NULL, &[Rect::new(0, 0, 10, 10), Rect::new(0, 0, 0, 5)])
        .unwrap_err();
    assert!(matches!(err, PlatformError::InvalidRectangle { width: 0, height: 5, .. }));
    assert_eq!(rig.desk.snapshots_taken(), 0);
}

#[test]
fn lookups_go_through_the_tree() {
    let rig = rig();
    let frame = rig
        .desk
        .add_top_level(WindowSpec::new("Frame").rect(0, 0, 800, 600).pid(42));
    let game = rig
        .desk
        .add(frame, WindowSpec::new("RuneScape").rect(10, 10, 780, 580).pid(42));
    assert_eq!(rig.host.find_main_window(42), frame);
    assert_eq!(rig.host.find_main_window(7), WindowHandle::NULL);
    assert_eq!(rig.host.find_target_windows(), vec![game]);
    assert_eq!(rig.host.window_at(400, 300), game);
    assert_eq!(rig.host.window_at(5, 5), frame);
    assert_eq!(rig.host.window_pid(game), 42);
}

#[test]
fn window_operations_reach_the_backend() {
    let rig = rig();
    let overlay = rig
        .desk
        .add_top_level(WindowSpec::new("Overlay").rect(0, 0, 300, 200).title("tool"));
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(100, 100, 800, 600));
    assert_eq!(rig.host.title(overlay), "tool");
    assert!(rig.host.is_valid(overlay));

    let target = Rect::new(10, 20, 300, 400);
    rig.host.set_bounds(overlay, target).unwrap();
    assert_eq!(rig.host.bounds(overlay), target);

    rig.host.set_parent(overlay, game).unwrap();
    rig.host.set_parent(overlay, WindowHandle::NULL).unwrap();
    rig.host
        .set_window_shape(overlay, &[Rect::new(0, 0, 10, 10)], "subtract")
        .unwrap();
    rig.host.clear_window_shape(overlay).unwrap();
    assert!(matches!(
        rig.host.set_window_shape(overlay, &[], "xor"),
        Err(PlatformError::Unsupported(_))
    ));

    let mutations = rig.desk.mutations();
    assert!(mutations.contains(&Mutation::Parent(overlay, game)));
    assert!(mutations.contains(&Mutation::Parent(overlay, WindowHandle::NULL)));
    assert!(mutations.contains(&Mutation::Shape(
        overlay,
        ShapeOp::Subtract,
        vec![Rect::new(0, 0, 10, 10)]
    )));
}

#[test]
fn subscriptions_take_event_kind_names() {
    let rig = rig();
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(0, 0, 800, 600));
    let (listener, rx) = ChannelSink::pair();
    rig.host.subscribe(game, "move", listener.clone()).unwrap();
    assert!(matches!(
        rig.host.subscribe(game, "resize", listener.clone()),
        Err(PlatformError::UnknownEventKind(k)) if k == "resize"
    ));

    let bounds = Rect::new(10, 20, 300, 400);
    rig.events.emit(RawEvent::Geometry {
        window: game,
        bounds,
        phase: MovePhase::End,
    });
    let delivery = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(
        delivery.event,
        WindowEvent::Move {
            bounds,
            phase: MovePhase::End
        }
    );

    assert!(rig.host.unsubscribe(game, "move", &listener).unwrap());
    assert!(!rig.host.unsubscribe(game, "move", &listener).unwrap());
    assert_eq!(rig.host.events().subscription_count(), 0);
}

#[test]
fn pins_follow_through_the_host() {
    let rig = rig();
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(100, 100, 800, 600));
    let tool = rig
        .desk
        .add_top_level(WindowSpec::new("Tool").rect(120, 120, 100, 100));
    rig.host.pin(tool, game).unwrap();

    let moved = Rect::new(200, 150, 800, 600);
    rig.host.set_bounds(game, moved).unwrap();
    rig.events.emit(RawEvent::Geometry {
        window: game,
        bounds: moved,
        phase: MovePhase::Moving,
    });
    assert!(wait_until(WAIT, || rig.host.bounds(tool) == Rect::new(220, 170, 100, 100)));
    assert!(rig.host.unpin(tool));
    assert!(!rig.host.unpin(tool));
}

#[test]
fn dropping_the_host_stops_dispatch() {
    let rig = rig();
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(0, 0, 800, 600));
    let tool = rig
        .desk
        .add_top_level(WindowSpec::new("Tool").rect(0, 0, 50, 50));
    rig.host.subscribe(game, "close", listener_fn(|_| {})).unwrap();
    rig.host.pin(tool, game).unwrap();
    let events = rig.events.clone();
    drop(rig.host);
    assert!(wait_until(WAIT, || {
        events.installed().is_empty() && !events.is_open(EventChannel::Structural)
    }));
}
