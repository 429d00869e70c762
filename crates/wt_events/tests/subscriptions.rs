use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use wt_events::{ChannelSink, Delivery, DeliveryAck, EventSink, EventSubsystem, Listener, listener_fn};
use wt_locate::ClassMatcher;
use wt_platform::testing::{FakeDesktop, FakeEventBackend, HookLog, WindowSpec, wait_until};
use wt_platform::{
    EventChannel, EventKind, HookGroup, HookKey, MovePhase, PlatformError, RawEvent, Rect,
    WindowEvent, WindowHandle,
};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

struct Rig {
    desk: Arc<FakeDesktop>,
    backend: Arc<FakeEventBackend>,
    events: Arc<EventSubsystem>,
}

fn rig() -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();
    let desk = Arc::new(FakeDesktop::new(1920, 1080));
    let backend = Arc::new(FakeEventBackend::new());
    let events = Arc::new(EventSubsystem::new(
        backend.clone(),
        desk.clone(),
        Arc::new(ClassMatcher::new(["RuneScape"])),
    ));
    Rig {
        desk,
        backend,
        events,
    }
}

fn moved(window: WindowHandle, bounds: Rect) -> RawEvent {
    RawEvent::Geometry {
        window,
        bounds,
        phase: MovePhase::End,
    }
}

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Listener {
    let log = Arc::clone(log);
    listener_fn(move |_| log.lock().push(name))
}

#[test]
fn move_event_is_delivered_once_with_exact_bounds() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Move, sink).unwrap();

    assert!(rig.backend.emit(moved(w, Rect::new(10, 20, 300, 400))));
    let got = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(
        got,
        Delivery {
            window: w,
            event: WindowEvent::Move {
                bounds: Rect::new(10, 20, 300, 400),
                phase: MovePhase::End,
            },
        }
    );
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn move_phases_pass_through() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Move, sink).unwrap();
    for phase in [MovePhase::Start, MovePhase::Moving, MovePhase::End] {
        rig.backend.emit(RawEvent::Geometry {
            window: w,
            bounds: Rect::new(0, 0, 10, 10),
            phase,
        });
    }
    let phases: Vec<MovePhase> = (0..3)
        .map(|_| match rx.recv_timeout(WAIT).unwrap().event {
            WindowEvent::Move { phase, .. } => phase,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(phases, vec![MovePhase::Start, MovePhase::Moving, MovePhase::End]);
}

#[test]
fn two_subscriptions_get_one_callback_each_in_registration_order() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let log = Arc::new(Mutex::new(Vec::new()));
    rig.events.subscribe(w, EventKind::Move, recorder(&log, "first")).unwrap();
    rig.events.subscribe(w, EventKind::Move, recorder(&log, "second")).unwrap();

    rig.backend.emit(moved(w, Rect::new(1, 2, 3, 4)));
    assert!(wait_until(WAIT, || log.lock().len() == 2));
    std::thread::sleep(QUIET);
    assert_eq!(*log.lock(), vec!["first", "second"]);
}

#[test]
fn duplicate_registrations_are_removed_one_at_a_time() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let log = Arc::new(Mutex::new(Vec::new()));
    let listener = recorder(&log, "dup");
    rig.events.subscribe(w, EventKind::Move, listener.clone()).unwrap();
    rig.events.subscribe(w, EventKind::Move, listener.clone()).unwrap();

    assert!(rig.events.unsubscribe(w, EventKind::Move, &listener));
    assert_eq!(rig.events.subscription_count(), 1);
    rig.backend.emit(moved(w, Rect::new(0, 0, 5, 5)));
    assert!(wait_until(WAIT, || log.lock().len() == 1));
    std::thread::sleep(QUIET);
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn unsubscribing_twice_is_a_no_op() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, _rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Close, sink.clone()).unwrap();
    assert!(rig.events.unsubscribe(w, EventKind::Close, &sink));
    assert!(!rig.events.unsubscribe(w, EventKind::Close, &sink));
    // wrong kind or window never matches
    assert!(!rig.events.unsubscribe(w, EventKind::Move, &sink));
}

#[test]
fn overlapping_kinds_share_hooks() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, _rx) = ChannelSink::pair();
    let object = HookKey::new(w, HookGroup::Object);
    let system = HookKey::new(w, HookGroup::System);

    rig.events.subscribe(w, EventKind::Move, sink.clone()).unwrap();
    rig.events.subscribe(w, EventKind::Close, sink.clone()).unwrap();
    assert_eq!(rig.events.hook_refcount(&object), 2);
    assert_eq!(rig.events.hook_refcount(&system), 1);
    let installs = rig
        .backend
        .log()
        .into_iter()
        .filter(|e| *e == HookLog::Installed(object))
        .count();
    assert_eq!(installs, 1);

    rig.events.unsubscribe(w, EventKind::Move, &sink);
    assert_eq!(rig.events.hook_refcount(&object), 1);
    assert!(wait_until(WAIT, || rig.backend.installed() == vec![object]));
}

#[test]
fn last_unsubscribe_releases_hooks_and_joins_the_thread() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Move, sink.clone()).unwrap();
    assert!(rig.events.is_running(EventChannel::Structural));
    assert!(!rig.events.is_running(EventChannel::Input));

    rig.events.unsubscribe(w, EventKind::Move, &sink);
    assert!(!rig.events.is_running(EventChannel::Structural));
    assert!(!rig.backend.is_open(EventChannel::Structural));
    assert!(rig.backend.installed().is_empty());

    assert!(!rig.backend.emit(moved(w, Rect::new(0, 0, 1, 1))));
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn unsubscribed_window_stops_receiving_while_others_continue() {
    let rig = rig();
    let a = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let b = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink_a, rx_a) = ChannelSink::pair();
    let (sink_b, rx_b) = ChannelSink::pair();
    rig.events.subscribe(a, EventKind::Move, sink_a.clone()).unwrap();
    rig.events.subscribe(b, EventKind::Move, sink_b).unwrap();

    rig.events.unsubscribe(a, EventKind::Move, &sink_a);
    rig.backend.emit(moved(a, Rect::new(0, 0, 1, 1)));
    rig.backend.emit(moved(b, Rect::new(0, 0, 2, 2)));
    assert_eq!(rx_b.recv_timeout(WAIT).unwrap().window, b);
    assert!(rx_a.recv_timeout(QUIET).is_err());
}

#[test]
fn close_keeps_the_subscription() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Close, sink).unwrap();
    rig.desk.destroy(w);
    rig.backend.emit(RawEvent::Destroyed { window: w });
    assert_eq!(rx.recv_timeout(WAIT).unwrap().event, WindowEvent::Close);
    assert_eq!(rig.events.subscription_count(), 1);
}

#[test]
fn show_goes_to_wildcard_and_specific_subscriptions() {
    let rig = rig();
    let frame = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let game = rig.desk.add(frame, WindowSpec::new("RuneScape"));
    let other = rig.desk.add_top_level(WindowSpec::new("Notepad"));

    let (any, rx_any) = ChannelSink::pair();
    let (specific, rx_specific) = ChannelSink::pair();
    let (unrelated, rx_unrelated) = ChannelSink::pair();
    rig.events.subscribe(WindowHandle::NULL, EventKind::Show, any).unwrap();
    rig.events.subscribe(game, EventKind::Show, specific).unwrap();
    rig.events.subscribe(other, EventKind::Show, unrelated).unwrap();

    // the wrapping frame matches too, but is not the deepest match
    rig.backend.emit(RawEvent::Created {
        window: frame,
        tag: 0x8000,
    });
    rig.backend.emit(RawEvent::Created {
        window: game,
        tag: 0x8000,
    });
    let expected = WindowEvent::Show {
        window: game,
        tag: 0x8000,
    };
    assert_eq!(rx_any.recv_timeout(WAIT).unwrap().event, expected);
    assert_eq!(rx_specific.recv_timeout(WAIT).unwrap().event, expected);
    assert!(rx_any.recv_timeout(QUIET).is_err());
    assert!(rx_unrelated.try_recv().is_err());
}

#[test]
fn clicks_are_routed_to_the_window_under_the_pointer() {
    let rig = rig();
    let game = rig
        .desk
        .add_top_level(WindowSpec::new("RuneScape").rect(100, 100, 200, 200));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(game, EventKind::Click, sink).unwrap();
    assert!(rig.events.is_running(EventChannel::Input));

    rig.backend.emit(RawEvent::ButtonPress {
        window: WindowHandle::NULL,
        x: 10,
        y: 10,
    });
    rig.backend.emit(RawEvent::ButtonPress {
        window: WindowHandle::NULL,
        x: 150,
        y: 160,
    });
    let got = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(got.window, game);
    assert_eq!(got.event, WindowEvent::Click { x: 150, y: 160 });
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn resolved_clicks_skip_the_hit_test() {
    let rig = rig();
    let game = rig.desk.add_top_level(WindowSpec::new("RuneScape").rect(0, 0, 10, 10));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(game, EventKind::Click, sink).unwrap();
    rig.backend.emit(RawEvent::ButtonPress {
        window: game,
        x: 900,
        y: 900,
    });
    assert_eq!(rx.recv_timeout(WAIT).unwrap().window, game);
}

#[test]
fn a_callback_may_unsubscribe_itself() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let log = Arc::new(Mutex::new(Vec::new()));
    let slot: Arc<OnceLock<Listener>> = Arc::new(OnceLock::new());
    let once = {
        let events = Arc::downgrade(&rig.events);
        let slot = Arc::clone(&slot);
        let log = Arc::clone(&log);
        listener_fn(move |_| {
            log.lock().push("once");
            if let (Some(events), Some(me)) = (events.upgrade(), slot.get()) {
                events.unsubscribe(w, EventKind::Move, me);
            }
        })
    };
    let _ = slot.set(once.clone());
    rig.events.subscribe(w, EventKind::Move, once).unwrap();
    rig.events.subscribe(w, EventKind::Move, recorder(&log, "always")).unwrap();

    rig.backend.emit(moved(w, Rect::new(0, 0, 1, 1)));
    assert!(wait_until(WAIT, || log.lock().len() == 2));
    rig.backend.emit(moved(w, Rect::new(0, 0, 2, 2)));
    assert!(wait_until(WAIT, || log.lock().len() == 3));
    std::thread::sleep(QUIET);
    assert_eq!(*log.lock(), vec!["once", "always", "always"]);
}

#[test]
fn the_last_subscription_removing_itself_stops_its_thread() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let slot: Arc<OnceLock<Listener>> = Arc::new(OnceLock::new());
    let listener = {
        let events = Arc::downgrade(&rig.events);
        let slot = Arc::clone(&slot);
        listener_fn(move |_| {
            if let (Some(events), Some(me)) = (events.upgrade(), slot.get()) {
                events.unsubscribe(w, EventKind::Close, me);
            }
        })
    };
    let _ = slot.set(listener.clone());
    rig.events.subscribe(w, EventKind::Close, listener).unwrap();
    rig.backend.emit(RawEvent::Destroyed { window: w });

    assert!(wait_until(WAIT, || !rig.backend.is_open(EventChannel::Structural)));
    assert!(!rig.events.is_running(EventChannel::Structural));
    assert_eq!(rig.events.subscription_count(), 0);
}

#[test]
fn subscriptions_made_during_dispatch_start_with_the_next_event() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let log = Arc::new(Mutex::new(Vec::new()));
    let late = recorder(&log, "late");
    let spawner = {
        let events = Arc::downgrade(&rig.events);
        let log = Arc::clone(&log);
        let added = Arc::new(OnceLock::<()>::new());
        listener_fn(move |_| {
            log.lock().push("spawner");
            if added.set(()).is_ok() {
                if let Some(events) = events.upgrade() {
                    events.subscribe(w, EventKind::Move, late.clone()).unwrap();
                }
            }
        })
    };
    rig.events.subscribe(w, EventKind::Move, spawner).unwrap();

    rig.backend.emit(moved(w, Rect::new(0, 0, 1, 1)));
    assert!(wait_until(WAIT, || rig.events.subscription_count() == 2));
    std::thread::sleep(QUIET);
    assert_eq!(*log.lock(), vec!["spawner"]);

    rig.backend.emit(moved(w, Rect::new(0, 0, 2, 2)));
    assert!(wait_until(WAIT, || log.lock().len() == 3));
    assert_eq!(*log.lock(), vec!["spawner", "spawner", "late"]);
}

#[test]
fn a_gone_consumer_is_dropped() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Move, sink).unwrap();
    drop(rx);
    rig.backend.emit(moved(w, Rect::new(0, 0, 1, 1)));
    assert!(wait_until(WAIT, || rig.events.subscription_count() == 0));
    assert!(wait_until(WAIT, || !rig.backend.is_open(EventChannel::Structural)));
}

struct Panicky;

impl EventSink for Panicky {
    fn deliver(&self, _: &Delivery) -> DeliveryAck {
        panic!("listener bug");
    }
}

#[test]
fn a_panicking_callback_does_not_stop_dispatch() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let log = Arc::new(Mutex::new(Vec::new()));
    rig.events.subscribe(w, EventKind::Move, Arc::new(Panicky)).unwrap();
    rig.events.subscribe(w, EventKind::Move, recorder(&log, "ok")).unwrap();
    rig.backend.emit(moved(w, Rect::new(0, 0, 1, 1)));
    rig.backend.emit(moved(w, Rect::new(0, 0, 2, 2)));
    assert!(wait_until(WAIT, || log.lock().len() == 2));
}

#[test]
fn per_event_errors_are_survived() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Move, sink).unwrap();
    rig.backend
        .fail_pump(EventChannel::Structural, PlatformError::resource("bad reply"));
    rig.backend.emit(moved(w, Rect::new(0, 0, 1, 1)));
    assert!(rx.recv_timeout(WAIT).is_ok());
    assert!(rig.events.connection_lost().is_none());
}

#[test]
fn connection_loss_drops_subscriptions_and_is_fatal() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    let (sink, _rx) = ChannelSink::pair();
    rig.events.subscribe(w, EventKind::Move, sink.clone()).unwrap();
    rig.backend.fail_pump(
        EventChannel::Structural,
        PlatformError::connection("broken pipe"),
    );
    assert!(wait_until(WAIT, || rig.events.subscription_count() == 0));
    assert!(!rig.events.is_running(EventChannel::Structural));
    assert!(rig.events.connection_lost().is_some());
    assert!(matches!(
        rig.events.subscribe(w, EventKind::Move, sink),
        Err(PlatformError::ConnectionFailure(_))
    ));
}

#[test]
fn failing_to_open_the_connection_is_fatal() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    rig.backend
        .fail_open(Some(PlatformError::connection("cannot open display")));
    let (sink, _rx) = ChannelSink::pair();
    assert!(matches!(
        rig.events.subscribe(w, EventKind::Move, sink.clone()),
        Err(PlatformError::ConnectionFailure(_))
    ));
    rig.backend.fail_open(None);
    assert!(rig.events.subscribe(w, EventKind::Move, sink).is_err());
    assert_eq!(rig.backend.pump_opens(), 0);
}

#[test]
fn failed_hook_installation_rolls_back() {
    let rig = rig();
    let w = rig.desk.add_top_level(WindowSpec::new("RuneScape"));
    rig.backend.fail_install(HookKey::new(w, HookGroup::System));
    let (sink, _rx) = ChannelSink::pair();
    let err = rig.events.subscribe(w, EventKind::Move, sink).unwrap_err();
    assert!(matches!(err, PlatformError::ResourceAcquisition(_)));
    assert_eq!(rig.events.subscription_count(), 0);
    assert_eq!(rig.events.hook_refcount(&HookKey::new(w, HookGroup::Object)), 0);
    assert!(wait_until(WAIT, || rig.backend.installed().is_empty()));
    assert!(!rig.events.is_running(EventChannel::Structural));
}
