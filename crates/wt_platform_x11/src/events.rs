use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::record::{self, ConnectionExt as _, ExtRange, Range, Range8, Range16};
use x11rb::protocol::xproto::{
    BUTTON_PRESS_EVENT, ButtonPressEvent, ChangeWindowAttributesAux, ClientMessageEvent,
    ConnectionExt as _, CREATE_NOTIFY_EVENT, CreateWindowAux, EventMask, MAP_NOTIFY_EVENT, Window,
    WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::TryParse;

use wt_platform::{
    EventBackend, EventChannel, EventKind, EventPump, HookGroup, HookKey, MovePhase,
    PlatformError, PumpWaker, Pumped, RawEvent, Rect, Result, WindowHandle,
};

use crate::connection::{X11Connection, connection_error, handle, id_error, reply_error, xid};

/// Posts a client message to the pump's private window.
struct ClientMessageWaker {
    x: Arc<X11Connection>,
    window: Window,
}

impl PumpWaker for ClientMessageWaker {
    fn wake(&self) {
        let event = ClientMessageEvent::new(32, self.window, self.x.atoms._WINTRACK_WAKE, [0u32; 5]);
        if let Err(err) = self
            .x
            .conn
            .send_event(false, self.window, EventMask::NO_EVENT, event)
        {
            log::warn!("wake failed: {err}");
            return;
        }
        let _ = self.x.conn.flush();
    }
}

/// Structure notifications on a private connection.
///
/// A window key selects StructureNotify on that window, the global key SubstructureNotify on the
/// root.
struct StructurePump {
    x: Arc<X11Connection>,
    wake_window: Window,
    installed: HashSet<HookKey>,
    pending: VecDeque<RawEvent>,
}

impl StructurePump {
    fn open() -> Result<Self> {
        let x = Arc::new(X11Connection::open()?);
        let wake_window = x.conn.generate_id().map_err(id_error)?;
        x.conn
            .create_window(
                x11rb::COPY_DEPTH_FROM_PARENT,
                wake_window,
                x.root,
                -1,
                -1,
                1,
                1,
                0,
                WindowClass::INPUT_ONLY,
                x11rb::COPY_FROM_PARENT,
                &CreateWindowAux::new(),
            )
            .map_err(connection_error)?
            .check()
            .map_err(reply_error)?;
        Ok(Self {
            x,
            wake_window,
            installed: HashSet::new(),
            pending: VecDeque::new(),
        })
    }

    fn target(&self, key: &HookKey) -> Window {
        xid(key.target).unwrap_or(self.x.root)
    }

    fn mask_for(&self, window: Window) -> EventMask {
        let mut mask = EventMask::NO_EVENT;
        for key in &self.installed {
            match xid(key.target) {
                Some(target) if target == window => mask = mask | EventMask::STRUCTURE_NOTIFY,
                None if window == self.x.root => mask = mask | EventMask::SUBSTRUCTURE_NOTIFY,
                _ => {}
            }
        }
        mask
    }

    fn select(&self, window: Window) -> Result<()> {
        let aux = ChangeWindowAttributesAux::new().event_mask(self.mask_for(window));
        self.x
            .conn
            .change_window_attributes(window, &aux)
            .map_err(connection_error)?
            .check()
            .map_err(reply_error)
    }

    /// Frame bounds, the same rectangle `WindowSystem::bounds` reports.
    fn bounds_of(&self, window: Window, synthetic: bool, local: Rect) -> Rect {
        if let Some(frame) = self.x.frame_bounds(window) {
            return frame;
        }
        // window managers send synthetic notifications in root coordinates
        if synthetic {
            return local;
        }
        match self.x.absolute_origin(window) {
            Some((x, y)) => Rect::new(x, y, local.width, local.height),
            None => local,
        }
    }

    fn queue_mapped_tree(&mut self, window: Window) {
        let mut stack = vec![window];
        while let Some(window) = stack.pop() {
            self.pending.push_back(RawEvent::Created {
                window: handle(window),
                tag: u32::from(MAP_NOTIFY_EVENT),
            });
            stack.extend(self.x.children(window));
        }
    }

    fn translate(&mut self, event: Event) -> Result<Option<Pumped>> {
        let raw = match event {
            Event::ConfigureNotify(e) if e.event == e.window => {
                let local = Rect::new(
                    i32::from(e.x),
                    i32::from(e.y),
                    i32::from(e.width),
                    i32::from(e.height),
                );
                RawEvent::Geometry {
                    window: handle(e.window),
                    bounds: self.bounds_of(e.window, e.response_type & 0x80 != 0, local),
                    phase: MovePhase::End,
                }
            }
            Event::DestroyNotify(e) => RawEvent::Destroyed {
                window: handle(e.window),
            },
            Event::CreateNotify(e) if e.parent == self.x.root => RawEvent::Created {
                window: handle(e.window),
                tag: u32::from(CREATE_NOTIFY_EVENT),
            },
            Event::MapNotify(e) if e.event == self.x.root => {
                self.queue_mapped_tree(e.window);
                return Ok(None);
            }
            Event::ClientMessage(e)
                if e.window == self.wake_window && e.type_ == self.x.atoms._WINTRACK_WAKE =>
            {
                return Ok(Some(Pumped::Woken));
            }
            Event::Error(err) => {
                return Err(PlatformError::backend(format!(
                    "X11 error {:?} on request {}",
                    err.error_kind, err.major_opcode
                )));
            }
            _ => return Ok(None),
        };
        Ok(Some(Pumped::Event(raw)))
    }
}

impl EventPump for StructurePump {
    fn waker(&self) -> Arc<dyn PumpWaker> {
        Arc::new(ClientMessageWaker {
            x: self.x.clone(),
            window: self.wake_window,
        })
    }

    fn install(&mut self, key: &HookKey) -> Result<()> {
        if !self.installed.insert(*key) {
            return Ok(());
        }
        let window = self.target(key);
        if let Err(err) = self.select(window) {
            self.installed.remove(key);
            return Err(err);
        }
        log::debug!("selected structure events on {:#x}", window);
        Ok(())
    }

    fn uninstall(&mut self, key: &HookKey) -> Result<()> {
        if !self.installed.remove(key) {
            return Ok(());
        }
        let window = self.target(key);
        // the window may already be destroyed, which is fine
        if let Err(err) = self.select(window) {
            if err.is_fatal() {
                return Err(err);
            }
            log::trace!("deselect on {:#x}: {err}", window);
        }
        Ok(())
    }

    fn next_event(&mut self) -> Result<Pumped> {
        loop {
            if let Some(raw) = self.pending.pop_front() {
                return Ok(Pumped::Event(raw));
            }
            let event = self.x.conn.wait_for_event().map_err(connection_error)?;
            if let Some(pumped) = self.translate(event)? {
                return Ok(pumped);
            }
        }
    }
}

impl Drop for StructurePump {
    fn drop(&mut self) {
        let _ = self.x.conn.destroy_window(self.wake_window);
        let _ = self.x.conn.flush();
    }
}

enum Recorded {
    Event(RawEvent),
    Wake,
    Failed(PlatformError),
}

/// Consecutive reader failures after which a broken context is left stopped.
const MAX_RECORD_RESTARTS: u32 = 3;

/// Decides whether a failed RECORD context is enabled again.
///
/// Connection loss is never retried. Protocol errors are, until they repeat without a
/// recorded event in between.
#[derive(Debug, Default)]
struct Restarts {
    consecutive: u32,
}

impl Restarts {
    fn recorded(&mut self) {
        self.consecutive = 0;
    }

    fn retry(&mut self, err: &PlatformError) -> bool {
        if err.is_fatal() || self.consecutive >= MAX_RECORD_RESTARTS {
            return false;
        }
        self.consecutive += 1;
        true
    }
}

struct ChannelWaker(Sender<Recorded>);

impl PumpWaker for ChannelWaker {
    fn wake(&self) {
        let _ = self.0.send(Recorded::Wake);
    }
}

/// Intercepted reply category of server-originated protocol.
const FROM_SERVER: u8 = 0;
const END_OF_DATA: u8 = 5;

const fn empty8() -> Range8 {
    Range8 { first: 0, last: 0 }
}

const fn empty_ext() -> ExtRange {
    ExtRange {
        major: empty8(),
        minor: Range16 { first: 0, last: 0 },
    }
}

fn button_press_range() -> Range {
    Range {
        core_requests: empty8(),
        core_replies: empty8(),
        ext_requests: empty_ext(),
        ext_replies: empty_ext(),
        delivered_events: empty8(),
        device_events: Range8 {
            first: BUTTON_PRESS_EVENT,
            last: BUTTON_PRESS_EVENT,
        },
        errors: empty8(),
        client_started: false,
        client_died: false,
    }
}

/// Global button presses through the RECORD extension.
///
/// Recorded data arrives on a second connection read by a helper thread, which feeds the
/// channel `next_event` waits on.
struct RecordPump {
    control: X11Connection,
    tx: Sender<Recorded>,
    rx: Receiver<Recorded>,
    context: Option<(record::Context, JoinHandle<()>)>,
    restarts: Restarts,
}

impl RecordPump {
    fn open() -> Result<Self> {
        let control = X11Connection::open()?;
        if !control.has_record {
            return Err(PlatformError::Unsupported("RECORD extension"));
        }
        let (tx, rx) = unbounded();
        Ok(Self {
            control,
            tx,
            rx,
            context: None,
            restarts: Restarts::default(),
        })
    }

    fn start(&mut self) -> Result<()> {
        let conn = &self.control.conn;
        let context = conn.generate_id().map_err(id_error)?;
        conn.record_create_context(
            context,
            0,
            &[u32::from(record::CS::ALL_CLIENTS)],
            &[button_press_range()],
        )
        .map_err(connection_error)?
        .check()
        .map_err(reply_error)?;
        let (data, _) = x11rb::connect(None)
            .map_err(|e| PlatformError::connection(format!("record data connection: {e}")))?;
        let tx = self.tx.clone();
        let reader = thread::Builder::new()
            .name("wt-x11-record".into())
            .spawn(move || read_records(data, context, tx))
            .map_err(|e| PlatformError::resource(format!("record reader thread: {e}")))?;
        log::debug!("record context {:#x} enabled", context);
        self.context = Some((context, reader));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some((context, reader)) = self.context.take() else {
            return Ok(());
        };
        let conn = &self.control.conn;
        conn.record_disable_context(context)
            .map_err(connection_error)?;
        conn.record_free_context(context).map_err(connection_error)?;
        self.control.flush()?;
        if reader.join().is_err() {
            log::error!("record reader thread panicked");
        }
        Ok(())
    }
}

fn read_records(data: RustConnection, context: record::Context, tx: Sender<Recorded>) {
    let replies = match data.record_enable_context(context) {
        Ok(replies) => replies,
        Err(err) => {
            let _ = tx.send(Recorded::Failed(connection_error(err)));
            return;
        }
    };
    for reply in replies {
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                let _ = tx.send(Recorded::Failed(reply_error(err)));
                return;
            }
        };
        match reply.category {
            END_OF_DATA => break,
            FROM_SERVER => {}
            _ => continue,
        }
        for chunk in reply.data.chunks_exact(32) {
            if chunk[0] & 0x7f != BUTTON_PRESS_EVENT {
                continue;
            }
            if let Ok((press, _)) = ButtonPressEvent::try_parse(chunk) {
                let event = RawEvent::ButtonPress {
                    window: WindowHandle::NULL,
                    x: i32::from(press.root_x),
                    y: i32::from(press.root_y),
                };
                if tx.send(Recorded::Event(event)).is_err() {
                    return;
                }
            }
        }
    }
}

impl EventPump for RecordPump {
    fn waker(&self) -> Arc<dyn PumpWaker> {
        Arc::new(ChannelWaker(self.tx.clone()))
    }

    fn install(&mut self, key: &HookKey) -> Result<()> {
        if key.group != HookGroup::Input || self.context.is_some() {
            return Ok(());
        }
        self.restarts = Restarts::default();
        self.start()
    }

    fn uninstall(&mut self, key: &HookKey) -> Result<()> {
        if key.group != HookGroup::Input {
            return Ok(());
        }
        self.stop()
    }

    fn next_event(&mut self) -> Result<Pumped> {
        match self.rx.recv() {
            Ok(Recorded::Event(raw)) => {
                self.restarts.recorded();
                Ok(Pumped::Event(raw))
            }
            Ok(Recorded::Wake) => Ok(Pumped::Woken),
            Ok(Recorded::Failed(err)) => {
                // the reader has exited; a protocol error only costs this context
                if self.context.is_some() && self.restarts.retry(&err) {
                    log::warn!("record context failed, enabling a new one: {err}");
                    self.stop()?;
                    self.start()?;
                } else if !err.is_fatal() {
                    log::error!("record context failed again, click events stop: {err}");
                    self.stop()?;
                }
                Err(err)
            }
            Err(_) => Ok(Pumped::Closed),
        }
    }
}

impl Drop for RecordPump {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("record shutdown: {err}");
        }
    }
}

/// X11 event source: structure notifications and XRecord button presses.
#[derive(Debug, Default)]
pub struct X11Events;

impl X11Events {
    pub fn new() -> Self {
        Self
    }
}

impl EventBackend for X11Events {
    fn channel_for(&self, kind: EventKind) -> EventChannel {
        match kind {
            EventKind::Click => EventChannel::Input,
            _ => EventChannel::Structural,
        }
    }

    fn hook_keys(&self, window: WindowHandle, kind: EventKind) -> Vec<HookKey> {
        match kind {
            EventKind::Move | EventKind::Close => vec![HookKey::new(window, HookGroup::Structure)],
            EventKind::Show => vec![HookKey::global(HookGroup::Structure)],
            EventKind::Click => vec![HookKey::global(HookGroup::Input)],
        }
    }

    fn open_pump(&self, channel: EventChannel) -> Result<Box<dyn EventPump>> {
        match channel {
            EventChannel::Structural => Ok(Box::new(StructurePump::open()?)),
            EventChannel::Input => Ok(Box::new(RecordPump::open()?)),
        }
    }
}
