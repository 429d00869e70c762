use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::error::{PlatformError, Result};
use crate::events::{
    EventBackend, EventChannel, EventKind, EventPump, HookGroup, HookKey, PumpWaker, Pumped,
    RawEvent,
};
use crate::handle::WindowHandle;

/// Hook registration history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookLog {
    Installed(HookKey),
    Uninstalled(HookKey),
}

enum Msg {
    Raw(RawEvent),
    Wake,
    Fail(PlatformError),
}

#[derive(Default)]
struct EvState {
    installed: HashSet<HookKey>,
    log: Vec<HookLog>,
    open: HashMap<EventChannel, usize>,
    opens: usize,
    dropped: usize,
    open_failure: Option<PlatformError>,
    install_failures: HashSet<HookKey>,
}

struct Shared {
    state: Mutex<EvState>,
    structural: (Sender<Msg>, Receiver<Msg>),
    input: (Sender<Msg>, Receiver<Msg>),
}

impl Shared {
    fn queue(&self, channel: EventChannel) -> &(Sender<Msg>, Receiver<Msg>) {
        match channel {
            EventChannel::Structural => &self.structural,
            EventChannel::Input => &self.input,
        }
    }
}

/// Scripted event source.
///
/// Hook keys mirror the Win32 grouping: Move needs `Object` and `System` on the window, Close
/// needs `Object`, Show a global `Object` hook and Click a global `Input` tap. Emitted events only
/// reach a pump when a hook covering them is installed, so a missing registration shows up as a
/// missing callback.
pub struct FakeEventBackend {
    shared: Arc<Shared>,
}

impl Default for FakeEventBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEventBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EvState::default()),
                structural: unbounded(),
                input: unbounded(),
            }),
        }
    }

    fn channel_of(event: &RawEvent) -> EventChannel {
        match event {
            RawEvent::ButtonPress { .. } => EventChannel::Input,
            _ => EventChannel::Structural,
        }
    }

    /// Queues an event for the pump of its channel. Returns false, and drops the event, when no
    /// pump is open for that channel.
    pub fn emit(&self, event: RawEvent) -> bool {
        let channel = Self::channel_of(&event);
        {
            let mut state = self.shared.state.lock();
            if state.open.get(&channel).copied().unwrap_or(0) == 0 {
                state.dropped += 1;
                return false;
            }
        }
        self.shared.queue(channel).0.send(Msg::Raw(event)).is_ok()
    }

    /// Makes the next wait of `channel`'s pump return `err`.
    pub fn fail_pump(&self, channel: EventChannel, err: PlatformError) {
        let _ = self.shared.queue(channel).0.send(Msg::Fail(err));
    }

    pub fn fail_open(&self, err: Option<PlatformError>) {
        self.shared.state.lock().open_failure = err;
    }

    pub fn fail_install(&self, key: HookKey) {
        self.shared.state.lock().install_failures.insert(key);
    }

    pub fn installed(&self) -> Vec<HookKey> {
        let mut keys: Vec<HookKey> = self.shared.state.lock().installed.iter().copied().collect();
        keys.sort();
        keys
    }

    pub fn log(&self) -> Vec<HookLog> {
        self.shared.state.lock().log.clone()
    }

    pub fn is_open(&self, channel: EventChannel) -> bool {
        self.shared.state.lock().open.get(&channel).copied().unwrap_or(0) > 0
    }

    pub fn pump_opens(&self) -> usize {
        self.shared.state.lock().opens
    }

    pub fn dropped(&self) -> usize {
        self.shared.state.lock().dropped
    }
}

impl EventBackend for FakeEventBackend {
    fn channel_for(&self, kind: EventKind) -> EventChannel {
        match kind {
            EventKind::Click => EventChannel::Input,
            _ => EventChannel::Structural,
        }
    }

    fn hook_keys(&self, window: WindowHandle, kind: EventKind) -> Vec<HookKey> {
        match kind {
            EventKind::Move => vec![
                HookKey::new(window, HookGroup::Object),
                HookKey::new(window, HookGroup::System),
            ],
            EventKind::Close => vec![HookKey::new(window, HookGroup::Object)],
            EventKind::Show => vec![HookKey::global(HookGroup::Object)],
            EventKind::Click => vec![HookKey::global(HookGroup::Input)],
        }
    }

    fn open_pump(&self, channel: EventChannel) -> Result<Box<dyn EventPump>> {
        let mut state = self.shared.state.lock();
        if let Some(err) = state.open_failure.clone() {
            return Err(err);
        }
        state.opens += 1;
        *state.open.entry(channel).or_default() += 1;
        let (tx, rx) = self.shared.queue(channel).clone();
        while rx.try_recv().is_ok() {}
        Ok(Box::new(FakePump {
            channel,
            tx,
            rx,
            keys: HashSet::new(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeWaker(Sender<Msg>);

impl PumpWaker for FakeWaker {
    fn wake(&self) {
        let _ = self.0.send(Msg::Wake);
    }
}

struct FakePump {
    channel: EventChannel,
    tx: Sender<Msg>,
    rx: Receiver<Msg>,
    keys: HashSet<HookKey>,
    shared: Arc<Shared>,
}

impl FakePump {
    fn covered(&self, event: &RawEvent) -> bool {
        let state = self.shared.state.lock();
        let has = |target, group| state.installed.contains(&HookKey::new(target, group));
        match event {
            RawEvent::Geometry { window, .. } | RawEvent::Destroyed { window } => {
                has(*window, HookGroup::Object)
            }
            RawEvent::Created { .. } => has(WindowHandle::NULL, HookGroup::Object),
            RawEvent::ButtonPress { .. } => has(WindowHandle::NULL, HookGroup::Input),
        }
    }
}

impl EventPump for FakePump {
    fn waker(&self) -> Arc<dyn PumpWaker> {
        Arc::new(FakeWaker(self.tx.clone()))
    }

    fn install(&mut self, key: &HookKey) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.install_failures.contains(key) {
            return Err(PlatformError::resource("event hook"));
        }
        if state.installed.insert(*key) {
            state.log.push(HookLog::Installed(*key));
        }
        self.keys.insert(*key);
        Ok(())
    }

    fn uninstall(&mut self, key: &HookKey) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.installed.remove(key) {
            state.log.push(HookLog::Uninstalled(*key));
        }
        self.keys.remove(key);
        Ok(())
    }

    fn next_event(&mut self) -> Result<Pumped> {
        loop {
            match self.rx.recv() {
                Ok(Msg::Raw(event)) => {
                    if self.covered(&event) {
                        return Ok(Pumped::Event(event));
                    }
                    self.shared.state.lock().dropped += 1;
                }
                Ok(Msg::Wake) => return Ok(Pumped::Woken),
                Ok(Msg::Fail(err)) => return Err(err),
                Err(_) => return Ok(Pumped::Closed),
            }
        }
    }
}

impl Drop for FakePump {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        for key in self.keys.drain() {
            if state.installed.remove(&key) {
                state.log.push(HookLog::Uninstalled(key));
            }
        }
        if let Some(count) = state.open.get_mut(&self.channel) {
            *count = count.saturating_sub(1);
        }
    }
}
