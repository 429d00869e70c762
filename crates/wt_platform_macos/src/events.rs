use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use wt_platform::{
    EventBackend, EventChannel, EventKind, EventPump, HookGroup, HookKey, MovePhase,
    PlatformError, PumpWaker, Pumped, RawEvent, Rect, Result, WindowHandle,
};

use crate::info::{self, handle, window_id};

#[derive(Default)]
struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl PumpWaker for Wakeup {
    fn wake(&self) {
        *self.pending.lock() = true;
        self.cond.notify_one();
    }
}

/// Diffs the window list every `interval`.
///
/// Watched windows report geometry changes and disappearance; the global key reports windows
/// that were not on screen at the previous poll.
struct PollPump {
    interval: Duration,
    wakeup: Arc<Wakeup>,
    installed: HashSet<HookKey>,
    watched: HashMap<WindowHandle, Rect>,
    seen: Option<HashSet<u32>>,
    pending: VecDeque<RawEvent>,
}

impl PollPump {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            wakeup: Arc::new(Wakeup::default()),
            installed: HashSet::new(),
            watched: HashMap::new(),
            seen: None,
            pending: VecDeque::new(),
        }
    }

    fn wants_created(&self) -> bool {
        self.installed.iter().any(|key| key.target.is_null())
    }

    fn poll(&mut self) {
        for (window, last) in self.watched.iter_mut() {
            match window_id(*window).and_then(info::window) {
                Some(current) if current.bounds != *last => {
                    *last = current.bounds;
                    self.pending.push_back(RawEvent::Geometry {
                        window: *window,
                        bounds: current.bounds,
                        phase: MovePhase::End,
                    });
                }
                Some(_) => {}
                None => self.pending.push_back(RawEvent::Destroyed { window: *window }),
            }
        }
        let gone: Vec<WindowHandle> = self
            .pending
            .iter()
            .filter_map(|event| match event {
                RawEvent::Destroyed { window } => Some(*window),
                _ => None,
            })
            .collect();
        for window in gone {
            self.watched.remove(&window);
        }

        if !self.wants_created() {
            self.seen = None;
            return;
        }
        let current: HashSet<u32> = info::on_screen().into_iter().map(|i| i.id).collect();
        if let Some(previous) = &self.seen {
            let mut fresh: Vec<u32> = current.difference(previous).copied().collect();
            fresh.sort_unstable();
            for id in fresh {
                self.pending.push_back(RawEvent::Created {
                    window: handle(id),
                    tag: 0,
                });
            }
        }
        self.seen = Some(current);
    }
}

impl EventPump for PollPump {
    fn waker(&self) -> Arc<dyn PumpWaker> {
        self.wakeup.clone()
    }

    fn install(&mut self, key: &HookKey) -> Result<()> {
        if !self.installed.insert(*key) {
            return Ok(());
        }
        if !key.target.is_null() {
            let bounds = window_id(key.target)
                .and_then(info::window)
                .map(|i| i.bounds)
                .ok_or_else(|| PlatformError::backend(format!("no such window {}", key.target)))
                .inspect_err(|_| {
                    self.installed.remove(key);
                })?;
            self.watched.insert(key.target, bounds);
        }
        log::debug!("polling {:?}", key);
        Ok(())
    }

    fn uninstall(&mut self, key: &HookKey) -> Result<()> {
        if self.installed.remove(key) && !key.target.is_null() {
            self.watched.remove(&key.target);
        }
        Ok(())
    }

    fn next_event(&mut self) -> Result<Pumped> {
        let mut deadline = Instant::now() + self.interval;
        loop {
            if let Some(raw) = self.pending.pop_front() {
                return Ok(Pumped::Event(raw));
            }
            {
                let mut pending = self.wakeup.pending.lock();
                if !*pending {
                    let _ = self.wakeup.cond.wait_until(&mut pending, deadline);
                }
                if *pending {
                    *pending = false;
                    return Ok(Pumped::Woken);
                }
            }
            if Instant::now() >= deadline {
                self.poll();
                deadline = Instant::now() + self.interval;
            }
        }
    }
}

/// Polling event source. Global click taps need accessibility APIs and are not offered.
#[derive(Debug, Clone)]
pub struct CgEvents {
    interval: Duration,
}

impl CgEvents {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl EventBackend for CgEvents {
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
            EventChannel::Structural => Ok(Box::new(PollPump::new(self.interval))),
            EventChannel::Input => Err(PlatformError::Unsupported("global click events")),
        }
    }
}
