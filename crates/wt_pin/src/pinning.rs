use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use wt_events::{Delivery, DeliveryAck, EventSink, EventSubsystem, Listener};
use wt_platform::{EventKind, PlatformError, Rect, Result, WindowEvent, WindowHandle, WindowSystem};

use crate::anchor::PinAnchor;

struct Pin {
    parent: WindowHandle,
    anchor: PinAnchor,
    listener: Listener,
}

impl Pin {
    fn triples(&self, window: WindowHandle) -> [(WindowHandle, EventKind); 3] {
        triples(window, self.parent)
    }
}

fn triples(window: WindowHandle, parent: WindowHandle) -> [(WindowHandle, EventKind); 3] {
    [
        (parent, EventKind::Move),
        (parent, EventKind::Close),
        (window, EventKind::Close),
    ]
}

struct Inner {
    events: Arc<EventSubsystem>,
    windows: Arc<dyn WindowSystem>,
    pins: Mutex<HashMap<WindowHandle, Pin>>,
}

impl Inner {
    fn follow(&self, pinned: WindowHandle, parent_bounds: Rect) {
        let Some((parent, anchor)) = self
            .pins
            .lock()
            .get(&pinned)
            .map(|pin| (pin.parent, pin.anchor))
        else {
            return;
        };
        let current = self.windows.bounds(pinned);
        let work_area = self.windows.work_area(parent);
        let target = anchor.place(parent_bounds, current.width, current.height, work_area);
        if target == current {
            return;
        }
        if let Err(err) = self.windows.set_bounds(pinned, target) {
            log::warn!("moving pinned window {pinned} failed: {err}");
        }
    }

    fn unpin(&self, window: WindowHandle) -> bool {
        // The registry lock is released before unsubscribing: unsubscribe waits for callbacks
        // that may themselves be waiting on it.
        let Some(pin) = self.pins.lock().remove(&window) else {
            return false;
        };
        for (target, kind) in pin.triples(window) {
            self.events.unsubscribe(target, kind, &pin.listener);
        }
        log::debug!("unpinned {window} from {}", pin.parent);
        true
    }
}

struct PinSink {
    pinned: WindowHandle,
    inner: Weak<Inner>,
}

impl EventSink for PinSink {
    fn deliver(&self, delivery: &Delivery) -> DeliveryAck {
        let Some(inner) = self.inner.upgrade() else {
            return DeliveryAck::Disconnected;
        };
        match delivery.event {
            WindowEvent::Move { bounds, .. } => inner.follow(self.pinned, bounds),
            WindowEvent::Close => {
                inner.unpin(self.pinned);
            }
            _ => {}
        }
        DeliveryAck::Delivered
    }
}

/// Registry of pinned windows.
///
/// Each pin subscribes to move and close events of the parent and to close events of the
/// pinned window. A pin ends on [`Pinning::unpin`], when either window closes, or when the
/// registry is dropped.
pub struct Pinning {
    inner: Arc<Inner>,
}

impl Pinning {
    pub fn new(events: Arc<EventSubsystem>, windows: Arc<dyn WindowSystem>) -> Self {
        Self {
            inner: Arc::new(Inner {
                events,
                windows,
                pins: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Pins `window` to `parent` at its current offset from the nearest parent corner.
    /// Re-pinning an already pinned window replaces the old pin.
    pub fn pin(&self, window: WindowHandle, parent: WindowHandle) -> Result<()> {
        if window.is_null() || parent.is_null() || window == parent {
            return Err(PlatformError::backend(format!(
                "cannot pin {window} to {parent}"
            )));
        }
        self.inner.unpin(window);

        let windows = &self.inner.windows;
        let anchor = PinAnchor::compute(windows.bounds(parent), windows.bounds(window));
        let listener: Listener = Arc::new(PinSink {
            pinned: window,
            inner: Arc::downgrade(&self.inner),
        });
        self.inner.pins.lock().insert(
            window,
            Pin {
                parent,
                anchor,
                listener: Arc::clone(&listener),
            },
        );

        let wanted = triples(window, parent);
        for (done, (target, kind)) in wanted.iter().enumerate() {
            if let Err(err) = self.inner.events.subscribe(*target, *kind, Arc::clone(&listener)) {
                self.inner.pins.lock().remove(&window);
                for (target, kind) in &wanted[..done] {
                    self.inner.events.unsubscribe(*target, *kind, &listener);
                }
                return Err(err);
            }
        }
        log::debug!("pinned {window} to {parent} at {anchor:?}");
        Ok(())
    }

    /// Returns false when `window` was not pinned.
    pub fn unpin(&self, window: WindowHandle) -> bool {
        self.inner.unpin(window)
    }

    pub fn parent_of(&self, window: WindowHandle) -> Option<WindowHandle> {
        self.inner.pins.lock().get(&window).map(|pin| pin.parent)
    }

    pub fn anchor_of(&self, window: WindowHandle) -> Option<PinAnchor> {
        self.inner.pins.lock().get(&window).map(|pin| pin.anchor)
    }

    pub fn pinned(&self) -> Vec<WindowHandle> {
        let mut windows: Vec<WindowHandle> = self.inner.pins.lock().keys().copied().collect();
        windows.sort();
        windows
    }
}

impl Drop for Pinning {
    fn drop(&mut self) {
        let windows: Vec<WindowHandle> = self.inner.pins.lock().keys().copied().collect();
        for window in windows {
            self.inner.unpin(window);
        }
    }
}
