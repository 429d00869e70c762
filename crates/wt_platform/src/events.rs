use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{PlatformError, Result};
use crate::geometry::Rect;
use crate::handle::WindowHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Move,
    Close,
    Show,
    Click,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Move,
        EventKind::Close,
        EventKind::Show,
        EventKind::Click,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Move => "move",
            EventKind::Close => "close",
            EventKind::Show => "show",
            EventKind::Click => "click",
        }
    }
}

impl FromStr for EventKind {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PlatformError::UnknownEventKind(s.to_string()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drag phase of a move. Platforms without drag notifications only report `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePhase {
    Start,
    Moving,
    End,
}

impl MovePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MovePhase::Start => "start",
            MovePhase::Moving => "moving",
            MovePhase::End => "end",
        }
    }
}

/// Structured event delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    Move { bounds: Rect, phase: MovePhase },
    Close,
    /// A matching window appeared. `tag` is the raw OS event code that announced it.
    Show { window: WindowHandle, tag: u32 },
    Click { x: i32, y: i32 },
}

impl WindowEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WindowEvent::Move { .. } => EventKind::Move,
            WindowEvent::Close => EventKind::Close,
            WindowEvent::Show { .. } => EventKind::Show,
            WindowEvent::Click { .. } => EventKind::Click,
        }
    }
}

/// Notification as read from the OS, before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Geometry {
        window: WindowHandle,
        bounds: Rect,
        phase: MovePhase,
    },
    Destroyed {
        window: WindowHandle,
    },
    Created {
        window: WindowHandle,
        tag: u32,
    },
    /// Button press at screen coordinates. `window` is [`WindowHandle::NULL`] when the backend
    /// cannot tell which window is under the pointer and a hit test is needed.
    ButtonPress {
        window: WindowHandle,
        x: i32,
        y: i32,
    },
}

/// Category of OS registration a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookGroup {
    /// Win32 system event range (move/size, mouse capture).
    System,
    /// Win32 object event range (create, destroy, location, state).
    Object,
    /// Structure-notify event mask (X11) or window-list watch (polling backends).
    Structure,
    /// Global pointer input tap.
    Input,
}

/// Key of a shared, reference-counted OS registration. A null target means global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookKey {
    pub target: WindowHandle,
    pub group: HookGroup,
}

impl HookKey {
    pub const fn new(target: WindowHandle, group: HookGroup) -> Self {
        Self { target, group }
    }

    pub const fn global(group: HookGroup) -> Self {
        Self::new(WindowHandle::NULL, group)
    }
}

/// Source category served by one dispatch thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    /// Window-manager notifications: geometry, destruction, creation.
    Structural,
    /// Global input recording.
    Input,
}

impl EventChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            EventChannel::Structural => "structural",
            EventChannel::Input => "input",
        }
    }
}

/// Outcome of one blocking wait on a pump.
#[derive(Debug)]
pub enum Pumped {
    Event(RawEvent),
    /// Woken by [`PumpWaker::wake`]; the loop should look at its control queue.
    Woken,
    /// Source ended; the dispatch thread exits.
    Closed,
}

/// Cross-thread poke that makes a blocked [`EventPump::next_event`] return [`Pumped::Woken`].
///
/// A wake issued while the pump is not blocked is kept and returned by the next wait.
pub trait PumpWaker: Send + Sync {
    fn wake(&self);
}

/// Per-thread OS event source. Created on, and only used from, its dispatch thread.
pub trait EventPump {
    fn waker(&self) -> Arc<dyn PumpWaker>;

    fn install(&mut self, key: &HookKey) -> Result<()>;

    /// Removing a key that was never installed is a no-op.
    fn uninstall(&mut self, key: &HookKey) -> Result<()>;

    fn next_event(&mut self) -> Result<Pumped>;
}

/// Platform event source factory.
pub trait EventBackend: Send + Sync {
    fn channel_for(&self, kind: EventKind) -> EventChannel;

    /// OS registrations a `(window, kind)` subscription needs. Keys are shared between
    /// subscriptions and reference-counted by the caller.
    fn hook_keys(&self, window: WindowHandle, kind: EventKind) -> Vec<HookKey>;

    /// Opens the pump for `channel`. Called on the dispatch thread that will own it.
    fn open_pump(&self, channel: EventChannel) -> Result<Box<dyn EventPump>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(
            "resize".parse::<EventKind>(),
            Err(PlatformError::UnknownEventKind("resize".into()))
        );
    }

    #[test]
    fn event_kind_of_payload() {
        let ev = WindowEvent::Show {
            window: WindowHandle::from_raw(4),
            tag: 16,
        };
        assert_eq!(ev.kind(), EventKind::Show);
        assert_eq!(WindowEvent::Close.kind(), EventKind::Close);
    }
}
