use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use windows::Win32::Foundation::{HWND, LPARAM, POINT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, EVENT_OBJECT_CREATE, EVENT_OBJECT_DESTROY, EVENT_OBJECT_LOCATIONCHANGE,
    EVENT_OBJECT_STATECHANGE, EVENT_SYSTEM_CAPTURESTART, EVENT_SYSTEM_MOVESIZEEND,
    EVENT_SYSTEM_MOVESIZESTART, GA_ROOT, GetAncestor, GetCursorPos, GetMessageW, IsWindow, MSG,
    PM_NOREMOVE, PeekMessageW, PostThreadMessageW, TranslateMessage, WINEVENT_OUTOFCONTEXT,
    WINEVENT_SKIPOWNPROCESS, WM_APP, WM_USER,
};

use wt_platform::{
    EventBackend, EventChannel, EventKind, EventPump, HookGroup, HookKey, MovePhase,
    PlatformError, PumpWaker, Pumped, RawEvent, Rect, Result, WindowHandle,
};

use crate::resources::WinEventHook;
use crate::window::{handle, hwnd, window_pid, window_rect};

const WM_WAKE: u32 = WM_APP + 1;
/// Posted by the hook callback so a blocked GetMessageW returns.
const WM_EVENT_QUEUED: u32 = WM_APP + 2;

const OBJID_WINDOW: i32 = 0;
const CHILDID_SELF: i32 = 0;

const SYSTEM_RANGE: (u32, u32) = (0x0001, 0x0030);
const OBJECT_RANGE: (u32, u32) = (0x8000, 0x800B);

/// Per-thread state the hook callback writes into. Out-of-context hooks call back on the
/// thread that installed them, so each dispatch thread sees only its own hooks.
struct ThreadQueue {
    channel: EventChannel,
    thread_id: u32,
    events: VecDeque<RawEvent>,
    /// Identical notifications arrive once per overlapping hook.
    last: Option<(u32, isize, u32)>,
}

thread_local! {
    static QUEUE: RefCell<Option<ThreadQueue>> = const { RefCell::new(None) };
}

fn move_event(hwnd: HWND, phase: MovePhase) -> RawEvent {
    RawEvent::Geometry {
        window: handle(hwnd),
        bounds: window_rect(hwnd).unwrap_or(Rect::ZERO),
        phase,
    }
}

fn translate(channel: EventChannel, event: u32, hwnd: HWND) -> Option<RawEvent> {
    match (channel, event) {
        (EventChannel::Structural, EVENT_SYSTEM_MOVESIZESTART) => {
            Some(move_event(hwnd, MovePhase::Start))
        }
        (EventChannel::Structural, EVENT_OBJECT_LOCATIONCHANGE) => {
            Some(move_event(hwnd, MovePhase::Moving))
        }
        (EventChannel::Structural, EVENT_SYSTEM_MOVESIZEEND) => {
            Some(move_event(hwnd, MovePhase::End))
        }
        (EventChannel::Structural, EVENT_OBJECT_DESTROY) => Some(RawEvent::Destroyed {
            window: handle(hwnd),
        }),
        (EventChannel::Structural, EVENT_OBJECT_STATECHANGE) => {
            let gone = !unsafe { IsWindow(Some(hwnd)) }.as_bool();
            gone.then(|| RawEvent::Destroyed {
                window: handle(hwnd),
            })
        }
        (EventChannel::Structural, EVENT_OBJECT_CREATE) => Some(RawEvent::Created {
            window: handle(hwnd),
            tag: event,
        }),
        (EventChannel::Input, EVENT_SYSTEM_CAPTURESTART) => {
            let mut cursor = POINT::default();
            unsafe { GetCursorPos(&mut cursor) }.ok()?;
            let root = unsafe { GetAncestor(hwnd, GA_ROOT) };
            Some(RawEvent::ButtonPress {
                window: handle(if root.is_invalid() { hwnd } else { root }),
                x: cursor.x,
                y: cursor.y,
            })
        }
        _ => None,
    }
}

unsafe extern "system" fn on_win_event(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _event_thread: u32,
    event_time: u32,
) {
    if hwnd.is_invalid() {
        return;
    }
    if event >= OBJECT_RANGE.0 && (id_object != OBJID_WINDOW || id_child != CHILDID_SELF) {
        return;
    }
    QUEUE.with(|cell| {
        let Ok(mut slot) = cell.try_borrow_mut() else {
            return;
        };
        let Some(queue) = slot.as_mut() else {
            return;
        };
        let key = (event, hwnd.0 as isize, event_time);
        if queue.last == Some(key) {
            return;
        }
        queue.last = Some(key);
        let Some(raw) = translate(queue.channel, event, hwnd) else {
            return;
        };
        let was_empty = queue.events.is_empty();
        queue.events.push_back(raw);
        if was_empty {
            unsafe {
                let _ = PostThreadMessageW(queue.thread_id, WM_EVENT_QUEUED, WPARAM(0), LPARAM(0));
            }
        }
    });
}

fn pop_queued() -> Option<RawEvent> {
    QUEUE.with(|cell| cell.borrow_mut().as_mut().and_then(|q| q.events.pop_front()))
}

struct ThreadWaker {
    thread_id: u32,
}

impl PumpWaker for ThreadWaker {
    fn wake(&self) {
        // thread messages stay queued until the next GetMessageW
        if let Err(err) =
            unsafe { PostThreadMessageW(self.thread_id, WM_WAKE, WPARAM(0), LPARAM(0)) }
        {
            log::debug!("waking event thread {} failed: {err}", self.thread_id);
        }
    }
}

struct ProcessHook {
    users: usize,
    _hook: WinEventHook,
}

/// WinEvent hooks installed on one dispatch thread, shared per (process, group).
struct WinEventPump {
    thread_id: u32,
    keys: HashMap<HookKey, (u32, HookGroup)>,
    hooks: HashMap<(u32, HookGroup), ProcessHook>,
}

impl WinEventPump {
    fn open(channel: EventChannel) -> Self {
        let thread_id = unsafe { GetCurrentThreadId() };
        // creates the thread message queue before anyone posts to it
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
        }
        QUEUE.with(|cell| {
            *cell.borrow_mut() = Some(ThreadQueue {
                channel,
                thread_id,
                events: VecDeque::new(),
                last: None,
            });
        });
        Self {
            thread_id,
            keys: HashMap::new(),
            hooks: HashMap::new(),
        }
    }
}

impl EventPump for WinEventPump {
    fn waker(&self) -> Arc<dyn PumpWaker> {
        Arc::new(ThreadWaker {
            thread_id: self.thread_id,
        })
    }

    fn install(&mut self, key: &HookKey) -> Result<()> {
        if self.keys.contains_key(key) {
            return Ok(());
        }
        let pid = if key.target.is_null() {
            0
        } else {
            match window_pid(hwnd(key.target)) {
                0 => {
                    return Err(PlatformError::resource(format!(
                        "event hook: window {} has no process",
                        key.target
                    )));
                }
                pid => pid,
            }
        };
        let slot = (pid, key.group);
        if let Some(existing) = self.hooks.get_mut(&slot) {
            existing.users += 1;
        } else {
            let (min, max) = match key.group {
                HookGroup::Object => OBJECT_RANGE,
                HookGroup::System | HookGroup::Structure | HookGroup::Input => SYSTEM_RANGE,
            };
            let raw = unsafe {
                SetWinEventHook(
                    min,
                    max,
                    None,
                    Some(on_win_event),
                    pid,
                    0,
                    WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
                )
            };
            let hook = WinEventHook::new(raw).ok_or_else(|| {
                PlatformError::resource(format!("SetWinEventHook {:?} for pid {pid}", key.group))
            })?;
            log::debug!("installed {:?} WinEvent hook for pid {pid}", key.group);
            self.hooks.insert(
                slot,
                ProcessHook {
                    users: 1,
                    _hook: hook,
                },
            );
        }
        self.keys.insert(*key, slot);
        Ok(())
    }

    fn uninstall(&mut self, key: &HookKey) -> Result<()> {
        let Some(slot) = self.keys.remove(key) else {
            return Ok(());
        };
        if let Some(existing) = self.hooks.get_mut(&slot) {
            existing.users -= 1;
            if existing.users == 0 {
                self.hooks.remove(&slot);
                log::debug!("removed {:?} WinEvent hook for pid {}", slot.1, slot.0);
            }
        }
        Ok(())
    }

    fn next_event(&mut self) -> Result<Pumped> {
        loop {
            if let Some(event) = pop_queued() {
                return Ok(Pumped::Event(event));
            }
            let mut msg = MSG::default();
            let got = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match got.0 {
                -1 => return Err(PlatformError::backend("GetMessageW failed")),
                0 => return Ok(Pumped::Closed),
                _ => {}
            }
            match msg.message {
                WM_WAKE => return Ok(Pumped::Woken),
                WM_EVENT_QUEUED => {}
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }
}

impl Drop for WinEventPump {
    fn drop(&mut self) {
        // hooks must be removed on the thread that installed them, which is this one
        self.hooks.clear();
        QUEUE.with(|cell| cell.borrow_mut().take());
    }
}

/// WinEvent hook based event source. Hooks target the process owning the window, or every
/// process for the null window.
#[derive(Debug, Default)]
pub struct Win32Events;

impl Win32Events {
    pub fn new() -> Self {
        Self
    }
}

impl EventBackend for Win32Events {
    fn channel_for(&self, kind: EventKind) -> EventChannel {
        match kind {
            EventKind::Click => EventChannel::Input,
            _ => EventChannel::Structural,
        }
    }

    fn hook_keys(&self, window: WindowHandle, kind: EventKind) -> Vec<HookKey> {
        let object = HookKey::new(window, HookGroup::Object);
        let system = HookKey::new(window, HookGroup::System);
        match kind {
            EventKind::Move | EventKind::Show => vec![object, system],
            EventKind::Close => vec![object],
            EventKind::Click => vec![system],
        }
    }

    fn open_pump(&self, channel: EventChannel) -> Result<Box<dyn EventPump>> {
        Ok(Box::new(WinEventPump::open(channel)))
    }
}
