use std::collections::HashMap;

use parking_lot::Mutex;

use super::pattern_bgra;
use crate::capture::{AcceleratedCapture, BackendTarget};
use crate::error::{PlatformError, Result};
use crate::geometry::Rect;
use crate::handle::WindowHandle;

/// Tint of the accelerated backend's pattern.
pub const ACCELERATED_TINT: u8 = 0x20;

#[derive(Default)]
struct AccelState {
    next: u64,
    hooked: HashMap<BackendTarget, WindowHandle>,
    hooks: usize,
    releases: usize,
    calls: usize,
    failure: Option<String>,
    short_reply: bool,
}

/// Accelerated backend that serves the test pattern in BGRA order.
#[derive(Default)]
pub struct FakeAccelerated {
    state: Mutex<AccelState>,
}

impl FakeAccelerated {
    pub const TINT: u8 = ACCELERATED_TINT;

    pub fn new() -> Self {
        Self::default()
    }

    /// Makes capture calls fail with `message` until cleared.
    pub fn fail_with(&self, message: Option<&str>) {
        self.state.lock().failure = message.map(str::to_string);
    }

    /// Makes capture calls return one byte less than requested.
    pub fn truncate_replies(&self, short: bool) {
        self.state.lock().short_reply = short;
    }

    pub fn hooks(&self) -> usize {
        self.state.lock().hooks
    }

    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }

    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    pub fn live_targets(&self) -> usize {
        self.state.lock().hooked.len()
    }
}

impl AcceleratedCapture for FakeAccelerated {
    fn hook_target(&self, window: WindowHandle) -> Result<BackendTarget> {
        let mut state = self.state.lock();
        state.next += 1;
        state.hooks += 1;
        let target = BackendTarget(state.next);
        state.hooked.insert(target, window);
        Ok(target)
    }

    fn capture_multiple(&self, target: BackendTarget, rects: &[Rect]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.calls += 1;
        if let Some(message) = &state.failure {
            return Err(PlatformError::backend(message.clone()));
        }
        if !state.hooked.contains_key(&target) {
            return Err(PlatformError::backend("target is not hooked"));
        }
        let mut out = Vec::with_capacity(rects.iter().map(Rect::rgba_len).sum());
        for rect in rects {
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    out.extend_from_slice(&pattern_bgra(x, y, ACCELERATED_TINT, 0));
                }
            }
        }
        if state.short_reply {
            out.pop();
        }
        Ok(out)
    }

    fn release_target(&self, target: BackendTarget) {
        let mut state = self.state.lock();
        state.releases += 1;
        state.hooked.remove(&target);
    }
}
