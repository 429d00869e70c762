//! In-memory implementations of the platform traits.
//!
//! Pixel surfaces follow a fixed pattern so tests can predict every byte: a surface pixel at
//! `(x, y)` is stored as BGRA `[x as u8, y as u8, tint, alpha]`, which the capture path turns into
//! RGBA `[tint, y as u8, x as u8, 0xFF]` when the surface carries no alpha.

mod accelerated;
mod desktop;
mod events;

use std::thread;
use std::time::{Duration, Instant};

pub use accelerated::FakeAccelerated;
pub use desktop::{DESKTOP_TINT, FakeDesktop, Mutation, WindowSpec};
pub use events::{FakeEventBackend, HookLog};

use crate::backend::PlatformBackend;
use std::sync::Arc;

/// BGRA bytes of the pattern at `(x, y)`.
#[inline]
pub fn pattern_bgra(x: i32, y: i32, tint: u8, alpha: u8) -> [u8; 4] {
    [x as u8, y as u8, tint, alpha]
}

/// RGBA bytes an opaque capture of the pattern at `(x, y)` yields.
#[inline]
pub fn expected_rgba(x: i32, y: i32, tint: u8) -> [u8; 4] {
    [tint, y as u8, x as u8, 0xFF]
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Backend bundle wired from fakes.
pub fn fake_backend(
    desktop: &Arc<FakeDesktop>,
    accelerated: Option<&Arc<FakeAccelerated>>,
    events: &Arc<FakeEventBackend>,
) -> PlatformBackend {
    PlatformBackend {
        name: "fake",
        windows: desktop.clone(),
        system: desktop.clone(),
        capture: desktop.clone(),
        accelerated: accelerated.map(|a| a.clone() as Arc<dyn crate::capture::AcceleratedCapture>),
        events: events.clone(),
    }
}
