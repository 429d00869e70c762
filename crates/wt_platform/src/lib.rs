pub mod backend;
pub mod capture;
pub mod error;
pub mod events;
pub mod geometry;
pub mod handle;
pub mod window;

#[cfg(feature = "testing")]
pub mod testing;

pub use backend::{BackendOptions, PlatformBackend};
pub use capture::{
    AcceleratedCapture, BackendTarget, CaptureMode, CaptureSource, PixelBuffer, PixelLayout,
    Snapshot, Surface,
};
pub use error::{PlatformError, Result};
pub use events::{
    EventBackend, EventChannel, EventKind, EventPump, HookGroup, HookKey, MovePhase, PumpWaker,
    Pumped, RawEvent, WindowEvent,
};
pub use geometry::{MAX_CAPTURE_DIMENSION, Point, Rect};
pub use handle::WindowHandle;
pub use window::{Placement, ShapeOp, ShapeQuery, WindowSystem, WindowTree};
