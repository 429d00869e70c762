//! Capture pixels from, and follow the lifecycle of, windows owned by other processes.
//!
//! [`WindowHost`] wires one platform backend to the capture engine, the window finders, the
//! event subsystem and window pinning. [`WindowHost::native`] picks the backend for the target
//! OS; [`WindowHost::from_backend`] accepts any, including the in-memory fakes of
//! `wt_platform::testing`.

pub mod config;
pub mod host;
pub mod process;

pub use config::{ConfigManager, HostConfig};
pub use host::WindowHost;
pub use process::ProcessService;

pub use wt_events::{ChannelSink, Delivery, DeliveryAck, EventSink, Listener, listener_fn};
pub use wt_locate::{ClassMatcher, WindowInfo, WindowMatcher};
pub use wt_pin::{Edge, PinAnchor};
pub use wt_platform::{
    CaptureMode, EventKind, MovePhase, PixelBuffer, PlatformError, Rect, ShapeOp, WindowEvent,
    WindowHandle,
};
