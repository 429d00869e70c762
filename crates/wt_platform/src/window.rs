use std::str::FromStr;

use crate::error::{PlatformError, Result};
use crate::geometry::Rect;
use crate::handle::WindowHandle;

/// How a new shape combines with the window's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeOp {
    Set,
    Union,
    Intersect,
    Subtract,
    Invert,
}

impl FromStr for ShapeOp {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "set" => Ok(ShapeOp::Set),
            "union" => Ok(ShapeOp::Union),
            "intersect" => Ok(ShapeOp::Intersect),
            "subtract" => Ok(ShapeOp::Subtract),
            "invert" => Ok(ShapeOp::Invert),
            _ => Err(PlatformError::Unsupported("unknown shape operation")),
        }
    }
}

/// Queries and mutations on arbitrary, possibly foreign, windows.
///
/// Queries never fail for a window that has gone away: they answer with a zero rectangle, an
/// empty string or pid 0. Windows disappear between lookup and use all the time.
pub trait WindowSystem: Send + Sync {
    /// Outer bounds in screen coordinates, including a window-manager frame when there is one.
    fn bounds(&self, window: WindowHandle) -> Rect;

    /// Client area in screen coordinates.
    fn client_bounds(&self, window: WindowHandle) -> Rect;

    fn is_valid(&self, window: WindowHandle) -> bool;

    fn title(&self, window: WindowHandle) -> String;

    fn pid(&self, window: WindowHandle) -> u32;

    /// Moves and resizes the outer bounds. The OS may clamp the size to its minimum.
    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> Result<()>;

    /// Associates `window` with `parent` so it stays above it and follows its lifetime.
    /// [`WindowHandle::NULL`] detaches.
    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<()>;

    /// Rectangles are relative to the window's outer origin.
    fn set_shape(&self, window: WindowHandle, rects: &[Rect], op: ShapeOp) -> Result<()>;

    fn clear_shape(&self, window: WindowHandle) -> Result<()>;

    fn active_window(&self) -> WindowHandle;

    /// Work area of the monitor nearest to the window.
    fn work_area(&self, window: WindowHandle) -> Rect;
}

/// Window tree walking, used by the finders.
pub trait WindowTree: WindowSystem {
    fn root(&self) -> WindowHandle;

    /// Direct children, bottom-most first.
    fn children(&self, window: WindowHandle) -> Vec<WindowHandle>;

    fn class_name(&self, window: WindowHandle) -> String;

    /// Unowned and visible: eligible as an application's main window.
    fn is_main_candidate(&self, window: WindowHandle) -> bool;

    /// True where client windows sit below intermediate windows (window-manager frames) instead
    /// of directly under the root.
    fn clients_nested(&self) -> bool {
        false
    }
}

/// Position and visibility of a window relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub mapped: bool,
    pub rect: Rect,
}

/// Geometry for hit testing.
pub trait ShapeQuery: WindowTree {
    fn placement(&self, window: WindowHandle) -> Option<Placement>;

    /// Input shape rectangles relative to the window origin, `None` when the window is a plain
    /// rectangle.
    fn input_shape(&self, window: WindowHandle) -> Option<Vec<Rect>>;
}
