use wt_platform::{
    Placement, PlatformError, Rect, Result, ShapeOp, ShapeQuery, WindowHandle, WindowSystem,
    WindowTree,
};

use crate::info::{self, DESKTOP, WindowInfo, handle, window_id};

/// Window queries over the window server's window list.
///
/// The tree is two levels deep: a synthetic desktop root with every on-screen window below it.
/// Foreign windows cannot be moved or reshaped through Core Graphics.
#[derive(Debug, Default)]
pub struct CgWindows;

impl CgWindows {
    pub fn new() -> Self {
        Self
    }

    fn info(&self, window: WindowHandle) -> Option<WindowInfo> {
        info::window(window_id(window)?)
    }
}

impl WindowSystem for CgWindows {
    fn bounds(&self, window: WindowHandle) -> Rect {
        if window == DESKTOP {
            return info::screen();
        }
        self.info(window).map(|i| i.bounds).unwrap_or(Rect::ZERO)
    }

    fn client_bounds(&self, window: WindowHandle) -> Rect {
        self.bounds(window)
    }

    fn is_valid(&self, window: WindowHandle) -> bool {
        window == DESKTOP || self.info(window).is_some()
    }

    fn title(&self, window: WindowHandle) -> String {
        self.info(window).map(|i| i.title).unwrap_or_default()
    }

    fn pid(&self, window: WindowHandle) -> u32 {
        self.info(window).map(|i| i.pid).unwrap_or(0)
    }

    fn set_bounds(&self, _window: WindowHandle, _bounds: Rect) -> Result<()> {
        Err(PlatformError::Unsupported("moving foreign windows"))
    }

    fn set_parent(&self, _window: WindowHandle, _parent: WindowHandle) -> Result<()> {
        Err(PlatformError::Unsupported("reparenting"))
    }

    fn set_shape(&self, _window: WindowHandle, _rects: &[Rect], _op: ShapeOp) -> Result<()> {
        Err(PlatformError::Unsupported("window shapes"))
    }

    fn clear_shape(&self, _window: WindowHandle) -> Result<()> {
        Err(PlatformError::Unsupported("window shapes"))
    }

    fn active_window(&self) -> WindowHandle {
        // front to back, the first normal-layer window is the frontmost
        info::on_screen()
            .into_iter()
            .find(|i| i.layer == 0)
            .map(|i| handle(i.id))
            .unwrap_or(WindowHandle::NULL)
    }

    fn work_area(&self, _window: WindowHandle) -> Rect {
        info::screen()
    }
}

impl WindowTree for CgWindows {
    fn root(&self) -> WindowHandle {
        DESKTOP
    }

    fn children(&self, window: WindowHandle) -> Vec<WindowHandle> {
        if window != DESKTOP {
            return Vec::new();
        }
        info::on_screen().into_iter().rev().map(|i| handle(i.id)).collect()
    }

    fn class_name(&self, window: WindowHandle) -> String {
        self.info(window).map(|i| i.owner).unwrap_or_default()
    }

    fn is_main_candidate(&self, window: WindowHandle) -> bool {
        self.info(window).is_some_and(|i| i.layer == 0 && i.on_screen)
    }
}

impl ShapeQuery for CgWindows {
    fn placement(&self, window: WindowHandle) -> Option<Placement> {
        if window == DESKTOP {
            return Some(Placement {
                mapped: true,
                rect: info::screen(),
            });
        }
        self.info(window).map(|i| Placement {
            mapped: i.on_screen,
            rect: i.bounds,
        })
    }

    fn input_shape(&self, _window: WindowHandle) -> Option<Vec<Rect>> {
        None
    }
}
