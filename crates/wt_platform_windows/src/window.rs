use std::ffi::c_void;

use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    COMPLEXREGION, ClientToScreen, CombineRgn, CreateRectRgn, GetMonitorInfoW, GetWindowRgnBox,
    MONITOR_DEFAULTTONEAREST, MONITORINFO, MonitorFromWindow, NULLREGION, RGN_AND,
    RGN_COMBINE_MODE, RGN_DIFF, RGN_OR, SIMPLEREGION, SetWindowRgn,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GA_PARENT, GW_CHILD, GW_HWNDNEXT, GW_OWNER, GWLP_HWNDPARENT, GetAncestor, GetClassNameW,
    GetClientRect, GetDesktopWindow, GetForegroundWindow, GetWindow, GetWindowRect,
    GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindow,
    IsWindowVisible, SET_WINDOW_POS_FLAGS, SWP_ASYNCWINDOWPOS, SWP_NOACTIVATE, SWP_NOMOVE,
    SWP_NOOWNERZORDER, SWP_NOSIZE, SetWindowLongPtrW, SetWindowPos,
};

use wt_platform::{
    Placement, PlatformError, Rect, Result, ShapeOp, ShapeQuery, WindowHandle, WindowSystem,
    WindowTree,
};

use crate::resources::ManagedRegion;

#[inline]
pub(crate) fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw() as usize as *mut c_void)
}

#[inline]
pub(crate) fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle::from_raw(hwnd.0 as usize as u64)
}

#[inline]
fn rect_from(rect: RECT) -> Rect {
    Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom)
}

pub(crate) fn window_rect(hwnd: HWND) -> Option<Rect> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect) }.ok()?;
    Some(rect_from(rect))
}

pub(crate) fn window_pid(hwnd: HWND) -> u32 {
    let mut pid = 0u32;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
    }
    pid
}

fn alive(window: WindowHandle) -> Option<HWND> {
    if window.is_null() {
        return None;
    }
    let hwnd = hwnd(window);
    unsafe { IsWindow(Some(hwnd)) }.as_bool().then_some(hwnd)
}

fn set_pos(
    hwnd: HWND,
    after: Option<HWND>,
    bounds: Rect,
    flags: SET_WINDOW_POS_FLAGS,
) -> Result<()> {
    unsafe {
        SetWindowPos(
            hwnd,
            after,
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height,
            flags,
        )
    }
    .map_err(|e| PlatformError::backend(format!("SetWindowPos failed: {e}")))
}

fn region_from(rects: &[Rect]) -> Result<ManagedRegion> {
    let empty = || PlatformError::resource("region");
    let combined = ManagedRegion::new(unsafe { CreateRectRgn(0, 0, 0, 0) }).ok_or_else(empty)?;
    for r in rects {
        let part = ManagedRegion::new(unsafe { CreateRectRgn(r.x, r.y, r.right(), r.bottom()) })
            .ok_or_else(empty)?;
        combine(&combined, &combined, &part, RGN_OR)?;
    }
    Ok(combined)
}

fn combine(
    dest: &ManagedRegion,
    a: &ManagedRegion,
    b: &ManagedRegion,
    mode: RGN_COMBINE_MODE,
) -> Result<()> {
    let kind = unsafe { CombineRgn(Some(dest.handle()), Some(a.handle()), Some(b.handle()), mode) };
    if kind == NULLREGION || kind == SIMPLEREGION || kind == COMPLEXREGION {
        Ok(())
    } else {
        Err(PlatformError::backend("CombineRgn failed"))
    }
}

/// Top-level and child windows of the interactive desktop.
///
/// Geometry queries on a closed or null window return zero values instead of failing.
#[derive(Debug, Default)]
pub struct Win32Windows;

impl Win32Windows {
    pub fn new() -> Self {
        Self
    }

    /// Current window region in window coordinates, or the full window when it has none.
    fn current_region(&self, hwnd: HWND, outer: Rect) -> Result<ManagedRegion> {
        let mut bbox = RECT::default();
        let kind = unsafe { GetWindowRgnBox(hwnd, &mut bbox) };
        let rect = if kind == SIMPLEREGION || kind == COMPLEXREGION {
            rect_from(bbox)
        } else {
            Rect::new(0, 0, outer.width, outer.height)
        };
        region_from(&[rect])
    }
}

impl WindowSystem for Win32Windows {
    fn bounds(&self, window: WindowHandle) -> Rect {
        alive(window)
            .and_then(window_rect)
            .unwrap_or(Rect::ZERO)
    }

    fn client_bounds(&self, window: WindowHandle) -> Rect {
        let Some(hwnd) = alive(window) else {
            return Rect::ZERO;
        };
        let mut rect = RECT::default();
        if unsafe { GetClientRect(hwnd, &mut rect) }.is_err() {
            return Rect::ZERO;
        }
        let mut origin = POINT::default();
        if !unsafe { ClientToScreen(hwnd, &mut origin) }.as_bool() {
            return Rect::ZERO;
        }
        Rect::new(origin.x, origin.y, rect.right - rect.left, rect.bottom - rect.top)
    }

    fn is_valid(&self, window: WindowHandle) -> bool {
        alive(window).is_some()
    }

    fn title(&self, window: WindowHandle) -> String {
        let Some(hwnd) = alive(window) else {
            return String::new();
        };
        let len = unsafe { GetWindowTextLengthW(hwnd) };
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u16; len as usize + 1];
        let copied = unsafe { GetWindowTextW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..copied.max(0) as usize])
    }

    fn pid(&self, window: WindowHandle) -> u32 {
        alive(window).map(window_pid).unwrap_or(0)
    }

    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> Result<()> {
        let Some(hwnd) = alive(window) else {
            return Ok(());
        };
        set_pos(
            hwnd,
            None,
            bounds,
            SWP_ASYNCWINDOWPOS | SWP_NOACTIVATE | SWP_NOOWNERZORDER,
        )
    }

    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<()> {
        let Some(child) = alive(window) else {
            return Ok(());
        };
        let keep = SWP_ASYNCWINDOWPOS | SWP_NOACTIVATE | SWP_NOMOVE | SWP_NOSIZE;
        if let Some(owner) = alive(parent) {
            // there is no "insert above", so go below the parent and then move it below us
            set_pos(child, Some(owner), Rect::ZERO, keep)?;
            set_pos(owner, Some(child), Rect::ZERO, keep)?;
        }
        let owner = if parent.is_null() { 0 } else { hwnd(parent).0 as isize };
        unsafe {
            SetWindowLongPtrW(child, GWLP_HWNDPARENT, owner);
        }
        Ok(())
    }

    fn set_shape(&self, window: WindowHandle, rects: &[Rect], op: ShapeOp) -> Result<()> {
        let Some(hwnd) = alive(window) else {
            return Ok(());
        };
        let outer = window_rect(hwnd).unwrap_or(Rect::ZERO);
        let given = region_from(rects)?;
        let shape = match op {
            ShapeOp::Set => given,
            ShapeOp::Union | ShapeOp::Intersect | ShapeOp::Subtract => {
                let current = self.current_region(hwnd, outer)?;
                let mode = match op {
                    ShapeOp::Union => RGN_OR,
                    ShapeOp::Intersect => RGN_AND,
                    _ => RGN_DIFF,
                };
                combine(&current, &current, &given, mode)?;
                current
            }
            ShapeOp::Invert => {
                let full = region_from(&[Rect::new(0, 0, outer.width, outer.height)])?;
                combine(&full, &full, &given, RGN_DIFF)?;
                full
            }
        };
        if unsafe { SetWindowRgn(hwnd, Some(shape.handle()), true) } == 0 {
            return Err(PlatformError::backend("SetWindowRgn failed"));
        }
        // owned by the window from here on
        let _ = shape.into_inner();
        Ok(())
    }

    fn clear_shape(&self, window: WindowHandle) -> Result<()> {
        let Some(hwnd) = alive(window) else {
            return Ok(());
        };
        if unsafe { SetWindowRgn(hwnd, None, true) } == 0 {
            return Err(PlatformError::backend("SetWindowRgn failed"));
        }
        Ok(())
    }

    fn active_window(&self) -> WindowHandle {
        handle(unsafe { GetForegroundWindow() })
    }

    fn work_area(&self, window: WindowHandle) -> Rect {
        let target = alive(window).unwrap_or_else(|| unsafe { GetDesktopWindow() });
        let monitor = unsafe { MonitorFromWindow(target, MONITOR_DEFAULTTONEAREST) };
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        if unsafe { GetMonitorInfoW(monitor, &mut info) }.as_bool() {
            rect_from(info.rcWork)
        } else {
            Rect::ZERO
        }
    }
}

impl WindowTree for Win32Windows {
    fn root(&self) -> WindowHandle {
        handle(unsafe { GetDesktopWindow() })
    }

    fn children(&self, window: WindowHandle) -> Vec<WindowHandle> {
        let parent = if window.is_null() {
            unsafe { GetDesktopWindow() }
        } else {
            hwnd(window)
        };
        // GetWindow walks top to bottom
        let mut out = Vec::new();
        let mut next = unsafe { GetWindow(parent, GW_CHILD) };
        while let Ok(child) = next {
            if child.is_invalid() {
                break;
            }
            out.push(handle(child));
            next = unsafe { GetWindow(child, GW_HWNDNEXT) };
        }
        out.reverse();
        out
    }

    fn class_name(&self, window: WindowHandle) -> String {
        let Some(hwnd) = alive(window) else {
            return String::new();
        };
        let mut buf = [0u16; 256];
        let len = unsafe { GetClassNameW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..len.max(0) as usize])
    }

    fn is_main_candidate(&self, window: WindowHandle) -> bool {
        let Some(hwnd) = alive(window) else {
            return false;
        };
        let owned = unsafe { GetWindow(hwnd, GW_OWNER) }.is_ok_and(|owner| !owner.is_invalid());
        !owned && unsafe { IsWindowVisible(hwnd) }.as_bool()
    }
}

impl ShapeQuery for Win32Windows {
    fn placement(&self, window: WindowHandle) -> Option<Placement> {
        let hwnd = alive(window)?;
        let rect = window_rect(hwnd)?;
        let parent = unsafe { GetAncestor(hwnd, GA_PARENT) };
        let origin = if parent.is_invalid() || parent == unsafe { GetDesktopWindow() } {
            (0, 0)
        } else {
            window_rect(parent).map(|r| (r.x, r.y)).unwrap_or((0, 0))
        };
        Some(Placement {
            mapped: unsafe { IsWindowVisible(hwnd) }.as_bool(),
            rect: rect.translate(-origin.0, -origin.1),
        })
    }

    fn input_shape(&self, window: WindowHandle) -> Option<Vec<Rect>> {
        let hwnd = alive(window)?;
        let mut bbox = RECT::default();
        let kind = unsafe { GetWindowRgnBox(hwnd, &mut bbox) };
        (kind == SIMPLEREGION || kind == COMPLEXREGION).then(|| vec![rect_from(bbox)])
    }
}
