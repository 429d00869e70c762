use std::sync::Arc;

use x11rb::protocol::shape::{ConnectionExt as _, SK, SO};
use x11rb::protocol::xproto::{
    AtomEnum, ClipOrdering, ConfigureWindowAux, ConnectionExt as _, MapState, PropMode,
    Rectangle, Window,
};
use x11rb::wrapper::ConnectionExt as _;

use wt_platform::{
    Placement, PlatformError, Rect, Result, ShapeOp, ShapeQuery, WindowHandle, WindowSystem,
    WindowTree,
};

use crate::connection::{X11Connection, connection_error, handle, reply_error, xid};

fn rectangle(rect: &Rect) -> Rectangle {
    Rectangle {
        x: rect.x.clamp(i16::MIN.into(), i16::MAX.into()) as i16,
        y: rect.y.clamp(i16::MIN.into(), i16::MAX.into()) as i16,
        width: rect.width.clamp(0, u16::MAX.into()) as u16,
        height: rect.height.clamp(0, u16::MAX.into()) as u16,
    }
}

fn shape_op(op: ShapeOp) -> SO {
    match op {
        ShapeOp::Set => SO::SET,
        ShapeOp::Union => SO::UNION,
        ShapeOp::Intersect => SO::INTERSECT,
        ShapeOp::Subtract => SO::SUBTRACT,
        ShapeOp::Invert => SO::INVERT,
    }
}

/// Window queries over the shared display connection.
pub struct X11Windows {
    x: Arc<X11Connection>,
}

impl X11Windows {
    pub fn new(x: Arc<X11Connection>) -> Self {
        Self { x }
    }

    fn target(&self, window: WindowHandle) -> Result<Window> {
        xid(window).ok_or_else(|| PlatformError::backend(format!("no such window {window}")))
    }

    fn transient_for(&self, window: Window) -> Option<Window> {
        self.x
            .property32(window, self.x.atoms.WM_TRANSIENT_FOR, AtomEnum::WINDOW)
            .first()
            .copied()
            .filter(|&owner| owner != x11rb::NONE)
    }

    fn map_state(&self, window: Window) -> Option<MapState> {
        let reply = self.x.conn.get_window_attributes(window).ok()?.reply().ok()?;
        Some(reply.map_state)
    }

    fn text_property(&self, window: Window, property: u32, kind: impl Into<u32>) -> Option<Vec<u8>> {
        self.x
            .property(window, property, kind, 1024)
            .map(|reply| reply.value)
            .filter(|value| !value.is_empty())
    }
}

impl WindowSystem for X11Windows {
    fn bounds(&self, window: WindowHandle) -> Rect {
        xid(window)
            .and_then(|window| self.x.frame_bounds(window))
            .unwrap_or(Rect::ZERO)
    }

    fn client_bounds(&self, window: WindowHandle) -> Rect {
        xid(window)
            .and_then(|window| self.x.client_bounds(window))
            .unwrap_or(Rect::ZERO)
    }

    fn is_valid(&self, window: WindowHandle) -> bool {
        xid(window).is_some_and(|window| self.map_state(window).is_some())
    }

    fn title(&self, window: WindowHandle) -> String {
        let Some(window) = xid(window) else {
            return String::new();
        };
        let atoms = &self.x.atoms;
        self.text_property(window, atoms._NET_WM_NAME, atoms.UTF8_STRING)
            .or_else(|| self.text_property(window, atoms.WM_NAME, AtomEnum::ANY))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    fn pid(&self, window: WindowHandle) -> u32 {
        xid(window)
            .and_then(|window| {
                self.x
                    .property32(window, self.x.atoms._NET_WM_PID, AtomEnum::CARDINAL)
                    .first()
                    .copied()
            })
            .unwrap_or(0)
    }

    /// `bounds` is the frame rectangle; the window manager places the frame at the requested
    /// origin, and the client gets the size minus the decoration.
    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> Result<()> {
        let window = self.target(window)?;
        let (dw, dh) = match (self.x.frame_bounds(window), self.x.client_bounds(window)) {
            (Some(frame), Some(client)) => {
                (frame.width - client.width, frame.height - client.height)
            }
            _ => (0, 0),
        };
        let aux = ConfigureWindowAux::new()
            .x(bounds.x)
            .y(bounds.y)
            .width((bounds.width - dw).max(1) as u32)
            .height((bounds.height - dh).max(1) as u32);
        self.x
            .conn
            .configure_window(window, &aux)
            .map_err(connection_error)?;
        self.x.flush()
    }

    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<()> {
        let window = self.target(window)?;
        let property = self.x.atoms.WM_TRANSIENT_FOR;
        match xid(parent) {
            Some(parent) => {
                self.x
                    .conn
                    .change_property32(PropMode::REPLACE, window, property, AtomEnum::WINDOW, &[parent])
                    .map_err(connection_error)?;
            }
            None => {
                self.x
                    .conn
                    .delete_property(window, property)
                    .map_err(connection_error)?;
            }
        }
        self.x.flush()
    }

    fn set_shape(&self, window: WindowHandle, rects: &[Rect], op: ShapeOp) -> Result<()> {
        if !self.x.has_shape {
            return Err(PlatformError::Unsupported("SHAPE extension"));
        }
        let window = self.target(window)?;
        let rectangles: Vec<Rectangle> = rects.iter().map(rectangle).collect();
        self.x
            .conn
            .shape_rectangles(
                shape_op(op),
                SK::BOUNDING,
                ClipOrdering::UNSORTED,
                window,
                0,
                0,
                &rectangles,
            )
            .map_err(connection_error)?
            .check()
            .map_err(reply_error)
    }

    fn clear_shape(&self, window: WindowHandle) -> Result<()> {
        if !self.x.has_shape {
            return Err(PlatformError::Unsupported("SHAPE extension"));
        }
        let window = self.target(window)?;
        self.x
            .conn
            .shape_mask(SO::SET, SK::BOUNDING, window, 0, 0, x11rb::NONE)
            .map_err(connection_error)?
            .check()
            .map_err(reply_error)
    }

    fn active_window(&self) -> WindowHandle {
        self.x
            .property32(self.x.root, self.x.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW)
            .first()
            .map(|&window| handle(window))
            .unwrap_or(WindowHandle::NULL)
    }

    fn work_area(&self, _window: WindowHandle) -> Rect {
        // one work area per desktop, the first entry is the current layout on most WMs
        match self
            .x
            .property32(self.x.root, self.x.atoms._NET_WORKAREA, AtomEnum::CARDINAL)
            .as_slice()
        {
            [x, y, width, height, ..] if *width > 0 && *height > 0 => {
                Rect::new(*x as i32, *y as i32, *width as i32, *height as i32)
            }
            _ => self.x.screen,
        }
    }
}

impl WindowTree for X11Windows {
    fn root(&self) -> WindowHandle {
        handle(self.x.root)
    }

    fn children(&self, window: WindowHandle) -> Vec<WindowHandle> {
        let window = xid(window).unwrap_or(self.x.root);
        self.x.children(window).into_iter().map(handle).collect()
    }

    fn class_name(&self, window: WindowHandle) -> String {
        // WM_CLASS holds instance and class as two NUL-terminated strings
        xid(window)
            .and_then(|window| self.text_property(window, self.x.atoms.WM_CLASS, AtomEnum::STRING))
            .and_then(|bytes| {
                bytes
                    .split(|&b| b == 0)
                    .nth(1)
                    .map(|class| String::from_utf8_lossy(class).into_owned())
            })
            .unwrap_or_default()
    }

    fn is_main_candidate(&self, window: WindowHandle) -> bool {
        let Some(window) = xid(window) else {
            return false;
        };
        self.map_state(window) == Some(MapState::VIEWABLE) && self.transient_for(window).is_none()
    }

    fn clients_nested(&self) -> bool {
        true
    }
}

impl ShapeQuery for X11Windows {
    fn placement(&self, window: WindowHandle) -> Option<Placement> {
        let window = xid(window)?;
        let geometry = self.x.geometry(window)?;
        let mapped = self.map_state(window)? == MapState::VIEWABLE;
        Some(Placement {
            mapped,
            rect: Rect::new(
                i32::from(geometry.x),
                i32::from(geometry.y),
                i32::from(geometry.width) + 2 * i32::from(geometry.border_width),
                i32::from(geometry.height) + 2 * i32::from(geometry.border_width),
            ),
        })
    }

    fn input_shape(&self, window: WindowHandle) -> Option<Vec<Rect>> {
        if !self.x.has_shape {
            return None;
        }
        let window = xid(window)?;
        let geometry = self.x.geometry(window)?;
        let reply = self
            .x
            .conn
            .shape_get_rectangles(window, SK::INPUT)
            .ok()?
            .reply()
            .ok()?;
        let rects: Vec<Rect> = reply
            .rectangles
            .iter()
            .map(|r| {
                Rect::new(
                    i32::from(r.x),
                    i32::from(r.y),
                    i32::from(r.width),
                    i32::from(r.height),
                )
            })
            .collect();
        // an unshaped window reports its own rectangle
        let plain = Rect::new(0, 0, i32::from(geometry.width), i32::from(geometry.height));
        if rects.len() == 1 && rects[0] == plain {
            return None;
        }
        Some(rects)
    }
}
