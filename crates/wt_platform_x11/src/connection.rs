use std::sync::Arc;

use once_cell::sync::OnceCell;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, GetGeometryReply, GetPropertyReply, Window,
};
use x11rb::protocol::{composite, record, shape, shm};
use x11rb::rust_connection::RustConnection;

use wt_platform::{PlatformError, Rect, Result, WindowHandle};

x11rb::atom_manager! {
    pub(crate) Atoms: AtomsCookie {
        UTF8_STRING,
        WM_CLASS,
        WM_NAME,
        WM_TRANSIENT_FOR,
        _NET_ACTIVE_WINDOW,
        _NET_WM_NAME,
        _NET_WM_PID,
        _NET_WORKAREA,
        _WINTRACK_WAKE,
    }
}

pub(crate) fn connection_error(err: ConnectionError) -> PlatformError {
    PlatformError::connection(err.to_string())
}

/// Connection loss is fatal, a protocol error only fails the request at hand.
pub(crate) fn reply_error(err: ReplyError) -> PlatformError {
    match err {
        ReplyError::ConnectionError(err) => connection_error(err),
        ReplyError::X11Error(err) => {
            PlatformError::backend(format!("X11 error {:?}", err.error_kind))
        }
    }
}

pub(crate) fn id_error(err: ReplyOrIdError) -> PlatformError {
    match err {
        ReplyOrIdError::ConnectionError(err) => connection_error(err),
        other => PlatformError::resource(format!("X11 id: {other}")),
    }
}

#[inline]
pub(crate) fn handle(window: Window) -> WindowHandle {
    WindowHandle::from_raw(u64::from(window))
}

/// X window id of `handle`, or None for the null handle and values no X id can have.
#[inline]
pub(crate) fn xid(handle: WindowHandle) -> Option<Window> {
    if handle.is_null() {
        return None;
    }
    u32::try_from(handle.raw()).ok()
}

/// One display connection with the state every backend part needs.
pub struct X11Connection {
    pub(crate) conn: RustConnection,
    pub(crate) root: Window,
    pub(crate) screen: Rect,
    pub(crate) atoms: Atoms,
    pub(crate) has_shm: bool,
    pub(crate) has_composite: bool,
    pub(crate) has_shape: bool,
    pub(crate) has_record: bool,
}

static SHARED: OnceCell<std::result::Result<Arc<X11Connection>, String>> = OnceCell::new();

impl X11Connection {
    /// Opens a new connection to the default display.
    pub fn open() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| PlatformError::connection(format!("cannot open display: {e}")))?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| PlatformError::connection("display has no screen"))?;
        let root = screen.root;
        let bounds = Rect::new(
            0,
            0,
            i32::from(screen.width_in_pixels),
            i32::from(screen.height_in_pixels),
        );
        let atoms = Atoms::new(&conn)
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
        let has = |name: &'static str| {
            conn.extension_information(name)
                .map(|info| info.is_some())
                .unwrap_or(false)
        };
        let has_shm = has(shm::X11_EXTENSION_NAME);
        let has_composite = has(composite::X11_EXTENSION_NAME);
        let has_shape = has(shape::X11_EXTENSION_NAME);
        let has_record = has(record::X11_EXTENSION_NAME);
        if has_composite {
            // the server only answers composite requests after a version handshake
            use x11rb::protocol::composite::ConnectionExt as _;
            conn.composite_query_version(0, 4)
                .map_err(connection_error)?
                .reply()
                .map_err(reply_error)?;
        }
        log::debug!(
            "X11 connected: screen {}x{}, shm={has_shm} composite={has_composite} shape={has_shape} record={has_record}",
            bounds.width,
            bounds.height
        );
        Ok(Self {
            conn,
            root,
            screen: bounds,
            atoms,
            has_shm,
            has_composite,
            has_shape,
            has_record,
        })
    }

    pub fn connection(&self) -> &RustConnection {
        &self.conn
    }

    pub fn root(&self) -> Window {
        self.root
    }

    /// Process-wide connection, established on first use. A failure is remembered and
    /// returned to every later caller.
    pub fn shared() -> Result<Arc<Self>> {
        SHARED
            .get_or_init(|| {
                Self::open().map(Arc::new).map_err(|err| {
                    log::error!("{err}");
                    err.to_string()
                })
            })
            .clone()
            .map_err(PlatformError::connection)
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.conn.flush().map_err(connection_error)
    }

    pub(crate) fn geometry(&self, window: Window) -> Option<GetGeometryReply> {
        self.conn.get_geometry(window).ok()?.reply().ok()
    }

    pub(crate) fn absolute_origin(&self, window: Window) -> Option<(i32, i32)> {
        let reply = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        Some((i32::from(reply.dst_x), i32::from(reply.dst_y)))
    }

    pub(crate) fn property(
        &self,
        window: Window,
        property: u32,
        kind: impl Into<u32>,
        long_length: u32,
    ) -> Option<GetPropertyReply> {
        self.conn
            .get_property(false, window, property, kind, 0, long_length)
            .ok()?
            .reply()
            .ok()
    }

    pub(crate) fn property32(&self, window: Window, property: u32, kind: AtomEnum) -> Vec<u32> {
        self.property(window, property, kind, 64)
            .and_then(|reply| reply.value32().map(|values| values.collect()))
            .unwrap_or_default()
    }

    /// Raw geometry translated to root coordinates, without the border.
    pub(crate) fn client_bounds(&self, window: Window) -> Option<Rect> {
        let geometry = self.geometry(window)?;
        let (x, y) = self.absolute_origin(window)?;
        Some(Rect::new(x, y, i32::from(geometry.width), i32::from(geometry.height)))
    }

    pub(crate) fn parent(&self, window: Window) -> Option<Window> {
        let reply = self.conn.query_tree(window).ok()?.reply().ok()?;
        Some(reply.parent)
    }

    /// Ancestor of `window` that sits directly on the root: the window manager frame when the
    /// window was reparented, the window itself otherwise.
    pub(crate) fn frame(&self, window: Window) -> Option<Window> {
        let mut current = window;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root || parent == x11rb::NONE {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Outer rectangle of the frame around `window`, border included.
    pub(crate) fn frame_bounds(&self, window: Window) -> Option<Rect> {
        let frame = self.frame(window)?;
        let geometry = self.geometry(frame)?;
        let border = i32::from(geometry.border_width);
        Some(Rect::new(
            i32::from(geometry.x),
            i32::from(geometry.y),
            i32::from(geometry.width) + 2 * border,
            i32::from(geometry.height) + 2 * border,
        ))
    }

    pub(crate) fn children(&self, window: Window) -> Vec<Window> {
        self.conn
            .query_tree(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| reply.children)
            .unwrap_or_default()
    }
}
