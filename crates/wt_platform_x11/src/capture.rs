use std::sync::Arc;

use x11rb::connection::Connection;
use x11rb::protocol::composite::{ConnectionExt as _, Redirect};
use x11rb::protocol::shm::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, Drawable, ImageFormat, Pixmap, Window};
use x11rb::rust_connection::RustConnection;

use wt_platform::{CaptureSource, PixelLayout, PlatformError, Rect, Result, Snapshot, Surface};

use crate::connection::{X11Connection, connection_error, id_error, reply_error, xid};

/// System V shared memory segment attached to both this process and the X server.
struct ShmSegment<'c> {
    conn: &'c RustConnection,
    seg: shm::Seg,
    id: i32,
    addr: *mut u8,
    len: usize,
}

impl<'c> ShmSegment<'c> {
    fn new(conn: &'c RustConnection, len: usize) -> Result<Self> {
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, len, libc::IPC_CREAT | 0o600) };
        if id == -1 {
            return Err(PlatformError::resource(format!("shmget of {len} bytes")));
        }
        let addr = unsafe { libc::shmat(id, std::ptr::null(), libc::SHM_RDONLY) };
        if addr as isize == -1 {
            unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
            return Err(PlatformError::resource("shmat"));
        }
        let mut segment = Self {
            conn,
            seg: 0,
            id,
            addr: addr.cast(),
            len,
        };
        let seg = conn.generate_id().map_err(id_error)?;
        conn.shm_attach(seg, id as u32, false)
            .map_err(connection_error)?
            .check()
            .map_err(reply_error)?;
        segment.seg = seg;
        Ok(segment)
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: attached for `len` bytes until drop
        unsafe { std::slice::from_raw_parts(self.addr, self.len) }
    }
}

impl Drop for ShmSegment<'_> {
    fn drop(&mut self) {
        if self.seg != 0 {
            let _ = self.conn.shm_detach(self.seg);
            let _ = self.conn.flush();
        }
        unsafe {
            libc::shmdt(self.addr.cast());
            libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut());
        }
    }
}

struct PixmapGuard<'c> {
    conn: &'c RustConnection,
    pixmap: Pixmap,
}

impl Drop for PixmapGuard<'_> {
    fn drop(&mut self) {
        let _ = self.conn.free_pixmap(self.pixmap);
        let _ = self.conn.flush();
    }
}

/// Automatic Composite redirection of one window for the duration of a capture.
struct RedirectGuard<'c> {
    conn: &'c RustConnection,
    window: Window,
}

impl<'c> RedirectGuard<'c> {
    fn new(conn: &'c RustConnection, window: Window) -> Result<Self> {
        conn.composite_redirect_window(window, Redirect::AUTOMATIC)
            .map_err(connection_error)?
            .check()
            .map_err(reply_error)?;
        Ok(Self { conn, window })
    }
}

impl Drop for RedirectGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .conn
            .composite_unredirect_window(self.window, Redirect::AUTOMATIC);
        let _ = self.conn.flush();
    }
}

enum Pixels<'c> {
    Shared(ShmSegment<'c>),
    Owned(Vec<u8>),
}

/// ZPixmap image of 32 bits per pixel, BGRX on little-endian servers.
struct ImageSnapshot<'c> {
    bounds: Rect,
    pixels: Pixels<'c>,
    has_alpha: bool,
}

impl Snapshot for ImageSnapshot<'_> {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn stride(&self) -> usize {
        self.bounds.width as usize * 4
    }

    fn data(&self) -> &[u8] {
        match &self.pixels {
            Pixels::Shared(segment) => segment.bytes(),
            Pixels::Owned(data) => data,
        }
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }

    fn has_alpha(&self) -> bool {
        self.has_alpha
    }
}

/// Screen and window capture with MIT-SHM, falling back to plain GetImage.
pub struct X11Capture {
    x: Arc<X11Connection>,
}

fn empty(region: Rect) -> Box<dyn Snapshot + 'static> {
    Box::new(ImageSnapshot {
        bounds: Rect::new(region.x, region.y, 0, 0),
        pixels: Pixels::Owned(Vec::new()),
        has_alpha: false,
    })
}

impl X11Capture {
    pub fn new(x: Arc<X11Connection>) -> Self {
        Self { x }
    }

    fn image(&self, drawable: Drawable, area: Rect) -> Result<Pixels<'_>> {
        let conn = &self.x.conn;
        let (x, y) = (area.x as i16, area.y as i16);
        let (width, height) = (area.width as u16, area.height as u16);
        if self.x.has_shm {
            let segment = ShmSegment::new(conn, area.rgba_len())?;
            conn.shm_get_image(
                drawable,
                x,
                y,
                width,
                height,
                !0,
                ImageFormat::Z_PIXMAP.into(),
                segment.seg,
                0,
            )
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
            return Ok(Pixels::Shared(segment));
        }
        let reply = conn
            .get_image(ImageFormat::Z_PIXMAP, drawable, x, y, width, height, !0)
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
        if reply.data.len() < area.rgba_len() {
            return Err(PlatformError::backend(format!(
                "GetImage returned {} bytes for {}x{}",
                reply.data.len(),
                area.width,
                area.height
            )));
        }
        Ok(Pixels::Owned(reply.data))
    }

    fn desktop(&self, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        // GetImage on the root fails outside the screen; what lies outside stays zero
        let Some(area) = region.intersection(&self.x.screen) else {
            return Ok(empty(region));
        };
        let pixels = self.image(self.x.root, area)?;
        Ok(Box::new(ImageSnapshot {
            bounds: area,
            pixels,
            has_alpha: false,
        }))
    }

    /// Reads the part of `region` inside the window, in window coordinates.
    ///
    /// The window is redirected only while its pixmap is read, so nothing stays redirected once
    /// the call returns.
    fn window(&self, window: Window, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        let geometry = self
            .x
            .geometry(window)
            .ok_or_else(|| PlatformError::resource(format!("window {window:#x} is gone")))?;
        let extent = Rect::new(0, 0, i32::from(geometry.width), i32::from(geometry.height));
        let Some(area) = region.intersection(&extent) else {
            return Ok(empty(region));
        };
        if !self.x.has_composite {
            let pixels = self.image(window, area)?;
            return Ok(Box::new(ImageSnapshot {
                bounds: area,
                pixels,
                has_alpha: false,
            }));
        }
        let conn = &self.x.conn;
        let _redirect = RedirectGuard::new(conn, window)?;
        let pixmap = PixmapGuard {
            conn,
            pixmap: conn.generate_id().map_err(id_error)?,
        };
        conn.composite_name_window_pixmap(window, pixmap.pixmap)
            .map_err(connection_error)?
            .check()
            .map_err(|e| PlatformError::resource(format!("window pixmap: {}", reply_error(e))))?;
        // the named pixmap includes the border
        let border = i32::from(geometry.border_width);
        let pixels = self.image(pixmap.pixmap, area.translate(border, border))?;
        Ok(Box::new(ImageSnapshot {
            bounds: area,
            pixels,
            has_alpha: geometry.depth == 32,
        }))
    }
}

impl CaptureSource for X11Capture {
    fn snapshot(&self, surface: Surface, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        match surface {
            Surface::Desktop => self.desktop(region),
            Surface::Window(window) => {
                let window = xid(window)
                    .ok_or_else(|| PlatformError::resource("capture of the null window"))?;
                self.window(window, region)
            }
        }
    }
}

