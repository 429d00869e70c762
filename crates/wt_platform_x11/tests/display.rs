#![cfg(target_os = "linux")]

//! Runs against the display in `$DISPLAY`; without one every test returns early.

use std::sync::Arc;

use wt_platform::{
    CaptureSource, Rect, ShapeQuery, Snapshot, Surface, WindowHandle, WindowSystem, WindowTree,
};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, CreateWindowAux, Window, WindowClass};
use wt_platform_x11::{X11Capture, X11Connection, X11Windows};

fn connect() -> Option<Arc<X11Connection>> {
    std::env::var_os("DISPLAY")?;
    X11Connection::shared().ok()
}

#[test]
fn vanished_windows_report_zero_values() {
    let Some(x) = connect() else { return };
    let windows = X11Windows::new(x);
    // ids in this range belong to no client
    let gone = WindowHandle::from_raw(0x1fff_fff0);
    assert!(!windows.is_valid(gone));
    assert_eq!(windows.bounds(gone), Rect::ZERO);
    assert_eq!(windows.title(gone), "");
    assert_eq!(windows.pid(gone), 0);
    assert!(windows.placement(gone).is_none());
}

#[test]
fn root_spans_the_screen() {
    let Some(x) = connect() else { return };
    let windows = X11Windows::new(x);
    let root = windows.root();
    assert!(windows.is_valid(root));
    let bounds = windows.bounds(root);
    assert_eq!((bounds.x, bounds.y), (0, 0));
    assert!(bounds.width > 0 && bounds.height > 0);
}

#[test]
fn desktop_snapshot_is_clipped_to_the_screen() {
    let Some(x) = connect() else { return };
    let capture = X11Capture::new(x);
    let snap = capture
        .snapshot(Surface::Desktop, Rect::new(-8, 0, 16, 8))
        .unwrap();
    assert_eq!(snap.bounds(), Rect::new(0, 0, 8, 8));
    assert_eq!(snap.stride(), 32);
    assert!(snap.data().len() >= 32 * 8);
}

fn create_window(x: &X11Connection, parent: Window, rect: Rect, border: u16) -> Window {
    let conn = x.connection();
    let id = conn.generate_id().unwrap();
    conn.create_window(
        x11rb::COPY_DEPTH_FROM_PARENT,
        id,
        parent,
        rect.x as i16,
        rect.y as i16,
        rect.width as u16,
        rect.height as u16,
        border,
        WindowClass::INPUT_OUTPUT,
        x11rb::COPY_FROM_PARENT,
        &CreateWindowAux::new(),
    )
    .unwrap()
    .check()
    .unwrap();
    id
}

#[test]
fn bounds_cover_the_frame_and_client_bounds_do_not() {
    let Some(x) = connect() else { return };
    // stands in for a reparenting window manager's decoration
    let frame = create_window(&x, x.root(), Rect::new(100, 100, 320, 264), 0);
    let client = create_window(&x, frame, Rect::new(0, 24, 320, 240), 0);
    let windows = X11Windows::new(x.clone());
    let handle = WindowHandle::from_raw(u64::from(client));

    assert_eq!(windows.bounds(handle), Rect::new(100, 100, 320, 264));
    assert_eq!(windows.client_bounds(handle), Rect::new(100, 124, 320, 240));

    let bordered = create_window(&x, x.root(), Rect::new(10, 20, 50, 40), 3);
    let bordered = WindowHandle::from_raw(u64::from(bordered));
    assert_eq!(windows.bounds(bordered), Rect::new(10, 20, 56, 46));
    assert_eq!(windows.client_bounds(bordered), Rect::new(13, 23, 50, 40));

    for window in [frame, u32::try_from(bordered.raw()).unwrap()] {
        x.connection().destroy_window(window).unwrap();
    }
    x.connection().flush().unwrap();
}

#[test]
fn window_snapshot_reads_only_the_requested_part() {
    let Some(x) = connect() else { return };
    let window = create_window(&x, x.root(), Rect::new(0, 0, 64, 48), 0);
    let conn = x.connection();
    conn.map_window(window).unwrap();
    conn.get_input_focus().unwrap().reply().unwrap();
    let capture = X11Capture::new(x.clone());
    let surface = Surface::Window(WindowHandle::from_raw(u64::from(window)));

    // twice, so the second capture redirects again after the first released it
    for _ in 0..2 {
        let snap = capture.snapshot(surface, Rect::new(-4, 40, 16, 16)).unwrap();
        assert_eq!(snap.bounds(), Rect::new(0, 40, 12, 8));
        assert_eq!(snap.stride(), 48);
        assert!(snap.data().len() >= 48 * 8);
    }
    let outside = capture.snapshot(surface, Rect::new(100, 0, 8, 8)).unwrap();
    assert_eq!(outside.bounds().width, 0);

    conn.destroy_window(window).unwrap();
    conn.flush().unwrap();
}
