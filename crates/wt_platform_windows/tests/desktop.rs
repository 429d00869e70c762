#![cfg(windows)]

use wt_platform::{CaptureSource, Rect, Snapshot, Surface, WindowHandle, WindowSystem, WindowTree};
use wt_platform_windows::{GdiCapture, Win32Windows};

#[test]
fn closed_windows_report_zero_values() {
    let windows = Win32Windows::new();
    let gone = WindowHandle::from_raw(0xdead_0000);
    assert!(!windows.is_valid(gone));
    assert_eq!(windows.bounds(gone), Rect::ZERO);
    assert_eq!(windows.title(gone), "");
    assert_eq!(windows.pid(gone), 0);
    assert!(!windows.is_valid(WindowHandle::NULL));
}

#[test]
fn desktop_has_top_level_windows() {
    let windows = Win32Windows::new();
    let root = windows.root();
    assert!(!root.is_null());
    assert!(!windows.children(root).is_empty());
}

#[test]
fn desktop_snapshot_matches_region() {
    let capture = GdiCapture::new();
    let region = Rect::new(0, 0, 16, 8);
    let snap = capture.snapshot(Surface::Desktop, region).unwrap();
    assert_eq!(snap.bounds(), region);
    assert_eq!(snap.data().len(), 16 * 8 * 4);
    assert_eq!(snap.stride(), 64);
}
