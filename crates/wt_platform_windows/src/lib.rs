//! Win32 backend: window queries on HWNDs, GDI capture, the optional accelerated capture
//! library and a WinEvent hook event source.

#[cfg(windows)]
mod accelerated;
#[cfg(windows)]
mod capture;
#[cfg(windows)]
mod events;
#[cfg(windows)]
pub mod resources;
#[cfg(windows)]
mod window;

#[cfg(windows)]
pub use accelerated::DllAccelerated;
#[cfg(windows)]
pub use capture::GdiCapture;
#[cfg(windows)]
pub use events::Win32Events;
#[cfg(windows)]
pub use window::Win32Windows;

#[cfg(windows)]
pub fn backend(options: &wt_platform::BackendOptions) -> wt_platform::Result<wt_platform::PlatformBackend> {
    use std::sync::Arc;

    let windows = Arc::new(Win32Windows::new());
    let accelerated = match &options.accelerated_library {
        Some(path) => match DllAccelerated::load(path) {
            Ok(library) => Some(Arc::new(library) as Arc<dyn wt_platform::AcceleratedCapture>),
            Err(err) => {
                log::warn!("accelerated capture unavailable: {err}");
                None
            }
        },
        None => None,
    };
    Ok(wt_platform::PlatformBackend {
        name: "win32",
        windows: windows.clone(),
        system: windows,
        capture: Arc::new(GdiCapture::new()),
        accelerated,
        events: Arc::new(Win32Events::new()),
    })
}
