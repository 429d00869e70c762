//! X11 backend on x11rb: window queries, MIT-SHM and Composite capture, structure
//! notifications and RECORD button presses.
//!
//! Everything is compiled on Linux only; elsewhere the crate is empty.

#[cfg(target_os = "linux")]
mod capture;
#[cfg(target_os = "linux")]
mod connection;
#[cfg(target_os = "linux")]
mod events;
#[cfg(target_os = "linux")]
mod window;

#[cfg(target_os = "linux")]
pub use capture::X11Capture;
#[cfg(target_os = "linux")]
pub use connection::X11Connection;
#[cfg(target_os = "linux")]
pub use events::X11Events;
#[cfg(target_os = "linux")]
pub use window::X11Windows;

/// Opens the shared display connection and builds the backend on it.
///
/// X11 has no accelerated capture library; a configured one is ignored.
#[cfg(target_os = "linux")]
pub fn backend(options: &wt_platform::BackendOptions) -> wt_platform::Result<wt_platform::PlatformBackend> {
    use std::sync::Arc;

    if let Some(path) = &options.accelerated_library {
        log::warn!("accelerated capture is not available on X11, ignoring {}", path.display());
    }
    let x = X11Connection::shared()?;
    let windows = Arc::new(X11Windows::new(x.clone()));
    Ok(wt_platform::PlatformBackend {
        name: "x11",
        windows: windows.clone(),
        system: windows,
        capture: Arc::new(X11Capture::new(x)),
        accelerated: None,
        events: Arc::new(X11Events::new()),
    })
}
