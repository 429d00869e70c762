//! Core Graphics backend: window list queries, window server capture and a polling event
//! source. Window mutation and global clicks are unsupported.

#[cfg(target_os = "macos")]
mod capture;
#[cfg(target_os = "macos")]
mod events;
#[cfg(target_os = "macos")]
mod info;
#[cfg(target_os = "macos")]
mod window;

#[cfg(target_os = "macos")]
pub use capture::CgCapture;
#[cfg(target_os = "macos")]
pub use events::CgEvents;
#[cfg(target_os = "macos")]
pub use window::CgWindows;

#[cfg(target_os = "macos")]
pub fn backend(options: &wt_platform::BackendOptions) -> wt_platform::Result<wt_platform::PlatformBackend> {
    use std::sync::Arc;

    if options.accelerated_library.is_some() {
        log::warn!("accelerated capture is not available on macOS");
    }
    let windows = Arc::new(CgWindows::new());
    Ok(wt_platform::PlatformBackend {
        name: "coregraphics",
        windows: windows.clone(),
        system: windows,
        capture: Arc::new(CgCapture::new()),
        accelerated: None,
        events: Arc::new(CgEvents::new(options.poll_interval)),
    })
}
