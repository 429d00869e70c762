use std::sync::Arc;

use wt_capture::CaptureEngine;
use wt_events::{EventSubsystem, Listener};
use wt_locate::{ClassMatcher, HitTester, WindowMatcher, find_deepest_matching, find_main_window};
use wt_pin::Pinning;
use wt_platform::{
    CaptureMode, EventKind, PixelBuffer, PlatformBackend, Point, Rect, Result, ShapeOp,
    WindowHandle,
};

use crate::config::HostConfig;
use crate::process::ProcessService;

/// Everything a binding layer calls, on one platform backend.
///
/// String arguments (capture modes, event kinds, shape operations) are parsed here so bindings
/// can pass them through unchanged.
pub struct WindowHost {
    // dropped in this order: pins unsubscribe before the event threads go away
    pinning: Pinning,
    events: Arc<EventSubsystem>,
    engine: CaptureEngine,
    backend: PlatformBackend,
    matcher: Arc<dyn WindowMatcher>,
    processes: ProcessService,
    default_mode: CaptureMode,
}

impl WindowHost {
    /// Opens the backend of the platform this was built for.
    pub fn native(config: &HostConfig) -> Result<Self> {
        let options = config.backend_options();
        #[cfg(windows)]
        let backend = wt_platform_windows::backend(&options)?;
        #[cfg(target_os = "linux")]
        let backend = wt_platform_x11::backend(&options)?;
        #[cfg(target_os = "macos")]
        let backend = wt_platform_macos::backend(&options)?;
        #[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
        let backend: PlatformBackend = {
            let _ = options;
            return Err(wt_platform::PlatformError::Unsupported("no window system backend"));
        };
        Self::from_backend(backend, config)
    }

    pub fn from_backend(backend: PlatformBackend, config: &HostConfig) -> Result<Self> {
        let default_mode = config.capture_mode()?;
        let matcher: Arc<dyn WindowMatcher> =
            Arc::new(ClassMatcher::new(config.target_classes.iter().cloned()));
        Self::with_matcher(backend, default_mode, matcher)
    }

    /// Uses `matcher` for show events and [`WindowHost::find_target_windows`].
    pub fn with_matcher(
        backend: PlatformBackend,
        default_mode: CaptureMode,
        matcher: Arc<dyn WindowMatcher>,
    ) -> Result<Self> {
        let engine = CaptureEngine::new(
            backend.system.clone(),
            backend.capture.clone(),
            backend.accelerated.clone(),
        );
        let events = Arc::new(EventSubsystem::new(
            backend.events.clone(),
            backend.windows.clone(),
            matcher.clone(),
        ));
        let pinning = Pinning::new(events.clone(), backend.system.clone());
        log::info!(
            "window host on {} (default capture mode {default_mode}, accelerated: {})",
            backend.name,
            engine.has_accelerated_backend()
        );
        Ok(Self {
            pinning,
            events,
            engine,
            backend,
            matcher,
            processes: ProcessService::new(),
            default_mode,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name
    }

    pub fn default_mode(&self) -> CaptureMode {
        self.default_mode
    }

    // capture

    /// One buffer per named rectangle, from a single frame of `window`.
    pub fn capture_multi<K>(
        &self,
        window: WindowHandle,
        mode: &str,
        rects: Vec<(K, Rect)>,
    ) -> Result<Vec<(K, PixelBuffer)>> {
        let mode: CaptureMode = mode.parse()?;
        self.engine.capture_named(window, mode, rects)
    }

    pub fn capture(
        &self,
        window: WindowHandle,
        mode: CaptureMode,
        rects: &[Rect],
    ) -> Result<Vec<PixelBuffer>> {
        self.engine.capture_multi(window, mode, rects)
    }

    /// [`WindowHost::capture`] with the configured mode.
    pub fn capture_default(&self, window: WindowHandle, rects: &[Rect]) -> Result<Vec<PixelBuffer>> {
        self.engine.capture_multi(window, self.default_mode, rects)
    }

    pub fn capture_window(&self, window: WindowHandle, rect: Rect) -> Result<PixelBuffer> {
        let mut buffers = self.capture_default(window, &[rect])?;
        buffers
            .pop()
            .ok_or_else(|| wt_platform::PlatformError::backend("capture returned no buffer"))
    }

    /// Drops a cached accelerated hook, e.g. after the target restarted.
    pub fn release_capture_target(&self, window: WindowHandle) {
        self.engine.release_target(window);
    }

    // lookup

    pub fn find_main_window(&self, pid: u32) -> WindowHandle {
        find_main_window(self.backend.windows.as_ref(), pid)
    }

    pub fn find_matching_windows(&self, matcher: &dyn WindowMatcher) -> Vec<WindowHandle> {
        find_deepest_matching(self.backend.windows.as_ref(), matcher).into_windows()
    }

    /// Deepest windows accepted by the configured matcher.
    pub fn find_target_windows(&self) -> Vec<WindowHandle> {
        self.find_matching_windows(self.matcher.as_ref())
    }

    /// Direct children of the root, topmost first.
    pub fn top_level_windows(&self) -> Vec<WindowHandle> {
        let windows = &self.backend.windows;
        let mut top = windows.children(windows.root());
        top.reverse();
        top
    }

    pub fn class_name(&self, window: WindowHandle) -> String {
        self.backend.windows.class_name(window)
    }

    pub fn window_at(&self, x: i32, y: i32) -> WindowHandle {
        HitTester::new(self.backend.windows.as_ref()).hit_test(Point::new(x, y))
    }

    // window queries and mutation

    pub fn bounds(&self, window: WindowHandle) -> Rect {
        self.backend.system.bounds(window)
    }

    pub fn client_bounds(&self, window: WindowHandle) -> Rect {
        self.backend.system.client_bounds(window)
    }

    pub fn title(&self, window: WindowHandle) -> String {
        self.backend.system.title(window)
    }

    pub fn is_valid(&self, window: WindowHandle) -> bool {
        self.backend.system.is_valid(window)
    }

    pub fn window_pid(&self, window: WindowHandle) -> u32 {
        self.backend.system.pid(window)
    }

    pub fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> Result<()> {
        self.backend.system.set_bounds(window, bounds)
    }

    pub fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<()> {
        self.backend.system.set_parent(window, parent)
    }

    pub fn set_window_shape(&self, window: WindowHandle, rects: &[Rect], op: &str) -> Result<()> {
        let op: ShapeOp = op.parse()?;
        self.backend.system.set_shape(window, rects, op)
    }

    pub fn clear_window_shape(&self, window: WindowHandle) -> Result<()> {
        self.backend.system.clear_shape(window)
    }

    pub fn active_window(&self) -> WindowHandle {
        self.backend.system.active_window()
    }

    pub fn work_area(&self, window: WindowHandle) -> Rect {
        self.backend.system.work_area(window)
    }

    // events

    pub fn subscribe(&self, window: WindowHandle, kind: &str, listener: Listener) -> Result<()> {
        let kind: EventKind = kind.parse()?;
        self.events.subscribe(window, kind, listener)
    }

    /// False when no subscription matched.
    pub fn unsubscribe(&self, window: WindowHandle, kind: &str, listener: &Listener) -> Result<bool> {
        let kind: EventKind = kind.parse()?;
        Ok(self.events.unsubscribe(window, kind, listener))
    }

    pub fn events(&self) -> &Arc<EventSubsystem> {
        &self.events
    }

    /// Set once the display connection is gone; every later event call is pointless.
    pub fn connection_lost(&self) -> Option<String> {
        self.events.connection_lost()
    }

    // pinning

    pub fn pin(&self, window: WindowHandle, parent: WindowHandle) -> Result<()> {
        self.pinning.pin(window, parent)
    }

    pub fn unpin(&self, window: WindowHandle) -> bool {
        self.pinning.unpin(window)
    }

    pub fn pinning(&self) -> &Pinning {
        &self.pinning
    }

    // processes

    pub fn processes_by_name(&self, name: &str, parent_pid: u32) -> Vec<u32> {
        self.processes.processes_by_name(name, parent_pid)
    }

    pub fn process_name_by_pid(&self, pid: u32) -> String {
        self.processes.process_name_by_pid(pid)
    }
}
