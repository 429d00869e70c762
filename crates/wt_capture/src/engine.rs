use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use wt_platform::{
    AcceleratedCapture, BackendTarget, CaptureMode, CaptureSource, PixelBuffer, PlatformError,
    Rect, Result, Surface, WindowHandle, WindowSystem,
};

use crate::convert::{copy_from_snapshot, copy_rows};

/// Produces pixel buffers for a batch of rectangles from one frame of a target.
///
/// Captures share nothing mutable except the accelerated backend's hook cache, so calls on
/// different windows can run in parallel.
pub struct CaptureEngine {
    windows: Arc<dyn WindowSystem>,
    source: Arc<dyn CaptureSource>,
    accelerated: Option<Arc<dyn AcceleratedCapture>>,
    hooked: Mutex<HashMap<WindowHandle, BackendTarget>>,
}

impl CaptureEngine {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        source: Arc<dyn CaptureSource>,
        accelerated: Option<Arc<dyn AcceleratedCapture>>,
    ) -> Self {
        Self {
            windows,
            source,
            accelerated,
            hooked: Mutex::new(HashMap::new()),
        }
    }

    /// Captures every rectangle of `rects` from a single frame of `target`.
    ///
    /// All rectangles are validated before anything touches the OS; one bad rectangle fails the
    /// whole batch with [`PlatformError::InvalidRectangle`]. Window and accelerated rectangles
    /// are relative to the target's client area. Desktop rectangles are offset by the target's
    /// client origin as well, so for the null handle they are plain screen coordinates.
    pub fn capture_multi(
        &self,
        target: WindowHandle,
        mode: CaptureMode,
        rects: &[Rect],
    ) -> Result<Vec<PixelBuffer>> {
        for rect in rects {
            rect.validate_capture()?;
        }
        if rects.is_empty() {
            return Ok(Vec::new());
        }
        match mode {
            CaptureMode::Desktop => self.capture_desktop(target, rects),
            CaptureMode::Window => self.capture_window(target, rects),
            CaptureMode::Accelerated => self.capture_accelerated(target, rects),
        }
    }

    /// Keyed form of [`CaptureEngine::capture_multi`]; output keeps the input order.
    pub fn capture_named<K>(
        &self,
        target: WindowHandle,
        mode: CaptureMode,
        rects: Vec<(K, Rect)>,
    ) -> Result<Vec<(K, PixelBuffer)>> {
        let (keys, plain): (Vec<K>, Vec<Rect>) = rects.into_iter().unzip();
        let buffers = self.capture_multi(target, mode, &plain)?;
        Ok(keys.into_iter().zip(buffers).collect())
    }

    fn capture_desktop(&self, target: WindowHandle, rects: &[Rect]) -> Result<Vec<PixelBuffer>> {
        let origin = if target.is_null() {
            Rect::ZERO
        } else {
            self.windows.client_bounds(target)
        };
        let shifted = rects
            .iter()
            .map(|r| r.checked_translate(origin.x, origin.y).ok_or_else(|| r.invalid()))
            .collect::<Result<Vec<Rect>>>()?;
        self.slice_snapshot(Surface::Desktop, &shifted)
    }

    fn capture_window(&self, target: WindowHandle, rects: &[Rect]) -> Result<Vec<PixelBuffer>> {
        if target.is_null() {
            return self.slice_snapshot(Surface::Desktop, rects);
        }
        self.slice_snapshot(Surface::Window(target), rects)
    }

    fn slice_snapshot(&self, surface: Surface, rects: &[Rect]) -> Result<Vec<PixelBuffer>> {
        let Some(region) = Rect::bounding(rects) else {
            return Ok(Vec::new());
        };
        let snapshot = self.source.snapshot(surface, region)?;
        log::debug!(
            "snapshot {:?} region {:?} covered {:?}",
            surface,
            region,
            snapshot.bounds()
        );
        Ok(rects
            .iter()
            .map(|r| copy_from_snapshot(snapshot.as_ref(), *r))
            .collect())
    }

    fn capture_accelerated(
        &self,
        target: WindowHandle,
        rects: &[Rect],
    ) -> Result<Vec<PixelBuffer>> {
        let backend = self
            .accelerated
            .as_ref()
            .ok_or_else(|| PlatformError::backend("no accelerated capture backend is loaded"))?;
        let handle = self.hooked_target(backend.as_ref(), target)?;

        let raw = match backend.capture_multiple(handle, rects) {
            Ok(raw) => raw,
            Err(err) => {
                // The target may have died; hook it again next time.
                self.release_target(target);
                return Err(match err {
                    PlatformError::BackendFailure(_) => err,
                    other => PlatformError::backend(other.to_string()),
                });
            }
        };

        let expected: usize = rects.iter().map(Rect::rgba_len).sum();
        if raw.len() < expected {
            return Err(PlatformError::backend(format!(
                "backend returned {} bytes, expected {expected}",
                raw.len()
            )));
        }

        let layout = backend.layout();
        let mut offset = 0;
        let mut out = Vec::with_capacity(rects.len());
        for rect in rects {
            let len = rect.rgba_len();
            let mut buf = PixelBuffer::zeroed(rect.width as u32, rect.height as u32);
            copy_rows(&raw[offset..offset + len], buf.as_bytes_mut(), layout, false);
            offset += len;
            out.push(buf);
        }
        Ok(out)
    }

    fn hooked_target(
        &self,
        backend: &dyn AcceleratedCapture,
        window: WindowHandle,
    ) -> Result<BackendTarget> {
        let mut hooked = self.hooked.lock();
        if let Some(target) = hooked.get(&window) {
            return Ok(*target);
        }
        let target = backend.hook_target(window).map_err(|err| match err {
            PlatformError::BackendFailure(_) => err,
            other => PlatformError::backend(other.to_string()),
        })?;
        log::debug!("accelerated backend hooked {window} as {target:?}");
        hooked.insert(window, target);
        Ok(target)
    }

    /// Drops the accelerated backend's hook on `window`, if any.
    pub fn release_target(&self, window: WindowHandle) {
        let Some(target) = self.hooked.lock().remove(&window) else {
            return;
        };
        if let Some(backend) = &self.accelerated {
            backend.release_target(target);
        }
    }

    pub fn has_accelerated_backend(&self) -> bool {
        self.accelerated.is_some()
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        let hooked = std::mem::take(&mut *self.hooked.lock());
        if let Some(backend) = &self.accelerated {
            for (_, target) in hooked {
                backend.release_target(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_platform::testing::{
        DESKTOP_TINT, FakeAccelerated, FakeDesktop, WindowSpec, expected_rgba,
    };

    struct Fixture {
        desk: Arc<FakeDesktop>,
        accel: Arc<FakeAccelerated>,
        engine: CaptureEngine,
    }

    fn fixture() -> Fixture {
        let desk = Arc::new(FakeDesktop::new(1920, 1080));
        let accel = Arc::new(FakeAccelerated::new());
        let engine = CaptureEngine::new(desk.clone(), desk.clone(), Some(accel.clone()));
        Fixture { desk, accel, engine }
    }

    #[test]
    fn buffers_are_sized_per_rectangle() {
        let f = fixture();
        let game = f
            .desk
            .add_top_level(WindowSpec::new("RuneScape").rect(50, 50, 800, 600));
        let rects = [
            Rect::new(0, 0, 10, 20),
            Rect::new(100, 50, 33, 7),
            Rect::new(5, 5, 1, 1),
        ];
        for mode in [CaptureMode::Desktop, CaptureMode::Window, CaptureMode::Accelerated] {
            let out = f.engine.capture_multi(game, mode, &rects).unwrap();
            assert_eq!(out.len(), 3);
            for (buf, rect) in out.iter().zip(&rects) {
                assert_eq!(buf.as_bytes().len(), rect.rgba_len(), "{mode}");
            }
            let total: usize = out.iter().map(|b| b.as_bytes().len()).sum();
            assert_eq!(total, (10 * 20 + 33 * 7 + 1) * 4);
        }
    }

    #[test]
    fn invalid_rectangles_never_reach_the_os() {
        let f = fixture();
        let game = f.desk.add_top_level(WindowSpec::new("RuneScape"));
        let bad = [
            Rect::new(0, 0, 0, 10),
            Rect::new(0, 0, 10, -1),
            Rect::new(0, 0, 10_001, 10),
        ];
        for rect in bad {
            for mode in [CaptureMode::Desktop, CaptureMode::Window, CaptureMode::Accelerated] {
                let err = f
                    .engine
                    .capture_multi(game, mode, &[Rect::new(0, 0, 5, 5), rect])
                    .unwrap_err();
                assert!(matches!(err, PlatformError::InvalidRectangle { .. }));
            }
        }
        assert_eq!(f.desk.snapshots_taken(), 0);
        assert_eq!(f.accel.hooks(), 0);
        assert_eq!(f.accel.calls(), 0);
    }

    #[test]
    fn extreme_origins_do_not_overflow() {
        let f = fixture();
        let far_apart = [
            Rect::new(-2_000_000_000, 0, 10, 10),
            Rect::new(2_000_000_000, 0, 10, 10),
            Rect::new(0, 0, 4, 4),
        ];
        let out = f
            .engine
            .capture_multi(WindowHandle::NULL, CaptureMode::Desktop, &far_apart)
            .unwrap();
        assert!(out[0].as_bytes().iter().all(|&b| b == 0));
        assert!(out[1].as_bytes().iter().all(|&b| b == 0));
        assert_eq!(out[2].pixel(3, 3), Some(expected_rgba(3, 3, DESKTOP_TINT)));

        let err = f
            .engine
            .capture_multi(
                WindowHandle::NULL,
                CaptureMode::Desktop,
                &[Rect::new(i32::MAX - 5, 0, 10, 10)],
            )
            .unwrap_err();
        assert!(matches!(err, PlatformError::InvalidRectangle { .. }));
        assert_eq!(f.desk.snapshots_taken(), 1);
    }

    #[test]
    fn desktop_offset_past_i32_is_rejected() {
        let f = fixture();
        let game = f
            .desk
            .add_top_level(WindowSpec::new("RuneScape").rect(50, 50, 800, 600));
        let origin = f.desk.client_bounds(game);
        let near_edge = Rect::new(i32::MAX - origin.x - 2, 0, 5, 5);
        assert!(near_edge.validate_capture().is_ok());
        let err = f
            .engine
            .capture_multi(game, CaptureMode::Desktop, &[near_edge])
            .unwrap_err();
        assert_eq!(err, near_edge.invalid());
        assert_eq!(f.desk.snapshots_taken(), 0);
    }

    #[test]
    fn desktop_capture_of_the_null_window() {
        let f = fixture();
        let out = f
            .engine
            .capture_multi(WindowHandle::NULL, CaptureMode::Desktop, &[Rect::new(0, 0, 100, 100)])
            .unwrap();
        let buf = &out[0];
        assert_eq!(buf.as_bytes().len(), 40_000);
        assert!(buf.as_bytes().chunks_exact(4).all(|px| px[3] == 0xFF));
        assert_eq!(buf.pixel(0, 0), Some(expected_rgba(0, 0, DESKTOP_TINT)));
        assert_eq!(buf.pixel(99, 42), Some(expected_rgba(99, 42, DESKTOP_TINT)));
    }

    #[test]
    fn desktop_rectangles_are_relative_to_the_client_origin() {
        let f = fixture();
        let game = f.desk.add_top_level(
            WindowSpec::new("RuneScape")
                .rect(200, 100, 800, 600)
                .client(Rect::new(8, 31, 784, 561)),
        );
        let out = f
            .engine
            .capture_multi(game, CaptureMode::Desktop, &[Rect::new(10, 20, 4, 4)])
            .unwrap();
        // client origin is (208, 131)
        assert_eq!(out[0].pixel(0, 0), Some(expected_rgba(218, 151, DESKTOP_TINT)));
    }

    #[test]
    fn all_rectangles_come_from_one_snapshot() {
        let f = fixture();
        let game = f
            .desk
            .add_top_level(WindowSpec::new("RuneScape").rect(0, 0, 800, 600).tint(0x11));
        let rects = [Rect::new(0, 0, 50, 50), Rect::new(700, 500, 100, 100)];
        let out = f.engine.capture_multi(game, CaptureMode::Window, &rects).unwrap();
        assert_eq!(f.desk.snapshots_taken(), 1);
        assert_eq!(f.desk.snapshots_released(), 1);
        assert_eq!(out[1].pixel(0, 0), Some(expected_rgba(700, 500, 0x11)));
        assert_eq!(out[1].pixel(99, 99), Some(expected_rgba(799, 599, 0x11)));
    }

    #[test]
    fn window_capture_outside_the_client_is_zero_filled() {
        let f = fixture();
        let game = f
            .desk
            .add_top_level(WindowSpec::new("RuneScape").rect(0, 0, 100, 100));
        let out = f
            .engine
            .capture_multi(game, CaptureMode::Window, &[Rect::new(90, 90, 20, 20)])
            .unwrap();
        assert_eq!(out[0].pixel(9, 9), Some(expected_rgba(99, 99, 0x40)));
        assert_eq!(out[0].pixel(10, 10), Some([0, 0, 0, 0]));
    }

    #[test]
    fn true_alpha_sources_keep_their_alpha() {
        let f = fixture();
        let overlay = f
            .desk
            .add_top_level(WindowSpec::new("Overlay").rect(0, 0, 10, 10).with_alpha());
        let out = f
            .engine
            .capture_multi(overlay, CaptureMode::Window, &[Rect::new(0, 0, 2, 2)])
            .unwrap();
        assert_eq!(out[0].pixel(1, 1).map(|px| px[3]), Some(0x7F));
    }

    #[test]
    fn snapshot_failure_is_reported_and_nothing_leaks() {
        let f = fixture();
        let gone = WindowHandle::from_raw(0xdead);
        let err = f
            .engine
            .capture_multi(gone, CaptureMode::Window, &[Rect::new(0, 0, 5, 5)])
            .unwrap_err();
        assert!(matches!(err, PlatformError::ResourceAcquisition(_)));
        assert_eq!(f.desk.snapshots_taken(), f.desk.snapshots_released());
    }

    #[test]
    fn accelerated_batches_into_one_call_and_caches_the_hook() {
        let f = fixture();
        let game = f.desk.add_top_level(WindowSpec::new("RuneScape"));
        let rects = [Rect::new(0, 0, 3, 3), Rect::new(10, 10, 2, 2)];
        let out = f.engine.capture_multi(game, CaptureMode::Accelerated, &rects).unwrap();
        f.engine.capture_multi(game, CaptureMode::Accelerated, &rects).unwrap();
        assert_eq!(f.accel.calls(), 2);
        assert_eq!(f.accel.hooks(), 1);
        assert_eq!(out[1].pixel(1, 1), Some(expected_rgba(11, 11, FakeAccelerated::TINT)));
    }

    #[test]
    fn accelerated_failure_surfaces_the_backend_message() {
        let f = fixture();
        let game = f.desk.add_top_level(WindowSpec::new("RuneScape"));
        f.accel.fail_with(Some("Failed to capture, native error: 5"));
        let err = f
            .engine
            .capture_multi(game, CaptureMode::Accelerated, &[Rect::new(0, 0, 5, 5)])
            .unwrap_err();
        assert_eq!(
            err,
            PlatformError::BackendFailure("Failed to capture, native error: 5".into())
        );
        // the failed hook is released rather than reused
        assert_eq!(f.accel.live_targets(), 0);
    }

    #[test]
    fn short_backend_replies_are_rejected() {
        let f = fixture();
        let game = f.desk.add_top_level(WindowSpec::new("RuneScape"));
        f.accel.truncate_replies(true);
        let err = f
            .engine
            .capture_multi(game, CaptureMode::Accelerated, &[Rect::new(0, 0, 5, 5)])
            .unwrap_err();
        assert!(matches!(err, PlatformError::BackendFailure(_)));
    }

    #[test]
    fn missing_backend_is_a_backend_failure() {
        let desk = Arc::new(FakeDesktop::new(100, 100));
        let engine = CaptureEngine::new(desk.clone(), desk.clone(), None);
        let err = engine
            .capture_multi(WindowHandle::NULL, CaptureMode::Accelerated, &[Rect::new(0, 0, 1, 1)])
            .unwrap_err();
        assert!(matches!(err, PlatformError::BackendFailure(_)));
    }

    #[test]
    fn dropping_the_engine_releases_hooks() {
        let f = fixture();
        let game = f.desk.add_top_level(WindowSpec::new("RuneScape"));
        f.engine
            .capture_multi(game, CaptureMode::Accelerated, &[Rect::new(0, 0, 1, 1)])
            .unwrap();
        let accel = f.accel.clone();
        drop(f);
        assert_eq!(accel.live_targets(), 0);
        assert_eq!(accel.releases(), 1);
    }

    #[test]
    fn named_rectangles_keep_their_keys() {
        let f = fixture();
        let out = f
            .engine
            .capture_named(
                WindowHandle::NULL,
                CaptureMode::Desktop,
                vec![("chat", Rect::new(0, 0, 4, 4)), ("minimap", Rect::new(8, 8, 2, 2))],
            )
            .unwrap();
        assert_eq!(out[0].0, "chat");
        assert_eq!(out[1].0, "minimap");
        assert_eq!(out[1].1.width(), 2);
    }
}
