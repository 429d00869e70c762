use std::fmt;
use std::str::FromStr;

use crate::error::{PlatformError, Result};
use crate::geometry::Rect;
use crate::handle::WindowHandle;

/// Strategy used to obtain pixels. It selects how, never what shape the output has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    /// Read from the live desktop surface. Rectangles are offset by the target's client origin.
    Desktop,
    /// Read the window's own (possibly obscured) contents.
    Window,
    /// Delegate to an external accelerated capture backend.
    Accelerated,
}

impl CaptureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureMode::Desktop => "desktop",
            CaptureMode::Window => "window",
            CaptureMode::Accelerated => "accelerated",
        }
    }
}

impl FromStr for CaptureMode {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "desktop" => Ok(CaptureMode::Desktop),
            "window" => Ok(CaptureMode::Window),
            // "opengl" is the name older hosts use for the accelerated path.
            "accelerated" | "opengl" => Ok(CaptureMode::Accelerated),
            other => Err(PlatformError::UnknownCaptureMode(other.to_string())),
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte order of a 32-bit-per-pixel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Bgra,
    Rgba,
}

/// Top-down RGBA8 pixels for one captured rectangle.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Transparent black buffer of the given size.
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.width as usize * 4;
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Which surface a snapshot is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The root display surface, addressed in screen coordinates.
    Desktop,
    /// A window's client area, addressed relative to its client origin.
    Window(WindowHandle),
}

/// One frame of pixel data held by the OS or by a backend.
///
/// Dropping the snapshot releases everything that was acquired for it (bitmaps, device contexts,
/// shared-memory segments, named pixmaps).
pub trait Snapshot {
    /// Area covered by [`Snapshot::data`], in the surface's coordinate space.
    fn bounds(&self) -> Rect;

    /// Bytes per row of [`Snapshot::data`].
    fn stride(&self) -> usize;

    fn data(&self) -> &[u8];

    fn layout(&self) -> PixelLayout;

    /// Whether the fourth channel holds real alpha. When false it is ignored and forced opaque.
    fn has_alpha(&self) -> bool;
}

/// OS primitive that takes frame snapshots.
pub trait CaptureSource: Send + Sync {
    /// Takes a single frame of `surface` covering at least the part of `region` that exists.
    ///
    /// The returned bounds may be smaller than `region` when the region extends past the surface.
    fn snapshot(&self, surface: Surface, region: Rect) -> Result<Box<dyn Snapshot + '_>>;
}

/// Handle returned by an accelerated backend for a hooked window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendTarget(pub u64);

/// External accelerated capture backend, reached through an opaque handle-and-call interface.
pub trait AcceleratedCapture: Send + Sync {
    fn hook_target(&self, window: WindowHandle) -> Result<BackendTarget>;

    /// Captures every rectangle in one call.
    ///
    /// The result is one contiguous buffer holding each rectangle's pixels back to back, rows
    /// top-down, in [`AcceleratedCapture::layout`] order.
    fn capture_multiple(&self, target: BackendTarget, rects: &[Rect]) -> Result<Vec<u8>>;

    fn release_target(&self, target: BackendTarget);

    fn layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_mode_names() {
        assert_eq!("desktop".parse::<CaptureMode>(), Ok(CaptureMode::Desktop));
        assert_eq!("window".parse::<CaptureMode>(), Ok(CaptureMode::Window));
        assert_eq!("opengl".parse::<CaptureMode>(), Ok(CaptureMode::Accelerated));
        assert_eq!(
            "gpu".parse::<CaptureMode>(),
            Err(PlatformError::UnknownCaptureMode("gpu".into()))
        );
    }

    #[test]
    fn pixel_buffer_size_check() {
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 15]).is_none());
        let buf = PixelBuffer::zeroed(3, 2);
        assert_eq!(buf.as_bytes().len(), 24);
        assert_eq!(buf.pixel(2, 1), Some([0, 0, 0, 0]));
        assert_eq!(buf.pixel(3, 0), None);
    }
}
