use core_foundation::data::CFData;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::window::{
    CGWindowID, CGWindowImageOption, CGWindowListOption, create_image, kCGNullWindowID, kCGWindowImageBoundsIgnoreFraming,
    kCGWindowImageDefault, kCGWindowListOptionIncludingWindow, kCGWindowListOptionOnScreenOnly,
};

use wt_platform::{CaptureSource, PixelLayout, PlatformError, Rect, Result, Snapshot, Surface};

use crate::info::{self, window_id};

/// One image pixel per point instead of per backing pixel.
const NOMINAL_RESOLUTION: CGWindowImageOption = 1 << 4;

fn cg_rect(r: Rect) -> CGRect {
    CGRect::new(
        &CGPoint::new(f64::from(r.x), f64::from(r.y)),
        &CGSize::new(f64::from(r.width), f64::from(r.height)),
    )
}

/// Pixels copied out of a CGImage; premultiplied BGRA, rows may be padded.
struct ImageSnapshot {
    bounds: Rect,
    stride: usize,
    data: CFData,
}

impl Snapshot for ImageSnapshot {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn data(&self) -> &[u8] {
        self.data.bytes()
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }

    fn has_alpha(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct CgCapture;

impl CgCapture {
    pub fn new() -> Self {
        Self
    }

    fn grab(
        &self,
        area: Rect,
        list: CGWindowListOption,
        window: CGWindowID,
        options: CGWindowImageOption,
        bounds_origin: (i32, i32),
    ) -> Result<Box<dyn Snapshot + '_>> {
        let image = create_image(cg_rect(area), list, window, options | NOMINAL_RESOLUTION)
            .ok_or_else(|| PlatformError::resource("window server returned no image"))?;
        if image.bits_per_pixel() != 32 {
            return Err(PlatformError::backend(format!(
                "unexpected {} bits per pixel",
                image.bits_per_pixel()
            )));
        }
        let snapshot = ImageSnapshot {
            bounds: Rect::new(
                bounds_origin.0,
                bounds_origin.1,
                image.width() as i32,
                image.height() as i32,
            ),
            stride: image.bytes_per_row(),
            data: image.data(),
        };
        if snapshot.data.bytes().len() < snapshot.stride * image.height() {
            return Err(PlatformError::backend("image data shorter than its rows"));
        }
        log::trace!("captured {:?}", snapshot.bounds);
        Ok(Box::new(snapshot))
    }
}

impl CaptureSource for CgCapture {
    fn snapshot(&self, surface: Surface, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        match surface {
            Surface::Desktop => self.grab(
                region,
                kCGWindowListOptionOnScreenOnly,
                kCGNullWindowID,
                kCGWindowImageDefault,
                (region.x, region.y),
            ),
            Surface::Window(window) => {
                let gone = || PlatformError::resource(format!("window {window} is gone"));
                let id = window_id(window).ok_or_else(gone)?;
                let bounds = info::window(id).map(|i| i.bounds).ok_or_else(gone)?;
                let extent = Rect::new(0, 0, bounds.width, bounds.height);
                let Some(area) = region.intersection(&extent) else {
                    return Ok(Box::new(ImageSnapshot {
                        bounds: Rect::new(region.x, region.y, 0, 0),
                        stride: 0,
                        data: CFData::from_buffer(&[]),
                    }));
                };
                self.grab(
                    area.translate(bounds.x, bounds.y),
                    kCGWindowListOptionIncludingWindow,
                    id,
                    kCGWindowImageBoundsIgnoreFraming,
                    (area.x, area.y),
                )
            }
        }
    }
}
