use std::ffi::c_void;

use windows::Win32::Foundation::{HANDLE, RECT};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CAPTUREBLT, CreateCompatibleDC,
    CreateDIBSection, DIB_RGB_COLORS, GdiFlush, HDC, RGBQUAD, ROP_CODE, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PRINT_WINDOW_FLAGS, PW_CLIENTONLY, PrintWindow};
use windows::Win32::UI::WindowsAndMessaging::{GetClientRect, IsWindow};

use wt_platform::{
    CaptureSource, PixelLayout, PlatformError, Rect, Result, Snapshot, Surface,
};

use crate::resources::{ManagedBitmap, ManagedDC, WindowDc};
use crate::window::hwnd;

/// Asks DWM to render the full window content, including DirectX surfaces.
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(0x2);

/// Top-down 32bpp DIB section selected into a memory DC.
///
/// Both stay alive for as long as the snapshot; the pixel slice points into the section.
struct DibSnapshot {
    bounds: Rect,
    memory: ManagedDC,
    bitmap: ManagedBitmap,
}

impl DibSnapshot {
    fn create(compatible: HDC, bounds: Rect) -> Result<Self> {
        let info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: bounds.width,
                biHeight: -bounds.height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            bmiColors: [RGBQUAD::default(); 1],
        };
        let mut dc = ManagedDC::new(unsafe { CreateCompatibleDC(Some(compatible)) });
        if !dc.is_valid() {
            return Err(PlatformError::resource("memory DC"));
        }
        let mut bits: *mut c_void = std::ptr::null_mut();
        let section = unsafe {
            CreateDIBSection(
                Some(dc.handle()),
                &info,
                DIB_RGB_COLORS,
                &mut bits,
                Some(HANDLE(std::ptr::null_mut())),
                0,
            )
        }
        .map_err(|e| PlatformError::resource(format!("DIB section: {e}")))?;
        if bits.is_null() {
            return Err(PlatformError::resource("DIB section bits"));
        }
        let bitmap = ManagedBitmap::new(section, bits);
        dc.select(&bitmap);
        log::trace!("allocated {}x{} DIB section", bounds.width, bounds.height);
        Ok(Self {
            bounds,
            memory: dc,
            bitmap,
        })
    }

    fn dc(&self) -> HDC {
        self.memory.handle()
    }
}

impl Snapshot for DibSnapshot {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn stride(&self) -> usize {
        self.bounds.width as usize * 4
    }

    fn data(&self) -> &[u8] {
        let len = self.stride() * self.bounds.height as usize;
        // SAFETY: the section is width*height*4 bytes and lives as long as `self.bitmap`
        unsafe { std::slice::from_raw_parts(self.bitmap.bits() as *const u8, len) }
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }

    fn has_alpha(&self) -> bool {
        false
    }
}

/// GDI capture: BitBlt from the screen DC for the desktop, PrintWindow for windows so occluded
/// windows still render.
#[derive(Debug, Default)]
pub struct GdiCapture;

impl GdiCapture {
    pub fn new() -> Self {
        Self
    }

    fn desktop(&self, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        let screen = WindowDc::get(None).ok_or_else(|| PlatformError::resource("screen DC"))?;
        let snap = DibSnapshot::create(screen.handle(), region)?;
        unsafe {
            BitBlt(
                snap.dc(),
                0,
                0,
                region.width,
                region.height,
                Some(screen.handle()),
                region.x,
                region.y,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            )
        }
        .map_err(|e| PlatformError::resource(format!("BitBlt failed: {e}")))?;
        unsafe {
            let _ = GdiFlush();
        }
        Ok(Box::new(snap))
    }

    fn window(&self, window: wt_platform::WindowHandle) -> Result<Box<dyn Snapshot + '_>> {
        let target = hwnd(window);
        if !unsafe { IsWindow(Some(target)) }.as_bool() {
            return Err(PlatformError::resource(format!("window {window} is gone")));
        }
        let mut client = RECT::default();
        unsafe { GetClientRect(target, &mut client) }
            .map_err(|e| PlatformError::resource(format!("client rect: {e}")))?;
        let bounds = Rect::from_edges(0, 0, client.right - client.left, client.bottom - client.top);
        if bounds.is_empty() {
            return Err(PlatformError::resource(format!("window {window} has no client area")));
        }

        let source = WindowDc::get(Some(target))
            .ok_or_else(|| PlatformError::resource("window DC"))?;
        let snap = DibSnapshot::create(source.handle(), bounds)?;
        let printed =
            unsafe { PrintWindow(target, snap.dc(), PW_CLIENTONLY | PW_RENDERFULLCONTENT) };
        if !printed.as_bool() {
            // PrintWindow refuses some windows; fall back to the visible pixels
            unsafe {
                BitBlt(
                    snap.dc(),
                    0,
                    0,
                    bounds.width,
                    bounds.height,
                    Some(source.handle()),
                    0,
                    0,
                    SRCCOPY,
                )
            }
            .map_err(|e| PlatformError::resource(format!("BitBlt failed: {e}")))?;
        }
        unsafe {
            let _ = GdiFlush();
        }
        Ok(Box::new(snap))
    }
}

impl CaptureSource for GdiCapture {
    fn snapshot(&self, surface: Surface, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        match surface {
            Surface::Desktop => self.desktop(region),
            Surface::Window(window) => self.window(window),
        }
    }
}
