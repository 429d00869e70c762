use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use parking_lot::Mutex;
use windows::Win32::Foundation::HWND;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::core::{PCSTR, PCWSTR};

use wt_platform::{
    AcceleratedCapture, BackendTarget, PixelLayout, PlatformError, Rect, Result, WindowHandle,
};

use crate::resources::ManagedLibrary;
use crate::window::hwnd;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawRect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl From<&Rect> for RawRect {
    fn from(r: &Rect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

type HookProcessFn = unsafe extern "C" fn(HWND) -> *mut c_void;
type CaptureMultipleFn = unsafe extern "C" fn(*mut c_void, *const RawRect, i32) -> *const u8;
type UnhookProcessFn = unsafe extern "C" fn(*mut c_void);
type GetDebugFn = unsafe extern "C" fn(*mut u8, i32) -> i32;

/// Capture helper library that hooks the target process and reads frames from its renderer.
///
/// Calls into the library are serialized. Returned frame memory belongs to the library and is
/// copied out before the next call.
pub struct DllAccelerated {
    hook_process: HookProcessFn,
    capture_multiple: CaptureMultipleFn,
    unhook_process: UnhookProcessFn,
    get_debug: GetDebugFn,
    calls: Mutex<()>,
    // last, so the entry points are never used after unloading
    _library: ManagedLibrary,
}

fn symbol<T: Copy>(library: &ManagedLibrary, name: &'static [u8]) -> Result<T> {
    let found = unsafe { GetProcAddress(library.handle(), PCSTR(name.as_ptr())) };
    let Some(entry) = found else {
        let printable = String::from_utf8_lossy(&name[..name.len() - 1]);
        return Err(PlatformError::resource(format!(
            "accelerated capture library has no {printable}"
        )));
    };
    debug_assert_eq!(std::mem::size_of::<T>(), std::mem::size_of_val(&entry));
    // SAFETY: T is the exported function's pointer type
    Ok(unsafe { std::mem::transmute_copy(&entry) })
}

impl DllAccelerated {
    pub fn load(path: &Path) -> Result<Self> {
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let module = unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }.map_err(|e| {
            PlatformError::resource(format!("loading {}: {e}", path.display()))
        })?;
        let library = ManagedLibrary::new(module);
        let loaded = Self {
            hook_process: symbol(&library, b"HookProcess\0")?,
            capture_multiple: symbol(&library, b"CaptureMultiple\0")?,
            unhook_process: symbol(&library, b"UnhookProcess\0")?,
            get_debug: symbol(&library, b"GetDebug\0")?,
            calls: Mutex::new(()),
            _library: library,
        };
        log::info!("loaded accelerated capture library {}", path.display());
        Ok(loaded)
    }

    /// Last diagnostic message of the library.
    fn debug_text(&self) -> String {
        let mut buf = [0u8; 256];
        let len = unsafe { (self.get_debug)(buf.as_mut_ptr(), buf.len() as i32 - 1) };
        let len = (len.max(0) as usize).min(buf.len() - 1);
        let text = String::from_utf8_lossy(&buf[..len]);
        let text = text.trim_end_matches('\0').trim();
        if text.is_empty() {
            "no details".to_string()
        } else {
            text.to_string()
        }
    }
}

impl AcceleratedCapture for DllAccelerated {
    fn hook_target(&self, window: WindowHandle) -> Result<BackendTarget> {
        let _guard = self.calls.lock();
        let hooked = unsafe { (self.hook_process)(hwnd(window)) };
        if hooked.is_null() {
            return Err(PlatformError::backend(self.debug_text()));
        }
        log::debug!("hooked process of window {window}");
        Ok(BackendTarget(hooked as usize as u64))
    }

    fn capture_multiple(&self, target: BackendTarget, rects: &[Rect]) -> Result<Vec<u8>> {
        let raw: Vec<RawRect> = rects.iter().map(RawRect::from).collect();
        let total: usize = rects.iter().map(Rect::rgba_len).sum();
        let _guard = self.calls.lock();
        let pixels = unsafe {
            (self.capture_multiple)(
                target.0 as usize as *mut c_void,
                raw.as_ptr(),
                raw.len() as i32,
            )
        };
        if pixels.is_null() {
            return Err(PlatformError::backend(format!(
                "Failed to capture, native error: {}",
                self.debug_text()
            )));
        }
        // SAFETY: the library returns the rects' pixels back to back in shared memory
        Ok(unsafe { std::slice::from_raw_parts(pixels, total) }.to_vec())
    }

    fn release_target(&self, target: BackendTarget) {
        let _guard = self.calls.lock();
        unsafe { (self.unhook_process)(target.0 as usize as *mut c_void) };
        log::debug!("released accelerated target {:#x}", target.0);
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }
}
