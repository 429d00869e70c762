//! Win32 句柄的 RAII 封装
//!
//! 每个封装在离开作用域时释放它拥有的系统资源，捕获和事件路径上的所有 GDI 对象、
//! 设备上下文、动态库与事件钩子都经由这里获取。

use std::ffi::c_void;

use windows::Win32::Foundation::{FreeLibrary, HMODULE, HWND};
use windows::Win32::Graphics::Gdi::{
    DeleteDC, DeleteObject, GetDC, HBITMAP, HDC, HGDIOBJ, HRGN, ReleaseDC, SelectObject,
};
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, UnhookWinEvent};

/// HBITMAP 的 RAII 封装，离开作用域时调用 `DeleteObject`
#[derive(Debug)]
pub struct ManagedBitmap {
    bitmap: HBITMAP,
    /// DIB section 的像素内存，由位图拥有
    bits: *mut c_void,
}

impl ManagedBitmap {
    pub fn new(bitmap: HBITMAP, bits: *mut c_void) -> Self {
        Self { bitmap, bits }
    }

    pub fn handle(&self) -> HBITMAP {
        self.bitmap
    }

    pub fn bits(&self) -> *mut c_void {
        self.bits
    }
}

impl Drop for ManagedBitmap {
    fn drop(&mut self) {
        if !self.bitmap.is_invalid() {
            // SAFETY: 位图由 CreateDIBSection 创建且仅归此封装所有
            unsafe {
                let _ = DeleteObject(self.bitmap.into());
            }
            log::trace!("released bitmap {:?}", self.bitmap.0);
        }
    }
}

/// CreateCompatibleDC 创建的 DC，离开作用域时恢复原先选入的对象并调用 `DeleteDC`
#[derive(Debug)]
pub struct ManagedDC {
    dc: HDC,
    previous: Option<HGDIOBJ>,
}

impl ManagedDC {
    pub fn new(dc: HDC) -> Self {
        Self { dc, previous: None }
    }

    pub fn handle(&self) -> HDC {
        self.dc
    }

    pub fn is_valid(&self) -> bool {
        !self.dc.is_invalid()
    }

    /// 选入位图；原对象在 Drop 时恢复，位图本身仍归调用者所有
    pub fn select(&mut self, bitmap: &ManagedBitmap) {
        // SAFETY: DC 与位图都有效，恢复发生在两者释放之前
        let old = unsafe { SelectObject(self.dc, bitmap.handle().into()) };
        if self.previous.is_none() {
            self.previous = Some(old);
        }
    }
}

impl Drop for ManagedDC {
    fn drop(&mut self) {
        if self.dc.is_invalid() {
            return;
        }
        unsafe {
            if let Some(old) = self.previous.take() {
                SelectObject(self.dc, old);
            }
            let _ = DeleteDC(self.dc);
        }
    }
}

/// GetDC 获得的窗口 DC，离开作用域时 `ReleaseDC`
///
/// `None` 表示整个屏幕。
#[derive(Debug)]
pub struct WindowDc {
    window: Option<HWND>,
    dc: HDC,
}

impl WindowDc {
    pub fn get(window: Option<HWND>) -> Option<Self> {
        let dc = unsafe { GetDC(window) };
        if dc.is_invalid() {
            None
        } else {
            Some(Self { window, dc })
        }
    }

    pub fn handle(&self) -> HDC {
        self.dc
    }
}

impl Drop for WindowDc {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseDC(self.window, self.dc);
        }
    }
}

/// HRGN 的 RAII 封装
///
/// 交给 `SetWindowRgn` 成功后系统接管区域，此时必须调用 [`ManagedRegion::into_inner`]。
#[derive(Debug)]
pub struct ManagedRegion(HRGN);

impl ManagedRegion {
    pub fn new(region: HRGN) -> Option<Self> {
        if region.is_invalid() {
            None
        } else {
            Some(Self(region))
        }
    }

    pub fn handle(&self) -> HRGN {
        self.0
    }

    pub fn into_inner(self) -> HRGN {
        let region = self.0;
        std::mem::forget(self);
        region
    }
}

impl Drop for ManagedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteObject(self.0.into());
        }
    }
}

/// LoadLibraryW 加载的模块，离开作用域时 `FreeLibrary`
#[derive(Debug)]
pub struct ManagedLibrary(HMODULE);

// SAFETY: 模块句柄是进程范围的，可以跨线程使用
unsafe impl Send for ManagedLibrary {}
unsafe impl Sync for ManagedLibrary {}

impl ManagedLibrary {
    pub fn new(module: HMODULE) -> Self {
        Self(module)
    }

    pub fn handle(&self) -> HMODULE {
        self.0
    }
}

impl Drop for ManagedLibrary {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = FreeLibrary(self.0);
            }
            log::debug!("unloaded accelerated capture library");
        }
    }
}

/// SetWinEventHook 返回的钩子，离开作用域时 `UnhookWinEvent`
///
/// 必须在安装它的线程上释放。
#[derive(Debug)]
pub struct WinEventHook(HWINEVENTHOOK);

impl WinEventHook {
    pub fn new(hook: HWINEVENTHOOK) -> Option<Self> {
        if hook.is_invalid() {
            None
        } else {
            Some(Self(hook))
        }
    }
}

impl Drop for WinEventHook {
    fn drop(&mut self) {
        unsafe {
            let _ = UnhookWinEvent(self.0);
        }
    }
}
