use core_foundation::base::{CFType, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::display::CGDisplay;
use core_graphics::geometry::CGRect;
use core_graphics::window::{
    CGWindowID, CGWindowListOption, copy_window_info, kCGNullWindowID, kCGWindowBounds,
    kCGWindowIsOnscreen, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionIncludingWindow, kCGWindowListOptionOnScreenOnly, kCGWindowName,
    kCGWindowNumber, kCGWindowOwnerName, kCGWindowOwnerPID,
};

use wt_platform::{Rect, WindowHandle};

/// Root of the synthetic two-level tree. Above every CGWindowID so it never collides.
pub(crate) const DESKTOP: WindowHandle = WindowHandle::from_raw(1 << 32);

#[inline]
pub(crate) fn handle(id: CGWindowID) -> WindowHandle {
    WindowHandle::from_raw(u64::from(id))
}

#[inline]
pub(crate) fn window_id(handle: WindowHandle) -> Option<CGWindowID> {
    if handle.is_null() {
        return None;
    }
    CGWindowID::try_from(handle.raw()).ok()
}

pub(crate) fn rect(r: &CGRect) -> Rect {
    Rect::new(
        r.origin.x.round() as i32,
        r.origin.y.round() as i32,
        r.size.width.round() as i32,
        r.size.height.round() as i32,
    )
}

pub(crate) fn screen() -> Rect {
    rect(&CGDisplay::main().bounds())
}

/// One entry of the window server's window list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WindowInfo {
    pub id: CGWindowID,
    pub pid: u32,
    pub layer: i64,
    pub on_screen: bool,
    pub bounds: Rect,
    pub title: String,
    pub owner: String,
}

struct Entry(CFDictionary<CFString, CFType>);

impl Entry {
    fn get(&self, key: CFStringRef) -> Option<CFType> {
        let key = unsafe { CFString::wrap_under_get_rule(key) };
        self.0.find(&key).map(|value| (*value).clone())
    }

    fn number(&self, key: CFStringRef) -> Option<i64> {
        self.get(key)?.downcast::<CFNumber>()?.to_i64()
    }

    fn string(&self, key: CFStringRef) -> String {
        self.get(key)
            .and_then(|value| value.downcast::<CFString>())
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn flag(&self, key: CFStringRef) -> bool {
        self.get(key)
            .and_then(|value| value.downcast::<CFBoolean>())
            .is_some_and(bool::from)
    }

    fn bounds(&self, key: CFStringRef) -> Option<Rect> {
        let dict = self.get(key)?.downcast::<CFDictionary>()?;
        CGRect::from_dict_representation(&dict).map(|r| rect(&r))
    }

    fn parse(&self) -> Option<WindowInfo> {
        unsafe {
            Some(WindowInfo {
                id: CGWindowID::try_from(self.number(kCGWindowNumber)?).ok()?,
                pid: u32::try_from(self.number(kCGWindowOwnerPID).unwrap_or(0)).unwrap_or(0),
                layer: self.number(kCGWindowLayer).unwrap_or(0),
                on_screen: self.flag(kCGWindowIsOnscreen),
                bounds: self.bounds(kCGWindowBounds).unwrap_or(Rect::ZERO),
                title: self.string(kCGWindowName),
                owner: self.string(kCGWindowOwnerName),
            })
        }
    }
}

fn list(option: CGWindowListOption, relative_to: CGWindowID) -> Vec<WindowInfo> {
    let Some(array) = copy_window_info(option, relative_to) else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(|item| {
            let dict = unsafe {
                CFDictionary::<CFString, CFType>::wrap_under_get_rule(*item as CFDictionaryRef)
            };
            Entry(dict).parse()
        })
        .collect()
}

/// On-screen windows, front to back.
pub(crate) fn on_screen() -> Vec<WindowInfo> {
    list(
        kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
        kCGNullWindowID,
    )
}

pub(crate) fn window(id: CGWindowID) -> Option<WindowInfo> {
    list(kCGWindowListOptionIncludingWindow, id)
        .into_iter()
        .find(|info| info.id == id)
}
