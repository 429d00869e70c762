use std::fmt;

/// Opaque OS window identifier.
///
/// The value is the platform's raw handle widened to 64 bits (`HWND` on Win32, the XID on X11,
/// the `CGWindowID` on macOS). It carries no ownership: the window it names may be destroyed at
/// any time, and the handle stays a comparable value afterwards. Validity has to be asked of the
/// backend on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowHandle(u64);

impl WindowHandle {
    /// The desktop, or "no window" depending on context.
    pub const NULL: WindowHandle = WindowHandle(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for WindowHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
