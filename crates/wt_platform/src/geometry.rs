use crate::error::{PlatformError, Result};

/// Largest accepted width or height of a capture rectangle.
pub const MAX_CAPTURE_DIMENSION: i32 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle, origin plus size.
///
/// Whether the origin is in screen or client space depends on where the rectangle came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0, 0, 0, 0);

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Edges further apart than `i32::MAX` give a saturated size.
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub const fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Moved rectangle, `None` when either far edge would leave `i32`.
    pub fn checked_translate(&self, dx: i32, dy: i32) -> Option<Rect> {
        let moved = Rect::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.width,
            self.height,
        );
        moved.far_edges_fit().then_some(moved)
    }

    fn far_edges_fit(&self) -> bool {
        self.x.checked_add(self.width).is_some() && self.y.checked_add(self.height).is_some()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > left && bottom > top).then(|| Rect::from_edges(left, top, right, bottom))
    }

    /// Bounding box of a set of rectangles, `None` when the set is empty.
    pub fn bounding<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(a) => Some(a.union(r)),
        })
    }

    /// Rejects rectangles that cannot be captured: non-positive or larger than
    /// [`MAX_CAPTURE_DIMENSION`] in either direction, or with a right or bottom edge past
    /// `i32::MAX`.
    pub fn validate_capture(&self) -> Result<()> {
        let ok = |v: i32| v > 0 && v <= MAX_CAPTURE_DIMENSION;
        if ok(self.width) && ok(self.height) && self.far_edges_fit() {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    pub fn invalid(&self) -> PlatformError {
        PlatformError::InvalidRectangle {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// RGBA8 byte size of a buffer covering this rectangle.
    #[inline]
    pub fn rgba_len(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize * 4
    }
}
