use wt_platform::Rect;

/// Parent corner a pinned window is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Edge {
    fn from_left(self) -> bool {
        matches!(self, Edge::TopLeft | Edge::BottomLeft)
    }

    fn from_top(self) -> bool {
        matches!(self, Edge::TopLeft | Edge::TopRight)
    }
}

/// Offsets of a pinned window from the parent corner it is closest to.
///
/// `horizontal` is the distance between the chosen vertical edges (left to left, or right to
/// right), `vertical` likewise for the horizontal edges. Offsets are negative when the pinned
/// window sticks out past that edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinAnchor {
    pub edge: Edge,
    pub horizontal: i32,
    pub vertical: i32,
}

impl PinAnchor {
    pub fn compute(parent: Rect, pinned: Rect) -> Self {
        let left = pinned.x - parent.x;
        let right = parent.right() - pinned.right();
        let top = pinned.y - parent.y;
        let bottom = parent.bottom() - pinned.bottom();

        let edge = match (left < right, top < bottom) {
            (true, true) => Edge::TopLeft,
            (false, true) => Edge::TopRight,
            (true, false) => Edge::BottomLeft,
            (false, false) => Edge::BottomRight,
        };
        Self {
            edge,
            horizontal: left.min(right),
            vertical: top.min(bottom),
        }
    }

    /// Position of a `width` x `height` window anchored to `parent`.
    ///
    /// The result is kept inside the union of `work_area` and the parent's bounds, so a parent
    /// dragged against a screen edge pushes the pinned window along instead of off screen.
    pub fn place(&self, parent: Rect, width: i32, height: i32, work_area: Rect) -> Rect {
        let mut x = if self.edge.from_left() {
            parent.x + self.horizontal
        } else {
            parent.right() - self.horizontal - width
        };
        let mut y = if self.edge.from_top() {
            parent.y + self.vertical
        } else {
            parent.bottom() - self.vertical - height
        };

        let min_left = work_area.x.min(parent.x);
        let max_right = work_area.right().max(parent.right());
        let min_top = work_area.y.min(parent.y);
        let max_bottom = work_area.bottom().max(parent.bottom());
        x = x.max(min_left).min(max_right - width);
        y = y.max(min_top).min(max_bottom - height);

        Rect::new(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1040,
    };

    #[test]
    fn nearest_corner_is_chosen() {
        let parent = Rect::new(100, 100, 800, 600);
        let cases = [
            (Rect::new(110, 120, 50, 50), Edge::TopLeft, 10, 20),
            (Rect::new(800, 130, 50, 50), Edge::TopRight, 50, 30),
            (Rect::new(140, 600, 50, 50), Edge::BottomLeft, 40, 50),
            (Rect::new(820, 640, 50, 50), Edge::BottomRight, 30, 10),
        ];
        for (pinned, edge, horizontal, vertical) in cases {
            let anchor = PinAnchor::compute(parent, pinned);
            assert_eq!(anchor.edge, edge, "{pinned:?}");
            assert_eq!((anchor.horizontal, anchor.vertical), (horizontal, vertical));
        }
    }

    #[test]
    fn placing_at_the_original_parent_is_identity() {
        let parent = Rect::new(100, 100, 800, 600);
        for pinned in [
            Rect::new(110, 120, 50, 50),
            Rect::new(800, 130, 50, 50),
            Rect::new(140, 600, 50, 50),
            Rect::new(820, 640, 50, 50),
            Rect::new(880, 90, 60, 40),
        ] {
            let anchor = PinAnchor::compute(parent, pinned);
            assert_eq!(anchor.place(parent, pinned.width, pinned.height, SCREEN), pinned);
        }
    }

    #[test]
    fn offsets_follow_the_parent() {
        let anchor = PinAnchor::compute(Rect::new(100, 100, 800, 600), Rect::new(700, 120, 150, 100));
        assert_eq!(anchor.edge, Edge::TopRight);
        let placed = anchor.place(Rect::new(300, 200, 800, 600), 150, 100, SCREEN);
        assert_eq!(placed, Rect::new(900, 220, 150, 100));
    }

    #[test]
    fn outside_windows_keep_negative_offsets() {
        // pinned to the right of the parent, sticking out by 150px
        let anchor = PinAnchor::compute(Rect::new(100, 100, 400, 300), Rect::new(450, 100, 200, 100));
        assert_eq!(anchor.edge, Edge::TopRight);
        assert_eq!(anchor.horizontal, -150);
        let placed = anchor.place(Rect::new(200, 100, 400, 300), 200, 100, SCREEN);
        assert_eq!(placed, Rect::new(550, 100, 200, 100));
    }

    #[test]
    fn placement_is_clamped_to_work_area_and_parent() {
        let anchor = PinAnchor::compute(Rect::new(100, 100, 400, 300), Rect::new(450, 100, 200, 100));
        // parent partly off the right edge of the screen
        let placed = anchor.place(Rect::new(1600, 100, 400, 300), 200, 100, SCREEN);
        assert_eq!(placed, Rect::new(1800, 100, 200, 100));

        let above = PinAnchor::compute(Rect::new(100, 100, 400, 300), Rect::new(100, 50, 100, 100));
        let placed = above.place(Rect::new(100, 0, 400, 300), 100, 100, SCREEN);
        assert_eq!(placed.y, 0);
    }
}
