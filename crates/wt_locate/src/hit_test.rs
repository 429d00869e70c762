use wt_platform::{Point, ShapeQuery, WindowHandle};

/// Resolves the window under a screen point by descending the window tree.
///
/// Children are tried topmost first. Unmapped windows are skipped, and a window with an input
/// shape is only hit inside the union of its shape rectangles.
pub struct HitTester<'a, T: ?Sized> {
    tree: &'a T,
}

impl<'a, T> HitTester<'a, T>
where
    T: ShapeQuery + ?Sized,
{
    pub fn new(tree: &'a T) -> Self {
        Self { tree }
    }

    /// Deepest window containing `point`, or the root when no child does.
    pub fn hit_test(&self, point: Point) -> WindowHandle {
        let root = self.tree.root();
        self.descend(root, point, Point::new(0, 0)).unwrap_or(root)
    }

    fn descend(&self, parent: WindowHandle, point: Point, offset: Point) -> Option<WindowHandle> {
        for child in self.tree.children(parent).into_iter().rev() {
            let Some(placement) = self.tree.placement(child) else {
                continue;
            };
            if !placement.mapped {
                continue;
            }
            let abs = placement.rect.translate(offset.x, offset.y);
            let hit = match self.tree.input_shape(child) {
                Some(rects) => rects
                    .iter()
                    .any(|r| r.translate(abs.x, abs.y).contains(point.x, point.y)),
                None => abs.contains(point.x, point.y),
            };
            if hit {
                let deeper = self.descend(child, point, abs.origin());
                return Some(deeper.unwrap_or(child));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_platform::Rect;
    use wt_platform::testing::{FakeDesktop, WindowSpec};

    #[test]
    fn topmost_sibling_wins() {
        let desk = FakeDesktop::new(1000, 1000);
        let _below = desk.add_top_level(WindowSpec::new("A").rect(0, 0, 500, 500));
        let above = desk.add_top_level(WindowSpec::new("B").rect(100, 100, 500, 500));
        let tester = HitTester::new(&desk);
        assert_eq!(tester.hit_test(Point::new(200, 200)), above);
    }

    #[test]
    fn descends_with_accumulated_offsets() {
        let desk = FakeDesktop::new(1000, 1000);
        let frame = desk.add_top_level(WindowSpec::new("Frame").rect(100, 100, 400, 400));
        let client = desk.add(frame, WindowSpec::new("Client").rect(10, 30, 380, 360));
        let button = desk.add(client, WindowSpec::new("Button").rect(20, 20, 50, 20));
        let tester = HitTester::new(&desk);
        assert_eq!(tester.hit_test(Point::new(131, 151)), button);
        assert_eq!(tester.hit_test(Point::new(105, 105)), frame);
        assert_eq!(tester.hit_test(Point::new(300, 300)), client);
        assert_eq!(tester.hit_test(Point::new(900, 900)), FakeDesktop::ROOT);
    }

    #[test]
    fn unmapped_windows_are_transparent() {
        let desk = FakeDesktop::new(1000, 1000);
        let visible = desk.add_top_level(WindowSpec::new("A").rect(0, 0, 300, 300));
        desk.add_top_level(WindowSpec::new("B").rect(0, 0, 300, 300).hidden());
        assert_eq!(HitTester::new(&desk).hit_test(Point::new(10, 10)), visible);
    }

    #[test]
    fn input_shape_limits_the_hit_area() {
        let desk = FakeDesktop::new(1000, 1000);
        let under = desk.add_top_level(WindowSpec::new("Game").rect(0, 0, 800, 600));
        // overlay that only accepts input in two small strips
        let overlay = desk.add_top_level(
            WindowSpec::new("Overlay")
                .rect(100, 100, 400, 400)
                .input_shape(vec![Rect::new(0, 0, 400, 20), Rect::new(0, 380, 400, 20)]),
        );
        let tester = HitTester::new(&desk);
        assert_eq!(tester.hit_test(Point::new(150, 110)), overlay);
        assert_eq!(tester.hit_test(Point::new(150, 490)), overlay);
        assert_eq!(tester.hit_test(Point::new(150, 300)), under);
    }

    #[test]
    fn empty_input_shape_passes_clicks_through() {
        let desk = FakeDesktop::new(1000, 1000);
        let under = desk.add_top_level(WindowSpec::new("Game").rect(0, 0, 800, 600));
        desk.add_top_level(WindowSpec::new("Overlay").rect(0, 0, 800, 600).input_shape(vec![]));
        assert_eq!(HitTester::new(&desk).hit_test(Point::new(20, 20)), under);
    }
}
