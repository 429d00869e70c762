use wt_platform::{WindowHandle, WindowTree};

use crate::matcher::{WindowInfo, WindowMatcher};

/// Running result of a deepest-match search.
///
/// A match deeper than the current maximum replaces the whole set, one at the same depth joins
/// it, and shallower matches are dropped for good.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeepestMatch {
    depth: Option<usize>,
    windows: Vec<WindowHandle>,
}

impl DeepestMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, window: WindowHandle, depth: usize) {
        match self.depth {
            Some(max) if depth < max => {}
            Some(max) if depth == max => self.windows.push(window),
            _ => {
                self.depth = Some(depth);
                self.windows.clear();
                self.windows.push(window);
            }
        }
    }

    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    pub fn windows(&self) -> &[WindowHandle] {
        &self.windows
    }

    pub fn contains(&self, window: WindowHandle) -> bool {
        self.windows.contains(&window)
    }

    pub fn into_windows(self) -> Vec<WindowHandle> {
        self.windows
    }
}

/// First unowned, visible window of `pid`, in enumeration order.
///
/// Where client windows are nested below window-manager frames the walk descends into
/// non-matching windows as well. Returns [`WindowHandle::NULL`] when nothing qualifies.
pub fn find_main_window<T>(tree: &T, pid: u32) -> WindowHandle
where
    T: WindowTree + ?Sized,
{
    fn visit<T: WindowTree + ?Sized>(
        tree: &T,
        parent: WindowHandle,
        pid: u32,
        nested: bool,
    ) -> Option<WindowHandle> {
        for window in tree.children(parent) {
            if tree.pid(window) == pid && tree.is_main_candidate(window) {
                return Some(window);
            }
            if nested {
                if let Some(found) = visit(tree, window, pid, nested) {
                    return Some(found);
                }
            }
        }
        None
    }

    if pid == 0 {
        return WindowHandle::NULL;
    }
    visit(tree, tree.root(), pid, tree.clients_nested()).unwrap_or(WindowHandle::NULL)
}

/// Walks the whole tree from the root and returns the deepest windows accepted by `matcher`.
pub fn find_deepest_matching<T>(tree: &T, matcher: &dyn WindowMatcher) -> DeepestMatch
where
    T: WindowTree + ?Sized,
{
    fn walk<T: WindowTree + ?Sized>(
        tree: &T,
        window: WindowHandle,
        depth: usize,
        matcher: &dyn WindowMatcher,
        table: &mut DeepestMatch,
    ) {
        let info = WindowInfo {
            handle: window,
            class_name: tree.class_name(window),
            depth,
        };
        if matcher.matches(&info) {
            table.offer(window, depth);
        }
        for child in tree.children(window) {
            walk(tree, child, depth + 1, matcher, table);
        }
    }

    let mut table = DeepestMatch::new();
    walk(tree, tree.root(), 0, matcher, &mut table);
    log::debug!(
        "deepest match: {} window(s) at depth {:?}",
        table.windows.len(),
        table.depth
    );
    table
}
