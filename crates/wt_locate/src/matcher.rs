use wt_platform::WindowHandle;

/// What a matcher gets to look at for each visited window.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub class_name: String,
    /// Distance from the root of the walk; the root is depth 0.
    pub depth: usize,
}

/// Decides whether a window belongs to the monitored application.
pub trait WindowMatcher: Send + Sync {
    fn matches(&self, window: &WindowInfo) -> bool;
}

impl<F> WindowMatcher for F
where
    F: Fn(&WindowInfo) -> bool + Send + Sync,
{
    fn matches(&self, window: &WindowInfo) -> bool {
        self(window)
    }
}

/// Matches windows whose class name is one of a known set.
#[derive(Debug, Clone, Default)]
pub struct ClassMatcher {
    classes: Vec<String>,
}

impl ClassMatcher {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl WindowMatcher for ClassMatcher {
    fn matches(&self, window: &WindowInfo) -> bool {
        self.classes.iter().any(|c| *c == window.class_name)
    }
}
