use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{AcceleratedCapture, CaptureSource};
use crate::events::EventBackend;
use crate::window::{ShapeQuery, WindowSystem};

/// Options a native backend is opened with.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Accelerated capture library to load, if any.
    pub accelerated_library: Option<PathBuf>,
    /// Period of polling event pumps.
    pub poll_interval: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            accelerated_library: None,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Everything one platform provides, as shared trait objects.
///
/// `windows` and `system` usually point at the same object.
#[derive(Clone)]
pub struct PlatformBackend {
    pub name: &'static str,
    pub windows: Arc<dyn ShapeQuery>,
    pub system: Arc<dyn WindowSystem>,
    pub capture: Arc<dyn CaptureSource>,
    pub accelerated: Option<Arc<dyn AcceleratedCapture>>,
    pub events: Arc<dyn EventBackend>,
}
