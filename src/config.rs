//! Host configuration: a JSON file with defaults for every field, and a manager that caches it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use wt_platform::{BackendOptions, CaptureMode};

pub fn default_capture_mode() -> String {
    CaptureMode::Window.as_str().to_string()
}

pub fn default_target_classes() -> Vec<String> {
    vec!["RuneScape".to_string()]
}

pub fn default_poll_interval_ms() -> u64 {
    100
}

pub fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Mode used by [`crate::WindowHost::capture_default`].
    #[serde(default = "default_capture_mode")]
    pub capture_mode: String,

    /// Class names the show-event matcher accepts.
    #[serde(default = "default_target_classes")]
    pub target_classes: Vec<String>,

    /// Accelerated capture library (Win32 DLL).
    #[serde(default)]
    pub accelerated_backend: Option<PathBuf>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            capture_mode: default_capture_mode(),
            target_classes: default_target_classes(),
            accelerated_backend: None,
            poll_interval_ms: default_poll_interval_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Like [`HostConfig::load`], but a missing or broken file yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("{err:#}, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    pub fn capture_mode(&self) -> wt_platform::Result<CaptureMode> {
        self.capture_mode.parse()
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            accelerated_library: self.accelerated_backend.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

pub type ConfigWatcher = Box<dyn Fn(&HostConfig) + Send + Sync>;

/// Keeps the active configuration in memory and reloads it on request.
pub struct ConfigManager {
    path: Option<PathBuf>,
    config: Arc<RwLock<HostConfig>>,
    watchers: Vec<ConfigWatcher>,
}

impl ConfigManager {
    /// Loads `path` once, falling back to defaults.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = HostConfig::load_or_default(&path);
        Self {
            path: Some(path),
            config: Arc::new(RwLock::new(config)),
            watchers: Vec::new(),
        }
    }

    /// In-memory only; `reload` keeps the current values.
    pub fn with_config(config: HostConfig) -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(config)),
            watchers: Vec::new(),
        }
    }

    pub fn get(&self) -> HostConfig {
        self.config.read().clone()
    }

    pub fn get_shared(&self) -> Arc<RwLock<HostConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn watch<F>(&mut self, callback: F)
    where
        F: Fn(&HostConfig) + Send + Sync + 'static,
    {
        self.watchers.push(Box::new(callback));
    }

    /// Re-reads the file. On error the cached configuration stays in effect.
    pub fn reload(&mut self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh = HostConfig::load(path)?;
        *self.config.write() = fresh.clone();
        for watcher in &self.watchers {
            watcher(&fresh);
        }
        Ok(())
    }

    /// Applies `updater`, persists the result when file-backed and notifies watchers.
    pub fn update(&mut self, updater: impl FnOnce(&mut HostConfig)) -> anyhow::Result<()> {
        let updated = {
            let mut guard = self.config.write();
            updater(&mut guard);
            guard.clone()
        };
        if let Some(path) = &self.path {
            updated.save(path)?;
        }
        for watcher in &self.watchers {
            watcher(&updated);
        }
        Ok(())
    }

    #[inline]
    pub fn target_classes(&self) -> Vec<String> {
        self.config.read().target_classes.clone()
    }

    #[inline]
    pub fn log_filter(&self) -> String {
        self.config.read().log_filter.clone()
    }
}
