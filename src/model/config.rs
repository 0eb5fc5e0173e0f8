use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::state::identity::ConcreteId;

// ============================================================================
// Model configuration
// ============================================================================

/// Where and how a campaign's model is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding one sub-directory per explored app
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    pub app_name: String,

    /// Column separator of persisted files
    #[serde(default = "default_separator")]
    pub separator: char,

    #[serde(default = "default_state_extension")]
    pub state_file_extension: String,

    #[serde(default = "default_trace_prefix")]
    pub trace_file_prefix: String,

    /// Dump the new state and its trace after every model update
    #[serde(default = "default_true")]
    pub dump_on_each_action: bool,

    #[serde(default)]
    pub dump_screenshots: bool,

    #[serde(default = "default_true")]
    pub write_device_logs: bool,

    /// Size of the campaign's background worker pool
    #[serde(default = "default_workers")]
    pub background_workers: usize,
}

impl ModelConfig {
    pub fn new(base_dir: impl Into<PathBuf>, app_name: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            app_name: app_name.to_string(),
            separator: default_separator(),
            state_file_extension: default_state_extension(),
            trace_file_prefix: default_trace_prefix(),
            dump_on_each_action: true,
            dump_screenshots: false,
            write_device_logs: true,
            background_workers: default_workers(),
        }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.base_dir.join(&self.app_name)
    }

    pub fn states_dir(&self) -> PathBuf {
        self.model_dir().join("states")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.model_dir().join("images")
    }

    pub fn device_log_file(&self) -> PathBuf {
        self.model_dir().join("device_logs.jsonl")
    }

    /// `states/<uid>_<configId>[_HS].csv`
    pub fn state_file(&self, id: &ConcreteId, is_home_screen: bool) -> PathBuf {
        let marker = if is_home_screen { HOME_SCREEN_MARKER } else { "" };
        self.states_dir()
            .join(format!("{}{}{}", id, marker, self.state_file_extension))
    }

    pub fn trace_file(&self, trace_id: &str) -> PathBuf {
        self.model_dir().join(format!(
            "{}{}{}",
            self.trace_file_prefix, trace_id, self.state_file_extension
        ))
    }

    pub fn is_trace_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| {
                n.starts_with(&self.trace_file_prefix) && n.ends_with(&self.state_file_extension)
            })
    }

    /// Inverse of [`ModelConfig::trace_file`].
    pub fn trace_id_of(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let id = name
            .strip_prefix(&self.trace_file_prefix)?
            .strip_suffix(&self.state_file_extension)?;
        Some(id.to_string())
    }

    /// Inverse of [`ModelConfig::state_file`]: the persisted id and home-screen marker.
    pub fn parse_state_file_name(&self, path: &Path) -> Option<(ConcreteId, bool)> {
        let stem = path
            .file_name()?
            .to_str()?
            .strip_suffix(&self.state_file_extension)?;
        let (id, is_home_screen) = match stem.strip_suffix(HOME_SCREEN_MARKER) {
            Some(id) => (id, true),
            None => (stem, false),
        };
        Some((id.parse().ok()?, is_home_screen))
    }
}

pub const HOME_SCREEN_MARKER: &str = "_HS";

// ============================================================================
// Loader configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    /// Persisted ids are ground truth; any mismatch fails the load
    Strict,
    /// Mismatching ids are remapped to the recomputed ones
    AutoFix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_mode")]
    pub mode: LoadMode,

    #[serde(default = "default_compatibility")]
    pub compatibility: Compatibility,

    /// Trace workers used in parallel mode
    #[serde(default = "default_loader_workers")]
    pub workers: usize,

    #[serde(default = "default_loader_workers")]
    pub queue_capacity: usize,

    /// Old persisted header name -> current header name
    #[serde(default)]
    pub header_renames: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub enable_checks: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            compatibility: default_compatibility(),
            workers: default_loader_workers(),
            queue_capacity: default_loader_workers(),
            header_renames: HashMap::new(),
            enable_checks: true,
        }
    }
}

impl LoaderConfig {
    pub fn sequential() -> Self {
        Self {
            mode: LoadMode::Sequential,
            ..Self::default()
        }
    }

    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn with_header_renames(mut self, renames: HashMap<String, String>) -> Self {
        self.header_renames = renames;
        self
    }

    pub fn worker_count(&self) -> usize {
        match self.mode {
            LoadMode::Sequential => 1,
            LoadMode::Parallel => self.workers.max(1),
        }
    }

    pub fn is_autofix(&self) -> bool {
        self.compatibility == Compatibility::AutoFix
    }
}

// Serde default helpers
fn default_base_dir() -> PathBuf { PathBuf::from("out/model") }
fn default_separator() -> char { ';' }
fn default_state_extension() -> String { ".csv".to_string() }
fn default_trace_prefix() -> String { "trace".to_string() }
fn default_true() -> bool { true }
fn default_workers() -> usize { 4 }
fn default_loader_workers() -> usize { 5 }
fn default_mode() -> LoadMode { LoadMode::Parallel }
fn default_compatibility() -> Compatibility { Compatibility::Strict }
