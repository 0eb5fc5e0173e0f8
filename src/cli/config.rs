use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::model::config::{Compatibility, LoadMode, LoaderConfig, ModelConfig};

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "exploration-model",
    version,
    about = "Record, persist and reload app exploration models"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: exploration-model.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a model from a JSONL file of executed actions and dump it
    Record {
        /// JSONL file, one action result per line
        #[arg(long)]
        input: String,

        /// App name (model sub-directory)
        #[arg(long)]
        app: String,

        /// Base directory of persisted models
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Also write screenshots
        #[arg(long)]
        screenshots: bool,
    },

    /// Load a persisted model and print a summary
    Load {
        #[arg(long)]
        app: String,

        /// Base directory of persisted models
        #[arg(short, long)]
        dir: Option<String>,

        /// Load with a single worker
        #[arg(long)]
        sequential: bool,

        /// Remap ids that no longer match instead of failing
        #[arg(long)]
        autofix: bool,

        /// Trace workers in parallel mode
        #[arg(long)]
        workers: Option<usize>,

        /// Renamed header, as OLD=NEW (repeatable)
        #[arg(long = "rename")]
        renames: Vec<String>,
    },

    /// Load a model sequentially and in parallel and compare the results
    Verify {
        #[arg(long)]
        app: String,

        #[arg(short, long)]
        dir: Option<String>,

        #[arg(long)]
        autofix: bool,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `exploration-model.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    #[serde(default = "default_separator")]
    pub separator: char,

    #[serde(default)]
    pub dump_screenshots: bool,

    #[serde(default = "default_true")]
    pub write_device_logs: bool,

    #[serde(default = "default_workers")]
    pub background_workers: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            separator: default_separator(),
            dump_screenshots: false,
            write_device_logs: true,
            background_workers: default_workers(),
        }
    }
}

// Serde default helpers
fn default_base_dir() -> String { "out/model".to_string() }
fn default_separator() -> char { ';' }
fn default_true() -> bool { true }
fn default_workers() -> usize { 4 }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or("exploration-model.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Config Builders (merge CLI args with config file)
// ============================================================================

/// ModelConfig for `app`; an explicit directory wins over the config file.
pub fn build_model_config(section: &ModelSection, app: &str, dir: Option<&str>) -> ModelConfig {
    let base_dir = PathBuf::from(dir.unwrap_or(&section.base_dir));
    ModelConfig {
        separator: section.separator,
        dump_screenshots: section.dump_screenshots,
        write_device_logs: section.write_device_logs,
        background_workers: section.background_workers,
        ..ModelConfig::new(base_dir, app)
    }
}

/// Apply loader flags on top of the file's loader section.
pub fn build_loader_config(
    base: &LoaderConfig,
    sequential: bool,
    autofix: bool,
    workers: Option<usize>,
    renames: &[String],
) -> Result<LoaderConfig, String> {
    let mut config = base.clone();
    if sequential {
        config.mode = LoadMode::Sequential;
    }
    if autofix {
        config.compatibility = Compatibility::AutoFix;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.header_renames.extend(parse_renames(renames)?);
    Ok(config)
}

/// `OLD=NEW` pairs into an old -> new header map.
pub fn parse_renames(renames: &[String]) -> Result<HashMap<String, String>, String> {
    renames
        .iter()
        .map(|r| {
            r.split_once('=')
                .map(|(old, new)| (old.trim().to_string(), new.trim().to_string()))
                .filter(|(old, new)| !old.is_empty() && !new.is_empty())
                .ok_or_else(|| format!("invalid header rename '{}', expected OLD=NEW", r))
        })
        .collect()
}
