use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exploration_model::model::config::ModelConfig;
use exploration_model::model::model::Model;
use exploration_model::screen::screen_model::Action;
use exploration_model::trace::trace::ExplorationTrace;
use tempfile::TempDir;

use crate::common::fixtures::{element_with_text, home_screen, launch, login_screen, result};

pub const APP: &str = "com.example.app";

pub fn temp_config(dir: &TempDir) -> ModelConfig {
    ModelConfig {
        background_workers: 2,
        ..ModelConfig::new(dir.path(), APP)
    }
}

/// Launch, log in, tick "Remember me", log out.
pub fn record_login_session(model: &Model) -> Arc<ExplorationTrace> {
    let trace = model.init_new_trace();

    let login = model.update_model(&launch(login_screen()), &trace).unwrap();
    let login_button = element_with_text(&login, "Login").id();
    let home = model
        .update_model(&result(Action::click(login_button), home_screen()), &trace)
        .unwrap();

    let remember = element_with_text(&home, "Remember me").id();
    let home = model
        .update_model(&result(Action::tick(remember), home_screen()), &trace)
        .unwrap();

    let logout = element_with_text(&home, "Logout").id();
    model
        .update_model(&result(Action::click(logout), login_screen()), &trace)
        .unwrap();

    trace
}

/// Record one session, dump everything and shut the model down.
pub fn persisted_session(dir: &TempDir) -> ModelConfig {
    let config = temp_config(dir);
    let model = Model::new(config.clone()).unwrap();
    record_login_session(&model);
    model.dump_model().unwrap();
    model.finish();
    config
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

pub fn trace_files(config: &ModelConfig) -> Vec<PathBuf> {
    files_in(&config.model_dir())
        .into_iter()
        .filter(|p| config.is_trace_file(p))
        .collect()
}

/// Replace every occurrence of `from` in the file's contents.
pub fn rewrite_file(path: &Path, from: &str, to: &str) {
    let content = fs::read_to_string(path).unwrap();
    assert!(content.contains(from), "{} does not contain '{}'", path.display(), from);
    fs::write(path, content.replace(from, to)).unwrap();
}
