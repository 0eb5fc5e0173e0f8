use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::model::background::CancelToken;
use crate::model::config::ModelConfig;
use crate::model::error::ModelError;
use crate::retention::format::{Column, ElementColumn, TraceColumn, element_row, interaction_row};
use crate::state::state_model::State;
use crate::trace::trace::{ExplorationTrace, Interaction};

// ============================================================================
// File contents
// ============================================================================

/// Header plus one row per element, in id order.
pub fn state_contents(state: &State, sep: char) -> String {
    let mut out = ElementColumn::header_row(sep);
    out.push('\n');
    for e in state.elements() {
        out.push_str(&element_row(e, sep));
        out.push('\n');
    }
    out
}

pub fn trace_contents(interactions: &[Arc<Interaction>], sep: char) -> String {
    let mut out = TraceColumn::header_row(sep);
    out.push('\n');
    for i in interactions {
        out.push_str(&interaction_row(i, sep));
        out.push('\n');
    }
    out
}

// ============================================================================
// Dumps
// ============================================================================

pub fn dump_state(
    config: &ModelConfig,
    state: &State,
    token: &CancelToken,
) -> Result<PathBuf, ModelError> {
    let path = config.state_file(&state.id(), state.is_home_screen);
    write_atomic(&path, state_contents(state, config.separator).as_bytes(), token)?;
    debug!("dumped {} to {}", state, path.display());
    Ok(path)
}

/// Dump the trace unless a newer dump of it already landed.
pub fn dump_trace(
    config: &ModelConfig,
    trace: &ExplorationTrace,
    token: &CancelToken,
) -> Result<PathBuf, ModelError> {
    let path = config.trace_file(&trace.id().to_string());
    let written = trace.dump_with(|interactions| {
        write_atomic(
            &path,
            trace_contents(interactions, config.separator).as_bytes(),
            token,
        )
    })?;
    if written {
        debug!("dumped {} to {}", trace, path.display());
    }
    Ok(path)
}

/// `images/<trace>_<index>.jpg`
pub fn screenshot_file(config: &ModelConfig, trace_id: Uuid, action_index: usize) -> PathBuf {
    config
        .images_dir()
        .join(format!("{}_{}.jpg", trace_id, action_index))
}

pub fn dump_screenshot(
    config: &ModelConfig,
    trace_id: Uuid,
    action_index: usize,
    bytes: &[u8],
    token: &CancelToken,
) -> Result<PathBuf, ModelError> {
    let path = screenshot_file(config, trace_id, action_index);
    write_atomic(&path, bytes, token)?;
    Ok(path)
}

/// Write through a temporary file in the target directory and rename it into
/// place. A cancelled or failed write leaves any previous file untouched.
pub fn write_atomic(path: &Path, bytes: &[u8], token: &CancelToken) -> Result<(), ModelError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| ModelError::io(dir, e))?;
    token.check()?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ModelError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ModelError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| ModelError::io(tmp.path(), e))?;

    // Dropping the temporary file removes it.
    token.check()?;
    tmp.persist(path)
        .map_err(|e| ModelError::io(path, e.error))?;
    Ok(())
}
