use std::path::PathBuf;

use thiserror::Error;

use crate::state::identity::ConcreteId;

/// Everything that can go wrong while building, persisting or re-loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A UI snapshot that cannot be turned into an element tree (e.g. no roots)
    #[error("malformed UI snapshot: {0}")]
    MalformedSnapshot(String),

    /// Not every element record was reachable from a root
    #[error("incomplete element tree: built {built} of {expected} elements (unreached hashes {missing:?})")]
    IncompleteTree {
        expected: usize,
        built: usize,
        missing: Vec<i32>,
    },

    /// A trace references a state for which no file exists
    #[error("no state file for {id} in {}", dir.display())]
    MissingStateFile { id: ConcreteId, dir: PathBuf },

    /// The element tree of a persisted state could not be rebuilt
    #[error("{}: {source}", file.display())]
    CorruptStateFile {
        file: PathBuf,
        source: Box<ModelError>,
    },

    /// A persisted row could not be decoded
    #[error("{}:{line}: {reason}", file.display())]
    MalformedRow {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// Recomputed state id differs from the persisted one (strict mode)
    #[error("{}: state id mismatch, expected {expected} but computed {computed}", file.display())]
    StateIdMismatch {
        file: PathBuf,
        expected: ConcreteId,
        computed: ConcreteId,
    },

    /// Recomputed element id differs from the persisted one (strict mode)
    #[error("{}: element id mismatch, expected {expected} but computed {computed}", file.display())]
    ElementIdMismatch {
        file: PathBuf,
        expected: ConcreteId,
        computed: ConcreteId,
    },

    /// Strict loading: the recorded target is not part of the recomputed source state
    #[error("{}: action {action_index} targets {target} which is not part of source state {state}", file.display())]
    TargetNotFound {
        file: PathBuf,
        action_index: usize,
        target: ConcreteId,
        state: ConcreteId,
    },

    /// Compatibility loading: no element of the source state can stand in for the target
    #[error("{}: action {action_index} target {target} cannot be repaired in state {state} (no candidates)", file.display())]
    UnresolvableTarget {
        file: PathBuf,
        action_index: usize,
        target: ConcreteId,
        state: ConcreteId,
    },

    /// Live update: the executed action names an element the source state does not contain
    #[error("action target {target} is not part of source state {state}")]
    UnknownTarget { target: ConcreteId, state: ConcreteId },

    /// A state failed to load in another worker
    #[error("state {id} is unavailable: {reason}")]
    StateUnavailable { id: ConcreteId, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error ({context}): {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },

    /// The owning worker of a registry is gone
    #[error("{0} registry is no longer running")]
    RegistryClosed(&'static str),

    /// Background work observed campaign cancellation
    #[error("cancelled")]
    Cancelled,
}

impl ModelError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn row(file: impl Into<PathBuf>, line: usize, reason: impl ToString) -> Self {
        ModelError::MalformedRow {
            file: file.into(),
            line,
            reason: reason.to_string(),
        }
    }
}
