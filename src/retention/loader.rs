use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::channel;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::config::{LoadMode, LoaderConfig, ModelConfig};
use crate::model::error::ModelError;
use crate::model::model::Model;
use crate::retention::format::{
    ElementColumn, PersistedElement, Row, TraceColumn, column_indices, parse_element_row,
    parse_interaction_row, split_row,
};
use crate::screen::screen_model::{ActionKind, ElementProperties};
use crate::state::identity::ConcreteId;
use crate::state::state_builder::build_elements;
use crate::state::state_model::{Element, State};
use crate::trace::trace::{ExplorationTrace, Interaction};

// ============================================================================
// Results
// ============================================================================

/// Non-fatal findings of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// Several elements could stand in for a missing target; the first was taken
    AmbiguousTarget {
        trace: PathBuf,
        action_index: usize,
        target: ConcreteId,
        candidates: usize,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::AmbiguousTarget {
                trace,
                action_index,
                target,
                candidates,
            } => write!(
                f,
                "{}: action {} target {} resolved among {} candidates",
                trace.display(),
                action_index,
                target,
                candidates
            ),
        }
    }
}

#[derive(Debug)]
pub struct TraceFailure {
    pub file: PathBuf,
    pub error: ModelError,
}

pub struct LoadOutcome {
    pub model: Model,
    /// Traces that could not be loaded, ordered by file name
    pub failures: Vec<TraceFailure>,
    pub warnings: Vec<LoadWarning>,
    /// Persisted state id -> recomputed state id (compatibility mode)
    pub state_mapping: HashMap<ConcreteId, ConcreteId>,
    /// Persisted element id -> recomputed or repaired element id
    pub element_mapping: HashMap<ConcreteId, ConcreteId>,
}

impl LoadOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.warnings.is_empty()
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Load the model persisted under `config.model_dir()`. Fails with the error
/// of the first trace (by file name) that could not be loaded.
pub fn load_model(config: &ModelConfig, options: &LoaderConfig) -> Result<Model, ModelError> {
    let outcome = load_model_outcome(config, options)?;
    match outcome.failures.into_iter().next() {
        Some(failure) => {
            outcome.model.cancel();
            Err(failure.error)
        }
        None => Ok(outcome.model),
    }
}

/// Load as much of the persisted model as possible and report what failed.
///
/// Sequential mode stops at the first failing trace. Parallel mode loads
/// every trace it can. Only states reached by a loaded trace are registered.
pub fn load_model_outcome(
    config: &ModelConfig,
    options: &LoaderConfig,
) -> Result<LoadOutcome, ModelError> {
    let model_dir = config.model_dir();
    let trace_files = list_trace_files(config, &model_dir)?;
    info!(
        "loading {} traces from {} ({:?}, {:?}, {} workers)",
        trace_files.len(),
        model_dir.display(),
        options.mode,
        options.compatibility,
        options.worker_count()
    );

    let loader = Loader {
        config,
        options,
        state_files: index_state_files(config)?,
        states: DashMap::new(),
        state_mapping: DashMap::new(),
        element_mapping: DashMap::new(),
        warnings: Mutex::new(Vec::new()),
    };
    let (mut traces, mut failures) = loader.run(trace_files);
    traces.sort_by_key(|t| t.id());
    failures.sort_by(|a, b| a.file.cmp(&b.file));

    let model = Model::new(ModelConfig {
        write_device_logs: false,
        ..config.clone()
    })?;
    let reachable: HashSet<ConcreteId> = traces
        .iter()
        .flat_map(|t| t.interactions())
        .flat_map(|i| [i.prev_state, i.res_state])
        .collect();
    for state in loader.loaded_states(&reachable) {
        model.add_elements(state.elements().to_vec())?;
        model.add_state(state)?;
    }
    for trace in traces {
        model.add_trace(trace);
    }

    Ok(LoadOutcome {
        model,
        failures,
        warnings: loader.warnings.into_inner(),
        state_mapping: loader.state_mapping.into_iter().collect(),
        element_mapping: loader.element_mapping.into_iter().collect(),
    })
}

fn list_trace_files(config: &ModelConfig, dir: &Path) -> Result<Vec<PathBuf>, ModelError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| ModelError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && config.is_trace_file(p))
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

fn index_state_files(config: &ModelConfig) -> Result<HashMap<ConcreteId, (PathBuf, bool)>, ModelError> {
    let dir = config.states_dir();
    if !dir.is_dir() {
        return Ok(HashMap::new());
    }

    let mut index = HashMap::new();
    for entry in fs::read_dir(&dir).map_err(|e| ModelError::io(&dir, e))? {
        let path = entry.map_err(|e| ModelError::io(&dir, e))?.path();
        match config.parse_state_file_name(&path) {
            Some((id, is_home_screen)) => {
                index.insert(id, (path, is_home_screen));
            }
            None => warn!("ignoring unexpected file {}", path.display()),
        }
    }
    Ok(index)
}

/// `trace<uuid>.csv`; other names get a stable id derived from the name.
fn trace_id(config: &ModelConfig, path: &Path) -> Uuid {
    let name = config.trace_id_of(path).unwrap_or_default();
    Uuid::parse_str(&name).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
}

// ============================================================================
// Loader
// ============================================================================

type StateCell = Arc<OnceLock<Result<Arc<State>, String>>>;

struct Loader<'a> {
    config: &'a ModelConfig,
    options: &'a LoaderConfig,
    state_files: HashMap<ConcreteId, (PathBuf, bool)>,
    /// Keyed by the persisted state id
    states: DashMap<ConcreteId, StateCell>,
    state_mapping: DashMap<ConcreteId, ConcreteId>,
    element_mapping: DashMap<ConcreteId, ConcreteId>,
    warnings: Mutex<Vec<LoadWarning>>,
}

impl Loader<'_> {
    fn run(&self, files: Vec<PathBuf>) -> (Vec<Arc<ExplorationTrace>>, Vec<TraceFailure>) {
        let (tx, rx) = channel::bounded::<PathBuf>(self.options.queue_capacity.max(1));
        let loaded = Mutex::new(Vec::new());
        let failures = Mutex::new(Vec::new());
        let stop = AtomicBool::new(false);
        let sequential = self.options.mode == LoadMode::Sequential;

        std::thread::scope(|s| {
            s.spawn(move || {
                for file in files {
                    if tx.send(file).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..self.options.worker_count() {
                let rx = rx.clone();
                let (loaded, failures, stop) = (&loaded, &failures, &stop);
                s.spawn(move || {
                    for file in rx.iter() {
                        if stop.load(Ordering::SeqCst) {
                            debug!("skipping {} after an earlier failure", file.display());
                            continue;
                        }
                        match self.load_trace(&file) {
                            Ok(trace) => loaded.lock().push(trace),
                            Err(e) => {
                                error!("failed to load {}: {}", file.display(), e);
                                failures.lock().push(TraceFailure { file, error: e });
                                if sequential {
                                    stop.store(true, Ordering::SeqCst);
                                }
                            }
                        }
                    }
                });
            }
            drop(rx);
        });

        (loaded.into_inner(), failures.into_inner())
    }

    /// Computed states whose id is in `reachable`.
    fn loaded_states(&self, reachable: &HashSet<ConcreteId>) -> Vec<Arc<State>> {
        let mut states: Vec<Arc<State>> = self
            .states
            .iter()
            .filter_map(|entry| match entry.value().get() {
                Some(Ok(state)) if reachable.contains(&state.id()) => Some(state.clone()),
                _ => None,
            })
            .collect();
        states.sort_by_key(|s| s.id());
        states.dedup_by_key(|s| s.id());
        states
    }

    // ------------------------------------------------------------------------
    // Traces
    // ------------------------------------------------------------------------

    fn load_trace(&self, file: &Path) -> Result<Arc<ExplorationTrace>, ModelError> {
        let trace = ExplorationTrace::with_id(trace_id(self.config, file));
        let text = fs::read_to_string(file).map_err(|e| ModelError::io(file, e))?;
        let sep = self.config.separator;

        let mut lines = text.lines().enumerate();
        let Some((_, header)) = lines.next() else {
            return Ok(Arc::new(trace));
        };
        let indices = column_indices::<TraceColumn>(&split_row(header, sep), &self.options.header_renames);

        let mut interactions = Vec::new();
        let mut current = State::empty();
        for (line_no, line) in lines.filter(|(_, l)| !l.trim().is_empty()) {
            let values = split_row(line, sep);
            let row = parse_interaction_row(&Row::new(&values, &indices))
                .map_err(|reason| ModelError::row(file, line_no + 1, reason))?;
            let action_index = interactions.len();

            let prev = self.state(row.prev_state)?;
            let res = self.state(row.res_state)?;
            let target = match row.target {
                Some(target) => Some(self.resolve_target(
                    file,
                    action_index,
                    target,
                    &prev,
                    row.action_kind,
                    &trace,
                )?),
                None => None,
            };

            interactions.push(Interaction {
                action_kind: row.action_kind,
                target,
                start_timestamp: row.start_timestamp,
                end_timestamp: row.end_timestamp,
                successful: row.successful,
                exception: row.exception,
                prev_state: prev.id(),
                res_state: res.id(),
                data: row.data,
            });
            current = res;
        }

        debug!("loaded {} actions from {}", interactions.len(), file.display());
        trace.append(interactions, current);
        Ok(Arc::new(trace))
    }

    /// Find the recorded target in the source state. In compatibility mode a
    /// missing target is replaced by an element with the same uid that can
    /// receive the recorded action.
    fn resolve_target(
        &self,
        file: &Path,
        action_index: usize,
        recorded: ConcreteId,
        source: &State,
        kind: ActionKind,
        trace: &ExplorationTrace,
    ) -> Result<Arc<Element>, ModelError> {
        let mapped = self
            .element_mapping
            .get(&recorded)
            .map(|m| *m.value())
            .unwrap_or(recorded);
        if let Some(e) = source.find(&mapped) {
            return Ok(e.clone());
        }

        if !self.options.is_autofix() {
            return Err(ModelError::TargetNotFound {
                file: file.to_path_buf(),
                action_index,
                target: recorded,
                state: source.id(),
            });
        }

        let candidates: Vec<&Arc<Element>> = source
            .elements()
            .iter()
            .filter(|e| e.uid == mapped.uid && e.is_interactive() && kind.can_target(&e.properties))
            .collect();

        let Some(chosen) = candidates.first().map(|c| (*c).clone()) else {
            return Err(ModelError::UnresolvableTarget {
                file: file.to_path_buf(),
                action_index,
                target: recorded,
                state: source.id(),
            });
        };

        if candidates.len() > 1 {
            let warning = LoadWarning::AmbiguousTarget {
                trace: file.to_path_buf(),
                action_index,
                target: recorded,
                candidates: candidates.len(),
            };
            warn!("{}", warning);
            self.warnings.lock().push(warning);
            trace.mark_ambiguous();
        } else {
            warn!("{}: action {} target {} repaired to {}", file.display(), action_index, recorded, chosen.id());
        }

        self.element_mapping.insert(recorded, chosen.id());
        Ok(chosen)
    }

    // ------------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------------

    /// The state persisted under `id`, computed at most once.
    fn state(&self, id: ConcreteId) -> Result<Arc<State>, ModelError> {
        let cell: StateCell = self
            .states
            .entry(id)
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .value()
            .clone();

        let mut own_error = None;
        let result = cell.get_or_init(|| {
            self.compute_state(id).map_err(|e| {
                let reason = e.to_string();
                own_error = Some(e);
                reason
            })
        });

        match result {
            Ok(state) => Ok(state.clone()),
            Err(reason) => Err(own_error.unwrap_or_else(|| ModelError::StateUnavailable {
                id,
                reason: reason.clone(),
            })),
        }
    }

    fn compute_state(&self, id: ConcreteId) -> Result<Arc<State>, ModelError> {
        let Some((file, is_home_screen)) = self.state_files.get(&id) else {
            if id == ConcreteId::EMPTY {
                return Ok(State::empty());
            }
            return Err(ModelError::MissingStateFile {
                id,
                dir: self.config.states_dir(),
            });
        };

        let persisted = self.read_state_file(file)?;
        let elements = self.rebuild_elements(file, &persisted)?;
        let state = State::new(elements, *is_home_screen);

        let computed = state.id();
        if self.options.enable_checks && computed != id {
            if !self.options.is_autofix() {
                return Err(ModelError::StateIdMismatch {
                    file: file.clone(),
                    expected: id,
                    computed,
                });
            }
            warn!("{}: state id {} remapped to {}", file.display(), id, computed);
            self.state_mapping.insert(id, computed);
        }

        Ok(Arc::new(state))
    }

    /// Rows of a state file with their line numbers.
    fn read_state_file(&self, file: &Path) -> Result<Vec<(usize, PersistedElement)>, ModelError> {
        let text = fs::read_to_string(file).map_err(|e| ModelError::io(file, e))?;
        let sep = self.config.separator;

        let mut lines = text.lines().enumerate();
        let Some((_, header)) = lines.next() else {
            return Ok(Vec::new());
        };
        let indices = column_indices::<ElementColumn>(&split_row(header, sep), &self.options.header_renames);

        lines
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(line_no, line)| {
                let values = split_row(line, sep);
                parse_element_row(&Row::new(&values, &indices))
                    .map(|row| (line_no + 1, row))
                    .map_err(|reason| ModelError::row(file, line_no + 1, reason))
            })
            .collect()
    }

    /// Rebuild the element tree of one state file and verify element ids.
    fn rebuild_elements(
        &self,
        file: &Path,
        persisted: &[(usize, PersistedElement)],
    ) -> Result<Vec<Arc<Element>>, ModelError> {
        let records = restore_parent_links(file, persisted, self.options.is_autofix())?;
        let built = build_elements(&records, self.options.is_autofix()).map_err(|e| {
            ModelError::CorruptStateFile {
                file: file.to_path_buf(),
                source: Box::new(e),
            }
        })?;
        let by_hash: HashMap<i32, &PersistedElement> = persisted
            .iter()
            .map(|(_, p)| (p.properties.element_hash, p))
            .collect();

        let mut elements = Vec::with_capacity(built.len());
        for element in built {
            let Some(recorded) = by_hash.get(&element.properties.element_hash) else {
                elements.push(element);
                continue;
            };

            // Input field uids may have been restored by edit repair.
            let element = if is_editable(&element.properties) && element.uid != recorded.id.uid {
                Arc::new(element.with_uid(recorded.id.uid))
            } else {
                element
            };

            let computed = element.id();
            if self.options.enable_checks && computed != recorded.id {
                if !self.options.is_autofix() {
                    return Err(ModelError::ElementIdMismatch {
                        file: file.to_path_buf(),
                        expected: recorded.id,
                        computed,
                    });
                }
                warn!("{}: element id {} remapped to {}", file.display(), recorded.id, computed);
                self.element_mapping.insert(recorded.id, computed);
            }
            elements.push(element);
        }
        Ok(elements)
    }
}

fn is_editable(p: &ElementProperties) -> bool {
    p.is_input_field && !p.is_keyboard
}

/// Persisted rows name their parent by id; the tree builder needs hashes.
/// Parents are resolved by recorded id first and by child links otherwise.
/// A parent that resolves neither way fails the load unless `autofix` is set,
/// in which case the row becomes a root.
fn restore_parent_links(
    file: &Path,
    persisted: &[(usize, PersistedElement)],
    autofix: bool,
) -> Result<HashMap<i32, ElementProperties>, ModelError> {
    let hash_of_id: HashMap<ConcreteId, i32> = persisted
        .iter()
        .map(|(_, p)| (p.id, p.properties.element_hash))
        .collect();
    let parent_of_child: HashMap<i32, i32> = persisted
        .iter()
        .flat_map(|(_, p)| {
            p.properties
                .child_hashes
                .iter()
                .map(move |c| (*c, p.properties.element_hash))
        })
        .collect();

    let mut records = HashMap::with_capacity(persisted.len());
    for (line, p) in persisted {
        let mut props = p.properties.clone();
        if let Some(parent) = p.parent_id {
            let resolved = hash_of_id
                .get(&parent)
                .or_else(|| parent_of_child.get(&props.element_hash))
                .copied();
            props.parent_hash = match resolved {
                Some(hash) => hash,
                None if autofix => {
                    warn!(
                        "{}:{}: parent {} is not part of the state, keeping the element as a root",
                        file.display(),
                        line,
                        parent
                    );
                    0
                }
                None => {
                    return Err(ModelError::row(
                        file,
                        *line,
                        format!("parent {} is not part of the state", parent),
                    ));
                }
            };
        }
        records.insert(props.element_hash, props);
    }
    Ok(records)
}
