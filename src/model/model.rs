use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::background::BackgroundJobs;
use crate::model::config::ModelConfig;
use crate::model::edit_repair::EditHistory;
use crate::model::error::ModelError;
use crate::model::feature::ModelFeature;
use crate::model::registry::CollectionActor;
use crate::retention::writer;
use crate::screen::screen_model::{ActionKind, ActionResult, ExplorationAction};
use crate::state::identity::ConcreteId;
use crate::state::state_builder::build_elements;
use crate::state::state_model::{Element, State};
use crate::trace::logger::{DeviceLogEntry, DeviceLogWriter};
use crate::trace::trace::{ExplorationTrace, Interaction};

/// Everything discovered during one exploration campaign of one app.
///
/// States and elements live in single-owner registries; traces are owned
/// here for the lifetime of the model. All background work (dumps,
/// screenshots, device logs) is attached to the model and finished or
/// cancelled by [`Model::finish`] / [`Model::cancel`].
pub struct Model {
    config: Arc<ModelConfig>,
    states: CollectionActor<State>,
    elements: CollectionActor<Element>,
    traces: Mutex<Vec<Arc<ExplorationTrace>>>,
    edit_history: EditHistory,
    /// Serialises edit repair and registration of concurrent updates
    update_lock: Mutex<()>,
    current_state: Mutex<Arc<State>>,
    device_logs: Option<Arc<DeviceLogWriter>>,
    jobs: BackgroundJobs,
}

impl Model {
    /// A fresh model containing only the empty state.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let device_logs = if config.write_device_logs {
            let dir = config.model_dir();
            fs::create_dir_all(&dir).map_err(|e| ModelError::io(&dir, e))?;
            Some(Arc::new(DeviceLogWriter::new(&config.device_log_file())))
                .filter(|writer| writer.is_enabled())
        } else {
            None
        };

        let model = Self {
            jobs: BackgroundJobs::new(config.background_workers)?,
            config: Arc::new(config),
            states: CollectionActor::spawn("states")?,
            elements: CollectionActor::spawn("elements")?,
            traces: Mutex::new(Vec::new()),
            edit_history: EditHistory::new(),
            update_lock: Mutex::new(()),
            current_state: Mutex::new(State::empty()),
            device_logs,
        };
        model.states.add(State::empty())?;

        info!("model for '{}' at {}", model.config.app_name, model.config.model_dir().display());
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Registries
    // ------------------------------------------------------------------------

    pub fn add_state(&self, state: Arc<State>) -> Result<(), ModelError> {
        self.states.add(state)
    }

    pub fn add_elements(&self, elements: Vec<Arc<Element>>) -> Result<(), ModelError> {
        self.elements.add_all(elements)
    }

    pub fn get_state(&self, id: &ConcreteId) -> Result<Option<Arc<State>>, ModelError> {
        self.states.get(*id)
    }

    pub fn get_states(&self) -> Result<Vec<Arc<State>>, ModelError> {
        self.states.get_all()
    }

    pub fn get_element(&self, id: &ConcreteId) -> Result<Option<Arc<Element>>, ModelError> {
        self.elements.get(*id)
    }

    pub fn get_elements(&self) -> Result<Vec<Arc<Element>>, ModelError> {
        self.elements.get_all()
    }

    pub fn get_widgets(&self) -> Result<Vec<Arc<Element>>, ModelError> {
        self.get_elements()
    }

    pub fn get_current_state(&self) -> Arc<State> {
        self.current_state.lock().clone()
    }

    // ------------------------------------------------------------------------
    // Traces
    // ------------------------------------------------------------------------

    pub fn init_new_trace(&self) -> Arc<ExplorationTrace> {
        self.init_new_trace_with(Vec::new())
    }

    /// A new trace whose watchers are notified after each of its updates.
    pub fn init_new_trace_with(&self, watchers: Vec<Arc<dyn ModelFeature>>) -> Arc<ExplorationTrace> {
        let trace = Arc::new(ExplorationTrace::with_watchers(Uuid::new_v4(), watchers));
        self.add_trace(trace.clone());
        debug!("started {}", trace);
        trace
    }

    pub fn add_trace(&self, trace: Arc<ExplorationTrace>) {
        self.traces.lock().push(trace);
    }

    pub fn get_traces(&self) -> Vec<Arc<ExplorationTrace>> {
        self.traces.lock().clone()
    }

    pub fn get_paths(&self) -> Vec<Arc<ExplorationTrace>> {
        self.get_traces()
    }

    // ------------------------------------------------------------------------
    // Live update
    // ------------------------------------------------------------------------

    /// Record the outcome of an executed action in `trace` and return the
    /// resulting state.
    ///
    /// Targets are resolved against the trace's current state before anything
    /// is registered; an unknown target or a malformed snapshot leaves the
    /// model untouched.
    pub fn update_model(
        &self,
        result: &ActionResult,
        trace: &Arc<ExplorationTrace>,
    ) -> Result<Arc<State>, ModelError> {
        let started = Instant::now();
        let source = trace.current_state();

        let targets = result
            .action
            .actions()
            .iter()
            .map(|a| match a.target {
                None => Ok(None),
                Some(id) => source
                    .find(&id)
                    .cloned()
                    .map(Some)
                    .ok_or(ModelError::UnknownTarget {
                        target: id,
                        state: source.id(),
                    }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let records = result
            .snapshot
            .elements
            .iter()
            .map(|p| (p.element_hash, p.clone()))
            .collect::<HashMap<_, _>>();
        let elements = build_elements(&records, false)?;

        let guard = self.update_lock.lock();
        self.edit_history.record(&source, targets.iter().flatten());
        let state = Arc::new(
            self.edit_history
                .repair(State::new(elements, result.snapshot.is_home_screen)),
        );

        self.elements.add_all(state.elements().to_vec())?;
        self.states.add(state.clone())?;

        let interactions = interactions_of(result, &targets, source.id(), state.id());
        let first_index = trace.size();
        let appended = trace.append(interactions, state.clone());
        *self.current_state.lock() = state.clone();
        drop(guard);

        let targets: Vec<Arc<Element>> = targets.into_iter().flatten().collect();
        self.notify_watchers(trace, first_index, appended, targets, &source, &state);
        self.schedule_side_effects(result, trace, &state, first_index);
        debug!(
            "model update for {} -> {} took {:?}",
            result.action.last_kind(),
            state.id(),
            started.elapsed()
        );
        Ok(state)
    }

    fn notify_watchers(
        &self,
        trace: &ExplorationTrace,
        action_index: usize,
        interactions: Vec<Arc<Interaction>>,
        targets: Vec<Arc<Element>>,
        prev: &Arc<State>,
        new: &Arc<State>,
    ) {
        if trace.watchers().is_empty() {
            return;
        }
        let trace_id = trace.id();
        let watchers = trace.watchers().to_vec();
        let (prev, new) = (prev.clone(), new.clone());
        self.jobs.spawn(
            format!("notify {}_{}", trace_id, action_index),
            move |_| {
                for watcher in &watchers {
                    watcher.on_new_interacted(trace_id, action_index, &targets, &prev, &new);
                    watcher.on_new_action(trace_id, &interactions, &prev, &new);
                }
                Ok(())
            },
        );
    }

    fn schedule_side_effects(
        &self,
        result: &ActionResult,
        trace: &Arc<ExplorationTrace>,
        state: &Arc<State>,
        action_index: usize,
    ) {
        if self.config.dump_on_each_action {
            self.schedule_state_dump(state.clone());
            self.schedule_trace_dump(trace.clone());
        }

        if self.config.dump_screenshots && !result.screenshot.is_empty() {
            let config = self.config.clone();
            let trace_id = trace.id();
            let bytes = result.screenshot.clone();
            self.jobs.spawn(
                format!("screenshot {}_{}", trace_id, action_index),
                move |token| {
                    writer::dump_screenshot(&config, trace_id, action_index, &bytes, token)
                        .map(|_| ())
                },
            );
        }

        if let Some(device_logs) = &self.device_logs {
            if result.device_logs.is_empty() {
                return;
            }
            let device_logs = device_logs.clone();
            let trace_id = trace.id();
            let action = result.action.last_kind();
            let logs = result.device_logs.clone();
            self.jobs.spawn(
                format!("device logs {}_{}", trace_id, action_index),
                move |_| {
                    device_logs.log(&DeviceLogEntry {
                        trace_id,
                        action_index,
                        action: action.name(),
                        logs: &logs,
                    });
                    Ok(())
                },
            );
        }
    }

    fn schedule_state_dump(&self, state: Arc<State>) {
        let config = self.config.clone();
        self.jobs
            .spawn(format!("dump state {}", state.id()), move |token| {
                writer::dump_state(&config, &state, token).map(|_| ())
            });
    }

    fn schedule_trace_dump(&self, trace: Arc<ExplorationTrace>) {
        let config = self.config.clone();
        self.jobs
            .spawn(format!("dump trace {}", trace.id()), move |token| {
                writer::dump_trace(&config, &trace, token).map(|_| ())
            });
    }

    // ------------------------------------------------------------------------
    // Persistence and lifetime
    // ------------------------------------------------------------------------

    /// Dump every state and trace and wait until all background work is done.
    pub fn dump_model(&self) -> Result<(), ModelError> {
        let states = self.get_states()?;
        let traces = self.get_traces();
        info!("dumping {} states and {} traces", states.len(), traces.len());

        for state in states {
            self.schedule_state_dump(state);
        }
        for trace in traces {
            self.schedule_trace_dump(trace);
        }
        self.wait_for_background();
        Ok(())
    }

    pub fn wait_for_background(&self) {
        self.jobs.wait_idle();
    }

    pub fn pending_background_jobs(&self) -> usize {
        self.jobs.pending()
    }

    /// End of campaign: let outstanding work complete, then shut down.
    pub fn finish(self) {
        let Model { jobs, .. } = self;
        jobs.join();
    }

    /// Abort the campaign: outstanding work is cancelled, partially written
    /// files are discarded.
    pub fn cancel(self) {
        let Model { jobs, .. } = self;
        jobs.cancel_and_join();
    }
}

/// Rows for one executed action. Queues are framed by start and end markers;
/// all rows share the same source and resulting state.
fn interactions_of(
    result: &ActionResult,
    targets: &[Option<Arc<Element>>],
    prev: ConcreteId,
    res: ConcreteId,
) -> Vec<Interaction> {
    let rows = result
        .action
        .actions()
        .iter()
        .zip(targets)
        .map(|(action, target)| Interaction::from_action(action, target.clone(), result, prev, res));

    match &result.action {
        ExplorationAction::Single(_) => rows.collect(),
        ExplorationAction::Queue(_) => {
            let mut all = vec![Interaction::queue_marker(ActionKind::QueueStart, result, prev, res)];
            all.extend(rows);
            all.push(Interaction::queue_marker(ActionKind::QueueEnd, result, prev, res));
            all
        }
    }
}
