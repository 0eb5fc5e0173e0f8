use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::feature::ModelFeature;
use crate::screen::screen_model::{Action, ActionKind, ActionResult};
use crate::state::identity::ConcreteId;
use crate::state::state_model::{Element, State};

// ============================================================================
// Interaction
// ============================================================================

/// One executed action, immutable once recorded.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub action_kind: ActionKind,
    pub target: Option<Arc<Element>>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub successful: bool,
    /// Empty when the action did not fail
    pub exception: String,
    pub prev_state: ConcreteId,
    pub res_state: ConcreteId,
    /// Action payload: typed text, swipe coordinates, rotation degrees
    pub data: String,
}

impl Interaction {
    pub fn from_action(
        action: &Action,
        target: Option<Arc<Element>>,
        result: &ActionResult,
        prev_state: ConcreteId,
        res_state: ConcreteId,
    ) -> Self {
        Self {
            action_kind: action.kind,
            target,
            start_timestamp: result.start_timestamp,
            end_timestamp: result.end_timestamp,
            successful: result.successful(),
            exception: result.exception.clone().unwrap_or_default(),
            prev_state,
            res_state,
            data: action.data.clone(),
        }
    }

    /// Start or end row framing the sub-actions of an action queue.
    pub fn queue_marker(
        kind: ActionKind,
        result: &ActionResult,
        prev_state: ConcreteId,
        res_state: ConcreteId,
    ) -> Self {
        Self::from_action(&Action::new(kind), None, result, prev_state, res_state)
    }

    pub fn target_id(&self) -> Option<ConcreteId> {
        self.target.as_ref().map(|t| t.id())
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (target {})",
            self.action_kind,
            self.prev_state,
            self.res_state,
            ConcreteId::optional_string(self.target_id().as_ref())
        )
    }
}

// ============================================================================
// Exploration trace
// ============================================================================

#[derive(Debug)]
struct TraceData {
    interactions: Vec<Arc<Interaction>>,
    current_state: Arc<State>,
    targets: Vec<Arc<Element>>,
    ambiguous: bool,
}

/// Append-only record of one continuous exploration run.
///
/// All mutation goes through [`ExplorationTrace::append`], which publishes a
/// batch of interactions and the new current state under one lock, so readers
/// and dumps never see a half-applied action.
pub struct ExplorationTrace {
    id: Uuid,
    data: Mutex<TraceData>,
    /// Number of interactions covered by the last completed dump
    dumped: Mutex<usize>,
    watchers: Vec<Arc<dyn ModelFeature>>,
}

impl ExplorationTrace {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self::with_watchers(id, Vec::new())
    }

    pub fn with_watchers(id: Uuid, watchers: Vec<Arc<dyn ModelFeature>>) -> Self {
        Self {
            id,
            data: Mutex::new(TraceData {
                interactions: Vec::new(),
                current_state: State::empty(),
                targets: Vec::new(),
                ambiguous: false,
            }),
            dumped: Mutex::new(0),
            watchers,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Append one action's interactions and return them as stored.
    pub fn append(&self, interactions: Vec<Interaction>, new_state: Arc<State>) -> Vec<Arc<Interaction>> {
        let mut data = self.data.lock();
        let mut appended = Vec::with_capacity(interactions.len());
        for i in interactions {
            if let Some(target) = &i.target {
                data.targets.push(target.clone());
            }
            let i = Arc::new(i);
            data.interactions.push(i.clone());
            appended.push(i);
        }
        data.current_state = new_state;
        appended
    }

    pub fn watchers(&self) -> &[Arc<dyn ModelFeature>] {
        &self.watchers
    }

    pub fn interactions(&self) -> Vec<Arc<Interaction>> {
        self.data.lock().interactions.clone()
    }

    pub fn size(&self) -> usize {
        self.data.lock().interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn first(&self) -> Option<Arc<Interaction>> {
        self.data.lock().interactions.first().cloned()
    }

    pub fn last(&self) -> Option<Arc<Interaction>> {
        self.data.lock().interactions.last().cloned()
    }

    pub fn current_state(&self) -> Arc<State> {
        self.data.lock().current_state.clone()
    }

    pub fn last_action_kind(&self) -> ActionKind {
        self.last()
            .map(|i| i.action_kind)
            .unwrap_or(ActionKind::Empty)
    }

    /// Every element targeted so far, first occurrence order, no duplicates.
    pub fn explored_elements(&self) -> Vec<Arc<Element>> {
        let data = self.data.lock();
        let mut seen = HashSet::new();
        data.targets
            .iter()
            .filter(|t| seen.insert(t.id()))
            .cloned()
            .collect()
    }

    /// The candidates whose uid was never targeted in this trace.
    pub fn unexplored(&self, candidates: &[Arc<Element>]) -> Vec<Arc<Element>> {
        let data = self.data.lock();
        let explored: HashSet<_> = data.targets.iter().map(|t| t.uid).collect();
        candidates
            .iter()
            .filter(|c| !explored.contains(&c.uid))
            .cloned()
            .collect()
    }

    pub fn mark_ambiguous(&self) {
        self.data.lock().ambiguous = true;
    }

    /// Set when a loaded target had to be picked among several candidates.
    pub fn has_ambiguous_provenance(&self) -> bool {
        self.data.lock().ambiguous
    }

    /// Run `write` over the current interactions unless a dump of a longer
    /// prefix already completed. Dumps of one trace never overlap.
    pub fn dump_with<E>(
        &self,
        write: impl FnOnce(&[Arc<Interaction>]) -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut dumped = self.dumped.lock();
        let interactions = self.interactions();
        if interactions.len() < *dumped {
            return Ok(false);
        }
        write(&interactions)?;
        *dumped = interactions.len();
        Ok(true)
    }
}

impl Default for ExplorationTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExplorationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorationTrace")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

impl fmt::Display for ExplorationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trace[{}, actions={}]", self.id, self.size())
    }
}
