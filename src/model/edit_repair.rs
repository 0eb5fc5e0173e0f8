use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::state::identity::{ConcreteId, Uid};
use crate::state::state_model::{Element, State};

#[derive(Debug, Clone)]
struct EditRecord {
    source: Arc<State>,
    target: Arc<Element>,
}

/// Input fields targeted per source state, keyed by the source's
/// edit-insensitive id. Typing can change a field's uid; a later state with
/// the same edit-insensitive id gets the recorded uids back.
#[derive(Debug, Default)]
pub struct EditHistory {
    records: Mutex<HashMap<Uid, Vec<EditRecord>>>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the input fields targeted from `source`. Other targets are ignored.
    pub fn record<'a>(&self, source: &Arc<State>, targets: impl IntoIterator<Item = &'a Arc<Element>>) {
        let mut records = self.records.lock();
        for target in targets {
            if !target.properties.is_input_field {
                continue;
            }
            let entries = records.entry(source.i_edit_id()).or_default();
            let known = entries
                .iter()
                .any(|r| r.source.id() == source.id() && r.target.id() == target.id());
            if !known {
                entries.push(EditRecord {
                    source: source.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `state` with the input fields of the first consistent history
    /// entry restored to their recorded uids, or unchanged when none fits.
    pub fn repair(&self, state: State) -> State {
        if !state.has_edit() {
            return state;
        }

        let records = self.records.lock();
        let Some(entries) = records.get(&state.i_edit_id()) else {
            return state;
        };

        for (source, targets) in group_by_source(entries) {
            if source.id() == state.id() {
                continue;
            }
            if let Some(renames) = consistent_renames(&source, &targets, &state) {
                if renames.is_empty() {
                    return state;
                }
                debug!(
                    "restoring {} edit field uid(s) of {} from {}",
                    renames.len(),
                    state.id(),
                    source.id()
                );
                return rewrite(&state, &renames);
            }
        }

        state
    }
}

/// Entries with the same source state, in recording order.
fn group_by_source(entries: &[EditRecord]) -> Vec<(Arc<State>, Vec<Arc<Element>>)> {
    let mut groups: Vec<(Arc<State>, Vec<Arc<Element>>)> = Vec::new();
    for r in entries {
        match groups.iter_mut().find(|(s, _)| s.id() == r.source.id()) {
            Some((_, targets)) => targets.push(r.target.clone()),
            None => groups.push((r.source.clone(), vec![r.target.clone()])),
        }
    }
    groups
}

/// Every target needs an input field at the same xpath in `state`, and both
/// states have to agree on everything except those fields.
fn consistent_renames(
    source: &State,
    targets: &[Arc<Element>],
    state: &State,
) -> Option<HashMap<ConcreteId, Uid>> {
    let xpaths: HashSet<&str> = targets.iter().map(|t| t.properties.xpath.as_str()).collect();
    if source.uid_ignoring(&xpaths) != state.uid_ignoring(&xpaths) {
        return None;
    }

    let mut renames = HashMap::new();
    for target in targets {
        let counterpart = state
            .find_by_xpath(&target.properties.xpath)
            .filter(|e| e.properties.is_input_field)?;
        if counterpart.uid != target.uid {
            renames.insert(counterpart.id(), target.uid);
        }
    }
    Some(renames)
}

fn rewrite(state: &State, renames: &HashMap<ConcreteId, Uid>) -> State {
    let elements = state
        .elements()
        .iter()
        .map(|e| match renames.get(&e.id()) {
            Some(uid) => Arc::new(e.with_uid(*uid)),
            None => e.clone(),
        })
        .collect();
    State::new(elements, state.is_home_screen)
}
