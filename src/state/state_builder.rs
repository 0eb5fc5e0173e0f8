use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, warn};

use crate::model::error::ModelError;
use crate::screen::screen_model::ElementProperties;
use crate::state::identity::ConcreteId;
use crate::state::state_model::{Element, State};

/// Rebuild the element forest of one screen from its flat, hash-linked records.
///
/// Roots (`parent_hash == 0`) seed a breadth-first walk over `child_hashes`;
/// each element resolves its parent's composite id while being built. Child
/// references without a record are logged and skipped.
///
/// Without `repair`, every record has to be reached from a root. With
/// `repair`, records missed by the walk are attached through their own
/// `parent_hash` when that parent was built; anything still unreachable is
/// dropped with a warning.
pub fn build_elements(
    records: &HashMap<i32, ElementProperties>,
    repair: bool,
) -> Result<Vec<Arc<Element>>, ModelError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut queue: VecDeque<&ElementProperties> = records.values().filter(|r| r.is_root()).collect();
    if queue.is_empty() {
        return Err(ModelError::MalformedSnapshot(format!(
            "none of the {} element records is a root",
            records.len()
        )));
    }

    let mut built: HashMap<i32, Arc<Element>> = HashMap::with_capacity(records.len());
    walk(records, &mut queue, &mut built);

    if built.len() != records.len() {
        if !repair {
            return Err(ModelError::IncompleteTree {
                expected: records.len(),
                built: built.len(),
                missing: unreached(records, &built),
            });
        }
        reattach_orphans(records, &mut built);
    }

    debug!("built {} elements from {} records", built.len(), records.len());
    Ok(built.into_values().collect())
}

/// Convenience: build the elements and the resulting state of a snapshot.
pub fn build_state(
    records: &[ElementProperties],
    is_home_screen: bool,
) -> Result<State, ModelError> {
    let by_hash = records
        .iter()
        .map(|r| (r.element_hash, r.clone()))
        .collect::<HashMap<_, _>>();
    Ok(State::new(build_elements(&by_hash, false)?, is_home_screen))
}

fn walk<'a>(
    records: &'a HashMap<i32, ElementProperties>,
    queue: &mut VecDeque<&'a ElementProperties>,
    built: &mut HashMap<i32, Arc<Element>>,
) {
    while let Some(record) = queue.pop_front() {
        if built.contains_key(&record.element_hash) {
            continue;
        }
        let parent = parent_id(record, built);
        built.insert(
            record.element_hash,
            Arc::new(Element::new(record.clone(), parent)),
        );

        for child in &record.child_hashes {
            match records.get(child) {
                Some(c) => queue.push_back(c),
                None => warn!(
                    "could not find child {} of element {} ({})",
                    child, record.element_hash, record.xpath
                ),
            }
        }
    }
}

fn parent_id(record: &ElementProperties, built: &HashMap<i32, Arc<Element>>) -> Option<ConcreteId> {
    if record.is_root() {
        None
    } else {
        built.get(&record.parent_hash).map(|p| p.id())
    }
}

fn reattach_orphans(
    records: &HashMap<i32, ElementProperties>,
    built: &mut HashMap<i32, Arc<Element>>,
) {
    loop {
        let mut queue: VecDeque<&ElementProperties> = records
            .values()
            .filter(|r| !built.contains_key(&r.element_hash) && built.contains_key(&r.parent_hash))
            .collect();
        if queue.is_empty() {
            break;
        }
        warn!("re-attaching {} orphaned elements via their parent hash", queue.len());
        walk(records, &mut queue, built);
    }

    let missing = unreached(records, built);
    if !missing.is_empty() {
        warn!("dropping {} unreachable elements: {:?}", missing.len(), missing);
    }
}

fn unreached(records: &HashMap<i32, ElementProperties>, built: &HashMap<i32, Arc<Element>>) -> Vec<i32> {
    let mut missing: Vec<i32> = records
        .keys()
        .filter(|h| !built.contains_key(h))
        .copied()
        .collect();
    missing.sort();
    missing
}
