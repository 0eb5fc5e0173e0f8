use std::sync::Arc;

use uuid::Uuid;

use crate::state::state_model::{Element, State};
use crate::trace::trace::Interaction;

/// Watcher of an exploration trace, notified in the background after every
/// model update of that trace. Notifications of different updates may be
/// delivered concurrently.
pub trait ModelFeature: Send + Sync {
    /// The interactions appended for one executed action.
    fn on_new_action(
        &self,
        _trace_id: Uuid,
        _interactions: &[Arc<Interaction>],
        _prev: &Arc<State>,
        _new: &Arc<State>,
    ) {
    }

    /// The elements targeted by one executed action. `action_index` is the
    /// index of its first interaction in the trace.
    fn on_new_interacted(
        &self,
        _trace_id: Uuid,
        _action_index: usize,
        _targets: &[Arc<Element>],
        _prev: &Arc<State>,
        _new: &Arc<State>,
    ) {
    }
}
