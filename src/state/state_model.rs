use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use crate::screen::classifier;
use crate::screen::screen_model::ElementProperties;
use crate::state::identity::{ConcreteId, StateIds, Uid, compute_config_id, compute_state_id, compute_uid};
use crate::state::normalize::combined_text;

// ============================================================================
// Element
// ============================================================================

/// One UI element of a screen: its immutable property record plus the
/// identities derived from it and the id of its containing element.
#[derive(Debug, Clone)]
pub struct Element {
    pub properties: ElementProperties,
    pub uid: Uid,
    pub config_id: Uid,
    pub parent_id: Option<ConcreteId>,
}

impl Element {
    pub fn new(properties: ElementProperties, parent_id: Option<ConcreteId>) -> Self {
        let uid = compute_uid(&properties);
        let config_id = compute_config_id(&properties);
        Self {
            properties,
            uid,
            config_id,
            parent_id,
        }
    }

    /// Same element with a substituted content identity (edit-field continuity).
    pub fn with_uid(&self, uid: Uid) -> Self {
        Self {
            uid,
            ..self.clone()
        }
    }

    pub fn id(&self) -> ConcreteId {
        ConcreteId::new(self.uid, self.config_id)
    }

    pub fn visible_text(&self) -> String {
        combined_text(&[&self.properties.text, &self.properties.content_desc])
    }

    pub fn has_content(&self) -> bool {
        !self.visible_text().is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.properties.child_hashes.is_empty()
    }

    /// Enabled, visible and capable of some interaction. Says nothing about
    /// whether it is currently reachable on screen.
    pub fn is_interactive(&self) -> bool {
        let p = &self.properties;
        p.enabled
            && p.visible
            && (p.is_input_field
                || p.clickable
                || p.is_checkable()
                || p.long_clickable
                || p.scrollable)
    }

    pub fn can_interact_with(&self) -> bool {
        self.is_interactive() && self.properties.visible_areas.iter().any(|r| !r.is_empty())
    }

    pub fn is_relevant_for_id(&self) -> bool {
        self.has_content() || self.is_interactive() || self.is_leaf()
    }

    pub fn simple_class_name(&self) -> &str {
        let class = &self.properties.class_name;
        class.rsplit('.').next().unwrap_or(class)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}[text={}; desc={}; resId={}]",
            self.id(),
            self.simple_class_name(),
            self.properties.text,
            self.properties.content_desc,
            self.properties.resource_id
        )
    }
}

// ============================================================================
// State
// ============================================================================

static EMPTY_STATE: LazyLock<Arc<State>> = LazyLock::new(|| Arc::new(State::new(Vec::new(), false)));

/// Immutable snapshot of one screen.
///
/// Elements are deduplicated by id and kept sorted by id, so two states built
/// from the same elements in different order are identical.
#[derive(Debug, Clone)]
pub struct State {
    elements: Vec<Arc<Element>>,
    pub is_home_screen: bool,
    ids: StateIds,
}

impl State {
    pub fn new(elements: Vec<Arc<Element>>, is_home_screen: bool) -> Self {
        let mut seen = HashSet::new();
        let mut elements: Vec<Arc<Element>> = elements
            .into_iter()
            .filter(|e| seen.insert(e.id()))
            .collect();
        elements.sort_by_key(|e| e.id());

        let ids = compute_state_id(elements.iter().map(|e| e.as_ref()));
        Self {
            elements,
            is_home_screen,
            ids,
        }
    }

    /// The synthetic state every trace starts from.
    pub fn empty() -> Arc<State> {
        EMPTY_STATE.clone()
    }

    pub fn elements(&self) -> &[Arc<Element>] {
        &self.elements
    }

    pub fn id(&self) -> ConcreteId {
        self.ids.id()
    }

    pub fn uid(&self) -> Uid {
        self.ids.uid
    }

    pub fn config_id(&self) -> Uid {
        self.ids.config_id
    }

    pub fn i_edit_id(&self) -> Uid {
        self.ids.i_edit_id
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn find(&self, id: &ConcreteId) -> Option<&Arc<Element>> {
        self.elements.iter().find(|e| e.id() == *id)
    }

    pub fn find_by_xpath(&self, xpath: &str) -> Option<&Arc<Element>> {
        self.elements.iter().find(|e| e.properties.xpath == xpath)
    }

    pub fn actionable_elements(&self) -> Vec<&Arc<Element>> {
        self.elements.iter().filter(|e| e.is_interactive()).collect()
    }

    pub fn visible_targets(&self) -> Vec<&Arc<Element>> {
        self.elements
            .iter()
            .filter(|e| e.can_interact_with())
            .collect()
    }

    pub fn has_actionable_elements(&self) -> bool {
        self.elements.iter().any(|e| e.is_interactive())
    }

    pub fn has_edit(&self) -> bool {
        self.elements.iter().any(|e| e.properties.is_input_field)
    }

    pub fn is_app_has_stopped_dialog_box(&self) -> bool {
        classifier::is_app_has_stopped_dialog(&self.elements)
    }

    pub fn is_request_runtime_permission_dialog_box(&self) -> bool {
        classifier::is_runtime_permission_dialog(&self.elements)
    }

    /// The uid this state would have if the elements at `xpaths` were not part of it.
    pub fn uid_ignoring(&self, xpaths: &HashSet<&str>) -> Uid {
        self.elements
            .iter()
            .filter(|e| e.is_relevant_for_id() && !e.properties.is_keyboard)
            .filter(|e| !xpaths.contains(e.properties.xpath.as_str()))
            .fold(Uid::EMPTY, |id, e| id + e.uid)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State[{}, elements={}]", self.id(), self.elements.len())
    }
}
