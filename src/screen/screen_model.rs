use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::identity::ConcreteId;

// ============================================================================
// Raw UI element records (produced by the device layer, one per snapshot)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Immutable property record of a single UI element as extracted from the device.
///
/// Elements are linked by `element_hash`: roots have `parent_hash == 0`, every
/// other record names its container, and containers list their `child_hashes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementProperties {
    pub text: String,
    pub hint_text: String,
    pub content_desc: String,
    pub resource_id: String,
    pub class_name: String,
    pub package_name: String,

    pub enabled: bool,
    pub visible: bool,
    pub clickable: bool,
    pub long_clickable: bool,
    pub scrollable: bool,
    /// `None` when the element is not checkable at all
    pub checked: Option<bool>,
    /// `None` when the element is not focusable at all
    pub focused: Option<bool>,
    pub selected: bool,
    pub is_input_field: bool,
    pub is_password: bool,
    pub is_keyboard: bool,

    pub bounds: Rect,
    pub visible_areas: Vec<Rect>,

    /// Structural path within the UI hierarchy
    pub xpath: String,
    pub element_hash: i32,
    pub parent_hash: i32,
    pub child_hashes: Vec<i32>,
}

impl Default for ElementProperties {
    fn default() -> Self {
        Self {
            text: String::new(),
            hint_text: String::new(),
            content_desc: String::new(),
            resource_id: String::new(),
            class_name: String::new(),
            package_name: String::new(),
            enabled: true,
            visible: true,
            clickable: false,
            long_clickable: false,
            scrollable: false,
            checked: None,
            focused: None,
            selected: false,
            is_input_field: false,
            is_password: false,
            is_keyboard: false,
            bounds: Rect::default(),
            visible_areas: Vec::new(),
            xpath: String::new(),
            element_hash: 0,
            parent_hash: 0,
            child_hashes: Vec::new(),
        }
    }
}

impl ElementProperties {
    pub fn is_root(&self) -> bool {
        self.parent_hash == 0
    }

    pub fn is_checkable(&self) -> bool {
        self.checked.is_some()
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Closed set of actions the exploration layer can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Click,
    LongClick,
    Tick,
    TextInsert,
    Swipe,
    PressBack,
    PressHome,
    PressEnter,
    LaunchApp,
    Terminate,
    RotateUi,
    MinimizeMaximize,
    FetchGui,
    QueueStart,
    QueueEnd,
    Empty,
}

impl ActionKind {
    pub const ALL: [ActionKind; 16] = [
        ActionKind::Click,
        ActionKind::LongClick,
        ActionKind::Tick,
        ActionKind::TextInsert,
        ActionKind::Swipe,
        ActionKind::PressBack,
        ActionKind::PressHome,
        ActionKind::PressEnter,
        ActionKind::LaunchApp,
        ActionKind::Terminate,
        ActionKind::RotateUi,
        ActionKind::MinimizeMaximize,
        ActionKind::FetchGui,
        ActionKind::QueueStart,
        ActionKind::QueueEnd,
        ActionKind::Empty,
    ];

    /// Name used in persisted trace files.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click => "Click",
            ActionKind::LongClick => "LongClick",
            ActionKind::Tick => "Tick",
            ActionKind::TextInsert => "TextInsert",
            ActionKind::Swipe => "Swipe",
            ActionKind::PressBack => "PressBack",
            ActionKind::PressHome => "PressHome",
            ActionKind::PressEnter => "PressEnter",
            ActionKind::LaunchApp => "LaunchApp",
            ActionKind::Terminate => "Terminate",
            ActionKind::RotateUi => "RotateUI",
            ActionKind::MinimizeMaximize => "MinimizeMaximize",
            ActionKind::FetchGui => "FetchGUI",
            ActionKind::QueueStart => "ActionQueue-START",
            ActionKind::QueueEnd => "ActionQueue-END",
            ActionKind::Empty => "EMPTY",
        }
    }

    pub fn from_name(name: &str) -> Option<ActionKind> {
        ActionKind::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn has_target(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::LongClick
                | ActionKind::Tick
                | ActionKind::TextInsert
                | ActionKind::Swipe
        )
    }

    pub fn is_queue_marker(&self) -> bool {
        matches!(self, ActionKind::QueueStart | ActionKind::QueueEnd)
    }

    /// Whether an element with these properties can be the target of this kind
    /// of action. Used to find stand-in targets when a persisted target id
    /// no longer resolves.
    pub fn can_target(&self, p: &ElementProperties) -> bool {
        match self {
            ActionKind::Click => p.clickable || p.is_checkable(),
            ActionKind::Tick => p.is_checkable(),
            ActionKind::LongClick => p.long_clickable,
            ActionKind::TextInsert => p.is_input_field,
            ActionKind::Swipe => p.scrollable,
            ActionKind::PressBack
            | ActionKind::PressHome
            | ActionKind::PressEnter
            | ActionKind::LaunchApp
            | ActionKind::Terminate
            | ActionKind::RotateUi
            | ActionKind::MinimizeMaximize
            | ActionKind::FetchGui
            | ActionKind::QueueStart
            | ActionKind::QueueEnd
            | ActionKind::Empty => false,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive action, optionally aimed at an element of the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    #[serde(default)]
    pub target: Option<ConcreteId>,
    /// Free-form payload (typed text, swipe coordinates, rotation)
    #[serde(default)]
    pub data: String,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            data: String::new(),
        }
    }

    pub fn click(target: ConcreteId) -> Self {
        Self::targeted(ActionKind::Click, target)
    }

    pub fn long_click(target: ConcreteId) -> Self {
        Self::targeted(ActionKind::LongClick, target)
    }

    pub fn tick(target: ConcreteId) -> Self {
        Self::targeted(ActionKind::Tick, target)
    }

    pub fn text_insert(target: ConcreteId, text: &str) -> Self {
        Self {
            data: text.to_string(),
            ..Self::targeted(ActionKind::TextInsert, target)
        }
    }

    pub fn swipe(start: (i32, i32), end: (i32, i32)) -> Self {
        Self {
            kind: ActionKind::Swipe,
            target: None,
            data: format!("{},{} TO {},{}", start.0, start.1, end.0, end.1),
        }
    }

    pub fn rotate(degrees: i32) -> Self {
        Self {
            kind: ActionKind::RotateUi,
            target: None,
            data: degrees.to_string(),
        }
    }

    fn targeted(kind: ActionKind, target: ConcreteId) -> Self {
        Self {
            kind,
            target: Some(target),
            data: String::new(),
        }
    }
}

/// What the strategy layer asked the device to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplorationAction {
    Single(Action),
    /// Several actions executed back to back before a new snapshot is taken
    Queue(Vec<Action>),
}

impl ExplorationAction {
    pub fn actions(&self) -> &[Action] {
        match self {
            ExplorationAction::Single(a) => std::slice::from_ref(a),
            ExplorationAction::Queue(actions) => actions,
        }
    }

    /// Kind of the last primitive action (queues report their last entry).
    pub fn last_kind(&self) -> ActionKind {
        self.actions()
            .last()
            .map(|a| a.kind)
            .unwrap_or(ActionKind::Empty)
    }
}

impl From<Action> for ExplorationAction {
    fn from(action: Action) -> Self {
        ExplorationAction::Single(action)
    }
}

// ============================================================================
// Device responses
// ============================================================================

/// The UI snapshot observed after an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSnapshot {
    pub elements: Vec<ElementProperties>,
    pub is_home_screen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// One executed action together with everything the device reported back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: ExplorationAction,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub snapshot: DeviceSnapshot,
    #[serde(default)]
    pub device_logs: Vec<DeviceLog>,
    #[serde(default)]
    pub screenshot: Vec<u8>,
    /// Error raised by the device while executing the action
    #[serde(default)]
    pub exception: Option<String>,
}

impl ActionResult {
    pub fn new(action: impl Into<ExplorationAction>, snapshot: DeviceSnapshot) -> Self {
        let now = Utc::now();
        Self {
            action: action.into(),
            start_timestamp: now,
            end_timestamp: now,
            snapshot,
            device_logs: Vec::new(),
            screenshot: Vec::new(),
            exception: None,
        }
    }

    pub fn successful(&self) -> bool {
        self.exception.is_none()
    }
}
