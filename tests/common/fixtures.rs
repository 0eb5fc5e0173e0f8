use std::collections::HashMap;
use std::sync::Arc;

use exploration_model::screen::screen_model::{
    Action, ActionKind, ActionResult, DeviceSnapshot, ElementProperties, Rect,
};
use exploration_model::state::state_builder::build_state;
use exploration_model::state::state_model::{Element, State};

// =========================================================================
// Element records
// =========================================================================

pub fn record(hash: i32, parent: i32, children: &[i32]) -> ElementProperties {
    ElementProperties {
        class_name: "android.widget.FrameLayout".into(),
        package_name: "com.example.app".into(),
        bounds: Rect::new(0, 0, 1080, 1920),
        visible_areas: vec![Rect::new(0, 0, 1080, 1920)],
        xpath: format!("//node[{}]", hash),
        element_hash: hash,
        parent_hash: parent,
        child_hashes: children.to_vec(),
        ..ElementProperties::default()
    }
}

pub fn container(hash: i32, parent: i32, children: &[i32]) -> ElementProperties {
    record(hash, parent, children)
}

pub fn label(hash: i32, parent: i32, text: &str) -> ElementProperties {
    ElementProperties {
        class_name: "android.widget.TextView".into(),
        text: text.into(),
        bounds: Rect::new(0, hash * 10, 500, 80),
        visible_areas: vec![Rect::new(0, hash * 10, 500, 80)],
        ..record(hash, parent, &[])
    }
}

pub fn button(hash: i32, parent: i32, text: &str) -> ElementProperties {
    ElementProperties {
        class_name: "android.widget.Button".into(),
        clickable: true,
        ..label(hash, parent, text)
    }
}

pub fn checkbox(hash: i32, parent: i32, text: &str, checked: bool) -> ElementProperties {
    ElementProperties {
        class_name: "android.widget.CheckBox".into(),
        clickable: true,
        checked: Some(checked),
        ..label(hash, parent, text)
    }
}

pub fn input(hash: i32, parent: i32, resource_id: &str, text: &str) -> ElementProperties {
    ElementProperties {
        class_name: "android.widget.EditText".into(),
        resource_id: resource_id.into(),
        is_input_field: true,
        clickable: true,
        focused: Some(false),
        xpath: "//root/edit[1]".into(),
        ..label(hash, parent, text)
    }
}

pub fn keyboard_key(hash: i32, parent: i32, text: &str) -> ElementProperties {
    ElementProperties {
        package_name: "com.android.inputmethod".into(),
        is_keyboard: true,
        ..button(hash, parent, text)
    }
}

// =========================================================================
// Screens
// =========================================================================

/// Welcome label, user name field and a login button.
pub fn login_screen() -> Vec<ElementProperties> {
    vec![
        container(1, 0, &[2, 3, 4]),
        label(2, 1, "Welcome"),
        input(3, 1, "com.example.app:id/user", ""),
        button(4, 1, "Login"),
    ]
}

pub fn home_screen() -> Vec<ElementProperties> {
    vec![
        container(10, 0, &[11, 12, 13]),
        label(11, 10, "Home"),
        checkbox(12, 10, "Remember me", false),
        button(13, 10, "Logout"),
    ]
}

/// Search screen whose input field is identified by its structural hash only.
/// After typing, the device reports a different hash for the field.
pub fn search_screen(input_hash: i32, typed: &str) -> Vec<ElementProperties> {
    vec![
        container(20, 0, &[21, input_hash]),
        label(21, 20, "Search"),
        input(input_hash, 20, "", typed),
    ]
}

/// Two clickable "OK" buttons sharing one uid.
pub fn duplicate_ok_screen() -> Vec<ElementProperties> {
    vec![
        container(30, 0, &[31, 32, 33]),
        label(31, 30, "Confirm"),
        button(32, 30, "OK"),
        button(33, 30, "OK"),
    ]
}

pub fn by_hash(records: &[ElementProperties]) -> HashMap<i32, ElementProperties> {
    records.iter().map(|r| (r.element_hash, r.clone())).collect()
}

pub fn state_of(records: &[ElementProperties]) -> State {
    build_state(records, false).unwrap()
}

pub fn element_with_text<'a>(state: &'a State, text: &str) -> &'a Arc<Element> {
    state
        .elements()
        .iter()
        .find(|e| e.properties.text == text)
        .unwrap_or_else(|| panic!("no element with text '{}' in {}", text, state))
}

pub fn input_of(state: &State) -> &Arc<Element> {
    state
        .elements()
        .iter()
        .find(|e| e.properties.is_input_field)
        .unwrap_or_else(|| panic!("no input field in {}", state))
}

// =========================================================================
// Action results
// =========================================================================

pub fn result(action: Action, screen: Vec<ElementProperties>) -> ActionResult {
    ActionResult::new(
        action,
        DeviceSnapshot {
            elements: screen,
            is_home_screen: false,
        },
    )
}

pub fn launch(screen: Vec<ElementProperties>) -> ActionResult {
    result(Action::new(ActionKind::LaunchApp), screen)
}
