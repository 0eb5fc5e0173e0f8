use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use exploration_model::model::error::ModelError;
use exploration_model::screen::screen_model::{ElementProperties, Rect};
use exploration_model::state::state_builder::{build_elements, build_state};
use exploration_model::state::state_model::{Element, State};

use crate::common::fixtures::{
    button, by_hash, checkbox, container, element_with_text, home_screen, input, label,
    login_screen, state_of,
};

mod common;

// =========================================================================
// Element tree builder
// =========================================================================

#[test]
fn builds_one_element_per_record() {
    let records = login_screen();
    let elements = build_elements(&by_hash(&records), false).unwrap();
    assert_eq!(elements.len(), records.len());
}

#[test]
fn children_resolve_their_parent_by_composite_id() {
    let elements = build_elements(&by_hash(&login_screen()), false).unwrap();
    let by_element_hash: HashMap<i32, &Arc<Element>> = elements
        .iter()
        .map(|e| (e.properties.element_hash, e))
        .collect();

    let root = by_element_hash[&1];
    assert_eq!(root.parent_id, None);
    for child in &root.properties.child_hashes {
        let element = by_element_hash[child];
        assert_eq!(element.properties.element_hash, *child);
        assert_eq!(element.parent_id, Some(root.id()));
    }
}

#[test]
fn nested_tree_links_every_level() {
    let records = vec![
        container(1, 0, &[2]),
        container(2, 1, &[3, 4]),
        label(3, 2, "Title"),
        button(4, 2, "Go"),
    ];
    let elements = build_elements(&by_hash(&records), false).unwrap();
    let middle = elements.iter().find(|e| e.properties.element_hash == 2).unwrap();
    let go = elements.iter().find(|e| e.properties.element_hash == 4).unwrap();
    assert_eq!(go.parent_id, Some(middle.id()));
}

#[test]
fn empty_snapshot_builds_nothing() {
    let elements = build_elements(&HashMap::new(), false).unwrap();
    assert!(elements.is_empty());
    assert_eq!(build_state(&[], false).unwrap().id(), State::empty().id());
}

#[test]
fn snapshot_without_roots_is_rejected() {
    let records = vec![label(2, 1, "Orphan"), button(3, 1, "Lost")];
    let err = build_elements(&by_hash(&records), false).unwrap_err();
    assert!(matches!(err, ModelError::MalformedSnapshot(_)), "got {:?}", err);
}

#[test]
fn missing_child_reference_is_skipped() {
    let records = vec![container(1, 0, &[2, 99]), label(2, 1, "Still here")];
    let elements = build_elements(&by_hash(&records), false).unwrap();
    assert_eq!(elements.len(), 2);
}

#[test]
fn unreachable_record_fails_without_repair() {
    let records = vec![container(1, 0, &[2]), label(2, 1, "Reached"), label(5, 50, "Detached")];
    match build_elements(&by_hash(&records), false) {
        Err(ModelError::IncompleteTree {
            expected,
            built,
            missing,
        }) => {
            assert_eq!(expected, 3);
            assert_eq!(built, 2);
            assert_eq!(missing, vec![5]);
        }
        other => panic!("expected IncompleteTree, got {:?}", other),
    }
}

#[test]
fn repair_reattaches_records_missing_from_child_lists() {
    // 3 names 1 as parent but 1 does not list it
    let records = vec![container(1, 0, &[2]), label(2, 1, "Listed"), button(3, 1, "Unlisted")];
    assert!(build_elements(&by_hash(&records), false).is_err());

    let elements = build_elements(&by_hash(&records), true).unwrap();
    assert_eq!(elements.len(), 3);
    let root = elements.iter().find(|e| e.properties.element_hash == 1).unwrap();
    let unlisted = elements.iter().find(|e| e.properties.element_hash == 3).unwrap();
    assert_eq!(unlisted.parent_id, Some(root.id()));
}

#[test]
fn repair_drops_what_cannot_be_reached() {
    let records = vec![container(1, 0, &[2]), label(2, 1, "Reached"), label(5, 50, "Detached")];
    let elements = build_elements(&by_hash(&records), true).unwrap();
    assert_eq!(elements.len(), 2);
}

// =========================================================================
// State
// =========================================================================

#[test]
fn state_deduplicates_and_sorts_elements() {
    let element = Arc::new(Element::new(button(4, 1, "Login"), None));
    let other = Arc::new(Element::new(label(2, 1, "Welcome"), None));
    let state = State::new(vec![element.clone(), other.clone(), element.clone()], false);

    assert_eq!(state.elements().len(), 2);
    let ids: Vec<_> = state.elements().iter().map(|e| e.id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn actionable_and_visible_targets() {
    let hidden = ElementProperties {
        visible_areas: vec![Rect::new(0, 0, 0, 0)],
        ..button(5, 1, "Offscreen")
    };
    let disabled = ElementProperties {
        enabled: false,
        ..button(6, 1, "Disabled")
    };
    let records = vec![
        container(1, 0, &[2, 4, 5, 6]),
        label(2, 1, "Welcome"),
        button(4, 1, "Login"),
        hidden,
        disabled,
    ];
    let state = state_of(&records);

    let actionable: HashSet<&str> = state
        .actionable_elements()
        .iter()
        .map(|e| e.properties.text.as_str())
        .collect();
    assert_eq!(actionable, HashSet::from(["Login", "Offscreen"]));

    let visible: Vec<&str> = state
        .visible_targets()
        .iter()
        .map(|e| e.properties.text.as_str())
        .collect();
    assert_eq!(visible, vec!["Login"]);
    assert!(state.has_actionable_elements());
    assert!(!State::empty().has_actionable_elements());
}

#[test]
fn element_convenience_queries() {
    let state = state_of(&home_screen());
    let remember = element_with_text(&state, "Remember me");
    assert!(remember.properties.is_checkable());
    assert!(remember.is_interactive());
    assert!(remember.can_interact_with());
    assert!(remember.is_leaf());
    assert_eq!(remember.simple_class_name(), "CheckBox");
    assert_eq!(remember.visible_text(), "Remember me");

    let root = state.elements().iter().find(|e| e.properties.is_root()).unwrap();
    assert!(!root.is_relevant_for_id());
}

#[test]
fn lookup_by_id_and_structural_path() {
    let state = state_of(&login_screen());
    let login = element_with_text(&state, "Login");
    assert_eq!(state.find(&login.id()).map(|e| e.id()), Some(login.id()));
    assert_eq!(
        state.find_by_xpath("//root/edit[1]").map(|e| e.properties.is_input_field),
        Some(true)
    );
    assert!(state.has_edit());
    assert!(!state_of(&home_screen()).has_edit());
}

#[test]
fn uid_ignoring_skips_named_paths() {
    let a = state_of(&login_screen());
    let mut typed = login_screen();
    typed[2] = input(3, 1, "com.example.app:id/other", "bob");
    let b = state_of(&typed);

    assert_ne!(a.uid(), b.uid());
    let ignored = HashSet::from(["//root/edit[1]"]);
    assert_eq!(a.uid_ignoring(&ignored), b.uid_ignoring(&ignored));
}

#[test]
fn home_screen_flag_is_kept() {
    let state = build_state(&home_screen(), true).unwrap();
    assert!(state.is_home_screen);
}

// =========================================================================
// Screen classification
// =========================================================================

#[test]
fn detects_app_has_stopped_dialog() {
    let close = ElementProperties {
        resource_id: "android:id/aerr_close".into(),
        ..button(2, 1, "Close app")
    };
    let wait = ElementProperties {
        resource_id: "android:id/aerr_wait".into(),
        ..button(3, 1, "Wait")
    };
    let dialog = state_of(&[container(1, 0, &[2, 3]), close.clone(), wait]);
    assert!(dialog.is_app_has_stopped_dialog_box());

    let only_close = state_of(&[container(1, 0, &[2]), close]);
    assert!(!only_close.is_app_has_stopped_dialog_box());
}

#[test]
fn detects_runtime_permission_dialog() {
    let dialog = state_of(&[
        container(1, 0, &[2, 3, 4]),
        label(2, 1, "Allow Example to access photos?"),
        button(3, 1, "DENY"),
        button(4, 1, "ALLOW"),
    ]);
    assert!(dialog.is_request_runtime_permission_dialog_box());

    let container_dialog = state_of(&[
        ElementProperties {
            resource_id: "com.android.packageinstaller:id/dialog_container".into(),
            ..container(1, 0, &[2])
        },
        button(2, 1, "Allow"),
    ]);
    assert!(container_dialog.is_request_runtime_permission_dialog_box());

    let unrelated = state_of(&[container(1, 0, &[2]), checkbox(2, 1, "Deny list", false)]);
    assert!(!unrelated.is_request_runtime_permission_dialog_box());
    assert!(!state_of(&login_screen()).is_request_runtime_permission_dialog_box());
}
