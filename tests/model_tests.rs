use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use exploration_model::model::config::ModelConfig;
use exploration_model::model::error::ModelError;
use exploration_model::model::feature::ModelFeature;
use exploration_model::model::model::Model;
use exploration_model::model::registry::CollectionActor;
use exploration_model::retention::writer::screenshot_file;
use exploration_model::screen::screen_model::{
    Action, ActionKind, DeviceLog, ExplorationAction, ElementProperties,
};
use exploration_model::state::identity::{ConcreteId, Uid};
use exploration_model::state::state_model::{Element, State};
use exploration_model::trace::logger::{DeviceLogEntry, DeviceLogWriter};
use exploration_model::trace::trace::Interaction;
use tempfile::TempDir;
use uuid::Uuid;

use crate::common::fixtures::{
    button, container, element_with_text, home_screen, input, input_of, label, launch,
    login_screen, result, search_screen, state_of,
};
use crate::common::utils::{files_in, record_login_session, temp_config};

mod common;

fn quiet_config(dir: &TempDir) -> ModelConfig {
    ModelConfig {
        dump_on_each_action: false,
        write_device_logs: false,
        ..temp_config(dir)
    }
}

// =========================================================================
// Registry
// =========================================================================

#[test]
fn new_model_holds_only_the_empty_state() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();

    let states = model.get_states().unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].id(), ConcreteId::EMPTY);
    assert!(model.get_elements().unwrap().is_empty());
    assert_eq!(model.get_current_state().id(), ConcreteId::EMPTY);
    assert!(model.get_traces().is_empty());
    model.finish();
}

#[test]
fn registration_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let state = Arc::new(state_of(&login_screen()));

    model.add_elements(state.elements().to_vec()).unwrap();
    model.add_elements(state.elements().to_vec()).unwrap();
    model.add_state(state.clone()).unwrap();
    model.add_state(Arc::new(state_of(&login_screen()))).unwrap();

    assert_eq!(model.get_states().unwrap().len(), 2);
    assert_eq!(model.get_elements().unwrap().len(), state.elements().len());
    assert_eq!(
        model.get_state(&state.id()).unwrap().map(|s| s.id()),
        Some(state.id())
    );
    model.finish();
}

#[test]
fn registry_is_consistent_under_concurrent_producers() {
    let registry: CollectionActor<Element> = CollectionActor::spawn("elements").unwrap();
    let elements: Vec<Arc<Element>> = (1..=50)
        .map(|i| Arc::new(Element::new(label(i, 0, &format!("Item {}", char::from(b'A' + (i % 26) as u8))), None)))
        .collect();
    let distinct: HashSet<ConcreteId> = elements.iter().map(|e| e.id()).collect();

    std::thread::scope(|s| {
        for _ in 0..8 {
            let elements = elements.clone();
            let registry = &registry;
            s.spawn(move || {
                for e in elements {
                    registry.add(e).unwrap();
                }
            });
        }
    });

    assert_eq!(registry.len().unwrap(), distinct.len());
    let all = registry.get_all().unwrap();
    let ids: Vec<ConcreteId> = all.iter().map(|e| e.id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

// =========================================================================
// Live updates
// =========================================================================

#[test]
fn update_registers_state_elements_and_interaction() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();

    let login = model.update_model(&launch(login_screen()), &trace).unwrap();

    assert_eq!(model.get_current_state().id(), login.id());
    assert_eq!(trace.current_state().id(), login.id());
    assert!(model.get_state(&login.id()).unwrap().is_some());
    for e in login.elements() {
        assert!(model.get_element(&e.id()).unwrap().is_some());
    }

    let interaction = trace.last().unwrap();
    assert_eq!(interaction.action_kind, ActionKind::LaunchApp);
    assert_eq!(interaction.prev_state, ConcreteId::EMPTY);
    assert_eq!(interaction.res_state, login.id());
    assert!(interaction.successful);
    assert!(interaction.target.is_none());
    model.finish();
}

#[test]
fn revisiting_a_screen_does_not_duplicate_it() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = record_login_session(&model);

    // empty, login, home
    assert_eq!(model.get_states().unwrap().len(), 3);
    assert_eq!(trace.size(), 4);
    assert_eq!(trace.first().unwrap().prev_state, ConcreteId::EMPTY);
    assert_eq!(trace.last().unwrap().res_state, trace.first().unwrap().res_state);
    model.finish();
}

#[test]
fn unknown_target_leaves_the_model_untouched() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();
    model.update_model(&launch(login_screen()), &trace).unwrap();

    let stranger = Element::new(button(77, 1, "Elsewhere"), None).id();
    let err = model
        .update_model(&result(Action::click(stranger), home_screen()), &trace)
        .unwrap_err();

    assert!(matches!(err, ModelError::UnknownTarget { target, .. } if target == stranger));
    assert_eq!(trace.size(), 1);
    assert_eq!(model.get_states().unwrap().len(), 2);
    model.finish();
}

#[test]
fn malformed_snapshot_is_not_registered() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();

    let no_roots = vec![label(2, 1, "Floating")];
    let err = model.update_model(&launch(no_roots), &trace).unwrap_err();

    assert!(matches!(err, ModelError::MalformedSnapshot(_)));
    assert!(trace.is_empty());
    assert_eq!(model.get_states().unwrap().len(), 1);
    model.finish();
}

#[test]
fn action_queue_is_framed_by_markers() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();
    let login = model.update_model(&launch(login_screen()), &trace).unwrap();

    let field = input_of(&login).id();
    let button = element_with_text(&login, "Login").id();
    let queue = ExplorationAction::Queue(vec![
        Action::text_insert(field, "bob"),
        Action::click(button),
    ]);
    let home = model
        .update_model(&result_of(queue, home_screen()), &trace)
        .unwrap();

    let kinds: Vec<ActionKind> = trace.interactions().iter().map(|i| i.action_kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::LaunchApp,
            ActionKind::QueueStart,
            ActionKind::TextInsert,
            ActionKind::Click,
            ActionKind::QueueEnd,
        ]
    );
    for i in &trace.interactions()[1..] {
        assert_eq!(i.prev_state, login.id());
        assert_eq!(i.res_state, home.id());
    }
    assert_eq!(trace.interactions()[2].data, "bob");
    assert_eq!(trace.last_action_kind(), ActionKind::QueueEnd);
    model.finish();
}

fn result_of(
    action: ExplorationAction,
    screen: Vec<ElementProperties>,
) -> exploration_model::screen::screen_model::ActionResult {
    let mut r = launch(screen);
    r.action = action;
    r
}

#[test]
fn action_payloads_are_recorded() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();
    model.update_model(&launch(login_screen()), &trace).unwrap();

    model
        .update_model(&result(Action::swipe((10, 900), (10, 100)), login_screen()), &trace)
        .unwrap();
    model
        .update_model(&result(Action::rotate(90), login_screen()), &trace)
        .unwrap();

    let mut failed = result(Action::new(ActionKind::PressBack), login_screen());
    failed.exception = Some("device disconnected".into());
    model.update_model(&failed, &trace).unwrap();

    let rows = trace.interactions();
    assert_eq!(rows[1].data, "10,900 TO 10,100");
    assert_eq!(rows[2].data, "90");
    assert!(!rows[3].successful);
    assert_eq!(rows[3].exception, "device disconnected");
    model.finish();
}

#[test]
fn trace_tracks_explored_elements() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = record_login_session(&model);

    let explored: Vec<String> = trace
        .explored_elements()
        .iter()
        .map(|e| e.properties.text.clone())
        .collect();
    assert_eq!(explored, vec!["Login", "Remember me", "Logout"]);

    let login = trace.current_state();
    let unexplored: Vec<String> = trace
        .unexplored(&login.actionable_elements().into_iter().cloned().collect::<Vec<_>>())
        .iter()
        .map(|e| e.properties.text.clone())
        .collect();
    assert_eq!(unexplored, vec![String::new()]);
    assert!(!trace.has_ambiguous_provenance());
    model.finish();
}

#[test]
fn concurrent_traces_share_one_consistent_registry() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let model = &model;
            s.spawn(move || {
                record_login_session(model);
            });
        }
    });

    assert_eq!(model.get_traces().len(), 4);
    assert_eq!(model.get_states().unwrap().len(), 3);
    let expected: usize = [login_screen(), home_screen()]
        .iter()
        .map(|s| state_of(s).elements().len())
        .sum();
    assert_eq!(model.get_elements().unwrap().len(), expected);
    for trace in model.get_traces() {
        assert_eq!(trace.size(), 4);
    }
    model.finish();
}

// =========================================================================
// Edit-field continuity
// =========================================================================

#[test]
fn typing_keeps_resource_identified_field_uid() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();

    let screen = |typed: &str| {
        vec![
            container(1, 0, &[2, 3]),
            label(2, 1, "Find"),
            input(3, 1, "search_box", typed),
        ]
    };
    let s1 = model.update_model(&launch(screen("")), &trace).unwrap();
    let u = input_of(&s1).uid;
    let s2 = model
        .update_model(&result(Action::text_insert(input_of(&s1).id(), "cats"), screen("cats")), &trace)
        .unwrap();

    assert_eq!(u, Uid::of_text("search_box"));
    assert_eq!(s1.i_edit_id(), s2.i_edit_id());
    assert_eq!(input_of(&s2).uid, u);
    assert_eq!(input_of(&s2).properties.text, "cats");
    model.finish();
}

#[test]
fn typing_restores_field_uid_when_the_device_rehashes_it() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();

    let s1 = model.update_model(&launch(search_screen(22, "")), &trace).unwrap();
    let original = input_of(&s1).clone();

    // without history the typed screen is a different screen
    let raw = state_of(&search_screen(23, "cats"));
    assert_ne!(input_of(&raw).uid, original.uid);
    assert_eq!(raw.i_edit_id(), s1.i_edit_id());

    let s2 = model
        .update_model(
            &result(Action::text_insert(original.id(), "cats"), search_screen(23, "cats")),
            &trace,
        )
        .unwrap();

    assert_eq!(input_of(&s2).uid, original.uid);
    assert_eq!(s2.uid(), s1.uid());
    assert_ne!(s2.id(), s1.id());
    assert_eq!(input_of(&s2).properties.element_hash, 23);
    assert!(model.get_element(&input_of(&s2).id()).unwrap().is_some());
    model.finish();
}

#[test]
fn unrelated_screen_is_not_repaired() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let trace = model.init_new_trace();

    let s1 = model.update_model(&launch(search_screen(22, "")), &trace).unwrap();
    let original = input_of(&s1).clone();

    let mut elsewhere = search_screen(23, "cats");
    elsewhere[1] = label(21, 20, "Results");
    let s2 = model
        .update_model(&result(Action::text_insert(original.id(), "cats"), elsewhere), &trace)
        .unwrap();

    assert_ne!(input_of(&s2).uid, original.uid);
    assert_ne!(s2.i_edit_id(), s1.i_edit_id());
    model.finish();
}

// =========================================================================
// Background work
// =========================================================================

#[test]
fn unopenable_device_log_disables_the_writer() {
    let dir = TempDir::new().unwrap();
    assert!(DeviceLogWriter::new(&dir.path().join("device.log")).is_enabled());

    let writer = DeviceLogWriter::new(&dir.path().join("missing").join("device.log"));
    assert!(!writer.is_enabled());
    writer.log(&DeviceLogEntry {
        trace_id: Uuid::nil(),
        action_index: 0,
        action: "Click",
        logs: &[],
    });
    assert!(!dir.path().join("missing").exists());
}

#[test]
fn every_action_is_dumped_in_the_background() {
    let dir = TempDir::new().unwrap();
    let config = ModelConfig {
        dump_screenshots: true,
        ..temp_config(&dir)
    };
    let model = Model::new(config.clone()).unwrap();
    let trace = model.init_new_trace();

    let mut launched = launch(login_screen());
    launched.screenshot = vec![0xff, 0xd8, 0xff];
    launched.device_logs = vec![DeviceLog {
        timestamp: Utc::now(),
        message: "ActivityManager: Start proc".into(),
    }];
    let login = model.update_model(&launched, &trace).unwrap();
    model.wait_for_background();

    assert!(config.state_file(&login.id(), false).is_file());
    assert!(config.trace_file(&trace.id().to_string()).is_file());
    assert_eq!(
        fs::read(screenshot_file(&config, trace.id(), 0)).unwrap(),
        vec![0xff, 0xd8, 0xff]
    );

    let logs = fs::read_to_string(config.device_log_file()).unwrap();
    let line: serde_json::Value = serde_json::from_str(logs.lines().next().unwrap()).unwrap();
    assert_eq!(line["action_index"], 0);
    assert_eq!(line["action"], "LaunchApp");
    assert_eq!(line["trace_id"], trace.id().to_string());
    assert_eq!(line["logs"][0]["message"], "ActivityManager: Start proc");

    model.finish();
}

#[test]
fn finish_waits_for_outstanding_dumps() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir);
    let model = Model::new(config.clone()).unwrap();
    let trace = record_login_session(&model);
    let ids: Vec<ConcreteId> = model
        .get_states()
        .unwrap()
        .iter()
        .map(|s| s.id())
        .filter(|id| *id != ConcreteId::EMPTY)
        .collect();
    model.finish();

    for id in ids {
        assert!(config.state_file(&id, false).is_file(), "missing {}", id);
    }
    let dumped = fs::read_to_string(config.trace_file(&trace.id().to_string())).unwrap();
    assert_eq!(dumped.lines().count(), 1 + trace.size());
}

#[test]
fn cancel_never_leaves_partial_files() {
    let dir = TempDir::new().unwrap();
    let config = temp_config(&dir);
    let model = Model::new(config.clone()).unwrap();
    for _ in 0..3 {
        record_login_session(&model);
    }
    model.cancel();

    for file in files_in(&config.states_dir()) {
        let content = fs::read_to_string(&file).unwrap();
        assert!(content.ends_with('\n'), "truncated {}", file.display());
        assert!(content.starts_with("UID;"), "no header in {}", file.display());
    }
    let leftovers: Vec<_> = files_in(&config.states_dir())
        .into_iter()
        .filter(|p| p.extension().is_none_or(|e| e != "csv"))
        .collect();
    assert!(leftovers.is_empty(), "temporary files left: {:?}", leftovers);
}

#[test]
fn dump_model_writes_the_empty_state_too() {
    let dir = TempDir::new().unwrap();
    let config = quiet_config(&dir);
    let model = Model::new(config.clone()).unwrap();
    record_login_session(&model);
    model.dump_model().unwrap();
    assert_eq!(model.pending_background_jobs(), 0);

    assert!(config.state_file(&State::empty().id(), false).is_file());
    assert_eq!(files_in(&config.states_dir()).len(), 3);
    model.finish();
}

// =========================================================================
// Trace watchers
// =========================================================================

#[derive(Default)]
struct CountingWatcher {
    actions: AtomicUsize,
    interactions: AtomicUsize,
    targets: AtomicUsize,
    interacted: Mutex<Vec<(Uuid, usize)>>,
}

impl ModelFeature for CountingWatcher {
    fn on_new_action(&self, _: Uuid, interactions: &[Arc<Interaction>], _: &Arc<State>, _: &Arc<State>) {
        self.actions.fetch_add(1, Ordering::SeqCst);
        self.interactions.fetch_add(interactions.len(), Ordering::SeqCst);
    }

    fn on_new_interacted(
        &self,
        trace_id: Uuid,
        action_index: usize,
        targets: &[Arc<Element>],
        _: &Arc<State>,
        _: &Arc<State>,
    ) {
        self.targets.fetch_add(targets.len(), Ordering::SeqCst);
        self.interacted.lock().unwrap().push((trace_id, action_index));
    }
}

#[test]
fn trace_watchers_are_notified_after_each_update() {
    let dir = TempDir::new().unwrap();
    let model = Model::new(quiet_config(&dir)).unwrap();
    let watcher = Arc::new(CountingWatcher::default());
    let trace = model.init_new_trace_with(vec![watcher.clone() as Arc<dyn ModelFeature>]);

    let login = model.update_model(&launch(login_screen()), &trace).unwrap();
    let queue = ExplorationAction::Queue(vec![
        Action::text_insert(input_of(&login).id(), "bob"),
        Action::click(element_with_text(&login, "Login").id()),
    ]);
    model
        .update_model(&result_of(queue, home_screen()), &trace)
        .unwrap();

    let unwatched = model.init_new_trace();
    model.update_model(&launch(login_screen()), &unwatched).unwrap();
    model.wait_for_background();

    assert_eq!(watcher.actions.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.interactions.load(Ordering::SeqCst), 5);
    assert_eq!(watcher.targets.load(Ordering::SeqCst), 2);
    let mut interacted = watcher.interacted.lock().unwrap().clone();
    interacted.sort_by_key(|(_, index)| *index);
    assert_eq!(interacted, vec![(trace.id(), 0), (trace.id(), 1)]);
    assert_eq!(trace.watchers().len(), 1);
    assert!(unwatched.watchers().is_empty());
    model.finish();
}
