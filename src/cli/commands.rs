use std::collections::BTreeSet;

use log::info;
use uuid::Uuid;

use crate::model::config::{LoadMode, LoaderConfig, ModelConfig};
use crate::model::model::Model;
use crate::retention::loader::load_model_outcome;
use crate::screen::screen_model::ActionResult;
use crate::state::identity::ConcreteId;

/// Id sets of a model, used to compare two models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub states: BTreeSet<ConcreteId>,
    pub elements: BTreeSet<ConcreteId>,
    pub traces: BTreeSet<Uuid>,
}

pub fn summarize(model: &Model) -> Result<ModelSummary, Box<dyn std::error::Error>> {
    Ok(ModelSummary {
        states: model.get_states()?.iter().map(|s| s.id()).collect(),
        elements: model.get_elements()?.iter().map(|e| e.id()).collect(),
        traces: model.get_traces().iter().map(|t| t.id()).collect(),
    })
}

// ============================================================================
// record subcommand
// ============================================================================

/// Replay recorded action results into a fresh model and dump it.
pub fn cmd_record(input: &str, config: ModelConfig) -> Result<ModelSummary, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(input)?;
    let model = Model::new(config)?;
    let trace = model.init_new_trace();

    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let result: ActionResult = serde_json::from_str(line)
            .map_err(|e| format!("{}:{}: {}", input, n + 1, e))?;
        let state = model.update_model(&result, &trace)?;
        info!("{} -> {}", result.action.last_kind(), state);
    }

    model.dump_model()?;
    let summary = summarize(&model)?;
    println!(
        "Recorded {} actions: {} states, {} elements in {}",
        trace.size(),
        summary.states.len(),
        summary.elements.len(),
        model.config().model_dir().display()
    );
    model.finish();
    Ok(summary)
}

// ============================================================================
// load subcommand
// ============================================================================

/// Load and summarise a persisted model. Returns whether every trace loaded.
pub fn cmd_load(config: &ModelConfig, loader: &LoaderConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let outcome = load_model_outcome(config, loader)?;
    let summary = summarize(&outcome.model)?;

    println!(
        "Loaded {} traces, {} states, {} elements from {}",
        summary.traces.len(),
        summary.states.len(),
        summary.elements.len(),
        config.model_dir().display()
    );
    for trace in outcome.model.get_traces() {
        let flag = if trace.has_ambiguous_provenance() { " (ambiguous targets)" } else { "" };
        println!("  {} actions={}{}", trace.id(), trace.size(), flag);
    }
    if !outcome.state_mapping.is_empty() || !outcome.element_mapping.is_empty() {
        println!(
            "Remapped {} state ids and {} element ids",
            outcome.state_mapping.len(),
            outcome.element_mapping.len()
        );
    }
    if outcome.is_clean() {
        println!("No failures or warnings");
    }
    for warning in &outcome.warnings {
        println!("  warning: {}", warning);
    }
    for failure in &outcome.failures {
        eprintln!("  failed: {}: {}", failure.file.display(), failure.error);
    }

    let all_loaded = outcome.failures.is_empty();
    outcome.model.finish();
    Ok(all_loaded)
}

// ============================================================================
// verify subcommand
// ============================================================================

/// Load the same model sequentially and in parallel; true when both agree.
pub fn cmd_verify(config: &ModelConfig, loader: &LoaderConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let sequential = load_model_outcome(config, &LoaderConfig {
        mode: LoadMode::Sequential,
        ..loader.clone()
    })?;
    let parallel = load_model_outcome(config, &LoaderConfig {
        mode: LoadMode::Parallel,
        ..loader.clone()
    })?;

    let failures = sequential.failures.len() + parallel.failures.len();
    let same = summarize(&sequential.model)? == summarize(&parallel.model)?;
    sequential.model.finish();
    parallel.model.finish();

    if same && failures == 0 {
        println!("Sequential and parallel loads agree");
    } else if !same {
        println!("Sequential and parallel loads differ");
    } else {
        println!("{} trace(s) failed to load", failures);
    }
    Ok(same && failures == 0)
}
