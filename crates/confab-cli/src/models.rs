//! `confab models` — sync every engine and print what it serves.

use anyhow::Result;
use colored::Colorize;

use confab_core::config::load_config;
use confab_core::types::Model;
use confab_providers::{EngineRegistry, SyncOutcome};

use crate::helpers::mark;

/// Run the models command.
pub async fn run() -> Result<()> {
    let config = load_config(None);
    let mut registry = EngineRegistry::from_config(&config);

    let report = registry.sync_models().await;

    println!();
    println!(
        "{} {}",
        "Models".cyan().bold(),
        format!("({} of {} engines synced)", report.synced(), report.outcomes.len()).dimmed()
    );

    for (engine_id, outcome) in &report.outcomes {
        println!();
        println!("  {} {}", engine_id.bold(), describe(outcome).dimmed());

        let Some(engine) = registry.engine(engine_id) else {
            continue;
        };
        for model in &engine.models {
            println!("    {}", model_line(model));
        }
    }

    println!();
    Ok(())
}

fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Synced { models, filtered: 0 } => format!("{models} models"),
        SyncOutcome::Synced { models, filtered } => {
            format!("{models} models ({filtered} filtered out)")
        }
        SyncOutcome::Offline => "offline".to_string(),
        SyncOutcome::Failed(reason) => format!("sync failed: {reason}"),
        SyncOutcome::NoAdapter => "unsupported provider kind".to_string(),
    }
}

fn model_line(model: &Model) -> String {
    let tools = if model.supports_tools {
        format!("{} tools", mark(true))
    } else {
        String::new()
    };
    match model.declared_output_limit() {
        Some(limit) => format!("{:<40} {tools} {}", model.id, format!("max out {limit}").dimmed()),
        None => format!("{:<40} {tools}", model.id),
    }
}
