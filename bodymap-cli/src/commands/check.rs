//! Validate a sync table against the reference concepts.

use crate::config::CliConfig;
use anyhow::{Context, Result};
use bodymap_concepts::App;
use serde::Serialize;

#[derive(Serialize)]
struct SyncSummary {
    id: String,
    when: Vec<String>,
    where_steps: usize,
    then: Vec<String>,
}

#[derive(Serialize)]
struct CheckSummary {
    syncs: usize,
    max_iterations: usize,
    dispatch: tock::DispatchMode,
    rules: Vec<SyncSummary>,
}

/// Compile every sync against the registry and list what was loaded.
pub fn check_syncs(config: &CliConfig, json: bool) -> Result<()> {
    let table = config.sync_table()?;
    let app = App::new(&table, config.engine.clone()).context("Sync table failed validation")?;

    let rules: Vec<SyncSummary> = app
        .engine
        .syncs()
        .map(|rule| SyncSummary {
            id: rule.id.to_string(),
            when: rule.when.iter().map(|p| p.action.to_string()).collect(),
            where_steps: rule.where_steps.len(),
            then: rule.then.iter().map(|t| t.action.to_string()).collect(),
        })
        .collect();

    let summary = CheckSummary {
        syncs: rules.len(),
        max_iterations: config.engine.max_iterations,
        dispatch: config.engine.dispatch,
        rules,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Sync table OK: {} syncs (max_iterations {}, {:?} dispatch)",
            summary.syncs, summary.max_iterations, summary.dispatch
        );
        for rule in &summary.rules {
            let where_note = if rule.where_steps > 0 {
                format!(" where[{}]", rule.where_steps)
            } else {
                String::new()
            };
            println!(
                "- {}: {}{} -> {}",
                rule.id,
                rule.when.join(" & "),
                where_note,
                rule.then.join(", ")
            );
        }
    }

    Ok(())
}
