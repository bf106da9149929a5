//! Serve a scripted sequence of requests against one engine.
//!
//! A script is a YAML list of request records. A string value of the form
//! `$field` is replaced by `field` from the most recent response carrying it,
//! so later requests can reuse sessions or user ids issued earlier:
//!
//! ```yaml
//! - { path: /auth/register, username: alice, password: pw }
//! - { path: /auth/login, username: alice, password: pw }
//! - { path: /auth/whoami, session: $session }
//! ```

use super::request::ServedSummary;
use crate::config::CliConfig;
use anyhow::{anyhow, Context, Result};
use bodymap_concepts::App;
use bodymap_types::Record;
use std::path::Path;

fn resolve(step: usize, input: Record, responses: &[Record]) -> Result<Record> {
    input
        .into_iter()
        .map(|(field, value)| {
            let value = match value.as_str().and_then(|s| s.strip_prefix('$')) {
                Some(name) => responses
                    .iter()
                    .rev()
                    .find_map(|response| response.get(name).cloned())
                    .ok_or_else(|| {
                        anyhow!("step {}: no earlier response carries `{}`", step + 1, name)
                    })?,
                None => value,
            };
            Ok((field, value))
        })
        .collect()
}

pub async fn run_script(config: &CliConfig, file: &Path, trace: bool, json: bool) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script {}", file.display()))?;
    let steps: Vec<Record> = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse script {}", file.display()))?;

    let table = config.sync_table()?;
    let app = App::new(&table, config.engine.clone()).context("Failed to start engine")?;

    let mut responses = Vec::new();
    let mut served_all = Vec::with_capacity(steps.len());
    for (step, input) in steps.into_iter().enumerate() {
        let input = resolve(step, input, &responses)?;
        let served = app
            .request(input)
            .await
            .with_context(|| format!("step {} failed", step + 1))?;
        if let Some(response) = &served.response {
            responses.push(response.clone());
        }
        served_all.push(served);
    }

    let summaries: Vec<ServedSummary<'_>> = served_all
        .iter()
        .map(|served| ServedSummary::new(served, trace))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            summary.print_text();
        }
        let metrics = app.engine.metrics();
        println!(
            "{} requests, {} ticks completed, {} firings",
            summaries.len(),
            metrics.ticks_completed,
            metrics.firings
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodymap_types::record;
    use serde_json::json;

    #[test]
    fn test_resolve_uses_latest_response() {
        let responses = vec![
            record([("session", json!("s1"))]),
            record([("session", json!("s2")), ("user", json!("u1"))]),
        ];
        let input = record([("path", json!("/auth/whoami")), ("session", json!("$session"))]);
        let resolved = resolve(0, input, &responses).unwrap();
        assert_eq!(resolved["session"], json!("s2"));
        assert_eq!(resolved["path"], json!("/auth/whoami"));
    }

    #[test]
    fn test_resolve_missing_reference() {
        let input = record([("session", json!("$session"))]);
        let err = resolve(2, input, &[]).unwrap_err();
        assert!(err.to_string().contains("step 3"));
    }
}
