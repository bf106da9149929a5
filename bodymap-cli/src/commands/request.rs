//! Serve one request through the engine.

use crate::config::CliConfig;
use anyhow::{bail, Context, Result};
use bodymap_concepts::{App, Served};
use bodymap_types::{Record, Value};
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct ServedSummary<'a> {
    pub request: &'a str,
    pub response: Option<&'a Record>,
    pub occurrences: usize,
    pub rounds: usize,
    pub fired: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl<'a> ServedSummary<'a> {
    pub fn new(served: &'a Served, trace: bool) -> Self {
        Self {
            request: &served.request,
            response: served.response.as_ref(),
            occurrences: served.report.len(),
            rounds: served.report.rounds,
            fired: served
                .report
                .fired_syncs()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            trace: trace.then(|| served.report.render_trace()),
        }
    }

    pub fn print_text(&self) {
        println!(
            "Request {} ({} occurrences, {} rounds)",
            self.request, self.occurrences, self.rounds
        );
        if !self.fired.is_empty() {
            println!("  fired: {}", self.fired.join(", "));
        }
        match self.response {
            Some(response) => {
                for (field, value) in response {
                    println!("  {}: {}", field, value);
                }
            }
            None => println!("  (no response)"),
        }
        if let Some(trace) = &self.trace {
            println!("{}", trace);
        }
    }
}

/// Open a request on `path` with the given fields and print its response.
pub async fn serve_request(
    config: &CliConfig,
    path: &str,
    fields: Vec<(String, Value)>,
    trace: bool,
    json: bool,
) -> Result<()> {
    let table = config.sync_table()?;
    let app = App::new(&table, config.engine.clone()).context("Failed to start engine")?;

    let mut input: Record = fields.into_iter().collect();
    input.insert("path".to_string(), Value::String(path.to_string()));

    let served = app
        .request(input)
        .await
        .with_context(|| format!("Request to {} failed", path))?;
    let summary = ServedSummary::new(&served, trace);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print_text();
    }

    if served.response.is_none() {
        bail!("no sync responded to request {} on {}", served.request, path);
    }
    Ok(())
}
