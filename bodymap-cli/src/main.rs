//! # bodymap CLI
//!
//! Validate sync tables and serve requests through the synchronization engine.

mod commands;
mod config;

use anyhow::Context;
use bodymap_types::Value;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bodymap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "bodymap.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the per-tick iteration bound
    #[arg(long, env = "BODYMAP_MAX_ITERATIONS")]
    max_iterations: Option<usize>,

    /// Dispatch firings one at a time
    #[arg(long)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate the sync table against the registered concepts
    Check {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Serve a single request
    Request {
        /// Request path (e.g. /auth/register)
        path: String,

        /// Request fields as key=value; values parse as JSON, else as text
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,

        /// Print the causal trace of the tick
        #[arg(long)]
        trace: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Serve a sequence of requests from a YAML file against one engine
    Script {
        /// YAML list of request records
        file: PathBuf,

        /// Print the causal trace of each tick
        #[arg(long)]
        trace: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    if key.is_empty() {
        return Err(format!("empty field name in `{}`", raw));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config::CliConfig::load_or_default(&cli.config)?
        .with_overrides(cli.max_iterations, cli.sequential);
    config
        .engine
        .validate()
        .context("Invalid engine configuration")?;

    match cli.command {
        Commands::Check { json } => commands::check_syncs(&config, json),
        Commands::Request {
            path,
            fields,
            trace,
            json,
        } => commands::serve_request(&config, &path, fields, trace, json).await,
        Commands::Script { file, trace, json } => {
            commands::run_script(&config, &file, trace, json).await
        }
    }
}
