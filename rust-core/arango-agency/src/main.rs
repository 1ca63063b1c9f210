// SPDX-License-Identifier: PMPL-1.0-or-later
//! agencyctl: command-line access to an agency.
//!
//! Endpoints and credentials come from the environment (`AGENCY_ENDPOINTS`,
//! `AGENCY_JWT` or `AGENCY_USERNAME`/`AGENCY_PASSWORD`, ...) unless
//! `--endpoint` is given. Log verbosity follows `RUST_LOG`.

use std::process::ExitCode;
use std::time::Duration;

use arango_agency::{
    are_agents_healthy, probe_agents, Agency, AgencyConfig, HealthCheckOptions, Key,
};
use arango_connection::ConnectionConfig;
use clap::{Parser, Subcommand};
use serde_json::Value;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "agencyctl", version, about = "Read, write and health-check an agency")]
struct Cli {
    /// Agent endpoint; repeat for several. Overrides `AGENCY_ENDPOINTS`.
    #[arg(long = "endpoint", global = true)]
    endpoints: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the JSON value at a key, e.g. `/arango/Plan/Version`.
    Read { key: String },
    /// Set a key to a JSON value.
    Write {
        key: String,
        /// JSON value; bare words are written as strings.
        value: String,
        /// Expire the key after this many seconds.
        #[arg(long)]
        ttl: Option<u64>,
        /// Only write if the key does not exist.
        #[arg(long)]
        if_empty: bool,
    },
    /// Delete a key.
    Remove { key: String },
    /// Probe every endpoint as a separate agent and check leadership.
    Health {
        #[arg(long)]
        allow_no_leader: bool,
        #[arg(long)]
        allow_different_leaders: bool,
        /// Print each agent's classification.
        #[arg(long)]
        verbose: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut connection = ConnectionConfig::from_env()?;
    if !cli.endpoints.is_empty() {
        connection.endpoints = cli.endpoints;
    }
    let config = AgencyConfig::from_env()?;

    match cli.command {
        Command::Read { key } => {
            let agency = Agency::connect(connection, config)?;
            let value = agency.read_value(Key::parse(&key)).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Write {
            key,
            value,
            ttl,
            if_empty,
        } => {
            let agency = Agency::connect(connection, config)?;
            let value = parse_value(&value);
            let ttl = ttl.map(Duration::from_secs);
            let key = Key::parse(&key);
            if if_empty {
                agency.write_key_if_empty(key, &value, ttl).await?;
            } else {
                agency.write_key(key, &value, ttl).await?;
            }
        }
        Command::Remove { key } => {
            let agency = Agency::connect(connection, config)?;
            agency.remove_key(Key::parse(&key)).await?;
        }
        Command::Health {
            allow_no_leader,
            allow_different_leaders,
            verbose,
        } => {
            let mut options = HealthCheckOptions::default();
            options.allow_no_leader = allow_no_leader;
            options.allow_different_leader_endpoints = allow_different_leaders;

            let clients = connection
                .endpoints
                .iter()
                .map(|endpoint| {
                    let single = ConnectionConfig {
                        endpoints: vec![endpoint.clone()],
                        ..connection.clone()
                    };
                    Agency::connect(single, config.clone())
                })
                .collect::<Result<Vec<_>, _>>()?;

            if verbose {
                for agent in probe_agents(&clients, &options).await.agents {
                    println!(
                        "{}\tleader={}\tresponding={}\tleader_endpoint={}",
                        agent.endpoint,
                        agent.is_leader,
                        agent.is_responding,
                        agent.leader_endpoint.as_deref().unwrap_or("-"),
                    );
                }
            }
            are_agents_healthy(&clients, &options).await?;
            println!("healthy ({} agents)", clients.len());
        }
    }
    Ok(())
}

/// Parse a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
