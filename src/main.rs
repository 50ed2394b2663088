//! toolfleet: supervise a fleet of tool servers and route calls to them.
//!
//! Loads configuration, initializes logging and dispatches to one of the
//! subcommands below. Logs go to stderr and the `toolfleet` daily log file;
//! command output goes to stdout.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use toolfleet::core::transport::shutdown_signal;
use toolfleet::core::{Config, init_logging};
use toolfleet::fleet::{CallRouter, HealthChecker, ServerState, Supervisor};

/// Interval between health sweeps while `start` is supervising.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Supervise a fleet of tool servers and route operation calls to them.
#[derive(Parser, Debug)]
#[command(name = "toolfleet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start one or all tool servers and supervise them until interrupted
    Start {
        /// Server to start; the whole fleet when omitted
        server_id: Option<String>,
    },

    /// Ask a running tool server to shut down
    Stop { server_id: String },

    /// Print the configured fleet
    List,

    /// Start the fleet, route one call, print the result and stop the fleet
    Call {
        operation: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        parameters: String,
    },
}

fn log_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(
        log_level(cli.verbose, &config.logging.level),
        config.logging.directory.as_deref(),
        "toolfleet",
    ) {
        eprintln!("Logging error: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Start { server_id } => start(&config, server_id.as_deref()).await,
        Command::Stop { server_id } => stop(&config, &server_id).await,
        Command::List => {
            list(&config);
            Ok(())
        }
        Command::Call {
            operation,
            parameters,
        } => call(&config, &operation, &parameters).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("toolfleet: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn start(config: &Config, server_id: Option<&str>) -> Result<()> {
    let supervisor = Supervisor::new(&config.fleet);

    let started = match server_id {
        Some(id) => supervisor.start(id).await,
        None => supervisor.start_all().await,
    };
    if let Err(e) = started {
        supervisor.stop_all().await;
        return Err(e.into());
    }

    for server in supervisor.snapshot() {
        if server.state == ServerState::Healthy {
            println!("{:<16} {:<22} pid {}", server.id, server.address, server.pid.unwrap_or_default());
        }
    }
    info!("Supervising; press Ctrl+C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut sweep = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    sweep.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = sweep.tick() => {
                supervisor.check_health().await;
            }
        }
    }

    supervisor.stop_all().await;
    Ok(())
}

/// Stop a server owned by another `toolfleet start` process.
async fn stop(config: &Config, server_id: &str) -> Result<()> {
    let descriptor = config
        .fleet
        .server(server_id)
        .ok_or_else(|| anyhow!("unknown server '{server_id}'"))?;
    let address = descriptor.address();
    let health = HealthChecker::new();

    if !health.responds(&address).await {
        println!("{server_id} is not running");
        return Ok(());
    }

    health
        .request_shutdown(&address)
        .await
        .map_err(|e| anyhow!("'{server_id}': {e}"))?;

    let grace = config.fleet.supervisor.shutdown_grace();
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !health.responds(&address).await {
            println!("{server_id} stopped");
            return Ok(());
        }
        tokio::time::sleep(config.fleet.supervisor.health_backoff()).await;
    }

    bail!("'{server_id}' is still answering on {address} after {grace:?}")
}

fn list(config: &Config) {
    for server in &config.fleet.servers {
        println!(
            "{:<16} {:<16} {:<22} {}",
            server.id,
            server.display_name,
            server.address(),
            server.command.display()
        );
    }
}

async fn call(config: &Config, operation: &str, raw_parameters: &str) -> Result<()> {
    let parameters = match serde_json::from_str::<Value>(raw_parameters)
        .context("parameters are not valid JSON")?
    {
        Value::Object(map) => map,
        other => bail!("parameters must be a JSON object, got {other}"),
    };

    let supervisor = Arc::new(Supervisor::new(&config.fleet));
    supervisor.start_all().await?;

    let outcome = async {
        let router = CallRouter::discover(supervisor.clone(), config.fleet.router.clone())
            .await?
            .with_rpc_path(&config.transport.rpc_path);
        router.call(operation, parameters).await
    }
    .await;

    supervisor.stop_all().await;

    let data = outcome?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
