//! meshroute command line
//!
//! Dispatches support tickets through the standard stage registry and prints
//! each ticket's outcome as JSON on stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use meshroute::config::MeshConfig;
use meshroute::dispatch::Dispatcher;
use meshroute::observability::{init_default_logging, metrics};
use meshroute::protocol::{Envelope, Payload};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Dynamic route mutation and dispatch for support tickets
#[derive(Parser)]
#[command(name = "meshroute")]
#[command(about = "Route support tickets through a self-rewriting stage mesh")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "MESHROUTE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wrap ticket payloads in the configured initial route and dispatch them
    Route {
        /// JSON file holding one ticket object or an array of them
        #[arg(long, value_name = "FILE")]
        ticket: PathBuf,

        /// Print a metrics snapshot after the outcomes
        #[arg(long)]
        metrics: bool,
    },
    /// Dispatch a wire envelope `{"payload": {...}, "route": {...}}`
    Envelope {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Route { ticket, metrics } => route_tickets(&config, &ticket, metrics).await,
        Commands::Envelope { file } => dispatch_envelope(&config, &file).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> CliResult<MeshConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(MeshConfig::load_from_file(path)?);
    }

    for candidate in ["meshroute.toml", "config/meshroute.toml"] {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(MeshConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(MeshConfig::default())
}

async fn route_tickets(config: &MeshConfig, ticket_file: &Path, show_metrics: bool) -> CliResult<()> {
    let content = std::fs::read_to_string(ticket_file)?;
    let tickets = match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => items,
        single => vec![single],
    };

    let initial_route = config.dispatch.initial_stages()?;
    let envelopes = tickets
        .into_iter()
        .map(|ticket| Ok(Envelope::for_ticket(Payload::from_value(ticket)?, &initial_route)?))
        .collect::<CliResult<Vec<_>>>()?;

    info!(tickets = envelopes.len(), mesh_id = %config.mesh.id, "Routing tickets");
    let outcomes = Dispatcher::from_config(config).dispatch_all(envelopes).await;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    if show_metrics {
        println!("{}", serde_json::to_string_pretty(&metrics().get_metrics())?);
    }
    Ok(())
}

async fn dispatch_envelope(config: &MeshConfig, file: &Path) -> CliResult<()> {
    let envelope = Envelope::from_json(&std::fs::read_to_string(file)?)?;
    let outcome = Dispatcher::from_config(config).dispatch(envelope).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn handle_config_command(config: &MeshConfig, show: bool) -> CliResult<()> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
