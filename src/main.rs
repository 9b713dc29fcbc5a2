//! apim-mcp: MCP server for Azure API Management
//!
//! This tool exposes the management plane of an Azure API Management
//! instance as MCP tools over stdio.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use apim_mcp::azure::{ApimBackend, ApimClient, InMemoryApim};
use apim_mcp::config::{self, Config};
use apim_mcp::mcp::server::McpServer;

/// MCP server for Azure API Management.
///
/// Reads JSON-RPC requests on stdin and writes responses on stdout. Logs go
/// to stderr.
#[derive(Parser, Debug)]
#[command(name = "apim-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Serve from an empty in-memory API Management instance instead of Azure
    #[arg(long)]
    offline: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Everything goes to stderr; stdout carries protocol messages only.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the backend the tools talk to.
fn build_backend(cfg: &Config, offline: bool) -> Result<Arc<dyn ApimBackend>, String> {
    if offline {
        let name = cfg.azure.service_name.as_deref().unwrap_or("in-memory");
        info!(service = name, "Serving from an in-memory instance");
        return Ok(Arc::new(InMemoryApim::new(name)));
    }

    let settings = cfg.azure.resolve().map_err(|e| e.to_string())?;
    let client = ApimClient::new(&settings).map_err(|e| e.to_string())?;

    info!(
        subscription = %settings.subscription_id,
        resource_group = %settings.resource_group,
        service = %settings.service_name,
        "Using Azure API Management"
    );

    Ok(Arc::new(client))
}

/// Entry point for the apim-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };
    cfg.azure.apply_env_overrides(|name| std::env::var(name).ok());

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting apim-mcp server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let backend = match build_backend(&cfg, args.offline) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Cannot reach Azure API Management");
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(backend);

    info!("MCP server ready, waiting for client connection...");

    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
