//! # vigate CLI Entry Point
//!
//! Starts the HTTP gateway from a configuration file, or lists the routes a
//! configuration would register.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the endpoints in gateway.json on loopback
//! vigate serve -c gateway.json
//!
//! # Serve on every interface, preferring port 9000
//! vigate serve -c gateway.json --any --port 9000
//!
//! # Print the configured routes
//! vigate routes -c gateway.json
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vigate_common::{GatewayConfig, ListenScope};
use vigate_server::{ComponentLoader, DispatchServer, HttpEndpoint, TemplateEngine};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// vigate - HTTP GET gateway for component methods
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Routes(RoutesArgs),
}

/// Arguments for running the gateway.
///
/// Flags override the matching `server` settings of the configuration file.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the configured endpoints over HTTP
struct ServeArgs {
    /// path to the gateway configuration file
    #[argh(option, short = 'c')]
    config: PathBuf,

    /// listen on every interface instead of loopback only
    #[argh(switch)]
    any: bool,

    /// preferred port; a free port is used if it is taken
    #[argh(option)]
    port: Option<u16>,

    /// fail runs that take longer than this many milliseconds
    #[argh(option, long = "run-timeout-ms")]
    run_timeout_ms: Option<u64>,

    /// emit logs as JSON lines
    #[argh(switch, long = "log-json")]
    log_json: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "routes")]
/// list the routes a configuration registers
struct RoutesArgs {
    /// path to the gateway configuration file
    #[argh(option, short = 'c')]
    config: PathBuf,
}

fn init_tracing(json: bool) {
    // Default to INFO, RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> Result<GatewayConfig> {
    GatewayConfig::load(path).with_context(|| format!("Invalid configuration {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    match cli.command {
        Commands::Serve(args) => {
            init_tracing(args.log_json);
            run_serve(args).await
        }
        Commands::Routes(args) => run_routes(args),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args);

    if config.endpoints.is_empty() {
        tracing::warn!("No endpoints configured, nothing to serve");
        return Ok(());
    }

    let loader = Arc::new(
        ComponentLoader::new(Arc::new(TemplateEngine::new()))
            .with_run_timeout(config.server.run_timeout()),
    );
    let server = DispatchServer::new(config.server.clone());

    let mut endpoints = Vec::with_capacity(config.endpoints.len());
    for registration in config.endpoints {
        let endpoint = HttpEndpoint::new(
            registration,
            Arc::clone(&loader),
            config.server.conventions.clone(),
        )
        .register(&server)?;
        endpoints.push(endpoint);
    }

    if let Some(addr) = server.local_addr() {
        tracing::info!(%addr, endpoints = endpoints.len(), "Gateway ready");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    for endpoint in &endpoints {
        if !endpoint.unregister(&server) {
            let registration = endpoint.registration();
            tracing::debug!(url = %registration.url_path, method = %registration.method, "Endpoint was not registered");
        }
    }
    server.stop();
    loader.shutdown().await;
    Ok(())
}

fn apply_overrides(config: &mut GatewayConfig, args: &ServeArgs) {
    if args.any {
        config.server.listen = ListenScope::Any;
    }
    if let Some(port) = args.port {
        config.server.use_fixed_port = true;
        config.server.port = port;
    }
    if let Some(ms) = args.run_timeout_ms {
        config.server.run_timeout_ms = Some(ms);
    }
}

fn run_routes(args: RoutesArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    for endpoint in &config.endpoints {
        println!(
            "/{}\t{:?}\t{}\t{}",
            endpoint.url_path.trim_start_matches('/'),
            endpoint.mode,
            endpoint.method,
            endpoint.component.display()
        );
    }
    Ok(())
}
