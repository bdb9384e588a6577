//! kvmcpu-exporter - serves FreeBSD per-CPU time accounting to Prometheus.

mod handlers;
mod state;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use kvmcpu_core::collector::{Scraper, default_registry};
use kvmcpu_core::config::Config;

use state::{AppState, ExporterState};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(name = "kvmcpu-exporter", about = "Per-CPU time accounting exporter", version = kvmcpu_core::VERSION)]
struct Args {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9100", env = "KVMCPU_LISTEN")]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", default_value = "/metrics", env = "KVMCPU_TELEMETRY_PATH")]
    telemetry_path: String,

    /// Comma-separated list of collectors to use.
    #[arg(
        long = "collectors.enabled",
        default_value = "cpu",
        value_delimiter = ',',
        env = "KVMCPU_COLLECTORS"
    )]
    collectors: Vec<String>,

    /// Print the available collectors and exit.
    #[arg(long = "collectors.print")]
    print_collectors: bool,

    /// JSON config file handed to every collector.
    #[arg(long = "config.file", env = "KVMCPU_CONFIG")]
    config_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("kvmcpu_exporter={level},kvmcpu_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if !args.telemetry_path.starts_with('/') || args.telemetry_path == "/" {
        error!(path = %args.telemetry_path, "telemetry path must start with '/' and not be the root");
        process::exit(1);
    }

    let registry = default_registry();
    if args.print_collectors {
        for name in registry.names() {
            println!("{name}");
        }
        return;
    }

    let config = match &args.config_file {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to load config");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let collectors = match registry.build(&config, &args.collectors) {
        Ok(collectors) => collectors,
        Err(e) => {
            error!(error = %e, "failed to build collectors");
            process::exit(1);
        }
    };

    let scraper = match Scraper::new(collectors) {
        Ok(scraper) => scraper,
        Err(e) => {
            error!(error = %e, "failed to create scraper");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    runtime.block_on(async_main(args, scraper));
}

async fn async_main(args: Args, scraper: Scraper) {
    info!(
        version = kvmcpu_core::VERSION,
        collectors = ?scraper.collector_names(),
        "starting kvmcpu-exporter"
    );

    let state: AppState = Arc::new(ExporterState {
        scraper,
        telemetry_path: args.telemetry_path.clone(),
    });

    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(&args.listen_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %args.listen_address, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(address = %args.listen_address, path = %args.telemetry_path, "listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        process::exit(1);
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(&state.telemetry_path, get(handlers::handle_metrics))
        .route("/", get(handlers::handle_index))
        .with_state(state)
        .layer(CompressionLayer::new())
}
