//! Homepulse
//!
//! Host telemetry and service liveness for a self-hosted dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Homepulse                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Telemetry   │───▶│  Dashboard   │◀───│   Liveness   │       │
//! │  │   Sampler    │    │     API      │    │    Prober    │       │
//! │  │ (on demand)  │    │   (hyper)    │    │   (timer)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use homepulse::api::{self, AppState};
use homepulse::error::{Error, Result};
use homepulse::liveness::{HttpProbe, LivenessProber, ProberConfig};
use homepulse::sampling::{SamplerConfig, SamplingMode, TelemetrySampler};
use homepulse::targets::{FileTargetStore, StaticTargetStore, TargetStore};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Homepulse - host telemetry and service liveness for a homelab dashboard
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the dashboard API to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for the dashboard API
    #[arg(
        long,
        env = "PORT",
        default_value = "8080",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,

    /// Name shown on the dashboard
    #[arg(long, env = "SERVER_NAME", default_value = "homelab")]
    server_name: String,

    /// Telemetry mode (auto, mock, real); unknown values mean auto
    #[arg(long, env = "METRICS_MODE", default_value = "auto")]
    metrics_mode: String,

    /// Mount path whose filesystem usage is reported
    #[arg(long, env = "DISK_MOUNT", default_value = "/")]
    disk_mount: String,

    /// procfs root to read host counters from
    #[arg(long, env = "PROC_ROOT", default_value = "/proc")]
    proc_root: PathBuf,

    /// JSON file with the monitored targets (built-in list when unset)
    #[arg(long, env = "APPS_FILE")]
    apps_file: Option<PathBuf>,

    /// Seconds between liveness rounds (minimum 5)
    #[arg(long, env = "APPS_PING_INTERVAL_SEC", default_value = "30")]
    apps_ping_interval_sec: u64,

    /// Per-target probe timeout in milliseconds (minimum 500)
    #[arg(long, env = "APPS_PING_TIMEOUT_MS", default_value = "3000")]
    apps_ping_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);
    let addr = listen_addr(&args.host, args.port)?;

    info!("Starting Homepulse");
    info!("  Server name: {}", args.server_name);
    info!("  Metrics mode: {}", args.metrics_mode);
    info!("  Disk mount: {}", args.disk_mount);

    // Telemetry sampler
    let sampler = Arc::new(TelemetrySampler::new(SamplerConfig {
        mode: SamplingMode::parse_or_auto(&args.metrics_mode),
        disk_mount: args.disk_mount.clone(),
        proc_root: args.proc_root.clone(),
        ..Default::default()
    }));

    // Target store
    let store: Arc<dyn TargetStore> = match &args.apps_file {
        Some(path) => {
            info!("  Apps file: {}", path.display());
            Arc::new(FileTargetStore::new(path.clone()))
        }
        None => {
            info!("  Apps file: none, using built-in targets");
            Arc::new(StaticTargetStore::homelab_defaults())
        }
    };

    // Liveness prober
    let prober_config =
        ProberConfig::from_settings(args.apps_ping_interval_sec, args.apps_ping_timeout_ms);
    let probe = Arc::new(HttpProbe::new()?);
    let prober = LivenessProber::new(prober_config, Arc::clone(&store), probe);
    let prober_handle = prober.start();

    // Dashboard API
    let state = AppState::new(sampler, prober.cache(), store, args.server_name.clone())
        .with_proc_root(args.proc_root.clone());
    let shutdown = CancellationToken::new();

    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(addr, state, api_shutdown).await {
            error!("Dashboard API error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = api_handle => {
            error!("Dashboard API stopped unexpectedly");
        }
    }

    prober.shutdown();
    shutdown.cancel();
    if let Err(e) = prober_handle.await {
        error!("Liveness prober task failed: {}", e);
    }

    info!("Homepulse shutdown complete");
    Ok(())
}

/// Bind address from a bare IPv4/IPv6 host (brackets optional) and port
fn listen_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = bare
        .parse()
        .map_err(|e| Error::Config(format!("Invalid HOST {}: {}", host, e)))?;
    Ok(SocketAddr::new(ip, port))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
