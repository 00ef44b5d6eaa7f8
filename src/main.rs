//! `tspx` — HTTP fan-out proxy for MPEG transport streams.
//!
//! Pulls each configured stream from its upstream source once and fans
//! it out to any number of concurrent HTTP subscribers, dropping slow
//! subscribers rather than ever blocking the upstream read.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tspx::{App, ProcessConfig};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility).
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

#[derive(Parser)]
#[command(name = "tspx")]
#[command(version)]
#[command(about = "HTTP fan-out proxy for MPEG transport streams")]
struct Cli {
    /// Path to the JSON process configuration file.
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = ProcessConfig::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let listen_addr = config.listen_addr;

    register_signal_handlers()?;

    let app = Arc::new(App::start(config));
    app.spawn_stats_tick();

    let router = tspx::observability::router(Arc::clone(&app));
    let listener = tokio::net::TcpListener::bind(listen_addr).await.with_context(|| format!("binding {listen_addr}"))?;
    log::info!("tspx listening on {listen_addr} with {} stream(s)", app.streams.len());

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("serving HTTP")?;

    log::info!("tspx shutting down");
    Ok(())
}

fn register_signal_handlers() -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;
    Ok(())
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_FLAG.load(std::sync::atomic::Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}
