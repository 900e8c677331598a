//! Switchboard Daemon
//!
//! Standalone process serving one model family over the message bus.
//! Producers connect via the Unix-socket bridge, publish requests, and
//! subscribe to their reply queues.
//!
//! # Usage
//!
//! ```bash
//! # Serve the seq2seq family with defaults
//! switchboard-daemon
//!
//! # Serve the causal family against a custom engine sidecar
//! SWITCHBOARD_MODEL_FAMILY=causal \
//! SWITCHBOARD_ENGINE_URL=http://127.0.0.1:9920 \
//! switchboard-daemon
//!
//! # With verbose logging
//! RUST_LOG=debug switchboard-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `SWITCHBOARD_MODEL_FAMILY`: `seq2seq` (default) or `causal`
//! - `SWITCHBOARD_MODEL_NAME`: queue-name prefix (defaults per family)
//! - `SWITCHBOARD_MODEL_ID` / `SWITCHBOARD_TOKENIZER_ID`: engine identifiers
//! - `SWITCHBOARD_CONTEXT_DEPTH`: history turns included in prompts
//! - `SWITCHBOARD_MAX_TOKENS`: generation length bound
//! - `SWITCHBOARD_NUM_PARALLEL_PROCESSES`: ask-queue worker count
//! - `SWITCHBOARD_NUM_THREADS_PER_PROCESS`: engine intra-call threads
//! - `SWITCHBOARD_ENGINE_URL`: inference sidecar base URL
//! - `SWITCHBOARD_SOCKET`: bridge socket path
//! - `SWITCHBOARD_SKIP_WARMUP`: defer model load to the first request
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! SIGTERM/SIGINT trigger a graceful shutdown (socket and PID file removed).

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

use llm_switchboard::transport::BridgeServer;
use llm_switchboard::{backend, Dispatcher, HttpEngine, InProcessBus, MessageBus, ServiceConfig};

/// Default PID file path, next to the bridge socket.
fn pid_path(socket_path: &std::path::Path) -> PathBuf {
    socket_path.with_file_name("switchboard.pid")
}

fn write_pid_file(path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let pid = std::process::id();
    let mut file = fs::File::create(path)?;
    writeln!(file, "{pid}")?;
    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

fn remove_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("llm_switchboard=info".parse()?)
                .add_directive("switchboard_daemon=info".parse()?),
        )
        .with_target(true)
        .init();

    let config = ServiceConfig::from_env();
    info!(
        model = %config.model_name,
        family = ?config.model_family,
        engine = %config.engine_url,
        "Starting switchboard daemon"
    );

    let pid_file = pid_path(&config.socket_path);
    write_pid_file(&pid_file)
        .with_context(|| format!("failed to write PID file at {pid_file:?}"))?;

    // Engine handles are cheap clients; the heavy load happens in warmup.
    let engine = Arc::new(
        HttpEngine::new(&config.engine_url).context("failed to construct engine client")?,
    );
    if !engine.health_check().await {
        warn!(engine = %config.engine_url, "Engine sidecar not reachable yet");
    }

    let model = backend::for_family(&config, engine.clone(), engine);

    if config.warmup_on_start {
        // Weight/tokenizer load failure is fatal; supervision restarts us.
        model.warmup().await.map_err(|e| {
            remove_pid_file(&pid_file);
            anyhow::anyhow!("model warmup failed, aborting: {e}")
        })?;
        info!(model = %model.name(), "Model warmed up");
    }

    let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
    let dispatcher = Dispatcher::new(model, Arc::clone(&bus), config.clone());
    let workers = dispatcher.start().await?;

    let bridge = BridgeServer::new(config.socket_path.clone(), bus);
    let shutdown = Arc::new(Notify::new());

    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received Ctrl+C, shutting down"),
            () = terminate => info!("Received SIGTERM, shutting down"),
        }
        signal_shutdown.notify_one();
    });

    let result = bridge.run(shutdown).await;

    for worker in workers {
        worker.abort();
    }
    remove_pid_file(&pid_file);
    result.context("bridge server failed")?;

    info!("Switchboard daemon stopped cleanly");
    Ok(())
}
