// Draft service entry point.
//
// Startup sequence:
// 1. Load config
// 2. Initialize tracing (log to file)
// 3. Open database
// 4. Build application state (coordinator, negotiator, event bus)
// 5. Re-arm pick clocks for drafts that were mid-flight (crash recovery)
// 6. Bind and spawn the WebSocket server
// 7. Wait for Ctrl+C, then shut down

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use draftroom::app::AppState;
use draftroom::config;
use draftroom::db::Database;
use draftroom::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let cfg = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&cfg.log_dir)?;
    info!(
        "draftroom starting up (port {}, database {})",
        cfg.port, cfg.db_path
    );

    // 3. Open database
    if let Some(parent) = std::path::Path::new(&cfg.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Arc::new(Database::open(&cfg.db_path).context("failed to open database")?);
    info!("database opened at {}", cfg.db_path);

    // 4. Build application state
    let state = Arc::new(AppState::new(db));

    // 5. Crash recovery: in-progress drafts get fresh pick clocks
    match state.coordinator.recover_clocks() {
        Ok(0) => info!("no in-progress drafts to recover"),
        Ok(n) => info!("recovered {n} in-progress draft clock(s)"),
        Err(e) => {
            error!("clock recovery failed: {e}");
            return Err(anyhow::anyhow!(e).context("clock recovery failed"));
        }
    }

    // 6. Bind and spawn the WebSocket server
    let listener = TcpListener::bind(("127.0.0.1", cfg.port))
        .await
        .with_context(|| format!("failed to bind port {}", cfg.port))?;
    let server_state = Arc::clone(&state);
    let server = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, server_state).await {
            error!("WebSocket server error: {e}");
        }
    });
    info!("ready: WebSocket server on 127.0.0.1:{}", cfg.port);

    // 7. Wait for shutdown
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    // Abort the accept loop (it runs forever).
    server.abort();
    info!("draftroom shut down cleanly");
    Ok(())
}

/// Initialize tracing to a log file so stdout stays clean for operators.
fn init_tracing(log_dir: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {log_dir}"))?;
    let log_file = std::fs::File::create(std::path::Path::new(log_dir).join("draftroom.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("draftroom=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
