//! Prevoir: Clinical prediction service.
//!
//! Main entry point for the HTTP server.

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prevoir::adapters::sanitize::SanitizingMakeWriter;
use prevoir::adapters::{RunnerConfig, SqliteStorage, SubprocessRunner};
use prevoir::api;
use prevoir::application::PredictionService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    //
    // Default behavior:
    // - interactive TTY: log to stdout
    // - non-interactive (service deployment): log to a file so stdout stays
    //   clean for the supervisor, unless overridden
    let log_mode = std::env::var("PREVOIR_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let interactive = std::io::stdout().is_terminal();
    let use_file = match log_mode.as_str() {
        "file" => true,
        "stdout" => false,
        // auto
        _ => !interactive,
    };

    let (writer, _guard) = if use_file {
        let log_file = std::env::var("PREVOIR_LOG_FILE")
            .unwrap_or_else(|_| "/app/data/prevoir.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    tracing::info!("Starting prevoir...");

    let db_path =
        std::env::var("PREVOIR_DB_PATH").unwrap_or_else(|_| "prevoir.db".to_string());
    let storage = SqliteStorage::new(&db_path)
        .with_context(|| format!("opening database at {db_path}"))?;

    let mut runner_config = RunnerConfig::default();
    if let Ok(python) = std::env::var("PREVOIR_PYTHON") {
        runner_config.interpreter = python.into();
    }
    if let Ok(dir) = std::env::var("PREVOIR_SCRIPTS_DIR") {
        runner_config.scripts_dir = dir.into();
    }
    if let Ok(dir) = std::env::var("PREVOIR_MODELS_DIR") {
        runner_config.models_dir = dir.into();
    }
    let runner = SubprocessRunner::new(runner_config);

    let service = Arc::new(PredictionService::new(Arc::new(runner), Arc::new(storage)));
    let app = api::router(service);

    let addr = std::env::var("PREVOIR_LISTEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("prevoir listening on http://{addr}");
    axum::serve(listener, app).await?;

    tracing::info!("prevoir shutdown complete.");
    Ok(())
}
