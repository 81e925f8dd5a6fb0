use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use rag_metrics::config::{CliArgs, ServerConfig};
use rag_metrics::error::MetricsError;
use rag_metrics::metrics::engine::MetricsEngine;
use rag_metrics::metrics::CalculationRequest;
use rag_metrics::server;
use rag_metrics::settings::{load_settings, save_settings, PersistentSettings};
use rag_metrics::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(args.log_file.as_deref());

    info!("Starting rag-metrics v{}", env!("CARGO_PKG_VERSION"));
    let config = ServerConfig::from_args(args);
    info!("Settings file: {:?}", config.settings_path);

    let settings = load_settings(&config.settings_path).resolve();
    if config.write_settings {
        save_settings(&config.settings_path, &PersistentSettings::from(&settings))?;
        info!("Wrote settings to {:?}", config.settings_path);
        return Ok(ExitCode::SUCCESS);
    }
    info!(
        "Encoder: {:?}, batch size {}, {} workers",
        settings.encoder, settings.batch_size, settings.workers
    );

    let engine = MetricsEngine::from_settings(settings)?
        .with_default_metrics(config.default_metrics.clone());

    if let Some(path) = &config.calculate {
        return run_once(&engine, path).await;
    }

    let state = Arc::new(AppState::new(engine));
    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("Listening on http://{}", config.bind_addr());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(ExitCode::SUCCESS)
}

/// Stderr logging, plus a non-blocking file writer when requested. The
/// returned guard flushes the file on drop.
fn init_tracing(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rag_metrics=info,tower_http=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "rag-metrics.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Score one request file and print the result JSON to stdout. Rejected
/// datasets exit with status 2.
async fn run_once(engine: &MetricsEngine, path: &Path) -> anyhow::Result<ExitCode> {
    let content = tokio::fs::read_to_string(path).await?;
    let request: CalculationRequest = serde_json::from_str(&content)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling calculation");
            let _ = stop_tx.send(true);
        }
    });

    match engine.calculate(&request, stop_rx).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(MetricsError::Validation(errors)) => {
            for e in &errors {
                error!("{}", e);
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "valid": false,
                    "errors": errors,
                }))?
            );
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            error!("Calculation failed: {}", e);
            if let MetricsError::Processing { detail, .. } = &e {
                error!("Detail: {}", detail);
            }
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
