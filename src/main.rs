mod api;
mod audio;
mod backend;
mod config;
mod error;
mod formats;
mod model_store;
mod reconcile;

use std::sync::Arc;

use tracing::info;

use crate::api::{build_router, AppState};
use crate::backend::{build_diarizer, build_transcriber};
use crate::config::AppConfig;
use crate::error::AppError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_diarize_server=info,axum=info".into()),
        )
        .compact()
        .init();

    let cfg = AppConfig::from_env()?;
    // The model download client is blocking and must stay off runtime threads.
    let cfg = tokio::task::spawn_blocking(move || -> Result<AppConfig, AppError> {
        let mut cfg = cfg;
        model_store::ensure_whisper_model(&mut cfg)?;
        Ok(cfg)
    })
    .await??;

    let transcriber = build_transcriber(&cfg)?;
    let diarizer = build_diarizer(&cfg);
    let state = Arc::new(AppState::new(cfg.clone(), transcriber, diarizer));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        model = %cfg.whisper_model,
        backend = ?cfg.backend_kind,
        "starting whisper-diarize-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
