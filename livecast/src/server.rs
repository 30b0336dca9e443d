use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use livecast_api::{create_router, AppState};
use livecast_core::{bootstrap::Services, Config};

/// Owns the HTTP server and the background recording sweeper
pub struct LivecastServer {
    config: Arc<Config>,
    services: Services,
}

impl LivecastServer {
    pub const fn new(config: Arc<Config>, services: Services) -> Self {
        Self { config, services }
    }

    /// Run until SIGINT/SIGTERM or until the HTTP server stops on its own
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let sweeper = self
            .services
            .recordings
            .clone()
            .start_sweeper(self.config.streaming.sweep_interval(), cancel.clone());
        info!(
            interval_seconds = self.config.streaming.sweep_interval_seconds,
            "Recording sweeper started"
        );

        let mut http_handle = self.start_http_server(shutdown_rx).await?;

        tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        let _ = shutdown_tx.send(true);
        cancel.cancel();

        if let Err(e) = sweeper.await {
            error!(error = %e, "Recording sweeper task failed");
        }
        if !http_handle.is_finished() {
            if let Err(e) = http_handle.await {
                error!(error = %e, "HTTP server task failed");
            }
        }

        info!("LiveCast server stopped");
        Ok(())
    }

    async fn start_http_server(&self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let router = create_router(AppState::new(self.services.clone(), self.config.clone()));

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!(error = %e, "HTTP server error");
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
