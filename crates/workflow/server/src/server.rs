//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::AppState;
use crate::config::WorkflowdConfig;
use crate::error::{ServerError, ServerResult};
use crate::seed::SeedFile;
use std::sync::Arc;
use tokio::net::TcpListener;
use workflow_engine::WorkflowOrchestrator;

/// workflowd server
pub struct Server {
    config: WorkflowdConfig,
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl Server {
    /// Build the engine and load the seed file, if any
    pub fn new(config: WorkflowdConfig) -> ServerResult<Self> {
        let orchestrator = Arc::new(WorkflowOrchestrator::new(config.engine.clone()));

        if let Some(path) = &config.seed {
            let loaded = SeedFile::read(path)?.apply(&orchestrator)?;
            tracing::info!(path = %path.display(), definitions = loaded, "Seed file applied");
        }

        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &Arc<WorkflowOrchestrator> {
        &self.orchestrator
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.server.listen_addr;
        let state = AppState::new(self.orchestrator.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "workflowd listening");

        // Stage-entry events are declared here for downstream subsystems
        let mut events = self.orchestrator.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => tracing::info!(
                        application_id = %event.application_id,
                        stage_id = %event.stage_id,
                        stage = %event.stage_name,
                        triggers = event.notification_triggers.len(),
                        "Stage entered"
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Stage-entry event log lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("workflowd shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
