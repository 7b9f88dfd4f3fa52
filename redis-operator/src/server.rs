use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Router, Server as AxumServer};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;

/// HTTP server for healthchecks & metrics.
pub struct HttpServer {
    /// The application's runtime config.
    config: Arc<Config>,
    /// A channel used for triggering graceful shutdown.
    shutdown: broadcast::Sender<()>,
    /// A handle to the installed metrics recorder.
    metrics: PrometheusHandle,
}

impl HttpServer {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, shutdown: broadcast::Sender<()>, metrics: PrometheusHandle) -> Self {
        Self { config, shutdown, metrics }
    }

    /// Bind the server's listener & spawn it.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let shutdown = self.shutdown.clone();
        let mut http_shutdown_rx = self.shutdown.subscribe();
        let app = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/metrics", get(|State(handle): State<PrometheusHandle>| async move { handle.render() }))
            .with_state(self.metrics);
        let http_server = AxumServer::try_bind(&([0, 0, 0, 0], self.config.http_port).into())
            .context("error binding HTTP server")?
            .serve(app.into_make_service())
            .with_graceful_shutdown(async move {
                let _res = http_shutdown_rx.recv().await;
            });

        Ok(tokio::spawn(async move {
            if let Err(err) = http_server.await {
                tracing::error!(error = ?err, "error from http server, shutting down");
                let _res = shutdown.send(());
            }
        }))
    }
}
