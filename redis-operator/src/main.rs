//! The Redis operator.

mod app;
mod config;
mod k8s;
mod prom;
mod server;


use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Arc::new(Config::new()?);

    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG config.
        .with(cfg.log_filter()?)
        // Send a copy of all spans to stdout in compact form.
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .compact(),
        )
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let metrics = PrometheusBuilder::new()
        .add_global_label("pod", cfg.pod_name.clone())
        .install_recorder()
        .context("error installing prometheus metrics recorder")?;
    prom::describe_metrics();

    tracing::info!(
        http_port = %cfg.http_port,
        namespace = ?cfg.watch_namespace(),
        requeue_seconds = cfg.requeue_seconds,
        "starting Redis Operator",
    );
    if let Err(err) = App::new(cfg, metrics).await?.spawn().await {
        tracing::error!(error = ?err);
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}
