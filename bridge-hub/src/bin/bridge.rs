//! Hub daemon entry point.
//!
//! Initializes tracing and metrics, builds the hub's shared state from
//! configuration, and serves the combined WebSocket/HTTP surface until a
//! shutdown signal arrives, then drains in-flight connections before exit.

use std::process::ExitCode;

use bridge_hub::config::HubConfig;
use bridge_hub::HubState;
use clap::Parser;
use eyre::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("while installing the prometheus recorder")?;
    bridge_hub::metrics::describe_metrics();

    let config = HubConfig::parse();
    tracing::info!(?config, "starting bridge hub");

    let drain_timeout = config.drain_timeout;
    let listen_addr = config.listen_addr;
    let state = HubState::new(config);

    let cancellation_token = CancellationToken::new();
    state.spawn_maintenance(cancellation_token.clone());

    let router = bridge_hub::api::routes(state.clone(), metrics_handle);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("while binding to {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "listening");

    let shutdown_token = cancellation_token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    cancellation_token.cancel();
    state.connections.drain(drain_timeout).await;
    state.doctors.kill_all(drain_timeout);

    match server.await {
        Ok(Ok(())) => {
            tracing::info!("server shut down cleanly");
            Ok(ExitCode::SUCCESS)
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "server exited with an error");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            tracing::error!(error = %err, "server task panicked");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
