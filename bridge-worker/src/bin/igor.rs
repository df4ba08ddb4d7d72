//! Worker-face ("Igor") daemon entry point.
//!
//! Initializes tracing and metrics, connects to the hub, and serves the
//! worker face's own HTTP control surface until a shutdown signal arrives.

use std::process::ExitCode;

use bridge_worker::IgorState;
use bridge_worker::config::IgorConfig;
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
    bridge_worker::metrics::describe_metrics();

    let config = IgorConfig::parse();
    tracing::info!(?config, "starting worker face");

    let listen_addr = config.listen_addr;
    let cancellation_token = CancellationToken::new();
    let (state, inbound) = IgorState::new(config, cancellation_token.clone())
        .await
        .context("while building worker face state")?;

    state.spawn_heartbeat(cancellation_token.clone());
    state.spawn_tool_refresh(cancellation_token.clone());
    state.spawn_dispatch_loop(inbound, cancellation_token.clone());

    let router = bridge_worker::api::routes(state, metrics_handle);

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
    tracing::info!("shutdown signal received");
    cancellation_token.cancel();

    let grace = std::time::Duration::from_secs(5);
    state.frank_pool.kill_all(grace);
    for sibling in state.sibling_pool.list() {
        state.sibling_pool.kill(sibling.id, grace);
    }

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
