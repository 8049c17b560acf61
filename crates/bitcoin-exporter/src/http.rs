// Numan Thabit 2025
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::collector::Collector;

#[derive(Clone)]
struct AppState {
    collector: Arc<Collector>,
}

pub async fn serve(bind: SocketAddr, collector: Arc<Collector>) -> Result<()> {
    let state = AppState { collector };

    let router = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/targets", get(targets_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    info!(bind = %bind, "HTTP server listening");
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind metrics listener on {bind}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Each scrape triggers (or joins) one collection pass. A total outage
/// of backing nodes still renders a 200 with all-down indicators.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.collector.scrape().await;
    match snapshot.render() {
        Ok(body) => ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn targets_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.collector.latest();
    Json(snapshot.reports.clone())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for interrupt signal");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received; terminating http server");
}
