//! HTTP exposition: `/metrics`, `/health`, `/`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use tokio::sync::{Mutex, RwLock};
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

use crate::collector::{Orchestrator, ScrapeReport};
use crate::executor::QueryExecutor;
use crate::registry::MetricRegistry;

const INDEX_PAGE: &str = r#"<html>
<head><title>SQL Server Exporter</title></head>
<body>
<h1>SQL Server Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Last scrape</a></p>
</body>
</html>
"#;

/// Error type for the HTTP layer.
#[derive(Debug)]
pub enum ServerError {
    /// Failed to bind the listen address.
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// The server stopped with an I/O error.
    Serve(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "failed to bind {}: {}", addr, source),
            ServerError::Serve(e) => write!(f, "server error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Serve(e) => Some(e),
        }
    }
}

/// Everything a request handler needs.
pub struct AppState<E> {
    registry: MetricRegistry,
    orchestrator: Orchestrator,
    // Held for a whole pass, so concurrent scrapes queue up.
    executor: Mutex<E>,
    last_report: RwLock<Option<ScrapeReport>>,
}

pub type SharedState<E> = Arc<AppState<E>>;

impl<E: QueryExecutor> AppState<E> {
    pub fn new(registry: MetricRegistry, orchestrator: Orchestrator, executor: E) -> Self {
        Self {
            registry,
            orchestrator,
            executor: Mutex::new(executor),
            last_report: RwLock::new(None),
        }
    }

    /// Runs one pass, waiting for any pass already in progress.
    pub async fn scrape(&self) -> ScrapeReport {
        let report = {
            let mut executor = self.executor.lock().await;
            self.orchestrator.collect(&mut *executor).await
        };
        *self.last_report.write().await = Some(report.clone());
        report
    }

    pub async fn last_report(&self) -> Option<ScrapeReport> {
        self.last_report.read().await.clone()
    }
}

pub fn router<E: QueryExecutor + 'static>(state: SharedState<E>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/metrics", get(handle_metrics::<E>))
        .route("/health", get(handle_health::<E>))
        .with_state(state)
        .layer(CompressionLayer::new())
}

/// Serves until Ctrl-C or SIGTERM.
pub async fn serve<E: QueryExecutor + 'static>(
    addr: SocketAddr,
    state: SharedState<E>,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn handle_metrics<E: QueryExecutor + 'static>(
    State(state): State<SharedState<E>>,
) -> Response {
    // Detached so a client hanging up does not cancel a query mid-flight.
    let task_state = state.clone();
    if let Err(e) = tokio::spawn(async move { task_state.scrape().await }).await {
        error!(error = %e, "scrape task failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "scrape failed\n").into_response();
    }

    match state.registry.encode_text() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn handle_health<E: QueryExecutor + 'static>(
    State(state): State<SharedState<E>>,
) -> Json<Option<ScrapeReport>> {
    Json(state.last_report().await)
}
