//! HTTP surface of the agent: `/execute`, `/health`, `/ready`, plus listener
//! lifecycle.

pub mod execute;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{AgentConfig, READ_TIMEOUT, SHUTDOWN_GRACE, WRITE_TIMEOUT};
use crate::env::EnvBaseline;
use crate::models::ProbeStatus;
use crate::supervisor::Supervisor;

/// Shared, read-only state handed to every request.
#[derive(Debug, Clone)]
pub struct AppState {
    baseline: Arc<EnvBaseline>,
    working_root: Arc<PathBuf>,
    supervisor: Supervisor,
    read_timeout: Duration,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(baseline: EnvBaseline, working_root: impl Into<PathBuf>) -> Self {
        Self {
            baseline: Arc::new(baseline),
            working_root: Arc::new(working_root.into()),
            supervisor: Supervisor::default(),
            read_timeout: READ_TIMEOUT,
            request_timeout: WRITE_TIMEOUT,
        }
    }

    /// Bound on receiving a complete `/execute` body.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bound on producing a response; an expired request gets 408 while its
    /// command runs on to its own deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn baseline(&self) -> &EnvBaseline {
        &self.baseline
    }

    pub fn working_root(&self) -> &PathBuf {
        &self.working_root
    }
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = state.request_timeout;
    Router::new()
        .route("/execute", post(execute::execute))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

async fn health() -> Json<ProbeStatus> {
    Json(ProbeStatus::healthy())
}

async fn ready() -> Json<ProbeStatus> {
    Json(ProbeStatus::ready())
}

/// Bind the loopback listener and serve until SIGTERM/SIGINT.
pub async fn run(config: AgentConfig) -> Result<()> {
    let shutdown = shutdown_signal()?;
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let state = AppState::new(EnvBaseline::capture(), config.working_root.clone());
    info!(
        %addr,
        working_root = %config.working_root.display(),
        baseline_vars = state.baseline().len(),
        "executor agent listening"
    );

    serve(listener, create_app(state), shutdown, SHUTDOWN_GRACE).await
}

/// Serve `app` on `listener` until `shutdown` resolves, then give in-flight
/// requests up to `grace` to finish before abandoning them.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F, grace: Duration) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (trigger, triggered) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = triggered.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("server task panicked")?.context("server error")?;
            return Ok(());
        }
        _ = shutdown => {}
    }

    info!(grace_ms = grace.as_millis() as u64, "shutting down, draining in-flight requests");
    let _ = trigger.send(());

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined.context("server task panicked")?.context("server error")?;
            info!("shutdown complete");
        }
        Err(_) => {
            warn!("in-flight requests still running after grace period, abandoning them");
            server.abort();
        }
    }
    Ok(())
}

/// Install the SIGTERM/SIGINT handlers now and return a future that resolves
/// on the first of them.
#[cfg(unix)]
pub fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => info!("received SIGTERM"),
            _ = interrupt.recv() => info!("received SIGINT"),
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    Ok(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
}
