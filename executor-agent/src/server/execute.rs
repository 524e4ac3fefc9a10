use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::Json;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::config::MAX_BODY_SIZE;
use crate::error::RequestError;
use crate::models::{ExecuteRequest, ExecuteResponse};
use crate::supervisor::{ExecutionOutcome, ExecutionReport, ExecutionSpec};
use crate::workdir::resolve_working_dir;

/// `POST /execute`: validate, compose the environment, run, respond.
///
/// Anything that reaches the supervisor is answered with 200, whatever the
/// child did; only requests refused up front get a 400.
///
/// The execution runs on its own task, so a client disconnect or the request
/// timeout drops only the response; the child keeps its own deadline.
pub async fn execute(
    State(state): State<AppState>,
    body: Body,
) -> Result<Json<ExecuteResponse>, RequestError> {
    let bytes = read_body(body, state.read_timeout()).await?;
    let request: ExecuteRequest =
        serde_json::from_slice(&bytes).map_err(|err| RequestError::InvalidJson {
            message: err.to_string(),
        })?;
    let spec = prepare(&state, request)?;

    let supervisor = state.supervisor.clone();
    let span = info_span!("execute", exec_id = %Uuid::new_v4());
    let started = Instant::now();
    let execution = tokio::spawn(
        async move {
            info!(
                command = ?spec.command,
                timeout_secs = spec.timeout.as_secs(),
                dir = %spec.working_dir.display(),
                "executing command"
            );
            supervisor.run(&spec).await
        }
        .instrument(span),
    );

    let report = match execution.await {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "execution task failed");
            ExecutionReport {
                outcome: ExecutionOutcome::SpawnFailed {
                    reason: format!("execution task failed: {err}"),
                },
                elapsed: started.elapsed(),
            }
        }
    };

    Ok(Json(report.into_response(state.supervisor.output_limit())))
}

async fn read_body(body: Body, read_timeout: Duration) -> Result<Bytes, RequestError> {
    match tokio::time::timeout(read_timeout, to_bytes(body, MAX_BODY_SIZE)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(err)) => Err(RequestError::BodyRead {
            message: format!("{} (limit {} bytes)", err, MAX_BODY_SIZE),
        }),
        Err(_) => Err(RequestError::BodyRead {
            message: format!("no complete body within {}ms", read_timeout.as_millis()),
        }),
    }
}

/// Turn a parsed request into an [`ExecutionSpec`], or refuse it.
pub fn prepare(state: &AppState, request: ExecuteRequest) -> Result<ExecutionSpec, RequestError> {
    if request.command.is_empty() {
        return Err(RequestError::EmptyCommand);
    }

    let timeout = request.effective_timeout();
    let requested = request.working_dir.as_deref();
    let working_dir = resolve_working_dir(requested, state.working_root())
        .map_err(|err| RequestError::WorkingDirUnresolvable {
            message: err.to_string(),
        })?
        .ok_or_else(|| RequestError::WorkingDirOutsideRoot {
            root: state.working_root().display().to_string(),
            requested: requested.unwrap_or_default().to_string(),
        })?;

    let env = state
        .baseline()
        .compose(&request.env.unwrap_or_default());

    Ok(ExecutionSpec {
        command: request.command,
        working_dir,
        env,
        timeout,
    })
}
