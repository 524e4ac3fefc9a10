//! Execution supervisor: spawn one subprocess, bound it in time, capture its
//! streams and classify how it ended.
//!
//! The child is placed in its own process group. A [`ProcessGroupGuard`] owns
//! that group for the lifetime of the supervision scope and kills it when the
//! scope ends, whether by normal exit or timeout. Callers run the supervision
//! on a task of its own, so the per-request timeout is the only thing that
//! cancels a command.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AGENT_FAILURE_EXIT_CODE, MAX_OUTPUT_SIZE, TIMEOUT_EXIT_CODE};
use crate::models::ExecuteResponse;
use crate::output::{capped_string, drain_capped};

/// A fully validated execution, ready to spawn.
#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    /// Executable followed by its literal arguments. Must be non-empty.
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// Complete child environment; nothing is inherited beyond this.
    pub env: Vec<(OsString, OsString)>,
    pub timeout: Duration,
}

/// How a supervised execution ended.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The child exited on its own and both streams reached EOF.
    Completed {
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    /// The deadline passed first; the process group was killed.
    TimedOut { timeout: Duration },
    /// The agent could not start (or keep track of) the process.
    SpawnFailed { reason: String },
}

#[derive(Debug)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            ExecutionOutcome::Completed { exit_code, .. } => *exit_code,
            ExecutionOutcome::TimedOut { .. } => TIMEOUT_EXIT_CODE,
            ExecutionOutcome::SpawnFailed { .. } => AGENT_FAILURE_EXIT_CODE,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::TimedOut { .. })
    }

    /// Render the wire response, applying the output cap to both streams.
    pub fn into_response(self, output_limit: usize) -> ExecuteResponse {
        let exit_code = self.exit_code();
        let execution_time_ms = self.elapsed.as_millis() as u64;
        let (stdout, stderr) = match self.outcome {
            ExecutionOutcome::Completed { stdout, stderr, .. } => (
                capped_string(stdout, output_limit),
                capped_string(stderr, output_limit),
            ),
            ExecutionOutcome::TimedOut { timeout } => (
                String::new(),
                format!("Execution timed out after {} seconds", timeout.as_secs()),
            ),
            ExecutionOutcome::SpawnFailed { reason } => {
                (String::new(), format!("Failed to execute command: {reason}"))
            }
        };
        ExecuteResponse {
            exit_code,
            stdout,
            stderr,
            execution_time_ms,
        }
    }
}

/// Runs one subprocess per call. Holds no per-execution state, so a single
/// instance is shared by every request.
#[derive(Debug, Clone)]
pub struct Supervisor {
    output_limit: usize,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(MAX_OUTPUT_SIZE)
    }
}

impl Supervisor {
    pub fn new(output_limit: usize) -> Self {
        Self { output_limit }
    }

    pub fn output_limit(&self) -> usize {
        self.output_limit
    }

    pub async fn run(&self, spec: &ExecutionSpec) -> ExecutionReport {
        let start = Instant::now();
        let outcome = self.supervise(spec).await;
        let report = ExecutionReport {
            outcome,
            elapsed: start.elapsed(),
        };

        match &report.outcome {
            ExecutionOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => info!(
                exit_code,
                stdout_bytes = stdout.len(),
                stderr_bytes = stderr.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "command finished"
            ),
            ExecutionOutcome::TimedOut { timeout } => warn!(
                timeout_secs = timeout.as_secs(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "command timed out, process group killed"
            ),
            ExecutionOutcome::SpawnFailed { reason } => {
                warn!(%reason, "failed to execute command")
            }
        }
        report
    }

    async fn supervise(&self, spec: &ExecutionSpec) -> ExecutionOutcome {
        let Some((program, args)) = spec.command.split_first() else {
            return ExecutionOutcome::SpawnFailed {
                reason: "empty command".to_string(),
            };
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&spec.working_dir)
            .env_clear()
            .envs(spec.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionOutcome::SpawnFailed {
                    reason: spawn_failure_reason(program, &err),
                }
            }
        };
        let mut group = ProcessGroupGuard::new(child.id());

        let limit = self.output_limit;
        let mut stdout_task = capture(child.stdout.take(), limit);
        let mut stderr_task = capture(child.stderr.take(), limit);

        let supervised = async {
            let status = child.wait().await?;
            // Descendants may still hold the pipes open; the group goes with the child.
            group.terminate();
            let (stdout, stderr) = tokio::join!(&mut stdout_task, &mut stderr_task);
            Ok::<_, io::Error>((status, joined(stdout)?, joined(stderr)?))
        };

        let result = tokio::time::timeout(spec.timeout, supervised).await;
        match result {
            Ok(Ok((status, stdout, stderr))) => ExecutionOutcome::Completed {
                exit_code: exit_code(&status),
                stdout,
                stderr,
            },
            Ok(Err(err)) => ExecutionOutcome::SpawnFailed {
                reason: err.to_string(),
            },
            Err(_) => {
                group.terminate();
                if let Err(err) = child.start_kill() {
                    debug!(error = %err, "child already gone after group kill");
                }
                if let Err(err) = child.wait().await {
                    warn!(error = %err, "failed to reap timed out child");
                }
                stdout_task.abort();
                stderr_task.abort();
                ExecutionOutcome::TimedOut {
                    timeout: spec.timeout,
                }
            }
        }
    }
}

fn capture<R>(stream: Option<R>, limit: usize) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match stream {
            Some(stream) => drain_capped(stream, limit).await,
            None => Ok(Vec::new()),
        }
    })
}

fn joined(
    result: Result<io::Result<Vec<u8>>, tokio::task::JoinError>,
) -> io::Result<Vec<u8>> {
    result.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
}

fn spawn_failure_reason(program: &str, err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => format!("{program}: executable or working directory not found ({err})"),
        io::ErrorKind::PermissionDenied => format!("{program}: permission denied ({err})"),
        _ => format!("{program}: {err}"),
    }
}

/// Exit status as reported to callers. Signal deaths map to `128 + signal`.
fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    AGENT_FAILURE_EXIT_CODE
}

/// Kills the child's whole process group exactly once, at the latest on drop.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn terminate(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // SAFETY: killpg only delivers a signal; an already-empty group yields ESRCH.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
