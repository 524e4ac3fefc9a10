use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{AGENT_FAILURE_EXIT_CODE, DEFAULT_TIMEOUT_SECS};

/// Body of `POST /execute`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
}

impl ExecuteRequest {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Timeout actually applied: the requested seconds if positive, else 30.
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Body returned by `POST /execute`, for successful and rejected requests alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
}

impl ExecuteResponse {
    /// Envelope for a request the agent refused before running anything.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            exit_code: AGENT_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
            execution_time_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeStatus {
    pub status: String,
}

impl ProbeStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }

    pub fn ready() -> Self {
        Self {
            status: "ready".to_string(),
        }
    }
}
