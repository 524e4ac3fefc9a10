//! Startup configuration and the fixed limits the agent enforces.

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_WORKING_ROOT: &str = "/mnt/data";

/// Applied when a request carries no timeout, or a non-positive one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Exit code reported when the child was killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the agent itself failed (rejected request or spawn failure).
pub const AGENT_FAILURE_EXIT_CODE: i32 = 1;

/// Per-stream cap on captured stdout/stderr.
pub const MAX_OUTPUT_SIZE: usize = 1_048_576;

pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(300);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Command line of the executor agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "executor-agent", version, about = "Loopback-only command execution agent")]
pub struct AgentConfig {
    /// Port to listen on (always bound to 127.0.0.1)
    #[arg(long, env = "EXECUTOR_AGENT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory that every requested working directory must live under
    #[arg(long, env = "EXECUTOR_AGENT_WORKING_ROOT", default_value = DEFAULT_WORKING_ROOT)]
    pub working_root: PathBuf,
}

impl AgentConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            working_root: PathBuf::from(DEFAULT_WORKING_ROOT),
        }
    }
}
