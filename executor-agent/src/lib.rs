//! Loopback-only HTTP agent that runs one command per request inside the
//! container it lives in, bounded in time and output size.

pub mod config;
pub mod env;
pub mod error;
pub mod models;
pub mod output;
pub mod server;
pub mod supervisor;
pub mod workdir;

pub use config::AgentConfig;
pub use env::EnvBaseline;
pub use error::RequestError;
pub use models::{ExecuteRequest, ExecuteResponse};
pub use server::{create_app, AppState};
pub use supervisor::{ExecutionOutcome, ExecutionReport, ExecutionSpec, Supervisor};
