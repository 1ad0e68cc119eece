//! Error taxonomy for the deployment core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Another pipeline is already running for this app. No state change.
    #[error("app {0} is already being deployed")]
    InProgress(String),

    /// Bad input (config fields, archive paths). Never mutates state.
    #[error("{0}")]
    Validation(String),

    /// The requested url is already owned by a different deployment.
    #[error("{0}")]
    Conflict(String),

    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("malformed deployment: containers disagree on status")]
    MalformedDeployment,

    /// The new container never became ready; the old head remains live.
    #[error("health gate failed: {0}")]
    HealthGate(String),

    #[error("command `{command}` exited with status {status}")]
    CommandFailed { command: String, status: i32 },

    #[error("deployment cancelled")]
    Cancelled,

    #[error(transparent)]
    Project(#[from] flux_core::ProjectError),

    #[error(transparent)]
    State(#[from] flux_state::StateError),

    #[error(transparent)]
    Runtime(#[from] flux_runtime::RuntimeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
