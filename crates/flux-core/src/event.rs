//! Deployment progress events and API wire types.
//!
//! The deploy pipeline emits `DeploymentEvent`s onto a bounded channel;
//! the frontend relays them to the client as server-sent events, one
//! frame per event, named after the stage.

use serde::{Deserialize, Serialize};

/// Aggregate runtime status of a deployment's containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Running,
    Stopped,
    Pending,
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Running => f.write_str("running"),
            DeploymentStatus::Stopped => f.write_str("stopped"),
            DeploymentStatus::Pending => f.write_str("pending"),
        }
    }
}

/// App summary returned by `GET /apps` and the `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSummary {
    pub id: u64,
    pub name: String,
    pub deployment_id: u64,
    pub deployment_status: DeploymentStatus,
}

/// One progress event of a running deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DeploymentEvent {
    Start { message: String },
    Preparing { message: String },
    Building { message: String },
    Creating { message: String },
    /// One line of combined stdout/stderr from the prepare or build
    /// subprocess.
    CmdOutput { message: String },
    Complete { app: AppSummary },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

impl DeploymentEvent {
    /// The SSE event name for this variant.
    pub fn stage(&self) -> &'static str {
        match self {
            DeploymentEvent::Start { .. } => "start",
            DeploymentEvent::Preparing { .. } => "preparing",
            DeploymentEvent::Building { .. } => "building",
            DeploymentEvent::Creating { .. } => "creating",
            DeploymentEvent::CmdOutput { .. } => "cmd_output",
            DeploymentEvent::Complete { .. } => "complete",
            DeploymentEvent::Error { .. } => "error",
        }
    }

    /// Whether the client should close the stream after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentEvent::Complete { .. } | DeploymentEvent::Error { .. }
        )
    }
}
