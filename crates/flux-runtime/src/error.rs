//! Error types for the runtime adapter.

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to invoke container runtime: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("unexpected runtime output: {0}")]
    Parse(String),

    #[error("no such container: {0}")]
    NotFound(String),
}
