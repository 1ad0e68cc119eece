//! flux-core — shared domain and wire types for the flux daemon.
//!
//! This crate holds the types that cross crate boundaries: the project
//! configuration shipped with each deploy (`flux.json`), the daemon
//! configuration (`config.json`), the deployment event stream variants,
//! and the app summaries returned by the admin API.

pub mod config;
pub mod event;
pub mod project;

pub use config::{Compression, ConfigError, DaemonConfig, DaemonInfo};
pub use event::{AppSummary, DeploymentEvent, DeploymentStatus};
pub use project::{ProjectConfig, ProjectError};
