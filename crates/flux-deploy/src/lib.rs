//! flux-deploy — the deployment core of the flux daemon.
//!
//! This crate ties the catalog, the container runtime, and the host
//! router together:
//!
//! - **`deployment`** — the per-app aggregate (containers + volumes) and
//!   its start/stop/status operations
//! - **`registry`** — the name-keyed app index, rebuilt from the catalog
//!   on startup
//! - **`lock`** — per-app mutual exclusion for the pipeline, with
//!   cancellation propagation
//! - **`staging`** — confined extraction of uploaded source trees
//! - **`build`** — prepare/builder subprocess invocation with streamed
//!   output
//! - **`health`** — the pre-cutover readiness gate
//! - **`pipeline`** — the end-to-end deploy/upgrade orchestrator and the
//!   graceful drain

pub mod build;
pub mod deployment;
pub mod error;
pub mod health;
pub mod lock;
pub mod pipeline;
pub mod registry;
pub mod staging;

pub use deployment::{App, Container, Deployment, Volume};
pub use error::DeployError;
pub use lock::DeploymentLock;
pub use pipeline::Deployer;
pub use registry::AppRegistry;
