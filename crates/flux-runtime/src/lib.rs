//! flux-runtime — thin capability surface over the container runtime.
//!
//! The daemon core only ever talks to containers through the
//! [`ContainerRuntime`] trait: create/start/stop/remove containers and
//! volumes, inspect status and address, pull images, and list containers
//! by name prefix. The adapter never retries; failures surface as opaque
//! [`RuntimeError`] values for the caller to handle.
//!
//! Two implementations ship:
//!
//! - [`docker::DockerCli`] — shells out to the `docker` binary
//! - [`mock::MockRuntime`] — deterministic in-memory runtime for tests

pub mod docker;
pub mod error;
pub mod mock;
pub mod types;

use async_trait::async_trait;
use std::time::Duration;

pub use docker::DockerCli;
pub use error::{RuntimeError, RuntimeResult};
pub use types::{ContainerInspect, ContainerStatus, CreateContainer, VolumeBinding, VolumeInfo};

/// Capability set the daemon core depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull an image, blocking until the pull finishes.
    async fn pull_image(&self, reference: &str) -> RuntimeResult<()>;

    /// Create a container and return the runtime's full opaque id.
    async fn create_container(&self, spec: CreateContainer) -> RuntimeResult<String>;

    async fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Stop a container. `timeout` is the grace period before the
    /// runtime kills the process; `None` uses the runtime default.
    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> RuntimeResult<()>;

    async fn remove_container(&self, id: &str) -> RuntimeResult<()>;

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerInspect>;

    /// Create an anonymous named volume.
    async fn create_volume(&self) -> RuntimeResult<VolumeInfo>;

    async fn remove_volume(&self, id: &str, force: bool) -> RuntimeResult<()>;

    /// Runtime ids of all containers (running or not) whose name starts
    /// with `name_prefix`.
    async fn list_containers(&self, name_prefix: &str) -> RuntimeResult<Vec<String>>;
}
