//! In-memory deployment aggregates.
//!
//! `App` snapshots are immutable: the registry swaps whole values when a
//! pipeline commits. Operations receive their collaborators (runtime,
//! catalog, router) explicitly; containers carry their parent's id, not
//! a pointer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use flux_core::DeploymentStatus;
use flux_proxy::{HostRouter, LiveProxy};
use flux_runtime::{ContainerRuntime, ContainerStatus};
use flux_state::{LoadedApp, LoadedContainer};

use crate::error::DeployError;

/// Grace period when stopping a container for removal.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: u64,
    pub runtime_id: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: u64,
    pub runtime_id: String,
    pub deployment_id: u64,
    pub head: bool,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub id: u64,
    pub url: String,
    pub port: u16,
    pub containers: Vec<Container>,
}

/// A named application owning exactly one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub id: u64,
    pub name: String,
    pub deployment: Deployment,
}

impl From<LoadedContainer> for Container {
    fn from(loaded: LoadedContainer) -> Self {
        Container {
            id: loaded.record.id,
            runtime_id: loaded.record.runtime_container_id,
            deployment_id: loaded.record.deployment_id,
            head: loaded.record.head,
            volumes: loaded
                .volumes
                .into_iter()
                .map(|v| Volume {
                    id: v.id,
                    runtime_id: v.runtime_volume_id,
                    mountpoint: v.mountpoint,
                })
                .collect(),
        }
    }
}

impl From<LoadedApp> for App {
    fn from(loaded: LoadedApp) -> Self {
        App {
            id: loaded.app.id,
            name: loaded.app.name,
            deployment: Deployment {
                id: loaded.deployment.id,
                url: loaded.deployment.url,
                port: loaded.deployment.port,
                containers: loaded.containers.into_iter().map(Container::from).collect(),
            },
        }
    }
}

impl Deployment {
    /// The container currently designated to serve traffic.
    pub fn head(&self) -> Option<&Container> {
        self.containers.iter().find(|c| c.head)
    }

    /// Aggregate status of every container. All containers must agree;
    /// disagreement means the deployment is malformed.
    pub async fn status(
        &self,
        runtime: &dyn ContainerRuntime,
    ) -> Result<DeploymentStatus, DeployError> {
        let mut agreed: Option<ContainerStatus> = None;
        for container in &self.containers {
            let inspect = runtime.inspect_container(&container.runtime_id).await?;
            match agreed {
                None => agreed = Some(inspect.status),
                Some(status) if status != inspect.status => {
                    return Err(DeployError::MalformedDeployment);
                }
                Some(_) => {}
            }
        }

        Ok(match agreed {
            Some(ContainerStatus::Running) => DeploymentStatus::Running,
            Some(ContainerStatus::Exited) => DeploymentStatus::Stopped,
            _ => DeploymentStatus::Pending,
        })
    }

    /// Start every container and make the deployment routable. If no
    /// proxy is bound for the url yet, one is built against the head.
    pub async fn start(
        &self,
        runtime: &dyn ContainerRuntime,
        router: &HostRouter,
    ) -> Result<(), DeployError> {
        for container in &self.containers {
            runtime.start_container(&container.runtime_id).await?;
        }

        if router.get(&self.url).is_none() {
            let proxy = self.build_proxy(runtime).await?;
            router.insert(&self.url, proxy);
        }
        Ok(())
    }

    /// Stop every container and unbind the router entry. In-flight
    /// requests on the released proxy run to completion.
    pub async fn stop(
        &self,
        runtime: &dyn ContainerRuntime,
        router: &HostRouter,
    ) -> Result<(), DeployError> {
        for container in &self.containers {
            runtime
                .stop_container(&container.runtime_id, Some(STOP_TIMEOUT))
                .await?;
        }
        router.remove(&self.url);
        Ok(())
    }

    /// Stop and remove every container and its volumes from the runtime.
    /// Individual removal failures are logged and skipped so one stuck
    /// container doesn't strand the rest.
    pub async fn remove_runtime_objects(&self, runtime: &dyn ContainerRuntime) {
        for container in &self.containers {
            if let Err(e) = runtime
                .stop_container(&container.runtime_id, Some(STOP_TIMEOUT))
                .await
            {
                warn!(
                    container_id = &container.runtime_id[..12.min(container.runtime_id.len())],
                    error = %e,
                    "failed to stop container"
                );
            }
            if let Err(e) = runtime.remove_container(&container.runtime_id).await {
                warn!(
                    container_id = &container.runtime_id[..12.min(container.runtime_id.len())],
                    error = %e,
                    "failed to remove container"
                );
            }
            for volume in &container.volumes {
                if let Err(e) = runtime.remove_volume(&volume.runtime_id, true).await {
                    warn!(volume_id = %volume.runtime_id, error = %e, "failed to remove volume");
                }
            }
        }
        debug!(url = %self.url, "deployment runtime objects removed");
    }

    /// Build a proxy targeting the current head's bridge address.
    pub async fn build_proxy(
        &self,
        runtime: &dyn ContainerRuntime,
    ) -> Result<Arc<LiveProxy>, DeployError> {
        let head = self.head().ok_or(DeployError::MalformedDeployment)?;
        let inspect = runtime.inspect_container(&head.runtime_id).await?;
        Ok(Arc::new(LiveProxy::new(&inspect.ip_address, self.port)))
    }
}
