//! Persisted row types.
//!
//! Identifiers are opaque and monotonically assigned by the catalog.
//! `runtime_container_id` is the container runtime's full opaque id,
//! stored verbatim; volumes reference their owning container by that
//! runtime id.

use serde::{Deserialize, Serialize};

/// One named application. One-to-one with a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: u64,
    pub name: String,
    pub deployment_id: u64,
}

/// A reachable endpoint backed by one or more containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: u64,
    /// Host header under which the deployment is reachable. Unique.
    pub url: String,
    /// Container-internal TCP port the application listens on.
    pub port: u16,
}

/// One container process lifetime within a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: u64,
    pub runtime_container_id: String,
    pub deployment_id: u64,
    /// Whether this container currently serves traffic.
    pub head: bool,
}

/// A persistent data volume owned by exactly one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: u64,
    pub runtime_volume_id: String,
    pub mountpoint: String,
    /// Runtime id of the owning container.
    pub container_id: String,
}

/// Fully expanded app as loaded for startup reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedApp {
    pub app: AppRecord,
    pub deployment: DeploymentRecord,
    pub containers: Vec<LoadedContainer>,
}

/// A container row with its volume rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedContainer {
    pub record: ContainerRecord,
    pub volumes: Vec<VolumeRecord>,
}
