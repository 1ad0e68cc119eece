//! Runtime adapter value types.

use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the runtime for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "restarting" => ContainerStatus::Restarting,
            "paused" => ContainerStatus::Paused,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }
}

/// Result of inspecting a container: its status and bridge address.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInspect {
    pub status: ContainerStatus,
    pub ip_address: String,
}

/// A named volume and the host path the runtime assigned it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInfo {
    pub id: String,
    pub mountpoint: String,
}

/// Binding of a named volume to a path inside the container.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeBinding {
    pub volume_id: String,
    pub mountpoint: String,
}

/// Everything the runtime needs to create a container.
#[derive(Debug, Clone)]
pub struct CreateContainer {
    pub image: String,
    pub name: String,
    pub env: Vec<String>,
    pub volumes: Vec<VolumeBinding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_known_states() {
        assert_eq!(ContainerStatus::parse("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("exited"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::parse("created"), ContainerStatus::Created);
    }

    #[test]
    fn status_maps_novel_states_to_unknown() {
        assert_eq!(
            ContainerStatus::parse("removing"),
            ContainerStatus::Unknown
        );
    }
}
