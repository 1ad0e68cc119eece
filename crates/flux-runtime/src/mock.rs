//! Deterministic in-memory runtime for testing.
//!
//! Containers move `created → running → exited` through the normal
//! adapter calls. Every container reports `127.0.0.1` as its address so
//! tests can stand up a real local listener behind the proxy or health
//! gate. Removed ids are remembered for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::types::*;
use crate::ContainerRuntime;

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    image: String,
    env: Vec<String>,
    volumes: Vec<VolumeBinding>,
    status: ContainerStatus,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    volumes: HashMap<String, String>,
    pulled_images: Vec<String>,
    removed_containers: Vec<String>,
    removed_volumes: Vec<String>,
}

/// In-memory [`ContainerRuntime`] with scriptable state.
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
    next_id: AtomicU64,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a container into a specific status (e.g. to simulate a
    /// crashed process or a mixed-status deployment).
    pub fn set_status(&self, id: &str, status: ContainerStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(id) {
            container.status = status;
        }
    }

    /// Insert a pre-existing container (e.g. an orphan from an earlier
    /// failed deploy) without going through `create_container`.
    pub fn seed_container(&self, id: &str, name: &str, status: ContainerStatus) {
        let mut state = self.state.lock().unwrap();
        state.containers.insert(
            id.to_string(),
            MockContainer {
                name: name.to_string(),
                image: String::new(),
                env: Vec::new(),
                volumes: Vec::new(),
                status,
            },
        );
    }

    pub fn container_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.containers.keys().cloned().collect()
    }

    pub fn container_env(&self, id: &str) -> Option<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.containers.get(id).map(|c| c.env.clone())
    }

    pub fn container_volumes(&self, id: &str) -> Option<Vec<VolumeBinding>> {
        let state = self.state.lock().unwrap();
        state.containers.get(id).map(|c| c.volumes.clone())
    }

    pub fn container_image(&self, id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.containers.get(id).map(|c| c.image.clone())
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_containers.clone()
    }

    pub fn removed_volumes(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_volumes.clone()
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled_images.clone()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Runtime ids are 64-char opaque hex strings, like docker's.
        format!("{prefix}{n:062x}")
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.pulled_images.push(reference.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: CreateContainer) -> RuntimeResult<String> {
        let id = self.fresh_id("c0");
        let mut state = self.state.lock().unwrap();
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: spec.name,
                image: spec.image,
                env: spec.env,
                volumes: spec.volumes,
                status: ContainerStatus::Created,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(container) => {
                container.status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn stop_container(&self, id: &str, _timeout: Option<Duration>) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(container) => {
                container.status = ContainerStatus::Exited;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.remove(id) {
            Some(_) => {
                state.removed_containers.push(id.to_string());
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerInspect> {
        let state = self.state.lock().unwrap();
        match state.containers.get(id) {
            Some(container) => Ok(ContainerInspect {
                status: container.status,
                ip_address: "127.0.0.1".to_string(),
            }),
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn create_volume(&self) -> RuntimeResult<VolumeInfo> {
        let id = self.fresh_id("v0");
        let mountpoint = format!("/var/lib/mock/volumes/{id}");
        let mut state = self.state.lock().unwrap();
        state.volumes.insert(id.clone(), mountpoint.clone());
        Ok(VolumeInfo { id, mountpoint })
    }

    async fn remove_volume(&self, id: &str, _force: bool) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.volumes.remove(id);
        state.removed_volumes.push(id.to_string());
        Ok(())
    }

    async fn list_containers(&self, name_prefix: &str) -> RuntimeResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| c.name.starts_with(name_prefix))
            .map(|(id, _)| id.clone())
            .collect())
    }
}
