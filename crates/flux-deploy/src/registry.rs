//! App registry — the name-keyed index of live apps.
//!
//! Rebuilt from the catalog on startup. Mutations replace whole `Arc<App>`
//! snapshots, so readers never observe a half-updated app.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use flux_core::DeploymentStatus;
use flux_proxy::HostRouter;
use flux_runtime::ContainerRuntime;
use flux_state::Catalog;

use crate::deployment::App;
use crate::error::DeployError;

/// Concurrent name → app index.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: Arc<RwLock<HashMap<String, Arc<App>>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an app snapshot. Apps with no containers or no
    /// head are refused; they cannot serve traffic or upgrade.
    pub fn insert(&self, app: App) -> Result<Arc<App>, DeployError> {
        if app.deployment.containers.is_empty() || app.deployment.head().is_none() {
            return Err(DeployError::MalformedDeployment);
        }
        let app = Arc::new(app);
        let mut apps = self.apps.write().expect("registry lock");
        apps.insert(app.name.clone(), app.clone());
        Ok(app)
    }

    pub fn get(&self, name: &str) -> Option<Arc<App>> {
        let apps = self.apps.read().expect("registry lock");
        apps.get(name).cloned()
    }

    /// Snapshot of every registered app.
    pub fn list(&self) -> Vec<Arc<App>> {
        let apps = self.apps.read().expect("registry lock");
        apps.values().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<App>> {
        let mut apps = self.apps.write().expect("registry lock");
        apps.remove(name)
    }

    /// Rebuild the registry from the catalog at startup.
    ///
    /// Each app is expanded end-to-end, and the proxy for its url is
    /// registered only when the deployment is currently running. More
    /// than one head for a deployment is data corruption and aborts the
    /// daemon.
    pub async fn init(
        &self,
        catalog: &Catalog,
        runtime: &dyn ContainerRuntime,
        router: &HostRouter,
    ) -> Result<(), DeployError> {
        info!("initializing deployments");

        for loaded in catalog.load_apps()? {
            let heads = loaded
                .containers
                .iter()
                .filter(|c| c.record.head)
                .count();
            if heads > 1 {
                return Err(DeployError::Validation(format!(
                    "deployment {} has {} head containers; catalog is corrupt",
                    loaded.deployment.id, heads
                )));
            }

            let app = App::from(loaded);
            match app.deployment.status(runtime).await {
                Ok(DeploymentStatus::Running) => {
                    let proxy = app.deployment.build_proxy(runtime).await?;
                    router.insert(&app.deployment.url, proxy);
                }
                Ok(status) => {
                    info!(app = %app.name, %status, "deployment not running, route not registered");
                }
                Err(e) => {
                    warn!(app = %app.name, error = %e, "could not determine deployment status");
                }
            }

            info!(app = %app.name, url = %app.deployment.url, "app restored");
            self.insert(app)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{Container, Deployment};
    use flux_runtime::mock::MockRuntime;
    use flux_runtime::ContainerStatus;
    use flux_state::{Catalog, VolumeSpec};

    fn app(name: &str, head: bool) -> App {
        App {
            id: 1,
            name: name.to_string(),
            deployment: Deployment {
                id: 1,
                url: format!("{name}.test"),
                port: 8080,
                containers: vec![Container {
                    id: 1,
                    runtime_id: "c-1".to_string(),
                    deployment_id: 1,
                    head,
                    volumes: vec![],
                }],
            },
        }
    }

    #[test]
    fn insert_get_list_remove() {
        let registry = AppRegistry::new();
        registry.insert(app("web", true)).unwrap();

        assert!(registry.get("web").is_some());
        assert!(registry.get("api").is_none());
        assert_eq!(registry.list().len(), 1);

        registry.remove("web").unwrap();
        assert!(registry.get("web").is_none());
    }

    #[test]
    fn headless_app_is_refused() {
        let registry = AppRegistry::new();
        let err = registry.insert(app("web", false)).unwrap_err();
        assert!(matches!(err, DeployError::MalformedDeployment));
    }

    #[test]
    fn containerless_app_is_refused() {
        let registry = AppRegistry::new();
        let mut empty = app("web", true);
        empty.deployment.containers.clear();
        assert!(registry.insert(empty).is_err());
    }

    #[test]
    fn insert_replaces_the_previous_snapshot() {
        let registry = AppRegistry::new();
        registry.insert(app("web", true)).unwrap();

        let mut updated = app("web", true);
        updated.deployment.port = 9090;
        registry.insert(updated).unwrap();

        assert_eq!(registry.get("web").unwrap().deployment.port, 9090);
        assert_eq!(registry.list().len(), 1);
    }

    async fn seeded_catalog(runtime: &MockRuntime, running: bool) -> Catalog {
        let catalog = Catalog::open_in_memory().unwrap();
        let runtime_id = runtime
            .create_container(flux_runtime::CreateContainer {
                image: "flux_web-image".to_string(),
                name: "web-1".to_string(),
                env: vec![],
                volumes: vec![],
            })
            .await
            .unwrap();
        if running {
            runtime.start_container(&runtime_id).await.unwrap();
        } else {
            runtime.set_status(&runtime_id, ContainerStatus::Exited);
        }
        catalog
            .commit_new_app(
                "web",
                "web.test",
                8080,
                &runtime_id,
                &VolumeSpec {
                    runtime_volume_id: "vol-1".to_string(),
                    mountpoint: "/workspace".to_string(),
                },
            )
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn init_restores_running_apps_with_routes() {
        let runtime = MockRuntime::new();
        let catalog = seeded_catalog(&runtime, true).await;
        let registry = AppRegistry::new();
        let router = HostRouter::new();

        registry.init(&catalog, &runtime, &router).await.unwrap();

        let app = registry.get("web").unwrap();
        assert!(app.deployment.head().is_some());
        assert_eq!(app.deployment.head().unwrap().volumes.len(), 1);
        assert!(router.get("web.test").is_some());
    }

    #[tokio::test]
    async fn init_skips_routes_for_stopped_apps() {
        let runtime = MockRuntime::new();
        let catalog = seeded_catalog(&runtime, false).await;
        let registry = AppRegistry::new();
        let router = HostRouter::new();

        registry.init(&catalog, &runtime, &router).await.unwrap();

        assert!(registry.get("web").is_some());
        assert!(router.get("web.test").is_none());
    }

    #[tokio::test]
    async fn init_after_interrupted_upgrade_keeps_one_head() {
        // Simulates a crash after the upgrade commit but before the old
        // generation rows were deleted: both containers are still in the
        // catalog, but only the new one is the head.
        let runtime = MockRuntime::new();
        let catalog = seeded_catalog(&runtime, true).await;
        let loaded = &catalog.load_apps().unwrap()[0];
        let old_head = loaded.containers[0].record.runtime_container_id.clone();

        runtime.seed_container("c-new", "web-2", ContainerStatus::Running);
        catalog
            .commit_upgrade(loaded.deployment.id, "c-new", &old_head)
            .unwrap();
        runtime.set_status(&old_head, ContainerStatus::Running);

        let registry = AppRegistry::new();
        let router = HostRouter::new();
        registry.init(&catalog, &runtime, &router).await.unwrap();

        let app = registry.get("web").unwrap();
        assert_eq!(app.deployment.containers.len(), 2);
        let head = app.deployment.head().unwrap();
        assert_eq!(head.runtime_id, "c-new");
        assert!(router.get("web.test").is_some());
    }
}
