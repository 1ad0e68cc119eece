//! The deploy pipeline — end-to-end create/upgrade orchestration.
//!
//! Stage order: admit (lock) → stage source → prepare → build image →
//! create-or-upgrade. An upgrade health-gates the new container, commits
//! the catalog, swaps the router entry (the cutover), and hands the old
//! generation to a background graceful drain. Any stage failure leaves
//! the old generation running and routable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flux_core::{AppSummary, DaemonConfig, DeploymentEvent, DeploymentStatus, ProjectConfig};
use flux_proxy::{HostRouter, LiveProxy};
use flux_runtime::{ContainerRuntime, CreateContainer, VolumeBinding};
use flux_state::{Catalog, VolumeSpec};

use crate::build;
use crate::deployment::{App, Container, Deployment};
use crate::error::DeployError;
use crate::health;
use crate::lock::DeploymentLock;
use crate::registry::AppRegistry;
use crate::staging;

/// Where application volumes are mounted inside containers.
const WORKSPACE_MOUNTPOINT: &str = "/workspace";

/// How long the drain waits for in-flight requests before removing the
/// old generation.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Grace period for stopping drained containers.
const DRAIN_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// The deploy orchestrator. Cheap to clone; all fields are shared
/// handles.
#[derive(Clone)]
pub struct Deployer {
    catalog: Catalog,
    runtime: Arc<dyn ContainerRuntime>,
    router: HostRouter,
    registry: AppRegistry,
    lock: DeploymentLock,
    config: DaemonConfig,
    root_dir: PathBuf,
    shutdown: CancellationToken,
}

impl Deployer {
    pub fn new(
        catalog: Catalog,
        runtime: Arc<dyn ContainerRuntime>,
        router: HostRouter,
        registry: AppRegistry,
        config: DaemonConfig,
        root_dir: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            runtime,
            router,
            registry,
            lock: DeploymentLock::new(),
            config,
            root_dir,
            shutdown,
        }
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn router(&self) -> &HostRouter {
        &self.router
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.runtime.clone()
    }

    /// Stage 1: claim the per-app lock. Fails fast with `InProgress`
    /// when a pipeline is already in flight for this name.
    pub fn begin(&self, name: &str) -> Result<CancellationToken, DeployError> {
        self.lock.begin(name, &self.shutdown)
    }

    /// Release the lock, cancelling anything the pipeline left running.
    pub fn finish(&self, name: &str) {
        self.lock.end(name);
    }

    /// Stages 2–6: stage the source archive, run prepare and the image
    /// build (streaming their output), then create or upgrade the app.
    /// The caller must hold the deployment lock for `config.name`.
    pub async fn run(
        &self,
        config: &ProjectConfig,
        archive: &Path,
        token: &CancellationToken,
        events: &mpsc::Sender<DeploymentEvent>,
    ) -> Result<AppSummary, DeployError> {
        config.validate()?;
        self.check_url_ownership(config)?;

        info!(name = %config.name, url = %config.url, "deploying project");

        let project_dir = self.stage_source(config, archive, token).await?;

        let _ = events
            .send(DeploymentEvent::Preparing {
                message: "Preparing project".to_string(),
            })
            .await;
        build::prepare(&project_dir, events, token).await?;

        let _ = events
            .send(DeploymentEvent::Building {
                message: "Building project image".to_string(),
            })
            .await;
        let image =
            build::build_image(&config.name, &self.config.builder, &project_dir, events, token)
                .await?;

        let _ = events
            .send(DeploymentEvent::Creating {
                message: "Creating deployment".to_string(),
            })
            .await;
        self.create_or_upgrade(config, &project_dir, &image, token)
            .await
    }

    /// Stage 5/6: create the app on first deploy, upgrade it otherwise.
    pub async fn create_or_upgrade(
        &self,
        config: &ProjectConfig,
        project_dir: &Path,
        image: &str,
        token: &CancellationToken,
    ) -> Result<AppSummary, DeployError> {
        config.validate()?;
        self.check_url_ownership(config)?;

        let app = match self.registry.get(&config.name) {
            None => self.create_app(config, project_dir, image).await?,
            Some(existing) => {
                self.upgrade_app(&existing, config, project_dir, image, token)
                    .await?
            }
        };

        let status = app.deployment.status(self.runtime.as_ref()).await?;
        Ok(AppSummary {
            id: app.id,
            name: app.name.clone(),
            deployment_id: app.deployment.id,
            deployment_status: status,
        })
    }

    /// A deploy may keep its own url or claim a free one, never steal
    /// another app's.
    fn check_url_ownership(&self, config: &ProjectConfig) -> Result<(), DeployError> {
        if let Some(existing) = self.catalog.find_deployment_by_url(&config.url)? {
            let owned_by_self = self
                .registry
                .get(&config.name)
                .map(|app| app.deployment.id == existing.id)
                .unwrap_or(false);
            if !owned_by_self {
                return Err(DeployError::Conflict(format!(
                    "url {} is already in use by another app",
                    config.url
                )));
            }
        }
        Ok(())
    }

    async fn stage_source(
        &self,
        config: &ProjectConfig,
        archive: &Path,
        token: &CancellationToken,
    ) -> Result<PathBuf, DeployError> {
        let root_dir = self.root_dir.clone();
        let name = config.name.clone();
        let archive = archive.to_path_buf();
        let gzipped = self.config.compression.enabled;

        let unpack = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&archive)?;
            staging::stage_source(&root_dir, &name, file, gzipped)
        });

        match token.run_until_cancelled(unpack).await {
            None => Err(DeployError::Cancelled),
            Some(joined) => joined.map_err(std::io::Error::other)?,
        }
    }

    /// First deploy for a name: one volume, one head container, all four
    /// catalog rows in a single transaction, then start and route it.
    async fn create_app(
        &self,
        config: &ProjectConfig,
        project_dir: &Path,
        image: &str,
    ) -> Result<Arc<App>, DeployError> {
        debug!(name = %config.name, "creating app");

        let volume = self.runtime.create_volume().await?;
        let env = config.resolved_environment(project_dir)?;

        let runtime_id = self
            .runtime
            .create_container(CreateContainer {
                image: image.to_string(),
                name: container_name(&config.name),
                env,
                volumes: vec![VolumeBinding {
                    volume_id: volume.id.clone(),
                    mountpoint: WORKSPACE_MOUNTPOINT.to_string(),
                }],
            })
            .await?;

        // Committed before the app becomes visible anywhere else. If this
        // fails, the container just created is an orphan; the next deploy
        // reaps it through the name-prefix sweep.
        let loaded = self.catalog.commit_new_app(
            &config.name,
            &config.url,
            config.port,
            &runtime_id,
            &VolumeSpec {
                runtime_volume_id: volume.id,
                mountpoint: WORKSPACE_MOUNTPOINT.to_string(),
            },
        )?;

        let app = App::from(loaded);
        app.deployment.start(self.runtime.as_ref(), &self.router).await?;

        info!(name = %config.name, url = %config.url, "app deployed");
        self.registry.insert(app)
    }

    /// Blue/green upgrade of an existing app. The old head keeps serving
    /// until the new container passes the health gate and the router is
    /// repointed; old containers are then drained in the background.
    async fn upgrade_app(
        &self,
        app: &App,
        config: &ProjectConfig,
        project_dir: &Path,
        image: &str,
        token: &CancellationToken,
    ) -> Result<Arc<App>, DeployError> {
        debug!(name = %config.name, "upgrading app");

        // A stopped deployment is brought up first so its head can hand
        // over volumes and drain normally.
        let status = app.deployment.status(self.runtime.as_ref()).await?;
        if status != DeploymentStatus::Running {
            app.deployment.start(self.runtime.as_ref(), &self.router).await?;
        }

        // The old generation set: every runtime container named after
        // this app, including strays from failed earlier pipelines.
        let old_generation = self
            .runtime
            .list_containers(&format!("{}-", config.name))
            .await?;

        let old_head = app
            .deployment
            .head()
            .ok_or(DeployError::MalformedDeployment)?
            .clone();

        let env = config.resolved_environment(project_dir)?;
        let new_runtime_id = self
            .runtime
            .create_container(CreateContainer {
                image: image.to_string(),
                name: container_name(&config.name),
                env,
                volumes: old_head
                    .volumes
                    .iter()
                    .map(|v| VolumeBinding {
                        volume_id: v.runtime_id.clone(),
                        mountpoint: v.mountpoint.clone(),
                    })
                    .collect(),
            })
            .await?;

        // Volume ownership transfers to the new container in the same
        // transaction that makes it the head.
        let new_record =
            self.catalog
                .commit_upgrade(app.deployment.id, &new_runtime_id, &old_head.runtime_id)?;

        self.runtime.start_container(&new_runtime_id).await?;

        if let Err(gate_err) =
            health::wait_until_ready(self.runtime.as_ref(), &new_runtime_id, config.port, token)
                .await
        {
            warn!(name = %config.name, error = %gate_err, "health gate failed, rolling back");
            if let Err(e) = self.catalog.rollback_upgrade(&new_record, &old_head.runtime_id) {
                warn!(error = %e, "failed to roll back catalog");
            }
            if let Err(e) = self
                .runtime
                .stop_container(&new_runtime_id, Some(Duration::ZERO))
                .await
            {
                warn!(error = %e, "failed to stop rejected container");
            }
            if let Err(e) = self.runtime.remove_container(&new_runtime_id).await {
                warn!(error = %e, "failed to remove rejected container");
            }
            return Err(gate_err);
        }

        self.catalog
            .update_deployment(app.deployment.id, &config.url, config.port)?;

        // Cutover: after this insert, every new request lands on the new
        // head. Requests already dispatched to the old head finish there.
        let inspect = self.runtime.inspect_container(&new_runtime_id).await?;
        let proxy = Arc::new(LiveProxy::new(&inspect.ip_address, config.port));
        let displaced = self.router.insert(&config.url, proxy);
        let old_proxy = if app.deployment.url != config.url {
            self.router.remove(&app.deployment.url).or(displaced)
        } else {
            displaced
        };

        self.catalog
            .delete_containers_by_runtime_ids(&old_generation)?;

        let new_app = App {
            id: app.id,
            name: app.name.clone(),
            deployment: Deployment {
                id: app.deployment.id,
                url: config.url.clone(),
                port: config.port,
                containers: vec![Container {
                    id: new_record.id,
                    runtime_id: new_runtime_id,
                    deployment_id: app.deployment.id,
                    head: true,
                    volumes: old_head.volumes.clone(),
                }],
            },
        };
        let new_app = self.registry.insert(new_app)?;

        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            graceful_drain(runtime, old_proxy, old_generation).await;
        });

        info!(name = %config.name, url = %config.url, "app upgraded");
        Ok(new_app)
    }

    /// Remove one app: routes, runtime objects, catalog rows, registry
    /// entry, and the staged source directory.
    pub async fn remove_app(&self, name: &str) -> Result<(), DeployError> {
        let app = self
            .registry
            .get(name)
            .ok_or_else(|| DeployError::AppNotFound(name.to_string()))?;

        info!(name, "deleting deployment");

        self.router.remove(&app.deployment.url);
        app.deployment.remove_runtime_objects(self.runtime.as_ref()).await;
        self.catalog.remove_app_cascade(&flux_state::AppRecord {
            id: app.id,
            name: app.name.clone(),
            deployment_id: app.deployment.id,
        })?;
        self.registry.remove(name);

        let project_dir = self.root_dir.join("apps").join(name);
        if let Err(e) = tokio::fs::remove_dir_all(&project_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %project_dir.display(), error = %e, "failed to remove project directory");
            }
        }
        Ok(())
    }

    /// Remove every registered app.
    pub async fn remove_all(&self) -> Result<(), DeployError> {
        for app in self.registry.list() {
            self.remove_app(&app.name).await?;
        }
        Ok(())
    }
}

/// Wait for the displaced proxy's in-flight requests to finish (up to
/// the grace period), then stop and remove the old generation. Removal
/// errors are logged; the deployment already succeeded.
pub async fn graceful_drain(
    runtime: Arc<dyn ContainerRuntime>,
    old_proxy: Option<Arc<LiveProxy>>,
    old_container_ids: Vec<String>,
) {
    if let Some(proxy) = old_proxy {
        let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
        while proxy.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    target = proxy.target(),
                    in_flight = proxy.in_flight(),
                    "drain grace period expired with requests in flight"
                );
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    for id in &old_container_ids {
        if let Err(e) = runtime.stop_container(id, Some(DRAIN_STOP_TIMEOUT)).await {
            warn!(container_id = &id[..12.min(id.len())], error = %e, "failed to stop old container");
        }
        if let Err(e) = runtime.remove_container(id).await {
            warn!(container_id = &id[..12.min(id.len())], error = %e, "failed to remove old container");
        }
    }

    if !old_container_ids.is_empty() {
        info!(count = old_container_ids.len(), "old generation removed");
    }
}

/// Container names are `<app>-<YYYYMMDD-HHMMSS>`; the prefix is what the
/// old-generation sweep matches on.
fn container_name(app: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    format!("{app}-{stamp}")
}
