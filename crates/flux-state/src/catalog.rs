//! Catalog — redb-backed persistence for apps, deployments, containers,
//! and volumes.
//!
//! Ids are monotonically assigned from the `meta` counter table. Every
//! pipeline mutation that touches more than one row runs in a single
//! write transaction; a failed transaction leaves the catalog unchanged
//! (runtime objects already created are reaped later by the name-prefix
//! sweep).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::records::*;
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A volume to be recorded alongside a new container.
#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub runtime_volume_id: String,
    pub mountpoint: String,
}

/// Thread-safe catalog handle backed by redb.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

impl Catalog {
    /// Open (or create) the catalog at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let catalog = Self { db: Arc::new(db) };
        catalog.ensure_tables()?;
        debug!(?path, "catalog opened");
        Ok(catalog)
    }

    /// Create an ephemeral in-memory catalog (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let catalog = Self { db: Arc::new(db) };
        catalog.ensure_tables()?;
        Ok(catalog)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(APPS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(CONTAINERS).map_err(map_err!(Table))?;
        txn.open_table(VOLUMES).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// List all app rows.
    pub fn list_apps(&self) -> StateResult<Vec<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        let mut apps = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let app: AppRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            apps.push(app);
        }
        Ok(apps)
    }

    /// Look up an app row by its unique name.
    pub fn get_app_by_name(&self, name: &str) -> StateResult<Option<AppRecord>> {
        Ok(self.list_apps()?.into_iter().find(|a| a.name == name))
    }

    /// Get a deployment row by id.
    pub fn get_deployment(&self, id: u64) -> StateResult<Option<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(id_key(id).as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let deployment: DeploymentRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(deployment))
            }
            None => Ok(None),
        }
    }

    /// Find a deployment row by its unique url.
    pub fn find_deployment_by_url(&self, url: &str) -> StateResult<Option<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let deployment: DeploymentRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if deployment.url == url {
                return Ok(Some(deployment));
            }
        }
        Ok(None)
    }

    /// List all container rows belonging to a deployment.
    pub fn list_containers(&self, deployment_id: u64) -> StateResult<Vec<ContainerRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONTAINERS).map_err(map_err!(Table))?;
        let mut containers = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let container: ContainerRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if container.deployment_id == deployment_id {
                containers.push(container);
            }
        }
        Ok(containers)
    }

    /// List all volume rows owned by a container (by runtime id).
    pub fn list_volumes(&self, container_runtime_id: &str) -> StateResult<Vec<VolumeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VOLUMES).map_err(map_err!(Table))?;
        let mut volumes = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let volume: VolumeRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if volume.container_id == container_runtime_id {
                volumes.push(volume);
            }
        }
        Ok(volumes)
    }

    /// Expand every app end-to-end (deployment → containers → volumes)
    /// for startup reconstruction.
    pub fn load_apps(&self) -> StateResult<Vec<LoadedApp>> {
        let mut loaded = Vec::new();
        for app in self.list_apps()? {
            let deployment = self.get_deployment(app.deployment_id)?.ok_or_else(|| {
                StateError::NotFound(format!("deployment {} of app {}", app.deployment_id, app.name))
            })?;

            let mut containers = Vec::new();
            for record in self.list_containers(deployment.id)? {
                let volumes = self.list_volumes(&record.runtime_container_id)?;
                containers.push(LoadedContainer { record, volumes });
            }

            loaded.push(LoadedApp {
                app,
                deployment,
                containers,
            });
        }
        Ok(loaded)
    }

    // ── Composite writes ───────────────────────────────────────────

    /// Record a brand-new app: deployment, head container, its volume,
    /// and the app row, all in one transaction. Fails with `Duplicate`
    /// if the name or url is already taken.
    pub fn commit_new_app(
        &self,
        name: &str,
        url: &str,
        port: u16,
        runtime_container_id: &str,
        volume: &VolumeSpec,
    ) -> StateResult<LoadedApp> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let loaded;
        {
            let mut apps = txn.open_table(APPS).map_err(map_err!(Table))?;
            let mut deployments = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let mut containers = txn.open_table(CONTAINERS).map_err(map_err!(Table))?;
            let mut volumes = txn.open_table(VOLUMES).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;

            for entry in apps.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let app: AppRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if app.name == name {
                    return Err(StateError::Duplicate(format!("app {name}")));
                }
            }
            for entry in deployments.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let deployment: DeploymentRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if deployment.url == url {
                    return Err(StateError::Duplicate(format!("deployment url {url}")));
                }
            }

            let deployment = DeploymentRecord {
                id: next_id(&mut meta, "deployments")?,
                url: url.to_string(),
                port,
            };
            put_row(&mut deployments, deployment.id, &deployment)?;

            let container = ContainerRecord {
                id: next_id(&mut meta, "containers")?,
                runtime_container_id: runtime_container_id.to_string(),
                deployment_id: deployment.id,
                head: true,
            };
            put_row(&mut containers, container.id, &container)?;

            let volume = VolumeRecord {
                id: next_id(&mut meta, "volumes")?,
                runtime_volume_id: volume.runtime_volume_id.clone(),
                mountpoint: volume.mountpoint.clone(),
                container_id: runtime_container_id.to_string(),
            };
            put_row(&mut volumes, volume.id, &volume)?;

            let app = AppRecord {
                id: next_id(&mut meta, "apps")?,
                name: name.to_string(),
                deployment_id: deployment.id,
            };
            put_row(&mut apps, app.id, &app)?;

            loaded = LoadedApp {
                app,
                deployment,
                containers: vec![LoadedContainer {
                    record: container,
                    volumes: vec![volume],
                }],
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name, url, "new app committed");
        Ok(loaded)
    }

    /// Record the upgrade container: insert the new head row, demote the
    /// previous head, and re-point its volumes at the new container, all
    /// in one transaction. Ownership is transferred, never cloned.
    pub fn commit_upgrade(
        &self,
        deployment_id: u64,
        new_runtime_id: &str,
        old_head_runtime_id: &str,
    ) -> StateResult<ContainerRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let new_container;
        {
            let mut containers = txn.open_table(CONTAINERS).map_err(map_err!(Table))?;
            let mut volumes = txn.open_table(VOLUMES).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;

            let old_head = find_container_by_runtime_id(&containers, old_head_runtime_id)?
                .ok_or_else(|| StateError::NotFound(format!("head {old_head_runtime_id}")))?;
            let demoted = ContainerRecord {
                head: false,
                ..old_head
            };
            put_row(&mut containers, demoted.id, &demoted)?;

            new_container = ContainerRecord {
                id: next_id(&mut meta, "containers")?,
                runtime_container_id: new_runtime_id.to_string(),
                deployment_id,
                head: true,
            };
            put_row(&mut containers, new_container.id, &new_container)?;

            rebind_volume_rows(&mut volumes, old_head_runtime_id, new_runtime_id)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            deployment_id,
            new = &new_runtime_id[..12.min(new_runtime_id.len())],
            "upgrade container committed"
        );
        Ok(new_container)
    }

    /// Undo a `commit_upgrade` after a failed health gate: delete the
    /// new container row, re-promote the previous head, and re-point the
    /// volumes back at it.
    pub fn rollback_upgrade(
        &self,
        new_container: &ContainerRecord,
        old_head_runtime_id: &str,
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut containers = txn.open_table(CONTAINERS).map_err(map_err!(Table))?;
            let mut volumes = txn.open_table(VOLUMES).map_err(map_err!(Table))?;

            containers
                .remove(id_key(new_container.id).as_str())
                .map_err(map_err!(Write))?;

            let old_head = find_container_by_runtime_id(&containers, old_head_runtime_id)?
                .ok_or_else(|| StateError::NotFound(format!("head {old_head_runtime_id}")))?;
            let promoted = ContainerRecord {
                head: true,
                ..old_head
            };
            put_row(&mut containers, promoted.id, &promoted)?;

            rebind_volume_rows(
                &mut volumes,
                &new_container.runtime_container_id,
                old_head_runtime_id,
            )?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Update a deployment's url and port. Fails with `Duplicate` if the
    /// url belongs to a different deployment.
    pub fn update_deployment(&self, id: u64, url: &str, port: u16) -> StateResult<DeploymentRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut deployments = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;

            for entry in deployments.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let other: DeploymentRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if other.url == url && other.id != id {
                    return Err(StateError::Duplicate(format!("deployment url {url}")));
                }
            }

            let existing = deployments
                .get(id_key(id).as_str())
                .map_err(map_err!(Read))?
                .ok_or_else(|| StateError::NotFound(format!("deployment {id}")))
                .map(|guard| serde_json::from_slice::<DeploymentRecord>(guard.value()))?
                .map_err(map_err!(Deserialize))?;

            updated = DeploymentRecord {
                url: url.to_string(),
                port,
                ..existing
            };
            put_row(&mut deployments, updated.id, &updated)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    /// Delete every container row whose runtime id is in `runtime_ids`,
    /// in one transaction. Returns the rows that were deleted.
    pub fn delete_containers_by_runtime_ids(
        &self,
        runtime_ids: &[String],
    ) -> StateResult<Vec<ContainerRecord>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut deleted = Vec::new();
        {
            let mut containers = txn.open_table(CONTAINERS).map_err(map_err!(Table))?;

            let mut doomed = Vec::new();
            for entry in containers.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let container: ContainerRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if runtime_ids.contains(&container.runtime_container_id) {
                    doomed.push(container);
                }
            }
            for container in doomed {
                containers
                    .remove(id_key(container.id).as_str())
                    .map_err(map_err!(Write))?;
                debug!(
                    container_id = &container.runtime_container_id
                        [..12.min(container.runtime_container_id.len())],
                    "old generation container row deleted"
                );
                deleted.push(container);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(deleted)
    }

    /// Remove an app and everything under it: volume rows, container
    /// rows, the deployment row, and the app row, in one transaction.
    pub fn remove_app_cascade(&self, app: &AppRecord) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut apps = txn.open_table(APPS).map_err(map_err!(Table))?;
            let mut deployments = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let mut containers = txn.open_table(CONTAINERS).map_err(map_err!(Table))?;
            let mut volumes = txn.open_table(VOLUMES).map_err(map_err!(Table))?;

            let mut doomed_containers = Vec::new();
            for entry in containers.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let container: ContainerRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if container.deployment_id == app.deployment_id {
                    doomed_containers.push(container);
                }
            }

            let mut doomed_volumes = Vec::new();
            for entry in volumes.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let volume: VolumeRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if doomed_containers
                    .iter()
                    .any(|c| c.runtime_container_id == volume.container_id)
                {
                    doomed_volumes.push(volume.id);
                }
            }

            for id in doomed_volumes {
                volumes.remove(id_key(id).as_str()).map_err(map_err!(Write))?;
            }
            for container in doomed_containers {
                containers
                    .remove(id_key(container.id).as_str())
                    .map_err(map_err!(Write))?;
            }
            deployments
                .remove(id_key(app.deployment_id).as_str())
                .map_err(map_err!(Write))?;
            apps.remove(id_key(app.id).as_str()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %app.name, "app removed from catalog");
        Ok(())
    }
}

// ── Write-transaction helpers ──────────────────────────────────────

/// Allocate the next monotonic id for `counter` within a write txn.
fn next_id(
    meta: &mut redb::Table<'_, &'static str, u64>,
    counter: &str,
) -> StateResult<u64> {
    let current = meta
        .get(counter)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let id = current + 1;
    meta.insert(counter, id).map_err(map_err!(Write))?;
    Ok(id)
}

/// Serialize and store a row under its id key.
fn put_row<T: serde::Serialize>(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    id: u64,
    row: &T,
) -> StateResult<()> {
    let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
    table
        .insert(id_key(id).as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

/// Scan the containers table for a row by runtime id.
fn find_container_by_runtime_id(
    table: &redb::Table<'_, &'static str, &'static [u8]>,
    runtime_id: &str,
) -> StateResult<Option<ContainerRecord>> {
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let container: ContainerRecord =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if container.runtime_container_id == runtime_id {
            return Ok(Some(container));
        }
    }
    Ok(None)
}

/// Re-point every volume row owned by `from` at `to`.
fn rebind_volume_rows(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    from: &str,
    to: &str,
) -> StateResult<()> {
    let mut rebound = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let volume: VolumeRecord =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if volume.container_id == from {
            rebound.push(VolumeRecord {
                container_id: to.to_string(),
                ..volume
            });
        }
    }
    for volume in rebound {
        let value = serde_json::to_vec(&volume).map_err(map_err!(Serialize))?;
        table
            .insert(id_key(volume.id).as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_spec() -> VolumeSpec {
        VolumeSpec {
            runtime_volume_id: "vol-1".to_string(),
            mountpoint: "/workspace".to_string(),
        }
    }

    fn new_app(catalog: &Catalog, name: &str, url: &str, runtime_id: &str) -> LoadedApp {
        catalog
            .commit_new_app(name, url, 8080, runtime_id, &volume_spec())
            .unwrap()
    }

    #[test]
    fn new_app_commits_all_four_rows() {
        let catalog = Catalog::open_in_memory().unwrap();
        let loaded = new_app(&catalog, "web", "web.test", "head-1");

        assert_eq!(loaded.app.name, "web");
        assert_eq!(loaded.deployment.url, "web.test");
        assert_eq!(loaded.containers.len(), 1);
        assert!(loaded.containers[0].record.head);
        assert_eq!(loaded.containers[0].volumes[0].container_id, "head-1");

        let apps = catalog.list_apps().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].deployment_id, loaded.deployment.id);
    }

    #[test]
    fn duplicate_app_name_is_rejected() {
        let catalog = Catalog::open_in_memory().unwrap();
        new_app(&catalog, "web", "web.test", "head-1");

        let err = catalog
            .commit_new_app("web", "other.test", 8080, "head-2", &volume_spec())
            .unwrap_err();
        assert!(matches!(err, StateError::Duplicate(_)));
        // The failed transaction left nothing behind.
        assert_eq!(catalog.list_apps().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_url_across_apps_is_rejected() {
        let catalog = Catalog::open_in_memory().unwrap();
        new_app(&catalog, "web", "web.test", "head-1");

        let err = catalog
            .commit_new_app("api", "web.test", 9090, "head-2", &volume_spec())
            .unwrap_err();
        assert!(matches!(err, StateError::Duplicate(_)));
    }

    #[test]
    fn ids_are_monotonic() {
        let catalog = Catalog::open_in_memory().unwrap();
        let first = new_app(&catalog, "a", "a.test", "head-1");
        let second = new_app(&catalog, "b", "b.test", "head-2");

        assert!(second.app.id > first.app.id);
        assert!(second.deployment.id > first.deployment.id);
        assert!(second.containers[0].record.id > first.containers[0].record.id);
    }

    #[test]
    fn upgrade_swaps_head_and_rebinds_volumes() {
        let catalog = Catalog::open_in_memory().unwrap();
        let loaded = new_app(&catalog, "web", "web.test", "head-1");
        let deployment_id = loaded.deployment.id;

        let new = catalog
            .commit_upgrade(deployment_id, "head-2", "head-1")
            .unwrap();
        assert!(new.head);

        let containers = catalog.list_containers(deployment_id).unwrap();
        assert_eq!(containers.len(), 2);
        let heads: Vec<_> = containers.iter().filter(|c| c.head).collect();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].runtime_container_id, "head-2");

        // Volume ownership transferred, not cloned.
        assert!(catalog.list_volumes("head-1").unwrap().is_empty());
        let volumes = catalog.list_volumes("head-2").unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].runtime_volume_id, "vol-1");
    }

    #[test]
    fn rollback_restores_old_head_and_volumes() {
        let catalog = Catalog::open_in_memory().unwrap();
        let loaded = new_app(&catalog, "web", "web.test", "head-1");
        let deployment_id = loaded.deployment.id;

        let new = catalog
            .commit_upgrade(deployment_id, "head-2", "head-1")
            .unwrap();
        catalog.rollback_upgrade(&new, "head-1").unwrap();

        let containers = catalog.list_containers(deployment_id).unwrap();
        assert_eq!(containers.len(), 1);
        assert!(containers[0].head);
        assert_eq!(containers[0].runtime_container_id, "head-1");
        assert_eq!(catalog.list_volumes("head-1").unwrap().len(), 1);
        assert!(catalog.list_volumes("head-2").unwrap().is_empty());
    }

    #[test]
    fn update_deployment_changes_url_and_port() {
        let catalog = Catalog::open_in_memory().unwrap();
        let loaded = new_app(&catalog, "web", "web.test", "head-1");

        let updated = catalog
            .update_deployment(loaded.deployment.id, "web2.test", 9000)
            .unwrap();
        assert_eq!(updated.url, "web2.test");
        assert_eq!(updated.port, 9000);

        let reread = catalog.get_deployment(loaded.deployment.id).unwrap().unwrap();
        assert_eq!(reread, updated);
    }

    #[test]
    fn update_deployment_rejects_stolen_url() {
        let catalog = Catalog::open_in_memory().unwrap();
        new_app(&catalog, "web", "web.test", "head-1");
        let api = new_app(&catalog, "api", "api.test", "head-2");

        let err = catalog
            .update_deployment(api.deployment.id, "web.test", 9000)
            .unwrap_err();
        assert!(matches!(err, StateError::Duplicate(_)));
    }

    #[test]
    fn delete_by_runtime_ids_returns_deleted_rows() {
        let catalog = Catalog::open_in_memory().unwrap();
        let loaded = new_app(&catalog, "web", "web.test", "head-1");
        catalog
            .commit_upgrade(loaded.deployment.id, "head-2", "head-1")
            .unwrap();

        let deleted = catalog
            .delete_containers_by_runtime_ids(&["head-1".to_string(), "stranger".to_string()])
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].runtime_container_id, "head-1");

        let remaining = catalog.list_containers(loaded.deployment.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].runtime_container_id, "head-2");
    }

    #[test]
    fn cascade_removal_leaves_no_rows() {
        let catalog = Catalog::open_in_memory().unwrap();
        let web = new_app(&catalog, "web", "web.test", "head-1");
        let api = new_app(&catalog, "api", "api.test", "head-2");

        catalog.remove_app_cascade(&web.app).unwrap();

        assert!(catalog.get_app_by_name("web").unwrap().is_none());
        assert!(catalog.get_deployment(web.deployment.id).unwrap().is_none());
        assert!(catalog.list_containers(web.deployment.id).unwrap().is_empty());
        assert!(catalog.list_volumes("head-1").unwrap().is_empty());
        // The other app is untouched.
        assert!(catalog.get_app_by_name("api").unwrap().is_some());
        assert_eq!(catalog.list_volumes("head-2").unwrap().len(), 1);
        let _ = api;
    }

    #[test]
    fn load_apps_expands_end_to_end() {
        let catalog = Catalog::open_in_memory().unwrap();
        let loaded = new_app(&catalog, "web", "web.test", "head-1");
        catalog
            .commit_upgrade(loaded.deployment.id, "head-2", "head-1")
            .unwrap();

        let apps = catalog.load_apps().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].containers.len(), 2);

        let head: Vec<_> = apps[0]
            .containers
            .iter()
            .filter(|c| c.record.head)
            .collect();
        assert_eq!(head.len(), 1);
        assert_eq!(head[0].volumes.len(), 1);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fluxd.db");

        {
            let catalog = Catalog::open(&db_path).unwrap();
            new_app(&catalog, "web", "web.test", "head-1");
        }

        let catalog = Catalog::open(&db_path).unwrap();
        let app = catalog.get_app_by_name("web").unwrap();
        assert!(app.is_some());

        // Counters continue past the reopen instead of reusing ids.
        let next = new_app(&catalog, "api", "api.test", "head-2");
        assert!(next.app.id > app.unwrap().id);
    }

    #[test]
    fn empty_catalog_reads() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(catalog.list_apps().unwrap().is_empty());
        assert!(catalog.load_apps().unwrap().is_empty());
        assert!(catalog.get_app_by_name("web").unwrap().is_none());
        assert!(catalog.find_deployment_by_url("web.test").unwrap().is_none());
        assert!(catalog
            .delete_containers_by_runtime_ids(&["x".to_string()])
            .unwrap()
            .is_empty());
    }
}
