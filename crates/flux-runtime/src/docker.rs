//! Docker CLI adapter.
//!
//! Drives the `docker` binary through [`tokio::process`]. Output is
//! parsed from `docker inspect` JSON; everything else only cares about
//! the exit status. The adapter surfaces stderr verbatim and never
//! retries.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::types::*;
use crate::ContainerRuntime;

/// Container runtime backed by the local `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Use an alternative docker-compatible binary (e.g. `podman`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the CLI with `args`, returning trimmed stdout on success.
    async fn run(&self, args: &[&str]) -> RuntimeResult<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(RuntimeError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("No such container") || stderr.contains("no such container") {
                return Err(RuntimeError::NotFound(stderr));
            }
            return Err(RuntimeError::Command {
                command: format!("{} {}", self.program, args.join(" ")),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
        debug!(image = reference, "pulling image");
        self.run(&["pull", reference]).await?;
        Ok(())
    }

    async fn create_container(&self, spec: CreateContainer) -> RuntimeResult<String> {
        let mut args: Vec<String> = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--restart".to_string(),
            "unless-stopped".to_string(),
            "--network".to_string(),
            "bridge".to_string(),
        ];
        for entry in &spec.env {
            args.push("--env".to_string());
            args.push(entry.clone());
        }
        for binding in &spec.volumes {
            args.push("--volume".to_string());
            args.push(format!("{}:{}", binding.volume_id, binding.mountpoint));
        }
        args.push(spec.image.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let id = self.run(&arg_refs).await?;
        if id.is_empty() {
            return Err(RuntimeError::Parse(
                "docker create returned no container id".to_string(),
            ));
        }
        debug!(container_id = %&id[..12.min(id.len())], name = %spec.name, "container created");
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.run(&["start", id]).await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> RuntimeResult<()> {
        match timeout {
            Some(t) => {
                let secs = t.as_secs().to_string();
                self.run(&["stop", "--time", &secs, id]).await?;
            }
            None => {
                self.run(&["stop", id]).await?;
            }
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        self.run(&["rm", id]).await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerInspect> {
        let stdout = self.run(&["inspect", id]).await?;
        let parsed: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| RuntimeError::Parse(e.to_string()))?;
        let entry = parsed
            .get(0)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;

        let status = entry
            .pointer("/State/Status")
            .and_then(|v| v.as_str())
            .map(ContainerStatus::parse)
            .ok_or_else(|| RuntimeError::Parse("inspect output missing State.Status".to_string()))?;
        let ip_address = entry
            .pointer("/NetworkSettings/IPAddress")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(ContainerInspect { status, ip_address })
    }

    async fn create_volume(&self) -> RuntimeResult<VolumeInfo> {
        let id = self.run(&["volume", "create"]).await?;
        let stdout = self.run(&["volume", "inspect", &id]).await?;
        let parsed: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| RuntimeError::Parse(e.to_string()))?;
        let mountpoint = parsed
            .pointer("/0/Mountpoint")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        debug!(volume_id = %id, "volume created");
        Ok(VolumeInfo { id, mountpoint })
    }

    async fn remove_volume(&self, id: &str, force: bool) -> RuntimeResult<()> {
        if force {
            self.run(&["volume", "rm", "--force", id]).await?;
        } else {
            self.run(&["volume", "rm", id]).await?;
        }
        Ok(())
    }

    async fn list_containers(&self, name_prefix: &str) -> RuntimeResult<Vec<String>> {
        let stdout = self
            .run(&["ps", "--all", "--no-trunc", "--format", "{{.ID}} {{.Names}}"])
            .await?;

        let mut ids = Vec::new();
        for line in stdout.lines() {
            let Some((id, names)) = line.split_once(' ') else {
                continue;
            };
            // A container can carry several names, comma-separated.
            if names.split(',').any(|name| name.starts_with(name_prefix)) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}
