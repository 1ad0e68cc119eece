//! Prepare and image-build subprocess invocation.
//!
//! Both stages run an external command in the staged project directory
//! and stream its combined stdout/stderr line-by-line as `cmd_output`
//! events. A non-zero exit fails the pipeline; cancelling the deploy
//! kills the child at the next read.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flux_core::DeploymentEvent;

use crate::error::DeployError;

/// Command run in the staged directory before the image build.
const PREPARE_COMMAND: [&str; 2] = ["go", "generate"];

/// Builder CLI invoked against the staged source tree.
const BUILDER_COMMAND: &str = "pack";

/// The image tag a project builds into.
pub fn image_name(project: &str) -> String {
    format!("flux_{project}-image")
}

/// Run the project's prepare step.
pub async fn prepare(
    project_dir: &Path,
    events: &mpsc::Sender<DeploymentEvent>,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    run_streamed(PREPARE_COMMAND[0], &PREPARE_COMMAND[1..], project_dir, events, cancel).await
}

/// Build the project image with the configured buildpack builder.
/// Returns the image tag.
pub async fn build_image(
    project: &str,
    builder: &str,
    project_dir: &Path,
    events: &mpsc::Sender<DeploymentEvent>,
    cancel: &CancellationToken,
) -> Result<String, DeployError> {
    let image = image_name(project);
    run_streamed(
        BUILDER_COMMAND,
        &["build", &image, "--builder", builder],
        project_dir,
        events,
        cancel,
    )
    .await?;
    Ok(image)
}

/// Spawn `program args..` in `dir`, forwarding each output line as a
/// `cmd_output` event.
pub async fn run_streamed(
    program: &str,
    args: &[&str],
    dir: &Path,
    events: &mpsc::Sender<DeploymentEvent>,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    debug!(program, ?args, dir = %dir.display(), "running command");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let out_task = tokio::spawn(stream_lines(stdout, events.clone()));
    let err_task = tokio::spawn(stream_lines(stderr, events.clone()));

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            child.kill().await.ok();
            return Err(DeployError::Cancelled);
        }
    };

    // Drain whatever output is still buffered.
    out_task.await.ok();
    err_task.await.ok();

    if !status.success() {
        return Err(DeployError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

async fn stream_lines(pipe: impl AsyncRead + Unpin, events: mpsc::Sender<DeploymentEvent>) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        // A dropped receiver just means the client went away.
        let _ = events
            .send(DeploymentEvent::CmdOutput { message: line })
            .await;
    }
}
