//! Pre-cutover health gate.
//!
//! A new container is ready once the runtime reports it `running` and it
//! answers `200 OK` on `GET /`. The gate polls once a second and gives
//! up after 30 seconds; failure is fatal to the pipeline and triggers
//! rollback.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use flux_runtime::{ContainerRuntime, ContainerStatus};

use crate::error::DeployError;

/// Deadline for the container to become ready.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between readiness probes.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait until `container_id` is running and serving on `port`.
pub async fn wait_until_ready(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    port: u16,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    let gate = async {
        loop {
            let inspect = runtime.inspect_container(container_id).await?;
            if inspect.status == ContainerStatus::Running
                && http_probe(&format!("{}:{}", inspect.ip_address, port)).await
            {
                debug!(
                    container_id = &container_id[..12.min(container_id.len())],
                    "container passed the health gate"
                );
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    let gated = tokio::time::timeout(READY_TIMEOUT, gate);
    match cancel.run_until_cancelled(gated).await {
        None => Err(DeployError::Cancelled),
        Some(Err(_)) => Err(DeployError::HealthGate(
            "container failed to become ready in time".to_string(),
        )),
        Some(Ok(result)) => result,
    }
}

/// One HTTP probe: `GET http://<address>/` answered with `200 OK`.
async fn http_probe(address: &str) -> bool {
    let stream = match tokio::net::TcpStream::connect(address).await {
        Ok(s) => s,
        Err(e) => {
            debug!(address, error = %e, "health probe connection failed");
            return false;
        }
    };

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(address, error = %e, "health probe handshake failed");
            return false;
        }
    };

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(format!("http://{address}/"))
        .header("host", address)
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .expect("static request");

    match sender.send_request(req).await {
        Ok(resp) => resp.status() == http::StatusCode::OK,
        Err(e) => {
            debug!(address, error = %e, "health probe request failed");
            false
        }
    }
}
