//! Admin API handlers.
//!
//! Thin adapters over the deployer: parse the request, call into the
//! deployment core, map errors onto status codes. The deploy endpoint
//! parses the whole multipart form before any event is streamed, so
//! validation failures are plain 4xx responses; once the pipeline
//! starts, progress flows as server-sent events.

use std::convert::Infallible;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio::io::AsyncWriteExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use flux_core::{AppSummary, DaemonInfo, DeploymentEvent, DeploymentStatus, ProjectConfig};
use flux_deploy::{DeployError, Deployer};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub deployer: Deployer,
    pub info: DaemonInfo,
}

/// Build the admin API router.
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/deploy", post(deploy))
        .route("/start/{name}", post(start_app))
        .route("/stop/{name}", post(stop_app))
        .route("/deployments/{name}", delete(delete_app))
        .route("/deployments", delete(delete_all))
        .route("/apps", get(list_apps))
        .route("/heartbeat", get(heartbeat))
        .with_state(state)
}

fn error_status(err: &DeployError) -> StatusCode {
    match err {
        DeployError::InProgress(_) | DeployError::Conflict(_) => StatusCode::CONFLICT,
        DeployError::Validation(_) | DeployError::Project(_) => StatusCode::BAD_REQUEST,
        DeployError::AppNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── POST /deploy ───────────────────────────────────────────────────

/// Accept a deploy submission: a `config` part (flux.json) and a `code`
/// part (tar archive). Responds 207 with an SSE stream of pipeline
/// events; terminal outcomes are a `complete` or `error` event.
async fn deploy(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    let mut config: Option<ProjectConfig> = None;
    let mut archive: Option<tempfile::NamedTempFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };

        match field.name() {
            Some("config") => {
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
                };
                config = match serde_json::from_slice(&bytes) {
                    Ok(config) => Some(config),
                    Err(_) => {
                        return (StatusCode::BAD_REQUEST, "Invalid flux.json").into_response()
                    }
                };
            }
            Some("code") => match spool_archive(field).await {
                Ok(file) => archive = Some(file),
                Err(resp) => return resp,
            },
            _ => {}
        }
    }

    let Some(config) = config else {
        return (StatusCode::BAD_REQUEST, "No flux.json found").into_response();
    };
    let Some(archive) = archive else {
        return (StatusCode::BAD_REQUEST, "No code archive found").into_response();
    };
    if let Err(e) = config.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    // Stage 1: one pipeline per app; a concurrent deploy conflicts.
    let token = match state.deployer.begin(&config.name) {
        Ok(token) => token,
        Err(e) => return (error_status(&e), e.to_string()).into_response(),
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<DeploymentEvent>(10);
    let _ = tx.try_send(DeploymentEvent::Start {
        message: "Uploading code".to_string(),
    });

    // One producer task runs the pipeline; the SSE writer below drains
    // the channel. The channel closes exactly once, when the producer
    // drops its sender on exit.
    let deployer = state.deployer.clone();
    tokio::spawn(async move {
        let result = deployer.run(&config, archive.path(), &token, &tx).await;
        match result {
            Ok(app) => {
                let _ = tx.send(DeploymentEvent::Complete { app }).await;
            }
            Err(e) => {
                error!(name = %config.name, error = %e, "deploy failed");
                let _ = tx
                    .send(DeploymentEvent::Error {
                        message: e.to_string(),
                        code: Some(error_status(&e).as_u16()),
                    })
                    .await;
            }
        }
        deployer.finish(&config.name);
        drop(archive);
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let frame = Event::default().event(event.stage());
        Ok::<_, Infallible>(match frame.json_data(&event) {
            Ok(frame) => frame,
            Err(_) => Event::default().event("error").data("failed to encode event"),
        })
    });

    (StatusCode::MULTI_STATUS, Sse::new(stream)).into_response()
}

/// Stream the code part to a temp file so the pipeline can read it as
/// many times as it likes.
async fn spool_archive(
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<tempfile::NamedTempFile, Response> {
    let spooled = tempfile::NamedTempFile::new()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())?;
    let mut out = tokio::fs::File::create(spooled.path())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())?;
    }
    out.flush()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())?;

    Ok(spooled)
}

// ── Lifecycle endpoints ────────────────────────────────────────────

async fn start_app(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    let Some(app) = state.deployer.registry().get(&name) else {
        return (StatusCode::NOT_FOUND, "App not found").into_response();
    };

    let runtime = state.deployer.runtime();
    match app.deployment.status(runtime.as_ref()).await {
        Ok(DeploymentStatus::Running) => {
            return (StatusCode::BAD_REQUEST, "App is already running").into_response()
        }
        Ok(_) => {}
        Err(e) => return (error_status(&e), e.to_string()).into_response(),
    }

    match app
        .deployment
        .start(runtime.as_ref(), state.deployer.router())
        .await
    {
        Ok(()) => {
            info!(name, "deployment started");
            StatusCode::OK.into_response()
        }
        Err(e) => (error_status(&e), e.to_string()).into_response(),
    }
}

async fn stop_app(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    let Some(app) = state.deployer.registry().get(&name) else {
        return (StatusCode::NOT_FOUND, "App not found").into_response();
    };

    let runtime = state.deployer.runtime();
    match app.deployment.status(runtime.as_ref()).await {
        Ok(DeploymentStatus::Stopped) => {
            return (StatusCode::BAD_REQUEST, "App is already stopped").into_response()
        }
        Ok(_) => {}
        Err(e) => return (error_status(&e), e.to_string()).into_response(),
    }

    match app
        .deployment
        .stop(runtime.as_ref(), state.deployer.router())
        .await
    {
        Ok(()) => {
            info!(name, "deployment stopped");
            StatusCode::OK.into_response()
        }
        Err(e) => (error_status(&e), e.to_string()).into_response(),
    }
}

async fn delete_app(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.deployer.remove_app(&name).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (error_status(&e), e.to_string()).into_response(),
    }
}

async fn delete_all(State(state): State<ApiState>) -> Response {
    match state.deployer.remove_all().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (error_status(&e), e.to_string()).into_response(),
    }
}

// ── Introspection endpoints ────────────────────────────────────────

async fn list_apps(State(state): State<ApiState>) -> Response {
    let runtime = state.deployer.runtime();
    let mut summaries: Vec<AppSummary> = Vec::new();

    for app in state.deployer.registry().list() {
        let status = match app.deployment.status(runtime.as_ref()).await {
            Ok(status) => status,
            Err(e) => return (error_status(&e), e.to_string()).into_response(),
        };
        summaries.push(AppSummary {
            id: app.id,
            name: app.name.clone(),
            deployment_id: app.deployment.id,
            deployment_status: status,
        });
    }

    summaries.sort_by_key(|s| s.id);
    Json(summaries).into_response()
}

async fn heartbeat(State(state): State<ApiState>) -> Json<DaemonInfo> {
    Json(state.info.clone())
}
