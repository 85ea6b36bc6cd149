//! Recording session control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Requesting camera access (POST /permission)
//! - Recording controls (POST /start, /pause, /resume, /stop)
//! - Reviewing the result (POST /discard, /accept)
//! - Getting session status (GET /status)

use crate::api::error::{ApiError, ApiResult};
use crate::recorder::{SessionCommand, SessionError, SessionState, SessionStatus, SessionStatusHandle};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

/// A user action forwarded to the session loop, with a slot for its outcome.
#[derive(Debug)]
pub struct ApiCommand {
    pub command: SessionCommand,
    pub reply: oneshot::Sender<Result<SessionState, SessionError>>,
}

#[derive(Clone)]
pub struct SessionRouteState {
    pub tx: mpsc::Sender<ApiCommand>,
    pub status: SessionStatusHandle,
}

/// Creates the session router with all recording-related endpoints.
pub fn router(state: SessionRouteState) -> Router {
    Router::new()
        .route("/permission", post(request_permission))
        .route("/start", post(start))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/stop", post(stop))
        .route("/discard", post(discard))
        .route("/accept", post(accept))
        .route("/status", get(session_status))
        .with_state(state)
}

/// Starts a camera access request. The grant is reported through /status.
async fn request_permission(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::RequestPermission).await
}

async fn start(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::Start).await
}

async fn pause(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::Pause).await
}

async fn resume(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::Resume).await
}

async fn stop(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::Stop).await
}

/// "Record again".
async fn discard(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::Discard).await
}

/// "Save video": uploads the recording and releases the camera.
async fn accept(State(state): State<SessionRouteState>) -> ApiResult<Json<Value>> {
    dispatch(&state, SessionCommand::Accept).await
}

/// Gets the current session status, including the `MM:SS` elapsed display.
async fn session_status(State(state): State<SessionRouteState>) -> Json<Value> {
    Json(status_body(&state.status.get()))
}

async fn dispatch(state: &SessionRouteState, command: SessionCommand) -> ApiResult<Json<Value>> {
    info!("{} command received via API", command.as_str());

    let (reply, outcome) = oneshot::channel();
    if let Err(e) = state.tx.send(ApiCommand { command, reply }).await {
        error!("Failed to send {} command: {}", command.as_str(), e);
        return Err(ApiError::internal("Recording session is not running"));
    }

    let session_state = outcome
        .await
        .map_err(|_| ApiError::internal("Recording session dropped the command"))??;

    Ok(Json(json!({
        "success": true,
        "state": session_state.as_str(),
        "message": format!("Session {}", session_state.as_str()),
        "status": status_body(&state.status.get()),
    })))
}

fn status_body(status: &SessionStatus) -> Value {
    let mut body = json!(status);
    body["elapsed"] = json!(status.elapsed_display());
    body
}
