//! REST API server for vidintro.
//!
//! Provides HTTP endpoints for:
//! - Session control (permission, start, pause, resume, stop, discard, accept)
//! - Session status with the elapsed `MM:SS` display
//! - Playback of the recording under review

pub mod error;
pub mod routes;

use crate::config::Config;
use crate::recorder::{LocatorRegistry, SessionStatusHandle};
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

pub use routes::session::{ApiCommand, SessionRouteState};

pub struct ApiServer {
    port: u16,
    session_state: SessionRouteState,
    locators: LocatorRegistry,
}

impl ApiServer {
    pub fn new(
        tx: mpsc::Sender<ApiCommand>,
        status: SessionStatusHandle,
        locators: LocatorRegistry,
        config: &Config,
    ) -> Self {
        Self {
            port: config.api.port,
            session_state: SessionRouteState { tx, status },
            locators,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/", get(status))
            .merge(routes::session::router(self.session_state.clone()))
            .nest("/artifacts", routes::artifacts::router(self.locators.clone()))
    }

    pub async fn start(self) -> Result<()> {
        let app = self.build_router();
        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /              - Service info");
        info!("  POST /permission    - Request camera access");
        info!("  POST /start         - Start recording");
        info!("  POST /pause         - Pause recording");
        info!("  POST /resume        - Resume recording");
        info!("  POST /stop          - Stop and review");
        info!("  POST /discard       - Record again");
        info!("  POST /accept        - Save video");
        info!("  GET  /status        - Get session status");
        info!("  GET  /artifacts/:id - Play back a recording");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "vidintro",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
