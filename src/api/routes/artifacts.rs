//! Playback of recordings under review.

use crate::api::error::{ApiError, ApiResult};
use crate::recorder::LocatorRegistry;
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

pub fn router(locators: LocatorRegistry) -> Router {
    Router::new()
        .route("/:id", get(get_artifact))
        .with_state(locators)
}

/// GET /artifacts/:id - Stream a recording by its locator id.
///
/// Revoked locators are gone for good and answer 404.
async fn get_artifact(
    State(locators): State<LocatorRegistry>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let artifact = locators
        .resolve(&id)
        .ok_or_else(|| ApiError::not_found(format!("Recording {} not found", id)))?;

    Ok(([(header::CONTENT_TYPE, artifact.mime_type)], artifact.payload).into_response())
}
