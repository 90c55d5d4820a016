//! Blob download handler.

use crate::extractors::AuthUser;
use crate::response::Envelope;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;

/// Serve the blob for a content hash. The service resolves the hash to a
/// path (404 for unknown or malformed hashes); this handler streams the
/// bytes back as an opaque binary body.
pub async fn fetch_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(hash): Path<String>,
) -> Response {
    let envelope = state.service(user).fetch_file(&hash).await;
    if envelope.code != StatusCode::OK {
        return envelope.into_response();
    }
    let Some(path) = envelope.body.as_str().map(PathBuf::from) else {
        return envelope.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "could not read blob");
            Envelope::message(StatusCode::NOT_FOUND, "Resource not found".to_string())
                .into_response()
        }
    }
}
