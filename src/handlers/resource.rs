//! Generic resource handlers: the same five handlers serve every table.

use crate::extractors::AuthUser;
use crate::response::Envelope;
use crate::state::AppState;
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::RequestExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// Request bodies larger than this are rejected by the limit layer before
/// a handler ever runs.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub async fn list_resources(State(state): State<AppState>, AuthUser(user): AuthUser) -> Envelope {
    state.service(user).list_resources().await
}

pub async fn read_collection(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Envelope {
    let params = query_to_params(params);
    state.service(user).read_collection(&table, &params).await
}

pub async fn create_resource(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(table): Path<String>,
    request: Request,
) -> Envelope {
    let (payload, files) = match parse_body(request).await {
        Ok(parsed) => parsed,
        Err(envelope) => return envelope,
    };
    state.service(user).create_resource(&table, payload, &files).await
}

pub async fn read_resource(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((table, pk)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Envelope {
    let params = query_to_params(params);
    state.service(user).read_resource(&table, &pk, &params).await
}

pub async fn update_resource(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((table, pk)): Path<(String, String)>,
    request: Request,
) -> Envelope {
    let (payload, files) = match parse_body(request).await {
        Ok(parsed) => parsed,
        Err(envelope) => return envelope,
    };
    state.service(user).update_resource(&table, &pk, payload, &files).await
}

pub async fn delete_resource(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((table, pk)): Path<(String, String)>,
) -> Envelope {
    state.service(user).delete_resource(&table, &pk).await
}

/// Query values arrive as text; an empty value (`?file=`) means null, which
/// downstream renders as an IS NULL test.
fn query_to_params(params: HashMap<String, String>) -> Map<String, Value> {
    params
        .into_iter()
        .map(|(k, v)| {
            let value = if v.is_empty() { Value::Null } else { Value::String(v) };
            (k, value)
        })
        .collect()
}

/// Split a request body into a field map and uploaded files.
///
/// JSON bodies become the field map directly. Multipart bodies are split:
/// file parts are spooled to a temporary path (the service consumes paths,
/// never raw bytes), text parts become string fields.
async fn parse_body(
    request: Request,
) -> Result<(Map<String, Value>, HashMap<String, PathBuf>), Envelope> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = request
            .extract::<Multipart, _>()
            .await
            .map_err(|_| invalid_body())?;
        return parse_multipart(multipart).await;
    }

    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| invalid_body())?;
    if bytes.is_empty() {
        return Ok((Map::new(), HashMap::new()));
    }
    let value: Value = serde_json::from_slice(&bytes).map_err(|_| invalid_body())?;
    match value {
        Value::Object(map) => Ok((map, HashMap::new())),
        _ => Err(invalid_body()),
    }
}

async fn parse_multipart(
    mut multipart: Multipart,
) -> Result<(Map<String, Value>, HashMap<String, PathBuf>), Envelope> {
    let mut payload = Map::new();
    let mut files = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(|_| invalid_body())? {
        let Some(name) = field.name().map(String::from) else { continue };
        if field.file_name().is_some() {
            let bytes = field.bytes().await.map_err(|_| invalid_body())?;
            let path =
                std::env::temp_dir().join(format!("upload-{}", uuid::Uuid::new_v4()));
            tokio::fs::write(&path, &bytes).await.map_err(|e| {
                tracing::error!(error = %e, "could not spool upload");
                Envelope::message(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            })?;
            files.insert(name, path);
        } else {
            let text = field.text().await.map_err(|_| invalid_body())?;
            payload.insert(name, Value::String(text));
        }
    }
    Ok((payload, files))
}

fn invalid_body() -> Envelope {
    Envelope::message(StatusCode::BAD_REQUEST, "Invalid request body".to_string())
}
