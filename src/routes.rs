//! Router assembly: operational routes plus the generic resource surface.

use crate::handlers::file::fetch_file;
use crate::handlers::resource::{
    create_resource, delete_resource, list_resources, read_collection, read_resource,
    update_resource, MAX_BODY_BYTES,
};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    if state.db.fetch_scalar_i64("SELECT 1", &[]).await.is_err() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody { status: "degraded", database: "unavailable" }),
        ));
    }
    Ok(Json(ReadyBody { status: "ok", database: "ok" }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Operational routes: GET /health, GET /ready, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}

/// The generic resource surface: one set of handlers serves every table the
/// catalog exposes. `/files/:hash` is registered before the table routes so
/// the static prefix wins over `:table`.
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_resources))
        .route("/files/:hash", get(fetch_file))
        .route("/:table", get(read_collection).post(create_resource))
        .route(
            "/:table/:pk",
            get(read_resource)
                .put(update_resource)
                .patch(update_resource)
                .delete(delete_resource),
        )
        .with_state(state)
}

/// The full application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(resource_routes(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
