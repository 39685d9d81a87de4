//! Common routes: health, readiness, version, and schema info.

use crate::state::AppState;
use crate::store;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_version: Option<i64>,
}

#[derive(Serialize)]
struct EntityInfo {
    id: String,
    table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    columns: Vec<String>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    match store::schema_version(&state.pool).await {
        Ok(version) => Ok(Json(ReadyBody {
            status: "ok",
            database: "ok",
            schema_version: Some(version),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "readiness probe failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyBody {
                    status: "degraded",
                    database: "unavailable",
                    schema_version: None,
                }),
            ))
        }
    }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Version plus the addressable schema.
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entities: Vec<EntityInfo> = state
        .resolver
        .registry()
        .entities
        .iter()
        .map(|e| EntityInfo {
            id: e.id.clone(),
            table: e.table_name.clone(),
            path: e.path_segment.clone(),
            columns: e.columns.iter().map(|c| c.name.clone()).collect(),
        })
        .collect();
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "entities": entities
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Common routes including readiness with DB check and schema info. Requires AppState.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/info", get(info))
        .with_state(state)
}
