use crate::infra::{ApiEngine, AppState};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use course_enrollment::enrollment::{enrollment_router, CatalogImporter, ImportSummary};
use course_enrollment::error::AppError;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

pub(crate) fn with_enrollment_routes(engine: Arc<ApiEngine>) -> axum::Router {
    enrollment_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/catalog/import",
            axum::routing::post(catalog_import_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Accepts a raw catalog CSV body and loads it into the running store.
pub(crate) async fn catalog_import_endpoint(
    Extension(engine): Extension<Arc<ApiEngine>>,
    body: String,
) -> Result<Json<ImportSummary>, AppError> {
    let reader = Cursor::new(body.into_bytes());
    let summary = CatalogImporter::from_reader(reader, engine.catalog())?;
    Ok(Json(summary))
}
