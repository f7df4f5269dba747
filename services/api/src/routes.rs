use crate::infra::AppState;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use tracing::info;
use underwrite_ai::error::AppError;
use underwrite_ai::workflows::underwriting::{ndjson_lines, AssessmentRequest, AssessmentResult};

pub(crate) const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub(crate) fn router() -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/underwriting/assess",
            axum::routing::post(assess_endpoint),
        )
        .route(
            "/api/v1/underwriting/assess/stream",
            axum::routing::post(assess_stream_endpoint),
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

/// Runs the pipeline to completion and returns only the final result.
pub(crate) async fn assess_endpoint(
    Extension(state): Extension<AppState>,
    Json(request): Json<AssessmentRequest>,
) -> Result<Json<AssessmentResult>, AppError> {
    let result = state.pipeline.run_to_completion(request).await?;
    info!(
        run_id = %result.run_id,
        decision = result.decision().label(),
        overall_score = result.outcome.overall_score,
        "assessment served"
    );
    Ok(Json(result))
}

/// Streams every progress event as one JSON object per line. Closing the
/// connection abandons the run.
pub(crate) async fn assess_stream_endpoint(
    Extension(state): Extension<AppState>,
    Json(request): Json<AssessmentRequest>,
) -> Response {
    let events = state.pipeline.run(request);
    info!(run_id = %events.run_id(), "assessment stream opened");
    let body = Body::from_stream(ndjson_lines(events).map(Ok::<_, Infallible>));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        body,
    )
        .into_response()
}
