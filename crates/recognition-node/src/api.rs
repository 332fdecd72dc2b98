//! HTTP surface: health, metrics, and camera/frame management.

use crate::state::RecognitionState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use common::recognition::{
    CameraFrame, CameraListResponse, StartCameraRequest, StartCameraResponse, StopCameraResponse,
    SubmitFrameRequest, SubmitFrameResponse,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: RecognitionState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        // Camera endpoints
        .route("/v1/cameras", get(list_cameras).post(start_camera))
        .route("/v1/cameras/:id", get(get_camera).delete(stop_camera))
        .route("/v1/cameras/:id/frames", post(submit_frame))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<RecognitionState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "ready": true,
            "node_id": state.node_id(),
        })),
    )
}

async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

async fn list_cameras(State(state): State<RecognitionState>) -> impl IntoResponse {
    let cameras = state.list_cameras().await;
    (StatusCode::OK, Json(CameraListResponse { cameras }))
}

async fn get_camera(
    State(state): State<RecognitionState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.camera_stats(&camera_id).await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("camera '{}' is not running", camera_id)
            })),
        )
            .into_response(),
    }
}

async fn start_camera(
    State(state): State<RecognitionState>,
    Json(request): Json<StartCameraRequest>,
) -> impl IntoResponse {
    match state.start_camera(&request.camera_id).await {
        Ok(()) => {
            let response = StartCameraResponse {
                started: true,
                message: Some(format!("camera '{}' started", request.camera_id)),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            tracing::warn!(camera = %request.camera_id, error = %e, "failed to start camera");
            let response = StartCameraResponse {
                started: false,
                message: Some(e.to_string()),
            };
            (StatusCode::CONFLICT, Json(response))
        }
    }
}

async fn stop_camera(
    State(state): State<RecognitionState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.stop_camera(&camera_id).await {
        Ok(()) => {
            let response = StopCameraResponse {
                stopped: true,
                message: Some(format!("camera '{}' stopped", camera_id)),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            let response = StopCameraResponse {
                stopped: false,
                message: Some(e.to_string()),
            };
            (StatusCode::NOT_FOUND, Json(response))
        }
    }
}

async fn submit_frame(
    State(state): State<RecognitionState>,
    Path(camera_id): Path<String>,
    Json(request): Json<SubmitFrameRequest>,
) -> impl IntoResponse {
    let frame = CameraFrame {
        camera_id,
        timestamp_ms: request.timestamp_ms,
        sequence: request.sequence,
        width: request.width,
        height: request.height,
        format: request.format,
        data: request.frame_data,
    };

    match state.submit_frame(frame).await {
        Ok(evicted_oldest) => {
            let response = SubmitFrameResponse {
                accepted: true,
                evicted_oldest,
                message: None,
            };
            (StatusCode::ACCEPTED, Json(response))
        }
        Err(e) => {
            let response = SubmitFrameResponse {
                accepted: false,
                evicted_oldest: false,
                message: Some(e.to_string()),
            };
            (StatusCode::NOT_FOUND, Json(response))
        }
    }
}
