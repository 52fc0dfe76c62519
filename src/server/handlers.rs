use crate::request::{self, CrawlRequestBody, RequestError};
use crate::server::middleware::CorrelationId;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::json;

/// Error responses of the HTTP API, always rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_crawls: usize,
}

/// `POST /crawl`
///
/// The body is decoded here rather than through the `Json` extractor so that an
/// undecodable body maps to a 500 like the rest of the decoding failures.
pub async fn crawl(
    State(state): State<AppState>,
    correlation: Option<Extension<CorrelationId>>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let body: CrawlRequestBody = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Undecodable crawl request");
        ApiError::Internal(format!("failed to decode request body: {}", e))
    })?;

    let request = request::validate(body).map_err(|e| {
        tracing::info!(error = %e, "Rejected crawl request");
        ApiError::from(e)
    })?;

    let accepted = request.accepted();
    let response = serde_json::to_value(&accepted)
        .map_err(|e| ApiError::Internal(format!("failed to encode response: {}", e)))?;

    let url = request.seed.clone();
    let backend = request.backend;
    let target = request.target.clone();

    // The launched run is owned by the tracker and logs its own report
    let _handle = state.launcher.launch(request)?;

    tracing::info!(
        url = %url,
        backend = %backend,
        target = %target,
        correlation_id = correlation.as_ref().map(|Extension(id)| id.0.as_str()).unwrap_or("-"),
        "Crawl request accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            active_crawls: state.launcher.active_crawls(),
        }),
    )
}
