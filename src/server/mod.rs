// HTTP server
// Exposes the question answering pipeline over `GET /question/`


use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{error, info, warn};

use crate::QaError;
use crate::config::ServerConfig;
use crate::qa::QaService;

#[derive(Debug, Deserialize)]
pub struct QuestionParams {
    question: Option<String>,
}

/// Maps pipeline failures onto HTTP responses without leaking upstream details
#[derive(Debug)]
pub struct ApiError(pub QaError);

impl From<QaError> for ApiError {
    fn from(error: QaError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match &self.0 {
            QaError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            QaError::ContextOverflow { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Question is too long for the model's context window".to_string(),
            ),
            QaError::Timeout { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "Upstream service timed out".to_string(),
            ),
            error if error.is_upstream() => (
                StatusCode::BAD_GATEWAY,
                "Upstream service unavailable".to_string(),
            ),
            QaError::DimensionMismatch { .. } => (
                StatusCode::BAD_GATEWAY,
                "Upstream service returned an invalid response".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self.0);
        } else {
            warn!("Rejected request with {}: {}", status, self.0);
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

async fn answer_question(
    State(service): State<Arc<QaService>>,
    Query(params): Query<QuestionParams>,
) -> Result<Json<String>, ApiError> {
    let question = params.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(QaError::Validation("question must not be empty".to_string()).into());
    }

    info!("Answering question ({} chars)", question.len());
    let answer = service.ask(&question).await?;
    Ok(Json(answer.text))
}

async fn health_check() -> Json<&'static str> {
    Json("ok")
}

/// CORS policy admitting only `allowed_origin`, with credentials
#[inline]
pub fn cors_layer(allowed_origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(allowed_origin)
        .with_context(|| format!("Invalid allowed origin {:?}", allowed_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

#[inline]
pub fn router(service: Arc<QaService>, allowed_origin: &str) -> anyhow::Result<Router> {
    Ok(Router::new()
        .route("/question/", get(answer_question))
        .route("/question", get(answer_question))
        .route("/health", get(health_check))
        .layer(cors_layer(allowed_origin)?)
        .with_state(service))
}

/// Serve `app` on `listener` until `shutdown` resolves
#[inline]
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

/// Bind the configured address and serve until Ctrl-C
#[inline]
pub async fn run(service: Arc<QaService>, config: &ServerConfig) -> anyhow::Result<()> {
    let bind = config.bind_addr()?;
    let app = router(service, &config.allowed_origin)?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    println!("Serving questions on http://{}/question/", listener.local_addr()?);
    println!("Press Ctrl+C to stop the server");

    serve(listener, app, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}
