//! HTTP adapter over the predictor.

use crate::config::ServeConfig;
use crate::predict::predictor::{PredictError, Predictor};
use crate::predict::{PredictionRequest, PredictionResponse};
use crate::DefaultBackend;
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor<DefaultBackend>>,
}

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Request(message) => ApiError::BadRequest(message),
            PredictError::Inference(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                error!("Prediction failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "detail": message }))).into_response()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": crate::NAME,
        "version": crate::VERSION,
        "description": "Transplant engraftment success prediction",
        "endpoints": {
            "/predict": "POST clinical and genetic compatibility fields, returns success probability and risk tier",
            "/health": "Liveness check",
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let predictor = Arc::clone(&state.predictor);
    let response = tokio::task::spawn_blocking(move || predictor.predict_request(&request))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(response))
}

/// Load the artifacts, then bind and serve until shutdown
pub async fn serve(config: &ServeConfig) -> anyhow::Result<()> {
    let predictor = Predictor::<DefaultBackend>::load(&config.artifacts, Default::default())?;
    let state = AppState {
        predictor: Arc::new(predictor),
    };

    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Serving predictions on http://{}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
