//! HTTP surface: `POST /api/analyze` plus a plain-text health check.

pub mod error;

use crate::core::batch::BatchCoordinator;
use crate::domain::model::{AnalysisResult, ModerationRequest};
use crate::utils::error::{GatewayError, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use error::ApiError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

pub const HEALTH_MESSAGE: &str = "Content moderation service is running";

pub fn router(coordinator: Arc<BatchCoordinator>) -> Router {
    // 任何來源皆可呼叫；OPTIONS 直接回 200
    let analyze_routes = Router::new()
        .route(
            "/api/analyze",
            post(analyze).options(|| async { StatusCode::OK }),
        )
        .with_state(coordinator)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ));

    Router::new()
        .route("/", get(|| async { HEALTH_MESSAGE }))
        .merge(analyze_routes)
}

async fn analyze(
    State(coordinator): State<Arc<BatchCoordinator>>,
    body: Bytes,
) -> std::result::Result<Json<Vec<AnalysisResult>>, ApiError> {
    let request: ModerationRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Rejecting request body: {}", e);
        ApiError::InvalidBody
    })?;

    if request.is_empty() {
        return Err(ApiError::EmptyBatch);
    }

    // 客戶端斷線時 handler future 被丟棄，guard 會一併取消進行中的後端呼叫
    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();

    let total = request.messages.len();
    let results = coordinator.analyze_batch(&ctx, request.messages).await?;
    tracing::info!("Analyzed batch: {}/{} messages succeeded", results.len(), total);

    Ok(Json(results))
}

pub async fn serve(listener: TcpListener, coordinator: Arc<BatchCoordinator>) -> Result<()> {
    let addr = listener.local_addr().map_err(GatewayError::IoError)?;
    tracing::info!("🚀 Server starting on {}", addr);

    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(GatewayError::IoError)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
