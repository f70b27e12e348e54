//! JSON-over-HTTP surface.

use crate::error::ApiError;
use crate::pipeline::{Analysis, AnalysisPipeline, AnalyzeRequest};
use crate::tools::AnalyzeOutput;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use verity_core::resolve_client_id;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<AnalysisPipeline>,
}

#[derive(Debug, Deserialize)]
struct ScrapeRequest {
    #[serde(default)]
    url: String,
}

pub fn router(pipeline: Arc<AnalysisPipeline>) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze_handler).get(describe_handler))
        .route("/api/scrape", post(scrape_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(AppState { pipeline })
}

/// Serve until Ctrl-C.
pub async fn serve(pipeline: Arc<AnalysisPipeline>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn client_id(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    resolve_client_id(header("x-forwarded-for"), header("x-real-ip"))
}

async fn analyze_handler(
    State(state): State<AppState>, headers: HeaderMap, payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let analysis = state.pipeline.analyze(&client_id(&headers), request).await?;
    Ok(analysis_response(analysis))
}

fn analysis_response(analysis: Analysis) -> Response {
    let (cached, fallback, processing_ms) = (analysis.cached, analysis.fallback, analysis.processing_ms);
    let rate = analysis.rate.clone();

    let mut response = Json(AnalyzeOutput::from(analysis)).into_response();
    let headers = response.headers_mut();

    set_header(headers, "x-cache-status", if cached { "HIT" } else { "MISS" });
    set_header(headers, "x-used-cache", &cached.to_string());
    set_header(headers, "x-processing-time", &format!("{processing_ms}ms"));
    set_header(headers, "x-ratelimit-limit", &rate.limit.to_string());
    set_header(headers, "x-ratelimit-remaining", &rate.remaining.to_string());
    set_header(headers, "x-ratelimit-reset", &rate.reset_at.to_rfc3339_opts(SecondsFormat::Millis, true));
    if fallback {
        set_header(headers, "x-fallback", "true");
    }

    response
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(e) => tracing::warn!(header = name, error = %e, "skipping invalid header value"),
    }
}

async fn describe_handler() -> impl IntoResponse {
    Json(json!({
        "name": "Verity fake news analysis API",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "Gemini model failover with throttle cooldowns",
            "Result caching keyed by content fingerprint",
            "Per-client rate limiting",
            "Article extraction from URLs",
        ],
        "endpoints": {
            "POST /api/analyze": "Analyze text or a URL; body {text?, url?}",
            "POST /api/scrape": "Extract article text from a URL; body {url}",
            "GET /api/stats": "Service statistics",
            "GET /health": "Health status",
        },
    }))
}

async fn scrape_handler(
    State(state): State<AppState>, headers: HeaderMap, payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let result = state.pipeline.scrape(&client_id(&headers), &request.url).await?;
    let status = if result.success { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    Ok((status, Json(result)).into_response())
}

async fn stats_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.pipeline.stats_report().await?;
    Ok(Json(report).into_response())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": state.pipeline.health().status }))
}
