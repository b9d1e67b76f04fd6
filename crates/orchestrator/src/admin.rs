use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use common::CrawlerError;
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::pipeline::{CycleReport, Pipeline, RunMode};

#[derive(Clone)]
pub struct AdminState {
    pipeline: Arc<Pipeline>,
    secret: Option<Arc<str>>,
}

impl AdminState {
    /// Without a secret every trigger request is rejected.
    pub fn new(pipeline: Arc<Pipeline>, secret: Option<&str>) -> Self {
        Self {
            pipeline,
            secret: secret.map(Arc::from),
        }
    }
}

#[derive(Serialize)]
struct TriggerResponse {
    success: bool,
    #[serde(flatten)]
    report: CycleReport,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/refresh", post(refresh))
        .route("/admin/check", post(check))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "admin_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

pub async fn serve(state: AdminState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Admin trigger listening on {}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health(State(state): State<AdminState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "busy": state.pipeline.is_busy() }))
}

async fn refresh(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    trigger(state, headers, RunMode::Forced).await
}

async fn check(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    trigger(state, headers, RunMode::Scheduled).await
}

async fn trigger(state: AdminState, headers: HeaderMap, mode: RunMode) -> Response {
    if !authorized(&headers, state.secret.as_deref()) {
        warn!(?mode, "Rejected unauthorized trigger");
        return failure(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    match state.pipeline.run(mode).await {
        Ok(report) => Json(TriggerResponse {
            success: true,
            report,
        })
        .into_response(),
        Err(CrawlerError::Busy) => failure(StatusCode::CONFLICT, "a run is already in progress"),
        Err(e) => {
            error!(?mode, kind = e.kind(), "Triggered run failed: {}", e);
            let status = match &e {
                CrawlerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            failure(status, &e.to_string())
        }
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_secret_must_match_exactly() {
        assert!(authorized(&with_auth("Bearer s3cret"), Some("s3cret")));
        assert!(!authorized(&with_auth("Bearer wrong"), Some("s3cret")));
        assert!(!authorized(&with_auth("s3cret"), Some("s3cret")));
        assert!(!authorized(&HeaderMap::new(), Some("s3cret")));
        assert!(!authorized(&with_auth("Bearer s3cret"), None));
    }
}
