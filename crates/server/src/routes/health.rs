use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use chrono::Utc;

use entrevistes_api::db::cites;
use entrevistes_api::{HealthResponse, LiveResponse, MetricsResponse, ReadyResponse};

use crate::AppState;
use crate::error::ApiErr;
use crate::storage::Db;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/metrics", get(metrics))
}

/// GET /health: process is up.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /health/ready: database round trip, 503 when it fails.
pub async fn ready(State(db): State<Db>) -> (StatusCode, Json<ReadyResponse>) {
    let start = Instant::now();
    let result = db.ping().await;
    let duration_ms = start.elapsed().as_millis();
    let (code, status, database) = match result {
        Ok(()) => (StatusCode::OK, "ready", "ok".to_string()),
        Err(e) => {
            tracing::warn!("readiness check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "not_ready", format!("error: {e}"))
        }
    };
    (
        code,
        Json(ReadyResponse {
            status: status.to_string(),
            database,
            duration_ms,
            timestamp: Utc::now(),
        }),
    )
}

/// GET /health/live: uptime of the process.
pub async fn live(State(state): State<AppState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "alive".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// GET /health/metrics: row counts for the dashboard.
pub async fn metrics(State(db): State<Db>) -> Result<Json<MetricsResponse>, ApiErr> {
    sqlx::query_as::<_, MetricsResponse>(cites::METRICS)
        .fetch_one(db.pool())
        .await
        .map(Json)
        .map_err(ApiErr::from_db("fetching metrics"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, get as get_req, send};

    #[tokio::test]
    async fn health_is_ok_without_database() {
        let resp = send(AppState::for_tests(false), get_req("/health", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn ready_reports_unavailable_database() {
        let resp = send(AppState::for_tests(false), get_req("/health/ready", None)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await["status"], "not_ready");
    }

    #[tokio::test]
    async fn live_reports_uptime() {
        let resp = send(AppState::for_tests(false), get_req("/health/live", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_json(resp).await["uptime_seconds"].is_u64());
    }
}
