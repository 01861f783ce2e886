use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde::Serialize;

use entrevistes_api::{LimitQuery, MessageResponse, SyncAllResponse, SyncLogResponse};

use crate::AppState;
use crate::config::AppConfig;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::sync::{SyncError, SyncService};

const DEFAULT_LOG_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(notification))
        .route("/sync-log", get(sync_log))
        .route("/sync-all", post(sync_all))
        .route("/sync/{id}", post(sync_one))
}

/// Reply to Google's push channel. Anything but 2xx makes Google retry.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn goog_header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// POST /google-calendar-webhook: Calendar push notification.
pub async fn notification(
    State(config): State<AppConfig>,
    State(sync): State<SyncService>,
    headers: HeaderMap,
) -> Result<Json<WebhookAck>, ApiErr> {
    let channel_id = goog_header(&headers, "x-goog-channel-id");
    let resource_id = goog_header(&headers, "x-goog-resource-id");
    let resource_state = goog_header(&headers, "x-goog-resource-state");
    let message_number = goog_header(&headers, "x-goog-message-number");
    tracing::info!(channel_id, resource_id, resource_state, message_number, "calendar notification");

    if let Some(expected) = config.webhook_token.as_deref() {
        if goog_header(&headers, "x-goog-channel-token") != expected {
            tracing::warn!(channel_id, "calendar notification with a bad channel token");
            return Err(ApiErr::unauthorized("Token invàlid"));
        }
    }

    let ack = match sync.process_webhook_notification(resource_state, resource_id).await {
        Ok(()) => WebhookAck {
            success: true,
            error: None,
        },
        Err(e) => {
            tracing::error!(resource_id, "processing calendar notification: {e}");
            WebhookAck {
                success: false,
                error: Some(e.to_string()),
            }
        }
    };
    Ok(Json(ack))
}

/// GET /google-calendar-webhook/sync-log?limit: latest sync attempts.
pub async fn sync_log(
    State(sync): State<SyncService>,
    user: AuthUser,
    Query(q): Query<LimitQuery>,
) -> Result<Json<SyncLogResponse>, ApiErr> {
    user.require_admin()?;
    let limit = q.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LOG_LIMIT) as u64;
    let entries = sync.get_sync_log(limit).await;
    Ok(Json(SyncLogResponse {
        total: entries.len(),
        entries,
    }))
}

/// POST /google-calendar-webhook/sync-all: push every pending appointment.
pub async fn sync_all(State(sync): State<SyncService>, user: AuthUser) -> Result<Json<SyncAllResponse>, ApiErr> {
    user.require_admin()?;
    let result = sync.sync_all_pending_citas().await;
    tracing::info!(by = %user.email, success = result.success, errors = result.errors, "manual sync finished");
    Ok(Json(result))
}

/// POST /google-calendar-webhook/sync/{id}: push one appointment.
pub async fn sync_one(
    State(sync): State<SyncService>,
    user: AuthUser,
    Path(cita_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiErr> {
    user.require_admin()?;
    sync.sync_cita_to_google(&cita_id).await.map_err(|e| match e {
        SyncError::NotFound(_) => ApiErr::not_found(e.to_string()),
        other => {
            tracing::error!("syncing cita {cita_id}: {other}");
            ApiErr::internal(other.to_string())
        }
    })?;
    Ok(Json(MessageResponse {
        message: format!("Cita {cita_id} sincronitzada correctament"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, error_of, send};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn push(state: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/google-calendar-webhook")
            .header("x-goog-channel-id", "chan-1")
            .header("x-goog-resource-id", "res-1")
            .header("x-goog-resource-state", state);
        if let Some(token) = token {
            req = req.header("x-goog-channel-token", token);
        }
        req.body(Body::empty()).unwrap()
    }

    fn with_token() -> AppState {
        let mut state = AppState::for_tests(true);
        state.config.webhook_token = Some("secret".into());
        state
    }

    #[tokio::test]
    async fn wrong_channel_token_is_rejected() {
        let (status, msg) = error_of(send(with_token(), push("exists", Some("other"))).await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Token invàlid");
    }

    #[tokio::test]
    async fn sync_handshake_is_acknowledged() {
        let resp = send(with_token(), push("sync", Some("secret"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({"success": true}));
    }

    #[tokio::test]
    async fn failures_still_answer_ok() {
        let resp = send(AppState::for_tests(true), push("not_exists", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }
}
