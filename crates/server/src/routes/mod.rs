pub mod admin;
pub mod alumnes;
pub mod alumnes_db;
pub mod auth;
pub mod calendari_public;
pub mod citas;
pub mod consolidacion;
pub mod cursos;
pub mod dades_personals;
pub mod emails;
pub mod entrevistes;
pub mod health;
pub mod import;
pub mod sheets;
pub mod tutors;
pub mod usuaris;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing {
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use tower::ServiceExt;

    use crate::AppState;

    /// Send one request through the full router.
    pub async fn send(state: AppState, req: Request<Body>) -> Response<Body> {
        crate::app(state).oneshot(req).await.unwrap()
    }

    pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    }

    pub fn json(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Status and `error` message of a response.
    pub async fn error_of(resp: Response<Body>) -> (StatusCode, String) {
        let status = resp.status();
        let body = body_json(resp).await;
        (status, body["error"].as_str().unwrap_or_default().to_string())
    }
}
