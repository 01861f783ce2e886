use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;

use entrevistes_api::StatusResponse;
use entrevistes_api::db::cursos;

use crate::AppState;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::{Db, execute_on};

pub fn router() -> Router<AppState> {
    Router::new().route("/initialize-course", post(initialize_course))
}

/// POST /admin/initialize-course: wipe school data (users are kept) and
/// recreate the base years, in one transaction (admin).
pub async fn initialize_course(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<Json<StatusResponse>, ApiErr> {
    user.require_admin()?;
    let fail = |e: sqlx::Error| {
        tracing::error!("initializing course: {e}");
        ApiErr::internal("Error inicialitzant curs")
    };

    let mut tx = db.begin().await.map_err(fail)?;
    for stmt in cursos::delete_all() {
        execute_on(&mut tx, stmt).await.map_err(fail)?;
    }
    for any in cursos::INITIAL_CURSOS {
        execute_on(&mut tx, cursos::insert_curs(any)).await.map_err(fail)?;
    }
    tx.commit().await.map_err(fail)?;

    tracing::warn!(by = %user.email, "course data reinitialized");
    Ok(Json(StatusResponse {
        message: "Curs inicialitzat correctament".into(),
        status: "ok".into(),
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::AppState;
    use crate::routes::testing::{error_of, json, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn only_admins_may_reinitialize() {
        let req = json("POST", "/admin/initialize-course", Some("docent@insbitacola.cat"), serde_json::json!({}));
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat");
    }
}
