use axum::{Json, Router, extract::{Query, State}, routing::get};

use entrevistes_api::db::alumnes;
use entrevistes_api::{AlumneCurs, AnyCursQuery};

use crate::AppState;
use crate::error::ApiErr;
use crate::routes::auth::AuthUser;
use crate::storage::Db;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list))
}

/// GET /alumnes-db: enrolled students of a year from the database. Docents
/// see their assigned groups and personal tutees only.
pub async fn list(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<AlumneCurs>>, ApiErr> {
    let any_curs = match q.any_curs.filter(|a| !a.trim().is_empty()) {
        Some(any) => any,
        None => match db.any_actual().await {
            Some(any) => any,
            None => return Ok(Json(Vec::new())),
        },
    };

    let rows = if user.is_admin() {
        sqlx::query_as::<_, AlumneCurs>(alumnes::LIST_ANY)
            .bind(&any_curs)
            .fetch_all(db.pool())
            .await
    } else {
        sqlx::query_as::<_, AlumneCurs>(alumnes::LIST_VISIBLE)
            .bind(&any_curs)
            .bind(&user.email)
            .fetch_all(db.pool())
            .await
    }
    .map_err(ApiErr::from_db("listing alumnes"))?;

    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use crate::AppState;
    use crate::routes::testing::{error_of, get, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn database_failure_is_internal_error() {
        let resp = send(AppState::for_tests(true), get("/alumnes-db", Some("admin@insbitacola.cat"))).await;
        let (status, msg) = error_of(resp).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(msg, "Error intern del servidor");
    }
}
