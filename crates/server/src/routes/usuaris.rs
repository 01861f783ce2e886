use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use entrevistes_api::db;
use entrevistes_api::{
    MeResponse, Rol, SeedAdminRequest, SeedAdminResponse, UpsertUsuariRequest, Usuari, service,
};

use crate::AppState;
use crate::config::AppConfig;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::storage::Db;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(upsert))
        .route("/me", get(me))
        .route("/seed-admin", post(seed_admin))
}

/// GET /usuaris/me: identity and role of the caller.
pub async fn me(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        email: user.email,
        role: user.rol,
    })
}

/// POST /usuaris: create a user or change their role (admin).
pub async fn upsert(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<UpsertUsuariRequest>,
) -> Result<(StatusCode, Json<Usuari>), ApiErr> {
    user.require_admin()?;
    let email = service::validate_email(&req.email)
        .map_err(|_| ApiErr::bad_request("Dades requerides incompletes"))?;
    db.execute(db::usuaris::upsert(&email, req.rol.as_str()))
        .await
        .map_err(ApiErr::from_db("upsert usuari"))?;
    tracing::info!(%email, rol = %req.rol, by = %user.email, "user role set");
    Ok((
        StatusCode::CREATED,
        Json(Usuari {
            email,
            rol: req.rol.as_str().to_string(),
            nom: None,
        }),
    ))
}

/// GET /usuaris: every user by email (admin). Empty when the table can't be read.
pub async fn list(State(db): State<Db>, user: AuthUser) -> Result<Json<Vec<Usuari>>, ApiErr> {
    user.require_admin()?;
    let users = db
        .fetch_all::<Usuari>(db::usuaris::list())
        .await
        .inspect_err(|e| tracing::warn!("listing usuaris: {e}"))
        .unwrap_or_default();
    Ok(Json(users))
}

/// POST /usuaris/seed-admin: create the first admin if there is none.
pub async fn seed_admin(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    _user: AuthUser,
    body: Option<Json<SeedAdminRequest>>,
) -> Result<Json<SeedAdminResponse>, ApiErr> {
    let admins: i64 = db
        .fetch_scalar(db::usuaris::count_admins())
        .await
        .map_err(ApiErr::from_db("counting admins"))?;
    if admins > 0 {
        return Ok(Json(SeedAdminResponse {
            status: "exists".into(),
            email: None,
        }));
    }

    let email = body
        .and_then(|Json(req)| req.email)
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or(config.seed_admin_email);
    db.execute(db::usuaris::upsert(&email, Rol::Admin.as_str()))
        .await
        .map_err(|e| {
            tracing::error!("seeding admin: {e}");
            ApiErr::internal("Error creant admin")
        })?;
    tracing::info!(%email, "seed admin created");
    Ok(Json(SeedAdminResponse {
        status: "created".into(),
        email: Some(email),
    }))
}

#[cfg(test)]
mod tests {
    use crate::AppState;
    use crate::routes::testing::{body_json, error_of, get, json, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn me_echoes_dev_identity() {
        let resp = send(AppState::for_tests(true), get("/usuaris/me", Some("Anna@insbitacola.cat"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["email"], "anna@insbitacola.cat");
        assert_eq!(body["role"], "docent");
    }

    #[tokio::test]
    async fn docents_cannot_manage_users() {
        let req = json(
            "POST",
            "/usuaris",
            Some("docent@insbitacola.cat"),
            serde_json::json!({"email": "x@insbitacola.cat", "rol": "admin"}),
        );
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat");
    }

    #[tokio::test]
    async fn anonymous_requests_are_rejected() {
        let (status, msg) = error_of(send(AppState::for_tests(true), get("/usuaris", None)).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat - No hay token");
    }
}
