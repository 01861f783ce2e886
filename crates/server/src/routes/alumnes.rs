//! Students in the legacy spreadsheet (`Alumnes_<any>` tabs).

use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use entrevistes_api::db;
use entrevistes_api::{
    AlumneCurs, AlumneDetall, AlumnesQuery, CreateAlumneRequest, DadesFamiliars, DadesPersonals,
    DadesPersonalsResum, IdStatusResponse, UpdateAlumneRequest, service,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::sheets_repo::SheetsRepo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(detail).put(update))
}

fn incomplete() -> ApiErr {
    ApiErr::bad_request("Dades requerides incompletes")
}

fn repo(state: &AppState) -> Result<SheetsRepo, ApiErr> {
    state
        .default_sheets_repo()
        .ok_or_else(|| ApiErr::unavailable("Google Sheets no configurat"))
}

/// GET /alumnes: students of a year. Docents only see their assigned groups.
/// Any failure yields an empty list.
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<AlumnesQuery>,
) -> Json<Vec<AlumneCurs>> {
    let Some(repo) = state.default_sheets_repo() else {
        return Json(Vec::new());
    };
    let items = repo
        .list_alumnes(q.any_curs.as_deref(), q.estat.map(|e| e.as_str()))
        .await;
    if user.is_admin() {
        return Json(items);
    }

    let any_curs = match q.any_curs {
        Some(any) => any,
        None => state.db.current_year().await,
    };
    let allowed: HashSet<String> = match sqlx::query_scalar::<_, String>(db::tutors::GRUPS_ASSIGNATS)
        .bind(&user.email)
        .bind(&any_curs)
        .fetch_all(state.db.pool())
        .await
    {
        Ok(noms) => noms.into_iter().collect(),
        Err(e) => {
            tracing::warn!("reading groups of {}: {e}", user.email);
            return Json(Vec::new());
        }
    };
    Json(
        items
            .into_iter()
            .filter(|a| a.grup.as_ref().is_some_and(|g| allowed.contains(g)))
            .collect(),
    )
}

/// POST /alumnes: append a student row (admin).
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<CreateAlumneRequest>,
) -> Result<(StatusCode, Json<IdStatusResponse>), ApiErr> {
    user.require_admin()?;
    let nom = service::require_field("nom", &req.nom).map_err(|_| incomplete())?;
    let grup = service::require_field("grup", &req.grup).map_err(|_| incomplete())?;
    let personal_id = service::require_field("personalId", &req.personal_id).map_err(|_| incomplete())?;
    let any_curs = service::validate_any_curs(&req.any_curs)?;

    let id = repo(&state)?
        .create_alumne(nom, grup, &any_curs, personal_id)
        .await
        .map_err(ApiErr::from_db("appending alumne row"))?;
    tracing::info!(%id, %any_curs, "alumne created in sheet");
    Ok((
        StatusCode::CREATED,
        Json(IdStatusResponse {
            id,
            status: "created".into(),
        }),
    ))
}

/// PUT /alumnes/{id}: change group or status (admin).
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateAlumneRequest>,
) -> Result<Json<IdStatusResponse>, ApiErr> {
    user.require_admin()?;
    if req.grup.as_deref().is_some_and(|g| g.trim().is_empty()) {
        return Err(incomplete());
    }
    let found = repo(&state)?
        .update_alumne(&id, &req)
        .await
        .map_err(ApiErr::from_db("updating alumne row"))?;
    if !found {
        return Err(ApiErr::not_found("No trobat"));
    }
    Ok(Json(IdStatusResponse {
        id,
        status: "updated".into(),
    }))
}

/// GET /alumnes/{id}: sheet record plus personal and family data.
pub async fn detail(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<AlumneDetall>, ApiErr> {
    let alumne = repo(&state)?
        .get_alumne(&id)
        .await
        .ok_or_else(|| ApiErr::not_found("No trobat"))?;

    let pf = if alumne.personal_id.is_empty() {
        None
    } else {
        state
            .db
            .fetch_optional::<DadesPersonals>(db::dades::get_pf(&alumne.personal_id))
            .await
            .inspect_err(|e| tracing::warn!("reading pf {}: {e}", alumne.personal_id))
            .ok()
            .flatten()
    };
    let (dades_personals, dades_familiars) = match pf {
        Some(pf) => (
            DadesPersonalsResum {
                sexe: pf.sexe.clone(),
                data_naixement: pf.data_naixement.clone(),
            },
            DadesFamiliars {
                tutors: pf.contactes(),
            },
        ),
        None => Default::default(),
    };
    Ok(Json(AlumneDetall {
        alumne,
        dades_personals,
        dades_familiars,
    }))
}

#[cfg(test)]
mod tests {
    use crate::AppState;
    use crate::routes::testing::{body_json, error_of, get, json, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn list_is_empty_without_spreadsheet() {
        let resp = send(AppState::for_tests(true), get("/alumnes?anyCurs=2025-2026", Some("t@insbitacola.cat"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn create_requires_admin() {
        let req = json(
            "POST",
            "/alumnes",
            Some("t@insbitacola.cat"),
            serde_json::json!({"nom": "Pou, Marta", "grup": "1A", "anyCurs": "2025-2026", "personalId": "p1"}),
        );
        let (status, _) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid() {
        let req = json("PUT", "/alumnes/a1", Some("t@insbitacola.cat"), serde_json::json!({"estat": "perdut"}));
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Dades invàlides");
    }
}
