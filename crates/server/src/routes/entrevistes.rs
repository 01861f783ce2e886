use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use entrevistes_api::db::{alumnes, config, entrevistes};
use entrevistes_api::{
    AlumneCurs, CreateEntrevistaRequest, Entrevista, EntrevistaDetall, EntrevistaSheet, EntrevistaTab,
    EntrevistesPaginades, EntrevistesQuery, HistorialEntry, IdStatusMessageResponse, IdStatusResponse,
    NovaEntrevistaRequest, Paginacio, PaginacioQuery, UpdateEntrevistaRequest, service,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::sheets_repo::{PairEdit, TabEntrevistes};
use crate::storage::Db;

const DEFAULT_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/nova", post(nova))
        .route("/admin/todas", get(admin_todas))
        .route("/historial/{alumne_id}", get(historial))
        .route("/db/{id}", get(detall).put(update).delete(remove))
        .route("/tabs/{spreadsheet_id}", get(tabs))
        .route("/tabs/{spreadsheet_id}/entrevistes", get(tabs_entrevistes))
        .route("/tabs/{spreadsheet_id}/historial", get(tabs_historial))
}

/// Interviews from the database or from the interviews sheet.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Llistat {
    Db(Vec<EntrevistaDetall>),
    Sheets(Vec<EntrevistaSheet>),
}

#[derive(Debug, Serialize)]
pub struct TabsResponse {
    pub tabs: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabsDataResponse {
    pub tabs_data: Vec<TabEntrevistes>,
}

#[derive(Debug, Serialize)]
pub struct HistorialTabsResponse {
    pub historial: Vec<EntrevistaTab>,
}

/// Name, group and level used to find a student's row in a level spreadsheet.
#[derive(Debug, sqlx::FromRow)]
struct FilaNivell {
    nom: String,
    grup: String,
    curs: String,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Ids of the students a teacher may see in `any_curs`.
async fn visible_ids(db: &Db, any_curs: &str, email: &str) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AlumneCurs>(alumnes::LIST_VISIBLE)
        .bind(any_curs)
        .bind(email)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.into_iter().map(|a| a.id).collect())
}

/// GET /entrevistes: interviews from the database (`fromDb=true`) or the
/// interviews sheet. Docents only see the year's students they tutor or
/// teach. Failures yield an empty list.
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<EntrevistesQuery>,
) -> Json<Llistat> {
    let from_db = q.from_db.unwrap_or(false);
    let empty = || {
        if from_db {
            Llistat::Db(Vec::new())
        } else {
            Llistat::Sheets(Vec::new())
        }
    };
    let requested = q.any_curs.as_deref().filter(|a| !a.trim().is_empty());

    let allowed = if user.is_admin() {
        None
    } else {
        let any = match requested {
            Some(any) => any.to_string(),
            None => state.db.current_year().await,
        };
        match visible_ids(&state.db, &any, &user.email).await {
            Ok(ids) => Some((any, ids)),
            Err(e) => {
                tracing::warn!("visible students of {}: {e}", user.email);
                return Json(empty());
            }
        }
    };
    let year = allowed.as_ref().map(|(any, _)| any.as_str()).or(requested);

    if from_db {
        let rows = sqlx::query_as::<_, EntrevistaDetall>(entrevistes::LIST_DETALL)
            .bind(q.alumne_id.as_deref())
            .bind(year)
            .fetch_all(state.db.pool())
            .await;
        let mut rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("listing entrevistes: {e}");
                return Json(empty());
            }
        };
        if let Some((_, ids)) = &allowed {
            rows.retain(|e| ids.contains(&e.alumne_id));
        }
        return Json(Llistat::Db(rows));
    }

    let Some(repo) = state.default_sheets_repo() else {
        return Json(empty());
    };
    let mut rows = repo.list_entrevistes(q.alumne_id.as_deref(), year).await;
    if let Some((any, ids)) = &allowed {
        rows.retain(|e| &e.any_curs == any && e.alumne_id.as_ref().is_none_or(|a| ids.contains(a)));
    }
    Json(Llistat::Sheets(rows))
}

/// GET /entrevistes/admin/todas: live and consolidated interviews of every
/// student, paged (admin).
pub async fn admin_todas(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<PaginacioQuery>,
) -> Result<Json<EntrevistesPaginades>, ApiErr> {
    user.require_admin()?;
    let limit = q.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
    let offset = q.offset.filter(|o| *o >= 0).unwrap_or(0);
    let any_curs = match q.any_curs.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(any) => Some(service::resolve_any_curs(any, &db.current_year().await)),
        None => None,
    };
    let fail = |e: sqlx::Error| {
        tracing::error!("listing every entrevista: {e}");
        ApiErr::internal("Error obteniendo todas las entrevistas")
    };

    let page = sqlx::query_as::<_, HistorialEntry>(entrevistes::HISTORIAL)
        .bind(None::<String>)
        .bind(any_curs.as_deref())
        .bind(Some(limit))
        .bind(offset)
        .fetch_all(db.pool());
    let total = sqlx::query_scalar::<_, i64>(entrevistes::COUNT_HISTORIAL)
        .bind(any_curs.as_deref())
        .fetch_one(db.pool());
    let (entrevistes, total) = tokio::try_join!(page, total).map_err(fail)?;

    Ok(Json(EntrevistesPaginades {
        entrevistes,
        paginacion: paginacio(total, limit, offset),
    }))
}

/// Page metadata; `limit` and `offset` come straight from the query string.
fn paginacio(total: i64, limit: i64, offset: i64) -> Paginacio {
    Paginacio {
        total,
        limit,
        offset,
        has_more: offset.saturating_add(limit) < total,
    }
}

/// GET /entrevistes/historial/{alumne_id}: a student's live and consolidated
/// interviews, newest first.
pub async fn historial(
    State(db): State<Db>,
    _user: AuthUser,
    Path(alumne_id): Path<String>,
    Query(q): Query<PaginacioQuery>,
) -> Result<Json<Vec<HistorialEntry>>, ApiErr> {
    let any_curs = q.any_curs.filter(|a| !a.trim().is_empty());
    let rows = sqlx::query_as::<_, HistorialEntry>(entrevistes::HISTORIAL)
        .bind(&alumne_id)
        .bind(any_curs)
        .bind(None::<i64>)
        .bind(0_i64)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("historial of {alumne_id}: {e}");
            ApiErr::internal("Error obteniendo historial de entrevistas")
        })?;
    Ok(Json(rows))
}

/// GET /entrevistes/db/{id}: one interview with student name and group.
pub async fn detall(
    State(db): State<Db>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EntrevistaDetall>, ApiErr> {
    sqlx::query_as::<_, EntrevistaDetall>(entrevistes::DETALL)
        .bind(&id)
        .fetch_optional(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("reading entrevista {id}: {e}");
            ApiErr::internal("Error obtenint l'entrevista")
        })?
        .map(Json)
        .ok_or_else(|| ApiErr::not_found("Entrevista no trobada"))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// POST /entrevistes: record an interview for the current year. Docents must
/// tutor or teach the student. The interviews sheet copy is best-effort.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<CreateEntrevistaRequest>,
) -> Result<(StatusCode, Json<IdStatusResponse>), ApiErr> {
    let alumne_id = req.alumne_id.trim();
    if alumne_id.is_empty() || req.data.trim().is_empty() || req.acords.trim().is_empty() {
        return Err(ApiErr::bad_request("Dades requerides incompletes"));
    }
    let any_curs = state.db.current_year().await;

    if !user.is_admin() {
        let allowed = sqlx::query_scalar::<_, bool>(alumnes::DOCENT_CAN_ACCESS)
            .bind(alumne_id)
            .bind(&user.email)
            .bind(&any_curs)
            .fetch_one(state.db.pool())
            .await
            .map_err(ApiErr::from_db("checking docent access"))?;
        if !allowed {
            return Err(ApiErr::forbidden("Permís denegat"));
        }
    }

    let entrevista = Entrevista {
        id: service::new_entrevista_id(),
        alumne_id: alumne_id.to_string(),
        any_curs,
        data: req.data,
        acords: req.acords,
        usuari_creador_id: user.email.clone(),
        cita_id: None,
    };
    state
        .db
        .execute(entrevistes::insert(&entrevista))
        .await
        .map_err(ApiErr::from_db("inserting entrevista"))?;

    if let Some(repo) = state.default_sheets_repo() {
        if let Err(e) = repo
            .create_entrevista(alumne_id, &entrevista.data, &entrevista.acords, &user.email)
            .await
        {
            tracing::warn!("mirroring entrevista {} to Sheets: {e}", entrevista.id);
        }
    }

    tracing::info!(id = %entrevista.id, alumne = alumne_id, by = %user.email, "entrevista created");
    Ok((
        StatusCode::CREATED,
        Json(IdStatusResponse {
            id: entrevista.id,
            status: "created".into(),
        }),
    ))
}

/// POST /entrevistes/nova: record an interview and append it to the
/// student's row of the level spreadsheet.
pub async fn nova(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<NovaEntrevistaRequest>,
) -> Result<Json<IdStatusMessageResponse>, ApiErr> {
    let alumne_id = req.alumne_id.trim();
    if alumne_id.is_empty() || req.data.trim().is_empty() || req.acords.trim().is_empty() {
        return Err(ApiErr::bad_request("Falten dades obligatòries"));
    }
    let entrevista = Entrevista {
        id: service::new_entrevista_id(),
        alumne_id: alumne_id.to_string(),
        any_curs: state.db.current_year().await,
        data: req.data.clone(),
        acords: req.acords.clone(),
        usuari_creador_id: user.email.clone(),
        cita_id: None,
    };
    state.db.execute(entrevistes::insert(&entrevista)).await.map_err(|e| {
        tracing::error!("inserting entrevista: {e}");
        ApiErr::internal("Error creant l'entrevista")
    })?;

    let fila = match (req.alumne_nom, req.grup) {
        (Some(nom), Some(grup)) if !nom.trim().is_empty() && !grup.trim().is_empty() => Some(FilaNivell {
            curs: req.curs.unwrap_or_else(|| grup.clone()),
            nom,
            grup,
        }),
        _ => locate(&state.db, alumne_id, &entrevista.any_curs).await,
    };
    if let Some(fila) = fila {
        let edit = PairEdit::Append {
            data: &req.data,
            acords: &req.acords,
        };
        sync_level_sheet(&state, &fila, edit).await;
    }

    Ok(Json(IdStatusMessageResponse {
        id: entrevista.id,
        status: "created".into(),
        message: "Entrevista creada correctament".into(),
    }))
}

/// Author or admin; non-admins only within the current year.
async fn check_owner(
    db: &Db,
    user: &AuthUser,
    entrevista: &Entrevista,
    verb: &str,
) -> Result<(), ApiErr> {
    if user.is_admin() {
        return Ok(());
    }
    if !entrevista.usuari_creador_id.eq_ignore_ascii_case(&user.email) {
        return Err(ApiErr::forbidden(format!("No tens permisos per {verb} aquesta entrevista")));
    }
    if entrevista.any_curs != db.current_year().await {
        return Err(ApiErr::forbidden(format!(
            "Només es poden {verb} entrevistes de l'any actual"
        )));
    }
    Ok(())
}

async fn existing(db: &Db, id: &str, context: &'static str) -> Result<Entrevista, ApiErr> {
    db.fetch_optional::<Entrevista>(entrevistes::get(id))
        .await
        .map_err(|e| {
            tracing::error!("reading entrevista {id}: {e}");
            ApiErr::internal(context)
        })?
        .ok_or_else(|| ApiErr::not_found("Entrevista no trobada"))
}

/// PUT /entrevistes/db/{id}: change date and acords. The level spreadsheet
/// row is updated best-effort.
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateEntrevistaRequest>,
) -> Result<Json<IdStatusMessageResponse>, ApiErr> {
    let (Some(data), Some(acords)) = (
        req.data.filter(|d| !d.trim().is_empty()),
        req.acords.filter(|a| !a.trim().is_empty()),
    ) else {
        return Err(ApiErr::bad_request("Falten dades obligatòries (data, acords)"));
    };
    const FAIL: &str = "Error actualitzant l'entrevista";

    let entrevista = existing(&state.db, &id, FAIL).await?;
    check_owner(&state.db, &user, &entrevista, "editar").await?;

    state
        .db
        .execute(entrevistes::update(&id, Some(&data), Some(&acords)))
        .await
        .map_err(|e| {
            tracing::error!("updating entrevista {id}: {e}");
            ApiErr::internal(FAIL)
        })?;

    if let Some(fila) = locate(&state.db, &entrevista.alumne_id, &entrevista.any_curs).await {
        let edit = PairEdit::Overwrite {
            data: &data,
            acords: &acords,
        };
        sync_level_sheet(&state, &fila, edit).await;
    }

    tracing::info!(%id, by = %user.email, "entrevista updated");
    Ok(Json(IdStatusMessageResponse {
        id,
        status: "updated".into(),
        message: "Entrevista actualitzada correctament".into(),
    }))
}

/// DELETE /entrevistes/db/{id}: clear the level spreadsheet row first
/// (best-effort), then delete the record.
pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<IdStatusMessageResponse>, ApiErr> {
    const FAIL: &str = "Error borrant l'entrevista";

    let entrevista = existing(&state.db, &id, FAIL).await?;
    check_owner(&state.db, &user, &entrevista, "borrar").await?;

    if let Some(fila) = locate(&state.db, &entrevista.alumne_id, &entrevista.any_curs).await {
        sync_level_sheet(&state, &fila, PairEdit::Clear).await;
    }

    state.db.execute(entrevistes::delete(&id)).await.map_err(|e| {
        tracing::error!("deleting entrevista {id}: {e}");
        ApiErr::internal(FAIL)
    })?;

    tracing::info!(%id, by = %user.email, "entrevista deleted");
    Ok(Json(IdStatusMessageResponse {
        id,
        status: "deleted".into(),
        message: "Entrevista borrada correctament".into(),
    }))
}

// ---------------------------------------------------------------------------
// Level spreadsheets
// ---------------------------------------------------------------------------

async fn locate(db: &Db, alumne_id: &str, any_curs: &str) -> Option<FilaNivell> {
    sqlx::query_as::<_, FilaNivell>(entrevistes::SHEET_LOCATOR)
        .bind(alumne_id)
        .bind(any_curs)
        .fetch_optional(db.pool())
        .await
        .inspect_err(|e| tracing::warn!("locating {alumne_id} for Sheets: {e}"))
        .ok()
        .flatten()
}

/// Config key and tab of the level spreadsheet a student row lives in.
fn level_target(fila: &FilaNivell) -> Option<(String, String)> {
    let nivell = service::nivell_eso(&fila.curs).or_else(|| service::nivell_eso(&fila.grup))?;
    Some((format!("{nivell}SpreadsheetId"), format!("{nivell} ESO")))
}

/// Apply `edit` to the student's row; failures are logged only.
async fn sync_level_sheet(state: &AppState, fila: &FilaNivell, edit: PairEdit<'_>) {
    let Some((key, tab)) = level_target(fila) else {
        tracing::debug!(grup = %fila.grup, "no ESO level for group");
        return;
    };
    let spreadsheet_id = match state
        .db
        .fetch_optional::<(serde_json::Value,)>(config::get(&key))
        .await
    {
        Ok(row) => row.and_then(|(valor,)| config::string_value(&valor)),
        Err(e) => {
            tracing::warn!("reading {key}: {e}");
            None
        }
    };
    let Some(spreadsheet_id) = spreadsheet_id else {
        tracing::debug!("{key} not configured, level sheet untouched");
        return;
    };

    match state
        .sheets_repo(&spreadsheet_id)
        .edit_interview_pair(&tab, &fila.nom, &fila.grup, edit)
        .await
    {
        Ok(true) => tracing::info!(%tab, nom = %fila.nom, "level sheet synced"),
        Ok(false) => tracing::warn!(%tab, nom = %fila.nom, grup = %fila.grup, "student row not synced"),
        Err(e) => tracing::warn!("syncing {tab}: {e}"),
    }
}

/// GET /entrevistes/tabs/{spreadsheet_id}: tab titles.
pub async fn tabs(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(spreadsheet_id): Path<String>,
) -> Json<TabsResponse> {
    let tabs = state.sheets_repo(&spreadsheet_id).all_sheets().await;
    Json(TabsResponse { tabs })
}

/// GET /entrevistes/tabs/{spreadsheet_id}/entrevistes: interviews per tab.
pub async fn tabs_entrevistes(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(spreadsheet_id): Path<String>,
) -> Json<TabsDataResponse> {
    let tabs_data = state.sheets_repo(&spreadsheet_id).entrevistes_by_tabs().await;
    Json(TabsDataResponse { tabs_data })
}

/// GET /entrevistes/tabs/{spreadsheet_id}/historial: every tab's interviews,
/// newest first.
pub async fn tabs_historial(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(spreadsheet_id): Path<String>,
) -> Json<HistorialTabsResponse> {
    let historial = state.sheets_repo(&spreadsheet_id).historial_consolidat().await;
    Json(HistorialTabsResponse { historial })
}
