use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::Utc;

use entrevistes_api::db::{alumnes, consolidacio, cursos, entrevistes};
use entrevistes_api::{
    AlumneCurs, AlumneObservacio, AlumneRecompte, AnyCursQuery, ControlAlumnesResponse, ControlStats,
    CreateCursRequest, CreateCursResponse, Curs, EntrevistaDetall, EstadistiquesResponse, ExportacioResponse,
    Grup, ImportacioRequest, ImportacioResponse, Recompte, StatusResponse, service,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, execute_on};

const TOP_ALUMNES: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).delete(delete_all))
        .route("/importacio", post(importacio))
        .route("/exportacio", get(exportacio))
        .route("/estadisticas/{any_curs}", get(estadistiques))
        .route("/control-alumnes/{any_curs}", get(control_alumnes))
        .route("/{any_curs}", delete(delete_year))
}

fn incomplete() -> ApiErr {
    ApiErr::bad_request("Dades requerides incompletes")
}

// ---------------------------------------------------------------------------
// Years & groups
// ---------------------------------------------------------------------------

/// GET /cursos: years, newest first, each with its groups.
pub async fn list(State(db): State<Db>, _user: AuthUser) -> Json<Vec<Curs>> {
    let (anys, grups) = match tokio::try_join!(
        db.fetch_all::<(String,)>(cursos::list_cursos()),
        db.fetch_all::<Grup>(cursos::list_grups()),
    ) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("listing cursos: {e}");
            return Json(Vec::new());
        }
    };
    Json(
        anys.into_iter()
            .map(|(any,)| Curs {
                grups: grups.iter().filter(|g| g.any_curs == any).cloned().collect(),
                any,
            })
            .collect(),
    )
}

/// POST /cursos: create a year with its groups (admin). The spreadsheet
/// mirror is best-effort.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<CreateCursRequest>,
) -> Result<(StatusCode, Json<CreateCursResponse>), ApiErr> {
    user.require_admin()?;
    let any_curs = service::validate_any_curs(&req.any_curs)?;
    if req.grups.iter().any(|g| g.curs.trim().is_empty() || g.nom.trim().is_empty()) {
        return Err(incomplete());
    }

    let mut tx = state.db.begin().await.map_err(ApiErr::from_db("begin"))?;
    execute_on(&mut tx, cursos::insert_curs(&any_curs))
        .await
        .map_err(ApiErr::from_db("insert curs"))?;
    let mut rows = Vec::with_capacity(req.grups.len());
    for g in &req.grups {
        let grup_id = service::grup_id(&g.nom, &any_curs);
        execute_on(&mut tx, cursos::upsert_grup(&grup_id, &any_curs, g.curs.trim(), g.nom.trim()))
            .await
            .map_err(ApiErr::from_db("upsert grup"))?;
        rows.push(vec![grup_id, g.curs.trim().to_string(), g.nom.trim().to_string()]);
    }
    tx.commit().await.map_err(ApiErr::from_db("commit curs"))?;

    if let Some(repo) = state.default_sheets_repo() {
        if let Err(e) = repo.publish_curs(&any_curs, rows).await {
            tracing::warn!("mirroring curs {any_curs} to Sheets: {e}");
        }
    }

    tracing::info!(%any_curs, grups = req.grups.len(), "curs created");
    Ok((
        StatusCode::CREATED,
        Json(CreateCursResponse {
            any_curs,
            grups_creats: req.grups.len(),
            status: "created".into(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Import / export
// ---------------------------------------------------------------------------

/// POST /cursos/importacio: enrol students, skipping names already in the
/// same group (admin).
pub async fn importacio(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<ImportacioRequest>,
) -> Result<Json<ImportacioResponse>, ApiErr> {
    user.require_admin()?;
    let any_curs = service::validate_any_curs(&req.any_curs)?;

    let mut out = ImportacioResponse {
        importats: 0,
        duplicats: 0,
        sense_id: 0,
        status: "ok".into(),
    };
    let mut tx = db.begin().await.map_err(ApiErr::from_db("begin"))?;
    execute_on(&mut tx, cursos::insert_curs(&any_curs))
        .await
        .map_err(ApiErr::from_db("insert curs"))?;

    for al in &req.alumnes {
        let nom = service::normalize_name(&al.nom);
        let grup = al.grup.trim();
        if nom.is_empty() || grup.is_empty() {
            continue;
        }
        let grup_id = service::grup_id(grup, &any_curs);
        execute_on(&mut tx, cursos::upsert_grup(&grup_id, &any_curs, &service::curs_of_grup(grup), grup))
            .await
            .map_err(ApiErr::from_db("upsert grup"))?;

        let exists: bool = sqlx::query_scalar(alumnes::EXISTS_NOM_GRUP)
            .bind(&nom)
            .bind(&grup_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(ApiErr::from_db("checking duplicate"))?;
        if exists {
            out.duplicats += 1;
            continue;
        }

        let personal_id = al.personal_id.as_deref().map(str::trim).filter(|p| !p.is_empty());
        if personal_id.is_none() {
            out.sense_id += 1;
        }
        let alumne_id = service::new_alumne_id();
        execute_on(&mut tx, alumnes::insert(&alumne_id, &nom, None, personal_id))
            .await
            .map_err(ApiErr::from_db("insert alumne"))?;
        execute_on(&mut tx, alumnes::upsert_enrolment(&alumne_id, &any_curs, Some(&grup_id), "alta"))
            .await
            .map_err(ApiErr::from_db("insert enrolment"))?;
        out.importats += 1;
    }
    tx.commit().await.map_err(ApiErr::from_db("commit importacio"))?;

    tracing::info!(%any_curs, importats = out.importats, duplicats = out.duplicats, "alumnes imported");
    Ok(Json(out))
}

/// GET /cursos/exportacio: students and interviews of a year.
pub async fn exportacio(
    State(db): State<Db>,
    _user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<ExportacioResponse>, ApiErr> {
    let any_curs = match q.any_curs {
        Some(any) => any,
        None => db.current_year().await,
    };
    let alumnes = sqlx::query_as::<_, AlumneCurs>(alumnes::LIST_ANY)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(ApiErr::from_db("exporting alumnes"))?;
    let entrevistes = sqlx::query_as::<_, EntrevistaDetall>(entrevistes::LIST_DETALL)
        .bind(None::<String>)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(ApiErr::from_db("exporting entrevistes"))?;
    Ok(Json(ExportacioResponse {
        any_curs,
        alumnes,
        entrevistes,
    }))
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

/// DELETE /cursos: remove every year and its data (admin).
pub async fn delete_all(State(db): State<Db>, user: AuthUser) -> Result<Json<StatusResponse>, ApiErr> {
    user.require_admin()?;
    let fail = |e: sqlx::Error| {
        tracing::error!("deleting all cursos: {e}");
        ApiErr::internal("Error eliminant els cursos")
    };
    let mut tx = db.begin().await.map_err(fail)?;
    for stmt in cursos::delete_all() {
        execute_on(&mut tx, stmt).await.map_err(fail)?;
    }
    tx.commit().await.map_err(fail)?;

    tracing::warn!(by = %user.email, "all cursos deleted");
    Ok(Json(StatusResponse {
        message: "Tots els cursos i dades relacionades han estat eliminats".into(),
        status: "ok".into(),
        timestamp: Utc::now(),
    }))
}

/// DELETE /cursos/{any_curs}: remove one year and its data (admin).
pub async fn delete_year(
    State(db): State<Db>,
    user: AuthUser,
    Path(any_curs): Path<String>,
) -> Result<Json<StatusResponse>, ApiErr> {
    user.require_admin()?;
    let fail = |e: sqlx::Error| {
        tracing::error!("deleting curs: {e}");
        ApiErr::internal("Error eliminant el curs")
    };
    let mut tx = db.begin().await.map_err(fail)?;
    execute_on(&mut tx, consolidacio::delete_year(&any_curs)).await.map_err(fail)?;
    for stmt in cursos::delete_year(&any_curs) {
        execute_on(&mut tx, stmt).await.map_err(fail)?;
    }
    tx.commit().await.map_err(fail)?;

    tracing::warn!(%any_curs, by = %user.email, "curs deleted");
    Ok(Json(StatusResponse {
        message: format!("Curs {any_curs} i dades relacionades han estat eliminats"),
        status: "ok".into(),
        timestamp: Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

async fn count(db: &Db, sql: &str, any_curs: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(sql).bind(any_curs).fetch_one(db.pool()).await
}

async fn recomptes(db: &Db, sql: &str, any_curs: &str) -> Result<Vec<Recompte>, sqlx::Error> {
    sqlx::query_as(sql).bind(any_curs).fetch_all(db.pool()).await
}

/// GET /cursos/estadisticas/{any_curs}: totals and breakdowns of a year.
pub async fn estadistiques(
    State(db): State<Db>,
    _user: AuthUser,
    Path(any_curs): Path<String>,
) -> Result<Json<EstadistiquesResponse>, ApiErr> {
    let (total_alumnes, total_entrevistes, total_grups, per_mes, per_grup, alumnes_per_grup) = tokio::try_join!(
        count(&db, cursos::COUNT_ALUMNES, &any_curs),
        count(&db, cursos::COUNT_ENTREVISTES, &any_curs),
        count(&db, cursos::COUNT_GRUPS, &any_curs),
        recomptes(&db, cursos::ENTREVISTES_PER_MES, &any_curs),
        recomptes(&db, cursos::ENTREVISTES_PER_GRUP, &any_curs),
        recomptes(&db, cursos::ALUMNES_PER_GRUP, &any_curs),
    )
    .map_err(|e| {
        tracing::error!("estadistiques {any_curs}: {e}");
        ApiErr::internal("Error obtenint estadístiques del curs")
    })?;

    Ok(Json(EstadistiquesResponse {
        any_curs,
        total_alumnes,
        total_entrevistes,
        total_grups,
        per_mes,
        per_grup,
        alumnes_per_grup,
    }))
}

/// Busiest students and students never interviewed, from per-student counts
/// sorted busiest first.
fn split_recomptes(recomptes: Vec<AlumneRecompte>) -> (Vec<AlumneRecompte>, Vec<AlumneRecompte>) {
    let (amb, sense): (Vec<_>, Vec<_>) = recomptes.into_iter().partition(|r| r.total_entrevistes > 0);
    (amb.into_iter().take(TOP_ALUMNES).collect(), sense)
}

/// GET /cursos/control-alumnes/{any_curs}: follow-up dashboard of a year.
pub async fn control_alumnes(
    State(db): State<Db>,
    _user: AuthUser,
    Path(any_curs): Path<String>,
) -> Result<Json<ControlAlumnesResponse>, ApiErr> {
    let fail = |e: sqlx::Error| {
        tracing::error!("control alumnes: {e}");
        ApiErr::internal("Error obtenint control d'alumnes")
    };
    let recomptes = sqlx::query_as::<_, AlumneRecompte>(cursos::RECOMPTE_PER_ALUMNE)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(fail)?;
    let alertes = sqlx::query_as::<_, AlumneObservacio>(cursos::OBSERVACIONS_ALERTA)
        .bind(&any_curs)
        .bind(service::alert_like_patterns())
        .fetch_all(db.pool())
        .await
        .map_err(fail)?;

    let total_alumnes = recomptes.len();
    let amb_entrevistes = recomptes.iter().filter(|r| r.total_entrevistes > 0).count();
    let alertats: HashSet<&str> = alertes.iter().map(|a| a.alumne_id.as_str()).collect();
    let estadistiques = ControlStats {
        total_alumnes,
        amb_entrevistes,
        sense_entrevistes: total_alumnes - amb_entrevistes,
        alertes: alertats.len(),
    };
    let (top_alumnes, sense_entrevistes) = split_recomptes(recomptes);

    Ok(Json(ControlAlumnesResponse {
        top_alumnes,
        sense_entrevistes,
        alertes,
        estadistiques,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{error_of, json, send};

    fn recompte(id: &str, total: i64) -> AlumneRecompte {
        AlumneRecompte {
            alumne_id: id.into(),
            nom: id.into(),
            grup: Some("1A".into()),
            total_entrevistes: total,
        }
    }

    #[test]
    fn top_list_is_capped_and_excludes_zero_counts() {
        let mut rows: Vec<_> = (0..12).map(|i| recompte(&format!("a{i}"), 20 - i)).collect();
        rows.push(recompte("z1", 0));
        rows.push(recompte("z2", 0));
        let (top, sense) = split_recomptes(rows);
        assert_eq!(top.len(), TOP_ALUMNES);
        assert_eq!(top[0].alumne_id, "a0");
        assert_eq!(sense.iter().map(|r| r.alumne_id.as_str()).collect::<Vec<_>>(), ["z1", "z2"]);
    }

    #[tokio::test]
    async fn create_rejects_short_year() {
        let state = AppState::for_tests(true);
        let user = AuthUser {
            email: "admin@insbitacola.cat".into(),
            rol: entrevistes_api::Rol::Admin,
        };
        let req = CreateCursRequest {
            any_curs: "25".into(),
            grups: Vec::new(),
        };
        let err = create(State(state), user, AppJson(req)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Dades requerides incompletes");
    }

    #[tokio::test]
    async fn docents_cannot_delete_years() {
        let req = json("DELETE", "/cursos/2024-2025", Some("t@insbitacola.cat"), serde_json::json!({}));
        let (status, _) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn wiping_every_year_is_admin_only() {
        let req = json("DELETE", "/cursos", Some("t@insbitacola.cat"), serde_json::json!({}));
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat");
    }
}
