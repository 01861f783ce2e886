use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use entrevistes_api::db::{alumnes, dades};
use entrevistes_api::{
    AnyCursQuery, CreateSolicitudRequest, DadesPersonals, EntrevistaAlumne, EstatSolicitud, FitxaAlumne,
    ImportDadesPersonalsRequest, ImportDadesPersonalsResponse, MessageResponse, ResoldreSolicitudRequest,
    SolicitudCanvi, service,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::routes::citas;
use crate::storage::{Db, execute_on, fetch_optional_on};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/solicituts-canvi", get(list_solicituds).post(create_solicitud))
        .route("/solicituts-canvi/{id}", put(resoldre_solicitud))
        .route("/export/csv", get(export_csv))
        .route("/import", post(import))
        .route("/cites/{id}/confirmar", put(citas::confirmar))
        .route("/{id}", get(fitxa).delete(remove))
        .route("/{id}/entrevistes", get(entrevistes))
        .route("/{id}/cites", get(citas::list).post(citas::create))
}

async fn year_or_current(db: &Db, q: AnyCursQuery) -> String {
    match q.any_curs.filter(|a| !a.trim().is_empty()) {
        Some(any) => any,
        None => db.current_year().await,
    }
}

/// GET /dades-personals/{alumne_id}: personal data, group and personal tutor
/// of a student. Docents only see their own tutees.
pub async fn fitxa(
    State(db): State<Db>,
    user: AuthUser,
    Path(alumne_id): Path<String>,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<FitxaAlumne>, ApiErr> {
    let any_curs = year_or_current(&db, q).await;
    let fitxa = sqlx::query_as::<_, FitxaAlumne>(&dades::fitxa_sql())
        .bind(&alumne_id)
        .bind(&any_curs)
        .fetch_optional(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("reading fitxa of {alumne_id}: {e}");
            ApiErr::internal("Error obtenint dades personals")
        })?
        .filter(|f| {
            user.is_admin()
                || f.tutor_email
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(&user.email))
        })
        .ok_or_else(|| ApiErr::not_found("Alumne no trobat o sense accés"))?;
    Ok(Json(fitxa))
}

/// GET /dades-personals/{alumne_id}/entrevistes: interviews of the year.
pub async fn entrevistes(
    State(db): State<Db>,
    user: AuthUser,
    Path(alumne_id): Path<String>,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<EntrevistaAlumne>>, ApiErr> {
    let any_curs = year_or_current(&db, q).await;
    let tutor = (!user.is_admin()).then(|| user.email.to_lowercase());
    let rows = sqlx::query_as::<_, EntrevistaAlumne>(dades::ENTREVISTES_ALUMNE)
        .bind(&alumne_id)
        .bind(&any_curs)
        .bind(tutor)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("interviews of {alumne_id}: {e}");
            ApiErr::internal("Error obtenint historial entrevistes")
        })?;
    Ok(Json(rows))
}

/// DELETE /dades-personals/{alumne_id}: remove a student and everything
/// that hangs off it.
pub async fn remove(
    State(db): State<Db>,
    user: AuthUser,
    Path(alumne_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiErr> {
    user.require_admin()?;
    let deleted = db.execute(alumnes::delete(&alumne_id)).await.map_err(|e| {
        tracing::error!("deleting alumne {alumne_id}: {e}");
        ApiErr::internal("Error eliminant alumne")
    })?;
    if deleted == 0 {
        return Err(ApiErr::not_found("Alumne no trobat"));
    }
    tracing::info!(alumne = %alumne_id, by = %user.email, "alumne deleted");
    Ok(Json(MessageResponse {
        message: "Alumne eliminat correctament".into(),
    }))
}

// ---------------------------------------------------------------------------
// Change requests
// ---------------------------------------------------------------------------

/// POST /dades-personals/solicituts-canvi: a personal tutor asks the
/// administration to change one field of a tutee's record.
pub async fn create_solicitud(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<CreateSolicitudRequest>,
) -> Result<(StatusCode, Json<SolicitudCanvi>), ApiErr> {
    if user.is_admin() {
        return Err(ApiErr::forbidden("Només els tutors poden crear sol·licituds"));
    }
    let mut details = Vec::new();
    if req.alumne_id.trim().is_empty() {
        details.push("alumne_id: camp requerit".to_string());
    }
    if req.camp_modificar.trim().is_empty() {
        details.push("camp_modificar: camp requerit".to_string());
    }
    if let Err(e) = service::validate_justificacio(&req.justificacio) {
        details.push(format!("justificacio: {}", e.message()));
    }
    if !details.is_empty() {
        return Err(ApiErr::invalid(details));
    }

    let any_curs = db.current_year().await;
    if !citas::es_tutor(&db, &req.alumne_id, &user.email, &any_curs).await? {
        return Err(ApiErr::forbidden("No tens accés a aquest alumne"));
    }

    let fail = |e: sqlx::Error| {
        tracing::error!("creating solicitud for {}: {e}", req.alumne_id);
        ApiErr::internal("Error creant sol·licitud")
    };
    let id = service::new_solicitud_id();
    let mut tx = db.begin().await.map_err(fail)?;
    execute_on(
        &mut tx,
        dades::insert_solicitud(
            &id,
            &req.alumne_id,
            &user.email,
            req.camp_modificar.trim(),
            req.valor_actual.as_deref(),
            req.valor_nou.as_deref(),
            req.justificacio.trim(),
        ),
    )
    .await
    .map_err(fail)?;
    let solicitud = fetch_optional_on::<SolicitudCanvi>(&mut tx, dades::get_solicitud(&id))
        .await
        .map_err(fail)?
        .ok_or_else(|| ApiErr::internal("Error creant sol·licitud"))?;
    tx.commit().await.map_err(fail)?;

    tracing::info!(%id, alumne = %solicitud.alumne_id, camp = %solicitud.camp_modificar, "solicitud created");
    Ok((StatusCode::CREATED, Json(solicitud)))
}

/// GET /dades-personals/solicituts-canvi: every request, newest first.
pub async fn list_solicituds(State(db): State<Db>, user: AuthUser) -> Result<Json<Vec<SolicitudCanvi>>, ApiErr> {
    user.require_admin()?;
    let rows = db
        .fetch_all::<SolicitudCanvi>(dades::list_solicituds())
        .await
        .map_err(|e| {
            tracing::error!("listing solicituds: {e}");
            ApiErr::internal("Error obtenint sol·licituds")
        })?;
    Ok(Json(rows))
}

/// PUT /dades-personals/solicituts-canvi/{id}: approve or reject.
pub async fn resoldre_solicitud(
    State(db): State<Db>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<ResoldreSolicitudRequest>,
) -> Result<Json<SolicitudCanvi>, ApiErr> {
    user.require_admin()?;
    if req.estat == EstatSolicitud::Pendent {
        return Err(ApiErr::bad_request("Estat invàlid"));
    }
    let fail = |e: sqlx::Error| {
        tracing::error!("resolving solicitud {id}: {e}");
        ApiErr::internal("Error resolent sol·licitud")
    };
    let notes = req.notes_admin.as_deref().filter(|n| !n.trim().is_empty());
    let updated = db
        .execute(dades::resoldre_solicitud(&id, req.estat.as_str(), &user.email, notes))
        .await
        .map_err(fail)?;
    if updated == 0 {
        return Err(ApiErr::not_found("Sol·licitud no trobada"));
    }
    let solicitud = db
        .fetch_optional::<SolicitudCanvi>(dades::get_solicitud(&id))
        .await
        .map_err(fail)?
        .ok_or_else(|| ApiErr::not_found("Sol·licitud no trobada"))?;

    if req.estat == EstatSolicitud::Aprovada {
        tracing::info!(
            %id,
            camp = %solicitud.camp_modificar,
            valor = solicitud.valor_nou.as_deref().unwrap_or_default(),
            "solicitud approved; apply the change to the record"
        );
    }
    Ok(Json(solicitud))
}

// ---------------------------------------------------------------------------
// Import / export
// ---------------------------------------------------------------------------

/// POST /dades-personals/import: store one personal-data record and link it
/// to the student with the same email, or else the same name.
pub async fn import(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<ImportDadesPersonalsRequest>,
) -> Result<Json<ImportDadesPersonalsResponse>, ApiErr> {
    user.require_admin()?;
    let alumne_nom = req.alumne_nom.trim();
    let email = req
        .dades
        .alumne_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    if alumne_nom.is_empty() && email.is_none() {
        return Err(ApiErr::invalid(vec!["alumne_nom: camp requerit".into()]));
    }

    let fail = |e: sqlx::Error| {
        tracing::error!("importing dades of {alumne_nom}: {e}");
        ApiErr::internal("Error important dades personals")
    };
    let mut tx = db.begin().await.map_err(fail)?;

    let mut alumne_id = None;
    if let Some(email) = email {
        alumne_id = fetch_optional_on::<(String,)>(&mut tx, alumnes::ids_by_email(email))
            .await
            .map_err(fail)?
            .map(|(id,)| id);
    }
    if alumne_id.is_none() && !alumne_nom.is_empty() {
        alumne_id = fetch_optional_on::<(String,)>(&mut tx, alumnes::ids_by_nom(alumne_nom))
            .await
            .map_err(fail)?
            .map(|(id,)| id);
    }

    // A student that already has a record keeps its personal id.
    let existing = match &alumne_id {
        Some(id) => fetch_optional_on::<(Option<String>,)>(&mut tx, alumnes::get_personal_id(id))
            .await
            .map_err(fail)?
            .and_then(|(pid,)| pid)
            .filter(|pid| !pid.trim().is_empty()),
        None => None,
    };
    let personal_id = existing
        .or_else(|| Some(req.dades.personal_id.trim().to_string()).filter(|p| !p.is_empty()))
        .unwrap_or_else(service::new_personal_id);

    let dades = DadesPersonals {
        personal_id: personal_id.clone(),
        ..req.dades
    };
    execute_on(&mut tx, dades::upsert_pf(&dades)).await.map_err(fail)?;
    if let Some(id) = &alumne_id {
        execute_on(&mut tx, alumnes::set_personal_id(id, &personal_id))
            .await
            .map_err(fail)?;
    } else {
        tracing::warn!("no student matches imported record {alumne_nom}");
    }
    tx.commit().await.map_err(fail)?;

    Ok(Json(ImportDadesPersonalsResponse { personal_id, alumne_id }))
}

/// GET /dades-personals/export/csv: the record cards of a year as CSV.
pub async fn export_csv(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Response, ApiErr> {
    user.require_admin()?;
    let any_curs = year_or_current(&db, q).await;
    let rows = sqlx::query_as::<_, FitxaAlumne>(&dades::export_sql())
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("exporting dades of {any_curs}: {e}");
            ApiErr::internal("Error exportant dades")
        })?;

    let body = render_csv(&rows).map_err(|e| {
        tracing::error!("rendering dades of {any_curs}: {e}");
        ApiErr::internal("Error exportant dades")
    })?;

    tracing::info!(any = %any_curs, rows = rows.len(), "dades personals exported");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"dades_personals_{any_curs}.csv\""),
            ),
        ],
        body,
    )
        .into_response())
}

fn export_fields(f: &FitxaAlumne) -> [Option<&str>; 23] {
    let d = &f.dades;
    [
        Some(f.alumne_id.as_str()),
        Some(f.nom.as_str()),
        f.email.as_deref(),
        f.grup.as_deref(),
        f.tutor_email.as_deref(),
        Some(d.personal_id.as_str()),
        d.sexe.as_deref(),
        d.data_naixement.as_deref(),
        d.municipi_naixement.as_deref(),
        d.nacionalitat.as_deref(),
        d.adreca.as_deref(),
        d.municipi_residencia.as_deref(),
        d.codi_postal.as_deref(),
        d.doc_identitat.as_deref(),
        d.tis.as_deref(),
        d.ralc.as_deref(),
        d.link_fotografia.as_deref(),
        d.tutor1_nom.as_deref(),
        d.tutor1_tel.as_deref(),
        d.tutor1_email.as_deref(),
        d.tutor2_nom.as_deref(),
        d.tutor2_tel.as_deref(),
        d.tutor2_email.as_deref(),
    ]
}

/// Header line plus one line per card, every value quoted.
fn render_csv(rows: &[FitxaAlumne]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(dades::EXPORT_HEADERS)?;
    for row in rows {
        writer.write_record(export_fields(row).iter().map(|v| v.unwrap_or_default()))?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
