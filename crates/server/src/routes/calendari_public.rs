//! Booking page data for families. No authentication: requests wait for the
//! tutor's approval before they reach the calendar.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use entrevistes_api::db::cites::{self, NovaCita};
use entrevistes_api::db::{horaris, usuaris};
use entrevistes_api::{
    AprovarCitaRequest, AprovarCitaResponse, CalendariPublic, Cita, CitesPendentsResponse, EstatCita, HorariTutor,
    SolicitarCitaRequest, SolicitarCitaResponse, TipusNotificacio, Usuari, service,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::citas::{book, load_cita, notify};
use crate::storage::Db;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/solicitar-cita", post(solicitar_cita))
        .route("/aprobar-cita", post(aprobar_cita))
        .route("/{tutor_email}", get(calendari))
        .route("/{tutor_email}/citas-pendientes", get(cites_pendents))
}

fn validate_solicitud(req: &SolicitarCitaRequest) -> Result<(), ApiErr> {
    let mut details = Vec::new();
    if service::validate_email(&req.tutor_email).is_err() {
        details.push("tutorEmail: email invàlid".to_string());
    }
    if req.familia_nombre.trim().is_empty() {
        details.push("familiaNombre: camp requerit".to_string());
    }
    if service::validate_email(&req.familia_email).is_err() {
        details.push("familiaEmail: email invàlid".to_string());
    }
    if service::parse_hora(&req.hora).is_none() {
        details.push("hora: format HH:MM".to_string());
    }
    if let Err(e) = service::validate_durada(req.duracion) {
        details.push(format!("duracion: {}", e.message()));
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiErr::invalid(details))
    }
}

async fn find_tutor(db: &Db, tutor_email: &str, fail: &'static str) -> Result<Usuari, ApiErr> {
    db.fetch_optional::<Usuari>(usuaris::get(&tutor_email.trim().to_lowercase()))
        .await
        .map_err(|e| {
            tracing::error!("reading tutor {tutor_email}: {e}");
            ApiErr::internal(fail)
        })?
        .ok_or_else(|| ApiErr::not_found("Tutor no trobat"))
}

/// GET /calendari-public/{tutor_email}: tutor, active availability windows
/// and requests awaiting approval.
pub async fn calendari(State(db): State<Db>, Path(tutor_email): Path<String>) -> Result<Json<CalendariPublic>, ApiErr> {
    const FAIL: &str = "Error generant calendari públic";
    let tutor = find_tutor(&db, &tutor_email, FAIL).await?;
    let fail = |e: sqlx::Error| {
        tracing::error!("public calendar of {}: {e}", tutor.email);
        ApiErr::internal(FAIL)
    };
    let horaris = db
        .fetch_all::<HorariTutor>(horaris::list_active(&tutor.email))
        .await
        .map_err(fail)?;
    let cites_pendents = db
        .fetch_all::<Cita>(cites::pending_approval(&tutor.email))
        .await
        .map_err(fail)?;
    Ok(Json(CalendariPublic {
        tutor,
        horaris,
        cites_pendents,
    }))
}

/// GET /calendari-public/{tutor_email}/citas-pendientes
pub async fn cites_pendents(
    State(db): State<Db>,
    Path(tutor_email): Path<String>,
) -> Result<Json<CitesPendentsResponse>, ApiErr> {
    let citas = db
        .fetch_all::<Cita>(cites::pending_approval(&tutor_email.trim().to_lowercase()))
        .await
        .map_err(|e| {
            tracing::error!("pending requests of {tutor_email}: {e}");
            ApiErr::internal("Error obtenint cites pendents")
        })?;
    Ok(Json(CitesPendentsResponse { citas }))
}

/// POST /calendari-public/solicitar-cita: a family asks for a slot.
pub async fn solicitar_cita(
    State(state): State<AppState>,
    AppJson(req): AppJson<SolicitarCitaRequest>,
) -> Result<Json<SolicitarCitaResponse>, ApiErr> {
    const FAIL: &str = "Error sol·licitant cita";
    validate_solicitud(&req)?;
    let tutor = find_tutor(&state.db, &req.tutor_email, FAIL).await?;
    let data_cita = service::parse_hora(&req.hora)
        .and_then(|hora| service::local_datetime(&state.config.calendar_timezone, req.fecha, hora))
        .ok_or_else(|| ApiErr::invalid(vec!["hora: format HH:MM".into()]))?;

    let id = service::new_cita_id();
    let any_curs = state.db.current_year().await;
    let notes = Some(req.notas.trim()).filter(|n| !n.is_empty());
    let nova = NovaCita {
        id: &id,
        alumne_id: None,
        tutor_email: &tutor.email,
        any_curs: &any_curs,
        data_cita,
        durada_minuts: req.duracion,
        nom_familia: req.familia_nombre.trim(),
        email_familia: req.familia_email.trim(),
        telefon_familia: req.familia_telefono.trim(),
        estat: EstatCita::PendentAprovacio.as_str(),
        notes,
    };
    let cita = book(&state, &nova, FAIL).await?;
    Ok(Json(SolicitarCitaResponse {
        success: true,
        message: "Sol·licitud de cita enviada. El tutor la revisarà i et confirmarà.".into(),
        cita_id: cita.id,
        estado: cita.estat,
    }))
}

/// POST /calendari-public/aprobar-cita: approve a request, creating its
/// calendar event, or turn it down.
pub async fn aprobar_cita(
    State(state): State<AppState>,
    AppJson(req): AppJson<AprovarCitaRequest>,
) -> Result<Json<AprovarCitaResponse>, ApiErr> {
    const FAIL: &str = "Error processant aprovació";
    let cita = load_cita(&state.db, &req.cita_id, FAIL).await?;
    if cita.estat != EstatCita::PendentAprovacio.as_str() {
        return Err(ApiErr::not_found("Cita no trobada o ja processada"));
    }
    let estat = if req.aprobar {
        EstatCita::Confirmada
    } else {
        EstatCita::Cancelada
    };
    state
        .db
        .execute(cites::set_estat(&cita.id, estat.as_str()))
        .await
        .map_err(|e| {
            tracing::error!("resolving request {}: {e}", cita.id);
            ApiErr::internal(FAIL)
        })?;

    if !req.aprobar {
        let cita = Cita {
            estat: estat.as_str().into(),
            ..cita
        };
        notify(&state, &cita, TipusNotificacio::Cancelada);
        tracing::info!(id = %cita.id, "public request turned down");
        return Ok(Json(AprovarCitaResponse {
            success: true,
            message: "Cita rebutjada".into(),
            google_event_id: None,
            event_url: None,
        }));
    }

    if let Err(e) = state.sync.sync_cita_to_google(&cita.id).await {
        tracing::warn!("calendar event for approved cita {}: {e}", cita.id);
    }
    let cita = load_cita(&state.db, &cita.id, FAIL).await?;
    notify(&state, &cita, TipusNotificacio::Confirmada);
    tracing::info!(id = %cita.id, event = ?cita.google_event_id, "public request approved");
    Ok(Json(AprovarCitaResponse {
        success: true,
        message: "Cita aprovada i creada en Google Calendar".into(),
        google_event_id: cita.google_event_id,
        event_url: cita.google_event_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{error_of, get, json, send};
    use axum::http::StatusCode;
    use serde_json::json;

    fn solicitud(tutor_email: &str, hora: &str) -> SolicitarCitaRequest {
        serde_json::from_value(json!({
            "tutorEmail": tutor_email,
            "familiaNombre": "Família Puig",
            "familiaEmail": "puig@example.com",
            "fecha": "2025-11-03",
            "hora": hora,
        }))
        .unwrap()
    }

    #[test]
    fn optional_fields_take_defaults() {
        let req = solicitud("tutor@insbitacola.cat", "16:30");
        assert_eq!(req.duracion, 30);
        assert!(req.familia_telefono.is_empty());
        assert!(validate_solicitud(&req).is_ok());
    }

    #[test]
    fn bad_time_and_tutor_are_reported() {
        let err = validate_solicitud(&solicitud("no-email", "setze")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Dades invàlides");
    }

    #[tokio::test]
    async fn requests_need_no_token() {
        let req = json(
            "POST",
            "/calendari-public/solicitar-cita",
            None,
            json!({"tutorEmail": "x", "familiaNombre": "", "familiaEmail": "", "fecha": "2025-11-03", "hora": "9:00"}),
        );
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Dades invàlides");
    }

    #[tokio::test]
    async fn calendar_page_reports_storage_failures() {
        let resp = send(AppState::for_tests(true), get("/calendari-public/tutor@insbitacola.cat", None)).await;
        let (status, msg) = error_of(resp).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(msg, "Error generant calendari públic");
    }
}
