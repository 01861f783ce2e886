use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{Duration, NaiveTime, Utc};

use entrevistes_api::db::cites::{self, NovaCita};
use entrevistes_api::db::{entrevistes, horaris, tutors};
use entrevistes_api::{
    AlumneContacte, AlumnesContacteResponse, AnyCursQuery, Cita, CitaMessage, CitaReservada, CitaRequest, CitesResponse,
    ConfigurarHorarisRequest, ConfigurarHorarisResponse, ConfirmarCitaResponse, Entrevista, EstatCita,
    HorariOcupat, HorariTutor, HorarisQuery, HorarisResponse, MessageResponse, ReservaRequest, TipusNotificacio,
    service,
};

use crate::AppState;
use crate::email::CitaNotification;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, execute_on, fetch_optional_on};
use crate::sync::event_details;

const CONFLICTE: &str = "Conflicte d'horari detectat. Selecciona un altre horari.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reservar", post(reservar))
        .route("/horarios/configurar", post(configurar_horaris))
        .route("/horarios/{tutor_email}", get(horaris_disponibles))
        .route("/tutor/{tutor_email}/alumnes", get(alumnes_del_tutor))
        .route("/tutor/{tutor_email}/lista", get(cites_del_tutor))
        .route("/{id}", get(list).post(create).delete(cancel))
        .route("/{id}/confirmar", put(confirmar))
}

// ---------------------------------------------------------------------------
// Shared booking logic
// ---------------------------------------------------------------------------

/// Field-level checks shared by every booking body.
pub(crate) fn validate_contacte(
    tutor_email: &str,
    durada_minuts: i32,
    nom_familia: &str,
    email_familia: &str,
    telefon_familia: &str,
) -> Result<(), ApiErr> {
    let mut details = Vec::new();
    if service::validate_email(tutor_email).is_err() {
        details.push("tutor_email: email invàlid".to_string());
    }
    if let Err(e) = service::validate_durada(durada_minuts) {
        details.push(format!("durada_minuts: {}", e.message()));
    }
    if nom_familia.trim().is_empty() {
        details.push("nom_familia: camp requerit".to_string());
    }
    if service::validate_email(email_familia).is_err() {
        details.push("email_familia: email invàlid".to_string());
    }
    if telefon_familia.trim().is_empty() {
        details.push("telefon_familia: camp requerit".to_string());
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiErr::invalid(details))
    }
}

pub(crate) fn validate_cita(req: &CitaRequest) -> Result<(), ApiErr> {
    validate_contacte(
        &req.tutor_email,
        req.durada_minuts,
        &req.nom_familia,
        &req.email_familia,
        &req.telefon_familia,
    )
}

/// Whether personal tutor `email` is assigned `alumne_id` in `any_curs`.
pub(crate) async fn es_tutor(db: &Db, alumne_id: &str, email: &str, any_curs: &str) -> Result<bool, ApiErr> {
    sqlx::query_scalar::<_, bool>(tutors::ES_TUTOR)
        .bind(alumne_id)
        .bind(email)
        .bind(any_curs)
        .fetch_one(db.pool())
        .await
        .map_err(ApiErr::from_db("checking tutorship"))
}

/// Whether the tutor is busy during the slot, in Google Calendar or here.
pub(crate) async fn has_conflict(state: &AppState, nova: &NovaCita<'_>) -> Result<bool, sqlx::Error> {
    let end = nova.data_cita + Duration::minutes(i64::from(nova.durada_minuts));
    if state
        .sync
        .calendar()
        .check_conflicts(nova.data_cita, end, nova.tutor_email, None)
        .await
    {
        return Ok(true);
    }
    let reservades = state
        .db
        .fetch_all::<CitaReservada>(cites::reservades_a_prop(nova.tutor_email, nova.data_cita, end))
        .await?;
    Ok(service::solapa(nova.data_cita, nova.durada_minuts, &reservades))
}

/// Whether a fresh booking in `estat` gets its calendar event right away,
/// and the notification it sends.
fn on_booking(estat: &str) -> (bool, TipusNotificacio) {
    if estat == EstatCita::PendentAprovacio.as_str() {
        (false, TipusNotificacio::SolicitudAprobacion)
    } else {
        (true, TipusNotificacio::Nueva)
    }
}

/// Store a new appointment after the conflict check. Bookings awaiting the
/// tutor's approval get no calendar event yet. The family and tutor are
/// notified once the row is committed.
pub(crate) async fn book(state: &AppState, nova: &NovaCita<'_>, fail: &'static str) -> Result<Cita, ApiErr> {
    let fail_with = |e: sqlx::Error| {
        tracing::error!("booking cita {}: {e}", nova.id);
        ApiErr::internal(fail)
    };
    if has_conflict(state, nova).await.map_err(fail_with)? {
        return Err(ApiErr::conflict(CONFLICTE));
    }
    let (with_event, tipus) = on_booking(nova.estat);

    let mut tx = state.db.begin().await.map_err(fail_with)?;
    execute_on(&mut tx, cites::insert(nova)).await.map_err(fail_with)?;
    let mut cita = fetch_optional_on::<Cita>(&mut tx, cites::get(nova.id))
        .await
        .map_err(fail_with)?
        .ok_or_else(|| ApiErr::internal(fail))?;

    if with_event {
        match state.sync.calendar().create_event(&event_details(&cita)).await {
            Ok(created) => {
                execute_on(
                    &mut tx,
                    cites::set_event(&cita.id, &created.google_event_id, &created.event_url),
                )
                .await
                .map_err(fail_with)?;
                cita.google_event_id = Some(created.google_event_id);
                cita.google_event_url = Some(created.event_url);
            }
            Err(e) => tracing::warn!("calendar event for cita {} not created: {e}", cita.id),
        }
    }
    tx.commit().await.map_err(fail_with)?;

    notify(state, &cita, tipus);
    tracing::info!(id = %cita.id, tutor = %cita.tutor_email, estat = %cita.estat, "cita booked");
    Ok(cita)
}

pub(crate) fn notify(state: &AppState, cita: &Cita, tipus: TipusNotificacio) {
    let notification = CitaNotification::from_cita(cita, tipus, state.config.calendar_timezone);
    state.email.send_cita_notification(&notification);
}

pub(crate) async fn load_cita(db: &Db, id: &str, fail: &'static str) -> Result<Cita, ApiErr> {
    db.fetch_optional::<Cita>(cites::get(id))
        .await
        .map_err(|e| {
            tracing::error!("reading cita {id}: {e}");
            ApiErr::internal(fail)
        })?
        .ok_or_else(|| ApiErr::not_found("Cita no trobada"))
}

/// The interview recorded when `cita` is confirmed: dated on the local day
/// of the appointment and linked back to it.
fn entrevista_de_cita(cita: &Cita, autor: &str, tz: chrono_tz::Tz) -> Result<Entrevista, ApiErr> {
    let Some(alumne_id) = cita.alumne_id.clone() else {
        return Err(ApiErr::bad_request("La cita no té cap alumne associat"));
    };
    Ok(Entrevista {
        id: service::new_entrevista_id(),
        alumne_id,
        any_curs: cita.any_curs.clone(),
        data: cita.data_cita.with_timezone(&tz).format("%Y-%m-%d").to_string(),
        acords: service::cita_entrevista_acords(&cita.nom_familia, &cita.telefon_familia, cita.notes.as_deref()),
        usuari_creador_id: autor.to_string(),
        cita_id: Some(cita.id.clone()),
    })
}

/// Confirm an appointment and record its interview in one transaction.
pub(crate) async fn confirm(state: &AppState, user: &AuthUser, cita: Cita) -> Result<ConfirmarCitaResponse, ApiErr> {
    const FAIL: &str = "Error confirmant cita";
    let entrevista = entrevista_de_cita(&cita, &user.email, state.config.calendar_timezone)?;
    let fail = |e: sqlx::Error| {
        tracing::error!("confirming cita {}: {e}", cita.id);
        ApiErr::internal(FAIL)
    };

    let mut tx = state.db.begin().await.map_err(fail)?;
    execute_on(&mut tx, cites::set_estat(&cita.id, EstatCita::Confirmada.as_str()))
        .await
        .map_err(fail)?;
    execute_on(&mut tx, entrevistes::insert(&entrevista)).await.map_err(fail)?;
    tx.commit().await.map_err(fail)?;

    let cita = Cita {
        estat: EstatCita::Confirmada.as_str().into(),
        ..cita
    };
    notify(state, &cita, TipusNotificacio::Confirmada);
    tracing::info!(id = %cita.id, entrevista = %entrevista.id, "cita confirmed");
    Ok(ConfirmarCitaResponse {
        cita,
        entrevista,
        message: "Cita confirmada i entrevista creada automàticament".into(),
    })
}

/// Docents may only act on their own calendar.
fn own_calendar(user: &AuthUser, tutor_email: &str, denied: &str) -> Result<(), ApiErr> {
    if user.is_admin() || user.email.eq_ignore_ascii_case(tutor_email) {
        Ok(())
    } else {
        Err(ApiErr::forbidden(denied))
    }
}

async fn year_or_current(db: &Db, q: AnyCursQuery) -> String {
    match q.any_curs.filter(|a| !a.trim().is_empty()) {
        Some(any) => any,
        None => db.current_year().await,
    }
}

// ---------------------------------------------------------------------------
// Appointments of a student
// ---------------------------------------------------------------------------

/// GET /citas/{alumne_id}: a student's appointments in a year. Docents see
/// the ones on their own calendar.
pub async fn list(
    State(db): State<Db>,
    user: AuthUser,
    Path(alumne_id): Path<String>,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<Cita>>, ApiErr> {
    let any_curs = year_or_current(&db, q).await;
    let mut rows = db
        .fetch_all::<Cita>(cites::list_by_alumne(&alumne_id, &any_curs))
        .await
        .map_err(|e| {
            tracing::error!("listing cites of {alumne_id}: {e}");
            ApiErr::internal("Error obtenint cites")
        })?;
    if !user.is_admin() {
        rows.retain(|c| c.tutor_email.eq_ignore_ascii_case(&user.email));
    }
    rows.sort_by_key(|c| c.data_cita);
    Ok(Json(rows))
}

/// POST /citas/{alumne_id}: book an appointment for a student. Docents must
/// be the student's personal tutor.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Path(alumne_id): Path<String>,
    Query(q): Query<AnyCursQuery>,
    AppJson(req): AppJson<CitaRequest>,
) -> Result<(StatusCode, Json<Cita>), ApiErr> {
    validate_cita(&req)?;
    let any_curs = year_or_current(&state.db, q).await;
    if !user.is_admin() && !es_tutor(&state.db, &alumne_id, &user.email, &any_curs).await? {
        return Err(ApiErr::forbidden("No tens accés a aquest alumne"));
    }

    let id = service::new_cita_id();
    let tutor_email = req.tutor_email.trim().to_lowercase();
    let nova = NovaCita {
        id: &id,
        alumne_id: Some(&alumne_id),
        tutor_email: &tutor_email,
        any_curs: &any_curs,
        data_cita: req.data_cita,
        durada_minuts: req.durada_minuts,
        nom_familia: req.nom_familia.trim(),
        email_familia: req.email_familia.trim(),
        telefon_familia: req.telefon_familia.trim(),
        estat: EstatCita::Pendent.as_str(),
        notes: req.notes.as_deref(),
    };
    let cita = book(&state, &nova, "Error creant cita").await?;
    Ok((StatusCode::CREATED, Json(cita)))
}

/// PUT /citas/{id}/confirmar: confirm and create the matching interview.
pub async fn confirmar(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ConfirmarCitaResponse>, ApiErr> {
    let cita = load_cita(&state.db, &id, "Error confirmant cita").await?;
    own_calendar(&user, &cita.tutor_email, "No tens permisos per confirmar aquesta cita")?;
    Ok(Json(confirm(&state, &user, cita).await?))
}

/// DELETE /citas/{id}: cancel an appointment. The row is kept with estat
/// `cancelada`; its calendar event is removed best-effort.
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiErr> {
    const FAIL: &str = "Error cancel·lant cita";
    let cita = load_cita(&state.db, &id, FAIL).await?;
    own_calendar(&user, &cita.tutor_email, "No tens permisos per cancel·lar aquesta cita")?;

    state.sync.delete_cita_event(&cita).await;
    state
        .db
        .execute(cites::set_estat(&id, EstatCita::Cancelada.as_str()))
        .await
        .map_err(|e| {
            tracing::error!("cancelling cita {id}: {e}");
            ApiErr::internal(FAIL)
        })?;

    notify(&state, &cita, TipusNotificacio::Cancelada);
    tracing::info!(%id, by = %user.email, "cita cancelled");
    Ok(Json(MessageResponse {
        message: "Cita cancel·lada correctament".into(),
    }))
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// GET /citas/horarios/{tutor_email}: free 30-minute slots of a day
/// (`?fecha`, default today) within the tutor's weekly window.
pub async fn horaris_disponibles(
    State(state): State<AppState>,
    user: AuthUser,
    Path(tutor_email): Path<String>,
    Query(q): Query<HorarisQuery>,
) -> Result<Json<HorarisResponse>, ApiErr> {
    own_calendar(&user, &tutor_email, "No tens permisos per veure aquests horaris")?;
    let tz = state.config.calendar_timezone;
    let fecha = q.fecha.unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
    let fail = |e: sqlx::Error| {
        tracing::error!("reading horaris of {tutor_email}: {e}");
        ApiErr::internal("Error obtenint horaris")
    };

    let (Some(from), Some(to)) = (
        service::local_datetime(&tz, fecha, NaiveTime::default()),
        service::local_datetime(&tz, fecha + Duration::days(1), NaiveTime::default()),
    ) else {
        return Err(ApiErr::bad_request("Data invàlida"));
    };
    let ocupats = state
        .db
        .fetch_all::<HorariOcupat>(cites::ocupats(&tutor_email, from, to))
        .await
        .map_err(fail)?;
    let finestra = state
        .db
        .fetch_optional::<HorariTutor>(horaris::active_for_day(&tutor_email, service::weekday_name(fecha)))
        .await
        .map_err(fail)?;

    let horarios_disponibles = finestra
        .and_then(|h| Some((service::parse_hora(&h.hora_inicio)?, service::parse_hora(&h.hora_fin)?)))
        .map(|(inicio, fin)| service::generate_slots(&tz, fecha, inicio, fin, service::SLOT_MINUTES, &ocupats))
        .unwrap_or_default();

    Ok(Json(HorarisResponse {
        tutor_email,
        fecha,
        horarios_disponibles,
        horarios_ocupados: ocupats,
    }))
}

/// POST /citas/horarios/configurar: replace the tutor's weekly windows with
/// the active days of the request.
pub async fn configurar_horaris(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<ConfigurarHorarisRequest>,
) -> Result<Json<ConfigurarHorarisResponse>, ApiErr> {
    let tutor_email = service::validate_email(&req.tutor_email)
        .map_err(|_| ApiErr::invalid(vec!["tutor_email: email invàlid".into()]))?;
    let duracion = service::validate_durada(req.duracion_cita)
        .map_err(|e| ApiErr::invalid(vec![format!("duracion_cita: {}", e.message())]))?;
    own_calendar(&user, &tutor_email, "No tens permisos per configurar aquests horaris")?;

    let actius: Vec<_> = req.dias_semana.iter().filter(|d| d.activo).collect();
    if let Some(dia) = actius.iter().find(|d| {
        !service::DIES_SETMANA.contains(&d.dia.as_str())
            || service::parse_hora(&d.inicio).is_none()
            || service::parse_hora(&d.fin).is_none()
    }) {
        return Err(ApiErr::invalid(vec![format!("{}: dia o hora invàlids", dia.dia)]));
    }

    let fail = |e: sqlx::Error| {
        tracing::error!("configuring horaris of {tutor_email}: {e}");
        ApiErr::internal("Error configurant horaris")
    };
    let mut tx = db.begin().await.map_err(fail)?;
    execute_on(&mut tx, horaris::delete_for_tutor(&tutor_email)).await.map_err(fail)?;
    for dia in &actius {
        execute_on(
            &mut tx,
            horaris::insert(&tutor_email, dia, req.fecha_inicio, req.fecha_fin, duracion),
        )
        .await
        .map_err(fail)?;
    }
    tx.commit().await.map_err(fail)?;

    tracing::info!(tutor = %tutor_email, dies = actius.len(), "horaris configured");
    Ok(Json(ConfigurarHorarisResponse {
        message: "Horaris configurats correctament".into(),
        total_horarios: actius.len(),
    }))
}

/// POST /citas/reservar: book a slot picked from the scheduler.
pub async fn reservar(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<ReservaRequest>,
) -> Result<(StatusCode, Json<CitaMessage>), ApiErr> {
    validate_contacte(
        &req.tutor_email,
        req.durada_minuts,
        &req.nom_familia,
        &req.email_familia,
        &req.telefon_familia,
    )?;
    let tutor_email = req.tutor_email.trim().to_lowercase();
    own_calendar(&user, &tutor_email, "No tens permisos per reservar per aquest tutor")?;

    let any_curs = state.db.current_year().await;
    if !user.is_admin() && !es_tutor(&state.db, &req.alumne_id, &user.email, &any_curs).await? {
        return Err(ApiErr::forbidden("No tens accés a aquest alumne"));
    }
    let data_cita = service::parse_hora(&req.hora)
        .and_then(|hora| service::local_datetime(&state.config.calendar_timezone, req.fecha, hora))
        .ok_or_else(|| ApiErr::invalid(vec!["hora: format HH:MM".into()]))?;

    let id = service::new_cita_id();
    let nova = NovaCita {
        id: &id,
        alumne_id: Some(&req.alumne_id),
        tutor_email: &tutor_email,
        any_curs: &any_curs,
        data_cita,
        durada_minuts: req.durada_minuts,
        nom_familia: req.nom_familia.trim(),
        email_familia: req.email_familia.trim(),
        telefon_familia: req.telefon_familia.trim(),
        estat: EstatCita::Pendent.as_str(),
        notes: req.notes.as_deref(),
    };
    let cita = book(&state, &nova, "Error reservant horari").await?;
    Ok((
        StatusCode::CREATED,
        Json(CitaMessage {
            cita,
            message: "Horari reservat correctament".into(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Tutor views
// ---------------------------------------------------------------------------

/// GET /citas/tutor/{tutor_email}/alumnes: tutees with family contacts.
pub async fn alumnes_del_tutor(
    State(db): State<Db>,
    user: AuthUser,
    Path(tutor_email): Path<String>,
) -> Result<Json<AlumnesContacteResponse>, ApiErr> {
    own_calendar(&user, &tutor_email, "No tens permisos per veure aquests alumnes")?;
    let any_curs = db.current_year().await;
    let alumnes = sqlx::query_as::<_, AlumneContacte>(tutors::CONTACTES_DEL_TUTOR)
        .bind(&tutor_email)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("tutees of {tutor_email}: {e}");
            ApiErr::internal("Error obtenint alumnes")
        })?;
    Ok(Json(AlumnesContacteResponse {
        total: alumnes.len(),
        alumnes,
    }))
}

/// GET /citas/tutor/{tutor_email}/lista: every appointment of a tutor,
/// newest first.
pub async fn cites_del_tutor(
    State(db): State<Db>,
    user: AuthUser,
    Path(tutor_email): Path<String>,
) -> Result<Json<CitesResponse>, ApiErr> {
    own_calendar(&user, &tutor_email, "No tens permisos per veure aquestes cites")?;
    let mut cites = db
        .fetch_all::<Cita>(cites::list_by_tutor(&tutor_email))
        .await
        .map_err(|e| {
            tracing::error!("cites of {tutor_email}: {e}");
            ApiErr::internal("Error obtenint cites del tutor")
        })?;
    cites.reverse();
    Ok(Json(CitesResponse {
        total: cites.len(),
        cites,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{error_of, get, json, send};
    use chrono::TimeZone;

    const DOCENT: &str = "docent@insbitacola.cat";

    fn request() -> CitaRequest {
        CitaRequest {
            tutor_email: "tutor@insbitacola.cat".into(),
            data_cita: Utc.with_ymd_and_hms(2025, 11, 3, 15, 0, 0).unwrap(),
            durada_minuts: 30,
            nom_familia: "Família Puig".into(),
            email_familia: "familia@example.com".into(),
            telefon_familia: "600000000".into(),
            notes: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_cita(&request()).is_ok());
    }

    #[test]
    fn every_invalid_field_is_reported() {
        let req = CitaRequest {
            durada_minuts: 300,
            email_familia: "no-email".into(),
            telefon_familia: " ".into(),
            ..request()
        };
        let err = validate_cita(&req).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Dades invàlides");
    }

    #[test]
    fn docents_only_use_their_own_calendar() {
        let docent = AuthUser {
            email: DOCENT.into(),
            rol: entrevistes_api::Rol::Docent,
        };
        assert!(own_calendar(&docent, "Docent@InsBitacola.cat", "no").is_ok());
        let err = own_calendar(&docent, "altre@insbitacola.cat", "No tens permisos").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let admin = AuthUser {
            email: "admin@insbitacola.cat".into(),
            rol: entrevistes_api::Rol::Admin,
        };
        assert!(own_calendar(&admin, "altre@insbitacola.cat", "no").is_ok());
    }

    #[tokio::test]
    async fn other_tutors_schedule_is_forbidden() {
        let resp = send(
            AppState::for_tests(true),
            get("/citas/horarios/altre@insbitacola.cat?fecha=2025-11-03", Some(DOCENT)),
        )
        .await;
        let (status, msg) = error_of(resp).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "No tens permisos per veure aquests horaris");
    }

    #[tokio::test]
    async fn invalid_body_is_rejected_before_access_checks() {
        let req = json(
            "POST",
            "/citas/a1",
            Some(DOCENT),
            serde_json::json!({
                "tutor_email": "tutor@insbitacola.cat",
                "data_cita": "2025-11-03T15:00:00Z",
                "durada_minuts": 5,
                "nom_familia": "Família Puig",
                "email_familia": "familia@example.com",
                "telefon_familia": "600000000"
            }),
        );
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Dades invàlides");
    }

    #[tokio::test]
    async fn configuring_someone_elses_schedule_is_forbidden() {
        let req = json(
            "POST",
            "/citas/horarios/configurar",
            Some(DOCENT),
            serde_json::json!({
                "tutor_email": "altre@insbitacola.cat",
                "dias_semana": [{"dia": "lunes", "inicio": "15:00", "fin": "17:00", "activo": true}]
            }),
        );
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "No tens permisos per configurar aquests horaris");
    }

    fn cita_de(alumne_id: Option<&str>) -> Cita {
        let data_cita = Utc.with_ymd_and_hms(2025, 11, 3, 23, 30, 0).unwrap();
        Cita {
            id: "cita_1_abc".into(),
            alumne_id: alumne_id.map(str::to_string),
            tutor_email: "tutor@insbitacola.cat".into(),
            any_curs: "2025-2026".into(),
            data_cita,
            durada_minuts: 30,
            nom_familia: "Família Puig".into(),
            email_familia: "familia@example.com".into(),
            telefon_familia: "600000000".into(),
            estat: "pendent".into(),
            notes: Some("Porten l'informe".into()),
            google_event_id: None,
            google_event_url: None,
            reminder_sent: None,
            created_at: data_cita,
            updated_at: data_cita,
        }
    }

    #[test]
    fn confirmation_interview_links_back_to_the_cita() {
        let e = entrevista_de_cita(&cita_de(Some("a1")), "tutor@insbitacola.cat", chrono_tz::Europe::Madrid).unwrap();
        assert!(e.id.starts_with("ent_"));
        assert_eq!(e.cita_id.as_deref(), Some("cita_1_abc"));
        assert_eq!(e.alumne_id, "a1");
        assert_eq!(e.any_curs, "2025-2026");
        assert_eq!(e.data, "2025-11-04");
        assert_eq!(e.usuari_creador_id, "tutor@insbitacola.cat");
        assert!(e.acords.contains("Telèfon: 600000000"));
        assert!(e.acords.ends_with("Notes: Porten l'informe"));
    }

    #[test]
    fn confirmation_needs_a_student() {
        let err = entrevista_de_cita(&cita_de(None), "tutor@insbitacola.cat", chrono_tz::Europe::Madrid).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "La cita no té cap alumne associat");
    }

    #[test]
    fn requests_awaiting_approval_get_no_event_yet() {
        assert_eq!(
            on_booking(EstatCita::PendentAprovacio.as_str()),
            (false, TipusNotificacio::SolicitudAprobacion)
        );
        assert_eq!(on_booking(EstatCita::Pendent.as_str()), (true, TipusNotificacio::Nueva));
    }

    mod booking {
        use super::*;
        use crate::google::calendar::CalendarClient;
        use crate::sync::SyncService;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        /// State whose calendar lists `items` for any range and must never
        /// receive a new event.
        async fn state_with_calendar(server: &MockServer, items: serde_json::Value) -> AppState {
            Mock::given(method("POST"))
                .and(path("/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "ya29.cal",
                    "expires_in": 3600
                })))
                .mount(server)
                .await;
            Mock::given(method("GET"))
                .and(path("/calendars/primary/events"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
                .mount(server)
                .await;
            Mock::given(method("POST"))
                .and(path("/calendars/primary/events"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(server)
                .await;

            let calendar = CalendarClient::new(
                reqwest::Client::new(),
                Some(crate::google::testing::account()),
                chrono_tz::Europe::Madrid,
                true,
            )
            .with_endpoints(server.uri(), format!("{}/token", server.uri()));
            let mut state = AppState::for_tests(true);
            state.sync = SyncService::new(state.db.clone(), calendar);
            state
        }

        fn nova<'a>(id: &'a str, estat: &'a str) -> NovaCita<'a> {
            NovaCita {
                id,
                alumne_id: Some("a1"),
                tutor_email: "tutor@insbitacola.cat",
                any_curs: "2025-2026",
                data_cita: Utc.with_ymd_and_hms(2025, 11, 3, 15, 0, 0).unwrap(),
                durada_minuts: 30,
                nom_familia: "Família Puig",
                email_familia: "familia@example.com",
                telefon_familia: "600000000",
                estat,
                notes: None,
            }
        }

        #[tokio::test]
        async fn busy_google_calendar_rejects_the_booking() {
            let server = MockServer::start().await;
            let state = state_with_calendar(
                &server,
                serde_json::json!([{
                    "id": "altre",
                    "start": {"dateTime": "2025-11-03T16:00:00+01:00"},
                    "end": {"dateTime": "2025-11-03T17:00:00+01:00"}
                }]),
            )
            .await;

            for estat in [EstatCita::Pendent, EstatCita::PendentAprovacio] {
                let err = book(&state, &nova("cita_1_x", estat.as_str()), "Error creant cita")
                    .await
                    .unwrap_err();
                assert_eq!(err.status(), StatusCode::CONFLICT);
                assert_eq!(err.message(), CONFLICTE);
            }
        }

        #[tokio::test]
        async fn free_google_calendar_falls_through_to_stored_bookings() {
            let server = MockServer::start().await;
            let state = state_with_calendar(&server, serde_json::json!([])).await;

            let err = book(&state, &nova("cita_2_x", EstatCita::Pendent.as_str()), "Error creant cita")
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(err.message(), "Error creant cita");
        }
    }
}
