//! Group assignments (`assignacions_docent_grup`) and personal tutorships
//! (`tutories_alumne`).

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use base64::Engine;
use sqlx::PgConnection;

use entrevistes_api::db::{alumnes, cursos, tutors, usuaris};
use entrevistes_api::service::{self, AlumneRef};
use entrevistes_api::{
    AlumneTutorat, AnyCursQuery, AsignarManualRequest, Assignacio, AssignacioRequest, CsvImportRequest,
    EliminatsResponse, ImportatsResponse, MessageStatusResponse, OnlyStatusResponse, TutorResum, Tutoria,
    TutoriesImportResponse,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::storage::{Db, execute_on};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/assignacions",
            get(list_assignacions).post(create_assignacio).delete(delete_assignacio),
        )
        .route("/import", post(import_assignacions))
        .route("/tutories", get(list_tutories).delete(delete_tutories))
        .route("/tutories/import", post(import_tutories))
        .route("/asignar-manual", post(asignar_manual))
        .route("/lista", get(lista))
        .route("/alumnes/{tutor_email}", get(alumnes_del_tutor))
        .route("/mis-alumnes", get(mis_alumnes))
}

fn incomplete() -> ApiErr {
    ApiErr::bad_request("Dades requerides incompletes")
}

fn decode_csv(csv_base64: &str) -> Result<String, ApiErr> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(csv_base64.trim())
        .map_err(|_| incomplete())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Optional year of an import body; blank means none.
fn request_year(any_curs: Option<&str>) -> Result<Option<String>, ApiErr> {
    match any_curs.map(str::trim).filter(|a| !a.is_empty()) {
        Some(any) => Ok(Some(service::validate_any_curs(any)?)),
        None => Ok(None),
    }
}

async fn year_or_current(db: &Db, any_curs: Option<String>) -> String {
    match any_curs.filter(|a| !a.trim().is_empty()) {
        Some(any) => any,
        None => db.current_year().await,
    }
}

/// Ensure year, teacher and group exist, then assign the teacher to the group.
async fn assign(conn: &mut PgConnection, email: &str, any_curs: &str, grup: &str) -> Result<(), sqlx::Error> {
    let grup_id = service::grup_id(grup, any_curs);
    execute_on(conn, cursos::insert_curs(any_curs)).await?;
    execute_on(conn, usuaris::ensure_docent(email)).await?;
    execute_on(conn, cursos::upsert_grup(&grup_id, any_curs, &service::curs_of_grup(grup), grup)).await?;
    execute_on(conn, tutors::insert_assignacio(email, &grup_id, any_curs)).await?;
    Ok(())
}

/// Students of `any_curs` matching a CSV reference or a typed name.
async fn resolve_alumne(conn: &mut PgConnection, any_curs: &str, alumne: &AlumneRef) -> Result<Vec<String>, sqlx::Error> {
    let (clau, nom) = match alumne {
        AlumneRef::Clau(clau) => (clau.as_str(), clau.as_str()),
        AlumneRef::Nom(nom) => ("", nom.as_str()),
    };
    sqlx::query_scalar(alumnes::RESOLVE_IN_YEAR)
        .bind(any_curs)
        .bind(clau)
        .bind(nom)
        .fetch_all(conn)
        .await
}

// ---------------------------------------------------------------------------
// Group assignments
// ---------------------------------------------------------------------------

/// GET /tutors/assignacions (admin)
pub async fn list_assignacions(State(db): State<Db>, user: AuthUser) -> Result<Json<Vec<Assignacio>>, ApiErr> {
    user.require_admin()?;
    let rows = sqlx::query_as::<_, Assignacio>(tutors::LIST_ASSIGNACIONS)
        .fetch_all(db.pool())
        .await
        .map_err(ApiErr::from_db("listing assignacions"))?;
    Ok(Json(rows))
}

fn validate_assignacio(req: AssignacioRequest) -> Result<AssignacioRequest, ApiErr> {
    let email = service::validate_email(&req.email).map_err(|_| incomplete())?;
    let any_curs = service::validate_any_curs(&req.any_curs)?;
    let grup = service::require_field("grup", &req.grup).map_err(|_| incomplete())?.to_string();
    Ok(AssignacioRequest { email, any_curs, grup })
}

/// POST /tutors/assignacions: assign a teacher to a group (admin).
pub async fn create_assignacio(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<AssignacioRequest>,
) -> Result<(StatusCode, Json<AssignacioRequest>), ApiErr> {
    user.require_admin()?;
    let req = validate_assignacio(req)?;

    let mut tx = db.begin().await.map_err(ApiErr::from_db("begin"))?;
    assign(&mut tx, &req.email, &req.any_curs, &req.grup)
        .await
        .map_err(ApiErr::from_db("creating assignacio"))?;
    tx.commit().await.map_err(ApiErr::from_db("commit assignacio"))?;

    tracing::info!(email = %req.email, grup = %req.grup, any_curs = %req.any_curs, "teacher assigned");
    Ok((StatusCode::CREATED, Json(req)))
}

/// DELETE /tutors/assignacions (admin)
pub async fn delete_assignacio(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<AssignacioRequest>,
) -> Result<Json<OnlyStatusResponse>, ApiErr> {
    user.require_admin()?;
    let req = validate_assignacio(req)?;
    db.execute(tutors::delete_assignacio(&req.email, &service::grup_id(&req.grup, &req.any_curs)))
        .await
        .map_err(ApiErr::from_db("deleting assignacio"))?;
    Ok(Json(OnlyStatusResponse {
        status: "deleted".into(),
    }))
}

/// POST /tutors/import: group assignments from a base64 CSV with
/// `curs,grup,tutor_mail` headers (admin).
pub async fn import_assignacions(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<CsvImportRequest>,
) -> Result<Json<ImportatsResponse>, ApiErr> {
    user.require_admin()?;
    let rows = service::parse_assignacions_csv(&decode_csv(&req.csv_base64)?)?;

    let mut tx = db.begin().await.map_err(ApiErr::from_db("begin"))?;
    for row in &rows {
        assign(&mut tx, &row.email, &row.any_curs, &row.grup)
            .await
            .map_err(ApiErr::from_db("importing assignacio"))?;
    }
    tx.commit().await.map_err(ApiErr::from_db("commit assignacions"))?;

    tracing::info!(importats = rows.len(), "assignacions imported");
    Ok(Json(ImportatsResponse { importats: rows.len() }))
}

// ---------------------------------------------------------------------------
// Personal tutorships
// ---------------------------------------------------------------------------

/// GET /tutors/tutories?anyCurs (admin)
pub async fn list_tutories(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<Tutoria>>, ApiErr> {
    user.require_admin()?;
    let any_curs = year_or_current(&db, q.any_curs).await;
    let rows = sqlx::query_as::<_, Tutoria>(tutors::LIST_TUTORIES)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(ApiErr::from_db("listing tutories"))?;
    Ok(Json(rows))
}

/// POST /tutors/tutories/import: personal tutorships from a base64 CSV
/// (admin). `anyCurs` in the body fills blank year cells. Rows whose student
/// doesn't resolve to exactly one enrolment are counted as ambiguous.
pub async fn import_tutories(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<CsvImportRequest>,
) -> Result<Json<TutoriesImportResponse>, ApiErr> {
    user.require_admin()?;
    let default_any = request_year(req.any_curs.as_deref())?;
    let parsed = service::parse_tutories_csv(&decode_csv(&req.csv_base64)?, default_any.as_deref())?;
    let mut out = TutoriesImportResponse {
        errors: parsed.errors,
        status: "ok".into(),
        ..Default::default()
    };

    let mut tx = db.begin().await.map_err(ApiErr::from_db("begin"))?;
    for row in &parsed.rows {
        let matches = resolve_alumne(&mut tx, &row.any_curs, &row.alumne)
            .await
            .map_err(ApiErr::from_db("resolving alumne"))?;
        let [alumne_id] = matches.as_slice() else {
            tracing::debug!(alumne = ?row.alumne, found = matches.len(), "tutoria row not resolved");
            out.ambigus += 1;
            continue;
        };
        execute_on(&mut tx, cursos::insert_curs(&row.any_curs))
            .await
            .map_err(ApiErr::from_db("insert curs"))?;
        execute_on(&mut tx, usuaris::ensure_docent(&row.tutor_email))
            .await
            .map_err(ApiErr::from_db("ensure docent"))?;
        execute_on(&mut tx, tutors::upsert_tutoria(alumne_id, &row.tutor_email, &row.any_curs))
            .await
            .map_err(ApiErr::from_db("upsert tutoria"))?;
        out.importats += 1;
    }
    tx.commit().await.map_err(ApiErr::from_db("commit tutories"))?;

    tracing::info!(importats = out.importats, ambigus = out.ambigus, errors = out.errors, "tutories imported");
    Ok(Json(out))
}

/// DELETE /tutors/tutories?anyCurs: drop every tutorship of a year (admin).
pub async fn delete_tutories(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<EliminatsResponse>, ApiErr> {
    user.require_admin()?;
    let any_curs = year_or_current(&db, q.any_curs).await;
    let eliminats = db.execute(tutors::delete_tutories(&any_curs)).await.map_err(|e| {
        tracing::error!("deleting tutories: {e}");
        ApiErr::internal("Error eliminant les tutories")
    })?;
    tracing::warn!(%any_curs, eliminats, by = %user.email, "tutories deleted");
    Ok(Json(EliminatsResponse { eliminats }))
}

/// POST /tutors/asignar-manual: assign a tutor by exact student name (admin).
pub async fn asignar_manual(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<AsignarManualRequest>,
) -> Result<Json<MessageStatusResponse>, ApiErr> {
    user.require_admin()?;
    let tutor_email = req.tutor_email.trim().to_lowercase();
    let nom = req.alumne_nom.trim();
    let any_curs = req.any_curs.trim();
    if tutor_email.is_empty() || nom.is_empty() || any_curs.is_empty() {
        return Err(ApiErr::bad_request("Falten dades requerides"));
    }

    let fail = |e: sqlx::Error| {
        tracing::error!("manual tutoria: {e}");
        ApiErr::internal("Error assignant tutoria")
    };
    let mut conn = db.pool().acquire().await.map_err(fail)?;
    let matches = resolve_alumne(&mut conn, any_curs, &AlumneRef::Nom(nom.to_string()))
        .await
        .map_err(fail)?;
    let [alumne_id] = matches.as_slice() else {
        return Err(ApiErr::not_found(format!("No s'ha trobat l'alumne: {nom}")));
    };
    execute_on(&mut conn, usuaris::ensure_docent(&tutor_email)).await.map_err(fail)?;
    execute_on(&mut conn, tutors::upsert_tutoria(alumne_id, &tutor_email, any_curs))
        .await
        .map_err(fail)?;

    Ok(Json(MessageStatusResponse {
        status: "ok".into(),
        message: format!("Tutoria assignada: {nom} -> {tutor_email}"),
    }))
}

/// GET /tutors/lista?anyCurs: tutors with their tutee counts (admin).
pub async fn lista(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<TutorResum>>, ApiErr> {
    user.require_admin()?;
    let any_curs = year_or_current(&db, q.any_curs).await;
    let rows = sqlx::query_as::<_, TutorResum>(tutors::RESUM_TUTORS)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("listing tutors: {e}");
            ApiErr::internal("Error obtenint llista de tutors")
        })?;
    Ok(Json(rows))
}

async fn tutees(db: &Db, tutor_email: &str, any_curs: &str) -> Result<Vec<AlumneTutorat>, ApiErr> {
    sqlx::query_as::<_, AlumneTutorat>(tutors::ALUMNES_DEL_TUTOR)
        .bind(tutor_email)
        .bind(any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("tutees of {tutor_email}: {e}");
            ApiErr::internal("Error obtenint alumnes del tutor")
        })
}

/// GET /tutors/alumnes/{tutor_email}?anyCurs (admin)
pub async fn alumnes_del_tutor(
    State(db): State<Db>,
    user: AuthUser,
    Path(tutor_email): Path<String>,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<AlumneTutorat>>, ApiErr> {
    user.require_admin()?;
    let any_curs = year_or_current(&db, q.any_curs).await;
    Ok(Json(tutees(&db, &tutor_email.to_lowercase(), &any_curs).await?))
}

/// GET /tutors/mis-alumnes?anyCurs: the caller's own tutees.
pub async fn mis_alumnes(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<AnyCursQuery>,
) -> Result<Json<Vec<AlumneTutorat>>, ApiErr> {
    let any_curs = year_or_current(&db, q.any_curs).await;
    Ok(Json(tutees(&db, &user.email, &any_curs).await?))
}
