use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use entrevistes_api::db::consolidacio::{self, NIVELLS, SPREADSHEET_KEYS};
use entrevistes_api::db::{alumnes, config, entrevistes};
use entrevistes_api::service::{self, DEFAULT_ANY_CURS};
use entrevistes_api::{
    ConsolidacioLog, ConsolidacioResponse, ConsolidarRequest, CursConsolidacio, EntrevistaConsolidada,
    InitConfigRequest, LimitQuery, MessageStatusResponse,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::sheets_repo::NivellConsolidat;
use crate::storage::{Db, execute_on, fetch_optional_on};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cursos", get(cursos))
        .route("/init-config", post(init_config))
        .route("/consolidar", post(consolidar))
        .route("/logs", get(logs))
        .route("/entrevistas", get(entrevistas))
}

/// Level labels (`1r ESO`..) with the spreadsheet configured for each.
fn cursos_from(rows: Vec<(String, serde_json::Value)>) -> Vec<CursConsolidacio> {
    let stored: HashMap<String, serde_json::Value> = rows.into_iter().collect();
    NIVELLS
        .iter()
        .zip(SPREADSHEET_KEYS)
        .map(|(nivell, key)| CursConsolidacio {
            curs: format!("{nivell} ESO"),
            spreadsheet_id: stored.get(key).and_then(config::string_value),
        })
        .collect()
}

async fn configured_cursos(db: &Db) -> Result<Vec<CursConsolidacio>, sqlx::Error> {
    let rows = db
        .fetch_all::<(String, serde_json::Value)>(config::get_many(&SPREADSHEET_KEYS))
        .await?;
    Ok(cursos_from(rows))
}

/// GET /consolidacion/cursos: ESO levels and their spreadsheets.
pub async fn cursos(State(db): State<Db>, user: AuthUser) -> Result<Json<Vec<CursConsolidacio>>, ApiErr> {
    user.require_admin()?;
    let cursos = configured_cursos(&db)
        .await
        .map_err(ApiErr::from_db("reading level spreadsheets"))?;
    Ok(Json(cursos))
}

/// POST /consolidacion/init-config: seed `anyActual` and the level
/// spreadsheet keys, overwriting only the values given.
pub async fn init_config(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<InitConfigRequest>,
) -> Result<Json<MessageStatusResponse>, ApiErr> {
    user.require_admin()?;
    let mut details: Vec<String> = req
        .spreadsheets
        .keys()
        .filter(|k| !SPREADSHEET_KEYS.contains(&k.as_str()))
        .map(|k| format!("spreadsheets.{k}: clau desconeguda"))
        .collect();
    let any_actual = match req.any_actual.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(any) => match service::validate_any_curs(any) {
            Ok(any) => Some(any),
            Err(e) => {
                details.push(format!("anyActual: {}", e.message()));
                None
            }
        },
        None => None,
    };
    if !details.is_empty() {
        details.sort();
        return Err(ApiErr::invalid(details));
    }

    let fail = |e: sqlx::Error| {
        tracing::error!("initialising config: {e}");
        ApiErr::internal("Error inicialitzant la configuració")
    };
    let existed = db
        .fetch_optional::<(serde_json::Value,)>(config::get(config::ANY_ACTUAL_KEY))
        .await
        .map_err(fail)?
        .is_some();

    let mut tx = db.begin().await.map_err(fail)?;
    let any_stmt = match &any_actual {
        Some(any) => config::upsert(config::ANY_ACTUAL_KEY, json!(any)),
        None => config::insert_missing(config::ANY_ACTUAL_KEY, json!(DEFAULT_ANY_CURS)),
    };
    execute_on(&mut tx, any_stmt).await.map_err(fail)?;
    for key in SPREADSHEET_KEYS {
        let stmt = match req.spreadsheets.get(key) {
            Some(id) => config::upsert(key, json!(id.trim())),
            None => config::insert_missing(key, json!("")),
        };
        execute_on(&mut tx, stmt).await.map_err(fail)?;
    }
    tx.commit().await.map_err(fail)?;

    tracing::info!(by = %user.email, existed, "consolidation config initialised");
    let (status, message) = if existed {
        ("exists", "Configuració actualitzada")
    } else {
        ("created", "Configuració inicialitzada correctament")
    };
    Ok(Json(MessageStatusResponse {
        status: status.into(),
        message: message.into(),
    }))
}

/// POST /consolidacion/consolidar: rebuild a year's consolidated history
/// from every configured level spreadsheet.
pub async fn consolidar(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<ConsolidarRequest>,
) -> Result<Json<ConsolidacioResponse>, ApiErr> {
    user.require_admin()?;
    let any_curs = match req.any_curs.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        Some(any) => service::validate_any_curs(any)?,
        None => state.db.current_year().await,
    };
    let fail = |e: sqlx::Error| {
        tracing::error!("consolidating {any_curs}: {e}");
        ApiErr::internal("Error en la consolidació")
    };

    let cursos = configured_cursos(&state.db).await.map_err(fail)?;
    let configured: Vec<(String, String)> = cursos
        .into_iter()
        .filter_map(|c| Some((c.curs, c.spreadsheet_id?)))
        .collect();
    if configured.is_empty() {
        return Err(ApiErr::bad_request("No hi ha cap spreadsheet de nivell configurat"));
    }

    let mut errors = Vec::new();
    let mut nivells: Vec<(String, String, NivellConsolidat)> = Vec::new();
    for (curs, spreadsheet_id) in configured {
        match state.sheets_repo(&spreadsheet_id).consolidar().await {
            Ok(nivell) => nivells.push((curs, spreadsheet_id, nivell)),
            Err(e) => {
                tracing::warn!("consolidating {curs} ({spreadsheet_id}): {e}");
                errors.push(format!("{curs}: {e}"));
            }
        }
    }

    let avui = chrono::Local::now().date_naive().to_string();
    let mut alumnes_processats = 0usize;
    let mut entrevistes_consolidades = 0usize;
    let mut tx = state.db.begin().await.map_err(fail)?;
    execute_on(&mut tx, consolidacio::delete_year(&any_curs))
        .await
        .map_err(fail)?;
    for (curs, spreadsheet_id, nivell) in &nivells {
        for alumne in &nivell.alumnes {
            let alumne_id = fetch_optional_on::<(String,)>(&mut tx, alumnes::ids_by_nom(&alumne.nom))
                .await
                .map_err(fail)?
                .map(|(id,)| id);
            for (pestanya, acords) in &alumne.historial {
                execute_on(
                    &mut tx,
                    consolidacio::insert(
                        alumne_id.as_deref(),
                        &alumne.nom,
                        curs,
                        pestanya,
                        &avui,
                        acords,
                        &any_curs,
                        spreadsheet_id,
                    ),
                )
                .await
                .map_err(fail)?;
                entrevistes_consolidades += 1;
            }
            alumnes_processats += 1;
        }
    }
    let detalls = json!({
        "nivells": nivells
            .iter()
            .map(|(curs, spreadsheet_id, n)| json!({
                "curs": curs,
                "spreadsheetId": spreadsheet_id,
                "pestanyes": n.pestanyes,
                "alumnes": n.alumnes.len(),
            }))
            .collect::<Vec<_>>(),
        "errors": errors,
        "iniciatPer": user.email,
    });
    execute_on(
        &mut tx,
        consolidacio::insert_log(
            &any_curs,
            alumnes_processats as i32,
            entrevistes_consolidades as i32,
            errors.len() as i32,
            detalls,
        ),
    )
    .await
    .map_err(fail)?;
    tx.commit().await.map_err(fail)?;

    tracing::info!(
        %any_curs,
        alumnes = alumnes_processats,
        entrevistes = entrevistes_consolidades,
        errors = errors.len(),
        "consolidation finished"
    );
    Ok(Json(ConsolidacioResponse {
        any_curs,
        alumnes_processats,
        entrevistes_consolidades,
        errors,
    }))
}

/// GET /consolidacion/logs?limit: latest consolidation runs.
pub async fn logs(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<ConsolidacioLog>>, ApiErr> {
    user.require_admin()?;
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT) as u64;
    let logs = db
        .fetch_all::<ConsolidacioLog>(consolidacio::list_logs(limit))
        .await
        .map_err(ApiErr::from_db("listing consolidation logs"))?;
    Ok(Json(logs))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidadesQuery {
    pub alumne_id: Option<String>,
    pub any_curs: Option<String>,
}

/// GET /consolidacion/entrevistas?alumneId&anyCurs: consolidated history.
pub async fn entrevistas(
    State(db): State<Db>,
    user: AuthUser,
    Query(q): Query<ConsolidadesQuery>,
) -> Result<Json<Vec<EntrevistaConsolidada>>, ApiErr> {
    user.require_admin()?;
    let rows = sqlx::query_as::<_, EntrevistaConsolidada>(entrevistes::LIST_CONSOLIDADES)
        .bind(q.alumne_id.filter(|a| !a.is_empty()))
        .bind(q.any_curs.filter(|a| !a.is_empty()))
        .fetch_all(db.pool())
        .await
        .map_err(ApiErr::from_db("listing consolidated interviews"))?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{error_of, get, json, send};
    use axum::http::StatusCode;

    const DOCENT: &str = "docent@insbitacola.cat";

    #[test]
    fn cursos_pair_levels_with_stored_ids() {
        let cursos = cursos_from(vec![
            ("2nSpreadsheetId".into(), json!("sheet-2n")),
            ("1rSpreadsheetId".into(), json!("")),
            ("4tSpreadsheetId".into(), json!({"value": "sheet-4t"})),
        ]);
        let got: Vec<_> = cursos
            .iter()
            .map(|c| (c.curs.as_str(), c.spreadsheet_id.as_deref()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("1r ESO", None),
                ("2n ESO", Some("sheet-2n")),
                ("3r ESO", None),
                ("4t ESO", Some("sheet-4t")),
            ]
        );
    }

    #[tokio::test]
    async fn consolidation_is_admin_only() {
        let req = json("POST", "/consolidacion/consolidar", Some(DOCENT), serde_json::json!({}));
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat");
    }

    #[tokio::test]
    async fn logs_need_a_token() {
        let resp = send(AppState::for_tests(true), get("/consolidacion/logs", None)).await;
        let (status, msg) = error_of(resp).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat - No hay token");
    }
}
