use std::collections::{HashMap, HashSet};

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;

use entrevistes_api::db::{alumnes, cursos, entrevistes};
use entrevistes_api::service::{self, EsoAlumne};
use entrevistes_api::{
    Entrevista, Grup, ImportAlumnesResponse, ImportEntrevistesResponse, ImportPreview, SheetsImportRequest,
};

use crate::AppState;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::storage::{execute_on, fetch_optional_on};

const PREVIEW_LIMIT: usize = 200;
const IMPORT_AUTHOR: &str = "import@system";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alumnes", post(import_alumnes))
        .route("/alumnes/preview", post(preview_alumnes))
        .route("/entrevistes-tabs", post(import_entrevistes_tabs))
}

/// `(spreadsheet_id, any_curs)` of a well-formed body.
fn validate(req: &SheetsImportRequest) -> Result<(String, String), ApiErr> {
    let spreadsheet_id = req.spreadsheet_id.trim();
    let any_curs = service::validate_any_curs(&req.any_curs);
    match any_curs {
        Ok(any) if spreadsheet_id.chars().count() >= 10 => Ok((spreadsheet_id.to_string(), any)),
        _ => Err(ApiErr::bad_request("Dades requerides incompletes")),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct Coincidencia {
    nom: String,
    grup_id: Option<String>,
    enrolled: bool,
}

fn label(a: &EsoAlumne) -> String {
    match &a.grup {
        Some(g) => format!("{} ({g})", a.nom),
        None => a.nom.clone(),
    }
}

fn push_capped(list: &mut Vec<String>, item: String) {
    if list.len() < PREVIEW_LIMIT {
        list.push(item);
    }
}

/// What an import of `items` would change, given the students already known
/// by lower-cased name and the group ids of the year.
fn plan(
    items: &[(&str, EsoAlumne)],
    any_curs: &str,
    known: &HashMap<String, Coincidencia>,
    grups: &HashSet<String>,
) -> ImportPreview {
    let mut preview = ImportPreview::default();
    let mut new_groups = HashSet::new();
    for (_, a) in items {
        let desired = a.grup.as_deref().map(|g| service::grup_id(g, any_curs));
        match known.get(&a.nom.to_lowercase()) {
            None => {
                preview.to_create_alumnes += 1;
                preview.to_create_enrolments += 1;
                push_capped(&mut preview.alumnes, a.nom.clone());
                push_capped(&mut preview.enrolments, label(a));
            }
            Some(m) if !m.enrolled => {
                preview.to_create_enrolments += 1;
                push_capped(&mut preview.enrolments, label(a));
            }
            Some(m) if m.grup_id != desired => {
                preview.to_update_enrolments += 1;
                push_capped(&mut preview.updates, label(a));
            }
            Some(_) => {}
        }
        if let (Some(gid), Some(g)) = (desired, &a.grup) {
            if !grups.contains(&gid) && new_groups.insert(gid) {
                preview.to_create_groups += 1;
                push_capped(&mut preview.groups, g.clone());
            }
        }
    }
    preview
}

/// POST /import/alumnes/preview: what `POST /import/alumnes` would change.
pub async fn preview_alumnes(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<SheetsImportRequest>,
) -> Result<Json<ImportPreview>, ApiErr> {
    user.require_admin()?;
    let (spreadsheet_id, any_curs) = validate(&req)?;
    const FAIL: &str = "Error previsualitzant alumnes";

    let items = state.sheets_repo(&spreadsheet_id).eso_alumnes().await.map_err(|e| {
        tracing::error!("reading ESO tabs of {spreadsheet_id}: {e}");
        ApiErr::internal(FAIL)
    })?;
    let noms: Vec<String> = items.iter().map(|(_, a)| a.nom.to_lowercase()).collect();
    let fail = |e: sqlx::Error| {
        tracing::error!("import preview for {any_curs}: {e}");
        ApiErr::internal(FAIL)
    };
    let known: HashMap<String, Coincidencia> = sqlx::query_as::<_, Coincidencia>(alumnes::MATCH_BY_NOMS)
        .bind(&noms)
        .bind(&any_curs)
        .fetch_all(state.db.pool())
        .await
        .map_err(fail)?
        .into_iter()
        .map(|c| (c.nom.clone(), c))
        .collect();
    let grups: HashSet<String> = state
        .db
        .fetch_all::<Grup>(cursos::grups_of(&any_curs))
        .await
        .map_err(fail)?
        .into_iter()
        .map(|g| g.grup_id)
        .collect();

    Ok(Json(plan(&items, &any_curs, &known, &grups)))
}

/// POST /import/alumnes: create students, groups and enrolments from the
/// `<n> ESO` tabs of a spreadsheet.
pub async fn import_alumnes(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<SheetsImportRequest>,
) -> Result<Json<ImportAlumnesResponse>, ApiErr> {
    user.require_admin()?;
    let (spreadsheet_id, any_curs) = validate(&req)?;
    const FAIL: &str = "Error important alumnes";

    let items = state.sheets_repo(&spreadsheet_id).eso_alumnes().await.map_err(|e| {
        tracing::error!("reading ESO tabs of {spreadsheet_id}: {e}");
        ApiErr::internal(FAIL)
    })?;
    let fail = |e: sqlx::Error| {
        tracing::error!("importing alumnes into {any_curs}: {e}");
        ApiErr::internal(FAIL)
    };

    let mut resp = ImportAlumnesResponse::default();
    let mut grups = HashSet::new();
    let mut tx = state.db.begin().await.map_err(fail)?;
    execute_on(&mut tx, cursos::insert_curs(&any_curs)).await.map_err(fail)?;
    for (nivell, a) in &items {
        let grup_id = match &a.grup {
            Some(g) => {
                let id = service::grup_id(g, &any_curs);
                if grups.insert(id.clone()) {
                    execute_on(&mut tx, cursos::upsert_grup(&id, &any_curs, nivell, g))
                        .await
                        .map_err(fail)?;
                }
                Some(id)
            }
            None => None,
        };
        let alumne_id = match fetch_optional_on::<(String,)>(&mut tx, alumnes::ids_by_nom(&a.nom))
            .await
            .map_err(fail)?
        {
            Some((id,)) => id,
            None => {
                let id = service::new_alumne_id();
                execute_on(&mut tx, alumnes::insert(&id, &a.nom, None, None))
                    .await
                    .map_err(fail)?;
                resp.alumnes += 1;
                id
            }
        };
        execute_on(
            &mut tx,
            alumnes::upsert_enrolment(&alumne_id, &any_curs, grup_id.as_deref(), "alta"),
        )
        .await
        .map_err(fail)?;
        resp.matricules += 1;
    }
    tx.commit().await.map_err(fail)?;
    resp.grups = grups.len();

    tracing::info!(
        any = %any_curs,
        alumnes = resp.alumnes,
        matricules = resp.matricules,
        grups = resp.grups,
        "alumnes imported from sheets"
    );
    Ok(Json(resp))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// POST /import/entrevistes-tabs: store the interviews of every tab, with
/// acords prefixed by the tab name.
pub async fn import_entrevistes_tabs(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<SheetsImportRequest>,
) -> Result<Json<ImportEntrevistesResponse>, ApiErr> {
    user.require_admin()?;
    let (spreadsheet_id, any_curs) = validate(&req)?;
    let tabs = state.sheets_repo(&spreadsheet_id).entrevistes_by_tabs().await;
    let fail = |e: sqlx::Error| {
        tracing::error!("importing interview tabs into {any_curs}: {e}");
        ApiErr::internal("Error importando entrevistas")
    };
    let avui = Utc::now()
        .with_timezone(&state.config.calendar_timezone)
        .format("%Y-%m-%d")
        .to_string();

    let mut resp = ImportEntrevistesResponse {
        tabs_processed: tabs.len(),
        status: "ok".into(),
        ..Default::default()
    };
    let mut tx = state.db.begin().await.map_err(fail)?;
    execute_on(&mut tx, cursos::insert_curs(&any_curs)).await.map_err(fail)?;
    for tab in &tabs {
        for e in &tab.entrevistes {
            if e.alumne_id.trim().is_empty() {
                resp.ignorades += 1;
                continue;
            }
            let acords = match non_blank(&e.acords) {
                Some(a) => format!("[{}] {a}", tab.tab_name),
                None => format!("[{}]", tab.tab_name),
            };
            let entrevista = Entrevista {
                id: non_blank(&e.id).map_or_else(service::new_entrevista_id, str::to_string),
                alumne_id: e.alumne_id.trim().to_string(),
                any_curs: any_curs.clone(),
                data: non_blank(&e.data).unwrap_or(&avui).to_string(),
                acords,
                usuari_creador_id: non_blank(&e.usuari_creador_id).unwrap_or(IMPORT_AUTHOR).to_string(),
                cita_id: None,
            };
            execute_on(&mut tx, entrevistes::upsert_imported(&entrevista))
                .await
                .map_err(fail)?;
            resp.importats += 1;
        }
    }
    tx.commit().await.map_err(fail)?;

    tracing::info!(any = %any_curs, importats = resp.importats, ignorades = resp.ignorades, "interview tabs imported");
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{error_of, json, send};
    use axum::http::StatusCode;

    fn alumne(nom: &str, grup: Option<&str>) -> (&'static str, EsoAlumne) {
        (
            "1r",
            EsoAlumne {
                nom: nom.into(),
                grup: grup.map(Into::into),
            },
        )
    }

    fn known(nom: &str, grup_id: Option<&str>, enrolled: bool) -> (String, Coincidencia) {
        (
            nom.to_lowercase(),
            Coincidencia {
                nom: nom.to_lowercase(),
                grup_id: grup_id.map(Into::into),
                enrolled,
            },
        )
    }

    #[test]
    fn plan_counts_each_kind_of_change() {
        let items = vec![
            alumne("Puig, Anna", Some("1A")),
            alumne("Vila, Pere", Some("1B")),
            alumne("Serra, Laia", Some("1A")),
            alumne("Roca, Pau", Some("1C")),
        ];
        let known = HashMap::from([
            known("Vila, Pere", None, false),
            known("Serra, Laia", Some("1B_2025-2026"), true),
            known("Roca, Pau", Some("1C_2025-2026"), true),
        ]);
        let grups = HashSet::from(["1C_2025-2026".to_string()]);

        let p = plan(&items, "2025-2026", &known, &grups);
        assert_eq!(p.to_create_alumnes, 1);
        assert_eq!(p.to_create_enrolments, 2);
        assert_eq!(p.to_update_enrolments, 1);
        assert_eq!(p.to_create_groups, 2);
        assert_eq!(p.alumnes, vec!["Puig, Anna"]);
        assert_eq!(p.updates, vec!["Serra, Laia (1A)"]);
        assert_eq!(p.groups, vec!["1A", "1B"]);
    }

    #[test]
    fn preview_lists_are_capped() {
        let items: Vec<_> = (0..250).map(|i| alumne(&format!("Alumne {i}"), None)).collect();
        let p = plan(&items, "2025-2026", &HashMap::new(), &HashSet::new());
        assert_eq!(p.to_create_alumnes, 250);
        assert_eq!(p.alumnes.len(), PREVIEW_LIMIT);
    }

    #[test]
    fn short_spreadsheet_ids_are_rejected() {
        let req = SheetsImportRequest {
            spreadsheet_id: "abc".into(),
            any_curs: "2025-2026".into(),
        };
        assert_eq!(validate(&req).unwrap_err().message(), "Dades requerides incompletes");
        let ok = SheetsImportRequest {
            spreadsheet_id: " 1AbCdEfGhIjK ".into(),
            any_curs: "2025-2026".into(),
        };
        assert_eq!(
            validate(&ok).unwrap(),
            (String::from("1AbCdEfGhIjK"), String::from("2025-2026"))
        );
    }

    #[tokio::test]
    async fn import_is_admin_only() {
        let req = json(
            "POST",
            "/import/alumnes",
            Some("docent@insbitacola.cat"),
            serde_json::json!({"spreadsheetId": "1AbCdEfGhIjK", "anyCurs": "2025-2026"}),
        );
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "Permís denegat");
    }
}
