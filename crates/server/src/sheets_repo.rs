//! A spreadsheet used as a row store: header row first, records below,
//! lookups by linear scan.

use std::collections::HashMap;

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use entrevistes_api::db::consolidacio::NIVELLS;
use entrevistes_api::service::{self, EsoAlumne, header_index};
use entrevistes_api::{AlumneCurs, AlumneFull, EntrevistaSheet, EntrevistaTab, UpdateAlumneRequest};

use crate::google::GoogleError;
use crate::google::sheets::SheetsClient;

const ALUMNES_RANGE: &str = "A1:H10000";
const WIDE_RANGE: &str = "A1:Z10000";

/// Interviews read from one tab.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabEntrevistes {
    pub tab_name: String,
    pub entrevistes: Vec<EntrevistaTab>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn cell(row: &[String], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i)).cloned()
}

/// Best-effort date of a sheet cell, for ordering only.
pub fn sheet_date(value: Option<&str>) -> NaiveDate {
    let fallback = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default();
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return fallback;
    };
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .unwrap_or(fallback)
}

/// Row (0-based) of a level tab holding the student: name in column C and
/// group in column B.
pub fn find_student_row(values: &[Vec<String>], nom: &str, grup: &str) -> Option<usize> {
    values.iter().position(|row| {
        let grup_cell = row.get(1).map(|s| s.trim()).unwrap_or_default();
        let nom_cell = row.get(2).map(|s| s.trim()).unwrap_or_default();
        !nom_cell.is_empty() && grup_cell == grup.trim() && service::same_name(nom_cell, nom)
    })
}

/// Column index of the first interview pair holding any value.
pub fn first_filled_pair(row: &[String]) -> Option<usize> {
    (service::INTERVIEW_PAIRS_START..row.len())
        .step_by(2)
        .find(|&i| {
            let filled = |c: usize| row.get(c).is_some_and(|v| !v.trim().is_empty());
            filled(i) || filled(i + 1)
        })
}

/// Change to the (date, acords) pairs of a student row.
#[derive(Debug, Clone, Copy)]
pub enum PairEdit<'a> {
    /// Write into the first free pair.
    Append { data: &'a str, acords: &'a str },
    /// Rewrite the first filled pair, or the first free one if none.
    Overwrite { data: &'a str, acords: &'a str },
    /// Blank the first filled pair.
    Clear,
}

/// First data row of a level tab; rows above are headers.
const MASTER_FIRST_ROW: usize = 3;

/// A student of the master list with the interview text of each tab.
#[derive(Debug, Clone, PartialEq)]
pub struct AlumneConsolidat {
    pub nom: String,
    pub grup: String,
    pub tutor: String,
    pub info: String,
    /// `(tab, interviews)` in level order.
    pub historial: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct NivellConsolidat {
    pub pestanyes: Vec<String>,
    pub alumnes: Vec<AlumneConsolidat>,
}

/// Merge level tabs ordered lowest first. The last tab is the master list
/// (group in column C, name in D, tutor in E, notes in F); every tab adds
/// the interview pairs of the master students it mentions.
pub fn consolidate_tabs(tabs: &[(String, Vec<Vec<String>>)]) -> Vec<AlumneConsolidat> {
    let Some((_, master)) = tabs.last() else {
        return Vec::new();
    };
    let text = |row: &[String], i: usize| row.get(i).map(|v| v.trim().to_string()).unwrap_or_default();
    let key = |row: &[String]| service::normalize_name(row.get(3).map(String::as_str).unwrap_or_default()).to_lowercase();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut alumnes = Vec::new();
    for row in master.iter().skip(MASTER_FIRST_ROW) {
        let k = key(row);
        if k.is_empty() || index.contains_key(&k) {
            continue;
        }
        index.insert(k, alumnes.len());
        alumnes.push(AlumneConsolidat {
            nom: service::normalize_name(&text(row, 3)),
            grup: text(row, 2),
            tutor: text(row, 4),
            info: text(row, 5),
            historial: Vec::new(),
        });
    }

    for (tab, values) in tabs {
        for row in values.iter().skip(MASTER_FIRST_ROW) {
            let Some(&i) = index.get(&key(row)) else {
                continue;
            };
            let pairs = service::interview_pairs(row);
            if !pairs.is_empty() {
                alumnes[i].historial.push((tab.clone(), pairs));
            }
        }
    }
    alumnes
}

#[derive(Clone)]
pub struct SheetsRepo {
    client: SheetsClient,
    spreadsheet_id: String,
    fallback_any: String,
}

impl SheetsRepo {
    /// `fallback_any` is reported as `anyActual` when the Config tab can't be read.
    pub fn new(client: SheetsClient, spreadsheet_id: impl Into<String>, fallback_any: impl Into<String>) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            fallback_any: fallback_any.into(),
        }
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, GoogleError> {
        self.client.get_values(&self.spreadsheet_id, range).await
    }

    /// `Config!A2:B1000` as key → value, JSON-decoding values where possible.
    pub async fn get_config(&self) -> Map<String, Value> {
        let rows = match self.values("Config!A2:B1000").await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("reading Config tab: {e}");
                let mut out = Map::new();
                out.insert("anyActual".into(), Value::String(self.fallback_any.clone()));
                return out;
            }
        };
        rows.into_iter()
            .filter_map(|r| {
                let key = r.first()?.trim().to_string();
                if key.is_empty() {
                    return None;
                }
                let raw = r.get(1).cloned().unwrap_or_default();
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                Some((key, value))
            })
            .collect()
    }

    pub async fn any_actual(&self) -> String {
        self.get_config()
            .await
            .get("anyActual")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.fallback_any.clone())
    }

    async fn alumne_rows(&self, any_curs: &str) -> Vec<Vec<String>> {
        self.values(&format!("Alumnes_{any_curs}!{ALUMNES_RANGE}"))
            .await
            .inspect_err(|e| debug!("Alumnes_{any_curs} unreadable: {e}"))
            .unwrap_or_default()
    }

    fn alumne_records(values: &[Vec<String>]) -> Vec<AlumneFull> {
        service::rows_to_records(values)
            .into_iter()
            .map(|r| {
                let get = |k: &str| r.get(k).cloned().unwrap_or_default();
                AlumneFull {
                    alumne_id: get("alumneId"),
                    nom: get("nom"),
                    grup: get("grup"),
                    any_curs: get("anyCurs"),
                    personal_id: get("personalId"),
                    estat: get("estat"),
                    created_at: get("createdAt"),
                    updated_at: get("updatedAt"),
                }
            })
            .collect()
    }

    pub async fn list_alumnes(&self, any_curs: Option<&str>, estat: Option<&str>) -> Vec<AlumneCurs> {
        let any_curs = match any_curs {
            Some(a) => a.to_string(),
            None => self.any_actual().await,
        };
        let values = self.alumne_rows(&any_curs).await;
        Self::alumne_records(&values)
            .into_iter()
            .filter(|a| estat.is_none_or(|e| a.estat == e))
            .map(|a| AlumneCurs {
                id: a.alumne_id,
                nom: a.nom,
                grup: Some(a.grup),
                any_curs: any_curs.clone(),
                estat: a.estat,
            })
            .collect()
    }

    pub async fn get_alumne(&self, id: &str) -> Option<AlumneFull> {
        let any = self.any_actual().await;
        let values = self.alumne_rows(&any).await;
        Self::alumne_records(&values)
            .into_iter()
            .find(|a| a.alumne_id == id)
    }

    /// Append a student row and return the new id.
    pub async fn create_alumne(
        &self,
        nom: &str,
        grup: &str,
        any_curs: &str,
        personal_id: &str,
    ) -> Result<String, GoogleError> {
        let id = service::new_alumne_id();
        let now = now_iso();
        let row = vec![
            id.clone(),
            nom.to_string(),
            grup.to_string(),
            any_curs.to_string(),
            personal_id.to_string(),
            "alta".to_string(),
            now.clone(),
            now,
        ];
        self.client
            .append_values(&self.spreadsheet_id, &format!("Alumnes_{any_curs}!A1:H1"), vec![row])
            .await?;
        Ok(id)
    }

    /// Returns `false` when no row has the id.
    pub async fn update_alumne(&self, id: &str, updates: &UpdateAlumneRequest) -> Result<bool, GoogleError> {
        let any = self.any_actual().await;
        let sheet = format!("Alumnes_{any}");
        let values = self.values(&format!("{sheet}!{ALUMNES_RANGE}")).await?;
        let Some((header, rows)) = values.split_first() else {
            return Ok(false);
        };
        let Some(idx) = rows.iter().position(|r| r.first().is_some_and(|c| c == id)) else {
            return Ok(false);
        };
        let columns: HashMap<&str, usize> = header.iter().enumerate().map(|(i, h)| (h.as_str(), i)).collect();
        let mut row = rows[idx].clone();
        if row.len() < header.len() {
            row.resize(header.len(), String::new());
        }
        let mut set = |name: &str, value: String| {
            if let Some(&i) = columns.get(name) {
                row[i] = value;
            }
        };
        if let Some(grup) = &updates.grup {
            set("grup", grup.clone());
        }
        if let Some(estat) = updates.estat {
            set("estat", estat.as_str().to_string());
        }
        set("updatedAt", now_iso());

        let line = idx + 2;
        self.client
            .update_values(&self.spreadsheet_id, &format!("{sheet}!A{line}:H{line}"), vec![row])
            .await?;
        Ok(true)
    }

    pub async fn list_entrevistes(&self, alumne_id: Option<&str>, any_curs: Option<&str>) -> Vec<EntrevistaSheet> {
        let any = match any_curs {
            Some(a) => a.to_string(),
            None => self.any_actual().await,
        };
        let values = match self.values(&format!("Entrevistes_{any}!{WIDE_RANGE}")).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Entrevistes_{any} unreadable: {e}");
                return Vec::new();
            }
        };
        let Some((header, rows)) = values.split_first() else {
            return Vec::new();
        };
        let i_id = header_index(header, &["id", "entrevistaid"]);
        let i_alumne = header_index(header, &["alumneid", "alumne_id", "alumne"]);
        let i_any = header_index(header, &["anycurs", "any", "curs"]);
        let i_data = header_index(header, &["data", "fecha"]);
        let i_acords = header_index(header, &["acords", "acuerdos", "notes"]);
        let i_author = header_index(header, &["usuaricreadorid", "autor", "creador"]);

        rows.iter()
            .map(|row| EntrevistaSheet {
                id: cell(row, i_id),
                alumne_id: cell(row, i_alumne),
                any_curs: cell(row, i_any).unwrap_or_else(|| any.clone()),
                data: cell(row, i_data),
                acords: cell(row, i_acords),
                usuari_creador_id: cell(row, i_author),
            })
            .filter(|e| alumne_id.is_none_or(|a| e.alumne_id.as_deref() == Some(a)))
            .collect()
    }

    /// Append an interview to the current year's sheet and return its id.
    pub async fn create_entrevista(
        &self,
        alumne_id: &str,
        data: &str,
        acords: &str,
        author: &str,
    ) -> Result<String, GoogleError> {
        let any = self.any_actual().await;
        let id = service::new_alumne_id();
        let now = now_iso();
        let row = vec![
            id.clone(),
            alumne_id.to_string(),
            any.clone(),
            data.to_string(),
            acords.to_string(),
            author.to_string(),
            now.clone(),
            now,
        ];
        self.client
            .append_values(&self.spreadsheet_id, &format!("Entrevistes_{any}!A1:H1"), vec![row])
            .await?;
        Ok(id)
    }

    /// Tab titles; empty when the spreadsheet can't be read.
    pub async fn all_sheets(&self) -> Vec<String> {
        match self.client.metadata(&self.spreadsheet_id).await {
            Ok(tabs) => tabs.into_iter().map(|t| t.title).filter(|t| !t.is_empty()).collect(),
            Err(e) => {
                warn!("listing tabs of {}: {e}", self.spreadsheet_id);
                Vec::new()
            }
        }
    }

    pub async fn sheet_data(&self, tab: &str) -> Result<Vec<Vec<String>>, GoogleError> {
        self.values(&format!("{tab}!{WIDE_RANGE}")).await
    }

    /// Write one cell; `row` and `column` are 1-based.
    pub async fn update_cell(&self, tab: &str, row: usize, column: usize, value: &str) -> Result<(), GoogleError> {
        let range = format!("{tab}!{}{row}", service::column_letter(column));
        self.client
            .update_values(&self.spreadsheet_id, &range, vec![vec![value.to_string()]])
            .await
    }

    /// Apply `edit` to the student's row of `tab`. Returns `false` when the
    /// student has no row or there is nothing to clear.
    pub async fn edit_interview_pair(
        &self,
        tab: &str,
        nom: &str,
        grup: &str,
        edit: PairEdit<'_>,
    ) -> Result<bool, GoogleError> {
        let values = self.sheet_data(tab).await?;
        let Some(idx) = find_student_row(&values, nom, grup) else {
            debug!(tab, nom, grup, "student row not found");
            return Ok(false);
        };
        let row = &values[idx];
        let (col, data, acords) = match edit {
            PairEdit::Append { data, acords } => (service::first_free_pair(row), data, acords),
            PairEdit::Overwrite { data, acords } => (
                first_filled_pair(row).unwrap_or_else(|| service::first_free_pair(row)),
                data,
                acords,
            ),
            PairEdit::Clear => match first_filled_pair(row) {
                Some(col) => (col, "", ""),
                None => return Ok(false),
            },
        };
        let line = idx + 1;
        self.update_cell(tab, line, col + 1, data).await?;
        self.update_cell(tab, line, col + 2, acords).await?;
        debug!(tab, line, column = col + 1, "interview pair written");
        Ok(true)
    }

    /// Mirror a new academic year: `Config.anyActual` and a `Grups_<any>` tab
    /// with one `[grupId, curs, nom]` row per group.
    pub async fn publish_curs(&self, any_curs: &str, grups: Vec<Vec<String>>) -> Result<(), GoogleError> {
        self.client
            .update_values(
                &self.spreadsheet_id,
                "Config!A2:B2",
                vec![vec!["anyActual".to_string(), Value::String(any_curs.to_string()).to_string()]],
            )
            .await?;
        let title = format!("Grups_{any_curs}");
        match self.client.add_sheet(&self.spreadsheet_id, &title).await {
            Ok(()) => {
                let header = ["grupId", "curs", "nom"].map(String::from).to_vec();
                self.client
                    .update_values(&self.spreadsheet_id, &format!("{title}!A1:C1"), vec![header])
                    .await?;
            }
            Err(e) => debug!("{title} not added, assuming it exists: {e}"),
        }
        if !grups.is_empty() {
            self.client
                .append_values(&self.spreadsheet_id, &format!("{title}!A1:C1"), grups)
                .await?;
        }
        Ok(())
    }

    fn tab_entrevistes(tab: &str, values: &[Vec<String>]) -> Vec<EntrevistaTab> {
        let Some((header, rows)) = values.split_first() else {
            return Vec::new();
        };
        let i_id = header_index(header, &["id", "entrevistaid"]);
        let i_alumne = header_index(header, &["alumneid", "alumne_id", "alumne"]);
        let i_any = header_index(header, &["anycurs", "any", "curs", "any_curs"]);
        let i_data = header_index(header, &["data", "fecha", "date"]);
        let i_acords = header_index(header, &["acords", "acuerdos", "notes", "observacions"]);
        let i_author = header_index(header, &["usuaricreadorid", "autor", "creador", "usuari_creador_id"]);

        rows.iter()
            .filter(|row| !row.is_empty())
            .filter_map(|row| {
                let alumne_id = match i_alumne {
                    Some(i) => row.get(i).cloned().unwrap_or_default(),
                    None => row
                        .iter()
                        .take(2)
                        .map(|c| c.trim())
                        .find(|c| !c.is_empty())
                        .unwrap_or_default()
                        .to_string(),
                };
                let alumne_id = alumne_id.trim().to_string();
                if alumne_id.is_empty() {
                    return None;
                }
                Some(EntrevistaTab {
                    id: cell(row, i_id),
                    alumne_id,
                    any_curs: cell(row, i_any),
                    data: cell(row, i_data),
                    acords: cell(row, i_acords),
                    usuari_creador_id: cell(row, i_author),
                    tab_name: tab.to_string(),
                })
            })
            .collect()
    }

    /// Students listed on the `<n> ESO` tabs (`C4:D`), tagged with the level
    /// of the tab they were read from.
    pub async fn eso_alumnes(&self) -> Result<Vec<(&'static str, EsoAlumne)>, GoogleError> {
        let titles: Vec<String> = self
            .client
            .metadata(&self.spreadsheet_id)
            .await?
            .into_iter()
            .map(|t| t.title)
            .collect();
        let mut out = Vec::new();
        for nivell in NIVELLS {
            let wanted = format!("{nivell} ESO");
            let Some(tab) = titles.iter().find(|t| t.trim().eq_ignore_ascii_case(&wanted)) else {
                continue;
            };
            let rows = self.values(&format!("{tab}!C4:D")).await?;
            let before = out.len();
            out.extend(rows.iter().filter_map(|row| {
                let c = row.first().map(String::as_str).unwrap_or_default();
                let d = row.get(1).map(String::as_str).unwrap_or_default();
                service::parse_eso_row(c, d).map(|a| (nivell, a))
            }));
            debug!(tab = %tab, alumnes = out.len() - before, "read level tab");
        }
        Ok(out)
    }

    /// Level tabs (`1r ESO`..`4t ESO`) merged into the history of the
    /// students on the highest one. Unreadable older tabs are skipped.
    pub async fn consolidar(&self) -> Result<NivellConsolidat, GoogleError> {
        let titles: Vec<String> = self
            .client
            .metadata(&self.spreadsheet_id)
            .await?
            .into_iter()
            .map(|t| t.title)
            .collect();
        let pestanyes: Vec<String> = NIVELLS
            .iter()
            .filter_map(|nivell| {
                let wanted = format!("{nivell} ESO");
                titles.iter().find(|t| t.trim().eq_ignore_ascii_case(&wanted)).cloned()
            })
            .collect();
        let Some(master) = pestanyes.last() else {
            return Err(GoogleError::Unexpected(
                "no s'han trobat pestanyes de curs vàlides".into(),
            ));
        };

        let mut tabs = Vec::with_capacity(pestanyes.len());
        for tab in &pestanyes {
            match self.values(&format!("{tab}!A:Z")).await {
                Ok(values) => tabs.push((tab.clone(), values)),
                Err(e) if tab != master => warn!("reading history tab {tab}: {e}"),
                Err(e) => return Err(e),
            }
        }
        if tabs.last().is_none_or(|(_, values)| values.len() <= MASTER_FIRST_ROW) {
            return Err(GoogleError::Unexpected(format!(
                "la pestanya {master} està buida o té format incorrecte"
            )));
        }
        let alumnes = consolidate_tabs(&tabs);
        debug!(master = %master, alumnes = alumnes.len(), "consolidated level tabs");
        Ok(NivellConsolidat { pestanyes, alumnes })
    }

    /// Interviews of every tab; unreadable tabs appear with no rows.
    pub async fn entrevistes_by_tabs(&self) -> Vec<TabEntrevistes> {
        let tabs = self.all_sheets().await;
        debug!(tabs = tabs.len(), "reading interview tabs");
        let mut out = Vec::with_capacity(tabs.len());
        for tab in tabs {
            let entrevistes = match self.sheet_data(&tab).await {
                Ok(values) => Self::tab_entrevistes(&tab, &values),
                Err(e) => {
                    warn!("reading tab {tab}: {e}");
                    Vec::new()
                }
            };
            out.push(TabEntrevistes {
                tab_name: tab,
                entrevistes,
            });
        }
        out
    }

    /// Every tab's interviews with acords prefixed by the tab name, newest first.
    pub async fn historial_consolidat(&self) -> Vec<EntrevistaTab> {
        let mut historial: Vec<EntrevistaTab> = self
            .entrevistes_by_tabs()
            .await
            .into_iter()
            .flat_map(|t| t.entrevistes)
            .map(|mut e| {
                e.acords = Some(format!("[{}] {}", e.tab_name, e.acords.as_deref().unwrap_or_default()));
                e
            })
            .collect();
        historial.sort_by_key(|e| std::cmp::Reverse(sheet_date(e.data.as_deref())));
        historial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::sheets::tests::live_client;
    use entrevistes_api::EstatAlumne;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_values(server: &MockServer, encoded_range: &str, values: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/spreadsheets/abc/values/{encoded_range}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": values })))
            .mount(server)
            .await;
    }

    async fn repo(server: &MockServer) -> SheetsRepo {
        SheetsRepo::new(live_client(server).await, "abc", "2025-2026")
    }

    #[test]
    fn sheet_dates_fall_back_to_1900() {
        assert_eq!(sheet_date(Some("2024-03-02T10:00:00Z")), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(sheet_date(Some("05/11/2023")), NaiveDate::from_ymd_opt(2023, 11, 5).unwrap());
        assert_eq!(sheet_date(None), NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
        assert_eq!(sheet_date(Some("demà")), NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
    }

    #[tokio::test]
    async fn config_decodes_json_values() {
        let server = MockServer::start().await;
        mount_values(
            &server,
            "Config%21A2%3AB1000",
            json!([["anyActual", "\"2024-2025\""], ["nota", "text lliure"], ["", "x"]]),
        )
        .await;
        let repo = repo(&server).await;

        let cfg = repo.get_config().await;
        assert_eq!(cfg["anyActual"], "2024-2025");
        assert_eq!(cfg["nota"], "text lliure");
        assert_eq!(cfg.len(), 2);
        assert_eq!(repo.any_actual().await, "2024-2025");
    }

    #[tokio::test]
    async fn unreadable_config_reports_fallback_year() {
        let server = MockServer::start().await;
        let repo = repo(&server).await;
        assert_eq!(repo.get_config().await["anyActual"], "2025-2026");
    }

    #[tokio::test]
    async fn list_alumnes_filters_by_estat() {
        let server = MockServer::start().await;
        mount_values(
            &server,
            "Alumnes_2025-2026%21A1%3AH10000",
            json!([
                ["alumneId", "nom", "grup", "anyCurs", "personalId", "estat", "createdAt", "updatedAt"],
                ["a1", "Puig, Anna", "1A", "2025-2026", "pf1", "alta"],
                ["a2", "Vidal, Pau", "1B", "2025-2026", "pf2", "baixa"]
            ]),
        )
        .await;
        let repo = repo(&server).await;

        let alta = repo.list_alumnes(Some("2025-2026"), Some("alta")).await;
        assert_eq!(alta.len(), 1);
        assert_eq!(alta[0].id, "a1");
        assert_eq!(alta[0].grup.as_deref(), Some("1A"));
        assert_eq!(repo.list_alumnes(Some("2025-2026"), None).await.len(), 2);
    }

    #[tokio::test]
    async fn update_alumne_rewrites_matching_row() {
        let server = MockServer::start().await;
        mount_values(&server, "Config%21A2%3AB1000", json!([])).await;
        mount_values(
            &server,
            "Alumnes_2025-2026%21A1%3AH10000",
            json!([
                ["alumneId", "nom", "grup", "anyCurs", "personalId", "estat", "createdAt", "updatedAt"],
                ["a1", "Puig, Anna", "1A", "2025-2026", "pf1", "alta", "t0", "t0"],
                ["a2", "Vidal, Pau", "1B", "2025-2026", "pf2", "alta", "t0", "t0"]
            ]),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/spreadsheets/abc/values/Alumnes_2025-2026%21A3%3AH3"))
            .and(body_partial_json(json!({"range": "Alumnes_2025-2026!A3:H3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let repo = repo(&server).await;

        let updates = UpdateAlumneRequest {
            grup: Some("2A".into()),
            estat: Some(EstatAlumne::Baixa),
        };
        assert!(repo.update_alumne("a2", &updates).await.unwrap());
        assert!(!repo.update_alumne("zz", &updates).await.unwrap());
    }

    #[tokio::test]
    async fn entrevistes_use_header_aliases() {
        let server = MockServer::start().await;
        mount_values(
            &server,
            "Entrevistes_2025-2026%21A1%3AZ10000",
            json!([
                ["ID", "Alumne", "Fecha", "Acuerdos"],
                ["e1", "a1", "2025-10-01", "Bona evolució"],
                ["e2", "a2", "2025-10-02", "Cal seguiment"]
            ]),
        )
        .await;
        let repo = repo(&server).await;

        let all = repo.list_entrevistes(Some("a2"), Some("2025-2026")).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_deref(), Some("e2"));
        assert_eq!(all[0].any_curs, "2025-2026");
        assert_eq!(all[0].acords.as_deref(), Some("Cal seguiment"));
    }

    #[test]
    fn tab_rows_without_student_are_skipped() {
        let values = vec![
            vec!["Grup".to_string(), "Nom".to_string(), "Data".to_string()],
            vec!["".to_string(), "".to_string(), "2025-01-01".to_string()],
            vec!["1A".to_string(), "Puig, Anna".to_string(), "2025-01-02".to_string()],
        ];
        let rows = SheetsRepo::tab_entrevistes("1r ESO", &values);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alumne_id, "1A");
        assert_eq!(rows[0].tab_name, "1r ESO");
        assert_eq!(rows[0].data.as_deref(), Some("2025-01-02"));
    }

    fn cells(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn student_row_matches_name_and_group() {
        let values = vec![
            cells(&["", "GRUP", "NOM"]),
            cells(&["", "1A", "Puig, Anna"]),
            cells(&["", "1B", "Puig , anna"]),
        ];
        assert_eq!(find_student_row(&values, "PUIG, Anna", "1B"), Some(2));
        assert_eq!(find_student_row(&values, "Puig, Anna", "2A"), None);
    }

    #[test]
    fn filled_pair_skips_leading_blanks() {
        let row = cells(&["", "1A", "Puig, Anna", "", "", "", "", "", "", "acord"]);
        assert_eq!(first_filled_pair(&row), Some(8));
        assert_eq!(first_filled_pair(&cells(&["", "1A", "Puig, Anna"])), None);
    }

    #[tokio::test]
    async fn clearing_blanks_first_filled_pair() {
        let server = MockServer::start().await;
        mount_values(
            &server,
            "2n%20ESO%21A1%3AZ10000",
            json!([
                ["", "GRUP", "NOM"],
                ["", "2A", "Vidal, Pau", "", "", "", "2025-01-10", "Primer acord"]
            ]),
        )
        .await;
        for cell in ["G2", "H2"] {
            Mock::given(method("PUT"))
                .and(path(format!("/spreadsheets/abc/values/2n%20ESO%21{cell}")))
                .and(body_partial_json(json!({"values": [[""]]})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
                .expect(1)
                .mount(&server)
                .await;
        }
        let repo = repo(&server).await;

        assert!(repo.edit_interview_pair("2n ESO", "Vidal, Pau", "2A", PairEdit::Clear).await.unwrap());
        assert!(!repo.edit_interview_pair("2n ESO", "Ningú", "2A", PairEdit::Clear).await.unwrap());
    }

    #[tokio::test]
    async fn eso_tabs_are_read_in_level_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    {"properties": {"sheetId": 2, "title": "2n ESO"}},
                    {"properties": {"sheetId": 1, "title": "1r ESO"}},
                    {"properties": {"sheetId": 9, "title": "Config"}}
                ]
            })))
            .mount(&server)
            .await;
        mount_values(&server, "1r%20ESO%21C4%3AD", json!([["Puig, Anna", "1A"], ["", ""]])).await;
        mount_values(&server, "2n%20ESO%21C4%3AD", json!([["2B", "Vila, Pere"]])).await;

        let alumnes = repo(&server).await.eso_alumnes().await.unwrap();
        assert_eq!(alumnes.len(), 2);
        assert_eq!(alumnes[0].0, "1r");
        assert_eq!(alumnes[0].1.nom, "Puig, Anna");
        assert_eq!(alumnes[1].0, "2n");
        assert_eq!(alumnes[1].1.grup.as_deref(), Some("2B"));
    }

    fn level_row(grup: &str, nom: &str, pairs: &[&str]) -> Vec<String> {
        let mut row: Vec<String> = ["", "", grup, nom, "Tutor", ""].iter().map(|s| s.to_string()).collect();
        row.extend(pairs.iter().map(|s| s.to_string()));
        row
    }

    fn headers() -> Vec<Vec<String>> {
        vec![vec!["Títol".to_string()], Vec::new(), vec!["Grup".to_string(), "Nom".to_string()]]
    }

    #[test]
    fn consolidation_follows_the_master_list() {
        let mut primer = headers();
        primer.push(level_row("1A", "Puig,Anna", &["2023-10-01", "Inici"]));
        primer.push(level_row("1B", "Marxat, Joan", &["2023-11-01", "Baixa"]));
        let mut segon = headers();
        segon.push(level_row("2A", "Puig, Anna", &["2024-10-01", "Seguiment"]));
        segon.push(level_row("2A", "Nou, Pol", &[]));

        let alumnes = consolidate_tabs(&[("1r ESO".into(), primer), ("2n ESO".into(), segon)]);
        assert_eq!(alumnes.len(), 2);
        assert_eq!(alumnes[0].nom, "Puig, Anna");
        assert_eq!(alumnes[0].grup, "2A");
        assert_eq!(
            alumnes[0].historial,
            vec![
                ("1r ESO".to_string(), "Data: 2023-10-01\nAcords: Inici".to_string()),
                ("2n ESO".to_string(), "Data: 2024-10-01\nAcords: Seguiment".to_string()),
            ]
        );
        assert!(alumnes[1].historial.is_empty());
    }

    #[tokio::test]
    async fn consolidation_needs_a_level_tab() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{"properties": {"sheetId": 9, "title": "Config"}}]
            })))
            .mount(&server)
            .await;
        let err = repo(&server).await.consolidar().await.unwrap_err();
        assert!(matches!(err, GoogleError::Unexpected(_)));
    }

    #[tokio::test]
    async fn historial_prefixes_tab_and_sorts_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{"properties": {"sheetId": 1, "title": "1r ESO"}}]
            })))
            .mount(&server)
            .await;
        mount_values(
            &server,
            "1r%20ESO%21A1%3AZ10000",
            json!([
                ["alumneId", "data", "acords"],
                ["a1", "2024-01-10", "primera"],
                ["a1", "2024-05-10", "segona"]
            ]),
        )
        .await;
        let repo = repo(&server).await;

        let historial = repo.historial_consolidat().await;
        assert_eq!(historial.len(), 2);
        assert_eq!(historial[0].acords.as_deref(), Some("[1r ESO] segona"));
        assert_eq!(historial[1].data.as_deref(), Some("2024-01-10"));
    }
}
