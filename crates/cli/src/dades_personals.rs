use std::path::Path;

use anyhow::{Context, Result, bail};

use entrevistes_api::{DadesPersonals, ImportDadesPersonalsRequest, ImportDadesPersonalsResponse};

use crate::client::ApiClient;

/// Rows above the data: a title line and the column headers.
const SKIPPED_LINES: usize = 2;
const MIN_COLUMNS: usize = 25;

/// A CSV line that could not become an import request.
#[derive(Debug, PartialEq)]
pub struct Problema {
    pub linia: u64,
    pub problema: &'static str,
    pub alumne: String,
}

fn field(record: &csv::StringRecord, i: usize) -> Option<String> {
    record
        .get(i)
        .map(|v| v.trim().replace('"', ""))
        .filter(|v| !v.is_empty())
}

fn sexe(value: Option<String>) -> String {
    match value.as_deref() {
        Some("H") => "H".into(),
        Some("D") => "D".into(),
        _ => "X".into(),
    }
}

/// Map one export row to a request; columns are fixed by the export layout.
fn to_request(record: &csv::StringRecord) -> ImportDadesPersonalsRequest {
    ImportDadesPersonalsRequest {
        alumne_nom: field(record, 3).unwrap_or_default(),
        dades: DadesPersonals {
            personal_id: String::new(),
            sexe: Some(sexe(field(record, 1))),
            alumne_email: field(record, 8),
            ralc: field(record, 9),
            doc_identitat: field(record, 10),
            tis: field(record, 11),
            data_naixement: field(record, 12),
            municipi_naixement: field(record, 13),
            nacionalitat: field(record, 14),
            adreca: field(record, 15),
            municipi_residencia: field(record, 16),
            codi_postal: field(record, 17),
            tutor1_nom: field(record, 18),
            tutor1_tel: field(record, 19),
            tutor1_email: field(record, 20),
            tutor2_nom: field(record, 21),
            tutor2_tel: field(record, 22),
            tutor2_email: field(record, 23),
            link_fotografia: field(record, 24),
        },
    }
}

/// Parse the school export. Rows without a name or student email are
/// reported as problems.
pub fn parse_export(text: &str) -> Result<(Vec<ImportDadesPersonalsRequest>, Vec<Problema>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    let mut problemes = Vec::new();
    for result in reader.records().skip(SKIPPED_LINES) {
        let record = result.context("reading CSV")?;
        let linia = record.position().map(|p| p.line()).unwrap_or_default();
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        if record.len() < MIN_COLUMNS {
            problemes.push(Problema {
                linia,
                problema: "Massa poques columnes",
                alumne: "N/A".into(),
            });
            continue;
        }
        let req = to_request(&record);
        if req.alumne_nom.is_empty() || req.dades.alumne_email.is_none() {
            problemes.push(Problema {
                linia,
                problema: "Falten dades essencials",
                alumne: if req.alumne_nom.is_empty() {
                    "N/A".into()
                } else {
                    req.alumne_nom
                },
            });
            continue;
        }
        rows.push(req);
    }
    Ok((rows, problemes))
}

/// Post every valid row to `/dades-personals/import`.
pub async fn run_import(client: &ApiClient, csv: &Path) -> Result<()> {
    if !csv.exists() {
        bail!("File not found: {}", csv.display());
    }
    let text = std::fs::read_to_string(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    let (rows, problemes) = parse_export(&text)?;
    println!("Valid rows: {}  Problems: {}", rows.len(), problemes.len());
    for p in &problemes {
        println!("  line {}: {} ({})", p.linia, p.problema, p.alumne);
    }

    let mut importats = 0usize;
    let mut errors = 0usize;
    for req in &rows {
        match client
            .post::<_, ImportDadesPersonalsResponse>("/dades-personals/import", req)
            .await
        {
            Ok(resp) => {
                importats += 1;
                let linked = if resp.alumne_id.is_some() { "" } else { " (no student linked)" };
                println!("ok    {} -> {}{}", req.alumne_nom, resp.personal_id, linked);
            }
            Err(e) => {
                errors += 1;
                println!("error {}: {}", req.alumne_nom, e);
            }
        }
    }
    println!("Imported: {importats}  Errors: {errors}  Problems: {}", problemes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(nom: &str, email: &str, sexe: &str) -> String {
        let mut cols = vec![String::new(); MIN_COLUMNS];
        cols[1] = sexe.into();
        cols[2] = "1A".into();
        cols[3] = format!("\"{nom}\"");
        cols[8] = email.into();
        cols[18] = "Maria".into();
        cols[20] = "maria@example.com".into();
        cols.join(",")
    }

    #[test]
    fn export_rows_map_to_requests() {
        let text = [
            "Dades alumnat".to_string(),
            "Codi,Sexe,Grup,Alumn@".to_string(),
            line("Puig, Anna", "anna@insbitacola.cat", "D"),
            String::new(),
            line("Vila, Pere", "", "H"),
            "curta,fila".to_string(),
            line("Roca, Nil", "nil@insbitacola.cat", "?"),
        ]
        .join("\n");

        let (rows, problemes) = parse_export(&text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].alumne_nom, "Puig, Anna");
        assert_eq!(rows[0].dades.sexe.as_deref(), Some("D"));
        assert_eq!(rows[0].dades.tutor1_email.as_deref(), Some("maria@example.com"));
        assert_eq!(rows[0].dades.tutor2_nom, None);
        assert_eq!(rows[1].dades.sexe.as_deref(), Some("X"));
        assert!(rows[0].dades.personal_id.is_empty());

        assert_eq!(problemes.len(), 2);
        assert_eq!(problemes[0].alumne, "Vila, Pere");
        assert_eq!(problemes[1].problema, "Massa poques columnes");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = ApiClient::new("http://127.0.0.1:1", Some("admin@insbitacola.cat".into())).unwrap();
        let err = run_import(&client, &dir.path().join("absent.csv")).await.unwrap_err();
        assert!(err.to_string().starts_with("File not found"));
    }
}
