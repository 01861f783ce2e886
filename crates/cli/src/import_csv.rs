use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use entrevistes_api::CsvImportRequest;

use crate::client::ApiClient;

/// Read a CSV file as the base64 body the import endpoints expect.
fn encode_file(csv: &Path, any_curs: Option<&str>) -> Result<CsvImportRequest> {
    if !csv.exists() {
        bail!("File not found: {}", csv.display());
    }
    let bytes = std::fs::read(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    Ok(CsvImportRequest {
        csv_base64: STANDARD.encode(bytes),
        any_curs: any_curs.map(str::to_string),
    })
}

async fn post_csv(client: &ApiClient, path: &str, body: &CsvImportRequest) -> Result<()> {
    println!("Uploading to {}{}...", client.base_url(), path);
    let resp: serde_json::Value = client.post(path, body).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

/// POST /tutors/tutories/import
pub async fn run_import_tutories(client: &ApiClient, csv: &Path, any_curs: &str) -> Result<()> {
    let body = encode_file(csv, Some(any_curs))?;
    post_csv(client, "/tutors/tutories/import", &body).await
}

/// POST /tutors/import
pub async fn run_import_assignacions(client: &ApiClient, csv: &Path) -> Result<()> {
    let body = encode_file(csv, None)?;
    post_csv(client, "/tutors/import", &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_is_sent_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutories.csv");
        std::fs::write(&path, "alumne,tutor\n").unwrap();

        let body = encode_file(&path, Some("2025-2026")).unwrap();
        assert_eq!(body.csv_base64, "YWx1bW5lLHR1dG9yCg==");
        assert_eq!(body.any_curs.as_deref(), Some("2025-2026"));
        assert!(encode_file(&dir.path().join("absent.csv"), None).is_err());
    }
}
