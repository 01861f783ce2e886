//! Google Sheets v4 REST client.
//!
//! Without credentials every read returns nothing and every write is
//! accepted and dropped, so Sheets-backed routes degrade to empty results.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::token::{SHEETS_SCOPE, TOKEN_URL, TokenSource};
use super::{GoogleError, ServiceAccount, check_status};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4";

/// One tab of a spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetMeta {
    pub title: String,
    pub sheet_id: i64,
    pub rows: i64,
    pub cols: i64,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: i64,
    #[serde(default)]
    column_count: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    api_url: String,
    tokens: Option<TokenSource>,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, account: Option<ServiceAccount>) -> Self {
        Self::with_endpoints(http, account, SHEETS_API_URL, TOKEN_URL)
    }

    pub fn with_endpoints(
        http: reqwest::Client,
        account: Option<ServiceAccount>,
        api_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        let token_url = token_url.into();
        let tokens = account.map(|account| {
            TokenSource::with_token_url(http.clone(), account, SHEETS_SCOPE, None, token_url)
        });
        if tokens.is_none() {
            warn!("Google Sheets credentials missing, Sheets features disabled");
        }
        Self {
            http,
            api_url: api_url.into(),
            tokens,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.tokens.is_none()
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.api_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    /// Cell values of `range` as text, rows trimmed of trailing blanks by Google.
    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, GoogleError> {
        let Some(tokens) = &self.tokens else {
            return Ok(Vec::new());
        };
        let resp = self
            .http
            .get(self.values_url(spreadsheet_id, range))
            .bearer_auth(tokens.access_token().await?)
            .send()
            .await?;
        let body: ValueRange = check_status(resp).await?.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    pub async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), GoogleError> {
        let Some(tokens) = &self.tokens else {
            return Ok(());
        };
        let resp = self
            .http
            .post(format!("{}:append", self.values_url(spreadsheet_id, range)))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(tokens.access_token().await?)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    pub async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), GoogleError> {
        let Some(tokens) = &self.tokens else {
            return Ok(());
        };
        let resp = self
            .http
            .put(self.values_url(spreadsheet_id, range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(tokens.access_token().await?)
            .json(&json!({ "range": range, "values": rows }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Tabs of the spreadsheet with their grid sizes.
    pub async fn metadata(&self, spreadsheet_id: &str) -> Result<Vec<SheetMeta>, GoogleError> {
        let Some(tokens) = &self.tokens else {
            return Ok(Vec::new());
        };
        let resp = self
            .http
            .get(format!(
                "{}/spreadsheets/{}",
                self.api_url,
                urlencoding::encode(spreadsheet_id)
            ))
            .query(&[("fields", "sheets.properties")])
            .bearer_auth(tokens.access_token().await?)
            .send()
            .await?;
        let body: Spreadsheet = check_status(resp).await?.json().await?;
        Ok(body
            .sheets
            .into_iter()
            .map(|s| SheetMeta {
                title: s.properties.title,
                sheet_id: s.properties.sheet_id,
                rows: s.properties.grid_properties.row_count,
                cols: s.properties.grid_properties.column_count,
            })
            .collect())
    }

    pub async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), GoogleError> {
        let Some(tokens) = &self.tokens else {
            return Ok(());
        };
        let resp = self
            .http
            .post(format!(
                "{}/spreadsheets/{}:batchUpdate",
                self.api_url,
                urlencoding::encode(spreadsheet_id)
            ))
            .bearer_auth(tokens.access_token().await?)
            .json(&json!({
                "requests": [{ "addSheet": { "properties": { "title": title } } }]
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::google::testing;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) async fn live_client(server: &MockServer) -> SheetsClient {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.sheets",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
        SheetsClient::with_endpoints(
            reqwest::Client::new(),
            Some(testing::account()),
            server.uri(),
            format!("{}/token", server.uri()),
        )
    }

    #[tokio::test]
    async fn mock_client_reads_nothing() {
        let client = SheetsClient::new(reqwest::Client::new(), None);
        assert!(client.is_mock());
        assert!(client.get_values("sheet", "Config!A2:B1000").await.unwrap().is_empty());
        assert!(client.metadata("sheet").await.unwrap().is_empty());
        assert!(client.append_values("sheet", "X!A1", vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn get_values_stringifies_cells() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc/values/Config%21A2%3AB1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Config!A2:B1000",
                "values": [["anyActual", "\"2025-2026\""], ["places", 3]]
            })))
            .mount(&server)
            .await;

        let rows = client.get_values("abc", "Config!A2:B1000").await.unwrap();
        assert_eq!(rows[0], vec!["anyActual", "\"2025-2026\""]);
        assert_eq!(rows[1], vec!["places", "3"]);
    }

    #[tokio::test]
    async fn append_uses_raw_input() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/abc/values/Alumnes_2025-2026%21A1%3AH1:append"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(json!({"values": [["a1", "Puig, Anna"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client
            .append_values(
                "abc",
                "Alumnes_2025-2026!A1:H1",
                vec![vec!["a1".into(), "Puig, Anna".into()]],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn metadata_lists_tabs() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    {"properties": {"sheetId": 0, "title": "1r ESO", "gridProperties": {"rowCount": 120, "columnCount": 26}}},
                    {"properties": {"sheetId": 7, "title": "Config"}}
                ]
            })))
            .mount(&server)
            .await;

        let tabs = client.metadata("abc").await.unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0], SheetMeta { title: "1r ESO".into(), sheet_id: 0, rows: 120, cols: 26 });
        assert_eq!(tabs[1].rows, 0);
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = client.metadata("missing").await.unwrap_err();
        assert!(matches!(err, GoogleError::Api { status: 404, .. }));
    }
}
