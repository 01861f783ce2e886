use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use entrevistes_api::{DiagnosticResponse, GridInfo, TabInfo};

use crate::AppState;
use crate::error::ApiErr;
use crate::google::GoogleError;
use crate::google::sheets::SheetsClient;
use crate::routes::auth::AuthUser;

pub fn router() -> Router<AppState> {
    Router::new().route("/diagnostic", get(diagnostic))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticQuery {
    #[serde(default)]
    pub spreadsheet_id: String,
}

/// Tabs with their grid size and the number of rows holding data; `-1`
/// when a tab can't be read.
async fn diagnose(client: &SheetsClient, spreadsheet_id: &str) -> Result<DiagnosticResponse, GoogleError> {
    let mut tabs = Vec::new();
    for meta in client.metadata(spreadsheet_id).await? {
        let rows = match client
            .get_values(spreadsheet_id, &format!("{}!A1:Z10000", meta.title))
            .await
        {
            Ok(values) => values.len() as i64,
            Err(e) => {
                tracing::warn!("diagnostic of {spreadsheet_id}/{}: {e}", meta.title);
                -1
            }
        };
        tabs.push(TabInfo {
            title: meta.title,
            sheet_id: meta.sheet_id,
            grid: GridInfo {
                rows: meta.rows,
                cols: meta.cols,
            },
            rows,
        });
    }
    Ok(DiagnosticResponse {
        spreadsheet_id: spreadsheet_id.to_string(),
        tabs,
    })
}

/// GET /sheets/diagnostic?spreadsheetId: what the service account can see
/// of a spreadsheet.
pub async fn diagnostic(
    State(client): State<SheetsClient>,
    _user: AuthUser,
    Query(q): Query<DiagnosticQuery>,
) -> Result<Json<DiagnosticResponse>, ApiErr> {
    let spreadsheet_id = q.spreadsheet_id.trim();
    if spreadsheet_id.is_empty() {
        return Err(ApiErr::bad_request("Falta spreadsheetId"));
    }
    let resp = diagnose(&client, spreadsheet_id).await.map_err(|e| {
        tracing::error!("diagnostic of {spreadsheet_id}: {e}");
        ApiErr::internal(e.to_string())
    })?;
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::sheets::tests::live_client;
    use crate::routes::testing::{error_of, get, send};
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn unreadable_tabs_report_minus_one() {
        let server = MockServer::start().await;
        let client = live_client(&server).await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    {"properties": {"sheetId": 0, "title": "1r ESO", "gridProperties": {"rowCount": 120, "columnCount": 26}}},
                    {"properties": {"sheetId": 3, "title": "Trencada"}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc/values/1r%20ESO%21A1%3AZ10000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["a"], ["b"], ["c"]]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc/values/Trencada%21A1%3AZ10000"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let resp = diagnose(&client, "abc").await.unwrap();
        assert_eq!(resp.tabs.len(), 2);
        assert_eq!(resp.tabs[0].rows, 3);
        assert_eq!(resp.tabs[0].grid.rows, 120);
        assert_eq!(resp.tabs[1].rows, -1);
        assert_eq!(resp.tabs[1].sheet_id, 3);
    }

    #[tokio::test]
    async fn spreadsheet_id_is_required() {
        let resp = send(
            AppState::for_tests(true),
            get("/sheets/diagnostic?spreadsheetId=%20", Some("docent@insbitacola.cat")),
        )
        .await;
        let (status, msg) = error_of(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Falta spreadsheetId");
    }
}
