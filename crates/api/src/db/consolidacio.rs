//! Consolidated historical interviews and consolidation runs.

use sea_query::{Expr, Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::{ConsolidacionLogs, EntrevistesConsolidadas};

/// Config keys holding the spreadsheet of each ESO level.
pub const SPREADSHEET_KEYS: [&str; 4] = [
    "1rSpreadsheetId",
    "2nSpreadsheetId",
    "3rSpreadsheetId",
    "4tSpreadsheetId",
];

/// Level labels matching [`SPREADSHEET_KEYS`].
pub const NIVELLS: [&str; 4] = ["1r", "2n", "3r", "4t"];

pub fn insert(
    alumne_id: Option<&str>,
    alumne_nom: &str,
    curso_origen: &str,
    pestana_origen: &str,
    data_entrevista: &str,
    acords: &str,
    any_curs: &str,
    spreadsheet_id: &str,
) -> Built {
    Query::insert()
        .into_table(EntrevistesConsolidadas::Table)
        .columns([
            EntrevistesConsolidadas::AlumneId,
            EntrevistesConsolidadas::AlumneNom,
            EntrevistesConsolidadas::CursoOrigen,
            EntrevistesConsolidadas::PestanaOrigen,
            EntrevistesConsolidadas::DataEntrevista,
            EntrevistesConsolidadas::Acords,
            EntrevistesConsolidadas::AnyCurs,
            EntrevistesConsolidadas::SpreadsheetId,
        ])
        .values_panic([
            alumne_id.map(str::to_string).into(),
            alumne_nom.into(),
            curso_origen.into(),
            pestana_origen.into(),
            data_entrevista.into(),
            acords.into(),
            any_curs.into(),
            spreadsheet_id.into(),
        ])
        .build(PostgresQueryBuilder)
}

/// Clear a year's consolidated rows before a re-run.
pub fn delete_year(any_curs: &str) -> Built {
    Query::delete()
        .from_table(EntrevistesConsolidadas::Table)
        .and_where(Expr::col(EntrevistesConsolidadas::AnyCurs).eq(any_curs))
        .build(PostgresQueryBuilder)
}

pub fn insert_log(
    any_curs: &str,
    alumnes_processats: i32,
    entrevistes: i32,
    errors: i32,
    detalls: serde_json::Value,
) -> Built {
    Query::insert()
        .into_table(ConsolidacionLogs::Table)
        .columns([
            ConsolidacionLogs::AnyCurs,
            ConsolidacionLogs::AlumnesProcessats,
            ConsolidacionLogs::EntrevistesConsolidadas,
            ConsolidacionLogs::Errors,
            ConsolidacionLogs::Detalls,
        ])
        .values_panic([
            any_curs.into(),
            alumnes_processats.into(),
            entrevistes.into(),
            errors.into(),
            detalls.into(),
        ])
        .build(PostgresQueryBuilder)
}

pub fn list_logs(limit: u64) -> Built {
    Query::select()
        .columns([
            ConsolidacionLogs::Id,
            ConsolidacionLogs::AnyCurs,
            ConsolidacionLogs::AlumnesProcessats,
            ConsolidacionLogs::EntrevistesConsolidadas,
            ConsolidacionLogs::Errors,
            ConsolidacionLogs::CreatedAt,
        ])
        .from(ConsolidacionLogs::Table)
        .order_by(ConsolidacionLogs::CreatedAt, Order::Desc)
        .limit(limit)
        .build(PostgresQueryBuilder)
}
