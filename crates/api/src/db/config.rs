//! Key/value configuration (`config` table, JSONB values).

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::Config;

/// Key holding the current academic year.
pub const ANY_ACTUAL_KEY: &str = "anyActual";

pub fn get(clau: &str) -> Built {
    Query::select()
        .column(Config::Valor)
        .from(Config::Table)
        .and_where(Expr::col(Config::Clau).eq(clau))
        .build(PostgresQueryBuilder)
}

/// Key/value pairs for a set of keys.
pub fn get_many(claus: &[&str]) -> Built {
    Query::select()
        .columns([Config::Clau, Config::Valor])
        .from(Config::Table)
        .and_where(Expr::col(Config::Clau).is_in(claus.iter().copied()))
        .build(PostgresQueryBuilder)
}

pub fn upsert(clau: &str, valor: serde_json::Value) -> Built {
    Query::insert()
        .into_table(Config::Table)
        .columns([Config::Clau, Config::Valor])
        .values_panic([clau.into(), valor.into()])
        .on_conflict(
            OnConflict::column(Config::Clau)
                .update_column(Config::Valor)
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

/// Store a value only if the key is not set yet.
pub fn insert_missing(clau: &str, valor: serde_json::Value) -> Built {
    Query::insert()
        .into_table(Config::Table)
        .columns([Config::Clau, Config::Valor])
        .values_panic([clau.into(), valor.into()])
        .on_conflict(OnConflict::column(Config::Clau).do_nothing().to_owned())
        .build(PostgresQueryBuilder)
}

/// Read a stored academic year, accepting a bare JSON string or `{"value": ..}`.
pub fn any_curs_from_value(valor: &serde_json::Value) -> Option<String> {
    string_value(valor)
}

/// Non-blank text of a stored value, bare or wrapped as `{"value": ..}`.
pub fn string_value(valor: &serde_json::Value) -> Option<String> {
    let raw = match valor {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map.get("value").and_then(|v| v.as_str()),
        _ => None,
    }?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_curs_accepts_string_or_object() {
        assert_eq!(
            any_curs_from_value(&json!("2025-2026")).as_deref(),
            Some("2025-2026")
        );
        assert_eq!(
            any_curs_from_value(&json!({"value": "2024-2025"})).as_deref(),
            Some("2024-2025")
        );
        assert_eq!(any_curs_from_value(&json!(2025)), None);
        assert_eq!(any_curs_from_value(&json!("  ")), None);
    }

    #[test]
    fn get_many_uses_in_list() {
        let (sql, values) = get_many(&["1rSpreadsheetId", "2nSpreadsheetId"]);
        assert!(sql.contains(r#""clau" IN ($1, $2)"#));
        assert_eq!(values.0.len(), 2);
    }
}
