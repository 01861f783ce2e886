//! Calendar sync audit log.

use sea_query::{Expr, Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::SyncLog;

/// One sync outcome to record.
#[derive(Debug, Clone, Default)]
pub struct NouLog<'a> {
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<&'a str>,
    pub google_event_id: Option<&'a str>,
    pub status: &'a str,
    pub error_message: Option<&'a str>,
    pub sync_direction: Option<&'a str>,
}

pub fn insert(entry: &NouLog<'_>) -> Built {
    Query::insert()
        .into_table(SyncLog::Table)
        .columns([
            SyncLog::Action,
            SyncLog::EntityType,
            SyncLog::EntityId,
            SyncLog::GoogleEventId,
            SyncLog::Status,
            SyncLog::ErrorMessage,
            SyncLog::SyncDirection,
        ])
        .values_panic([
            entry.action.into(),
            entry.entity_type.into(),
            entry.entity_id.map(str::to_string).into(),
            entry.google_event_id.map(str::to_string).into(),
            entry.status.into(),
            entry.error_message.map(str::to_string).into(),
            entry.sync_direction.map(str::to_string).into(),
        ])
        .build(PostgresQueryBuilder)
}

/// Most recent entries first.
pub fn recent(limit: u64) -> Built {
    Query::select()
        .columns([
            SyncLog::Id,
            SyncLog::Action,
            SyncLog::EntityType,
            SyncLog::EntityId,
            SyncLog::GoogleEventId,
            SyncLog::Status,
            SyncLog::ErrorMessage,
            SyncLog::SyncDirection,
            SyncLog::CreatedAt,
        ])
        .from(SyncLog::Table)
        .order_by(SyncLog::CreatedAt, Order::Desc)
        .limit(limit)
        .build(PostgresQueryBuilder)
}

/// Drop entries older than `days` days.
pub fn delete_older_than(days: i32) -> Built {
    Query::delete()
        .from_table(SyncLog::Table)
        .and_where(Expr::col(SyncLog::CreatedAt).lt(Expr::cust(format!("now() - interval '{days} days'"))))
        .build(PostgresQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_orders_newest_first() {
        let (sql, _) = recent(100);
        assert!(sql.contains(r#"ORDER BY "created_at" DESC"#));
    }

    #[test]
    fn cleanup_uses_day_interval() {
        let (sql, _) = delete_older_than(30);
        assert!(sql.contains("now() - interval '30 days'"));
    }

    #[test]
    fn insert_keeps_optional_fields() {
        let (_, values) = insert(&NouLog {
            action: "create",
            entity_type: "cita",
            status: "success",
            ..Default::default()
        });
        assert_eq!(values.0.len(), 7);
    }
}
