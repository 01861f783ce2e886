//! Canonical migration definitions, applied in order by the server.

/// A named migration: `(name, sql)`.
pub type Migration = (&'static str, &'static str);

pub const MIGRATIONS: &[Migration] = &[
    (
        "0001_schema",
        include_str!("../../migrations/0001_schema.sql"),
    ),
    (
        "0002_cites_sync",
        include_str!("../../migrations/0002_cites_sync.sql"),
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn schema_creates_core_tables() {
        let all: String = MIGRATIONS.iter().map(|(_, sql)| *sql).collect();
        for table in [
            "usuaris",
            "alumnes_curs",
            "tutories_alumne",
            "cites_calendari",
            "horarios_tutor",
            "sync_log",
            "pf",
        ] {
            assert!(
                all.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }
}
