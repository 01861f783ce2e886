//! Academic years, groups, and year-level reports.

use sea_query::{Expr, OnConflict, Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::{
    Alumnes, AlumnesCurs, AssignacionsDocentGrup, Cursos, Entrevistes, Grups, TutoriesAlumne,
};

// ── Years & groups ─────────────────────────────────────────────────────────

pub fn list_cursos() -> Built {
    Query::select()
        .column(Cursos::AnyCurs)
        .from(Cursos::Table)
        .order_by(Cursos::AnyCurs, Order::Desc)
        .build(PostgresQueryBuilder)
}

pub fn list_grups() -> Built {
    Query::select()
        .columns([Grups::GrupId, Grups::AnyCurs, Grups::Curs, Grups::Nom])
        .from(Grups::Table)
        .order_by(Grups::Nom, Order::Asc)
        .build(PostgresQueryBuilder)
}

pub fn grups_of(any_curs: &str) -> Built {
    Query::select()
        .columns([Grups::GrupId, Grups::AnyCurs, Grups::Curs, Grups::Nom])
        .from(Grups::Table)
        .and_where(Expr::col(Grups::AnyCurs).eq(any_curs))
        .order_by(Grups::Nom, Order::Asc)
        .build(PostgresQueryBuilder)
}

pub fn insert_curs(any_curs: &str) -> Built {
    Query::insert()
        .into_table(Cursos::Table)
        .columns([Cursos::AnyCurs])
        .values_panic([any_curs.into()])
        .on_conflict(OnConflict::column(Cursos::AnyCurs).do_nothing().to_owned())
        .build(PostgresQueryBuilder)
}

pub fn upsert_grup(grup_id: &str, any_curs: &str, curs: &str, nom: &str) -> Built {
    Query::insert()
        .into_table(Grups::Table)
        .columns([Grups::GrupId, Grups::AnyCurs, Grups::Curs, Grups::Nom])
        .values_panic([grup_id.into(), any_curs.into(), curs.into(), nom.into()])
        .on_conflict(
            OnConflict::column(Grups::GrupId)
                .update_columns([Grups::Curs, Grups::Nom])
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

pub fn grup_exists(grup_id: &str) -> Built {
    Query::select()
        .column(Grups::GrupId)
        .from(Grups::Table)
        .and_where(Expr::col(Grups::GrupId).eq(grup_id))
        .build(PostgresQueryBuilder)
}

/// Statements removing one year's data, children first.
pub fn delete_year(any_curs: &str) -> Vec<Built> {
    vec![
        Query::delete()
            .from_table(Entrevistes::Table)
            .and_where(Expr::col(Entrevistes::AnyCurs).eq(any_curs))
            .build(PostgresQueryBuilder),
        Query::delete()
            .from_table(TutoriesAlumne::Table)
            .and_where(Expr::col(TutoriesAlumne::AnyCurs).eq(any_curs))
            .build(PostgresQueryBuilder),
        Query::delete()
            .from_table(AssignacionsDocentGrup::Table)
            .and_where(Expr::col(AssignacionsDocentGrup::AnyCurs).eq(any_curs))
            .build(PostgresQueryBuilder),
        Query::delete()
            .from_table(AlumnesCurs::Table)
            .and_where(Expr::col(AlumnesCurs::AnyCurs).eq(any_curs))
            .build(PostgresQueryBuilder),
        Query::delete()
            .from_table(Grups::Table)
            .and_where(Expr::col(Grups::AnyCurs).eq(any_curs))
            .build(PostgresQueryBuilder),
        Query::delete()
            .from_table(Cursos::Table)
            .and_where(Expr::col(Cursos::AnyCurs).eq(any_curs))
            .build(PostgresQueryBuilder),
    ]
}

/// Wipe all school data in foreign-key order, one statement each.
pub fn delete_all() -> Vec<Built> {
    vec![
        Query::delete().from_table(Entrevistes::Table).build(PostgresQueryBuilder),
        Query::delete().from_table(TutoriesAlumne::Table).build(PostgresQueryBuilder),
        Query::delete()
            .from_table(AssignacionsDocentGrup::Table)
            .build(PostgresQueryBuilder),
        Query::delete().from_table(AlumnesCurs::Table).build(PostgresQueryBuilder),
        Query::delete().from_table(Alumnes::Table).build(PostgresQueryBuilder),
        Query::delete().from_table(Grups::Table).build(PostgresQueryBuilder),
        Query::delete().from_table(Cursos::Table).build(PostgresQueryBuilder),
    ]
}

/// Years created by a fresh course initialization.
pub const INITIAL_CURSOS: &[&str] = &["2024-2025", "2025-2026"];

// ── Reports ────────────────────────────────────────────────────────────────

pub const COUNT_ALUMNES: &str = "SELECT COUNT(*) FROM alumnes_curs WHERE any_curs = $1";
pub const COUNT_ENTREVISTES: &str = "SELECT COUNT(*) FROM entrevistes WHERE any_curs = $1";
pub const COUNT_GRUPS: &str = "SELECT COUNT(*) FROM grups WHERE any_curs = $1";

/// Interviews per `YYYY-MM`.
pub const ENTREVISTES_PER_MES: &str = "\
SELECT LEFT(data, 7) AS clau, COUNT(*) AS total
FROM entrevistes
WHERE any_curs = $1 AND data <> ''
GROUP BY 1
ORDER BY 1";

pub const ENTREVISTES_PER_GRUP: &str = "\
SELECT COALESCE(g.nom, 'Sense grup') AS clau, COUNT(*) AS total
FROM entrevistes e
LEFT JOIN alumnes_curs ac ON ac.alumne_id = e.alumne_id AND ac.any_curs = e.any_curs
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE e.any_curs = $1
GROUP BY 1
ORDER BY 1";

pub const ALUMNES_PER_GRUP: &str = "\
SELECT COALESCE(g.nom, 'Sense grup') AS clau, COUNT(*) AS total
FROM alumnes_curs ac
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE ac.any_curs = $1
GROUP BY 1
ORDER BY 1";

/// Interview count per enrolled student, busiest first.
pub const RECOMPTE_PER_ALUMNE: &str = "\
SELECT a.alumne_id, a.nom, g.nom AS grup, COUNT(e.id) AS total_entrevistes
FROM alumnes_curs ac
JOIN alumnes a ON a.alumne_id = ac.alumne_id
LEFT JOIN grups g ON g.grup_id = ac.grup_id
LEFT JOIN entrevistes e ON e.alumne_id = ac.alumne_id AND e.any_curs = ac.any_curs
WHERE ac.any_curs = $1
GROUP BY a.alumne_id, a.nom, g.nom
ORDER BY total_entrevistes DESC, a.nom";

/// Interview notes of the year matching any of the `LIKE` patterns in `$2`.
pub const OBSERVACIONS_ALERTA: &str = "\
SELECT a.alumne_id, a.nom, g.nom AS grup, e.acords
FROM entrevistes e
JOIN alumnes a ON a.alumne_id = e.alumne_id
LEFT JOIN alumnes_curs ac ON ac.alumne_id = e.alumne_id AND ac.any_curs = e.any_curs
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE e.any_curs = $1 AND lower(e.acords) LIKE ANY($2)
ORDER BY a.nom, e.data DESC";
