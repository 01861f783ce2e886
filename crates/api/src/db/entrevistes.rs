//! Interview records, live and consolidated.

use sea_query::{Expr, InsertStatement, OnConflict, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::Entrevistes;
use crate::Entrevista;

const COLUMNS: [Entrevistes; 7] = [
    Entrevistes::Id,
    Entrevistes::AlumneId,
    Entrevistes::AnyCurs,
    Entrevistes::Data,
    Entrevistes::Acords,
    Entrevistes::UsuariCreadorId,
    Entrevistes::CitaId,
];

fn insert_stmt(e: &Entrevista) -> InsertStatement {
    Query::insert()
        .into_table(Entrevistes::Table)
        .columns(COLUMNS)
        .values_panic([
            e.id.as_str().into(),
            e.alumne_id.as_str().into(),
            e.any_curs.as_str().into(),
            e.data.as_str().into(),
            e.acords.as_str().into(),
            e.usuari_creador_id.as_str().into(),
            e.cita_id.clone().into(),
        ])
        .to_owned()
}

pub fn insert(e: &Entrevista) -> Built {
    insert_stmt(e).build(PostgresQueryBuilder)
}

/// Insert or refresh an imported interview keyed by its deterministic id.
pub fn upsert_imported(e: &Entrevista) -> Built {
    insert_stmt(e)
        .on_conflict(
            OnConflict::column(Entrevistes::Id)
                .update_columns([Entrevistes::Data, Entrevistes::Acords])
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

pub fn get(id: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(Entrevistes::Table)
        .and_where(Expr::col(Entrevistes::Id).eq(id))
        .build(PostgresQueryBuilder)
}

/// Update date and/or acords; `None` leaves the column unchanged.
pub fn update(id: &str, data: Option<&str>, acords: Option<&str>) -> Built {
    let mut q = Query::update();
    q.table(Entrevistes::Table);
    if let Some(data) = data {
        q.value(Entrevistes::Data, data);
    }
    if let Some(acords) = acords {
        q.value(Entrevistes::Acords, acords);
    }
    q.and_where(Expr::col(Entrevistes::Id).eq(id))
        .build(PostgresQueryBuilder)
}

pub fn delete(id: &str) -> Built {
    Query::delete()
        .from_table(Entrevistes::Table)
        .and_where(Expr::col(Entrevistes::Id).eq(id))
        .build(PostgresQueryBuilder)
}

/// Interviews with student name and group, optionally filtered by
/// student (`$1`) and year (`$2`), newest first.
pub const LIST_DETALL: &str = "\
SELECT e.id, e.alumne_id, COALESCE(a.nom, '') AS alumne_nom, g.nom AS grup,
       e.any_curs, e.data, e.acords, e.usuari_creador_id, e.cita_id
FROM entrevistes e
LEFT JOIN alumnes a ON a.alumne_id = e.alumne_id
LEFT JOIN alumnes_curs ac ON ac.alumne_id = e.alumne_id AND ac.any_curs = e.any_curs
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE ($1::text IS NULL OR e.alumne_id = $1)
  AND ($2::text IS NULL OR e.any_curs = $2)
ORDER BY e.data DESC, e.created_at DESC";

/// One interview with student name and group.
pub const DETALL: &str = "\
SELECT e.id, e.alumne_id, COALESCE(a.nom, '') AS alumne_nom, g.nom AS grup,
       e.any_curs, e.data, e.acords, e.usuari_creador_id, e.cita_id
FROM entrevistes e
LEFT JOIN alumnes a ON a.alumne_id = e.alumne_id
LEFT JOIN alumnes_curs ac ON ac.alumne_id = e.alumne_id AND ac.any_curs = e.any_curs
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE e.id = $1";

/// Live and consolidated interviews as one history, newest first.
/// `$1` student and `$2` year filter when not null; `$3` limit (null for
/// all) and `$4` offset.
pub const HISTORIAL: &str = "\
SELECT * FROM (
  SELECT e.id, e.alumne_id, a.nom AS alumne_nom, g.nom AS alumne_grup,
         'normal' AS tipo, e.data, e.acords, e.any_curs,
         'Sistema actual' AS origen, e.usuari_creador_id
  FROM entrevistes e
  LEFT JOIN alumnes a ON a.alumne_id = e.alumne_id
  LEFT JOIN alumnes_curs ac ON ac.alumne_id = e.alumne_id AND ac.any_curs = e.any_curs
  LEFT JOIN grups g ON g.grup_id = ac.grup_id
  WHERE ($1::text IS NULL OR e.alumne_id = $1)
    AND ($2::text IS NULL OR e.any_curs = $2)
  UNION ALL
  SELECT ec.id::text, COALESCE(ec.alumne_id, ''), COALESCE(a.nom, ec.alumne_nom), g.nom,
         'consolidada', ec.data_entrevista, ec.acords, ec.any_curs,
         ec.curso_origen || ' - ' || ec.pestana_origen, NULL
  FROM entrevistes_consolidadas ec
  LEFT JOIN alumnes a ON a.alumne_id = ec.alumne_id
  LEFT JOIN alumnes_curs ac ON ac.alumne_id = ec.alumne_id AND ac.any_curs = ec.any_curs
  LEFT JOIN grups g ON g.grup_id = ac.grup_id
  WHERE ($1::text IS NULL OR ec.alumne_id = $1)
    AND ($2::text IS NULL OR ec.any_curs = $2)
) h
ORDER BY data DESC, id DESC
LIMIT $3 OFFSET $4";

/// Size of [`HISTORIAL`] for year `$1` (null for all), without paging.
pub const COUNT_HISTORIAL: &str = "\
SELECT (SELECT COUNT(*) FROM entrevistes WHERE $1::text IS NULL OR any_curs = $1)
     + (SELECT COUNT(*) FROM entrevistes_consolidadas WHERE $1::text IS NULL OR any_curs = $1)";

/// Name, group and level of student `$1` in year `$2`, used to find the
/// student's row in the level spreadsheet.
pub const SHEET_LOCATOR: &str = "\
SELECT a.nom, g.nom AS grup, g.curs
FROM alumnes a
JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id
JOIN grups g ON g.grup_id = ac.grup_id
WHERE a.alumne_id = $1 AND ac.any_curs = $2";

/// Consolidated interviews, optionally filtered by student (`$1`) and year (`$2`).
pub const LIST_CONSOLIDADES: &str = "\
SELECT id, alumne_id, alumne_nom, curso_origen, pestana_origen,
       data_entrevista, acords, any_curs, spreadsheet_id
FROM entrevistes_consolidadas
WHERE ($1::text IS NULL OR alumne_id = $1)
  AND ($2::text IS NULL OR any_curs = $2)
ORDER BY data_entrevista DESC, id DESC";

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entrevista {
        Entrevista {
            id: "ent_1_abc".into(),
            alumne_id: "abc".into(),
            any_curs: "2025-2026".into(),
            data: "2025-10-20".into(),
            acords: "Seguiment".into(),
            usuari_creador_id: "t@insbitacola.cat".into(),
            cita_id: None,
        }
    }

    #[test]
    fn update_only_sets_given_columns() {
        let (sql, values) = update("ent_1", None, Some("Nou acord"));
        assert_eq!(
            sql,
            r#"UPDATE "entrevistes" SET "acords" = $1 WHERE "id" = $2"#
        );
        assert_eq!(values.0.len(), 2);
    }

    #[test]
    fn upsert_imported_refreshes_text() {
        let (sql, values) = upsert_imported(&sample());
        assert!(sql.contains(r#"ON CONFLICT ("id") DO UPDATE"#));
        assert_eq!(values.0.len(), 7);
    }
}
