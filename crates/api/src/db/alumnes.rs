//! Students and yearly enrolments.

use sea_query::{Expr, Func, OnConflict, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::{Alumnes, AlumnesCurs};

// ── Writes ─────────────────────────────────────────────────────────────────

pub fn insert(alumne_id: &str, nom: &str, email: Option<&str>, personal_id: Option<&str>) -> Built {
    Query::insert()
        .into_table(Alumnes::Table)
        .columns([
            Alumnes::AlumneId,
            Alumnes::Nom,
            Alumnes::Email,
            Alumnes::PersonalId,
        ])
        .values_panic([
            alumne_id.into(),
            nom.into(),
            email.map(str::to_string).into(),
            personal_id.map(str::to_string).into(),
        ])
        .build(PostgresQueryBuilder)
}

/// Create or move an enrolment for `(alumne_id, any_curs)`.
pub fn upsert_enrolment(alumne_id: &str, any_curs: &str, grup_id: Option<&str>, estat: &str) -> Built {
    Query::insert()
        .into_table(AlumnesCurs::Table)
        .columns([
            AlumnesCurs::Id,
            AlumnesCurs::AlumneId,
            AlumnesCurs::AnyCurs,
            AlumnesCurs::GrupId,
            AlumnesCurs::Estat,
        ])
        .values_panic([
            crate::service::matricula_id(alumne_id, any_curs).into(),
            alumne_id.into(),
            any_curs.into(),
            grup_id.map(str::to_string).into(),
            estat.into(),
        ])
        .on_conflict(
            OnConflict::columns([AlumnesCurs::AlumneId, AlumnesCurs::AnyCurs])
                .update_columns([AlumnesCurs::GrupId, AlumnesCurs::Estat])
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

/// Link a student to a personal-data record.
pub fn set_personal_id(alumne_id: &str, personal_id: &str) -> Built {
    Query::update()
        .table(Alumnes::Table)
        .value(Alumnes::PersonalId, personal_id)
        .value(Alumnes::UpdatedAt, Expr::cust("now()"))
        .and_where(Expr::col(Alumnes::AlumneId).eq(alumne_id))
        .build(PostgresQueryBuilder)
}

pub fn delete(alumne_id: &str) -> Built {
    Query::delete()
        .from_table(Alumnes::Table)
        .and_where(Expr::col(Alumnes::AlumneId).eq(alumne_id))
        .build(PostgresQueryBuilder)
}

// ── Lookups ────────────────────────────────────────────────────────────────

pub fn get_nom(alumne_id: &str) -> Built {
    Query::select()
        .column(Alumnes::Nom)
        .from(Alumnes::Table)
        .and_where(Expr::col(Alumnes::AlumneId).eq(alumne_id))
        .build(PostgresQueryBuilder)
}

pub fn get_personal_id(alumne_id: &str) -> Built {
    Query::select()
        .column(Alumnes::PersonalId)
        .from(Alumnes::Table)
        .and_where(Expr::col(Alumnes::AlumneId).eq(alumne_id))
        .build(PostgresQueryBuilder)
}

/// Student ids whose email matches, case-insensitively.
pub fn ids_by_email(email: &str) -> Built {
    Query::select()
        .column(Alumnes::AlumneId)
        .from(Alumnes::Table)
        .and_where(Expr::expr(Func::lower(Expr::col(Alumnes::Email))).eq(email.to_lowercase()))
        .build(PostgresQueryBuilder)
}

/// Student ids whose name matches, case-insensitively.
pub fn ids_by_nom(nom: &str) -> Built {
    Query::select()
        .column(Alumnes::AlumneId)
        .from(Alumnes::Table)
        .and_where(Expr::expr(Func::lower(Expr::col(Alumnes::Nom))).eq(nom.to_lowercase()))
        .build(PostgresQueryBuilder)
}

/// Enrolment of a student in a year: `(grup_id, estat)`.
pub fn enrolment(alumne_id: &str, any_curs: &str) -> Built {
    Query::select()
        .columns([AlumnesCurs::GrupId, AlumnesCurs::Estat])
        .from(AlumnesCurs::Table)
        .and_where(Expr::col(AlumnesCurs::AlumneId).eq(alumne_id))
        .and_where(Expr::col(AlumnesCurs::AnyCurs).eq(any_curs))
        .build(PostgresQueryBuilder)
}

/// Students whose lower-cased name is in `$1`, with their enrolment in
/// year `$2` if any.
pub const MATCH_BY_NOMS: &str = "\
SELECT lower(a.nom) AS nom, ac.grup_id, ac.id IS NOT NULL AS enrolled
FROM alumnes a
LEFT JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id AND ac.any_curs = $2
WHERE lower(a.nom) = ANY($1)";

/// Enrolled students of a year as `AlumneCurs` rows.
pub const LIST_ANY: &str = "\
SELECT a.alumne_id AS id, a.nom, g.nom AS grup, ac.any_curs, ac.estat
FROM alumnes a
JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE ac.any_curs = $1
ORDER BY g.nom NULLS LAST, a.nom";

/// Students visible to teacher `$2`: assigned groups or personal tutorships.
pub const LIST_VISIBLE: &str = "\
SELECT a.alumne_id AS id, a.nom, g.nom AS grup, ac.any_curs, ac.estat
FROM alumnes a
JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id
LEFT JOIN grups g ON g.grup_id = ac.grup_id
WHERE ac.any_curs = $1
  AND (
    ac.grup_id IN (SELECT grup_id FROM assignacions_docent_grup WHERE user_email = $2)
    OR a.alumne_id IN (
      SELECT alumne_id FROM tutories_alumne WHERE tutor_email = $2 AND any_curs = $1
    )
  )
ORDER BY g.nom NULLS LAST, a.nom";

/// Students of year `$1` matched by email or id (`$2`) or by trimmed name (`$3`).
pub const RESOLVE_IN_YEAR: &str = "\
SELECT a.alumne_id
FROM alumnes a
JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id
WHERE ac.any_curs = $1
  AND (lower(a.email) = $2 OR a.alumne_id = $2 OR lower(trim(a.nom)) = lower(trim($3)))";

/// Whether a student with this name is already enrolled in group `$2`.
pub const EXISTS_NOM_GRUP: &str = "\
SELECT EXISTS (
  SELECT 1 FROM alumnes a
  JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id
  WHERE lower(trim(a.nom)) = lower(trim($1)) AND ac.grup_id = $2
)";

/// Whether teacher `$2` tutors or teaches student `$1` in year `$3`.
pub const DOCENT_CAN_ACCESS: &str = "\
SELECT EXISTS (
  SELECT 1 FROM tutories_alumne
  WHERE alumne_id = $1 AND tutor_email = $2 AND any_curs = $3
) OR EXISTS (
  SELECT 1 FROM alumnes_curs ac
  JOIN assignacions_docent_grup adg ON adg.grup_id = ac.grup_id
  WHERE ac.alumne_id = $1 AND ac.any_curs = $3 AND adg.user_email = $2
)";
