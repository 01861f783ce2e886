//! Teacher group assignments and personal tutorships.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::{AssignacionsDocentGrup, TutoriesAlumne};

// ── Group assignments ──────────────────────────────────────────────────────

pub fn insert_assignacio(email: &str, grup_id: &str, any_curs: &str) -> Built {
    Query::insert()
        .into_table(AssignacionsDocentGrup::Table)
        .columns([
            AssignacionsDocentGrup::UserEmail,
            AssignacionsDocentGrup::GrupId,
            AssignacionsDocentGrup::AnyCurs,
        ])
        .values_panic([email.into(), grup_id.into(), any_curs.into()])
        .on_conflict(
            OnConflict::columns([
                AssignacionsDocentGrup::UserEmail,
                AssignacionsDocentGrup::GrupId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

pub fn delete_assignacio(email: &str, grup_id: &str) -> Built {
    Query::delete()
        .from_table(AssignacionsDocentGrup::Table)
        .and_where(Expr::col(AssignacionsDocentGrup::UserEmail).eq(email))
        .and_where(Expr::col(AssignacionsDocentGrup::GrupId).eq(grup_id))
        .build(PostgresQueryBuilder)
}

pub const LIST_ASSIGNACIONS: &str = "\
SELECT adg.user_email AS email, adg.any_curs, g.nom AS grup, adg.grup_id
FROM assignacions_docent_grup adg
JOIN grups g ON g.grup_id = adg.grup_id
ORDER BY adg.any_curs DESC, g.nom, adg.user_email";

/// Names of the groups assigned to teacher `$1` in year `$2`.
pub const GRUPS_ASSIGNATS: &str = "\
SELECT g.nom
FROM assignacions_docent_grup adg
JOIN grups g ON g.grup_id = adg.grup_id
WHERE adg.user_email = $1 AND adg.any_curs = $2
ORDER BY g.nom";

// ── Personal tutorships ────────────────────────────────────────────────────

/// Assign or reassign the personal tutor of a student for a year.
pub fn upsert_tutoria(alumne_id: &str, tutor_email: &str, any_curs: &str) -> Built {
    Query::insert()
        .into_table(TutoriesAlumne::Table)
        .columns([
            TutoriesAlumne::AlumneId,
            TutoriesAlumne::TutorEmail,
            TutoriesAlumne::AnyCurs,
        ])
        .values_panic([alumne_id.into(), tutor_email.into(), any_curs.into()])
        .on_conflict(
            OnConflict::columns([TutoriesAlumne::AlumneId, TutoriesAlumne::AnyCurs])
                .update_column(TutoriesAlumne::TutorEmail)
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

pub fn delete_tutories(any_curs: &str) -> Built {
    Query::delete()
        .from_table(TutoriesAlumne::Table)
        .and_where(Expr::col(TutoriesAlumne::AnyCurs).eq(any_curs))
        .build(PostgresQueryBuilder)
}

/// Whether `tutor_email` is the personal tutor of the student in any year.
pub fn is_tutor(alumne_id: &str, tutor_email: &str) -> Built {
    Query::select()
        .column(TutoriesAlumne::Id)
        .from(TutoriesAlumne::Table)
        .and_where(Expr::col(TutoriesAlumne::AlumneId).eq(alumne_id))
        .and_where(Expr::col(TutoriesAlumne::TutorEmail).eq(tutor_email))
        .limit(1)
        .build(PostgresQueryBuilder)
}

/// Whether `$2` is the personal tutor of student `$1` in year `$3`.
pub const ES_TUTOR: &str = "\
SELECT EXISTS (
  SELECT 1 FROM tutories_alumne
  WHERE alumne_id = $1 AND tutor_email = $2 AND any_curs = $3
)";

pub const LIST_TUTORIES: &str = "\
SELECT t.alumne_id, a.nom AS alumne_nom, t.tutor_email, t.any_curs
FROM tutories_alumne t
JOIN alumnes a ON a.alumne_id = t.alumne_id
WHERE t.any_curs = $1
ORDER BY t.tutor_email, a.nom";

pub const RESUM_TUTORS: &str = "\
SELECT tutor_email, COUNT(*) AS total_alumnes
FROM tutories_alumne
WHERE any_curs = $1
GROUP BY tutor_email
ORDER BY tutor_email";

/// Tutees of `$1` in year `$2` with their interview counts.
pub const ALUMNES_DEL_TUTOR: &str = "\
SELECT a.alumne_id, a.nom, g.nom AS grup, t.any_curs, COUNT(e.id) AS total_entrevistes
FROM tutories_alumne t
JOIN alumnes a ON a.alumne_id = t.alumne_id
LEFT JOIN alumnes_curs ac ON ac.alumne_id = t.alumne_id AND ac.any_curs = t.any_curs
LEFT JOIN grups g ON g.grup_id = ac.grup_id
LEFT JOIN entrevistes e ON e.alumne_id = t.alumne_id
WHERE t.tutor_email = $1 AND t.any_curs = $2
GROUP BY a.alumne_id, a.nom, g.nom, t.any_curs
ORDER BY a.nom";

/// Tutees of `$1` in year `$2` with their family contacts.
pub const CONTACTES_DEL_TUTOR: &str = "\
SELECT a.alumne_id, a.nom, g.nom AS grup,
       p.tutor1_nom, p.tutor1_tel, p.tutor1_email,
       p.tutor2_nom, p.tutor2_tel, p.tutor2_email
FROM tutories_alumne t
JOIN alumnes a ON a.alumne_id = t.alumne_id
LEFT JOIN alumnes_curs ac ON ac.alumne_id = t.alumne_id AND ac.any_curs = t.any_curs
LEFT JOIN grups g ON g.grup_id = ac.grup_id
LEFT JOIN pf p ON p.personal_id = a.personal_id
WHERE t.tutor_email = $1 AND t.any_curs = $2
ORDER BY a.nom";

/// Family contacts of the students in `$1` (a text array), with their
/// group in year `$2`.
pub const CONTACTES_PER_IDS: &str = "\
SELECT a.alumne_id, a.nom, g.nom AS grup,
       p.tutor1_nom, p.tutor1_tel, p.tutor1_email,
       p.tutor2_nom, p.tutor2_tel, p.tutor2_email
FROM alumnes a
LEFT JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id AND ac.any_curs = $2
LEFT JOIN grups g ON g.grup_id = ac.grup_id
LEFT JOIN pf p ON p.personal_id = a.personal_id
WHERE a.alumne_id = ANY($1)
ORDER BY a.nom";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_tutoria_reassigns_tutor() {
        let (sql, _) = upsert_tutoria("abc", "t@insbitacola.cat", "2025-2026");
        assert!(sql.contains(
            r#"ON CONFLICT ("alumne_id", "any_curs") DO UPDATE SET "tutor_email" = "excluded"."tutor_email""#
        ));
    }

    #[test]
    fn is_tutor_limits_to_one_row() {
        let (sql, values) = is_tutor("abc", "t@insbitacola.cat");
        assert!(sql.ends_with("LIMIT $3"));
        assert_eq!(values.0.len(), 3);
    }
}
