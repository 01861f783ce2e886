//! Personal and family data (`pf`) and change requests.

use sea_query::{Expr, OnConflict, Order, PostgresQueryBuilder, Query, SimpleExpr};

use super::Built;
use super::tables::{Pf, SolicitutsCanviDades};
use crate::DadesPersonals;

const PF_DATA_COLUMNS: [Pf; 18] = [
    Pf::AlumneEmail,
    Pf::Sexe,
    Pf::DataNaixement,
    Pf::MunicipiNaixement,
    Pf::Nacionalitat,
    Pf::Adreca,
    Pf::MunicipiResidencia,
    Pf::CodiPostal,
    Pf::DocIdentitat,
    Pf::Tis,
    Pf::Ralc,
    Pf::LinkFotografia,
    Pf::Tutor1Nom,
    Pf::Tutor1Tel,
    Pf::Tutor1Email,
    Pf::Tutor2Nom,
    Pf::Tutor2Tel,
    Pf::Tutor2Email,
];

fn opt(value: &Option<String>) -> SimpleExpr {
    value.clone().into()
}

// ── Personal data ──────────────────────────────────────────────────────────

/// Insert or overwrite a personal-data record.
pub fn upsert_pf(d: &DadesPersonals) -> Built {
    let mut columns = vec![Pf::PersonalId];
    columns.extend(PF_DATA_COLUMNS);
    Query::insert()
        .into_table(Pf::Table)
        .columns(columns)
        .values_panic([
            d.personal_id.as_str().into(),
            opt(&d.alumne_email),
            opt(&d.sexe),
            opt(&d.data_naixement),
            opt(&d.municipi_naixement),
            opt(&d.nacionalitat),
            opt(&d.adreca),
            opt(&d.municipi_residencia),
            opt(&d.codi_postal),
            opt(&d.doc_identitat),
            opt(&d.tis),
            opt(&d.ralc),
            opt(&d.link_fotografia),
            opt(&d.tutor1_nom),
            opt(&d.tutor1_tel),
            opt(&d.tutor1_email),
            opt(&d.tutor2_nom),
            opt(&d.tutor2_tel),
            opt(&d.tutor2_email),
        ])
        .on_conflict(
            OnConflict::column(Pf::PersonalId)
                .update_columns(PF_DATA_COLUMNS)
                .value(Pf::UpdatedAt, Expr::cust("now()"))
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

pub fn get_pf(personal_id: &str) -> Built {
    let mut columns = vec![Pf::PersonalId];
    columns.extend(PF_DATA_COLUMNS);
    Query::select()
        .columns(columns)
        .from(Pf::Table)
        .and_where(Expr::col(Pf::PersonalId).eq(personal_id))
        .build(PostgresQueryBuilder)
}

pub fn delete_pf(personal_id: &str) -> Built {
    Query::delete()
        .from_table(Pf::Table)
        .and_where(Expr::col(Pf::PersonalId).eq(personal_id))
        .build(PostgresQueryBuilder)
}

const FITXA_SELECT: &str = "\
SELECT a.alumne_id, a.nom, a.email, g.nom AS grup, t.tutor_email,
       COALESCE(p.personal_id, a.personal_id, '') AS personal_id,
       p.alumne_email, p.sexe, p.data_naixement, p.municipi_naixement,
       p.nacionalitat, p.adreca, p.municipi_residencia, p.codi_postal,
       p.doc_identitat, p.tis, p.ralc, p.link_fotografia,
       p.tutor1_nom, p.tutor1_tel, p.tutor1_email,
       p.tutor2_nom, p.tutor2_tel, p.tutor2_email
FROM alumnes a
LEFT JOIN pf p ON p.personal_id = a.personal_id
LEFT JOIN alumnes_curs ac ON ac.alumne_id = a.alumne_id AND ac.any_curs = {ANY}
LEFT JOIN grups g ON g.grup_id = ac.grup_id
LEFT JOIN tutories_alumne t ON t.alumne_id = a.alumne_id AND t.any_curs = {ANY}";

/// Record card of student `$1` in year `$2`.
pub fn fitxa_sql() -> String {
    format!("{}\nWHERE a.alumne_id = $1", FITXA_SELECT.replace("{ANY}", "$2"))
}

/// Record cards of every student enrolled in year `$1`.
pub fn export_sql() -> String {
    format!(
        "{}\nWHERE ac.any_curs = $1\nORDER BY g.nom NULLS LAST, a.nom",
        FITXA_SELECT.replace("{ANY}", "$1")
    )
}

/// Interviews of student `$1` in year `$2` with the personal tutor of that
/// year. `$3` restricts to one tutor when not null.
pub const ENTREVISTES_ALUMNE: &str = "\
SELECT e.id, e.data, e.acords, e.usuari_creador_id, e.created_at, t.tutor_email
FROM entrevistes e
LEFT JOIN tutories_alumne t ON t.alumne_id = e.alumne_id AND t.any_curs = $2
WHERE e.alumne_id = $1 AND e.any_curs = $2
  AND ($3::text IS NULL OR t.tutor_email = $3)
ORDER BY e.data DESC, e.created_at DESC";

/// Header of the personal-data CSV export, in column order.
pub const EXPORT_HEADERS: &[&str] = &[
    "alumne_id",
    "nom",
    "email",
    "grup",
    "tutor_email",
    "personal_id",
    "sexe",
    "data_naixement",
    "municipi_naixement",
    "nacionalitat",
    "adreca",
    "municipi_residencia",
    "codi_postal",
    "doc_identitat",
    "tis",
    "ralc",
    "link_fotografia",
    "tutor1_nom",
    "tutor1_tel",
    "tutor1_email",
    "tutor2_nom",
    "tutor2_tel",
    "tutor2_email",
];

/// Distinct family-contact sets among students with personal data.
pub const CONTACTES_DISTINTS: &str = "\
SELECT DISTINCT p.tutor1_nom, p.tutor1_tel, p.tutor1_email,
       p.tutor2_nom, p.tutor2_tel, p.tutor2_email
FROM pf p
JOIN alumnes a ON a.personal_id = p.personal_id
WHERE p.tutor1_nom IS NOT NULL AND p.tutor1_nom <> ''
ORDER BY p.tutor1_nom";

/// Personal ids linked to a student, in name order.
pub const PERSONAL_IDS_AMB_ALUMNE: &str = "\
SELECT p.personal_id
FROM pf p
JOIN alumnes a ON a.personal_id = p.personal_id
ORDER BY a.nom";

/// Overwrite the family contacts of one record.
pub const SET_CONTACTES: &str = "\
UPDATE pf SET
  tutor1_nom = $2, tutor1_tel = $3, tutor1_email = $4,
  tutor2_nom = $5, tutor2_tel = $6, tutor2_email = $7,
  updated_at = now()
WHERE personal_id = $1";

// ── Change requests ────────────────────────────────────────────────────────

const SOLICITUD_COLUMNS: [SolicitutsCanviDades; 12] = [
    SolicitutsCanviDades::Id,
    SolicitutsCanviDades::AlumneId,
    SolicitutsCanviDades::TutorSolicitant,
    SolicitutsCanviDades::CampModificar,
    SolicitutsCanviDades::ValorActual,
    SolicitutsCanviDades::ValorNou,
    SolicitutsCanviDades::Justificacio,
    SolicitutsCanviDades::Estat,
    SolicitutsCanviDades::AdminResponsable,
    SolicitutsCanviDades::DataResolucio,
    SolicitutsCanviDades::NotesAdmin,
    SolicitutsCanviDades::CreatedAt,
];

pub fn insert_solicitud(
    id: &str,
    alumne_id: &str,
    tutor: &str,
    camp: &str,
    valor_actual: Option<&str>,
    valor_nou: Option<&str>,
    justificacio: &str,
) -> Built {
    Query::insert()
        .into_table(SolicitutsCanviDades::Table)
        .columns([
            SolicitutsCanviDades::Id,
            SolicitutsCanviDades::AlumneId,
            SolicitutsCanviDades::TutorSolicitant,
            SolicitutsCanviDades::CampModificar,
            SolicitutsCanviDades::ValorActual,
            SolicitutsCanviDades::ValorNou,
            SolicitutsCanviDades::Justificacio,
            SolicitutsCanviDades::Estat,
        ])
        .values_panic([
            id.into(),
            alumne_id.into(),
            tutor.into(),
            camp.into(),
            valor_actual.map(str::to_string).into(),
            valor_nou.map(str::to_string).into(),
            justificacio.into(),
            "pendent".into(),
        ])
        .build(PostgresQueryBuilder)
}

pub fn get_solicitud(id: &str) -> Built {
    Query::select()
        .columns(SOLICITUD_COLUMNS)
        .from(SolicitutsCanviDades::Table)
        .and_where(Expr::col(SolicitutsCanviDades::Id).eq(id))
        .build(PostgresQueryBuilder)
}

pub fn list_solicituds() -> Built {
    Query::select()
        .columns(SOLICITUD_COLUMNS)
        .from(SolicitutsCanviDades::Table)
        .order_by(SolicitutsCanviDades::CreatedAt, Order::Desc)
        .build(PostgresQueryBuilder)
}

pub fn resoldre_solicitud(id: &str, estat: &str, admin: &str, notes: Option<&str>) -> Built {
    Query::update()
        .table(SolicitutsCanviDades::Table)
        .value(SolicitutsCanviDades::Estat, estat)
        .value(SolicitutsCanviDades::AdminResponsable, admin)
        .value(SolicitutsCanviDades::DataResolucio, Expr::cust("now()"))
        .value(SolicitutsCanviDades::NotesAdmin, notes.map(str::to_string))
        .value(SolicitutsCanviDades::UpdatedAt, Expr::cust("now()"))
        .and_where(Expr::col(SolicitutsCanviDades::Id).eq(id))
        .build(PostgresQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_pf_touches_updated_at() {
        let dades = DadesPersonals {
            personal_id: "pf_1_x".into(),
            sexe: Some("D".into()),
            ..Default::default()
        };
        let (sql, values) = upsert_pf(&dades);
        assert!(sql.contains(r#"ON CONFLICT ("personal_id") DO UPDATE"#));
        assert!(sql.contains(r#""updated_at" = now()"#));
        assert_eq!(values.0.len(), 19);
    }

    #[test]
    fn fitxa_filters_by_student() {
        assert!(fitxa_sql().ends_with("WHERE a.alumne_id = $1"));
        assert!(fitxa_sql().contains("ac.any_curs = $2"));
        assert!(export_sql().contains("WHERE ac.any_curs = $1"));
        assert!(!export_sql().contains("$2"));
    }

    #[test]
    fn export_headers_match_fitxa_columns() {
        assert_eq!(EXPORT_HEADERS.len(), 23);
        assert_eq!(EXPORT_HEADERS[0], "alumne_id");
        assert_eq!(EXPORT_HEADERS[22], "tutor2_email");
    }
}
