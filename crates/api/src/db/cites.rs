//! Appointment (`cites_calendari`) query builders.

use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::CitesCalendari;
use crate::Cita;

const COLUMNS: [CitesCalendari; 16] = [
    CitesCalendari::Id,
    CitesCalendari::AlumneId,
    CitesCalendari::TutorEmail,
    CitesCalendari::AnyCurs,
    CitesCalendari::DataCita,
    CitesCalendari::DuradaMinuts,
    CitesCalendari::NomFamilia,
    CitesCalendari::EmailFamilia,
    CitesCalendari::TelefonFamilia,
    CitesCalendari::Estat,
    CitesCalendari::Notes,
    CitesCalendari::GoogleEventId,
    CitesCalendari::GoogleEventUrl,
    CitesCalendari::ReminderSent,
    CitesCalendari::CreatedAt,
    CitesCalendari::UpdatedAt,
];

/// Fields of a new appointment.
#[derive(Debug, Clone)]
pub struct NovaCita<'a> {
    pub id: &'a str,
    pub alumne_id: Option<&'a str>,
    pub tutor_email: &'a str,
    pub any_curs: &'a str,
    pub data_cita: DateTime<Utc>,
    pub durada_minuts: i32,
    pub nom_familia: &'a str,
    pub email_familia: &'a str,
    pub telefon_familia: &'a str,
    pub estat: &'a str,
    pub notes: Option<&'a str>,
}

pub fn insert(c: &NovaCita<'_>) -> Built {
    Query::insert()
        .into_table(CitesCalendari::Table)
        .columns([
            CitesCalendari::Id,
            CitesCalendari::AlumneId,
            CitesCalendari::TutorEmail,
            CitesCalendari::AnyCurs,
            CitesCalendari::DataCita,
            CitesCalendari::DuradaMinuts,
            CitesCalendari::NomFamilia,
            CitesCalendari::EmailFamilia,
            CitesCalendari::TelefonFamilia,
            CitesCalendari::Estat,
            CitesCalendari::Notes,
        ])
        .values_panic([
            c.id.into(),
            c.alumne_id.map(str::to_string).into(),
            c.tutor_email.into(),
            c.any_curs.into(),
            c.data_cita.into(),
            c.durada_minuts.into(),
            c.nom_familia.into(),
            c.email_familia.into(),
            c.telefon_familia.into(),
            c.estat.into(),
            c.notes.map(str::to_string).into(),
        ])
        .build(PostgresQueryBuilder)
}

// ── Lookups ────────────────────────────────────────────────────────────────

pub fn get(id: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::Id).eq(id))
        .build(PostgresQueryBuilder)
}

pub fn by_event(google_event_id: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::GoogleEventId).eq(google_event_id))
        .limit(1)
        .build(PostgresQueryBuilder)
}

/// Appointments of a student in a year, newest first.
pub fn list_by_alumne(alumne_id: &str, any_curs: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::AlumneId).eq(alumne_id))
        .and_where(Expr::col(CitesCalendari::AnyCurs).eq(any_curs))
        .order_by(CitesCalendari::DataCita, Order::Desc)
        .build(PostgresQueryBuilder)
}

/// Every appointment of a tutor, chronologically.
pub fn list_by_tutor(tutor_email: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::TutorEmail).eq(tutor_email))
        .order_by(CitesCalendari::DataCita, Order::Asc)
        .build(PostgresQueryBuilder)
}

/// Public requests still waiting for the tutor.
pub fn pending_approval(tutor_email: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::TutorEmail).eq(tutor_email))
        .and_where(Expr::col(CitesCalendari::Estat).eq("pendent_aprovacio"))
        .order_by(CitesCalendari::DataCita, Order::Asc)
        .build(PostgresQueryBuilder)
}

/// Booked intervals of a tutor starting in `[from, to)`.
pub fn ocupats(tutor_email: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Built {
    Query::select()
        .columns([CitesCalendari::DataCita, CitesCalendari::DuradaMinuts])
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::TutorEmail).eq(tutor_email))
        .and_where(Expr::col(CitesCalendari::Estat).is_in(["pendent", "confirmada"]))
        .and_where(Expr::col(CitesCalendari::DataCita).gte(from))
        .and_where(Expr::col(CitesCalendari::DataCita).lt(to))
        .order_by(CitesCalendari::DataCita, Order::Asc)
        .build(PostgresQueryBuilder)
}

/// Appointments of a tutor that could overlap `[start, end)`: starting
/// before `end`, and recently enough before `start` to still be running.
pub fn reservades_a_prop(tutor_email: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Built {
    let earliest = start - chrono::Duration::minutes(i64::from(crate::service::MAX_DURADA_MINUTS));
    Query::select()
        .columns([CitesCalendari::DataCita, CitesCalendari::DuradaMinuts, CitesCalendari::Estat])
        .from(CitesCalendari::Table)
        .and_where(Expr::col(CitesCalendari::TutorEmail).eq(tutor_email))
        .and_where(Expr::col(CitesCalendari::DataCita).lt(end))
        .and_where(Expr::col(CitesCalendari::DataCita).gt(earliest))
        .build(PostgresQueryBuilder)
}

/// Rows needing a push to Google: no event yet or touched in the last hour.
pub const PENDING_SYNC: &str = "\
SELECT * FROM cites_calendari
WHERE estat IN ('pendent', 'confirmada')
  AND (google_event_id IS NULL OR updated_at > now() - interval '1 hour')
ORDER BY data_cita";

/// Confirmed appointments in the next 24 hours without a reminder.
pub const REMINDERS_DUE: &str = "\
SELECT * FROM cites_calendari
WHERE estat = 'confirmada'
  AND data_cita BETWEEN now() AND now() + interval '24 hours'
  AND (reminder_sent IS NULL OR reminder_sent = false)
ORDER BY data_cita";

// ── Updates ────────────────────────────────────────────────────────────────

pub fn set_estat(id: &str, estat: &str) -> Built {
    Query::update()
        .table(CitesCalendari::Table)
        .value(CitesCalendari::Estat, estat)
        .and_where(Expr::col(CitesCalendari::Id).eq(id))
        .build(PostgresQueryBuilder)
}

pub fn set_event(id: &str, google_event_id: &str, google_event_url: &str) -> Built {
    Query::update()
        .table(CitesCalendari::Table)
        .value(CitesCalendari::GoogleEventId, google_event_id)
        .value(CitesCalendari::GoogleEventUrl, google_event_url)
        .and_where(Expr::col(CitesCalendari::Id).eq(id))
        .build(PostgresQueryBuilder)
}

/// Apply a time change made on the Google side.
pub fn update_schedule(id: &str, data_cita: DateTime<Utc>, durada_minuts: i32, notes: &str) -> Built {
    Query::update()
        .table(CitesCalendari::Table)
        .value(CitesCalendari::DataCita, data_cita)
        .value(CitesCalendari::DuradaMinuts, durada_minuts)
        .value(CitesCalendari::Notes, notes)
        .and_where(Expr::col(CitesCalendari::Id).eq(id))
        .build(PostgresQueryBuilder)
}

pub fn mark_reminder_sent(id: &str) -> Built {
    Query::update()
        .table(CitesCalendari::Table)
        .value(CitesCalendari::ReminderSent, true)
        .and_where(Expr::col(CitesCalendari::Id).eq(id))
        .build(PostgresQueryBuilder)
}

/// Suffix appended to notes changed from Google Calendar.
pub const GOOGLE_NOTE_SUFFIX: &str = "\n[Actualitzat des de Google Calendar]";

/// Notes after a Google-side change, with the suffix added once.
pub fn notes_from_google(cita: &Cita) -> String {
    let notes = cita.notes.clone().unwrap_or_default();
    if notes.ends_with(GOOGLE_NOTE_SUFFIX) {
        notes
    } else {
        format!("{notes}{GOOGLE_NOTE_SUFFIX}")
    }
}

/// Dashboard counters.
pub const METRICS: &str = "\
SELECT
  (SELECT COUNT(*) FROM alumnes) AS alumnes,
  (SELECT COUNT(*) FROM cites_calendari) AS citas,
  (SELECT COUNT(*) FROM cites_calendari WHERE estat IN ('pendent', 'pendent_aprovacio')) AS pendientes,
  (SELECT COUNT(*) FROM cites_calendari WHERE estat = 'confirmada') AS confirmadas,
  (SELECT COUNT(*) FROM entrevistes) AS entrevistas,
  (SELECT COUNT(*) FROM usuaris) AS usuarios";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ocupats_filters_active_states() {
        let from = Utc.with_ymd_and_hms(2025, 10, 20, 0, 0, 0).unwrap();
        let (sql, values) = ocupats("t@insbitacola.cat", from, from + chrono::Duration::days(1));
        assert!(sql.contains(r#""estat" IN ($2, $3)"#));
        assert!(sql.contains(r#""data_cita" >= $4"#));
        assert_eq!(values.0.len(), 5);
    }

    #[test]
    fn nearby_bookings_reach_back_the_longest_duration() {
        let start = Utc.with_ymd_and_hms(2025, 10, 20, 10, 0, 0).unwrap();
        let (sql, values) = reservades_a_prop("t@insbitacola.cat", start, start + chrono::Duration::minutes(30));
        assert!(sql.starts_with(r#"SELECT "data_cita", "durada_minuts", "estat" FROM "cites_calendari""#));
        assert!(sql.contains(r#""data_cita" < $2"#));
        assert!(sql.contains(r#""data_cita" > $3"#));
        assert_eq!(values.0.len(), 3);
        assert_eq!(
            values.0[2],
            sea_query::Value::from(Utc.with_ymd_and_hms(2025, 10, 20, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn insert_binds_every_column() {
        let cita = NovaCita {
            id: "cita_1_x",
            alumne_id: None,
            tutor_email: "t@insbitacola.cat",
            any_curs: "2025-2026",
            data_cita: Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap(),
            durada_minuts: 30,
            nom_familia: "Garcia",
            email_familia: "f@example.com",
            telefon_familia: "600",
            estat: "pendent",
            notes: None,
        };
        let (sql, values) = insert(&cita);
        assert!(sql.starts_with(r#"INSERT INTO "cites_calendari""#));
        assert_eq!(values.0.len(), 11);
    }

    #[test]
    fn google_suffix_added_once() {
        let mut cita = Cita {
            id: "c".into(),
            alumne_id: None,
            tutor_email: "t".into(),
            any_curs: "2025-2026".into(),
            data_cita: Utc::now(),
            durada_minuts: 30,
            nom_familia: "F".into(),
            email_familia: "f@x".into(),
            telefon_familia: "1".into(),
            estat: "confirmada".into(),
            notes: Some("Porta".into()),
            google_event_id: None,
            google_event_url: None,
            reminder_sent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let first = notes_from_google(&cita);
        assert_eq!(first, "Porta\n[Actualitzat des de Google Calendar]");
        cita.notes = Some(first.clone());
        assert_eq!(notes_from_google(&cita), first);
    }
}
