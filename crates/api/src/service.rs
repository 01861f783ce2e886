//! Shared business rules as framework-agnostic pure functions.
//!
//! Route handlers in the server and the maintenance CLI call these functions,
//! keeping handlers as thin adapters over storage and the Google APIs.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use rand::Rng;
use regex::Regex;

use crate::{CitaReservada, HorariDisponible, HorariOcupat, PlantillaEmail, ServiceError};

/// Fallback academic year when neither env nor config define one.
pub const DEFAULT_ANY_CURS: &str = "2025-2026";

/// First sheet column (0-based) holding interview (date, acords) pairs.
pub const INTERVIEW_PAIRS_START: usize = 6;

/// Step between generated appointment slots, in minutes.
pub const SLOT_MINUTES: i64 = 30;

// ─── Validation ─────────────────────────────────────────────────────────────

/// Validate and normalize an email address. Returns the lowercased, trimmed email.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(ServiceError::BadRequest("Email invàlid".into()));
    }
    Ok(email)
}

/// Whether `email` belongs to the institution domain.
pub fn email_in_domain(email: &str, domain: &str) -> bool {
    email.ends_with(&format!("@{domain}"))
}

/// Validate an academic year label (`2025-2026`, at least four characters).
pub fn validate_any_curs(any_curs: &str) -> Result<String, ServiceError> {
    let trimmed = any_curs.trim();
    if trimmed.chars().count() < 4 {
        return Err(ServiceError::BadRequest("Dades requerides incompletes".into()));
    }
    Ok(trimmed.to_string())
}

/// Require a non-blank field, returning it trimmed.
pub fn require_field<'a>(name: &str, value: &'a str) -> Result<&'a str, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest(format!("Camp requerit: {name}")));
    }
    Ok(trimmed)
}

/// Appointment duration must stay within 15–240 minutes.
/// Longest appointment accepted, in minutes.
pub const MAX_DURADA_MINUTS: i32 = 240;

pub fn validate_durada(minuts: i32) -> Result<i32, ServiceError> {
    if !(15..=MAX_DURADA_MINUTS).contains(&minuts) {
        return Err(ServiceError::BadRequest(
            "La durada ha de ser entre 15 i 240 minuts".into(),
        ));
    }
    Ok(minuts)
}

/// Change requests need a justification of at least ten characters.
pub fn validate_justificacio(text: &str) -> Result<String, ServiceError> {
    let trimmed = text.trim();
    if trimmed.chars().count() < 10 {
        return Err(ServiceError::BadRequest(
            "La justificació ha de tenir almenys 10 caràcters".into(),
        ));
    }
    Ok(trimmed.to_string())
}

// ─── Identifiers ────────────────────────────────────────────────────────────

fn random_base36(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// `<prefix>_<epoch ms>_<9 random base36 chars>`.
pub fn prefixed_id(prefix: &str) -> String {
    format!(
        "{prefix}_{}_{}",
        Utc::now().timestamp_millis(),
        random_base36(9)
    )
}

pub fn new_cita_id() -> String {
    prefixed_id("cita")
}

pub fn new_entrevista_id() -> String {
    prefixed_id("ent")
}

pub fn new_solicitud_id() -> String {
    prefixed_id("sol")
}

pub fn new_personal_id() -> String {
    prefixed_id("pf")
}

/// Event id handed out when the calendar runs without credentials.
pub fn new_simulated_event_id() -> String {
    prefixed_id("sim")
}

/// Opaque student id.
pub fn new_alumne_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Group identifier, unique per academic year.
pub fn grup_id(nom: &str, any_curs: &str) -> String {
    format!("{}_{}", nom.trim(), any_curs.trim())
}

/// Enrolment identifier, unique per academic year.
pub fn matricula_id(alumne_id: &str, any_curs: &str) -> String {
    format!("{alumne_id}_{any_curs}")
}

/// Level of a group label: the first word (`"1r A"` → `"1r"`).
pub fn curs_of_grup(grup: &str) -> String {
    grup.split_whitespace().next().unwrap_or_default().to_string()
}

static ESO_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-4][A-Z]{1,2}$").expect("static regex")
});

/// Whether a cell holds an ESO group code such as `1A` or `4BC`.
pub fn is_eso_group(value: &str) -> bool {
    ESO_GROUP.is_match(value.trim())
}

/// ESO level (`1r`..`4t`) of a group or level label such as `2B` or `3r`.
pub fn nivell_eso(label: &str) -> Option<&'static str> {
    match label.trim().chars().next()? {
        '1' => Some("1r"),
        '2' => Some("2n"),
        '3' => Some("3r"),
        '4' => Some("4t"),
        _ => None,
    }
}

/// A student listed on a level tab: name and, when recognised, group code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsoAlumne {
    pub nom: String,
    pub grup: Option<String>,
}

/// Group code with inner spaces removed (`"1 a"` → `"1A"`).
pub fn normalize_group(raw: &str) -> String {
    raw.split_whitespace().collect::<String>().to_uppercase()
}

fn looks_like_name(value: &str) -> bool {
    let v = value.trim();
    if v.chars().count() < 2 {
        return false;
    }
    let lower = v.to_lowercase();
    if matches!(lower.as_str(), "nom" | "nombre" | "alumne" | "alumno") {
        return false;
    }
    v.chars().any(char::is_alphabetic)
}

/// Read one `C:D` row of a level tab. Either column may hold the group; a
/// row with no usable name is skipped.
pub fn parse_eso_row(c: &str, d: &str) -> Option<EsoAlumne> {
    let (c, d) = (c.trim(), d.trim());
    if c.is_empty() && d.is_empty() {
        return None;
    }
    let (gc, gd) = (normalize_group(c), normalize_group(d));
    let (c_grp, d_grp) = (is_eso_group(&gc), is_eso_group(&gd));
    let either = |a: &str, b: &str| if a.is_empty() { b.to_string() } else { a.to_string() };

    let (nom, grup) = if d_grp && looks_like_name(c) {
        (c.to_string(), Some(gd))
    } else if c_grp && looks_like_name(d) {
        (d.to_string(), Some(gc))
    } else if d_grp {
        (either(c, d), Some(gd))
    } else if c_grp {
        (either(d, c), Some(gc))
    } else if looks_like_name(c) {
        (c.to_string(), None)
    } else if looks_like_name(d) {
        (d.to_string(), None)
    } else {
        (either(c, d), None)
    };
    (!nom.is_empty()).then(|| EsoAlumne {
        nom: normalize_name(&nom),
        grup,
    })
}

/// Map level shorthands (`1r`..`4t`) to the current year; other values pass through.
pub fn resolve_any_curs(value: &str, current: &str) -> String {
    match value.trim() {
        "1r" | "2n" | "3r" | "4t" => current.to_string(),
        other => other.to_string(),
    }
}

// ─── Names & sheet rows ─────────────────────────────────────────────────────

static COMMA_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("static regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Normalize a `Cognoms, Nom` student name for comparison and storage.
pub fn normalize_name(name: &str) -> String {
    let spaced = COMMA_SPACING.replace_all(name, ", ");
    WHITESPACE_RUN.replace_all(&spaced, " ").trim().to_string()
}

/// Case- and spacing-insensitive name comparison.
pub fn same_name(a: &str, b: &str) -> bool {
    normalize_name(a).to_lowercase() == normalize_name(b).to_lowercase()
}

/// Render the (date, acords) pairs of a student row as one text block.
pub fn interview_pairs(row: &[String]) -> String {
    row.iter()
        .skip(INTERVIEW_PAIRS_START)
        .collect::<Vec<_>>()
        .chunks(2)
        .filter_map(|pair| {
            let data = pair.first().map(|s| s.trim()).unwrap_or_default();
            let acords = pair.get(1).map(|s| s.trim()).unwrap_or_default();
            if data.is_empty() && acords.is_empty() {
                None
            } else {
                Some(format!("Data: {data}\nAcords: {acords}"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Column index of the first pair whose date cell is free.
pub fn first_free_pair(row: &[String]) -> usize {
    let mut col = INTERVIEW_PAIRS_START;
    while row.get(col).is_some_and(|cell| !cell.trim().is_empty()) {
        col += 2;
    }
    col
}

/// Spreadsheet column letters for a 1-based index (`1` → `A`, `27` → `AA`).
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Position of the first header matching any alias, ignoring case and spaces.
pub fn header_index(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().to_lowercase();
        aliases.iter().any(|a| h == *a)
    })
}

/// Map the rows under a header row into string records.
pub fn rows_to_records(values: &[Vec<String>]) -> Vec<HashMap<String, String>> {
    let Some((headers, rows)) = values.split_first() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

// ─── CSV ────────────────────────────────────────────────────────────────────

/// Records of a CSV document. Rows may differ in width; blank rows are
/// skipped.
pub fn read_csv_records(text: &str) -> Result<Vec<Vec<String>>, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ServiceError::BadRequest(format!("CSV invàlid: {e}")))?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

/// Fit a record wider than `expected`, whose name column held unquoted
/// commas.
///
/// The first field and the last `expected - 2` fields are taken as-is and
/// everything in between is joined back into the second field. Fields come
/// back trimmed.
pub fn fit_name_overflow(fields: &[String], expected: usize) -> Vec<String> {
    if fields.len() <= expected || expected < 2 {
        return fields.iter().map(|f| f.trim().to_string()).collect();
    }
    let split = fields.len() - (expected - 2);
    let mut out = Vec::with_capacity(expected);
    out.push(fields[0].trim().to_string());
    out.push(fields[1..split].join(",").trim().to_string());
    out.extend(fields[split..].iter().map(|f| f.trim().to_string()));
    out
}

/// How a tutorship CSV row identifies the student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlumneRef {
    /// Email, id, or a value that may also match the name.
    Clau(String),
    Nom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutoriaRow {
    pub any_curs: String,
    pub tutor_email: String,
    pub alumne: AlumneRef,
}

/// Parsed tutorship CSV: usable rows plus the count of unusable ones.
#[derive(Debug, Default)]
pub struct TutoriesCsv {
    pub rows: Vec<TutoriaRow>,
    pub errors: usize,
}

/// Parse a personal-tutorship CSV (`anyCurs`, `tutor_email` and one of
/// `alumne_email`/`alumne_mail`/`alumne_id`/`alumne_nom`).
///
/// With a `default_any`, the `anyCurs` column may be missing or blank and
/// level shorthands (`1r`..`4t`) resolve to that year.
pub fn parse_tutories_csv(text: &str, default_any: Option<&str>) -> Result<TutoriesCsv, ServiceError> {
    let records = read_csv_records(text)?;
    let Some((header, rows)) = records.split_first() else {
        return Err(ServiceError::BadRequest("CSV buit".into()));
    };
    if rows.is_empty() {
        return Err(ServiceError::BadRequest("CSV buit".into()));
    }
    let header: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    let i_any = header_index(&header, &["anycurs"]);
    let i_tutor = header_index(&header, &["tutor_email"]);
    let i_clau = ["alumne_email", "alumne_mail", "alumne_id"]
        .iter()
        .filter_map(|k| header_index(&header, &[k]))
        .max();
    let i_nom = header_index(&header, &["alumne_nom"]);

    let Some(i_tutor) = i_tutor else {
        return Err(missing_tutoria_headers());
    };
    if (i_any.is_none() && default_any.is_none()) || (i_clau.is_none() && i_nom.is_none()) {
        return Err(missing_tutoria_headers());
    }

    let mut parsed = TutoriesCsv::default();
    for row in rows {
        let cols = fit_name_overflow(row, header.len());
        if cols.len() < header.len() {
            continue;
        }
        let cell = i_any.map(|i| cols[i].as_str()).unwrap_or_default();
        let any_curs = match default_any {
            Some(default_any) if cell.is_empty() => default_any.to_string(),
            Some(default_any) => resolve_any_curs(cell, default_any),
            None => cell.to_string(),
        };
        let tutor_email = cols[i_tutor].to_lowercase();
        if any_curs.is_empty() || tutor_email.is_empty() {
            parsed.errors += 1;
            continue;
        }
        let clau = i_clau
            .map(|i| cols[i].to_lowercase())
            .filter(|s| !s.is_empty());
        let alumne = match clau {
            Some(clau) => AlumneRef::Clau(clau),
            None => match i_nom.map(|i| cols[i].as_str()).filter(|s| !s.is_empty()) {
                Some(nom) => AlumneRef::Nom(nom.to_string()),
                None => {
                    parsed.errors += 1;
                    continue;
                }
            },
        };
        parsed.rows.push(TutoriaRow {
            any_curs,
            tutor_email,
            alumne,
        });
    }
    Ok(parsed)
}

fn missing_tutoria_headers() -> ServiceError {
    ServiceError::BadRequest(
        "Capçaleres requerides: anyCurs,tutor_email,(alumne_email|alumne_mail|alumne_id|alumne_nom)"
            .into(),
    )
}

/// One row of the group-assignment CSV (`curs`, `grup`, `tutor_mail`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignacioRow {
    pub any_curs: String,
    pub grup: String,
    pub email: String,
}

pub fn parse_assignacions_csv(text: &str) -> Result<Vec<AssignacioRow>, ServiceError> {
    let records = read_csv_records(text)?;
    let Some((header, rows)) = records.split_first() else {
        return Err(ServiceError::BadRequest("CSV buit".into()));
    };
    if rows.is_empty() {
        return Err(ServiceError::BadRequest("CSV buit".into()));
    }
    let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let (Some(i_curs), Some(i_grup), Some(i_mail)) = (
        header_index(&header, &["curs"]),
        header_index(&header, &["grup"]),
        header_index(&header, &["tutor_mail", "tutor_email"]),
    ) else {
        return Err(ServiceError::BadRequest(
            "Capçaleres requerides: curs,grup,tutor_mail".into(),
        ));
    };
    Ok(rows
        .iter()
        .filter_map(|cols| {
            let any_curs = cols.get(i_curs)?.trim().to_string();
            let grup = cols.get(i_grup)?.trim().to_string();
            let email = cols.get(i_mail)?.trim().to_lowercase();
            if any_curs.is_empty() || grup.is_empty() || email.is_empty() {
                return None;
            }
            Some(AssignacioRow {
                any_curs,
                grup,
                email,
            })
        })
        .collect())
}

// ─── Observations & templates ───────────────────────────────────────────────

const ALERT_KEYWORDS: &[&str] = &[
    "psi",
    "nese",
    "tipus a",
    "tipus b",
    "atenció especial",
    "necessitats especials",
    "necesitats especials",
];

/// Whether interview notes flag the student for special attention.
pub fn is_alert(observacions: &str) -> bool {
    let lower = observacions.to_lowercase();
    ALERT_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// SQL `LIKE` patterns matching [`is_alert`] keywords.
pub fn alert_like_patterns() -> Vec<String> {
    ALERT_KEYWORDS.iter().map(|k| format!("%{k}%")).collect()
}

/// Replace every `{{key}}` placeholder with its value.
pub fn render_template(text: &str, vars: &HashMap<String, String>) -> String {
    vars.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").expect("static regex"));

/// Distinct placeholder names, in order of first appearance.
pub fn template_variables(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in PLACEHOLDER.captures_iter(text) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Built-in email templates, always listed before stored ones.
pub fn default_plantilles() -> Vec<PlantillaEmail> {
    [
        (
            "plantilla_1",
            "Recordatori d'entrevista",
            "Hola {{nom_familia}},\n\nT'esperem a l'entrevista programada per {{data_entrevista}} a les {{hora_entrevista}}.\n\nSalutacions,\n{{tutor_nom}}",
        ),
        (
            "plantilla_2",
            "Informació acadèmica",
            "Hola {{nom_familia}},\n\nVolem informar-te sobre el progrés acadèmic de {{nom_alumne}}.\n\n{{contingut_personalitzat}}\n\nSalutacions,\n{{tutor_nom}}",
        ),
        (
            "plantilla_3",
            "Convocatòria reunió",
            "Hola {{nom_familia}},\n\nConvoquem a una reunió per {{motiu}} el {{data_reunio}} a les {{hora_reunio}}.\n\nLloc: {{lloc}}\n\nSalutacions,\n{{tutor_nom}}",
        ),
    ]
    .into_iter()
    .map(|(id, nom, contingut)| PlantillaEmail {
        id: id.to_string(),
        nom: nom.to_string(),
        contingut: contingut.to_string(),
        variables: template_variables(contingut),
    })
    .collect()
}

/// Description attached to a calendar event for an appointment.
pub fn cita_event_description(nom: &str, email: &str, telefon: &str, notes: Option<&str>) -> String {
    let mut text = format!("Cita programada amb {nom} ({email}).\nTelèfon: {telefon}");
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        text.push_str("\nNotes: ");
        text.push_str(notes);
    }
    text
}

/// Acords of the interview created when an appointment is confirmed.
pub fn cita_entrevista_acords(nom: &str, telefon: &str, notes: Option<&str>) -> String {
    let mut text = format!("Entrevista programada amb {nom}. Telèfon: {telefon}.");
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        text.push_str(" Notes: ");
        text.push_str(notes);
    }
    text
}

// ─── Scheduling ─────────────────────────────────────────────────────────────

/// Values accepted by `horarios_tutor.dia_semana`.
pub const DIES_SETMANA: [&str; 7] = ["domingo", "lunes", "martes", "miercoles", "jueves", "viernes", "sabado"];

/// Weekday name as stored in `horarios_tutor.dia_semana`.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Sun => "domingo",
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miercoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sabado",
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_hora(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Interpret a wall-clock date and time in `tz`.
pub fn local_datetime<Tz: TimeZone>(tz: &Tz, fecha: NaiveDate, hora: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&fecha.and_time(hora))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Free slots of `step` minutes between `inicio` (inclusive) and `fin`
/// (exclusive) on `fecha`, skipping slots that start inside a booked interval.
pub fn generate_slots<Tz: TimeZone>(
    tz: &Tz,
    fecha: NaiveDate,
    inicio: NaiveTime,
    fin: NaiveTime,
    step: i64,
    ocupats: &[HorariOcupat],
) -> Vec<HorariDisponible> {
    let mut slots = Vec::new();
    if step <= 0 {
        return slots;
    }
    let mut hora = inicio;
    while hora < fin {
        if let Some(start) = local_datetime(tz, fecha, hora) {
            let taken = ocupats.iter().any(|o| {
                let end = o.data_cita + chrono::Duration::minutes(i64::from(o.durada_minuts));
                start >= o.data_cita && start < end
            });
            if !taken {
                slots.push(HorariDisponible {
                    hora: hora.format("%H:%M").to_string(),
                    disponible: true,
                    fecha,
                });
            }
        }
        let (next, wrapped) = hora.overflowing_add_signed(chrono::Duration::minutes(step));
        if wrapped != 0 {
            break;
        }
        hora = next;
    }
    slots
}

/// Appointment states that keep the tutor's slot taken.
pub const ESTATS_QUE_OCUPEN: [&str; 3] = ["pendent", "pendent_aprovacio", "confirmada"];

/// Whether `[start, start + durada_minuts)` overlaps an appointment that still
/// holds its slot. Intervals are half-open, so back-to-back slots are free.
pub fn solapa(start: DateTime<Utc>, durada_minuts: i32, reservades: &[CitaReservada]) -> bool {
    let end = start + chrono::Duration::minutes(i64::from(durada_minuts));
    reservades.iter().any(|r| {
        let r_end = r.data_cita + chrono::Duration::minutes(i64::from(r.durada_minuts));
        ESTATS_QUE_OCUPEN.contains(&r.estat.as_str()) && r.data_cita < end && r_end > start
    })
}

/// Whole minutes between two instants, rounded to the nearest minute.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let secs = (end - start).num_seconds();
    ((secs as f64) / 60.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email("  Anna.Puig@InsBitacola.cat ").unwrap(),
            "anna.puig@insbitacola.cat"
        );
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@insbitacola.cat").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    #[test]
    fn test_email_in_domain() {
        assert!(email_in_domain("a@insbitacola.cat", "insbitacola.cat"));
        assert!(!email_in_domain("a@evil-insbitacola.cat", "insbitacola.cat"));
    }

    #[test]
    fn test_validators() {
        assert!(validate_any_curs("2025-2026").is_ok());
        assert!(validate_any_curs("25").is_err());
        assert!(validate_durada(15).is_ok());
        assert!(validate_durada(240).is_ok());
        assert!(validate_durada(10).is_err());
        assert!(validate_durada(300).is_err());
        assert!(validate_justificacio("massa curt").is_ok());
        assert!(validate_justificacio("curt").is_err());
        assert!(require_field("nom", "   ").is_err());
    }

    #[test]
    fn prefixed_ids_have_expected_shape() {
        let id = new_cita_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "cita");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(new_entrevista_id().starts_with("ent_"));
        assert!(new_solicitud_id().starts_with("sol_"));
        assert_ne!(new_cita_id(), new_cita_id());
    }

    #[test]
    fn group_helpers() {
        assert_eq!(grup_id("1A", "2025-2026"), "1A_2025-2026");
        assert_eq!(matricula_id("abc", "2025-2026"), "abc_2025-2026");
        assert_eq!(curs_of_grup("1r A"), "1r");
        assert_eq!(curs_of_grup(""), "");
        assert!(is_eso_group("1A"));
        assert!(is_eso_group("4BC"));
        assert!(!is_eso_group("5A"));
        assert!(!is_eso_group("1a"));
        assert_eq!(resolve_any_curs("3r", "2025-2026"), "2025-2026");
        assert_eq!(resolve_any_curs("2024-2025", "2025-2026"), "2024-2025");
        assert_eq!(nivell_eso("2B"), Some("2n"));
        assert_eq!(nivell_eso("4t"), Some("4t"));
        assert_eq!(nivell_eso("Batx"), None);
    }

    #[test]
    fn eso_rows_find_name_and_group_in_either_column() {
        let row = |nom: &str, grup: Option<&str>| {
            Some(EsoAlumne {
                nom: nom.into(),
                grup: grup.map(Into::into),
            })
        };
        assert_eq!(parse_eso_row("Puig,  Anna", "1 a"), row("Puig, Anna", Some("1A")));
        assert_eq!(parse_eso_row("2B", "Vila, Pere"), row("Vila, Pere", Some("2B")));
        assert_eq!(parse_eso_row("Serra, Laia", "Batx"), row("Serra, Laia", None));
        assert_eq!(parse_eso_row("", "3C"), row("3C", Some("3C")));
        assert_eq!(parse_eso_row("  ", ""), None);
    }

    #[test]
    fn header_cells_are_not_names() {
        assert_eq!(parse_eso_row("Nom", "Grup").unwrap().nom, "Grup");
        assert_eq!(normalize_group(" 4 bc "), "4BC");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Puig   Soler ,Anna "), "Puig Soler, Anna");
        assert!(same_name("PUIG, anna", "Puig ,  Anna"));
    }

    #[test]
    fn interview_pairs_skip_empty_pairs() {
        let r = row(&[
            "", "1A", "Puig, Anna", "", "", "", "2024-10-01", "Bé", "", "", "2024-11-02", "Millora",
        ]);
        assert_eq!(
            interview_pairs(&r),
            "Data: 2024-10-01\nAcords: Bé\n---\nData: 2024-11-02\nAcords: Millora"
        );
        assert_eq!(interview_pairs(&row(&["a", "b"])), "");
    }

    #[test]
    fn first_free_pair_finds_gap() {
        assert_eq!(first_free_pair(&row(&["", "", "", "", "", ""])), 6);
        let r = row(&["", "", "", "", "", "", "2024-10-01", "x", "2024-11-01", "y"]);
        assert_eq!(first_free_pair(&r), 10);
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_header_index() {
        let headers = row(&["ID", "AlumneId", " Data ", "Acords"]);
        assert_eq!(header_index(&headers, &["alumneid", "alumne_id"]), Some(1));
        assert_eq!(header_index(&headers, &["data", "fecha"]), Some(2));
        assert_eq!(header_index(&headers, &["autor"]), None);
    }

    #[test]
    fn test_rows_to_records() {
        let values = vec![row(&["id", "nom"]), row(&["1", "Anna"]), row(&["2"])];
        let records = rows_to_records(&values);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["nom"], "Anna");
        assert_eq!(records[1]["nom"], "");
    }

    #[test]
    fn csv_records_keep_escaped_quotes() {
        let records = read_csv_records("2025-2026,\"Puig \"\"Pep\"\", Anna\",t@x.cat\r\n\r\n,,\na,,b\n").unwrap();
        assert_eq!(
            records,
            vec![
                vec!["2025-2026".to_string(), "Puig \"Pep\", Anna".into(), "t@x.cat".into()],
                vec!["a".to_string(), "".into(), "b".into()],
            ]
        );
    }

    #[test]
    fn name_overflow_joins_middle_columns() {
        let fields: Vec<String> = ["2025-2026", "Puig", " Anna", "anna@x.cat", " t@x.cat"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            fit_name_overflow(&fields, 4),
            vec!["2025-2026", "Puig, Anna", "anna@x.cat", "t@x.cat"]
        );
        assert_eq!(fit_name_overflow(&fields[..2], 4), vec!["2025-2026", "Puig"]);
    }

    #[test]
    fn tutories_csv_prefers_key_column() {
        let csv = "anyCurs,alumne_nom,alumne_mail,tutor_email\n\
                   2025-2026,Puig, Anna,anna@x.cat,Tutor@X.cat\n\
                   2025-2026,Soler,,t2@x.cat\n\
                   ,Ningú,,t3@x.cat\n";
        let parsed = parse_tutories_csv(csv, None).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].alumne, AlumneRef::Clau("anna@x.cat".into()));
        assert_eq!(parsed.rows[0].tutor_email, "tutor@x.cat");
        assert_eq!(parsed.rows[1].alumne, AlumneRef::Nom("Soler".into()));
        assert_eq!(parsed.errors, 1);
    }

    #[test]
    fn tutories_csv_requires_headers() {
        assert!(parse_tutories_csv("anyCurs,tutor_email\n", None).is_err());
        let err = parse_tutories_csv("anyCurs,foo\n2025-2026,x\n", None).unwrap_err();
        assert!(err.message().starts_with("Capçaleres requerides"));
        let err = parse_tutories_csv("tutor_email,alumne_nom\nt@x.cat,Anna\n", None).unwrap_err();
        assert!(err.message().starts_with("Capçaleres requerides"));
    }

    #[test]
    fn tutories_csv_quoted_names_keep_their_quotes() {
        let csv = "anyCurs,alumne_nom,tutor_email\n2025-2026,\"Puig \"\"Pep\"\", Anna\",t@x.cat\n";
        let parsed = parse_tutories_csv(csv, None).unwrap();
        assert_eq!(parsed.rows[0].alumne, AlumneRef::Nom("Puig \"Pep\", Anna".into()));
    }

    #[test]
    fn tutories_csv_falls_back_to_the_given_year() {
        let csv = "anyCurs,alumne_nom,tutor_email\n\
                   ,Soler,t1@x.cat\n\
                   2n,Puig,t2@x.cat\n\
                   2024-2025,Vila,t3@x.cat\n";
        let parsed = parse_tutories_csv(csv, Some("2025-2026")).unwrap();
        let anys: Vec<&str> = parsed.rows.iter().map(|r| r.any_curs.as_str()).collect();
        assert_eq!(anys, ["2025-2026", "2025-2026", "2024-2025"]);
        assert_eq!(parsed.errors, 0);

        let sense_columna = parse_tutories_csv("tutor_email,alumne_nom\nt@x.cat,Anna\n", Some("2025-2026")).unwrap();
        assert_eq!(sense_columna.rows[0].any_curs, "2025-2026");
    }

    #[test]
    fn assignacions_csv_skips_incomplete_rows() {
        let csv = "curs,grup,tutor_mail\r\n2025-2026,1A,Anna@x.cat\r\n2025-2026,,b@x.cat\r\n";
        let rows = parse_assignacions_csv(csv).unwrap();
        assert_eq!(
            rows,
            vec![AssignacioRow {
                any_curs: "2025-2026".into(),
                grup: "1A".into(),
                email: "anna@x.cat".into(),
            }]
        );
    }

    fn reservada(h: u32, m: u32, durada_minuts: i32, estat: &str) -> CitaReservada {
        CitaReservada {
            data_cita: Utc.with_ymd_and_hms(2025, 11, 3, h, m, 0).unwrap(),
            durada_minuts,
            estat: estat.into(),
        }
    }

    #[test]
    fn back_to_back_slots_do_not_overlap() {
        let at = |h, m| Utc.with_ymd_and_hms(2025, 11, 3, h, m, 0).unwrap();
        let ocupada = [reservada(15, 0, 30, "confirmada")];
        assert!(!solapa(at(14, 30), 30, &ocupada));
        assert!(!solapa(at(15, 30), 30, &ocupada));
        assert!(solapa(at(14, 45), 30, &ocupada));
        assert!(solapa(at(15, 29), 15, &ocupada));
        assert!(solapa(at(14, 0), 120, &ocupada));
    }

    #[test]
    fn only_active_appointments_hold_a_slot() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 15, 0, 0).unwrap();
        for estat in ["cancelada", "realitzada"] {
            assert!(!solapa(start, 30, &[reservada(15, 0, 30, estat)]), "{estat}");
        }
        for estat in ESTATS_QUE_OCUPEN {
            assert!(solapa(start, 30, &[reservada(15, 0, 30, estat)]), "{estat}");
        }
        assert!(!solapa(start, 30, &[]));
    }

    #[test]
    fn test_is_alert() {
        assert!(is_alert("Seguiment PSI setmanal"));
        assert!(is_alert("Alumne NESE"));
        assert!(is_alert("Requereix atenció especial"));
        assert!(!is_alert("Tot correcte"));
        assert!(alert_like_patterns().contains(&"%psi%".to_string()));
    }

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("nom_alumne".to_string(), "Anna".to_string());
        vars.insert("tutor_nom".to_string(), "Joan".to_string());
        assert_eq!(
            render_template("Hola {{nom_alumne}}, {{tutor_nom}} i {{nom_alumne}} {{altres}}", &vars),
            "Hola Anna, Joan i Anna {{altres}}"
        );
        assert_eq!(
            template_variables("{{a}} {{ b }} {{a}}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn default_plantilles_list_their_variables() {
        let plantilles = default_plantilles();
        assert_eq!(plantilles.len(), 3);
        assert_eq!(
            plantilles[0].variables,
            vec!["nom_familia", "data_entrevista", "hora_entrevista", "tutor_nom"]
        );
        assert_eq!(plantilles[2].variables.len(), 6);
    }

    #[test]
    fn cita_texts() {
        assert_eq!(
            cita_event_description("Garcia", "g@x.cat", "600", None),
            "Cita programada amb Garcia (g@x.cat).\nTelèfon: 600"
        );
        assert!(cita_event_description("G", "g@x.cat", "600", Some("Porta")).ends_with("\nNotes: Porta"));
        assert!(cita_entrevista_acords("G", "600", Some("x")).contains("Notes: x"));
    }

    #[test]
    fn test_weekday_name() {
        let monday = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        assert_eq!(weekday_name(monday), "lunes");
        assert_eq!(weekday_name(monday.pred_opt().unwrap()), "domingo");
    }

    #[test]
    fn slots_skip_booked_intervals() {
        let fecha = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        let booked = HorariOcupat {
            data_cita: Utc.with_ymd_and_hms(2025, 10, 20, 9, 30, 0).unwrap(),
            durada_minuts: 45,
        };
        let slots = generate_slots(
            &Utc,
            fecha,
            parse_hora("09:00").unwrap(),
            parse_hora("11:00").unwrap(),
            SLOT_MINUTES,
            &[booked],
        );
        let horas: Vec<&str> = slots.iter().map(|s| s.hora.as_str()).collect();
        assert_eq!(horas, vec!["09:00", "10:30"]);
        assert!(slots.iter().all(|s| s.disponible && s.fecha == fecha));
    }

    #[test]
    fn slots_empty_when_window_closed() {
        let fecha = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        let t = parse_hora("10:00:00").unwrap();
        assert!(generate_slots(&Utc, fecha, t, t, SLOT_MINUTES, &[]).is_empty());
    }

    #[test]
    fn test_duration_minutes() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 9, 44, 40).unwrap();
        assert_eq!(duration_minutes(start, end), 45);
    }
}
