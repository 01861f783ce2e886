//! Shared API types, business rules, and SQL builders for Entrevistes.
//!
//! This crate is the single source of truth for request/response shapes used
//! by the HTTP service and the maintenance CLI. SQL builders and row mapping
//! are only compiled with the `backend` feature.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod db;
pub mod service;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rol {
    Admin,
    #[default]
    Docent,
}

impl Rol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Docent => "docent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "docent" => Some(Self::Docent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Rol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrolment state of a student in a given year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EstatAlumne {
    #[default]
    Alta,
    Baixa,
    Migrat,
}

impl EstatAlumne {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alta => "alta",
            Self::Baixa => "baixa",
            Self::Migrat => "migrat",
        }
    }
}

/// Lifecycle of an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstatCita {
    Pendent,
    PendentAprovacio,
    Confirmada,
    Realitzada,
    Cancelada,
}

impl EstatCita {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendent => "pendent",
            Self::PendentAprovacio => "pendent_aprovacio",
            Self::Confirmada => "confirmada",
            Self::Realitzada => "realitzada",
            Self::Cancelada => "cancelada",
        }
    }
}

impl std::fmt::Display for EstatCita {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution state of a personal-data change request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstatSolicitud {
    Pendent,
    Aprovada,
    Rebutjada,
}

impl EstatSolicitud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendent => "pendent",
            Self::Aprovada => "aprovada",
            Self::Rebutjada => "rebutjada",
        }
    }
}

/// Kind of appointment notification sent by email.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TipusNotificacio {
    Nueva,
    Confirmada,
    Cancelada,
    Recordatorio,
    SolicitudAprobacion,
}

impl TipusNotificacio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nueva => "nueva",
            Self::Confirmada => "confirmada",
            Self::Cancelada => "cancelada",
            Self::Recordatorio => "recordatorio",
            Self::SolicitudAprobacion => "solicitud_aprobacion",
        }
    }
}

// ─── Health & Auth ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
    pub duration_ms: u128,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiveResponse {
    pub status: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct MetricsResponse {
    pub alumnes: i64,
    pub citas: i64,
    pub pendientes: i64,
    pub confirmadas: i64,
    pub entrevistas: i64,
    pub usuarios: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusResponse {
    pub disabled: bool,
    pub message: String,
    pub allowed_domain: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub email: String,
    pub role: Rol,
}

// ─── Usuaris ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Usuari {
    pub email: String,
    pub rol: String,
    pub nom: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertUsuariRequest {
    pub email: String,
    pub rol: Rol,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedAdminRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedAdminResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ─── Alumnes ────────────────────────────────────────────────────────────────

/// Student row as stored in an `Alumnes_<any>` sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlumneFull {
    pub alumne_id: String,
    pub nom: String,
    pub grup: String,
    pub any_curs: String,
    pub personal_id: String,
    pub estat: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlumnesQuery {
    pub any_curs: Option<String>,
    pub estat: Option<EstatAlumne>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlumneRequest {
    pub nom: String,
    pub grup: String,
    pub any_curs: String,
    pub personal_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAlumneRequest {
    pub grup: Option<String>,
    pub estat: Option<EstatAlumne>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlumneDetall {
    #[serde(flatten)]
    pub alumne: AlumneFull,
    pub dades_personals: DadesPersonalsResum,
    pub dades_familiars: DadesFamiliars,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DadesPersonalsResum {
    pub sexe: Option<String>,
    pub data_naixement: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct DadesFamiliars {
    pub tutors: Vec<ContacteFamiliar>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContacteFamiliar {
    pub nom: String,
    pub telefon: Option<String>,
    pub email: Option<String>,
}

/// Enrolled student as read from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct AlumneCurs {
    pub id: String,
    pub nom: String,
    pub grup: Option<String>,
    pub any_curs: String,
    pub estat: String,
}

// ─── Cursos & Grups ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Grup {
    pub grup_id: String,
    pub any_curs: String,
    pub curs: String,
    pub nom: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Curs {
    pub any: String,
    pub grups: Vec<Grup>,
}

#[derive(Debug, Deserialize)]
pub struct NouGrup {
    pub curs: String,
    pub nom: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCursRequest {
    pub any_curs: String,
    #[serde(default)]
    pub grups: Vec<NouGrup>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCursResponse {
    pub any_curs: String,
    pub grups_creats: usize,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlumneImportacio {
    pub nom: String,
    pub grup: String,
    pub personal_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportacioRequest {
    pub any_curs: String,
    pub alumnes: Vec<AlumneImportacio>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportacioResponse {
    pub importats: usize,
    pub duplicats: usize,
    pub sense_id: usize,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportacioResponse {
    pub any_curs: String,
    pub alumnes: Vec<AlumneCurs>,
    pub entrevistes: Vec<EntrevistaDetall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Recompte {
    pub clau: String,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstadistiquesResponse {
    pub any_curs: String,
    pub total_alumnes: i64,
    pub total_entrevistes: i64,
    pub total_grups: i64,
    pub per_mes: Vec<Recompte>,
    pub per_grup: Vec<Recompte>,
    pub alumnes_per_grup: Vec<Recompte>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct AlumneRecompte {
    pub alumne_id: String,
    pub nom: String,
    pub grup: Option<String>,
    pub total_entrevistes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct AlumneObservacio {
    pub alumne_id: String,
    pub nom: String,
    pub grup: Option<String>,
    pub acords: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlStats {
    pub total_alumnes: usize,
    pub amb_entrevistes: usize,
    pub sense_entrevistes: usize,
    pub alertes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlAlumnesResponse {
    pub top_alumnes: Vec<AlumneRecompte>,
    pub sense_entrevistes: Vec<AlumneRecompte>,
    pub alertes: Vec<AlumneObservacio>,
    pub estadistiques: ControlStats,
}

// ─── Tutors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignacioRequest {
    pub email: String,
    pub any_curs: String,
    pub grup: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Assignacio {
    pub email: String,
    pub any_curs: String,
    pub grup: String,
    pub grup_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImportRequest {
    pub csv_base64: String,
    pub any_curs: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportatsResponse {
    pub importats: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TutoriesImportResponse {
    pub importats: usize,
    pub ambigus: usize,
    pub errors: usize,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EliminatsResponse {
    pub eliminats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Tutoria {
    pub alumne_id: String,
    pub alumne_nom: String,
    pub tutor_email: String,
    pub any_curs: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsignarManualRequest {
    pub tutor_email: String,
    pub alumne_nom: String,
    pub any_curs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct TutorResum {
    pub tutor_email: String,
    pub total_alumnes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct AlumneTutorat {
    pub alumne_id: String,
    pub nom: String,
    pub grup: Option<String>,
    pub any_curs: String,
    pub total_entrevistes: i64,
}

// ─── Entrevistes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Entrevista {
    pub id: String,
    pub alumne_id: String,
    pub any_curs: String,
    pub data: String,
    pub acords: String,
    pub usuari_creador_id: String,
    pub cita_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct EntrevistaDetall {
    pub id: String,
    pub alumne_id: String,
    pub alumne_nom: String,
    pub grup: Option<String>,
    pub any_curs: String,
    pub data: String,
    pub acords: String,
    pub usuari_creador_id: String,
    pub cita_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrevistesQuery {
    pub alumne_id: Option<String>,
    pub any_curs: Option<String>,
    pub from_db: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntrevistaRequest {
    pub alumne_id: String,
    pub data: String,
    pub acords: String,
}

/// Interview created together with its level-spreadsheet row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NovaEntrevistaRequest {
    pub alumne_id: String,
    pub alumne_nom: Option<String>,
    pub grup: Option<String>,
    pub curs: Option<String>,
    pub data: String,
    pub acords: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEntrevistaRequest {
    pub data: Option<String>,
    pub acords: Option<String>,
}

/// One entry of a student's interview history, from either source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct HistorialEntry {
    pub id: String,
    pub alumne_id: String,
    pub alumne_nom: Option<String>,
    pub alumne_grup: Option<String>,
    pub tipo: String,
    pub data: String,
    pub acords: String,
    pub any_curs: String,
    pub origen: String,
    pub usuari_creador_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaginacioQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(rename = "anyCurs")]
    pub any_curs: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginacio {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntrevistesPaginades {
    #[serde(rename = "entrevistas")]
    pub entrevistes: Vec<HistorialEntry>,
    pub paginacion: Paginacio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct EntrevistaConsolidada {
    pub id: i32,
    pub alumne_id: Option<String>,
    pub alumne_nom: String,
    pub curso_origen: String,
    pub pestana_origen: String,
    pub data_entrevista: String,
    pub acords: String,
    pub any_curs: String,
    pub spreadsheet_id: Option<String>,
}

/// Interview row of an `Entrevistes_<any>` sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntrevistaSheet {
    pub id: Option<String>,
    pub alumne_id: Option<String>,
    pub any_curs: String,
    pub data: Option<String>,
    pub acords: Option<String>,
    pub usuari_creador_id: Option<String>,
}

/// A tab-scoped interview read directly from a spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntrevistaTab {
    pub id: Option<String>,
    pub alumne_id: String,
    pub any_curs: Option<String>,
    pub data: Option<String>,
    pub acords: Option<String>,
    pub usuari_creador_id: Option<String>,
    pub tab_name: String,
}

// ─── Cites ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Cita {
    pub id: String,
    pub alumne_id: Option<String>,
    pub tutor_email: String,
    pub any_curs: String,
    pub data_cita: DateTime<Utc>,
    pub durada_minuts: i32,
    pub nom_familia: String,
    pub email_familia: String,
    pub telefon_familia: String,
    pub estat: String,
    pub notes: Option<String>,
    pub google_event_id: Option<String>,
    pub google_event_url: Option<String>,
    pub reminder_sent: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cita {
    pub fn end(&self) -> DateTime<Utc> {
        self.data_cita + chrono::Duration::minutes(i64::from(self.durada_minuts))
    }
}

fn default_durada() -> i32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitaRequest {
    pub tutor_email: String,
    pub data_cita: DateTime<Utc>,
    #[serde(default = "default_durada")]
    pub durada_minuts: i32,
    pub nom_familia: String,
    pub email_familia: String,
    pub telefon_familia: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyCursQuery {
    pub any_curs: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmarCitaResponse {
    pub cita: Cita,
    pub entrevista: Entrevista,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CitaMessage {
    pub cita: Cita,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct HorarisQuery {
    pub fecha: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorariDisponible {
    pub hora: String,
    pub disponible: bool,
    pub fecha: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct HorariOcupat {
    pub data_cita: DateTime<Utc>,
    pub durada_minuts: i32,
}

/// An existing appointment of a tutor, checked against a new booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct CitaReservada {
    pub data_cita: DateTime<Utc>,
    pub durada_minuts: i32,
    pub estat: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HorarisResponse {
    pub tutor_email: String,
    pub fecha: NaiveDate,
    pub horarios_disponibles: Vec<HorariDisponible>,
    pub horarios_ocupados: Vec<HorariOcupat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaHorari {
    pub dia: String,
    pub inicio: String,
    pub fin: String,
    #[serde(default)]
    pub activo: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfigurarHorarisRequest {
    pub tutor_email: String,
    pub nombre: Option<String>,
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
    #[serde(default = "default_durada")]
    pub duracion_cita: i32,
    pub dias_semana: Vec<DiaHorari>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigurarHorarisResponse {
    pub message: String,
    pub total_horarios: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct HorariTutor {
    pub id: i32,
    pub tutor_email: String,
    pub dia_semana: String,
    pub hora_inicio: String,
    pub hora_fin: String,
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
    pub duracion_cita: i32,
    pub activo: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReservaRequest {
    #[serde(rename = "tutorEmail")]
    pub tutor_email: String,
    #[serde(rename = "alumneId")]
    pub alumne_id: String,
    pub fecha: NaiveDate,
    pub hora: String,
    #[serde(default = "default_durada")]
    pub durada_minuts: i32,
    pub nom_familia: String,
    pub email_familia: String,
    pub telefon_familia: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct AlumneContacte {
    pub alumne_id: String,
    pub nom: String,
    pub grup: Option<String>,
    pub tutor1_nom: Option<String>,
    pub tutor1_tel: Option<String>,
    pub tutor1_email: Option<String>,
    pub tutor2_nom: Option<String>,
    pub tutor2_tel: Option<String>,
    pub tutor2_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlumnesContacteResponse {
    pub alumnes: Vec<AlumneContacte>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CitesResponse {
    pub cites: Vec<Cita>,
    pub total: usize,
}

// ─── Public calendar ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CalendariPublic {
    pub tutor: Usuari,
    pub horaris: Vec<HorariTutor>,
    pub cites_pendents: Vec<Cita>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolicitarCitaRequest {
    pub tutor_email: String,
    pub familia_nombre: String,
    pub familia_email: String,
    #[serde(default)]
    pub familia_telefono: String,
    pub fecha: NaiveDate,
    pub hora: String,
    #[serde(default = "default_durada")]
    pub duracion: i32,
    #[serde(default)]
    pub notas: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolicitarCitaResponse {
    pub success: bool,
    pub message: String,
    pub cita_id: String,
    pub estado: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AprovarCitaRequest {
    pub cita_id: String,
    pub aprobar: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprovarCitaResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CitesPendentsResponse {
    pub citas: Vec<Cita>,
}

// ─── Calendar sync ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct SyncLogEntry {
    pub id: i32,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub google_event_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub sync_direction: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SyncLogResponse {
    pub total: usize,
    pub entries: Vec<SyncLogEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncAllResponse {
    pub success: usize,
    pub errors: usize,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

// ─── Dades personals ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct DadesPersonals {
    pub personal_id: String,
    pub alumne_email: Option<String>,
    pub sexe: Option<String>,
    pub data_naixement: Option<String>,
    pub municipi_naixement: Option<String>,
    pub nacionalitat: Option<String>,
    pub adreca: Option<String>,
    pub municipi_residencia: Option<String>,
    pub codi_postal: Option<String>,
    pub doc_identitat: Option<String>,
    pub tis: Option<String>,
    pub ralc: Option<String>,
    pub link_fotografia: Option<String>,
    pub tutor1_nom: Option<String>,
    pub tutor1_tel: Option<String>,
    pub tutor1_email: Option<String>,
    pub tutor2_nom: Option<String>,
    pub tutor2_tel: Option<String>,
    pub tutor2_email: Option<String>,
}

impl DadesPersonals {
    /// Family contacts with a name, in tutor order.
    pub fn contactes(&self) -> Vec<ContacteFamiliar> {
        [
            (&self.tutor1_nom, &self.tutor1_tel, &self.tutor1_email),
            (&self.tutor2_nom, &self.tutor2_tel, &self.tutor2_email),
        ]
        .into_iter()
        .filter_map(|(nom, tel, email)| {
            let nom = nom.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
            Some(ContacteFamiliar {
                nom: nom.to_string(),
                telefon: tel.clone(),
                email: email.clone(),
            })
        })
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct FitxaAlumne {
    pub alumne_id: String,
    pub nom: String,
    pub email: Option<String>,
    pub grup: Option<String>,
    pub tutor_email: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "backend", sqlx(flatten))]
    pub dades: DadesPersonals,
}

/// Interview as listed on a student's record card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct EntrevistaAlumne {
    pub id: String,
    pub data: String,
    pub acords: String,
    pub usuari_creador_id: String,
    pub created_at: DateTime<Utc>,
    pub tutor_email: Option<String>,
}

/// Row posted by the personal-data importer. A blank `personal_id` gets a
/// generated one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportDadesPersonalsRequest {
    pub alumne_nom: String,
    #[serde(flatten)]
    pub dades: DadesPersonals,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportDadesPersonalsResponse {
    pub personal_id: String,
    pub alumne_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct SolicitudCanvi {
    pub id: String,
    pub alumne_id: String,
    pub tutor_solicitant: String,
    pub camp_modificar: String,
    pub valor_actual: Option<String>,
    pub valor_nou: Option<String>,
    pub justificacio: String,
    pub estat: String,
    pub admin_responsable: Option<String>,
    pub data_resolucio: Option<DateTime<Utc>>,
    pub notes_admin: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSolicitudRequest {
    pub alumne_id: String,
    pub camp_modificar: String,
    pub valor_actual: Option<String>,
    pub valor_nou: Option<String>,
    pub justificacio: String,
}

#[derive(Debug, Deserialize)]
pub struct ResoldreSolicitudRequest {
    pub estat: EstatSolicitud,
    pub notes_admin: Option<String>,
}

// ─── Emails ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantillaEmail {
    pub id: String,
    pub nom: String,
    pub contingut: String,
    pub variables: Vec<String>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct PlantillaRow {
    pub id: String,
    pub nom: String,
    pub contingut: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlantillaRequest {
    pub nom: String,
    pub contingut: String,
    pub variables: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct EnviarMasiuRequest {
    pub tutor_email: String,
    pub alumne_ids: Vec<String>,
    pub plantilla_id: Option<String>,
    pub asunto: String,
    pub contingut: String,
    #[serde(default)]
    pub variables: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailEnviat {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub alumne: String,
    pub destinatario: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultatEnviament {
    pub alumne_id: String,
    pub alumne_nom: String,
    pub emails: usize,
    pub estat: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnviarMasiuResponse {
    pub message: String,
    pub total_alumnes: usize,
    pub total_emails: usize,
    pub resultats: Vec<ResultatEnviament>,
    pub emails_enviats: Vec<EmailEnviat>,
}

// ─── Sheets import & consolidation ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsImportRequest {
    pub spreadsheet_id: String,
    pub any_curs: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAlumnesResponse {
    pub alumnes: usize,
    pub matricules: usize,
    pub grups: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub to_create_alumnes: usize,
    pub to_create_enrolments: usize,
    pub to_update_enrolments: usize,
    pub to_create_groups: usize,
    pub alumnes: Vec<String>,
    pub enrolments: Vec<String>,
    pub updates: Vec<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEntrevistesResponse {
    pub importats: usize,
    pub ignorades: usize,
    pub tabs_processed: usize,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TabInfo {
    pub title: String,
    #[serde(rename = "sheetId")]
    pub sheet_id: i64,
    pub grid: GridInfo,
    pub rows: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GridInfo {
    pub rows: i64,
    pub cols: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResponse {
    pub spreadsheet_id: String,
    pub tabs: Vec<TabInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursConsolidacio {
    pub curs: String,
    pub spreadsheet_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfigRequest {
    pub any_actual: Option<String>,
    #[serde(default)]
    pub spreadsheets: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidarRequest {
    pub any_curs: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidacioResponse {
    pub any_curs: String,
    pub alumnes_processats: usize,
    pub entrevistes_consolidades: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct ConsolidacioLog {
    pub id: i32,
    pub any_curs: String,
    pub alumnes_processats: i32,
    pub entrevistes_consolidadas: i32,
    pub errors: i32,
    pub created_at: DateTime<Utc>,
}

// ─── Generic responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OnlyStatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageStatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdStatusResponse {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdStatusMessageResponse {
    pub id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

// ─── Service Error ──────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Each variant maps to an HTTP status code. The Axum server converts it
/// into `ApiErr` at the handler boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estat_cita_serializes_snake_case() {
        let json = serde_json::to_string(&EstatCita::PendentAprovacio).unwrap();
        assert_eq!(json, "\"pendent_aprovacio\"");
        assert_eq!(EstatCita::Confirmada.as_str(), "confirmada");
    }

    #[test]
    fn rol_parse_rejects_unknown() {
        assert_eq!(Rol::parse("admin"), Some(Rol::Admin));
        assert_eq!(Rol::parse("docent"), Some(Rol::Docent));
        assert_eq!(Rol::parse("root"), None);
    }

    #[test]
    fn cita_request_defaults_duration() {
        let req: CitaRequest = serde_json::from_value(serde_json::json!({
            "tutor_email": "t@insbitacola.cat",
            "data_cita": "2025-10-20T09:00:00Z",
            "nom_familia": "Garcia",
            "email_familia": "f@example.com",
            "telefon_familia": "600000000"
        }))
        .unwrap();
        assert_eq!(req.durada_minuts, 30);
        assert!(req.notes.is_none());
    }

    #[test]
    fn contactes_skips_blank_tutors() {
        let dades = DadesPersonals {
            tutor1_nom: Some("Anna".into()),
            tutor1_email: Some("anna@example.com".into()),
            tutor2_nom: Some("  ".into()),
            ..Default::default()
        };
        let contactes = dades.contactes();
        assert_eq!(contactes.len(), 1);
        assert_eq!(contactes[0].nom, "Anna");
    }

    #[test]
    fn service_error_status_codes() {
        assert_eq!(ServiceError::Conflict("x".into()).status_code(), 409);
        assert_eq!(ServiceError::Forbidden("x".into()).message(), "x");
    }
}
