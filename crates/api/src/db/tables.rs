//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Usuaris {
    Table,
    Email,
    Rol,
    Nom,
    CreatedAt,
}

#[derive(Iden)]
pub enum Config {
    Table,
    Clau,
    Valor,
}

#[derive(Iden)]
pub enum Cursos {
    Table,
    AnyCurs,
}

#[derive(Iden)]
pub enum Grups {
    Table,
    GrupId,
    AnyCurs,
    Curs,
    Nom,
}

#[derive(Iden)]
pub enum Alumnes {
    Table,
    AlumneId,
    Nom,
    Email,
    PersonalId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum AlumnesCurs {
    Table,
    Id,
    AlumneId,
    AnyCurs,
    GrupId,
    Estat,
}

#[derive(Iden)]
pub enum AssignacionsDocentGrup {
    Table,
    UserEmail,
    GrupId,
    AnyCurs,
}

#[derive(Iden)]
pub enum TutoriesAlumne {
    Table,
    Id,
    AlumneId,
    TutorEmail,
    AnyCurs,
}

#[derive(Iden)]
pub enum Entrevistes {
    Table,
    Id,
    AlumneId,
    AnyCurs,
    Data,
    Acords,
    UsuariCreadorId,
    CitaId,
    CreatedAt,
}

#[derive(Iden)]
pub enum EntrevistesConsolidadas {
    Table,
    Id,
    AlumneId,
    AlumneNom,
    CursoOrigen,
    PestanaOrigen,
    DataEntrevista,
    Acords,
    AnyCurs,
    SpreadsheetId,
    CreatedAt,
}

#[derive(Iden)]
pub enum ConsolidacionLogs {
    Table,
    Id,
    AnyCurs,
    AlumnesProcessats,
    EntrevistesConsolidadas,
    Errors,
    Detalls,
    CreatedAt,
}

#[derive(Iden)]
pub enum CitesCalendari {
    Table,
    Id,
    AlumneId,
    TutorEmail,
    AnyCurs,
    DataCita,
    DuradaMinuts,
    NomFamilia,
    EmailFamilia,
    TelefonFamilia,
    Estat,
    Notes,
    GoogleEventId,
    GoogleEventUrl,
    ReminderSent,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Pf {
    Table,
    PersonalId,
    AlumneEmail,
    Sexe,
    DataNaixement,
    MunicipiNaixement,
    Nacionalitat,
    Adreca,
    MunicipiResidencia,
    CodiPostal,
    DocIdentitat,
    Tis,
    Ralc,
    LinkFotografia,
    #[iden = "tutor1_nom"]
    Tutor1Nom,
    #[iden = "tutor1_tel"]
    Tutor1Tel,
    #[iden = "tutor1_email"]
    Tutor1Email,
    #[iden = "tutor2_nom"]
    Tutor2Nom,
    #[iden = "tutor2_tel"]
    Tutor2Tel,
    #[iden = "tutor2_email"]
    Tutor2Email,
    UpdatedAt,
}

#[derive(Iden)]
pub enum HorariosTutor {
    Table,
    Id,
    TutorEmail,
    DiaSemana,
    HoraInicio,
    HoraFin,
    FechaInicio,
    FechaFin,
    DuracionCita,
    Activo,
}

#[derive(Iden)]
pub enum SolicitutsCanviDades {
    Table,
    Id,
    AlumneId,
    TutorSolicitant,
    CampModificar,
    ValorActual,
    ValorNou,
    Justificacio,
    Estat,
    AdminResponsable,
    DataResolucio,
    NotesAdmin,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum PlantillesEmail {
    Table,
    Id,
    Nom,
    Assumpte,
    Contingut,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
pub enum SyncLog {
    Table,
    Id,
    Action,
    EntityType,
    EntityId,
    GoogleEventId,
    Status,
    ErrorMessage,
    SyncDirection,
    CreatedAt,
}
