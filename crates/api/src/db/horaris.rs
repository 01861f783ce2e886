//! Weekly availability windows of tutors (`horarios_tutor`).

use sea_query::{Expr, Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::HorariosTutor;
use crate::DiaHorari;

const COLUMNS: [HorariosTutor; 9] = [
    HorariosTutor::Id,
    HorariosTutor::TutorEmail,
    HorariosTutor::DiaSemana,
    HorariosTutor::HoraInicio,
    HorariosTutor::HoraFin,
    HorariosTutor::FechaInicio,
    HorariosTutor::FechaFin,
    HorariosTutor::DuracionCita,
    HorariosTutor::Activo,
];

/// First active window of a tutor for a weekday.
pub fn active_for_day(tutor_email: &str, dia_semana: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(HorariosTutor::Table)
        .and_where(Expr::col(HorariosTutor::TutorEmail).eq(tutor_email))
        .and_where(Expr::col(HorariosTutor::DiaSemana).eq(dia_semana))
        .and_where(Expr::col(HorariosTutor::Activo).eq(true))
        .order_by(HorariosTutor::HoraInicio, Order::Asc)
        .limit(1)
        .build(PostgresQueryBuilder)
}

pub fn list_active(tutor_email: &str) -> Built {
    Query::select()
        .columns(COLUMNS)
        .from(HorariosTutor::Table)
        .and_where(Expr::col(HorariosTutor::TutorEmail).eq(tutor_email))
        .and_where(Expr::col(HorariosTutor::Activo).eq(true))
        .order_by(HorariosTutor::Id, Order::Asc)
        .build(PostgresQueryBuilder)
}

pub fn delete_for_tutor(tutor_email: &str) -> Built {
    Query::delete()
        .from_table(HorariosTutor::Table)
        .and_where(Expr::col(HorariosTutor::TutorEmail).eq(tutor_email))
        .build(PostgresQueryBuilder)
}

pub fn insert(
    tutor_email: &str,
    dia: &DiaHorari,
    fecha_inicio: Option<chrono::NaiveDate>,
    fecha_fin: Option<chrono::NaiveDate>,
    duracion_cita: i32,
) -> Built {
    Query::insert()
        .into_table(HorariosTutor::Table)
        .columns([
            HorariosTutor::TutorEmail,
            HorariosTutor::DiaSemana,
            HorariosTutor::HoraInicio,
            HorariosTutor::HoraFin,
            HorariosTutor::FechaInicio,
            HorariosTutor::FechaFin,
            HorariosTutor::DuracionCita,
            HorariosTutor::Activo,
        ])
        .values_panic([
            tutor_email.into(),
            dia.dia.as_str().into(),
            dia.inicio.as_str().into(),
            dia.fin.as_str().into(),
            fecha_inicio.into(),
            fecha_fin.into(),
            duracion_cita.into(),
            true.into(),
        ])
        .build(PostgresQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_for_day_filters_weekday() {
        let (sql, values) = active_for_day("t@insbitacola.cat", "lunes");
        assert!(sql.contains(r#""dia_semana" = $2"#));
        assert!(sql.contains(r#""activo" = $3"#));
        assert_eq!(values.0.len(), 4);
    }
}
