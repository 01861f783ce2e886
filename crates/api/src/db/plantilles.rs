//! Stored email templates.

use sea_query::{Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::PlantillesEmail;

pub fn list() -> Built {
    Query::select()
        .columns([
            PlantillesEmail::Id,
            PlantillesEmail::Nom,
            PlantillesEmail::Contingut,
        ])
        .from(PlantillesEmail::Table)
        .order_by(PlantillesEmail::CreatedAt, Order::Asc)
        .build(PostgresQueryBuilder)
}

pub fn insert(id: &str, nom: &str, contingut: &str, created_by: &str) -> Built {
    Query::insert()
        .into_table(PlantillesEmail::Table)
        .columns([
            PlantillesEmail::Id,
            PlantillesEmail::Nom,
            PlantillesEmail::Assumpte,
            PlantillesEmail::Contingut,
            PlantillesEmail::CreatedBy,
        ])
        .values_panic([
            id.into(),
            nom.into(),
            nom.into(),
            contingut.into(),
            created_by.into(),
        ])
        .build(PostgresQueryBuilder)
}
