//! Database schema, migrations, and query builders (Postgres dialect).
//!
//! Simple CRUD is built with sea-query; joined report queries are plain SQL
//! constants with positional parameters.

pub mod alumnes;
pub mod cites;
pub mod config;
pub mod consolidacio;
pub mod cursos;
pub mod dades;
pub mod entrevistes;
pub mod horaris;
pub mod migrations;
pub mod plantilles;
pub mod sync_log;
pub mod tables;
pub mod tutors;
pub mod usuaris;

// Re-export tables for convenience
pub use tables::*;

/// A built statement: SQL text plus its bound values.
pub type Built = (String, sea_query::Values);
