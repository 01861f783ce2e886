//! User and role query builders.

use sea_query::{Asterisk, Expr, Func, OnConflict, Order, PostgresQueryBuilder, Query};

use super::Built;
use super::tables::Usuaris;

// ── Lookups ────────────────────────────────────────────────────────────────

/// Role of a user (`rol`).
pub fn get_rol(email: &str) -> Built {
    Query::select()
        .column(Usuaris::Rol)
        .from(Usuaris::Table)
        .and_where(Expr::col(Usuaris::Email).eq(email))
        .build(PostgresQueryBuilder)
}

pub fn get(email: &str) -> Built {
    Query::select()
        .columns([Usuaris::Email, Usuaris::Rol, Usuaris::Nom])
        .from(Usuaris::Table)
        .and_where(Expr::col(Usuaris::Email).eq(email))
        .build(PostgresQueryBuilder)
}

/// All users ordered by email.
pub fn list() -> Built {
    Query::select()
        .columns([Usuaris::Email, Usuaris::Rol, Usuaris::Nom])
        .from(Usuaris::Table)
        .order_by(Usuaris::Email, Order::Asc)
        .build(PostgresQueryBuilder)
}

/// Number of admins.
pub fn count_admins() -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Usuaris::Table)
        .and_where(Expr::col(Usuaris::Rol).eq("admin"))
        .build(PostgresQueryBuilder)
}

// ── Writes ─────────────────────────────────────────────────────────────────

/// Insert a user or change the role of an existing one.
pub fn upsert(email: &str, rol: &str) -> Built {
    Query::insert()
        .into_table(Usuaris::Table)
        .columns([Usuaris::Email, Usuaris::Rol])
        .values_panic([email.into(), rol.into()])
        .on_conflict(
            OnConflict::column(Usuaris::Email)
                .update_column(Usuaris::Rol)
                .to_owned(),
        )
        .build(PostgresQueryBuilder)
}

/// Register a teacher if unknown, leaving existing roles untouched.
pub fn ensure_docent(email: &str) -> Built {
    Query::insert()
        .into_table(Usuaris::Table)
        .columns([Usuaris::Email, Usuaris::Rol])
        .values_panic([email.into(), "docent".into()])
        .on_conflict(OnConflict::column(Usuaris::Email).do_nothing().to_owned())
        .build(PostgresQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_rol_binds_email() {
        let (sql, values) = get_rol("a@insbitacola.cat");
        assert_eq!(sql, r#"SELECT "rol" FROM "usuaris" WHERE "email" = $1"#);
        assert_eq!(values.0.len(), 1);
    }

    #[test]
    fn upsert_updates_role_on_conflict() {
        let (sql, _) = upsert("a@insbitacola.cat", "admin");
        assert!(sql.starts_with(r#"INSERT INTO "usuaris" ("email", "rol")"#));
        assert!(sql.contains(r#"ON CONFLICT ("email") DO UPDATE SET "rol" = "excluded"."rol""#));
    }

    #[test]
    fn ensure_docent_does_nothing_on_conflict() {
        let (sql, _) = ensure_docent("a@insbitacola.cat");
        assert!(sql.ends_with(r#"ON CONFLICT ("email") DO NOTHING"#));
    }
}
