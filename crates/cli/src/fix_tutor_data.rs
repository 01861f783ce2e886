use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use entrevistes_api::db::dades::{CONTACTES_DISTINTS, PERSONAL_IDS_AMB_ALUMNE, SET_CONTACTES};

/// Family contacts of one personal-data record.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Contactes {
    pub tutor1_nom: Option<String>,
    pub tutor1_tel: Option<String>,
    pub tutor1_email: Option<String>,
    pub tutor2_nom: Option<String>,
    pub tutor2_tel: Option<String>,
    pub tutor2_email: Option<String>,
}

/// Pair each record with a contact set, cycling through the sets.
pub fn assign<'a>(personal_ids: &'a [String], sets: &'a [Contactes]) -> Vec<(&'a str, &'a Contactes)> {
    if sets.is_empty() {
        return Vec::new();
    }
    personal_ids
        .iter()
        .zip(sets.iter().cycle())
        .map(|(id, set)| (id.as_str(), set))
        .collect()
}

/// Rewrite the family contacts of every student with personal data in one
/// transaction.
pub async fn run_fix(database_url: &str) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .context("connecting to the database")?;

    let sets: Vec<Contactes> = sqlx::query_as(CONTACTES_DISTINTS).fetch_all(&pool).await?;
    let personal_ids: Vec<String> = sqlx::query_scalar(PERSONAL_IDS_AMB_ALUMNE).fetch_all(&pool).await?;
    println!(
        "Students with personal data: {}  Distinct contact sets: {}",
        personal_ids.len(),
        sets.len()
    );
    if sets.is_empty() {
        println!("Nothing to do");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    let mut actualitzats = 0u64;
    for (personal_id, set) in assign(&personal_ids, &sets) {
        let done = sqlx::query(SET_CONTACTES)
            .bind(personal_id)
            .bind(&set.tutor1_nom)
            .bind(&set.tutor1_tel)
            .bind(&set.tutor1_email)
            .bind(&set.tutor2_nom)
            .bind(&set.tutor2_tel)
            .bind(&set.tutor2_email)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("updating {personal_id}"))?;
        actualitzats += done.rows_affected();
        tracing::debug!(personal_id, tutor1 = ?set.tutor1_nom, "contacts rewritten");
    }
    tx.commit().await?;
    println!("Updated: {actualitzats}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(nom: &str) -> Contactes {
        Contactes {
            tutor1_nom: Some(nom.into()),
            tutor1_tel: None,
            tutor1_email: Some(format!("{}@example.com", nom.to_lowercase())),
            tutor2_nom: None,
            tutor2_tel: None,
            tutor2_email: None,
        }
    }

    #[test]
    fn sets_are_cycled_over_students() {
        let ids: Vec<String> = ["pf_1", "pf_2", "pf_3"].iter().map(|s| s.to_string()).collect();
        let sets = [set("Maria"), set("Pere")];
        let got: Vec<_> = assign(&ids, &sets)
            .into_iter()
            .map(|(id, s)| (id, s.tutor1_nom.as_deref().unwrap()))
            .collect();
        assert_eq!(got, vec![("pf_1", "Maria"), ("pf_2", "Pere"), ("pf_3", "Maria")]);
        assert!(assign(&ids, &[]).is_empty());
    }
}
