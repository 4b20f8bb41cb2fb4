use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::sector::Sector;

/// The buying entity behind a tender. Names are de-duplicated on insertion;
/// `is_new` is set on creation and cleared at the start of every harvest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organism {
    pub id: Uuid,
    pub name: String,
    pub sector_id: Uuid,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
}

impl Organism {
    /// Resolves every name in `names` to an id, inserting any that don't yet
    /// exist under the default sector. Existing rows are left untouched.
    pub async fn resolve_or_create_many(names: &[String], pool: &PgPool) -> Result<HashMap<String, Uuid>> {
        let mut resolved = HashMap::new();
        if names.is_empty() {
            return Ok(resolved);
        }

        let existing = sqlx::query_as::<_, Self>("SELECT * FROM organisms WHERE name = ANY($1)")
            .bind(names)
            .fetch_all(pool)
            .await?;
        for organism in existing {
            resolved.insert(organism.name.clone(), organism.id);
        }

        let missing: Vec<&String> = names.iter().filter(|n| !resolved.contains_key(*n)).collect();
        if missing.is_empty() {
            return Ok(resolved);
        }

        let default_sector_id = Sector::ensure_default(pool).await?;
        for name in missing {
            let organism = sqlx::query_as::<_, Self>(
                r#"
                INSERT INTO organisms (name, sector_id, is_new)
                VALUES ($1, $2, TRUE)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING *
                "#,
            )
            .bind(name)
            .bind(default_sector_id)
            .fetch_one(pool)
            .await?;
            resolved.insert(organism.name.clone(), organism.id);
        }

        Ok(resolved)
    }

    /// Clears the `new` flag on every organism. Called at the start of every
    /// harvest so whatever's encountered this run becomes the next cohort.
    pub async fn mark_all_seen(pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("UPDATE organisms SET is_new = FALSE WHERE is_new = TRUE")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_names(pool: &PgPool) -> Result<Vec<(Uuid, String)>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM organisms ORDER BY name")
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM organisms ORDER BY name")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }
}
