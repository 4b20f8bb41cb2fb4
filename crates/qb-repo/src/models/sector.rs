use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Optional grouping for organisms. A "General" row is ensured on first use.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sector {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_SECTOR_NAME: &str = "General";

impl Sector {
    /// Returns the default sector's id, creating it if this is the first
    /// upsert the database has ever seen.
    pub async fn ensure_default(pool: &PgPool) -> Result<Uuid> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO sectors (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING *
            "#,
        )
        .bind(DEFAULT_SECTOR_NAME)
        .fetch_one(pool)
        .await?;
        Ok(row.id)
    }
}
