use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use qb_rules::OrganismRuleKind;

/// At most one row per organism: either contributes priority points or
/// short-circuits the score to the rejection sentinel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganismRule {
    pub id: Uuid,
    pub organism_id: Uuid,
    pub kind: String,
    pub points: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl OrganismRule {
    pub fn to_kind(&self) -> Option<OrganismRuleKind> {
        match self.kind.as_str() {
            "priority" => Some(OrganismRuleKind::Priority(self.points.unwrap_or(0) as i64)),
            "unwanted" => Some(OrganismRuleKind::Unwanted),
            _ => None,
        }
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM organism_rules")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn set_priority(organism_id: Uuid, points: i32, pool: &PgPool) -> Result<Self> {
        Self::set(organism_id, "priority", Some(points), pool).await
    }

    pub async fn set_unwanted(organism_id: Uuid, pool: &PgPool) -> Result<Self> {
        Self::set(organism_id, "unwanted", None, pool).await
    }

    async fn set(organism_id: Uuid, kind: &str, points: Option<i32>, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO organism_rules (organism_id, kind, points)
            VALUES ($1, $2, $3)
            ON CONFLICT (organism_id) DO UPDATE SET
                kind = EXCLUDED.kind,
                points = EXCLUDED.points
            RETURNING *
            "#,
        )
        .bind(organism_id)
        .bind(kind)
        .bind(points)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(organism_id: Uuid, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM organism_rules WHERE organism_id = $1")
            .bind(organism_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
