use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// A user-defined relevance token. Stored normalized (lower-case, trimmed);
/// zero weight in a field means "do not score there".
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordRule {
    pub id: Uuid,
    pub text: String,
    pub title_weight: i32,
    pub description_weight: i32,
    pub products_weight: i32,
    pub created_at: DateTime<Utc>,
}

impl KeywordRule {
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM keyword_rules ORDER BY text")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn add(
        text: &str,
        title_weight: i32,
        description_weight: i32,
        products_weight: i32,
        pool: &PgPool,
    ) -> Result<Self> {
        let normalized = text.trim().to_lowercase();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO keyword_rules (text, title_weight, description_weight, products_weight)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (text) DO UPDATE SET
                title_weight = EXCLUDED.title_weight,
                description_weight = EXCLUDED.description_weight,
                products_weight = EXCLUDED.products_weight
            RETURNING *
            "#,
        )
        .bind(normalized)
        .bind(title_weight)
        .bind(description_weight)
        .bind(products_weight)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(id: Uuid, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM keyword_rules WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
