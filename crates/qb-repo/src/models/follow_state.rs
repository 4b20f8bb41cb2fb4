use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Per-tender operator annotations. Lazily created on the first flag or note
/// write; cascade-deleted with its tender.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowState {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub is_favorite: bool,
    pub is_bid_submitted: bool,
    pub is_hidden: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowState {
    async fn upsert(
        tender_id: Uuid,
        is_favorite: bool,
        is_bid_submitted: bool,
        is_hidden: bool,
        note: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO follow_states (tender_id, is_favorite, is_bid_submitted, is_hidden, note)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tender_id) DO UPDATE SET
                is_favorite = EXCLUDED.is_favorite,
                is_bid_submitted = EXCLUDED.is_bid_submitted,
                is_hidden = EXCLUDED.is_hidden,
                note = EXCLUDED.note,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tender_id)
        .bind(is_favorite)
        .bind(is_bid_submitted)
        .bind(is_hidden)
        .bind(note)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for(tender_id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM follow_states WHERE tender_id = $1")
            .bind(tender_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Marks a tender favorite, preserving its other flags and note.
    pub async fn set_favorite(tender_id: Uuid, favorite: bool, pool: &PgPool) -> Result<Self> {
        let current = Self::find_for(tender_id, pool).await?;
        Self::upsert(
            tender_id,
            favorite,
            current.as_ref().map(|f| f.is_bid_submitted).unwrap_or(false),
            current.as_ref().map(|f| f.is_hidden).unwrap_or(false),
            current.as_ref().and_then(|f| f.note.as_deref()),
            pool,
        )
        .await
    }

    /// Marks a bid submitted. Auto-enables favorite: is-bid-submitted
    /// implies is-favorite.
    pub async fn set_bid_submitted(tender_id: Uuid, submitted: bool, pool: &PgPool) -> Result<Self> {
        let current = Self::find_for(tender_id, pool).await?;
        let is_favorite = submitted || current.as_ref().map(|f| f.is_favorite).unwrap_or(false);
        Self::upsert(
            tender_id,
            is_favorite,
            submitted,
            current.as_ref().map(|f| f.is_hidden).unwrap_or(false),
            current.as_ref().and_then(|f| f.note.as_deref()),
            pool,
        )
        .await
    }

    /// Hides a tender. Disables favorite and bidding: is-hidden implies
    /// neither of the other two flags.
    pub async fn set_hidden(tender_id: Uuid, hidden: bool, pool: &PgPool) -> Result<Self> {
        let current = Self::find_for(tender_id, pool).await?;
        let (is_favorite, is_bid_submitted) = if hidden {
            (false, false)
        } else {
            (
                current.as_ref().map(|f| f.is_favorite).unwrap_or(false),
                current.as_ref().map(|f| f.is_bid_submitted).unwrap_or(false),
            )
        };
        Self::upsert(
            tender_id,
            is_favorite,
            is_bid_submitted,
            hidden,
            current.as_ref().and_then(|f| f.note.as_deref()),
            pool,
        )
        .await
    }

    pub async fn set_note(tender_id: Uuid, note: &str, pool: &PgPool) -> Result<Self> {
        let current = Self::find_for(tender_id, pool).await?;
        Self::upsert(
            tender_id,
            current.as_ref().map(|f| f.is_favorite).unwrap_or(false),
            current.as_ref().map(|f| f.is_bid_submitted).unwrap_or(false),
            current.as_ref().map(|f| f.is_hidden).unwrap_or(false),
            Some(note),
            pool,
        )
        .await
    }
}
