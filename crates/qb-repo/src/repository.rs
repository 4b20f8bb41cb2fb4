use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use qb_rules::{KeywordRule as CacheKeywordRule, OrganismRuleKind, RulesSource};

use crate::models::{
    DetailCandidate, DetailRecord, FollowState, KeywordRule, Organism, OrganismRule,
    ScoreCandidate, ScoreUpdate, Tender, TenderUpsert, ACTIVE_STATE_TEXTS, CLOSED_STATE_TEXT,
};

const SCORE_UPDATE_CHUNK_SIZE: usize = 500;

/// The single database the monitor persists everything in: tenders,
/// organisms, sectors, follow-state, and scoring rules. Every method here
/// opens a short-lived scope that releases on every exit path.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolves organism names, builds an upsert batch keyed by code (first
    /// occurrence wins within the batch), and upserts it in one statement.
    /// On conflict, only the dynamic fields are overwritten — static fields
    /// are set once at first insert and never touched again.
    pub async fn bulk_upsert_tenders(&self, items: &[TenderUpsert]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut names: Vec<String> = items.iter().map(|i| i.organism_name.clone()).collect();
        names.sort();
        names.dedup();
        let organism_ids = Organism::resolve_or_create_many(&names, &self.pool).await?;

        let mut seen_codes = HashSet::new();
        let mut batch = Vec::with_capacity(items.len());
        for item in items {
            if seen_codes.insert(item.code.clone()) {
                batch.push(item);
            }
        }

        let mut qb = QueryBuilder::new(
            "INSERT INTO tenders (code, name, amount, publication_date, close_at, second_call_close_at, state_text, state_tag, bidder_count, organism_id) ",
        );
        qb.push_values(batch, |mut b, item: &TenderUpsert| {
            let organism_id = organism_ids
                .get(&item.organism_name)
                .copied()
                .unwrap_or_else(Uuid::nil);
            b.push_bind(item.code.clone())
                .push_bind(item.name.clone())
                .push_bind(item.amount)
                .push_bind(item.publication_date)
                .push_bind(item.close_at)
                .push_bind(item.second_call_close_at)
                .push_bind(item.state_text.clone())
                .push_bind(item.state_tag)
                .push_bind(item.bidder_count)
                .push_bind(organism_id);
        });
        qb.push(
            " ON CONFLICT (code) DO UPDATE SET \
              bidder_count = EXCLUDED.bidder_count, \
              state_text = EXCLUDED.state_text, \
              close_at = EXCLUDED.close_at, \
              state_tag = EXCLUDED.state_tag, \
              amount = EXCLUDED.amount, \
              updated_at = NOW()",
        );

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Writes the detail-derived fields plus the freshly combined score.
    /// `state_text`/`state_tag` are only overwritten when the detail record
    /// actually provided them.
    pub async fn update_detail(
        &self,
        code: &str,
        detail: &DetailRecord,
        score: i64,
        trace: &[String],
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tenders SET
                description = $2,
                address = $3,
                lead_time_days = $4,
                second_call_close_at = $5,
                products = $6,
                trace = $7,
                score = $8,
                state_text = COALESCE($9, state_text),
                state_tag = COALESCE($10, state_tag),
                updated_at = NOW()
            WHERE code = $1
            "#,
        )
        .bind(code)
        .bind(&detail.description)
        .bind(&detail.address)
        .bind(detail.lead_time_days)
        .bind(detail.second_call_close_at)
        .bind(&detail.products)
        .bind(Json(trace.to_vec()))
        .bind(score)
        .bind(&detail.state_text)
        .bind(detail.state_tag)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Chunks into batches of 500 and commits each independently so a
    /// transient connection failure halfway through doesn't lose earlier
    /// progress.
    pub async fn bulk_update_scores(&self, updates: &[ScoreUpdate]) -> Result<u64> {
        let mut total = 0u64;
        for chunk in updates.chunks(SCORE_UPDATE_CHUNK_SIZE) {
            let mut tx = self.pool.begin().await?;
            for update in chunk {
                sqlx::query(
                    "UPDATE tenders SET score = $2, trace = $3, updated_at = NOW() WHERE id = $1",
                )
                .bind(update.id)
                .bind(update.score)
                .bind(Json(update.trace.clone()))
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }

    pub async fn candidates_for_score_recompute(&self) -> Result<Vec<ScoreCandidate>> {
        sqlx::query_as::<_, ScoreCandidate>(
            r#"
            SELECT t.id, t.code, t.name, t.state_text, t.description, t.products, t.score, o.name AS organism_name
            FROM tenders t
            JOIN organisms o ON o.id = t.organism_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Lightweight projection for a known set of ids, in no particular
    /// order. Used by selective update to re-score followed/bidded tenders
    /// after a fresh detail fetch.
    pub async fn score_candidates_for_ids(&self, ids: &[Uuid]) -> Result<Vec<ScoreCandidate>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, ScoreCandidate>(
            r#"
            SELECT t.id, t.code, t.name, t.state_text, t.description, t.products, t.score, o.name AS organism_name
            FROM tenders t
            JOIN organisms o ON o.id = t.organism_id
            WHERE t.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn candidates_for_detail_fetch(&self, min_score: i64) -> Result<Vec<DetailCandidate>> {
        sqlx::query_as::<_, DetailCandidate>(
            r#"
            SELECT t.id, t.code, t.name, o.name AS organism_name
            FROM tenders t
            JOIN organisms o ON o.id = t.organism_id
            WHERE t.score >= $1 AND t.description IS NULL
            ORDER BY t.close_at ASC
            "#,
        )
        .bind(min_score)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn listing_query(&self, min_score: i64) -> Result<Vec<Tender>> {
        sqlx::query_as::<_, Tender>(
            r#"
            SELECT t.* FROM tenders t
            LEFT JOIN follow_states f ON f.tender_id = t.id
            WHERE t.score >= $1
              AND t.state_text = ANY($2)
              AND (f.id IS NULL OR (f.is_favorite = FALSE AND f.is_bid_submitted = FALSE AND f.is_hidden = FALSE))
            ORDER BY t.score DESC
            "#,
        )
        .bind(min_score)
        .bind(&ACTIVE_STATE_TEXTS[..])
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn followed_query(&self) -> Result<Vec<Tender>> {
        sqlx::query_as::<_, Tender>(
            "SELECT t.* FROM tenders t JOIN follow_states f ON f.tender_id = t.id \
             WHERE f.is_favorite = TRUE ORDER BY t.close_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn bid_query(&self) -> Result<Vec<Tender>> {
        sqlx::query_as::<_, Tender>(
            "SELECT t.* FROM tenders t JOIN follow_states f ON f.tender_id = t.id \
             WHERE f.is_bid_submitted = TRUE ORDER BY t.close_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Min/max publication date of currently-active tenders that have no
    /// follow-state yet. Used to bound the selective-update sweep window.
    pub async fn active_date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let row: (Option<NaiveDate>, Option<NaiveDate>) = sqlx::query_as(
            r#"
            SELECT MIN(t.publication_date), MAX(t.publication_date)
            FROM tenders t
            LEFT JOIN follow_states f ON f.tender_id = t.id
            WHERE t.state_text = ANY($1) AND f.id IS NULL
            "#,
        )
        .bind(&ACTIVE_STATE_TEXTS[..])
        .fetch_one(&self.pool)
        .await?;

        match row {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    /// Forces every expired active tender to "Cerrada". Never touches
    /// tenders already in a terminal state.
    pub async fn close_expired_locally(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tenders SET state_text = $1, updated_at = NOW() WHERE state_text = ANY($2) AND close_at < NOW()",
        )
        .bind(CLOSED_STATE_TEXT)
        .bind(&ACTIVE_STATE_TEXTS[..])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn sweep_old_records(&self, retention_days: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tenders t
            WHERE t.close_at < NOW() - make_interval(days => $1)
              AND t.state_text != ALL($2)
              AND NOT EXISTS (
                  SELECT 1 FROM follow_states f WHERE f.tender_id = t.id AND f.is_favorite = TRUE
              )
            "#,
        )
        .bind(retention_days)
        .bind(&ACTIVE_STATE_TEXTS[..])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_all_organisms_seen(&self) -> Result<u64> {
        Organism::mark_all_seen(&self.pool).await
    }

    pub async fn set_favorite(&self, tender_id: Uuid, favorite: bool) -> Result<FollowState> {
        FollowState::set_favorite(tender_id, favorite, &self.pool).await
    }

    pub async fn set_bid_submitted(&self, tender_id: Uuid, submitted: bool) -> Result<FollowState> {
        FollowState::set_bid_submitted(tender_id, submitted, &self.pool).await
    }

    pub async fn set_hidden(&self, tender_id: Uuid, hidden: bool) -> Result<FollowState> {
        FollowState::set_hidden(tender_id, hidden, &self.pool).await
    }

    pub async fn set_note(&self, tender_id: Uuid, note: &str) -> Result<FollowState> {
        FollowState::set_note(tender_id, note, &self.pool).await
    }

    pub async fn list_keywords(&self) -> Result<Vec<KeywordRule>> {
        KeywordRule::list(&self.pool).await
    }

    pub async fn add_keyword(
        &self,
        text: &str,
        title_weight: i32,
        description_weight: i32,
        products_weight: i32,
    ) -> Result<KeywordRule> {
        KeywordRule::add(text, title_weight, description_weight, products_weight, &self.pool).await
    }

    pub async fn delete_keyword(&self, id: Uuid) -> Result<u64> {
        KeywordRule::delete(id, &self.pool).await
    }

    pub async fn list_organism_rules(&self) -> Result<Vec<OrganismRule>> {
        OrganismRule::list(&self.pool).await
    }

    pub async fn set_organism_priority(&self, organism_id: Uuid, points: i32) -> Result<OrganismRule> {
        OrganismRule::set_priority(organism_id, points, &self.pool).await
    }

    pub async fn set_organism_unwanted(&self, organism_id: Uuid) -> Result<OrganismRule> {
        OrganismRule::set_unwanted(organism_id, &self.pool).await
    }

    pub async fn delete_organism_rule(&self, organism_id: Uuid) -> Result<u64> {
        OrganismRule::delete(organism_id, &self.pool).await
    }

    pub async fn list_organisms(&self) -> Result<Vec<Organism>> {
        Organism::list(&self.pool).await
    }
}

#[async_trait]
impl RulesSource for Repository {
    async fn load_keywords(&self) -> Result<Vec<CacheKeywordRule>> {
        let rows = KeywordRule::list(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                CacheKeywordRule::new(
                    row.id,
                    &row.text,
                    row.title_weight as i64,
                    row.description_weight as i64,
                    row.products_weight as i64,
                )
            })
            .collect())
    }

    async fn load_organism_rules(&self) -> Result<Vec<(Uuid, OrganismRuleKind)>> {
        let rows = OrganismRule::list(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.to_kind().map(|kind| (row.organism_id, kind)))
            .collect())
    }

    async fn load_organism_names(&self) -> Result<Vec<(Uuid, String)>> {
        Organism::list_names(&self.pool).await
    }
}
