use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use qb_common::QuickBuyError;
use qb_repo::{DetailRecord, Repository, ScoreUpdate, Tender};
use qb_rules::{combine, score_phase1, score_phase2, Phase1Input, RulesCache};
use qb_scraper::Scraper;
use tracing::{info, warn};

use crate::listing::parse_listing_item;
use crate::task_runner::ProgressSink;

/// Minimum score a tender needs before its detail page is worth fetching.
const DETAIL_FETCH_MIN_SCORE: i64 = 10;

/// How far back a candidates sweep is allowed to widen its window, so a
/// stale `active_date_range` never causes an unbounded re-crawl.
const MAX_SWEEP_LOOKBACK_DAYS: i64 = 5;

/// Default retention window for the maintenance sweep.
const RETENTION_DAYS: i32 = 30;

const DETAIL_FETCH_PACING: Duration = Duration::from_millis(100);

/// Which tenders a selective update should refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectiveScope {
    /// Re-crawl the active listing window and recompute scores.
    Candidates,
    /// Re-fetch detail and re-score tenders the user has favorited.
    Follow,
    /// Re-fetch detail and re-score tenders the user has bid on.
    Bids,
}

/// Ties the scraper, the rules cache, and the repository together into the
/// handful of named operations the task runner dispatches.
pub struct Orchestrator {
    repo: Repository,
    rules_cache: Arc<RulesCache>,
    scraper: Arc<Scraper>,
}

impl Orchestrator {
    pub fn new(repo: Repository, rules_cache: Arc<RulesCache>, scraper: Arc<Scraper>) -> Self {
        Self {
            repo,
            rules_cache,
            scraper,
        }
    }

    /// Full harvest: crawl the listing window, upsert, recompute every
    /// score, then enrich whatever cleared the detail threshold. Returns the
    /// number of listing items harvested.
    pub async fn full_harvest(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        max_pages: Option<u32>,
        sink: &ProgressSink,
    ) -> Result<usize, QuickBuyError> {
        sink.text("marking known organisms");
        self.repo
            .mark_all_organisms_seen()
            .await
            .map_err(|e| QuickBuyError::RepositoryTransformFailed(e.to_string()))?;

        sink.text("fetching listing pages");
        let raw_items = self
            .scraper
            .fetch_list(date_from, date_to, max_pages)
            .await
            .map_err(|e| QuickBuyError::ScrapingListFailed(e.to_string()))?;

        if raw_items.is_empty() {
            sink.text("no listing items returned");
            return Ok(0);
        }

        let upserts: Vec<_> = raw_items.iter().filter_map(parse_listing_item).collect();
        sink.text(format!("upserting {} tenders", upserts.len()));
        self.repo
            .bulk_upsert_tenders(&upserts)
            .await
            .map_err(|e| QuickBuyError::RepositoryLoadFailed(e.to_string()))?;

        sink.pct(40);
        self.recompute_all_scores(sink).await?;

        sink.pct(80);
        self.enrich_high_scoring_candidates(sink).await?;

        sink.pct(100);
        Ok(raw_items.len())
    }

    /// Refreshes the rules cache, rescores every tender with phase 1 and,
    /// where detail already exists, phase 2. Only writes rows whose score
    /// actually changed.
    pub async fn recompute_all_scores(&self, sink: &ProgressSink) -> Result<usize, QuickBuyError> {
        self.rules_cache
            .refresh(&self.repo)
            .await
            .map_err(|e| QuickBuyError::RecomputeFailed(e.to_string()))?;
        let snapshot = self.rules_cache.load();

        let candidates = self
            .repo
            .candidates_for_score_recompute()
            .await
            .map_err(|e| QuickBuyError::RecomputeFailed(e.to_string()))?;

        let total = candidates.len();
        let mut updates = Vec::new();
        for (i, candidate) in candidates.iter().enumerate() {
            let phase1 = score_phase1(
                &snapshot,
                &Phase1Input {
                    name: &candidate.name,
                    state_text: &candidate.state_text,
                    organism_name: &candidate.organism_name,
                },
            );
            let phase2 = if candidate.description.is_some() || candidate.products.is_some() {
                score_phase2(&snapshot, candidate.description.as_deref(), candidate.products.as_ref())
            } else {
                Default::default()
            };
            let result = combine(phase1, phase2);

            if result.score != candidate.score {
                updates.push(ScoreUpdate {
                    id: candidate.id,
                    score: result.score,
                    trace: result.trace,
                });
            }

            if i % 500 == 0 {
                sink.text(format!("scored {}/{}", i, total));
                sink.pct(((i as f64 / total.max(1) as f64) * 100.0) as u8);
            }
        }

        let written = updates.len();
        self.repo
            .bulk_update_scores(&updates)
            .await
            .map_err(|e| QuickBuyError::RecomputeFailed(e.to_string()))?;
        info!(total, written, "score recompute complete");
        Ok(written)
    }

    async fn enrich_high_scoring_candidates(&self, sink: &ProgressSink) -> Result<(), QuickBuyError> {
        let candidates = self
            .repo
            .candidates_for_detail_fetch(DETAIL_FETCH_MIN_SCORE)
            .await
            .map_err(|e| QuickBuyError::RepositoryLoadFailed(e.to_string()))?;

        if candidates.is_empty() {
            return Ok(());
        }

        sink.text(format!("enriching {} candidates", candidates.len()));
        let snapshot = self.rules_cache.load();

        for candidate in candidates {
            let detail = match self.scraper.fetch_detail(&candidate.code).await {
                Ok(Some(detail)) => detail,
                Ok(None) => continue,
                Err(e) => {
                    warn!(code = %candidate.code, error = %e, "detail fetch failed, skipping");
                    continue;
                }
            };

            let phase1 = score_phase1(
                &snapshot,
                &Phase1Input {
                    name: &candidate.name,
                    state_text: detail.state_text.as_deref().unwrap_or(""),
                    organism_name: &candidate.organism_name,
                },
            );
            let phase2 = score_phase2(&snapshot, detail.description.as_deref(), detail.products.as_ref());
            let result = combine(phase1, phase2);

            let record = DetailRecord {
                description: detail.description,
                address: detail.address,
                lead_time_days: detail.lead_time_days,
                second_call_close_at: detail.second_call_close_at,
                products: detail.products,
                state_text: detail.state_text,
                state_tag: detail.state_tag,
            };

            self.repo
                .update_detail(&candidate.code, &record, result.score, &result.trace)
                .await
                .map_err(|e| QuickBuyError::RepositoryTransformFailed(e.to_string()))?;

            tokio::time::sleep(DETAIL_FETCH_PACING).await;
        }

        Ok(())
    }

    /// Refreshes a subset of tenders: `candidates` re-crawls the active
    /// listing window, `follow`/`bids` re-fetch detail for tenders the user
    /// is already tracking and fully rescore them against a fresh rules
    /// snapshot.
    pub async fn selective_update(
        &self,
        scopes: &HashSet<SelectiveScope>,
        sink: &ProgressSink,
    ) -> Result<(), QuickBuyError> {
        if scopes.contains(&SelectiveScope::Candidates) {
            self.selective_update_candidates(sink).await?;
        }
        if scopes.contains(&SelectiveScope::Follow) || scopes.contains(&SelectiveScope::Bids) {
            self.selective_update_tracked(scopes, sink).await?;
        }
        Ok(())
    }

    async fn selective_update_candidates(&self, sink: &ProgressSink) -> Result<(), QuickBuyError> {
        let today = Utc::now().date_naive();
        let (min_date, max_date) = match self
            .repo
            .active_date_range()
            .await
            .map_err(|e| QuickBuyError::SelectiveUpdateFailed(e.to_string()))?
        {
            Some((min, max)) => (min, max),
            None => (today, today),
        };

        let floor = today - ChronoDuration::days(MAX_SWEEP_LOOKBACK_DAYS);
        let date_from = min_date.max(floor);
        let date_to = max_date.max(today);

        sink.text("re-crawling active listing window");
        let raw_items = self
            .scraper
            .fetch_list(date_from, date_to, None)
            .await
            .map_err(|e| QuickBuyError::ScrapingListFailed(e.to_string()))?;

        let upserts: Vec<_> = raw_items.iter().filter_map(parse_listing_item).collect();
        self.repo
            .bulk_upsert_tenders(&upserts)
            .await
            .map_err(|e| QuickBuyError::RepositoryLoadFailed(e.to_string()))?;

        self.repo
            .close_expired_locally()
            .await
            .map_err(|e| QuickBuyError::RepositoryTransformFailed(e.to_string()))?;

        self.recompute_all_scores(sink).await?;
        Ok(())
    }

    async fn selective_update_tracked(
        &self,
        scopes: &HashSet<SelectiveScope>,
        sink: &ProgressSink,
    ) -> Result<(), QuickBuyError> {
        sink.text("refreshing session for tracked tenders");
        self.scraper
            .refresh()
            .await
            .map_err(|e| QuickBuyError::ScrapingDetailFailed(e.to_string()))?;

        let mut ordered_ids = Vec::new();
        let mut seen = HashSet::new();

        if scopes.contains(&SelectiveScope::Follow) {
            let followed = self
                .repo
                .followed_query()
                .await
                .map_err(|e| QuickBuyError::SelectiveUpdateFailed(e.to_string()))?;
            push_unique(&mut ordered_ids, &mut seen, &followed);
        }
        if scopes.contains(&SelectiveScope::Bids) {
            let bids = self
                .repo
                .bid_query()
                .await
                .map_err(|e| QuickBuyError::SelectiveUpdateFailed(e.to_string()))?;
            push_unique(&mut ordered_ids, &mut seen, &bids);
        }

        if ordered_ids.is_empty() {
            return Ok(());
        }

        let candidate_rows = self
            .repo
            .score_candidates_for_ids(&ordered_ids)
            .await
            .map_err(|e| QuickBuyError::SelectiveUpdateFailed(e.to_string()))?;
        let snapshot = self.rules_cache.load();

        sink.text(format!("re-fetching detail for {} tracked tenders", ordered_ids.len()));
        for id in &ordered_ids {
            let Some(candidate) = candidate_rows.iter().find(|c| &c.id == id) else {
                continue;
            };

            let detail = match self.scraper.fetch_detail(&candidate.code).await {
                Ok(Some(detail)) => detail,
                Ok(None) => continue,
                Err(e) => {
                    warn!(code = %candidate.code, error = %e, "tracked detail fetch failed, skipping");
                    continue;
                }
            };

            let phase1 = score_phase1(
                &snapshot,
                &Phase1Input {
                    name: &candidate.name,
                    state_text: detail.state_text.as_deref().unwrap_or(&candidate.state_text),
                    organism_name: &candidate.organism_name,
                },
            );
            let phase2 = score_phase2(&snapshot, detail.description.as_deref(), detail.products.as_ref());
            let result = combine(phase1, phase2);

            let record = DetailRecord {
                description: detail.description,
                address: detail.address,
                lead_time_days: detail.lead_time_days,
                second_call_close_at: detail.second_call_close_at,
                products: detail.products,
                state_text: detail.state_text,
                state_tag: detail.state_tag,
            };

            self.repo
                .update_detail(&candidate.code, &record, result.score, &result.trace)
                .await
                .map_err(|e| QuickBuyError::RepositoryTransformFailed(e.to_string()))?;

            tokio::time::sleep(DETAIL_FETCH_PACING).await;
        }

        Ok(())
    }

    /// Closes anything locally expired, then deletes records past the
    /// retention window (favorites are exempt). Returns (closed, deleted).
    pub async fn maintenance_sweep(&self) -> Result<(u64, u64), QuickBuyError> {
        let closed = self
            .repo
            .close_expired_locally()
            .await
            .map_err(|e| QuickBuyError::RepositoryTransformFailed(e.to_string()))?;
        let deleted = self
            .repo
            .sweep_old_records(RETENTION_DAYS)
            .await
            .map_err(|e| QuickBuyError::RepositoryTransformFailed(e.to_string()))?;
        info!(closed, deleted, "maintenance sweep complete");
        Ok((closed, deleted))
    }
}

fn push_unique(ordered_ids: &mut Vec<uuid::Uuid>, seen: &mut HashSet<uuid::Uuid>, tenders: &[Tender]) {
    for tender in tenders {
        if seen.insert(tender.id) {
            ordered_ids.push(tender.id);
        }
    }
}
