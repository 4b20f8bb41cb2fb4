use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::NaiveDate;
use qb_common::QuickBuyError;
use serde_json::Value;
use tracing::{info, warn};

use crate::detail::{normalize_detail_payload, DetailPayload};
use crate::metrics::ScraperMetrics;
use crate::session::{Session, SessionAcquirer};

const LIST_TIMEOUT: Duration = Duration::from_secs(15);
const DETAIL_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_POLITENESS_SLEEP: Duration = Duration::from_millis(500);
const HARD_PAGE_CAP: u32 = 300;

/// Acquires credentials and fetches list & detail pages as decoded JSON.
/// Owns exactly one session at a time; re-acquisition is single-flight.
pub struct Scraper {
    client: reqwest::Client,
    base_api: String,
    acquirer: Box<dyn SessionAcquirer>,
    session: ArcSwapOption<Session>,
    refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    fallback_api_key: Option<String>,
    metrics: Arc<ScraperMetrics>,
}

impl Scraper {
    pub fn new(
        base_api: impl Into<String>,
        acquirer: Box<dyn SessionAcquirer>,
        fallback_api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_api: base_api.into(),
            acquirer,
            session: ArcSwapOption::empty(),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            fallback_api_key,
            metrics: Arc::new(ScraperMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &ScraperMetrics {
        &self.metrics
    }

    /// Explicit refresh, invoked by the orchestrator before a detail-heavy
    /// phase. Always re-acquires, even if a session is already cached.
    pub async fn refresh(&self) -> Result<(), QuickBuyError> {
        let observed = self.generation.load(Ordering::Acquire);
        self.refresh_if_stale(observed).await.map(|_| ())
    }

    async fn ensure_session(&self) -> Result<(Arc<Session>, u64), QuickBuyError> {
        if let Some(session) = self.session.load_full() {
            return Ok((session, self.generation.load(Ordering::Acquire)));
        }
        self.refresh_if_stale(self.generation.load(Ordering::Acquire)).await
    }

    /// Re-acquires only if nobody else refreshed since `observed_generation`
    /// was read. Concurrent callers racing a 401 collapse into one handshake.
    async fn refresh_if_stale(&self, observed_generation: u64) -> Result<(Arc<Session>, u64), QuickBuyError> {
        let _guard = self.refresh_lock.lock().await;

        let current_generation = self.generation.load(Ordering::Acquire);
        if current_generation != observed_generation {
            if let Some(session) = self.session.load_full() {
                return Ok((session, current_generation));
            }
        }

        match self.acquirer.acquire().await {
            Ok(session) => {
                self.metrics.record_session_acquired();
                let session = Arc::new(session);
                self.session.store(Some(session.clone()));
                let new_generation = current_generation.wrapping_add(1);
                self.generation.store(new_generation, Ordering::Release);
                Ok((session, new_generation))
            }
            Err(e) => {
                self.metrics.record_session_failure();
                Err(e)
            }
        }
    }

    fn apply_session_or_fallback(&self, session: &Session, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder = session.apply(builder);
        if let Some(fallback_key) = &self.fallback_api_key {
            if session.x_api_key.is_empty() {
                builder = builder.header("x-api-key", fallback_key);
            }
        }
        builder
    }

    /// Paginated listing fetch. Stops at the first page failure (returning
    /// what's already gathered), an empty page, or the page cap — whichever
    /// comes first. Results are deduplicated by code, keeping the last
    /// occurrence.
    pub async fn fetch_list(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        max_pages: Option<u32>,
    ) -> Result<Vec<Value>, QuickBuyError> {
        let (mut session, mut generation) = self.ensure_session().await?;

        let mut collected: Vec<Value> = Vec::new();
        let mut total_pages: Option<u32> = None;
        let mut page: u32 = 1;

        loop {
            let page_cap = total_pages
                .unwrap_or(u32::MAX)
                .min(max_pages.unwrap_or(u32::MAX))
                .min(HARD_PAGE_CAP);
            if page > page_cap {
                break;
            }

            let url = qb_urls::list_url(&self.base_api, page, date_from, date_to);
            let request = self.apply_session_or_fallback(
                &session,
                self.client.get(&url).timeout(LIST_TIMEOUT),
            );

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(page, error = %e, "list page request failed, stopping crawl");
                    break;
                }
            };

            if response.status() == reqwest::StatusCode::UNAUTHORIZED
                || response.status() == reqwest::StatusCode::FORBIDDEN
            {
                let (refreshed_session, refreshed_generation) = self.refresh_if_stale(generation).await?;
                session = refreshed_session;
                generation = refreshed_generation;
                continue;
            }

            if !response.status().is_success() {
                warn!(page, status = %response.status(), "list page returned non-200, stopping crawl");
                break;
            }

            let body: Value = match response.json().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(page, error = %e, "list page body did not decode, stopping crawl");
                    break;
                }
            };

            if page == 1 {
                let meta = qb_api::page_meta(&body);
                total_pages = Some(meta.total_pages as u32);
            }

            let results = qb_api::result_list(&body);
            self.metrics.record_page_fetched();
            if results.is_empty() {
                break;
            }
            self.metrics.record_items_harvested(results.len() as u64);
            collected.extend(results);

            tokio::time::sleep(LIST_POLITENESS_SLEEP).await;
            page += 1;
        }

        Ok(dedup_by_code_keep_last(collected))
    }

    /// Fetches one detail page. Any non-200 or transport failure returns
    /// `Ok(None)` — a missing detail is "no detail", never an error.
    pub async fn fetch_detail(&self, code: &str) -> Result<Option<DetailPayload>, QuickBuyError> {
        let (mut session, mut generation) = self.ensure_session().await?;
        let url = qb_urls::detail_url(&self.base_api, code);

        loop {
            let request = self.apply_session_or_fallback(
                &session,
                self.client.get(&url).timeout(DETAIL_TIMEOUT),
            );

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(code, error = %e, "detail fetch failed");
                    self.metrics.record_detail_failure();
                    return Ok(None);
                }
            };

            if response.status() == reqwest::StatusCode::UNAUTHORIZED
                || response.status() == reqwest::StatusCode::FORBIDDEN
            {
                let (refreshed_session, refreshed_generation) = self.refresh_if_stale(generation).await?;
                session = refreshed_session;
                generation = refreshed_generation;
                continue;
            }

            if !response.status().is_success() {
                self.metrics.record_detail_failure();
                return Ok(None);
            }

            let body: Value = match response.json().await {
                Ok(b) => b,
                Err(_) => {
                    self.metrics.record_detail_failure();
                    return Ok(None);
                }
            };

            let payload = body.get("payload").cloned().unwrap_or(Value::Null);
            self.metrics.record_detail_success();
            info!(code, "detail fetched");
            return Ok(Some(normalize_detail_payload(&payload)));
        }
    }
}

fn dedup_by_code_keep_last(items: Vec<Value>) -> Vec<Value> {
    let mut by_code: indexmap_lite::OrderedMap = indexmap_lite::OrderedMap::new();
    for item in items {
        let code = item.get("codigo").and_then(Value::as_str).unwrap_or_default().to_string();
        by_code.insert(code, item);
    }
    by_code.into_values()
}

/// Tiny insertion-order-preserving map, enough to implement "keep last
/// occurrence by key" without pulling in a full indexmap dependency for one
/// call site.
mod indexmap_lite {
    use serde_json::Value;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct OrderedMap {
        order: Vec<String>,
        values: HashMap<String, Value>,
    }

    impl OrderedMap {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, key: String, value: Value) {
            if !self.values.contains_key(&key) {
                self.order.push(key.clone());
            }
            self.values.insert(key, value);
        }

        pub fn into_values(self) -> Vec<Value> {
            self.order
                .into_iter()
                .map(|key| self.values.get(&key).cloned().unwrap_or(Value::Null))
                .collect()
        }
    }
}
