use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use qb_common::QuickBuyError;

const SESSION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const SESSION_POLL_TIMEOUT: Duration = Duration::from_secs(15);
const SEARCH_CLICK_GRACE: Duration = Duration::from_secs(3);
const SESSION_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);

const FIXED_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const FIXED_ACCEPT: &str = "application/json";
const FIXED_REFERER: &str = "https://buscador.mercadopublico.cl/";

/// The captured credentials for one session boundary: headers plus a fixed
/// user-agent/accept/referer set, all required on every upstream request.
#[derive(Debug, Clone)]
pub struct Session {
    pub authorization: String,
    pub x_api_key: String,
    pub user_agent: String,
    pub accept: String,
    pub referer: String,
}

impl Session {
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("authorization", &self.authorization)
            .header("x-api-key", &self.x_api_key)
            .header("user-agent", &self.user_agent)
            .header("accept", &self.accept)
            .header("referer", &self.referer)
    }
}

/// Drives a real browser once per session boundary to capture the bearer
/// token a JS SPA is issued. Implemented separately from [`Session`] so it
/// can be swapped for a fake in tests.
#[async_trait]
pub trait SessionAcquirer: Send + Sync {
    async fn acquire(&self) -> Result<Session, QuickBuyError>;
}

/// Real implementation: launches headless Chrome via CDP, navigates to the
/// marketplace SPA, and intercepts the first outgoing API request that
/// carries `authorization`/`x-api-key` headers.
pub struct ChromeSessionAcquirer {
    spa_url: String,
    api_host: String,
    headless: bool,
}

impl ChromeSessionAcquirer {
    pub fn new(spa_url: impl Into<String>, api_host: impl Into<String>, headless: bool) -> Self {
        Self {
            spa_url: spa_url.into(),
            api_host: api_host.into(),
            headless,
        }
    }
}

#[async_trait]
impl SessionAcquirer for ChromeSessionAcquirer {
    async fn acquire(&self) -> Result<Session, QuickBuyError> {
        let config = BrowserConfig::builder()
            .request_timeout(SESSION_NAVIGATION_TIMEOUT)
            .with_head_opt(!self.headless)
            .build()
            .map_err(|e| QuickBuyError::SessionAcquisitionFailed(e.to_string()))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| QuickBuyError::SessionAcquisitionFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.drive_handshake(&browser).await;

        let _ = browser.close().await;
        handler_task.abort();

        result
    }
}

impl ChromeSessionAcquirer {
    async fn drive_handshake(&self, browser: &Browser) -> Result<Session, QuickBuyError> {
        let page = browser
            .new_page(&self.spa_url)
            .await
            .map_err(|e| QuickBuyError::SessionAcquisitionFailed(e.to_string()))?;

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| QuickBuyError::SessionAcquisitionFailed(e.to_string()))?;

        if let Some(session) = self
            .wait_for_headers(&mut requests, SESSION_POLL_TIMEOUT, SESSION_POLL_INTERVAL)
            .await
        {
            return Ok(session);
        }

        // Headers never showed up passively; nudge the SPA by clicking its
        // search control, then give it one more short window.
        let _ = page.find_element("button[type='submit'], .search-button").await.map(|el| {
            let _ = el.click();
        });

        if let Some(session) = self
            .wait_for_headers(&mut requests, SEARCH_CLICK_GRACE, SESSION_POLL_INTERVAL)
            .await
        {
            return Ok(session);
        }

        Err(QuickBuyError::SessionAcquisitionFailed(
            "authorization/x-api-key headers not observed within the handshake window".to_string(),
        ))
    }

    async fn wait_for_headers(
        &self,
        requests: &mut (impl futures::Stream<Item = std::sync::Arc<EventRequestWillBeSent>> + Unpin),
        timeout: Duration,
        poll_interval: Duration,
    ) -> Option<Session> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match tokio::time::timeout(poll_interval.min(remaining), requests.next()).await {
                Ok(Some(event)) => {
                    if !event.request.url.contains(&self.api_host) {
                        continue;
                    }
                    let headers = &event.request.headers.inner();
                    let authorization = headers
                        .as_object()
                        .and_then(|h| h.get("authorization").or_else(|| h.get("Authorization")))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let x_api_key = headers
                        .as_object()
                        .and_then(|h| h.get("x-api-key").or_else(|| h.get("X-Api-Key")))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);

                    if let (Some(authorization), Some(x_api_key)) = (authorization, x_api_key) {
                        return Some(Session {
                            authorization,
                            x_api_key,
                            user_agent: FIXED_USER_AGENT.to_string(),
                            accept: FIXED_ACCEPT.to_string(),
                            referer: FIXED_REFERER.to_string(),
                        });
                    }
                }
                Ok(None) => return None,
                Err(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAcquirer(Session);

    #[async_trait]
    impl SessionAcquirer for FakeAcquirer {
        async fn acquire(&self) -> Result<Session, QuickBuyError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn session_applies_all_required_headers() {
        let session = Session {
            authorization: "Bearer abc".to_string(),
            x_api_key: "key-123".to_string(),
            user_agent: FIXED_USER_AGENT.to_string(),
            accept: FIXED_ACCEPT.to_string(),
            referer: FIXED_REFERER.to_string(),
        };
        let client = reqwest::Client::new();
        let request = session
            .apply(client.get("https://example.invalid"))
            .build()
            .unwrap();

        let headers = request.headers();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(headers.get("x-api-key").unwrap(), "key-123");
        assert_eq!(headers.get("referer").unwrap(), FIXED_REFERER);
    }

    #[tokio::test]
    async fn fake_acquirer_returns_configured_session() {
        let acquirer = FakeAcquirer(Session {
            authorization: "Bearer test".to_string(),
            x_api_key: "test-key".to_string(),
            user_agent: FIXED_USER_AGENT.to_string(),
            accept: FIXED_ACCEPT.to_string(),
            referer: FIXED_REFERER.to_string(),
        });
        let session = acquirer.acquire().await.unwrap();
        assert_eq!(session.x_api_key, "test-key");
    }
}
