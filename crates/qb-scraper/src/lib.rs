pub mod detail;
pub mod metrics;
pub mod scraper;
pub mod session;

pub use detail::{normalize_detail_payload, DetailPayload};
pub use metrics::ScraperMetrics;
pub use scraper::Scraper;
pub use session::{ChromeSessionAcquirer, Session, SessionAcquirer};
