use thiserror::Error;

/// Error taxonomy for the quick-purchase monitor. One variant per error kind
/// named in the design; each kind signals the Task Runner how a failure
/// should propagate (see the orchestrator's phase-vs-per-item handling).
#[derive(Error, Debug)]
pub enum QuickBuyError {
    #[error("session acquisition failed: {0}")]
    SessionAcquisitionFailed(String),

    #[error("scraping list failed: {0}")]
    ScrapingListFailed(String),

    #[error("scraping detail failed: {0}")]
    ScrapingDetailFailed(String),

    #[error("repository load failed: {0}")]
    RepositoryLoadFailed(String),

    #[error("repository transform failed: {0}")]
    RepositoryTransformFailed(String),

    #[error("recompute failed: {0}")]
    RecomputeFailed(String),

    #[error("selective update failed: {0}")]
    SelectiveUpdateFailed(String),

    #[error("task runner busy: a task is already running")]
    Busy,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
