pub mod models;
pub mod repository;

pub use models::*;
pub use repository::Repository;

/// Runs the embedded migrations against `pool`. Safe to call on every
/// process start: already-applied migrations are skipped.
pub async fn run_migrations(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
