use anyhow::{Context, Result};

/// Secrets and env-specific values. Loaded once at process start; everything
/// that can meaningfully change between runs without a redeploy lives in
/// `Settings` (settings.json) instead.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub database_url: String,
    pub mercadopublico_api_key: Option<String>,
    pub headless: bool,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable is required")?,
            mercadopublico_api_key: std::env::var("MERCADOPUBLICO_API_KEY").ok(),
            headless: std::env::var("HEADLESS")
                .ok()
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        };

        config.log_redacted();
        Ok(config)
    }

    fn log_redacted(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => format!("({} chars)", v.len()),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("DATABASE_URL: ({} chars)", self.database_url.len());
        tracing::info!(
            "MERCADOPUBLICO_API_KEY: {}",
            preview_opt(&self.mercadopublico_api_key)
        );
        tracing::info!("HEADLESS: {}", self.headless);
    }
}
