use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `<working-dir>/settings.json`. Missing keys back-fill with defaults on
/// load; the file is (re)written with defaults if any key was absent or the
/// file did not exist at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub auto_extract_enabled: bool,
    #[serde(default = "default_extract_time")]
    pub auto_extract_time: String,
    #[serde(default)]
    pub auto_update_enabled: bool,
    #[serde(default = "default_update_time")]
    pub auto_update_time: String,
    #[serde(default)]
    pub user_export_path: String,
}

fn default_extract_time() -> String {
    "08:00".to_string()
}

fn default_update_time() -> String {
    "09:00".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_extract_enabled: false,
            auto_extract_time: default_extract_time(),
            auto_update_enabled: false,
            auto_update_time: default_update_time(),
            user_export_path: String::new(),
        }
    }
}

impl Settings {
    /// Load settings.json from `path`, back-filling and rewriting defaults
    /// if the file is missing or partially specified.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.write(path)?;
            return Ok(settings);
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file: {}", path.display()))?;

        // Parse leniently: unknown/missing keys fall back to `#[serde(default)]`
        // above. If the document is entirely malformed we still recover by
        // writing a fresh default file rather than failing process start.
        let settings: Self = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "settings.json malformed, resetting to defaults");
                Self::default()
            }
        };

        // Re-derive the canonical JSON and compare: if the file on disk was
        // missing any key (or malformed), rewrite it with the back-filled
        // values so future reads see a complete document.
        let canonical = serde_json::to_string_pretty(&settings)?;
        let existing_reparsed: Option<serde_json::Value> = serde_json::from_str(&raw).ok();
        let canonical_value: serde_json::Value = serde_json::from_str(&canonical)?;
        if existing_reparsed.as_ref() != Some(&canonical_value) {
            settings.write(path)?;
        }

        Ok(settings)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("failed to serialize settings to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write settings file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_file_backfills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"auto_extract_enabled": true}"#).unwrap();

        let settings = Settings::load_or_init(&path).unwrap();
        assert!(settings.auto_extract_enabled);
        assert_eq!(settings.auto_extract_time, "08:00");
        assert_eq!(settings.auto_update_time, "09:00");

        // File on disk should now be the fully-backfilled document.
        let reloaded = Settings::load_or_init(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn malformed_file_resets_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json at all").unwrap();

        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
