//! Application Configuration
//!
//! JSON settings file; every field has a default so a partial (or missing)
//! file is fine. A missing file is written out on first load so the
//! generated URL signing secret survives restarts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub image_dir: PathBuf,
    /// Rolling log files go here; no file logging when unset
    pub log_dir: Option<PathBuf>,
    /// Recorded as `created_by` on new leads
    pub current_user: String,
    pub search_debounce_ms: u64,
    pub page_size: u32,
    pub max_page_size: u32,
    pub signed_url_ttl_secs: u64,
    /// Random per install unless set
    pub url_signing_secret: String,
}

/// Placeholder shipped by early builds; never accepted as a key
const PLACEHOLDER_SECRET: &str = "change-me";

fn generate_secret() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("roof_finder.db"),
            image_dir: PathBuf::from("lead_images"),
            log_dir: None,
            current_user: "local".to_string(),
            search_debounce_ms: 300,
            page_size: 100,
            max_page_size: 500,
            signed_url_ttl_secs: 3600,
            url_signing_secret: generate_secret(),
        }
    }
}

impl AppConfig {
    /// Read the config file; a missing file yields the defaults
    pub fn load(path: &Path) -> DomainResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save(path)?;
                return Ok(config);
            }
            Err(e) => {
                return Err(DomainError::Transport(format!(
                    "Failed to read config {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            DomainError::Validation(format!("Malformed config {}: {}", path.display(), e))
        })?;
        let has_secret = value.get("url_signing_secret").is_some();
        let config: Self = serde_json::from_value(value).map_err(|e| {
            DomainError::Validation(format!("Malformed config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        if !has_secret {
            log::warn!(
                "No url_signing_secret in {}; signed image URLs will not survive a restart",
                path.display()
            );
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> DomainResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DomainError::Transport(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(path, json)
            .map_err(|e| DomainError::Transport(format!("Failed to write config: {}", e)))
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.page_size == 0 || self.max_page_size == 0 {
            return Err(DomainError::Validation("Page sizes must be positive".into()));
        }
        if self.page_size > self.max_page_size {
            return Err(DomainError::Validation(format!(
                "page_size {} exceeds max_page_size {}",
                self.page_size, self.max_page_size
            )));
        }
        if self.url_signing_secret.is_empty() {
            return Err(DomainError::Validation("url_signing_secret must not be empty".into()));
        }
        if self.url_signing_secret == PLACEHOLDER_SECRET {
            return Err(DomainError::Validation(
                "url_signing_secret is still the placeholder value".into(),
            ));
        }
        Ok(())
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Clamp a caller-supplied page size into `[1, max_page_size]`
    pub fn clamp_limit(&self, limit: Option<u32>) -> u32 {
        limit.unwrap_or(self.page_size).clamp(1, self.max_page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(
            config,
            AppConfig {
                url_signing_secret: config.url_signing_secret.clone(),
                ..AppConfig::default()
            }
        );

        // Written on first load, same secret afterwards
        assert!(path.exists());
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_signing_secret_is_random_and_not_placeholder() {
        let a = AppConfig::default();
        let b = AppConfig::default();
        assert_ne!(a.url_signing_secret, b.url_signing_secret);
        assert_eq!(a.url_signing_secret.len(), 64);

        let placeholder = AppConfig {
            url_signing_secret: "change-me".into(),
            ..AppConfig::default()
        };
        assert_eq!(placeholder.validate().unwrap_err().kind(), "ValidationError");
    }

    #[test]
    fn test_partial_file_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"page_size": 25, "current_user": "sam"}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.current_user, "sam");
        assert_eq!(config.max_page_size, 500);

        let saved = dir.path().join("nested/saved.json");
        config.save(&saved).unwrap();
        assert_eq!(AppConfig::load(&saved).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load(&path).unwrap_err().kind(), "ValidationError");

        std::fs::write(&path, r#"{"page_size": 900}"#).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap_err().kind(), "ValidationError");
    }

    #[test]
    fn test_clamp_limit() {
        let config = AppConfig::default();
        assert_eq!(config.clamp_limit(None), 100);
        assert_eq!(config.clamp_limit(Some(0)), 1);
        assert_eq!(config.clamp_limit(Some(10_000)), 500);
    }
}
