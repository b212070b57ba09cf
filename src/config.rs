//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Realtime database configuration
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub db_url: String,
    pub secret: String,
}

/// Twitter (profile verification) configuration
#[derive(Debug, Clone)]
pub struct TwitterConfig {
    pub api_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

/// GitHub (publishing) configuration
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: String,
    /// Owner of the fork that per-user branches are pushed to
    pub fork_owner: String,
    pub upstream_owner: String,
    pub upstream_repo: String,
    pub base_branch: String,
}

impl GitHubConfig {
    /// Defaults for everything except credentials
    pub fn with_credentials(token: impl Into<String>, fork_owner: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: token.into(),
            fork_owner: fork_owner.into(),
            upstream_owner: "neveragaindottech".to_string(),
            upstream_repo: "neveragaindottech.github.io".to_string(),
            base_branch: "master".to_string(),
        }
    }
}

/// Where signature documents land in the target repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    pub collection: String,
    pub extension: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            collection: "_signatures".to_string(),
            extension: "md".to_string(),
        }
    }
}

/// Reconciliation worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub attempt_timeout: Duration,
    /// Accounts created before this instant get a reputation bonus
    pub established_before: DateTime<Utc>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(120),
            // 2016-12-01T00:00:00Z
            established_before: DateTime::from_timestamp(1_480_550_400, 0).unwrap_or_default(),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub firebase: FirebaseConfig,
    pub twitter: TwitterConfig,
    pub github: GitHubConfig,
    pub documents: DocumentConfig,
    pub worker: WorkerConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        let firebase = FirebaseConfig {
            db_url: Self::parse_base_url("FIREBASE_DB_URL", &required("FIREBASE_DB_URL")?)?,
            secret: required("FIREBASE_SECRET")?,
        };

        let twitter = TwitterConfig {
            api_url: Self::parse_base_url(
                "TWITTER_API_URL",
                &lookup("TWITTER_API_URL").unwrap_or_else(|| "https://api.twitter.com".to_string()),
            )?,
            consumer_key: required("TWITTER_CONSUMER_KEY")?,
            consumer_secret: required("TWITTER_CONSUMER_SECRET")?,
        };

        let defaults = GitHubConfig::with_credentials(required("GITHUB_TOKEN")?, required("GITHUB_USER")?);
        let github = GitHubConfig {
            api_url: Self::parse_base_url(
                "GITHUB_API_URL",
                &lookup("GITHUB_API_URL").unwrap_or(defaults.api_url.clone()),
            )?,
            upstream_owner: lookup("UPSTREAM_OWNER").unwrap_or(defaults.upstream_owner.clone()),
            upstream_repo: lookup("UPSTREAM_REPO").unwrap_or(defaults.upstream_repo.clone()),
            base_branch: lookup("BASE_BRANCH").unwrap_or(defaults.base_branch.clone()),
            ..defaults
        };

        let documents = DocumentConfig {
            collection: lookup("SIGNATURE_COLLECTION")
                .map(|c| c.trim_matches('/').to_string())
                .unwrap_or_else(|| DocumentConfig::default().collection),
            extension: lookup("SIGNATURE_EXTENSION")
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or_else(|| DocumentConfig::default().extension),
        };

        let worker = WorkerConfig {
            attempt_timeout: match lookup("ATTEMPT_TIMEOUT_SECS") {
                Some(raw) => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        ConfigError::InvalidValue(format!("ATTEMPT_TIMEOUT_SECS must be a positive integer, got {raw}"))
                    })?,
                None => WorkerConfig::default().attempt_timeout,
            },
            established_before: match lookup("ESTABLISHED_BEFORE") {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| ConfigError::InvalidValue(format!("ESTABLISHED_BEFORE: {e}")))?,
                None => WorkerConfig::default().established_before,
            },
        };

        Ok(Self {
            firebase,
            twitter,
            github,
            documents,
            worker,
        })
    }

    /// Validate an http(s) base URL and strip any trailing slash
    fn parse_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
        match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                Ok(raw.trim_end_matches('/').to_string())
            }
            Ok(_) => Err(ConfigError::InvalidValue(format!("{key} must be an http(s) URL"))),
            Err(e) => Err(ConfigError::InvalidValue(format!("{key}: {e}"))),
        }
    }
}
