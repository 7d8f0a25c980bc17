//! Runtime configuration for the sync engine, intake server, and worker.
//!
//! Settings come from the environment or from a YAML file; YAML values are
//! validated through the same path as environment values.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::policy::ConflictPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Credentials and base URL for one remote endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Webhook intake bind address and authentication.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    /// HMAC key; empty disables signature checking (development only)
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WebhookConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "secret",
                if self.secret.is_empty() {
                    &"[DISABLED]"
                } else {
                    &"[REDACTED]"
                },
            )
            .field("signature_header", &self.signature_header)
            .finish()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_webhook_host(),
            port: default_webhook_port(),
            secret: String::new(),
            signature_header: default_signature_header(),
        }
    }
}

/// Executor retry limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Max `retry_count` on a sync record before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Base for operator-scheduled external retries; the worker itself does
    /// not sleep between item retries
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

/// Queue worker cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_claim_batch")]
    pub claim_batch: usize,
}

impl WorkerConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            claim_batch: default_claim_batch(),
        }
    }
}

/// Complete runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncSettings {
    pub cloud: EndpointConfig,
    pub local: EndpointConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Doctypes included in bulk sync operations
    #[serde(default)]
    pub doctypes: Vec<String>,
    /// Extra fields stripped from hashing and writes
    #[serde(default)]
    pub excluded_fields: Vec<String>,
    #[serde(default)]
    pub conflict_resolution: ConflictPolicy,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Bulk sync page size
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Processed queue rows older than this are purged
    #[serde(default = "default_queue_retention_days")]
    pub queue_retention_days: i64,
}

impl SyncSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Load settings from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_yaml::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the given file when present, else the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_yaml_file(path),
            None => match env::var("TANDEM_CONFIG") {
                Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(path.trim()),
                _ => Self::from_env(),
            },
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cloud = EndpointConfig {
            url: required_trimmed(&lookup, "CLOUD_URL")?,
            api_key: required_trimmed(&lookup, "CLOUD_API_KEY")?,
            api_secret: required_trimmed(&lookup, "CLOUD_API_SECRET")?,
        };
        let local = EndpointConfig {
            url: required_trimmed(&lookup, "LOCAL_URL")?,
            api_key: required_trimmed(&lookup, "LOCAL_API_KEY")?,
            api_secret: required_trimmed(&lookup, "LOCAL_API_SECRET")?,
        };

        let webhook = WebhookConfig {
            host: value_or_default(&lookup, "WEBHOOK_HOST", &default_webhook_host()),
            port: parse_value(&lookup, "WEBHOOK_PORT", default_webhook_port())?,
            secret: optional_trimmed(&lookup, "WEBHOOK_SECRET").unwrap_or_default(),
            signature_header: value_or_default(
                &lookup,
                "WEBHOOK_SIGNATURE_HEADER",
                &default_signature_header(),
            ),
        };

        let doctypes = list_value(&lookup, "DOCTYPES");
        let excluded_fields = list_value(&lookup, "EXCLUDED_FIELDS");

        let conflict_resolution =
            value_or_default(&lookup, "CONFLICT_RESOLUTION", ConflictPolicy::default().as_str())
                .parse::<ConflictPolicy>()
                .map_err(ConfigError::Invalid)?;

        let retry = RetryConfig {
            max_attempts: parse_value(&lookup, "RETRY_MAX_ATTEMPTS", default_max_attempts())?,
            backoff_seconds: parse_value(&lookup, "RETRY_BACKOFF_SECONDS", default_backoff_seconds())?,
        };

        let worker = WorkerConfig {
            poll_interval_ms: parse_value(
                &lookup,
                "WORKER_POLL_INTERVAL_MS",
                default_poll_interval_ms(),
            )?,
            claim_batch: parse_value(&lookup, "WORKER_CLAIM_BATCH", default_claim_batch())?,
        };

        let settings = Self {
            cloud,
            local,
            webhook,
            doctypes,
            excluded_fields,
            conflict_resolution,
            retry,
            batch_size: parse_value(&lookup, "BATCH_SIZE", default_batch_size())?,
            worker,
            db_path: optional_trimmed(&lookup, "TANDEM_DB_PATH")
                .map_or_else(default_db_path, PathBuf::from),
            queue_retention_days: parse_value(
                &lookup,
                "QUEUE_RETENTION_DAYS",
                default_queue_retention_days(),
            )?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (label, endpoint) in [("cloud", &self.cloud), ("local", &self.local)] {
            if !has_http_scheme(&endpoint.url) {
                return Err(ConfigError::Invalid(format!(
                    "{label} url must use an http or https scheme"
                )));
            }
            if endpoint.api_key.trim().is_empty() || endpoint.api_secret.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{label} api key and secret must not be empty"
                )));
            }
        }
        if self.retry.max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be >= 1".to_string()));
        }
        if self.worker.claim_batch == 0 {
            return Err(ConfigError::Invalid(
                "worker.claim_batch must be >= 1".to_string(),
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "worker.poll_interval_ms must be >= 1".to_string(),
            ));
        }
        if self.queue_retention_days < 1 {
            return Err(ConfigError::Invalid(
                "queue_retention_days must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Bind address for the webhook intake server.
    #[must_use]
    pub fn webhook_bind_addr(&self) -> String {
        format!("{}:{}", self.webhook.host, self.webhook.port)
    }
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_webhook_port() -> u16 {
    5000
}

fn default_signature_header() -> String {
    "X-Frappe-Webhook-Signature".to_string()
}

const fn default_max_attempts() -> i64 {
    5
}

const fn default_backoff_seconds() -> u64 {
    60
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

const fn default_claim_batch() -> usize {
    10
}

const fn default_batch_size() -> usize {
    100
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tandem.db")
}

const fn default_queue_retention_days() -> i64 {
    30
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn list_value(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Vec<String> {
    optional_trimmed(lookup, name)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_value<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match optional_trimmed(lookup, name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

/// True when the URL names an http or https scheme with a non-empty rest.
fn has_http_scheme(url: &str) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, rest)| matches!(scheme, "http" | "https") && !rest.is_empty())
}
