use serde::Deserialize;
use std::time::Duration;

use crate::services::orchestrator::OrchestratorSettings;
use crate::services::retry::RetryPolicy;
use crate::services::validation::InputLimits;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Tripo AI API base URL
    #[serde(default = "default_tripo_api_url")]
    pub tripo_api_url: String,

    /// Per-call timeout for task submission and status queries
    #[serde(default = "default_tripo_api_timeout_ms")]
    pub tripo_api_timeout_ms: u64,

    /// Per-call timeout for model downloads (larger payloads)
    #[serde(default = "default_tripo_download_timeout_ms")]
    pub tripo_download_timeout_ms: u64,

    #[serde(default = "default_tripo_max_retries")]
    pub tripo_max_retries: u32,

    /// Base delay of the exponential network-retry backoff
    #[serde(default = "default_tripo_retry_delay_ms")]
    pub tripo_retry_delay_ms: u64,

    #[serde(default = "default_tripo_retry_max_delay_ms")]
    pub tripo_retry_max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub tripo_retry_jitter: bool,

    /// Overall wall-clock budget for one generation job
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_max_interval_ms")]
    pub poll_max_interval_ms: u64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// How long terminal jobs stay queryable before eviction
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,

    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Object storage bucket name
    pub storage_bucket: String,

    /// Object storage endpoint URL (S3-compatible)
    pub storage_endpoint: String,

    #[serde(default = "default_storage_region")]
    pub storage_region: String,

    /// Access key ID (S3-compatible)
    pub storage_access_key: String,

    /// Secret access key (S3-compatible)
    pub storage_secret_key: String,

    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,

    /// Public URL prefix for stored assets (CDN or custom domain)
    pub storage_public_base_url: Option<String>,

    /// Redis connection string for the status cache. Cache is disabled when unset.
    pub redis_url: Option<String>,

    #[serde(default = "default_status_cache_ttl_secs")]
    pub status_cache_ttl_secs: u64,

    /// Maximum accepted image upload size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Comma-separated list of accepted image MIME types
    #[serde(default = "default_allowed_image_types")]
    pub allowed_image_types: String,

    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_tripo_api_url() -> String {
    "https://api.tripo3d.ai".to_string()
}

fn default_tripo_api_timeout_ms() -> u64 {
    30_000
}

fn default_tripo_download_timeout_ms() -> u64 {
    60_000
}

fn default_tripo_max_retries() -> u32 {
    3
}

fn default_tripo_retry_delay_ms() -> u64 {
    1_000
}

fn default_tripo_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_poll_max_interval_ms() -> u64 {
    30_000
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_job_retention_hours() -> u64 {
    24
}

fn default_eviction_interval_secs() -> u64 {
    3_600
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_storage_region() -> String {
    "auto".to_string()
}

fn default_storage_timeout_ms() -> u64 {
    60_000
}

fn default_status_cache_ttl_secs() -> u64 {
    3_600
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_image_types() -> String {
    "image/jpeg,image/png,image/webp".to_string()
}

fn default_max_text_length() -> usize {
    1_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Network-level retry policy for provider submit/poll calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.tripo_max_retries,
            base_delay: Duration::from_millis(self.tripo_retry_delay_ms),
            max_delay: Duration::from_millis(self.tripo_retry_max_delay_ms),
            jitter: self.tripo_retry_jitter,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_max_interval: Duration::from_millis(self.poll_max_interval_ms),
            poll_max_attempts: self.poll_max_attempts,
            retention: Duration::from_secs(self.job_retention_hours * 3_600),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            limits: self.input_limits(),
        }
    }

    pub fn input_limits(&self) -> InputLimits {
        InputLimits {
            max_file_size: self.max_file_size,
            max_text_length: self.max_text_length,
            allowed_image_types: self
                .allowed_image_types
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}
