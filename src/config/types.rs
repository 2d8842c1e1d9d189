use crate::archive::ArchiveSettings;
use crate::collector::{CollectorSettings, RetryConfig};
use crate::sink::SinkSettings;
use crate::source::http::UpstreamSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The YAML file as written. Validation turns it into a [`Config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub source: SourceConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub mode: SourceMode,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub since_id: Option<u64>,
    #[serde(default)]
    pub max_id: Option<u64>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub partition: Option<u32>,
    #[serde(default = "default_request_delay", with = "humantime_serde")]
    pub request_delay: Duration,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_per_page() -> u32 {
    100
}

fn default_request_delay() -> Duration {
    Duration::from_millis(2100)
}

fn default_timeout() -> Duration {
    Duration::from_secs(90)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    ContinuousStream,
    PaginatedPoll,
    PartitionedStream,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::ContinuousStream => write!(f, "continuous-stream"),
            SourceMode::PaginatedPoll => write!(f, "paginated-poll"),
            SourceMode::PartitionedStream => write!(f, "partitioned-stream"),
        }
    }
}

/// API generation of the upstream; decides the `created_at` layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub mode: SinkMode,
    #[serde(default)]
    pub rotation_threshold: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub rotation_interval: Option<Duration>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

pub const DEFAULT_ROTATION_THRESHOLD: usize = 15000;
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn default_file_extension() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkMode {
    ByCount,
    ByInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
    #[serde(default = "default_write_retry_delay", with = "humantime_serde")]
    pub write_retry_delay: Duration,
}

fn default_channel_capacity() -> usize {
    10000
}

fn default_write_retries() -> u32 {
    1
}

fn default_write_retry_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            retry: RetryConfig::default(),
            write_retries: default_write_retries(),
            write_retry_delay: default_write_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub source_directory: PathBuf,
    #[serde(default = "default_archive_pattern")]
    pub pattern: String,
    pub marker_path: PathBuf,
    pub bucket: String,
    #[serde(default)]
    pub folder: String,
    pub store: StoreConfig,
    /// Gzip files before upload.
    #[serde(default = "default_compress")]
    pub compress: bool,
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,
    #[serde(default = "default_retry_wait", with = "humantime_serde")]
    pub retry_wait: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_archive_pattern() -> String {
    ".*".to_string()
}

fn default_compress() -> bool {
    true
}

fn default_retention() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_retry_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Mirror into `{path}/{bucket}/{folder}` on the local filesystem.
    Local { path: PathBuf },
    /// Google Cloud Storage JSON API media upload.
    Gcs {
        #[serde(default = "default_gcs_endpoint")]
        endpoint: String,
        token: String,
    },
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

/// Validated, immutable settings for one process.
#[derive(Debug, Clone)]
pub struct Config {
    pub collector: CollectorSettings,
    pub upstream: UpstreamSettings,
    pub sink: SinkSettings,
    pub channel_capacity: usize,
    pub archive: Option<ArchiveSettings>,
}
