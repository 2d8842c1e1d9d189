use super::types::*;
use crate::archive::ArchiveSettings;
use crate::collector::CollectorSettings;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use crate::sink::{RotationPolicy, SinkSettings};
use crate::source::http::{default_base_url, UpstreamSettings};
use crate::source::spec::SourceSpec;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Expand, parse and validate a config document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut file: ConfigFile = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut file);

    validate_config(file)
}

/// Reject `$env{VAR}` placeholders left in non-comment lines after expansion.
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut missing: Vec<String> = yaml_string
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| re.captures_iter(line))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();
    missing.dedup();

    Err(ConfigError::Validation(format!(
        "unset environment variable(s) referenced in config: {} (export them or put the values in the file)",
        missing.join(", ")
    )))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(file: &mut ConfigFile) {
    if let Some(dir) = file.sink.output_directory.as_mut() {
        *dir = expand_tilde(dir);
    }

    if let Some(archive) = file.archive.as_mut() {
        archive.source_directory = expand_tilde(&archive.source_directory);
        archive.marker_path = expand_tilde(&archive.marker_path);
        if let StoreConfig::Local { path } = &mut archive.store {
            *path = expand_tilde(path);
        }
    }
}

fn validate_config(file: ConfigFile) -> Result<Config, ConfigError> {
    let mut errors = Vec::new();

    let spec = validate_source(&file.source, &mut errors);
    let bearer_token = validate_credentials(&file.credentials, &mut errors);
    let sink = validate_sink(&file.sink, &file.source, &file.pipeline, &mut errors);
    validate_pipeline(&file.pipeline, &mut errors);
    let archive = file
        .archive
        .as_ref()
        .and_then(|archive| validate_archive(archive, &mut errors));

    match (spec, bearer_token, sink) {
        (Some(spec), Some(bearer_token), Some(sink)) if errors.is_empty() => {
            let base_url = file
                .source
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(file.source.mode).to_string());

            Ok(Config {
                collector: CollectorSettings {
                    spec,
                    request_delay: file.source.request_delay,
                    retry: file.pipeline.retry,
                },
                upstream: UpstreamSettings {
                    base_url,
                    bearer_token,
                    timeout: file.source.timeout,
                },
                sink,
                channel_capacity: file.pipeline.channel_capacity,
                archive,
            })
        }
        _ => Err(ConfigError::ValidationList(errors)),
    }
}

fn validate_source(source: &SourceConfig, errors: &mut Vec<String>) -> Option<SourceSpec> {
    let mode = source.mode;
    let before = errors.len();

    let keywords: Vec<String> = source
        .keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    let needs_keywords = matches!(mode, SourceMode::ContinuousStream | SourceMode::PaginatedPoll);
    if needs_keywords && keywords.is_empty() {
        errors.push(format!("source: mode '{}' requires at least one keyword", mode));
    }
    if !needs_keywords && !source.keywords.is_empty() {
        errors.push(format!("source: keywords are not used by mode '{}'", mode));
    }

    if mode == SourceMode::PaginatedPoll {
        if source.since_id.is_none() {
            errors.push("source: mode 'paginated-poll' requires since_id".to_string());
        }
        if let (Some(since), Some(max)) = (source.since_id, source.max_id) {
            if max <= since {
                errors.push(format!(
                    "source: max_id ({}) must be greater than since_id ({})",
                    max, since
                ));
            }
        }
        if source.per_page == 0 {
            errors.push("source: per_page must be greater than 0".to_string());
        }
    } else if source.since_id.is_some() || source.max_id.is_some() {
        errors.push(format!(
            "source: since_id/max_id are only valid with mode 'paginated-poll', not '{}'",
            mode
        ));
    }

    if mode == SourceMode::PartitionedStream {
        if source.partition.is_none() {
            errors.push("source: mode 'partitioned-stream' requires partition".to_string());
        }
    } else if source.partition.is_some() {
        errors.push(format!(
            "source: partition is only valid with mode 'partitioned-stream', not '{}'",
            mode
        ));
    }

    if source.timeout.is_zero() {
        errors.push("source: timeout must be greater than 0".to_string());
    }

    if let Some(url) = &source.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!("source: base_url '{}' must be an http(s) URL", url));
        }
    }

    if errors.len() > before {
        return None;
    }

    match mode {
        SourceMode::ContinuousStream => Some(SourceSpec::ContinuousStream { keywords }),
        SourceMode::PaginatedPoll => Some(SourceSpec::PaginatedPoll {
            keywords,
            since_id: source.since_id?,
            max_id: source.max_id,
            per_page: source.per_page,
        }),
        SourceMode::PartitionedStream => Some(SourceSpec::PartitionedStream {
            partition: source.partition?,
        }),
    }
}

fn validate_credentials(credentials: &CredentialsConfig, errors: &mut Vec<String>) -> Option<String> {
    match credentials.bearer_token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => Some(token.to_string()),
        _ => {
            errors.push("credentials: bearer_token is required".to_string());
            None
        }
    }
}

fn validate_sink(
    sink: &SinkConfig,
    source: &SourceConfig,
    pipeline: &PipelineConfig,
    errors: &mut Vec<String>,
) -> Option<SinkSettings> {
    let before = errors.len();

    let policy = match sink.mode {
        SinkMode::ByCount => {
            if sink.rotation_interval.is_some() {
                errors.push("sink: rotation_interval is only valid with mode 'by-interval'".to_string());
            }
            let threshold = sink.rotation_threshold.unwrap_or(DEFAULT_ROTATION_THRESHOLD);
            if threshold == 0 {
                errors.push("sink: rotation_threshold must be greater than 0".to_string());
            }
            RotationPolicy::Count(threshold)
        }
        SinkMode::ByInterval => {
            if sink.rotation_threshold.is_some() {
                errors.push("sink: rotation_threshold is only valid with mode 'by-count'".to_string());
            }
            let interval = sink.rotation_interval.unwrap_or(DEFAULT_ROTATION_INTERVAL);
            if interval.is_zero() {
                errors.push("sink: rotation_interval must be greater than 0".to_string());
            }
            RotationPolicy::Interval(interval)
        }
    };

    let file_prefix = match sink.file_prefix.as_deref().map(str::trim) {
        Some(prefix) if !prefix.is_empty() => {
            if prefix.contains('/') || prefix.contains('\\') {
                errors.push(format!("sink: file_prefix '{}' must not contain path separators", prefix));
            }
            prefix.to_string()
        }
        _ => {
            errors.push("sink: file_prefix is required".to_string());
            String::new()
        }
    };

    let output_directory = match &sink.output_directory {
        Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
        _ => {
            errors.push("sink: output_directory is required".to_string());
            Default::default()
        }
    };

    let file_extension = sink.file_extension.trim_start_matches('.').to_string();
    if file_extension.is_empty() {
        errors.push("sink: file_extension must not be empty".to_string());
    }

    if errors.len() > before {
        return None;
    }

    Some(SinkSettings {
        policy,
        output_directory,
        file_prefix,
        file_extension,
        timestamps: source.api_version.into(),
        write_retries: pipeline.write_retries,
        write_retry_delay: pipeline.write_retry_delay,
    })
}

fn validate_pipeline(pipeline: &PipelineConfig, errors: &mut Vec<String>) {
    if pipeline.channel_capacity == 0 {
        errors.push("pipeline: channel_capacity must be greater than 0".to_string());
    }

    let retry = &pipeline.retry;
    if retry.base_delay.is_zero() {
        errors.push("pipeline.retry: base_delay must be greater than 0".to_string());
    }
    if retry.max_delay < retry.base_delay {
        errors.push(format!(
            "pipeline.retry: max_delay ({:?}) must not be less than base_delay ({:?})",
            retry.max_delay, retry.base_delay
        ));
    }
}

fn validate_archive(archive: &ArchiveConfig, errors: &mut Vec<String>) -> Option<ArchiveSettings> {
    let before = errors.len();

    let pattern = match Regex::new(&archive.pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            errors.push(format!("archive: invalid pattern '{}': {}", archive.pattern, e));
            None
        }
    };

    if archive.bucket.trim().is_empty() {
        errors.push("archive: bucket must not be empty".to_string());
    }
    if archive.poll_interval.is_zero() {
        errors.push("archive: poll_interval must be greater than 0".to_string());
    }
    if let StoreConfig::Gcs { token, .. } = &archive.store {
        if token.trim().is_empty() {
            errors.push("archive.store: gcs requires a token".to_string());
        }
    }

    if errors.len() > before {
        return None;
    }

    Some(ArchiveSettings {
        source_directory: archive.source_directory.clone(),
        pattern: pattern?,
        marker_path: archive.marker_path.clone(),
        bucket: archive.bucket.trim().to_string(),
        folder: archive.folder.trim_matches('/').to_string(),
        store: archive.store.clone(),
        compress: archive.compress,
        retention: archive.retention,
        retry_wait: archive.retry_wait,
        poll_interval: archive.poll_interval,
    })
}
