pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# SPIKE CONFIGURATION
# =============================================================================
# Spike collects posts from one upstream feed and writes them to rotating
# batch files. An optional archive job mirrors those files to object storage.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/spike/config.yml
#   3. /etc/spike/config.yml
#
# $env{VAR} placeholders are replaced with environment variables before the
# file is parsed. Durations accept humantime syntax: 250ms, 90s, 15m, 7days.

# =============================================================================
# SOURCE
# =============================================================================
source:
  # One of:
  #   continuous-stream   - keyword-filtered stream (needs keywords)
  #   paginated-poll      - historical search, newest first (needs keywords, since_id)
  #   partitioned-stream  - one partition of a curated stream (needs partition)
  mode: continuous-stream

  # v1 payloads carry 'Thu Jan 28 09:28:54 +0000 2021' timestamps,
  # v2 payloads carry ISO-8601 ones
  api_version: v1

  keywords:
    - covid
    - coronavirus

  # paginated-poll only: lower bound (exclusive) and optional upper bound
  # since_id: 1350000000000000000
  # max_id: 1360000000000000000
  # per_page: 100

  # partitioned-stream only
  # partition: 1

  # Pause between successful page queries (paginated-poll)
  request_delay: 2100ms

  # Connect/request timeout and the longest a stream may stay silent
  timeout: 90s

  # Defaults to the public endpoint for the selected mode
  # base_url: https://stream.twitter.com

credentials:
  bearer_token: $env{TWITTER_BEARER_TOKEN}

# =============================================================================
# SINK
# =============================================================================
sink:
  # by-count: new file every rotation_threshold records
  # by-interval: new file every rotation_interval
  mode: by-count
  rotation_threshold: 15000
  # rotation_interval: 15m

  # Files are named {file_prefix}-{YYYY-MM-DD-HH-MM-SS}-{uuid}.{file_extension}
  file_prefix: covid
  output_directory: ~/spike/data
  file_extension: json

# =============================================================================
# PIPELINE
# =============================================================================
pipeline:
  # Records buffered between collector and sink before the collector waits
  channel_capacity: 10000

  # Backoff for transient upstream failures: base_delay doubles per failure
  # up to max_delay, and the count starts over after reset_after without one
  retry:
    base_delay: 250ms
    max_delay: 30s
    reset_after: 15m

  # Extra attempts for a batch that failed to write
  write_retries: 1
  write_retry_delay: 1s

# =============================================================================
# ARCHIVE (optional, used by `spike archive`)
# =============================================================================
# archive:
#   source_directory: ~/spike/data
#   pattern: '^covid-.*\.json$'
#   marker_path: ~/spike/archive-marker.json
#   bucket: tweets
#   folder: raw
#   store:
#     type: gcs
#     token: $env{GCS_ACCESS_TOKEN}
#   # or:
#   # store:
#   #   type: local
#   #   path: /mnt/backup
#   compress: true            # upload {name}.gz instead of the raw file
#   retention: 7days
#   retry_wait: 5s
#   poll_interval: 15m
"#
    .to_string()
}
