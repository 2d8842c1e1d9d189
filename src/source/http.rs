use crate::config::types::SourceMode;
use crate::source::record::Record;
use crate::source::spec::{PageQuery, StreamRequest};
use crate::source::upstream::{ItemStream, Upstream, UpstreamError};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

/// Connection settings for [`HttpUpstream`].
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub bearer_token: String,
    /// Connect timeout, page request timeout, and the longest a stream may
    /// stay silent before it is considered stalled.
    pub timeout: Duration,
}

pub fn default_base_url(mode: SourceMode) -> &'static str {
    match mode {
        SourceMode::ContinuousStream => "https://stream.twitter.com",
        SourceMode::PaginatedPoll | SourceMode::PartitionedStream => "https://api.twitter.com",
    }
}

/// HTTP client for the streaming and search endpoints.
#[derive(Debug)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, UpstreamError> {
        // No overall request timeout: streaming responses never finish.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .user_agent(concat!("spike/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            bearer_token: settings.bearer_token.clone(),
            timeout: settings.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ItemStream, UpstreamError> {
        let (path, params) = match request {
            StreamRequest::Filter { keywords } => (
                "1.1/statuses/filter.json",
                vec![("track", keywords.join(","))],
            ),
            StreamRequest::Partition { partition } => (
                "labs/1/tweets/stream/covid19",
                vec![("partition", partition.to_string())],
            ),
        };

        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.bearer_token)
            .query(&params)
            .send()
            .await?;
        let response = check_status(response).await?;

        tracing::debug!(path = path, "Streaming response opened");

        Ok(split_lines(response.bytes_stream(), self.timeout))
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Record>, UpstreamError> {
        let mut params = vec![
            ("q", query.query_string()),
            ("since_id", query.since_id.to_string()),
            ("count", query.count.to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if let Some(max_id) = query.max_id {
            params.push(("max_id", max_id.to_string()));
        }

        let response = self
            .client
            .get(self.url("1.1/search/tweets.json"))
            .bearer_auth(&self.bearer_token)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: Value = response.json().await?;
        parse_search_page(body)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status { status, body })
}

/// Pull the `statuses` array out of a search response.
pub(crate) fn parse_search_page(body: Value) -> Result<Vec<Record>, UpstreamError> {
    match body {
        Value::Object(mut map) => match map.remove("statuses") {
            Some(Value::Array(items)) => Ok(items.into_iter().map(Record::new).collect()),
            _ => Err(UpstreamError::Malformed(
                "\"statuses\" not in response body".to_string(),
            )),
        },
        _ => Err(UpstreamError::Malformed(
            "search response is not a JSON object".to_string(),
        )),
    }
}

struct LineState<S> {
    chunks: Pin<Box<S>>,
    buffer: Vec<u8>,
    idle_timeout: Duration,
    finished: bool,
}

/// Turn a chunked body into one JSON value per newline-delimited line.
///
/// Blank lines are keep-alives and are skipped. A body that stays silent for
/// `idle_timeout` yields [`UpstreamError::Timeout`] and ends the stream.
pub(crate) fn split_lines<S, B, E>(chunks: S, idle_timeout: Duration) -> ItemStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<UpstreamError> + Send + 'static,
{
    let state = LineState {
        chunks: Box::pin(chunks),
        buffer: Vec::new(),
        idle_timeout,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                if let Some(item) = parse_line(&line) {
                    return Some((item, state));
                }
                continue;
            }

            if state.finished {
                let rest = std::mem::take(&mut state.buffer);
                return parse_line(&rest).map(|item| (item, state));
            }

            match tokio::time::timeout(state.idle_timeout, state.chunks.next()).await {
                Ok(Some(Ok(chunk))) => state.buffer.extend_from_slice(chunk.as_ref()),
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e.into()), state));
                }
                Ok(None) => state.finished = true,
                Err(_) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(UpstreamError::Timeout), state));
                }
            }
        }
    }))
}

fn parse_line(line: &[u8]) -> Option<Result<Value, UpstreamError>> {
    let start = line.iter().position(|b| !b.is_ascii_whitespace())?;
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace())?;
    let text = &line[start..=end];
    Some(serde_json::from_slice(text).map_err(|e| UpstreamError::Malformed(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, UpstreamError>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, UpstreamError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn test_split_lines_across_chunks() {
        let stream = split_lines(
            chunks(&["{\"id\":1,", "\"text\":\"a\"}\r\n{\"id\"", ":2}\n"]),
            Duration::from_secs(5),
        );
        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![json!({"id": 1, "text": "a"}), json!({"id": 2})]);
    }

    #[tokio::test]
    async fn test_split_lines_skips_keep_alives() {
        let stream = split_lines(
            chunks(&["\r\n", "\r\n{\"id\":1}\r\n", "\r\n"]),
            Duration::from_secs(5),
        );
        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![json!({"id": 1})]);
    }

    #[tokio::test]
    async fn test_split_lines_emits_trailing_line_without_newline() {
        let stream = split_lines(chunks(&["{\"id\":1}\n{\"id\":2}"]), Duration::from_secs(5));
        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_split_lines_reports_malformed_line() {
        let stream = split_lines(chunks(&["not json\n{\"id\":1}\n"]), Duration::from_secs(5));
        let items: Vec<Result<Value, UpstreamError>> = stream.collect().await;
        assert!(matches!(items[0], Err(UpstreamError::Malformed(_))));
        assert!(items[1].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_lines_idle_timeout() {
        let silent = futures::stream::pending::<Result<Vec<u8>, UpstreamError>>();
        let mut stream = split_lines(silent, Duration::from_secs(90));
        assert!(matches!(stream.next().await, Some(Err(UpstreamError::Timeout))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_parse_search_page() {
        let records = parse_search_page(json!({
            "statuses": [{"id": 5}, {"id": 4}],
            "search_metadata": {}
        }))
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), Some(5));
    }

    #[test]
    fn test_parse_search_page_without_statuses_is_malformed() {
        let err = parse_search_page(json!({"errors": []})).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_trims_base_url() {
        let upstream = HttpUpstream::new(&UpstreamSettings {
            base_url: "http://localhost:7105/".to_string(),
            bearer_token: "token".to_string(),
            timeout: Duration::from_secs(30),
        })
        .unwrap();
        assert_eq!(upstream.base_url(), "http://localhost:7105");
    }
}
