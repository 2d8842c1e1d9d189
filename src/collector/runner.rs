use crate::collector::backoff::{ErrorBudget, RetryConfig};
use crate::pipeline::channel::{stop_signal, EndReason, Message, Sender};
use crate::source::record::StreamItem;
use crate::source::spec::{PageQuery, SourceSpec};
use crate::source::upstream::{Upstream, UpstreamError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("fatal upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("sink stopped receiving records")]
    SinkClosed,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub spec: SourceSpec,
    /// Pause after every successful page query.
    pub request_delay: Duration,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorReport {
    pub records: u64,
    pub end: EndReason,
}

/// Outcome of one request attempt that did not fail.
enum Step {
    Continue,
    Exhausted,
    Stopped,
}

/// Reads records from one upstream and forwards them, in arrival order, to
/// the sink.
///
/// Transient failures are absorbed with exponential backoff; anything else
/// ends the run. Whatever the outcome, the last message sent is an
/// [`Message::End`].
pub struct Collector {
    upstream: Arc<dyn Upstream>,
    settings: CollectorSettings,
    output: Sender<Message>,
    shutdown: watch::Receiver<bool>,
    budget: ErrorBudget,
    cursor: Option<u64>,
    received: u64,
}

impl Collector {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        settings: CollectorSettings,
        output: Sender<Message>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let budget = ErrorBudget::new(settings.retry);
        let cursor = match &settings.spec {
            SourceSpec::PaginatedPoll { max_id, .. } => *max_id,
            _ => None,
        };

        Self {
            upstream,
            settings,
            output,
            shutdown,
            budget,
            cursor,
            received: 0,
        }
    }

    pub async fn run(mut self) -> Result<CollectorReport, CollectorError> {
        info!(source = %self.settings.spec, "Collector started");

        let result = self.collect().await;
        let end = match &result {
            Ok(end) => *end,
            Err(_) => EndReason::Failed,
        };

        if self.output.send(Message::End(end)).await.is_err() {
            debug!("Sink already gone, end marker not delivered");
        }

        match result {
            Ok(end) => {
                info!(records = self.received, end = %end, "Collector finished");
                Ok(CollectorReport {
                    records: self.received,
                    end,
                })
            }
            Err(e) => {
                error!(records = self.received, error = %e, "Collector stopped on fatal error");
                Err(e)
            }
        }
    }

    async fn collect(&mut self) -> Result<EndReason, CollectorError> {
        let polling = matches!(self.settings.spec, SourceSpec::PaginatedPoll { .. });

        loop {
            if self.stop_requested() {
                return Ok(EndReason::Stopped);
            }

            let attempt = if polling {
                self.poll_page().await
            } else {
                self.follow_stream().await
            };

            match attempt {
                Ok(Step::Exhausted) => return Ok(EndReason::Exhausted),
                Ok(Step::Stopped) => return Ok(EndReason::Stopped),
                Ok(Step::Continue) => {
                    let delay = self.settings.request_delay;
                    if !delay.is_zero() && self.pause(delay).await? {
                        return Ok(EndReason::Stopped);
                    }
                }
                Err(CollectorError::Upstream(e)) if e.is_transient() => {
                    let wait = self.budget.record_failure(Instant::now());
                    warn!(
                        error = %e,
                        failures = self.budget.consecutive_failures(),
                        wait_ms = wait.as_millis() as u64,
                        "Transient upstream failure, waiting before retrying"
                    );
                    if self.pause(wait).await? {
                        return Ok(EndReason::Stopped);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn poll_page(&mut self) -> Result<Step, CollectorError> {
        let SourceSpec::PaginatedPoll {
            keywords,
            since_id,
            per_page,
            ..
        } = &self.settings.spec
        else {
            return Ok(Step::Exhausted);
        };

        let query = PageQuery {
            keywords: keywords.clone(),
            since_id: *since_id,
            max_id: self.cursor,
            count: *per_page,
        };

        let records = self.upstream.fetch_page(&query).await?;
        if records.is_empty() {
            info!(downloaded = self.received, "No more records found");
            return Ok(Step::Exhausted);
        }

        // Work out the next cursor before forwarding anything, so a page we
        // cannot page past is never forwarded twice.
        let lowest = records
            .iter()
            .map(|r| r.id())
            .collect::<Option<Vec<u64>>>()
            .and_then(|ids| ids.into_iter().min())
            .ok_or(UpstreamError::CursorStalled)?;

        let count = records.len() as u64;
        for record in records {
            self.forward(Message::Record(record)).await?;
        }
        self.received += count;
        self.cursor = Some(lowest.saturating_sub(1));

        info!(
            page = count,
            downloaded = self.received,
            next_max_id = lowest.saturating_sub(1),
            "Downloaded page"
        );

        Ok(Step::Continue)
    }

    async fn follow_stream(&mut self) -> Result<Step, CollectorError> {
        let Some(request) = self.settings.spec.stream_request() else {
            return Ok(Step::Exhausted);
        };

        let mut items = self.upstream.open_stream(&request).await?;
        info!(source = %self.settings.spec, "Connected, collecting records");

        loop {
            let next = tokio::select! {
                item = items.next() => item,
                _ = stop_signal(&mut self.shutdown) => return Ok(Step::Stopped),
                _ = self.output.closed() => return Err(CollectorError::SinkClosed),
            };

            let value = match next {
                Some(item) => item?,
                None => return Err(UpstreamError::StreamClosed.into()),
            };

            match StreamItem::classify(value) {
                StreamItem::Record(record) => {
                    self.forward(Message::Record(record)).await?;
                    self.received += 1;
                    if self.received % 1000 == 0 {
                        debug!(received = self.received, "Streaming progress");
                    }
                }
                StreamItem::StallWarning(warning) => {
                    self.forward(Message::StallWarning(warning)).await?;
                }
                StreamItem::Disconnect { code, reason } => {
                    return Err(UpstreamError::Disconnect { code, reason }.into());
                }
                StreamItem::Control(value) => {
                    debug!(item = %value, "Ignoring control message");
                }
            }
        }
    }

    async fn forward(&self, message: Message) -> Result<(), CollectorError> {
        self.output
            .send(message)
            .await
            .map_err(|_| CollectorError::SinkClosed)
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `duration`, returning `true` if a stop was requested meanwhile.
    async fn pause(&mut self, duration: Duration) -> Result<bool, CollectorError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(false),
            _ = stop_signal(&mut self.shutdown) => Ok(true),
            _ = self.output.closed() => Err(CollectorError::SinkClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::create_channel;
    use crate::source::record::Record;
    use crate::source::spec::StreamRequest;
    use crate::source::upstream::ItemStream;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Upstream that replays canned responses and records what was asked.
    #[derive(Default)]
    struct Scripted {
        pages: Mutex<VecDeque<Result<Vec<Record>, UpstreamError>>>,
        streams: Mutex<VecDeque<Vec<Result<Value, UpstreamError>>>>,
        queries: Mutex<Vec<PageQuery>>,
        opened: Mutex<u32>,
    }

    #[async_trait]
    impl Upstream for Scripted {
        async fn open_stream(&self, _request: &StreamRequest) -> Result<ItemStream, UpstreamError> {
            *self.opened.lock().unwrap() += 1;
            let items = self
                .streams
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Record>, UpstreamError> {
            self.queries.lock().unwrap().push(query.clone());
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn tweet(id: u64) -> Record {
        Record::new(json!({"id": id, "text": format!("tweet {}", id)}))
    }

    fn settings(spec: SourceSpec) -> CollectorSettings {
        CollectorSettings {
            spec,
            request_delay: Duration::from_millis(2100),
            retry: RetryConfig::default(),
        }
    }

    fn poll_spec() -> SourceSpec {
        SourceSpec::PaginatedPoll {
            keywords: vec!["covid".to_string()],
            since_id: 100,
            max_id: None,
            per_page: 100,
        }
    }

    fn stream_spec() -> SourceSpec {
        SourceSpec::ContinuousStream {
            keywords: vec!["covid".to_string()],
        }
    }

    async fn drain(mut rx: crate::pipeline::channel::Receiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(message) = rx.recv().await {
            out.push(message);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_advances_cursor_and_ends_on_empty_page() {
        let upstream = Arc::new(Scripted::default());
        upstream
            .pages
            .lock()
            .unwrap()
            .extend([Ok(vec![tweet(205), tweet(204), tweet(201)]), Ok(Vec::new())]);

        let (tx, rx) = create_channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let collector = Collector::new(upstream.clone(), settings(poll_spec()), tx, stop_rx);

        let report = collector.run().await.unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.end, EndReason::Exhausted);

        let queries = upstream.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].max_id, None);
        assert_eq!(queries[0].since_id, 100);
        assert_eq!(queries[1].max_id, Some(200));

        let messages = drain(rx).await;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3], Message::End(EndReason::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_without_ids_is_fatal_and_not_forwarded() {
        let upstream = Arc::new(Scripted::default());
        upstream
            .pages
            .lock()
            .unwrap()
            .push_back(Ok(vec![Record::new(json!({"text": "no id"}))]));

        let (tx, rx) = create_channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let result = Collector::new(upstream, settings(poll_spec()), tx, stop_rx)
            .run()
            .await;

        assert!(matches!(
            result,
            Err(CollectorError::Upstream(UpstreamError::CursorStalled))
        ));
        assert_eq!(drain(rx).await, vec![Message::End(EndReason::Failed)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_page_failure_is_retried() {
        let upstream = Arc::new(Scripted::default());
        upstream.pages.lock().unwrap().extend([
            Err(UpstreamError::Timeout),
            Err(UpstreamError::Malformed("truncated".to_string())),
            Ok(vec![tweet(7)]),
            Ok(Vec::new()),
        ]);

        let (tx, rx) = create_channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let report = Collector::new(upstream.clone(), settings(poll_spec()), tx, stop_rx)
            .run()
            .await
            .unwrap();

        assert_eq!(report.records, 1);
        assert_eq!(upstream.queries.lock().unwrap().len(), 4);
        assert_eq!(drain(rx).await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_disconnect_is_not_retried() {
        for code in [2, 5, 6, 7] {
            let upstream = Arc::new(Scripted::default());
            upstream.streams.lock().unwrap().push_back(vec![
                Ok(json!({"id": 1, "text": "a"})),
                Ok(json!({"disconnect": {"code": code, "reason": "fatal"}})),
            ]);

            let (tx, rx) = create_channel(16);
            let (_stop_tx, stop_rx) = watch::channel(false);
            let result = Collector::new(upstream.clone(), settings(stream_spec()), tx, stop_rx)
                .run()
                .await;

            assert!(matches!(
                result,
                Err(CollectorError::Upstream(UpstreamError::Disconnect { code: c, .. })) if c == code
            ));
            assert_eq!(*upstream.opened.lock().unwrap(), 1);

            let messages = drain(rx).await;
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[1], Message::End(EndReason::Failed));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_disconnect_reconnects() {
        let upstream = Arc::new(Scripted::default());
        upstream.streams.lock().unwrap().extend([
            vec![
                Ok(json!({"id": 1, "text": "a"})),
                Ok(json!({"disconnect": {"code": 4, "reason": "admin logout"}})),
            ],
            vec![
                Ok(json!({"id": 2, "text": "b"})),
                Ok(json!({"disconnect": {"code": 6, "reason": "stall"}})),
            ],
        ]);

        let (tx, rx) = create_channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let result = Collector::new(upstream.clone(), settings(stream_spec()), tx, stop_rx)
            .run()
            .await;

        assert!(result.is_err());
        assert_eq!(*upstream.opened.lock().unwrap(), 2);

        let ids: Vec<Option<u64>> = drain(rx)
            .await
            .into_iter()
            .filter_map(|m| match m {
                Message::Record(r) => Some(r.id()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_warning_is_forwarded_and_control_ignored() {
        let upstream = Arc::new(Scripted::default());
        upstream.streams.lock().unwrap().push_back(vec![
            Ok(json!({"limit": {"track": 3}})),
            Ok(json!({"warning": {"code": "FALLING_BEHIND", "percent_full": 80}})),
            Ok(json!({"disconnect": {"code": 7, "reason": "too many connections"}})),
        ]);

        let (tx, rx) = create_channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let _ = Collector::new(upstream, settings(stream_spec()), tx, stop_rx)
            .run()
            .await;

        let messages = drain(rx).await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            Message::StallWarning(w) if w.percent_full == Some(80)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_request_ends_with_stopped_marker() {
        let upstream = Arc::new(Scripted::default());
        // Every attempt ends in a closed stream, so the collector backs off forever.
        let (tx, rx) = create_channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(
            Collector::new(upstream.clone(), settings(stream_spec()), tx, stop_rx).run(),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        stop_tx.send(true).unwrap();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.end, EndReason::Stopped);
        assert!(*upstream.opened.lock().unwrap() > 1);
        assert_eq!(drain(rx).await, vec![Message::End(EndReason::Stopped)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_sink_stops_collector() {
        let upstream = Arc::new(Scripted::default());
        upstream
            .pages
            .lock()
            .unwrap()
            .push_back(Ok(vec![tweet(3), tweet(2)]));

        let (tx, rx) = create_channel(16);
        drop(rx);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let result = Collector::new(upstream, settings(poll_spec()), tx, stop_rx)
            .run()
            .await;

        assert!(matches!(result, Err(CollectorError::SinkClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_gone_during_backoff_stops_collector() {
        let upstream = Arc::new(Scripted::default());
        let (tx, rx) = create_channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(
            Collector::new(upstream, settings(stream_spec()), tx, stop_rx).run(),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(rx);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CollectorError::SinkClosed)));
    }
}
