/// Extract Module
///
/// Turns a time window into a lazy stream of raw log records by paging
/// through the query backend with a monotonic nanosecond cursor.
///
/// Each page is requested for `[cursor, end)`. Every `(timestamp, line)` pair of
/// every returned stream is emitted in upstream order, then the cursor moves to
/// one nanosecond past the last emitted timestamp. Records sharing that exact
/// boundary timestamp are the only ones that can be delivered twice; nothing is
/// skipped. The stream ends on an empty page or once the cursor reaches `end`.
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::loki::LogStream;
use crate::models::RawRecord;

/// One page request against the query backend
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn fetch_page(&self, start_ns: i64, end_ns: i64) -> Result<Vec<LogStream>>;
}

pub type RecordStream<'a> = Pin<Box<dyn Stream<Item = Result<RawRecord>> + Send + 'a>>;

/// Pull every record in `[start, end)`
pub fn pull<B>(backend: &B, start: DateTime<Utc>, end: DateTime<Utc>) -> RecordStream<'_>
where
    B: QueryBackend + ?Sized,
{
    match (start.timestamp_nanos_opt(), end.timestamp_nanos_opt()) {
        (Some(start_ns), Some(end_ns)) => pull_ns(backend, start_ns, end_ns),
        _ => Box::pin(futures_util::stream::once(async move {
            Err(PipelineError::MalformedPayload(format!(
                "window {} to {} cannot be expressed in nanoseconds",
                start, end
            )))
        })),
    }
}

/// Pull every record in `[start_ns, end_ns)`
pub fn pull_ns<B>(backend: &B, start_ns: i64, end_ns: i64) -> RecordStream<'_>
where
    B: QueryBackend + ?Sized,
{
    let stream = async_stream::try_stream! {
        let mut cursor = start_ns;
        let mut page = 0usize;

        while cursor < end_ns {
            page += 1;
            let streams = backend.fetch_page(cursor, end_ns).await?;

            if streams.is_empty() {
                debug!("Page {} is empty, caught up at cursor {}", page, cursor);
                break;
            }

            let mut emitted = 0usize;
            let mut last_timestamp = None;

            for stream in streams {
                for (timestamp, payload) in stream.values {
                    let timestamp: i64 = timestamp.parse().map_err(|_| {
                        PipelineError::UnexpectedResponse(format!("invalid entry timestamp '{}'", timestamp))
                    })?;

                    last_timestamp = Some(timestamp);
                    emitted += 1;
                    yield RawRecord { timestamp, payload };
                }
            }

            debug!("Page {} emitted {} records", page, emitted);

            let Some(last_timestamp) = last_timestamp else {
                break;
            };

            cursor = advance_cursor(cursor, last_timestamp)?;
        }
    };

    Box::pin(stream)
}

/// Next lower bound after a page whose last record is at `last_timestamp`
fn advance_cursor(cursor: i64, last_timestamp: i64) -> Result<i64> {
    let next = last_timestamp.saturating_add(1);
    if next <= cursor {
        return Err(PipelineError::UnexpectedResponse(format!(
            "page ending at {} does not advance cursor {}",
            last_timestamp, cursor
        )));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt, TryStreamExt};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves canned pages and records the bounds of every request
    struct FakeBackend {
        pages: Mutex<VecDeque<Result<Vec<LogStream>>>>,
        requests: Mutex<Vec<(i64, i64)>>,
    }

    impl FakeBackend {
        fn new(pages: Vec<Result<Vec<LogStream>>>) -> Self {
            Self { pages: Mutex::new(pages.into()), requests: Mutex::new(Vec::new()) }
        }

        fn requests(&self) -> Vec<(i64, i64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryBackend for FakeBackend {
        async fn fetch_page(&self, start_ns: i64, end_ns: i64) -> Result<Vec<LogStream>> {
            self.requests.lock().unwrap().push((start_ns, end_ns));
            self.pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn stream(values: &[(i64, &str)]) -> LogStream {
        LogStream {
            values: values.iter().map(|(ts, line)| (ts.to_string(), line.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_advance_cursor() {
        assert_eq!(advance_cursor(0, 150).unwrap(), 151);
        assert_eq!(advance_cursor(150, 150).unwrap(), 151);
        assert!(advance_cursor(151, 150).is_err());
    }

    #[tokio::test]
    async fn test_empty_first_page_stops() {
        let backend = FakeBackend::new(vec![Ok(vec![])]);

        let records: Vec<RawRecord> = pull_ns(&backend, 0, 1_000).try_collect().await.unwrap();

        assert!(records.is_empty());
        assert_eq!(backend.requests(), vec![(0, 1_000)]);
    }

    #[tokio::test]
    async fn test_cursor_advances_one_past_last_timestamp() {
        let backend = FakeBackend::new(vec![
            Ok(vec![stream(&[(100, "a"), (150, "b")])]),
            Ok(vec![stream(&[(150, "b"), (151, "c")])]),
            Ok(vec![]),
        ]);

        let records: Vec<RawRecord> = pull_ns(&backend, 0, 1_000).try_collect().await.unwrap();

        assert_eq!(backend.requests(), vec![(0, 1_000), (151, 1_000), (152, 1_000)]);
        let payloads: Vec<&str> = records.iter().map(|r| r.payload.as_str()).collect();
        assert_eq!(payloads, vec!["a", "b", "b", "c"]);
        assert_eq!(records[3].timestamp, 151);
    }

    #[tokio::test]
    async fn test_stops_when_cursor_reaches_end() {
        let backend = FakeBackend::new(vec![Ok(vec![stream(&[(500, "a"), (999, "b")])])]);

        let records: Vec<RawRecord> = pull_ns(&backend, 0, 1_000).try_collect().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(backend.requests(), vec![(0, 1_000)]);
    }

    #[tokio::test]
    async fn test_emits_every_stream_and_uses_last_emitted_timestamp() {
        let backend = FakeBackend::new(vec![
            Ok(vec![stream(&[(10, "a"), (20, "b")]), stream(&[(15, "c")])]),
            Ok(vec![]),
        ]);

        let records: Vec<RawRecord> = pull_ns(&backend, 0, 100).try_collect().await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[2], RawRecord { timestamp: 15, payload: "c".to_string() });
        assert_eq!(backend.requests()[1], (16, 100));
    }

    #[tokio::test]
    async fn test_empty_window_makes_no_request() {
        let backend = FakeBackend::new(vec![]);

        let records: Vec<RawRecord> = pull_ns(&backend, 1_000, 1_000).try_collect().await.unwrap();

        assert!(records.is_empty());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_timestamp_aborts_pull() {
        let backend = FakeBackend::new(vec![Ok(vec![LogStream {
            values: vec![("not-a-number".to_string(), "a".to_string())],
            ..Default::default()
        }])]);

        let result: Result<Vec<RawRecord>> = pull_ns(&backend, 0, 100).try_collect().await;

        assert!(matches!(result, Err(PipelineError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_non_advancing_page_aborts_pull() {
        let backend = FakeBackend::new(vec![Ok(vec![stream(&[(5, "old")])])]);

        let result: Result<Vec<RawRecord>> = pull_ns(&backend, 50, 100).try_collect().await;

        assert!(matches!(result, Err(PipelineError::UnexpectedResponse(_))));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_ends_stream_after_emitted_records() {
        let backend = FakeBackend::new(vec![
            Ok(vec![stream(&[(1, "a")])]),
            Err(PipelineError::UnexpectedResponse("boom".to_string())),
        ]);

        let mut records = pull_ns(&backend, 0, 100);

        assert_eq!(records.next().await.unwrap().unwrap().payload, "a");
        assert!(records.next().await.unwrap().is_err());
        assert!(records.next().await.is_none());
    }

    #[tokio::test]
    async fn test_pull_converts_window_to_nanoseconds() {
        let backend = FakeBackend::new(vec![Ok(vec![])]);
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let end = DateTime::from_timestamp(1_700_000_300, 0).unwrap();

        let records: Vec<RawRecord> = pull(&backend, start, end).try_collect().await.unwrap();

        assert!(records.is_empty());
        assert_eq!(backend.requests(), vec![(1_700_000_000_000_000_000, 1_700_000_300_000_000_000)]);
    }
}
