use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use window_api::{Page, RawRecord, ServiceError, ShardCursor, StartPosition, StreamService};
use window_engine::{
    Completion, RetryPolicy, ShardWalker, TruncationReason, WalkLimits, WindowError,
};

// ═══════════════════════════════════════════════════════════════
//  Scripted service
// ═══════════════════════════════════════════════════════════════

/// What the service answers once the script runs out.
enum Fallback {
    Page(Page),
    /// Exactly `limit` records, still lagging.
    FullPages,
    /// Never resolves.
    Stall,
}

/// Replays a fixed sequence of page responses, then answers with `fallback`.
struct ScriptedService {
    cursor: Result<ShardCursor, ServiceError>,
    pages: Mutex<VecDeque<Result<Page, ServiceError>>>,
    fallback: Fallback,
    page_calls: AtomicUsize,
    limits: Mutex<Vec<usize>>,
}

impl ScriptedService {
    fn new(pages: Vec<Result<Page, ServiceError>>) -> Self {
        Self {
            cursor: Ok(ShardCursor::new("c0")),
            pages: Mutex::new(pages.into()),
            fallback: Fallback::Page(page(0, 0)),
            page_calls: AtomicUsize::new(0),
            limits: Mutex::new(Vec::new()),
        }
    }

    fn with_cursor_error(mut self, error: ServiceError) -> Self {
        self.cursor = Err(error);
        self
    }

    fn with_fallback(mut self, fallback: Page) -> Self {
        self.fallback = Fallback::Page(fallback);
        self
    }

    fn full_pages(mut self) -> Self {
        self.fallback = Fallback::FullPages;
        self
    }

    fn stalling(mut self) -> Self {
        self.fallback = Fallback::Stall;
        self
    }

    fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// `limit` of every `get_page` call, in order.
    fn requested_limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

impl StreamService for ScriptedService {
    fn get_cursor(
        &self,
        _stream: &str,
        _shard_id: &str,
        _position: StartPosition,
    ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, ServiceError>> + Send + '_>> {
        let result = self.cursor.clone();
        Box::pin(async move { result })
    }

    fn get_page(
        &self,
        _cursor: &ShardCursor,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Page, ServiceError>> + Send + '_>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        let scripted = self.pages.lock().unwrap().pop_front();
        let next = match (scripted, &self.fallback) {
            (Some(next), _) => next,
            (None, Fallback::Page(p)) => Ok(p.clone()),
            (None, Fallback::FullPages) => Ok(page(limit, 1)),
            (None, Fallback::Stall) => {
                return Box::pin(std::future::pending::<Result<Page, ServiceError>>());
            }
        };
        Box::pin(async move { next })
    }
}

fn page(records: usize, lag_millis: u64) -> Page {
    Page {
        records: (0..records)
            .map(|i| RawRecord::new(format!("{{\"n\":{i}}}").into_bytes(), "pk", i.to_string()))
            .collect(),
        next_cursor: Some(ShardCursor::new("next")),
        lag_millis,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

fn walker(service: Arc<ScriptedService>) -> ShardWalker {
    ShardWalker::new(service)
        .with_retry(fast_retry())
        .with_limits(WalkLimits {
            empty_page_backoff: Duration::from_millis(1),
            ..WalkLimits::default()
        })
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn stops_on_empty_page_without_lag() {
    let service = Arc::new(ScriptedService::new(vec![Ok(page(3, 500)), Ok(page(2, 0)), Ok(page(0, 0))]));
    let walk = walker(service.clone())
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.records.len(), 5);
    assert_eq!(walk.pages, 3);
    assert_eq!(walk.completion, Completion::Drained);
    assert_eq!(service.page_calls(), 3);
}

#[tokio::test]
async fn keeps_polling_empty_pages_while_lagging() {
    let service = Arc::new(ScriptedService::new(vec![
        Ok(page(0, 1000)),
        Ok(page(0, 800)),
        Ok(page(1, 10)),
        Ok(page(0, 0)),
    ]));
    let walk = walker(service.clone())
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.records.len(), 1);
    assert_eq!(walk.pages, 4);
    assert_eq!(walk.completion, Completion::Drained);
}

#[tokio::test]
async fn perpetual_lag_is_truncated_at_max_pages() {
    let service = Arc::new(ScriptedService::new(Vec::new()).with_fallback(page(0, 5000)));
    let walker = ShardWalker::new(service.clone()).with_limits(WalkLimits {
        max_pages: 5,
        empty_page_backoff: Duration::ZERO,
        ..WalkLimits::default()
    });

    let walk = walker
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.completion, Completion::Truncated(TruncationReason::MaxPages));
    assert_eq!(walk.pages, 5);
    assert_eq!(service.page_calls(), 5);
}

#[tokio::test]
async fn record_ceiling_truncates() {
    let service = Arc::new(ScriptedService::new(Vec::new()).with_fallback(page(4, 100)));
    let walker = ShardWalker::new(service).with_limits(WalkLimits {
        max_records: 10,
        ..WalkLimits::default()
    });

    let walk = walker
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.completion, Completion::Truncated(TruncationReason::MaxRecords));
    assert_eq!(walk.records.len(), 10);
}

#[tokio::test]
async fn record_ceiling_shrinks_the_last_request() {
    let service = Arc::new(ScriptedService::new(Vec::new()).full_pages());
    let walker = ShardWalker::new(service.clone()).with_limits(WalkLimits {
        max_records: 150,
        ..WalkLimits::default()
    });

    let walk = walker
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.completion, Completion::Truncated(TruncationReason::MaxRecords));
    assert_eq!(walk.records.len(), 150);
    assert_eq!(service.requested_limits(), [100, 50]);
}

#[tokio::test(start_paused = true)]
async fn perpetual_lag_is_truncated_at_max_elapsed() {
    let service = Arc::new(ScriptedService::new(Vec::new()).with_fallback(page(0, 5000)));
    let walker = ShardWalker::new(service.clone()).with_limits(WalkLimits {
        max_elapsed: Duration::from_secs(1),
        empty_page_backoff: Duration::from_millis(200),
        ..WalkLimits::default()
    });

    let walk = walker
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.completion, Completion::Truncated(TruncationReason::MaxElapsed));
    assert!(walk.pages >= 5);
    assert!(walk.pages < 1000);
}

#[tokio::test(start_paused = true)]
async fn stalled_page_request_is_cut_at_max_elapsed() {
    let service = Arc::new(ScriptedService::new(vec![Ok(page(3, 100))]).stalling());
    let walker = ShardWalker::new(service.clone()).with_limits(WalkLimits {
        max_elapsed: Duration::from_secs(2),
        ..WalkLimits::default()
    });

    let walk = walker
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.completion, Completion::Truncated(TruncationReason::MaxElapsed));
    assert_eq!(walk.records.len(), 3);
    assert_eq!(walk.pages, 1);
    assert_eq!(service.page_calls(), 2);
}

#[tokio::test]
async fn unknown_stream_is_client_error() {
    let service = Arc::new(
        ScriptedService::new(Vec::new()).with_cursor_error(ServiceError::unknown_stream("nope")),
    );
    let err = walker(service.clone())
        .fetch_window("nope", 0, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, WindowError::UnknownStream { ref stream } if stream == "nope"));
    assert_eq!(err.status_class(), window_engine::StatusClass::Client);
    assert_eq!(service.page_calls(), 0);
}

#[tokio::test]
async fn throttled_page_is_retried() {
    let service = Arc::new(ScriptedService::new(vec![
        Ok(page(2, 100)),
        Err(ServiceError::throttled("rate exceeded")),
        Ok(page(1, 0)),
        Ok(page(0, 0)),
    ]));
    let walk = walker(service.clone())
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.records.len(), 3);
    assert_eq!(walk.pages, 3);
    assert_eq!(service.page_calls(), 4);
}

#[tokio::test]
async fn exhausted_retries_fail_the_request() {
    let service = Arc::new(ScriptedService::new(vec![
        Ok(page(2, 100)),
        Err(ServiceError::transient("reset")),
        Err(ServiceError::transient("reset")),
        Err(ServiceError::transient("reset")),
    ]));
    let err = walker(service.clone())
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, WindowError::PageFetch { attempts: 3, .. }));
    assert_eq!(err.status_class(), window_engine::StatusClass::Service);
}

#[tokio::test]
async fn invalid_cursor_is_not_retried() {
    let service = Arc::new(ScriptedService::new(vec![Err(ServiceError::invalid_cursor("expired"))]));
    let err = walker(service.clone())
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, WindowError::PageFetch { attempts: 1, .. }));
    assert_eq!(service.page_calls(), 1);
}

#[tokio::test]
async fn cancellation_aborts_the_walk() {
    let service = Arc::new(ScriptedService::new(Vec::new()).with_fallback(page(0, 5000)));
    let walker = ShardWalker::new(service).with_limits(WalkLimits {
        empty_page_backoff: Duration::from_secs(60),
        ..WalkLimits::default()
    });
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        child.cancel();
    });

    let err = walker.fetch_window("orders", 0, &token).await.unwrap_err();
    assert!(matches!(err, WindowError::Cancelled));
}

#[tokio::test]
async fn closed_shard_counts_as_drained() {
    let mut last = page(2, 700);
    last.next_cursor = None;
    let service = Arc::new(ScriptedService::new(vec![Ok(page(1, 900)), Ok(last)]));
    let walk = walker(service.clone())
        .fetch_window("orders", 0, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(walk.records.len(), 3);
    assert_eq!(walk.completion, Completion::Drained);
    assert_eq!(service.page_calls(), 2);
}
