use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use window_api::{
    RawRecord, ServiceErrorKind, ShardCursor, StartPosition, StreamService, DEFAULT_SHARD_ID,
};

use crate::error::WindowError;
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};

// ═══════════════════════════════════════════════════════════════
//  Limits
// ═══════════════════════════════════════════════════════════════

/// Ограничения одного прохода по shard'у.
///
/// Без них backend, вечно сообщающий lag при пустых страницах, держал бы
/// запрос бесконечно. `max_records` и `max_pages` проверяются между
/// страницами, `max_elapsed` ограничивает и текущий запрос страницы.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkLimits {
    /// Records requested per `get_page` call.
    pub page_size: usize,
    pub max_pages: usize,
    pub max_records: usize,
    pub max_elapsed: Duration,
    /// Pause after a page that came back empty while still lagging.
    pub empty_page_backoff: Duration,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 1000,
            max_records: 100_000,
            max_elapsed: Duration::from_secs(30),
            empty_page_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    MaxPages,
    MaxRecords,
    MaxElapsed,
}

/// Как закончился проход: дочитали до края или упёрлись в лимит.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Completion {
    Drained,
    Truncated(TruncationReason),
}

#[derive(Debug, Clone)]
pub struct Walk {
    /// Oldest to newest.
    pub records: Vec<RawRecord>,
    pub pages: usize,
    pub completion: Completion,
}

// ═══════════════════════════════════════════════════════════════
//  ShardWalker
// ═══════════════════════════════════════════════════════════════

/// Sequential reader of one shard: cursor → page → page → … until the
/// shard reports neither new records nor lag.
///
/// One page fetch at a time; the next request is issued only after the
/// previous one resolved.
pub struct ShardWalker {
    service: Arc<dyn StreamService>,
    shard_id: String,
    limits: WalkLimits,
    retry: RetryPolicy,
}

impl ShardWalker {
    pub fn new(service: Arc<dyn StreamService>) -> Self {
        Self {
            service,
            shard_id: DEFAULT_SHARD_ID.to_string(),
            limits: WalkLimits::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_shard_id(mut self, shard_id: impl Into<String>) -> Self {
        self.shard_id = shard_id.into();
        self
    }

    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Everything from the first record at or after `not_older_than_ms` up
    /// to the live edge of the shard.
    pub async fn fetch_window(
        &self,
        stream: &str,
        not_older_than_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<Walk, WindowError> {
        self.walk(stream, StartPosition::AtTimestamp(not_older_than_ms), cancel)
            .await
    }

    pub async fn walk(
        &self,
        stream: &str,
        position: StartPosition,
        cancel: &CancellationToken,
    ) -> Result<Walk, WindowError> {
        let deadline = deadline_after(self.limits.max_elapsed);

        // --- Initializing ---
        let mut cursor = self.acquire_cursor(stream, position, cancel).await?;
        tracing::debug!(stream, shard = %self.shard_id, %position, "cursor acquired");

        // --- Draining ---
        let mut records: Vec<RawRecord> = Vec::new();
        let mut pages = 0usize;

        loop {
            if let Some(reason) = self.exhausted(pages, records.len(), deadline) {
                return Ok(truncated(stream, records, pages, reason));
            }

            // Never ask for more than the record ceiling still allows.
            let limit = self
                .limits
                .page_size
                .min(self.limits.max_records - records.len());
            let fetch = retry_with_backoff(&self.retry, cancel, || {
                self.service.get_page(&cursor, limit)
            });
            let page = match tokio::time::timeout_at(deadline, fetch).await {
                Ok(result) => result.map_err(|e| match e {
                    RetryError::Cancelled => WindowError::Cancelled,
                    RetryError::Failed { attempts, error } => WindowError::PageFetch {
                        stream: stream.to_string(),
                        attempts,
                        source: error,
                    },
                })?,
                Err(_) => {
                    return Ok(truncated(stream, records, pages, TruncationReason::MaxElapsed));
                }
            };

            pages += 1;
            let fetched = page.records.len();
            records.extend(page.records);
            records.truncate(self.limits.max_records);
            tracing::debug!(
                stream,
                page = pages,
                fetched,
                lag_ms = page.lag_millis,
                "page fetched"
            );

            let Some(next) = page.next_cursor else {
                tracing::debug!(stream, shard = %self.shard_id, "shard closed");
                break;
            };

            // Keep polling while behind the edge, even through empty pages.
            if fetched == 0 && page.lag_millis == 0 {
                break;
            }
            cursor = next;

            if fetched == 0 {
                self.pause(deadline, cancel).await?;
            }
        }

        tracing::debug!(stream, pages, records = records.len(), "shard drained");
        Ok(Walk {
            records,
            pages,
            completion: Completion::Drained,
        })
    }

    async fn acquire_cursor(
        &self,
        stream: &str,
        position: StartPosition,
        cancel: &CancellationToken,
    ) -> Result<ShardCursor, WindowError> {
        retry_with_backoff(&self.retry, cancel, || {
            self.service.get_cursor(stream, &self.shard_id, position)
        })
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => WindowError::Cancelled,
            RetryError::Failed { error, .. } if error.kind() == ServiceErrorKind::UnknownStream => {
                WindowError::UnknownStream { stream: stream.to_string() }
            }
            RetryError::Failed { error, .. } => WindowError::Cursor {
                stream: stream.to_string(),
                source: error,
            },
        })
    }

    fn exhausted(&self, pages: usize, records: usize, deadline: Instant) -> Option<TruncationReason> {
        if pages >= self.limits.max_pages {
            Some(TruncationReason::MaxPages)
        } else if records >= self.limits.max_records {
            Some(TruncationReason::MaxRecords)
        } else if Instant::now() >= deadline {
            Some(TruncationReason::MaxElapsed)
        } else {
            None
        }
    }

    /// Sleep `empty_page_backoff`, but not past the walk deadline.
    async fn pause(&self, deadline: Instant, cancel: &CancellationToken) -> Result<(), WindowError> {
        if self.limits.empty_page_backoff.is_zero() {
            return Ok(());
        }
        let wake = (Instant::now() + self.limits.empty_page_backoff).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WindowError::Cancelled),
            _ = tokio::time::sleep_until(wake) => Ok(()),
        }
    }
}

fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    // An effectively unbounded budget must not overflow the clock.
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365))
}

fn truncated(stream: &str, records: Vec<RawRecord>, pages: usize, reason: TruncationReason) -> Walk {
    tracing::warn!(
        stream,
        pages,
        records = records.len(),
        reason = ?reason,
        "walk truncated before reaching the live edge"
    );
    Walk {
        records,
        pages,
        completion: Completion::Truncated(reason),
    }
}
