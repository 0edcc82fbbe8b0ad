use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use envelope_codec::EnvelopeCodec;
use window_api::{now_ms, StartPosition, UserRecord};

use crate::error::WindowError;
use crate::filter::Criteria;
use crate::walker::{Completion, ShardWalker, Walk};

pub const DEFAULT_WINDOW_MINUTES: u32 = 10;
pub const MAX_WINDOW_MINUTES: u32 = 960;

/// Lower bound of the window: `now` minus the requested duration.
///
/// Missing duration → [`DEFAULT_WINDOW_MINUTES`]; larger values are clamped
/// to [`MAX_WINDOW_MINUTES`].
pub fn window_start_ms(now_ms: i64, duration_minutes: Option<u32>) -> i64 {
    let minutes = duration_minutes
        .unwrap_or(DEFAULT_WINDOW_MINUTES)
        .min(MAX_WINDOW_MINUTES);
    now_ms - i64::from(minutes) * 60_000
}

// ═══════════════════════════════════════════════════════════════
//  Request / Result
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRequest {
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(flatten)]
    pub criteria: Criteria,
}

impl WindowRequest {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }
}

/// Counters for one request. Nothing lost during decoding goes unreported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub raw_records: usize,
    pub pages: usize,
    /// User records produced by the codec, before filtering.
    pub decoded: usize,
    pub emitted: usize,
    pub dropped_entries: usize,
    pub rejected_envelopes: usize,
    pub invalid_payloads: usize,
    pub filtered_out: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowResult {
    pub records: Vec<UserRecord>,
    pub completion: Completion,
    pub stats: WindowStats,
}

// ═══════════════════════════════════════════════════════════════
//  WindowReader
// ═══════════════════════════════════════════════════════════════

/// Window orchestrator: walk → decode → filter.
///
/// Holds no per-request state; share it behind `Arc` between requests.
pub struct WindowReader {
    walker: ShardWalker,
    codec: EnvelopeCodec,
}

impl WindowReader {
    pub fn new(walker: ShardWalker, codec: EnvelopeCodec) -> Self {
        Self { walker, codec }
    }

    pub async fn read(
        &self,
        request: &WindowRequest,
        cancel: &CancellationToken,
    ) -> Result<WindowResult, WindowError> {
        self.read_at(request, now_ms(), cancel).await
    }

    /// Like [`read`](Self::read) with an explicit clock.
    pub async fn read_at(
        &self,
        request: &WindowRequest,
        now_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<WindowResult, WindowError> {
        validate(request)?;
        let since = window_start_ms(now_ms, request.duration_minutes);
        tracing::debug!(stream = %request.stream, since_ms = since, "reading window");
        let walk = self.walker.fetch_window(&request.stream, since, cancel).await?;
        Ok(self.assemble(request, walk))
    }

    /// Entire retained shard, ignoring the duration.
    pub async fn read_from_start(
        &self,
        request: &WindowRequest,
        cancel: &CancellationToken,
    ) -> Result<WindowResult, WindowError> {
        validate(request)?;
        let walk = self
            .walker
            .walk(&request.stream, StartPosition::TrimHorizon, cancel)
            .await?;
        Ok(self.assemble(request, walk))
    }

    fn assemble(&self, request: &WindowRequest, walk: Walk) -> WindowResult {
        let mut stats = WindowStats {
            raw_records: walk.records.len(),
            pages: walk.pages,
            ..Default::default()
        };
        let mut records = Vec::new();

        for raw in &walk.records {
            let decoded = self.codec.decode(raw);

            if let Some(rejection) = &decoded.rejection {
                stats.rejected_envelopes += 1;
                tracing::warn!(
                    stream = %request.stream,
                    sequence_number = %raw.sequence_number,
                    %rejection,
                    "aggregated record rejected"
                );
            }
            for entry in &decoded.dropped {
                tracing::warn!(
                    stream = %request.stream,
                    sequence_number = %raw.sequence_number,
                    sub_sequence_number = entry.sub_sequence_number,
                    reason = %entry.reason,
                    "aggregated entry dropped"
                );
            }
            stats.dropped_entries += decoded.dropped.len();
            stats.invalid_payloads += decoded.invalid_payloads();
            stats.decoded += decoded.records.len();

            for record in decoded.records {
                if request.criteria.matches(&record) {
                    records.push(record);
                } else {
                    stats.filtered_out += 1;
                }
            }
        }

        stats.emitted = records.len();
        tracing::info!(
            stream = %request.stream,
            pages = stats.pages,
            raw = stats.raw_records,
            emitted = stats.emitted,
            filtered_out = stats.filtered_out,
            completion = ?walk.completion,
            "window read"
        );

        WindowResult {
            records,
            completion: walk.completion,
            stats,
        }
    }
}

fn validate(request: &WindowRequest) -> Result<(), WindowError> {
    if request.stream.trim().is_empty() {
        return Err(WindowError::InvalidRequest("stream name is required".into()));
    }
    Ok(())
}
