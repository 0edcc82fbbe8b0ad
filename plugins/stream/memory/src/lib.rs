use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio::sync::RwLock;

use window_api::{Page, RawRecord, ServiceError, ShardCursor, StartPosition, StreamService};

// ═══════════════════════════════════════════════════════════════
//  MemoryStreamConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_page_size() -> usize {
    10_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryStreamConfig {
    /// Upper bound for `limit` in `get_page`, as the real service enforces.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for MemoryStreamConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Dumps
// ═══════════════════════════════════════════════════════════════

/// Captured `GetRecords` response. Other response fields are ignored.
#[derive(Debug, serde::Deserialize)]
struct StreamDump {
    #[serde(rename = "Records", default)]
    records: Vec<RawRecord>,
}

/// Parse a captured `GetRecords` response body.
pub fn parse_dump(json: &str) -> Result<Vec<RawRecord>, ServiceError> {
    let dump: StreamDump = serde_json::from_str(json)?;
    Ok(dump.records)
}

pub fn read_dump(path: impl AsRef<Path>) -> Result<Vec<RawRecord>, ServiceError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        ServiceError::fatal(format!("read dump '{}': {e}", path.display()))
    })?;
    parse_dump(&json)
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStreamService
// ═══════════════════════════════════════════════════════════════

/// In-memory stream service: one shard per stream, records kept in
/// arrival order. Для тестов и для replay'я сохранённых dump'ов.
///
/// Cursor: `"{stream}:{index}"`, индекс следующей записи для чтения.
pub struct MemoryStreamService {
    streams: RwLock<HashMap<String, Vec<RawRecord>>>,
    config: MemoryStreamConfig,
}

impl Default for MemoryStreamService {
    fn default() -> Self {
        Self::new(MemoryStreamConfig::default())
    }
}

impl MemoryStreamService {
    pub fn new(config: MemoryStreamConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register an empty stream; existing records are kept.
    pub async fn create_stream(&self, stream: &str) {
        self.streams.write().await.entry(stream.to_string()).or_default();
    }

    /// Append records to the shard tip, creating the stream if needed.
    pub async fn append(&self, stream: &str, records: impl IntoIterator<Item = RawRecord>) {
        let mut streams = self.streams.write().await;
        streams.entry(stream.to_string()).or_default().extend(records);
    }

    pub async fn load_dump(&self, stream: &str, path: impl AsRef<Path>) -> Result<usize, ServiceError> {
        let records = read_dump(path.as_ref())?;
        let count = records.len();
        self.append(stream, records).await;
        tracing::debug!(stream, path = %path.as_ref().display(), records = count, "dump loaded");
        Ok(count)
    }
}

fn encode_cursor(stream: &str, index: usize) -> ShardCursor {
    ShardCursor::new(format!("{stream}:{index}"))
}

fn decode_cursor(cursor: &ShardCursor) -> Result<(&str, usize), ServiceError> {
    let invalid = || ServiceError::invalid_cursor(format!("malformed cursor '{cursor}'"));
    let (stream, index) = cursor.as_str().rsplit_once(':').ok_or_else(invalid)?;
    let index = index.parse().map_err(|_| invalid())?;
    Ok((stream, index))
}

fn arrival(record: &RawRecord) -> i64 {
    record.approximate_arrival_ms.unwrap_or(0)
}

/// Arrival distance from `reference` to the shard tip; at least 1 ms while
/// records remain past `end`.
fn lag_millis(records: &[RawRecord], reference: usize, end: usize) -> u64 {
    let Some(tip) = records.last() else {
        return 0;
    };
    if end >= records.len() {
        return 0;
    }
    let distance = arrival(tip).saturating_sub(arrival(&records[reference]));
    distance.max(1) as u64
}

impl StreamService for MemoryStreamService {
    fn get_cursor(
        &self,
        stream: &str,
        _shard_id: &str,
        position: StartPosition,
    ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, ServiceError>> + Send + '_>> {
        let stream = stream.to_string();
        Box::pin(async move {
            let streams = self.streams.read().await;
            let records = streams
                .get(&stream)
                .ok_or_else(|| ServiceError::unknown_stream(&stream))?;
            let index = match position {
                StartPosition::TrimHorizon => 0,
                StartPosition::AtTimestamp(ts) => records
                    .iter()
                    .position(|r| arrival(r) >= ts)
                    .unwrap_or(records.len()),
            };
            Ok(encode_cursor(&stream, index))
        })
    }

    fn get_page(
        &self,
        cursor: &ShardCursor,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Page, ServiceError>> + Send + '_>> {
        let cursor = cursor.clone();
        Box::pin(async move {
            let (stream, start) = decode_cursor(&cursor)?;
            let streams = self.streams.read().await;
            let records = streams
                .get(stream)
                .ok_or_else(|| ServiceError::unknown_stream(stream))?;
            if start > records.len() {
                return Err(ServiceError::invalid_cursor(format!(
                    "cursor '{cursor}' is past the shard tip"
                )));
            }

            let limit = limit.clamp(1, self.config.max_page_size.max(1));
            let end = (start + limit).min(records.len());
            let reference = if end > start { end - 1 } else { start };

            Ok(Page {
                records: records[start..end].to_vec(),
                next_cursor: Some(encode_cursor(stream, end)),
                lag_millis: lag_millis(records, reference, end),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rec(seq: u32, arrival_ms: i64) -> RawRecord {
        RawRecord::new(format!("{{\"n\":{seq}}}").into_bytes(), "pk", seq.to_string())
            .with_arrival_ms(arrival_ms)
    }

    #[tokio::test]
    async fn unknown_stream() {
        let service = MemoryStreamService::default();
        let err = service
            .get_cursor("missing", "shardId-000000000000", StartPosition::TrimHorizon)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), window_api::ServiceErrorKind::UnknownStream);
    }

    #[tokio::test]
    async fn pages_through_with_lag() {
        let service = MemoryStreamService::default();
        service.append("orders", (0..5).map(|i| rec(i, 1000 + i as i64 * 100))).await;

        let cursor = service
            .get_cursor("orders", "s", StartPosition::TrimHorizon)
            .await
            .unwrap();
        let page = service.get_page(&cursor, 2).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.lag_millis, 300);

        let page = service.get_page(page.next_cursor.as_ref().unwrap(), 10).await.unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.lag_millis, 0);

        let page = service.get_page(page.next_cursor.as_ref().unwrap(), 10).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.lag_millis, 0);
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn lag_is_positive_while_records_remain() {
        let service = MemoryStreamService::default();
        service.append("orders", vec![rec(0, 500), rec(1, 500)]).await;
        let cursor = service.get_cursor("orders", "s", StartPosition::TrimHorizon).await.unwrap();
        let page = service.get_page(&cursor, 1).await.unwrap();
        assert_eq!(page.lag_millis, 1);
    }

    #[tokio::test]
    async fn at_timestamp_positions_on_first_newer_record() {
        let service = MemoryStreamService::default();
        service.append("orders", vec![rec(0, 100), rec(1, 200), rec(2, 300)]).await;

        let cursor = service
            .get_cursor("orders", "s", StartPosition::AtTimestamp(150))
            .await
            .unwrap();
        let page = service.get_page(&cursor, 10).await.unwrap();
        let seqs: Vec<_> = page.records.iter().map(|r| r.sequence_number.as_str()).collect();
        assert_eq!(seqs, ["1", "2"]);

        let cursor = service
            .get_cursor("orders", "s", StartPosition::AtTimestamp(1_000))
            .await
            .unwrap();
        assert!(service.get_page(&cursor, 10).await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn rejects_foreign_cursor() {
        let service = MemoryStreamService::default();
        service.create_stream("orders").await;
        let err = service.get_page(&ShardCursor::new("garbage"), 10).await.unwrap_err();
        assert_eq!(err.kind(), window_api::ServiceErrorKind::InvalidCursor);
        let err = service.get_page(&ShardCursor::new("orders:7"), 10).await.unwrap_err();
        assert_eq!(err.kind(), window_api::ServiceErrorKind::InvalidCursor);
    }

    #[tokio::test]
    async fn loads_get_records_dump() {
        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD.encode(br#"{"orderId":1}"#);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Records":[{{"Data":"{data}","PartitionKey":"p1","SequenceNumber":"495","ApproximateArrivalTimestamp":1700000000.25}}],"MillisBehindLatest":0}}"#
        )
        .unwrap();

        let service = MemoryStreamService::default();
        assert_eq!(service.load_dump("orders", file.path()).await.unwrap(), 1);

        let cursor = service.get_cursor("orders", "s", StartPosition::TrimHorizon).await.unwrap();
        let page = service.get_page(&cursor, 10).await.unwrap();
        assert_eq!(page.records[0].data, br#"{"orderId":1}"#);
        assert_eq!(page.records[0].approximate_arrival_ms, Some(1_700_000_000_250));
    }

    #[test]
    fn malformed_dump_is_fatal() {
        let err = parse_dump("{not json").unwrap_err();
        assert_eq!(err.kind(), window_api::ServiceErrorKind::Fatal);
    }
}
