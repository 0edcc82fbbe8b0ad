use base64::Engine;
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  RawRecord
// ════════════════════════════════════════════════════════════════

/// Физическая запись shard'а в том виде, в каком её отдаёт stream service.
///
/// `data` хранится как сырые байты; base64 существует только на JSON
/// границе (поле `Data` в ответе `GetRecords`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub data: Vec<u8>,
    pub partition_key: String,
    pub sequence_number: String,
    /// Approximate arrival time, Unix ms.
    pub approximate_arrival_ms: Option<i64>,
}

impl RawRecord {
    pub fn new(
        data: impl Into<Vec<u8>>,
        partition_key: impl Into<String>,
        sequence_number: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            partition_key: partition_key.into(),
            sequence_number: sequence_number.into(),
            approximate_arrival_ms: None,
        }
    }

    pub fn with_arrival_ms(mut self, arrival_ms: i64) -> Self {
        self.approximate_arrival_ms = Some(arrival_ms);
        self
    }
}

impl<'de> Deserialize<'de> for RawRecord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct Wire {
            data: String,
            partition_key: String,
            sequence_number: String,
            #[serde(default)]
            approximate_arrival_timestamp: Option<f64>,
        }
        let wire = Wire::deserialize(deserializer)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(wire.data.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(RawRecord {
            data,
            partition_key: wire.partition_key,
            sequence_number: wire.sequence_number,
            approximate_arrival_ms: wire
                .approximate_arrival_timestamp
                .map(|secs| (secs * 1000.0).round() as i64),
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Payload
// ════════════════════════════════════════════════════════════════

/// Key of the sentinel object emitted for payloads that are not JSON.
pub const INVALID_PAYLOAD_KEY: &str = "INVALID JSON";

/// Прикладной payload пользовательской записи.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Успешно распарсенный JSON.
    Json(serde_json::Value),
    /// Байты не являются JSON; хранится текст как есть (lossy UTF-8).
    Invalid(String),
}

impl Payload {
    /// Parse bytes as JSON, falling back to the invalid-payload sentinel.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Invalid(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Invalid(_) => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Payload::Invalid(_))
    }
}

impl Serialize for Payload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Json(value) => value.serialize(serializer),
            Payload::Invalid(text) => {
                use serde::ser::SerializeMap;
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry(INVALID_PAYLOAD_KEY, text)?;
                m.end()
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  UserRecord
// ════════════════════════════════════════════════════════════════

/// Логическая запись, возвращаемая вызывающему.
///
/// `sub_sequence_number` отсутствует (а не равен нулю) для записей,
/// которые не были упакованы агрегатором.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub partition_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit_hash_key: Option<String>,
    pub sequence_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_sequence_number: Option<u64>,
    pub payload: Payload,
}

// ════════════════════════════════════════════════════════════════
//  Cursor / Page / StartPosition
// ════════════════════════════════════════════════════════════════

/// Opaque read position issued by the stream service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardCursor(String);

impl ShardCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShardCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Одна страница `GetRecords`.
#[derive(Clone, Debug)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// `None`: shard закрыт, продолжать нечего.
    pub next_cursor: Option<ShardCursor>,
    /// Approximate distance from the live edge, ms.
    pub lag_millis: u64,
}

/// Где поставить cursor при его получении.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartPosition {
    /// First record that arrived at or after the timestamp (Unix ms).
    AtTimestamp(i64),
    /// Oldest record still retained by the shard.
    TrimHorizon,
}

impl std::fmt::Display for StartPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartPosition::AtTimestamp(ms) => write!(f, "AT_TIMESTAMP({ms})"),
            StartPosition::TrimHorizon => f.write_str("TRIM_HORIZON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_record_from_wire() {
        let wire = json!({
            "Data": "eyJvcmRlcklkIjoxfQ==",
            "PartitionKey": "pk1",
            "SequenceNumber": "seq1",
            "ApproximateArrivalTimestamp": 1700000000.25
        });
        let raw: RawRecord = serde_json::from_value(wire).unwrap();
        assert_eq!(raw.data, br#"{"orderId":1}"#);
        assert_eq!(raw.partition_key, "pk1");
        assert_eq!(raw.sequence_number, "seq1");
        assert_eq!(raw.approximate_arrival_ms, Some(1_700_000_000_250));
    }

    #[test]
    fn raw_record_rejects_bad_base64() {
        let wire = json!({"Data": "***", "PartitionKey": "pk", "SequenceNumber": "1"});
        assert!(serde_json::from_value::<RawRecord>(wire).is_err());
    }

    #[test]
    fn plain_user_record_omits_optional_fields() {
        let record = UserRecord {
            partition_key: "pk1".into(),
            explicit_hash_key: None,
            sequence_number: "seq1".into(),
            sub_sequence_number: None,
            payload: Payload::Json(json!({"orderId": 1})),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"partitionKey": "pk1", "sequenceNumber": "seq1", "payload": {"orderId": 1}})
        );
    }

    #[test]
    fn invalid_payload_sentinel_shape() {
        let payload = Payload::from_bytes(b"not json");
        assert!(payload.is_invalid());
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({"INVALID JSON": "not json"}));
    }
}
