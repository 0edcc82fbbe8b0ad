use md5::{Digest, Md5};
use prost::Message;

use crate::message::AggregatedRecord;

/// Length of the magic prefix that opens every aggregated envelope.
pub const PREFIX_LEN: usize = 4;
/// Length of the MD5 trailer that closes every aggregated envelope.
pub const DIGEST_LEN: usize = 16;
/// Shortest data that can still hold prefix + trailer.
pub const MIN_ENVELOPE_LEN: usize = PREFIX_LEN + DIGEST_LEN;

// ═══════════════════════════════════════════════════════════════
//  AggregationFormat
// ═══════════════════════════════════════════════════════════════

/// Закрытый набор поддерживаемых версий формата агрегации.
///
/// Версия выбирается по точному совпадению magic prefix'а; каждая несёт
/// свои правила разбора тела.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationFormat {
    /// KPL aggregation format, protobuf body + MD5 trailer.
    KplV1,
}

impl AggregationFormat {
    pub const ALL: [AggregationFormat; 1] = [AggregationFormat::KplV1];

    pub fn magic(self) -> [u8; PREFIX_LEN] {
        match self {
            AggregationFormat::KplV1 => [0xF3, 0x89, 0x9A, 0xC2],
        }
    }

    /// Exact prefix lookup. `None` for data shorter than the prefix.
    pub fn detect(data: &[u8]) -> Option<Self> {
        let prefix = data.get(..PREFIX_LEN)?;
        Self::ALL.into_iter().find(|f| f.magic() == prefix)
    }

    pub fn digest(self, body: &[u8]) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        match self {
            AggregationFormat::KplV1 => out.copy_from_slice(&Md5::digest(body)),
        }
        out
    }

    pub fn parse(self, body: &[u8]) -> Result<AggregatedRecord, prost::DecodeError> {
        match self {
            AggregationFormat::KplV1 => AggregatedRecord::decode(body),
        }
    }
}

impl std::fmt::Display for AggregationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationFormat::KplV1 => f.write_str("kpl-v1"),
        }
    }
}
