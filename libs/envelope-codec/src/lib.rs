//! Envelope codec: turns one raw stream record into the ordered user
//! records it carries.
//!
//! A raw record is either a plain payload or an aggregated envelope
//! (`magic prefix | protobuf body | MD5 trailer`). Decoding never fails as a
//! whole; what was lost is reported in [`Decoded`].

pub mod format;
pub mod message;

#[cfg(any(test, feature = "test-util"))]
pub mod aggregate;

use window_api::{Payload, RawRecord, UserRecord};

pub use format::AggregationFormat;
use format::{DIGEST_LEN, MIN_ENVELOPE_LEN, PREFIX_LEN};

// ═══════════════════════════════════════════════════════════════
//  Decode report
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Plain,
    Aggregated(AggregationFormat),
}

/// Envelope-level failure: the whole raw record yields nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("checksum mismatch")]
    Checksum,

    #[error("malformed body: {0}")]
    Malformed(String),
}

/// Entry-level failure: only this entry is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("partition key index {0} out of range")]
    PartitionKeyIndex(u64),

    #[error("explicit hash key index {0} out of range")]
    ExplicitHashKeyIndex(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEntry {
    pub sub_sequence_number: u64,
    pub reason: DropReason,
}

/// Результат декодирования одной raw записи.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub records: Vec<UserRecord>,
    pub envelope: EnvelopeKind,
    pub rejection: Option<Rejection>,
    pub dropped: Vec<DroppedEntry>,
}

impl Decoded {
    fn rejected(format: AggregationFormat, rejection: Rejection) -> Self {
        Self {
            records: Vec::new(),
            envelope: EnvelopeKind::Aggregated(format),
            rejection: Some(rejection),
            dropped: Vec::new(),
        }
    }

    /// Records whose payload fell back to the invalid-payload sentinel.
    pub fn invalid_payloads(&self) -> usize {
        self.records.iter().filter(|r| r.payload.is_invalid()).count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Codec
// ═══════════════════════════════════════════════════════════════

/// Stateless decoder. Cheap to copy and safe to share between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeCodec {
    verify_checksums: bool,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EnvelopeCodec {
    pub fn new(verify_checksums: bool) -> Self {
        Self { verify_checksums }
    }

    pub fn decode(&self, raw: &RawRecord) -> Decoded {
        match AggregationFormat::detect(&raw.data) {
            Some(format) if raw.data.len() >= MIN_ENVELOPE_LEN => {
                self.decode_aggregated(format, raw)
            }
            _ => decode_plain(raw),
        }
    }

    fn decode_aggregated(&self, format: AggregationFormat, raw: &RawRecord) -> Decoded {
        let data = &raw.data;
        let body = &data[PREFIX_LEN..data.len() - DIGEST_LEN];
        let trailer = &data[data.len() - DIGEST_LEN..];

        if self.verify_checksums && format.digest(body) != trailer {
            tracing::debug!(
                sequence_number = %raw.sequence_number,
                %format,
                "aggregated record checksum mismatch"
            );
            return Decoded::rejected(format, Rejection::Checksum);
        }

        // The prefix already claimed the aggregated format: a bad body yields
        // nothing rather than a plain record.
        let message = match format.parse(body) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(
                    sequence_number = %raw.sequence_number,
                    %format,
                    error = %e,
                    "aggregated record body does not parse"
                );
                return Decoded::rejected(format, Rejection::Malformed(e.to_string()));
            }
        };

        let message::AggregatedRecord {
            partition_key_table,
            explicit_hash_key_table,
            records: entries,
        } = message;

        let mut records = Vec::with_capacity(entries.len());
        let mut dropped = Vec::new();

        for (i, entry) in entries.into_iter().enumerate() {
            let sub_sequence_number = i as u64;

            let Some(partition_key) = lookup(&partition_key_table, entry.partition_key_index) else {
                dropped.push(DroppedEntry {
                    sub_sequence_number,
                    reason: DropReason::PartitionKeyIndex(entry.partition_key_index),
                });
                continue;
            };

            let explicit_hash_key = match entry.explicit_hash_key_index {
                Some(index) => match lookup(&explicit_hash_key_table, index) {
                    Some(key) => Some(key.clone()),
                    None => {
                        dropped.push(DroppedEntry {
                            sub_sequence_number,
                            reason: DropReason::ExplicitHashKeyIndex(index),
                        });
                        continue;
                    }
                },
                None => None,
            };

            records.push(UserRecord {
                partition_key: partition_key.clone(),
                explicit_hash_key,
                sequence_number: raw.sequence_number.clone(),
                sub_sequence_number: Some(sub_sequence_number),
                payload: Payload::from_bytes(&entry.data),
            });
        }

        Decoded {
            records,
            envelope: EnvelopeKind::Aggregated(format),
            rejection: None,
            dropped,
        }
    }
}

fn decode_plain(raw: &RawRecord) -> Decoded {
    Decoded {
        records: vec![UserRecord {
            partition_key: raw.partition_key.clone(),
            explicit_hash_key: None,
            sequence_number: raw.sequence_number.clone(),
            sub_sequence_number: None,
            payload: Payload::from_bytes(&raw.data),
        }],
        envelope: EnvelopeKind::Plain,
        rejection: None,
        dropped: Vec::new(),
    }
}

fn lookup(table: &[String], index: u64) -> Option<&String> {
    usize::try_from(index).ok().and_then(|i| table.get(i))
}
