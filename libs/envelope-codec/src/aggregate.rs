//! Envelope encoder for tests: packs user payloads into one aggregated
//! record the way a producer-side aggregator would.

use prost::Message;

use crate::format::AggregationFormat;
use crate::message::{AggregatedRecord, Record};

#[derive(Debug, Default)]
pub struct Aggregator {
    message: AggregatedRecord,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; the partition key is deduplicated in the table.
    pub fn push(&mut self, partition_key: &str, data: impl Into<Vec<u8>>) -> &mut Self {
        let partition_key_index = intern(&mut self.message.partition_key_table, partition_key);
        self.push_entry(Record {
            partition_key_index,
            explicit_hash_key_index: None,
            data: data.into(),
            tags: Vec::new(),
        })
    }

    pub fn push_with_hash_key(
        &mut self,
        partition_key: &str,
        explicit_hash_key: &str,
        data: impl Into<Vec<u8>>,
    ) -> &mut Self {
        let partition_key_index = intern(&mut self.message.partition_key_table, partition_key);
        let hash_key_index = intern(&mut self.message.explicit_hash_key_table, explicit_hash_key);
        self.push_entry(Record {
            partition_key_index,
            explicit_hash_key_index: Some(hash_key_index),
            data: data.into(),
            tags: Vec::new(),
        })
    }

    /// Append an entry verbatim, indices included (may point outside the tables).
    pub fn push_entry(&mut self, entry: Record) -> &mut Self {
        self.message.records.push(entry);
        self
    }

    /// Serialized protobuf body without prefix and trailer.
    pub fn body(&self) -> Vec<u8> {
        self.message.encode_to_vec()
    }

    /// Full envelope: magic prefix + body + MD5 trailer.
    pub fn build(&self) -> Vec<u8> {
        let format = AggregationFormat::KplV1;
        let body = self.body();
        let mut out = Vec::with_capacity(body.len() + crate::format::MIN_ENVELOPE_LEN);
        out.extend_from_slice(&format.magic());
        out.extend_from_slice(&body);
        out.extend_from_slice(&format.digest(&body));
        out
    }
}

fn intern(table: &mut Vec<String>, value: &str) -> u64 {
    let index = match table.iter().position(|v| v == value) {
        Some(i) => i,
        None => {
            table.push(value.to_string());
            table.len() - 1
        }
    };
    index as u64
}
