use base64::Engine;
use serde_json::json;

use envelope_codec::{EnvelopeCodec, EnvelopeKind};
use window_api::RawRecord;

use crate::config::DecodeArgs;
use crate::error::ReaderError;

/// Decode one raw record and print its user records with the decode report.
pub fn run(args: DecodeArgs) -> Result<(), ReaderError> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(args.data.trim())
        .map_err(|e| ReaderError::Input(format!("data is not base64: {e}")))?;
    let raw = RawRecord::new(data, args.partition_key, args.sequence_number);

    let decoded = EnvelopeCodec::new(!args.no_verify_checksums).decode(&raw);
    let envelope = match decoded.envelope {
        EnvelopeKind::Plain => "plain".to_string(),
        EnvelopeKind::Aggregated(format) => format.to_string(),
    };
    let dropped: Vec<_> = decoded
        .dropped
        .iter()
        .map(|d| json!({"subSequenceNumber": d.sub_sequence_number, "reason": d.reason.to_string()}))
        .collect();

    let report = json!({
        "envelope": envelope,
        "rejection": decoded.rejection.as_ref().map(ToString::to_string),
        "dropped": dropped,
        "records": decoded.records,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
