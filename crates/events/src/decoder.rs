//! The ordered decode chain for message-bus frames.
//!
//! 1. A payload starting with the gzip magic number is inflated first.
//! 2. The (inflated) bytes are read as UTF-8 and parsed as JSON.
//! 3. An object becomes one record; an array becomes one record per object element.
//! 4. Anything else falls through to a single raw record holding the original bytes.

use crate::messages::{IngestRecord, RawFormat, RecordBody};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decodes one frame into records stamped with `received_at`.
///
/// Always returns at least one record.
pub fn decode_payload(payload: &[u8], received_at: DateTime<Utc>) -> Vec<IngestRecord> {
    decode_bodies(payload)
        .into_iter()
        .map(|body| IngestRecord::new(received_at, body))
        .collect()
}

/// Runs the decode chain, returning the first successful decode or the raw fallback.
pub fn decode_bodies(payload: &[u8]) -> Vec<RecordBody> {
    let decoded = if is_gzip(payload) {
        match inflate(payload) {
            Ok(inflated) => json_objects(&inflated).ok_or(RawFormat::HexGzip),
            Err(e) => {
                tracing::debug!(error = %e, bytes = payload.len(), "Gzip frame failed to inflate.");
                Err(RawFormat::HexError)
            }
        }
    } else {
        json_objects(payload).ok_or(RawFormat::Hex)
    };

    match decoded {
        Ok(objects) => objects.into_iter().map(RecordBody::Decoded).collect(),
        Err(format) => {
            tracing::debug!(%format, bytes = payload.len(), "Keeping undecodable frame as hex.");
            vec![RecordBody::Raw {
                hex: hex::encode(payload),
                format,
            }]
        }
    }
}

fn is_gzip(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[..2] == GZIP_MAGIC
}

fn inflate(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut inflated = Vec::new();
    GzDecoder::new(payload).read_to_end(&mut inflated)?;
    Ok(inflated)
}

/// UTF-8 then JSON. `None` unless the document holds at least one object.
fn json_objects(bytes: &[u8]) -> Option<Vec<Value>> {
    let text = std::str::from_utf8(bytes).ok()?;
    let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}')).ok()?;
    match value {
        Value::Object(_) => Some(vec![value]),
        Value::Array(items) => {
            let total = items.len();
            let objects: Vec<Value> = items.into_iter().filter(Value::is_object).collect();
            if objects.len() < total {
                let skipped = total - objects.len();
                tracing::debug!(skipped, "Non-object array elements ignored.");
            }
            (!objects.is_empty()).then_some(objects)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::json;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn plain_object_becomes_one_record() {
        let bodies = decode_bodies(br#"{"timestamp": 1, "positions": []}"#);
        assert_eq!(bodies, vec![RecordBody::Decoded(json!({"timestamp": 1, "positions": []}))]);
    }

    #[test]
    fn array_is_split_into_object_records() {
        let bodies = decode_bodies(br#"[{"a": 1}, 7, {"b": 2}]"#);
        assert_eq!(
            bodies,
            vec![
                RecordBody::Decoded(json!({"a": 1})),
                RecordBody::Decoded(json!({"b": 2}))
            ]
        );
    }

    #[test]
    fn gzip_json_is_inflated_first() {
        let payload = gzip(br#"[{"timestamp": 5}]"#);
        assert_eq!(decode_bodies(&payload), vec![RecordBody::Decoded(json!({"timestamp": 5}))]);
    }

    #[test]
    fn garbage_yields_exactly_one_hex_record() {
        let payload = [0xff, 0xfe, 0x00, 0x42];
        let records = decode_payload(&payload, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].body,
            RecordBody::Raw {
                hex: "fffe0042".to_string(),
                format: RawFormat::Hex
            }
        );
    }

    #[test]
    fn gzip_of_binary_is_marked_gzip() {
        let payload = gzip(&[0xc3, 0x28, 0xa0]);
        let bodies = decode_bodies(&payload);
        assert!(matches!(
            bodies.as_slice(),
            [RecordBody::Raw { format: RawFormat::HexGzip, .. }]
        ));
    }

    #[test]
    fn broken_gzip_is_marked_error() {
        let payload = [0x1f, 0x8b, 0x00, 0x01, 0x02];
        let bodies = decode_bodies(&payload);
        assert_eq!(
            bodies,
            vec![RecordBody::Raw {
                hex: hex::encode(payload),
                format: RawFormat::HexError
            }]
        );
    }

    #[test]
    fn scalars_and_empty_arrays_fall_back_to_hex() {
        for payload in [&b"42"[..], b"[]", b""] {
            let bodies = decode_bodies(payload);
            assert!(
                matches!(bodies.as_slice(), [RecordBody::Raw { format: RawFormat::Hex, .. }]),
                "{payload:?}"
            );
        }
    }
}
