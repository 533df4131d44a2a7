//! [libs/core/record-codec/src/lib.rs]
//! Codec for the Device's custom delimited record format (spec §4.2).
//!
//! The wire format is comma-separated fields, newline-separated records,
//! with an escape discipline — fields containing the delimiter, a quote, or
//! a newline are wrapped in quotes, and embedded quotes are doubled — that
//! is exactly RFC 4180 quoting. Rather than hand-roll that escaping, this
//! codec wraps `csv::Reader` / `csv::Writer` configured for it and lets
//! `serde` do the field mapping by name, so header field order on the wire
//! is never assumed.

use std::io::Read;

use spoolbridge_models::DeviceRecord;
use thiserror::Error;

/// Canonical header field names, pinned as a protocol constant (spec §9):
/// the Device firmware's header line uses exactly these names. Field
/// *order* in the wire header is not assumed on parse (`csv` matches by
/// name), but this is the order `serialize_records` emits.
pub const HEADER_FIELDS: [&str; 9] = [
    "tag_id",
    "material",
    "brand",
    "color_name",
    "color_hex",
    "nominal_weight_g",
    "empty_weight_g",
    "remaining_g",
    "device_spool_id",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record at line {line_number}: {reason}")]
pub struct RecordParseError {
    pub line_number: u64,
    pub reason: String,
}

/// Parses the full response body into records, failing a single malformed
/// record without aborting the batch (spec §4.2): a parse error on one
/// line surfaces as one `Err` in the stream and iteration continues with
/// the next line.
pub fn parse_records<R: Read>(input: R) -> impl Iterator<Item = Result<DeviceRecord, RecordParseError>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let headers_ok = reader.headers().is_ok();
    let mut line_number: u64 = 1;

    std::iter::from_fn(move || {
        if !headers_ok {
            return None;
        }
        let mut raw = csv::StringRecord::new();
        match reader.read_record(&mut raw) {
            Ok(false) => None,
            Ok(true) => {
                line_number = raw
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(line_number + 1);
                let headers = reader.headers().expect("checked above").clone();
                let result = raw
                    .deserialize::<DeviceRecord>(Some(&headers))
                    .map_err(|e| RecordParseError {
                        line_number,
                        reason: e.to_string(),
                    });
                Some(result)
            }
            Err(e) => {
                line_number += 1;
                Some(Err(RecordParseError {
                    line_number,
                    reason: e.to_string(),
                }))
            }
        }
    })
}

/// Parses and drops malformed records, returning only the records that
/// decoded cleanly. Callers that need to log the dropped ones should use
/// `parse_records` directly instead.
pub fn parse_records_lossy<R: Read>(input: R) -> Vec<DeviceRecord> {
    parse_records(input).filter_map(Result::ok).collect()
}

/// Serializes records back into the wire format, in `HEADER_FIELDS` order.
pub fn serialize_records(records: &[DeviceRecord]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes).expect("csv writer emits valid UTF-8 for UTF-8 input"))
}
