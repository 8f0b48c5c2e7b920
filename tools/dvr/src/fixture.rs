//! Fixture file codec.
//!
//! A fixture starts with a 4-byte big-endian version number. The rest of the
//! file is decoded by the decoder registered for that version:
//!
//! * version 1: newline-delimited JSON, one `InteractionRecord` per line in
//!   recorded order.
//!
//! Unknown versions are rejected; there is no migration between versions.

use crate::errors::DvrError;
use crate::interaction::InteractionRecord;

pub const VERSION_HEADER_LEN: usize = 4;
pub const CURRENT_VERSION: u32 = 1;

pub fn encode_header(version: u32) -> [u8; VERSION_HEADER_LEN] {
    version.to_be_bytes()
}

pub fn read_version(bytes: &[u8]) -> Result<u32, DvrError> {
    let header: [u8; VERSION_HEADER_LEN] = bytes
        .get(..VERSION_HEADER_LEN)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            DvrError::Fixture(format!(
                "truncated version header: expected {VERSION_HEADER_LEN} bytes, found {}",
                bytes.len()
            ))
        })?;
    Ok(u32::from_be_bytes(header))
}

/// Decodes a whole fixture into its version and records.
pub fn decode(bytes: &[u8]) -> Result<(u32, Vec<InteractionRecord>), DvrError> {
    let version = read_version(bytes)?;
    let body = &bytes[VERSION_HEADER_LEN..];
    let records = match version {
        1 => decode_v1(body)?,
        other => return Err(DvrError::UnsupportedVersion(other)),
    };
    Ok((version, records))
}

fn decode_v1(body: &[u8]) -> Result<Vec<InteractionRecord>, DvrError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| DvrError::Fixture(format!("version 1 body is not utf-8: {e}")))?;
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: InteractionRecord = serde_json::from_str(line)
            .map_err(|e| DvrError::Fixture(format!("record line {}: {e}", idx + 1)))?;
        records.push(record);
    }
    Ok(records)
}

/// One version-1 record line, newline included.
pub fn encode_record(record: &InteractionRecord) -> Result<Vec<u8>, DvrError> {
    let mut line =
        serde_json::to_vec(record).map_err(|e| DvrError::Fixture(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// Full version-1 fixture for `records`.
pub fn encode(records: &[InteractionRecord]) -> Result<Vec<u8>, DvrError> {
    let mut out = encode_header(CURRENT_VERSION).to_vec();
    for record in records {
        out.extend(encode_record(record)?);
    }
    Ok(out)
}
