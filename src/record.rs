//! # Log Record Types
//!
//! A [`LogRecord`] is one timestamped event about a named resource. Records
//! arrive as CSV lines from the ingestion layer and are stored in leaf
//! entries as a fixed 64-byte encoding so that node capacities can be
//! derived at compile time.
//!
//! ## Encoded Layout (64 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  --------------------------------
//! 0       8     timestamp_ms (i64 LE)
//! 8       8     resource_id (i64 LE)
//! 16      32    resource_name (zero-padded UTF-8)
//! 48      16    event_type (zero-padded UTF-8)
//! ```
//!
//! Names longer than 32 bytes and event types longer than 16 bytes are
//! truncated on encode; decoding stops at the first zero byte.
//!
//! ## CSV Line Format
//!
//! ```text
//! <timestamp_ms>,<resource_id>,<resource_name>,<event_type>
//! ```

use eyre::{ensure, eyre, Result, WrapErr};

use crate::config::{EVENT_TYPE_LEN, RECORD_SIZE, RESOURCE_NAME_LEN};
use crate::types::{Key, Value};

/// One event about a named resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp_ms: i64,
    pub resource_id: i64,
    pub resource_name: String,
    pub event_type: String,
}

impl LogRecord {
    pub fn new(
        timestamp_ms: i64,
        resource_id: i64,
        resource_name: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms,
            resource_id,
            resource_name: resource_name.into(),
            event_type: event_type.into(),
        }
    }

    /// The index key under which this record is stored.
    pub fn key(&self) -> Key {
        self.timestamp_ms as Key
    }

    /// Encodes the record into the fixed-width leaf value layout.
    pub fn encode(&self) -> Value {
        let mut buf = [0u8; RECORD_SIZE];
        buf[..8].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[8..16].copy_from_slice(&self.resource_id.to_le_bytes());
        copy_truncated(&mut buf[16..16 + RESOURCE_NAME_LEN], self.resource_name.as_bytes());
        copy_truncated(
            &mut buf[16 + RESOURCE_NAME_LEN..16 + RESOURCE_NAME_LEN + EVENT_TYPE_LEN],
            self.event_type.as_bytes(),
        );
        buf
    }

    /// Decodes a fixed-width leaf value back into a record.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() == RECORD_SIZE,
            "encoded record must be {} bytes, got {}",
            RECORD_SIZE,
            buf.len()
        );

        let timestamp_ms = i64::from_le_bytes(buf[..8].try_into().expect("slice is 8 bytes"));
        let resource_id = i64::from_le_bytes(buf[8..16].try_into().expect("slice is 8 bytes"));
        let resource_name = decode_padded(&buf[16..16 + RESOURCE_NAME_LEN])?;
        let event_type =
            decode_padded(&buf[16 + RESOURCE_NAME_LEN..16 + RESOURCE_NAME_LEN + EVENT_TYPE_LEN])?;

        Ok(Self {
            timestamp_ms,
            resource_id,
            resource_name,
            event_type,
        })
    }

    /// Parses one CSV line: `timestamp_ms,resource_id,resource_name,event_type`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(4, ',');

        let timestamp_ms: i64 = fields
            .next()
            .ok_or_else(|| eyre!("missing timestamp field"))?
            .trim()
            .parse()
            .wrap_err("invalid timestamp")?;
        let resource_id: i64 = fields
            .next()
            .ok_or_else(|| eyre!("missing resource_id field"))?
            .trim()
            .parse()
            .wrap_err("invalid resource_id")?;
        let resource_name = fields
            .next()
            .ok_or_else(|| eyre!("missing resource_name field"))?
            .to_string();
        let event_type = fields
            .next()
            .ok_or_else(|| eyre!("missing event_type field"))?
            .to_string();

        Ok(Self {
            timestamp_ms,
            resource_id,
            resource_name,
            event_type,
        })
    }

    /// Formats the record as one CSV line, without a trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.timestamp_ms, self.resource_id, self.resource_name, self.event_type
        )
    }
}

fn copy_truncated(dst: &mut [u8], src: &[u8]) {
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
}

fn decode_padded(buf: &[u8]) -> Result<String> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end])
        .map(str::to_string)
        .map_err(|e| eyre!("invalid UTF-8 in encoded record: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord::new(1_700_000_000_123, 1042, "vm-node-7", "RESTART")
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let record = sample();
        let encoded = record.encode();
        let decoded = LogRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn encode_truncates_long_names() {
        let long_name = "x".repeat(RESOURCE_NAME_LEN + 10);
        let record = LogRecord::new(1, 2, long_name, "START");
        let decoded = LogRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.resource_name.len(), RESOURCE_NAME_LEN);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(LogRecord::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn csv_round_trip() {
        let record = sample();
        let parsed = LogRecord::parse_line(&record.to_line()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn parse_line_tolerates_trailing_newline() {
        let parsed = LogRecord::parse_line("100,5,db-host,STOP\n").unwrap();
        assert_eq!(parsed.timestamp_ms, 100);
        assert_eq!(parsed.resource_id, 5);
        assert_eq!(parsed.resource_name, "db-host");
        assert_eq!(parsed.event_type, "STOP");
    }

    #[test]
    fn parse_line_rejects_garbage_timestamp() {
        assert!(LogRecord::parse_line("abc,5,x,STOP").is_err());
    }

    #[test]
    fn parse_line_rejects_short_lines() {
        assert!(LogRecord::parse_line("100,5,x").is_err());
    }

    #[test]
    fn key_is_the_timestamp() {
        assert_eq!(sample().key(), 1_700_000_000_123);
    }
}
