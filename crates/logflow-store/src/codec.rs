//! Row envelope carrying an absolute expiry time.
//!
//! Every value written by the store is prefixed with 8 big-endian bytes
//! holding the Unix second at which the row expires, or 0 for never.
//! Expired rows are invisible to reads and removed by the sweeper.

use crate::error::{Result, StoreError};
use chrono::Utc;

const HEADER_LEN: usize = 8;

/// A decoded row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Row<'a> {
    pub(crate) expires_at: u64,
    pub(crate) payload: &'a [u8],
}

impl Row<'_> {
    pub(crate) const fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }
}

pub(crate) fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Converts a retention time into an absolute expiry.
pub(crate) const fn expiry_for(retention_secs: u64, now: u64) -> u64 {
    if retention_secs == 0 {
        0
    } else {
        now.saturating_add(retention_secs)
    }
}

pub(crate) fn encode(expires_at: u64, payload: &[u8]) -> Vec<u8> {
    let mut row = Vec::with_capacity(HEADER_LEN + payload.len());
    row.extend_from_slice(&expires_at.to_be_bytes());
    row.extend_from_slice(payload);
    row
}

pub(crate) fn decode<'a>(key: &[u8], raw: &'a [u8]) -> Result<Row<'a>> {
    let Some((header, payload)) = raw.split_first_chunk::<HEADER_LEN>() else {
        return Err(StoreError::Corrupted {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: format!("row of {} bytes is shorter than the expiry header", raw.len()),
        });
    };
    Ok(Row {
        expires_at: u64::from_be_bytes(*header),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode() {
        let raw = encode(1_700_000_000, b"{}");
        assert_eq!(raw.len(), 10);
        let row = decode(b"k", &raw);
        assert!(matches!(row, Ok(Row { expires_at: 1_700_000_000, payload: b"{}" })));
    }

    #[test]
    fn short_row_is_corrupted() {
        let err = decode(b"entry:app:x", b"abc");
        assert!(matches!(err, Err(StoreError::Corrupted { ref key, .. }) if key == "entry:app:x"));
    }

    #[test]
    fn zero_expiry_never_expires() {
        let row = Row { expires_at: 0, payload: &[] };
        assert!(!row.is_expired(u64::MAX));
    }

    #[test]
    fn expiry_is_inclusive() {
        let row = Row { expires_at: 100, payload: &[] };
        assert!(!row.is_expired(99));
        assert!(row.is_expired(100));
    }

    #[test]
    fn expiry_for_retention() {
        assert_eq!(expiry_for(0, 1_000), 0);
        assert_eq!(expiry_for(60, 1_000), 1_060);
        assert_eq!(expiry_for(u64::MAX, 1_000), u64::MAX);
    }
}
