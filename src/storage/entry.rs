//! Stored Entry Module
//!
//! The record a backend keeps for one (key, params) pair.

use chrono::{DateTime, Utc};

use crate::error::{CacheError, Result};

// == Stored Entry ==
/// Encoded body plus the metadata needed to judge it on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Encoded (and possibly compressed) body
    pub data: Vec<u8>,
    /// Write time, already jittered
    pub timestamp: DateTime<Utc>,
    /// Codec/compression tag the body was written with
    pub tag: String,
}

impl StoredEntry {
    pub fn new(data: Vec<u8>, timestamp: DateTime<Utc>, tag: impl Into<String>) -> Self {
        Self {
            data,
            timestamp,
            tag: tag.into(),
        }
    }

    // == Is Expired ==
    /// Checks the entry against a read-time cutoff.
    ///
    /// Boundary condition: a timestamp equal to the cutoff is still fresh.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.timestamp < cutoff
    }

    /// Applies the lookup rules shared by all backends: a foreign tag reads as
    /// not found, an old timestamp as expired.
    pub fn check(&self, tag: &str, cutoff: DateTime<Utc>) -> Result<()> {
        if self.tag != tag {
            return Err(CacheError::EntryNotFound);
        }
        if self.is_expired(cutoff) {
            // keep the entry: stale fallback may still want it
            return Err(CacheError::EntryExpired);
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Utc::now();
        let entry = StoredEntry::new(b"v".to_vec(), now, "json:gzip");

        assert!(!entry.is_expired(now), "timestamp == cutoff is fresh");
        assert!(entry.is_expired(now + TimeDelta::milliseconds(1)));
        assert!(!entry.is_expired(now - TimeDelta::seconds(5)));
    }

    #[test]
    fn test_check_tag_mismatch_is_not_found() {
        let now = Utc::now();
        let entry = StoredEntry::new(b"v".to_vec(), now, "json:gzip");

        assert!(matches!(
            entry.check("json:none", now),
            Err(CacheError::EntryNotFound)
        ));
    }

    #[test]
    fn test_check_tag_is_compared_before_expiry() {
        let now = Utc::now();
        let entry = StoredEntry::new(b"v".to_vec(), now, "json:gzip");

        assert!(matches!(
            entry.check("string:gzip", now + TimeDelta::hours(1)),
            Err(CacheError::EntryNotFound)
        ));
        assert!(matches!(
            entry.check("json:gzip", now + TimeDelta::hours(1)),
            Err(CacheError::EntryExpired)
        ));
        assert!(entry.check("json:gzip", now).is_ok());
    }
}
