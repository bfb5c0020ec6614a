use std::collections::{HashMap, HashSet};

use bytes::Bytes;

/// A wire-ready record submitted as part of one batch request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Correlation id used to match the entry against per-entry results. Unique within a batch
    /// and kept as-is when the entry is retried.
    pub id: String,
    /// Payload as it will be delivered, before any transport encoding.
    pub payload: Bytes,
    /// Service specific fields, e.g. the message group of an ordered queue.
    pub headers: HashMap<String, String>,
    /// Set when the record could not be converted; the entry is then rejected at submission.
    pub invalid: Option<String>,
}

impl BatchEntry {
    pub fn new(id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            headers: HashMap::new(),
            invalid: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// An entry standing in for a record that failed conversion.
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            invalid: Some(reason.into()),
            ..Self::new(id, Bytes::new())
        }
    }

    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }
}

/// Size of the entry as counted against the service's batch limits, i.e. the length of the raw
/// payload before any transport encoding (base64 etc.) is applied.
pub fn size_in_bytes(entry: &BatchEntry) -> usize {
    entry.payload.len()
}

/// An entry the service did not accept.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFailure {
    pub id: String,
    pub code: Option<String>,
    pub message: Option<String>,
    /// Whether the service blames the request rather than itself.
    pub sender_fault: Option<bool>,
}

impl EntryFailure {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: None,
            message: None,
            sender_fault: None,
        }
    }
}

/// Per-entry outcome of a batch request that the service accepted as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub failed: Vec<EntryFailure>,
}

impl BatchResult {
    /// Every entry was delivered.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_failed(failed: Vec<EntryFailure>) -> Self {
        Self { failed }
    }

    pub fn failed_ids(&self) -> HashSet<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes_counts_raw_payload() {
        assert_eq!(size_in_bytes(&BatchEntry::new("1", "abc")), 3);

        let text = "{many hands make light work;";
        assert_eq!(
            size_in_bytes(&BatchEntry::new("2", text.to_string())),
            text.len()
        );

        // multi-byte characters count by their UTF-8 encoding
        assert_eq!(size_in_bytes(&BatchEntry::new("3", "héllo")), 6);
        assert_eq!(size_in_bytes(&BatchEntry::invalid("4", "boom")), 0);
    }

    #[test]
    fn test_failed_ids() {
        let result = BatchResult::with_failed(vec![EntryFailure::new("a"), EntryFailure::new("b")]);
        let ids = result.failed_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a") && ids.contains("b"));
        assert!(BatchResult::success().failed_ids().is_empty());
    }

    #[test]
    fn test_invalid_entry() {
        let entry = BatchEntry::invalid("x", "not UTF-8");
        assert!(!entry.is_valid());
        assert_eq!(entry.invalid.as_deref(), Some("not UTF-8"));
        assert!(BatchEntry::new("y", "ok").is_valid());
    }
}
