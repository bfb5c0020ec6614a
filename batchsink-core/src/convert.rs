//! Conversion of application records into [BatchEntry]s.
//!
//! Conversion never fails: a record that cannot be serialized becomes an invalid entry which is
//! rejected, with a fatal classification, when its batch is submitted. That way a malformed record
//! is never dropped from a batch without a diagnosis.
use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::entry::BatchEntry;

/// Per-record information available at conversion time.
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    /// Service specific fields to attach to the entry.
    pub headers: HashMap<String, String>,
}

impl RecordContext {
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Turns a record into a [BatchEntry].
pub trait EntryConverter<T>: Send + Sync {
    fn convert(&self, record: T, context: &RecordContext) -> BatchEntry;
}

/// Turns a record into its payload bytes.
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, record: &T) -> Result<Bytes, String>;
}

/// Writes string records as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl<T: AsRef<str>> Serializer<T> for StringSerializer {
    fn serialize(&self, record: &T) -> Result<Bytes, String> {
        Ok(Bytes::copy_from_slice(record.as_ref().as_bytes()))
    }
}

/// Writes records as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T: Serialize> Serializer<T> for JsonSerializer {
    fn serialize(&self, record: &T) -> Result<Bytes, String> {
        serde_json::to_vec(record)
            .map(Bytes::from)
            .map_err(|e| format!("Failed to serialize record as JSON: {e}"))
    }
}

/// Serializes records and assigns each entry a fresh UUID as its correlation id.
#[derive(Debug, Clone, Default)]
pub struct SerializingConverter<S> {
    serializer: S,
}

impl<S> SerializingConverter<S> {
    pub fn new(serializer: S) -> Self {
        Self { serializer }
    }
}

/// New correlation id for an entry.
pub fn new_entry_id() -> String {
    Uuid::new_v4().to_string()
}

impl<T, S> EntryConverter<T> for SerializingConverter<S>
where
    S: Serializer<T>,
{
    fn convert(&self, record: T, context: &RecordContext) -> BatchEntry {
        let id = new_entry_id();
        match self.serializer.serialize(&record) {
            Ok(payload) => BatchEntry::new(id, payload).with_headers(context.headers.clone()),
            Err(reason) => {
                tracing::warn!(%id, %reason, "Record could not be converted, it will be rejected on submit");
                BatchEntry::invalid(id, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde::ser::Error as _;

    use super::*;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<Ser: serde::Serializer>(&self, _: Ser) -> Result<Ser::Ok, Ser::Error> {
            Err(Ser::Error::custom("cannot serialize"))
        }
    }

    #[derive(Serialize)]
    struct Order {
        id: u32,
        item: &'static str,
    }

    #[test]
    fn test_string_converter() {
        let converter = SerializingConverter::new(StringSerializer);
        let context = RecordContext::default().with_header("MessageGroupId", "group-1");
        let entry = converter.convert("test1".to_string(), &context);

        assert_eq!(entry.payload, Bytes::from("test1"));
        assert_eq!(
            entry.headers.get("MessageGroupId").map(String::as_str),
            Some("group-1")
        );
        assert!(entry.is_valid());
        assert!(Uuid::parse_str(&entry.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let converter = SerializingConverter::new(StringSerializer);
        let ids: HashSet<String> = (0..100)
            .map(|i| converter.convert(format!("record-{i}"), &RecordContext::default()).id)
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_json_converter() {
        let converter = SerializingConverter::new(JsonSerializer);
        let entry = converter.convert(Order { id: 7, item: "book" }, &RecordContext::default());
        assert_eq!(entry.payload, Bytes::from(r#"{"id":7,"item":"book"}"#));
    }

    #[test]
    fn test_serialization_failure_yields_invalid_entry() {
        let converter = SerializingConverter::new(JsonSerializer);
        let entry = converter.convert(Unserializable, &RecordContext::default());
        assert!(!entry.is_valid());
        assert!(entry.payload.is_empty());
        assert!(entry.invalid.unwrap().contains("cannot serialize"));
    }
}
