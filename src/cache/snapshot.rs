//! Immutable configuration snapshot.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::resolve::ValueSource;
use crate::schema::TypedValue;

/// One resolved field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub value: TypedValue,
    pub source: ValueSource,

    /// Store revision this value reflects. Events at or below it are stale.
    pub store_revision: u64,
}

/// A complete, consistent view of every mapped field.
///
/// Never mutated after publication; updates build a new snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    revision: u64,
    store_revision: u64,
    updated_at: SystemTime,
    fields: BTreeMap<String, FieldEntry>,
}

impl ConfigSnapshot {
    pub fn new(revision: u64, store_revision: u64, fields: BTreeMap<String, FieldEntry>) -> Self {
        Self {
            revision,
            store_revision,
            updated_at: SystemTime::now(),
            fields,
        }
    }

    /// The empty snapshot served before anything has been resolved.
    pub fn placeholder() -> Self {
        Self::new(0, 0, BTreeMap::new())
    }

    /// Local publish counter. `0` is the placeholder.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Highest store revision reflected in this snapshot.
    pub fn store_revision(&self) -> u64 {
        self.store_revision
    }

    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }

    pub fn is_placeholder(&self) -> bool {
        self.revision == 0
    }

    pub fn get(&self, field: &str) -> Option<&TypedValue> {
        self.fields.get(field).map(|e| &e.value)
    }

    pub fn entry(&self, field: &str) -> Option<&FieldEntry> {
        self.fields.get(field)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(TypedValue::as_bool)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(TypedValue::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(TypedValue::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(TypedValue::as_str)
    }

    pub fn get_list(&self, field: &str) -> Option<&[String]> {
        self.get(field).and_then(TypedValue::as_list)
    }

    pub fn source(&self, field: &str) -> Option<ValueSource> {
        self.fields.get(field).map(|e| e.source)
    }

    pub fn field_revision(&self, field: &str) -> Option<u64> {
        self.fields.get(field).map(|e| e.store_revision)
    }

    /// `(field, value)` pairs in field order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(f, e)| (f.as_str(), &e.value))
    }

    /// `(field, entry)` pairs in field order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(f, e)| (f.as_str(), e))
    }

    /// Owned copy of every value, keyed by field.
    pub fn to_map(&self) -> BTreeMap<String, TypedValue> {
        self.fields
            .iter()
            .map(|(f, e)| (f.clone(), e.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A successor snapshot with `field` replaced.
    pub fn with_field(&self, revision: u64, field: &str, entry: FieldEntry) -> Self {
        let mut fields = self.fields.clone();
        let store_revision = self.store_revision.max(entry.store_revision);
        fields.insert(field.to_string(), entry);
        Self::new(revision, store_revision, fields)
    }
}

impl Serialize for ConfigSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: BTreeMap<&str, &TypedValue> = self.values().collect();
        let sources: BTreeMap<&str, &'static str> = self
            .fields
            .iter()
            .map(|(f, e)| (f.as_str(), e.source.as_str()))
            .collect();

        let mut state = serializer.serialize_struct("ConfigSnapshot", 5)?;
        state.serialize_field("revision", &self.revision)?;
        state.serialize_field("store_revision", &self.store_revision)?;
        state.serialize_field("updated_at_ms", &unix_millis(self.updated_at))?;
        state.serialize_field("values", &values)?;
        state.serialize_field("sources", &sources)?;
        state.end()
    }
}

pub(crate) fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
