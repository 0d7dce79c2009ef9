//! Source document → target record transformation.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::schema::RESERVED_FIELDS;
use crate::source::{is_metadata_key, SourceRecord, CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY};
use crate::target::DialectFamily;

/// A record ready to be written to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    /// Primary key, taken from the source identity.
    pub id: String,
    /// Source creation time, or the transform time if absent.
    pub created_at: DateTime<Utc>,
    /// Source update time, or the transform time if absent.
    pub updated_at: DateTime<Utc>,
    /// Non-metadata fields in source order.
    pub fields: Map<String, Value>,
}

/// Turns source documents into target records for one collection.
#[derive(Debug, Clone)]
pub struct DocumentTransformer {
    family: DialectFamily,
    relationship_keys: IndexSet<String>,
}

impl DocumentTransformer {
    /// Creates a transformer for `family` with the collection's relationship fields.
    #[must_use]
    pub fn new(family: DialectFamily, relationship_keys: IndexSet<String>) -> Self {
        Self {
            family,
            relationship_keys,
        }
    }

    /// Transforms a record, using the current time for missing timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no identity.
    pub fn transform(&self, record: &SourceRecord) -> Result<TargetRecord> {
        self.transform_at(record, Utc::now())
    }

    /// Transforms a record, using `now` for missing timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no identity.
    pub fn transform_at(&self, record: &SourceRecord, now: DateTime<Utc>) -> Result<TargetRecord> {
        let id = identity(record)?;

        let mut fields = Map::new();
        for (key, value) in record {
            if is_metadata_key(key) || RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            fields.insert(key.clone(), self.convert_value(key, value)?);
        }

        Ok(TargetRecord {
            id,
            created_at: timestamp(record, CREATED_AT_KEY).unwrap_or(now),
            updated_at: timestamp(record, UPDATED_AT_KEY).unwrap_or(now),
            fields,
        })
    }

    fn convert_value(&self, key: &str, value: &Value) -> Result<Value> {
        if value.is_null() || self.family == DialectFamily::Document {
            return Ok(value.clone());
        }

        let encode = self.relationship_keys.contains(key)
            || matches!(value, Value::Array(_) | Value::Object(_));
        if encode {
            Ok(Value::String(serde_json::to_string(value)?))
        } else {
            Ok(value.clone())
        }
    }
}

pub(crate) fn identity(record: &SourceRecord) -> Result<String> {
    match record.get(ID_KEY) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::Transform(format!(
            "Record without '{}' metadata",
            ID_KEY
        ))),
    }
}

pub(crate) fn timestamp(record: &SourceRecord, key: &str) -> Option<DateTime<Utc>> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
