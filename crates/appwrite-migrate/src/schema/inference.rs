//! Relationship field inference from sampled documents.
//!
//! Appwrite documents can carry fields named after another collection's id
//! whose values are document ids of that collection. These are not declared
//! as attributes, so the only evidence is the data itself. A key qualifies
//! when its name matches the identifier pattern, and is confirmed when every
//! sampled value under it is null, one identifier, or a list of identifiers.
//!
//! This is a heuristic over a small sample: rare fields absent from the
//! sample are missed, and incidental hex-looking fields can be misread as
//! references.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::AttributeDescriptor;
use crate::error::Result;
use crate::source::{is_metadata_key, DocumentSource, SourceRecord};

/// Detects undeclared relationship fields.
#[derive(Debug, Clone)]
pub struct RelationshipInferrer {
    pattern: Regex,
    sample_size: usize,
}

impl RelationshipInferrer {
    /// Creates an inferrer matching identifiers against `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(pattern: &str, sample_size: usize) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            sample_size,
        })
    }

    /// Number of records sampled per collection.
    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Samples the start of a collection and infers relationship fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample cannot be fetched.
    pub async fn infer(
        &self,
        source: &dyn DocumentSource,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<AttributeDescriptor>> {
        let sample = source
            .sample_records(database_id, collection_id, self.sample_size)
            .await?;
        let fields = self.infer_from_sample(&sample);
        debug!(
            "Inferred {} relationship field(s) in {} from {} sampled record(s)",
            fields.len(),
            collection_id,
            sample.len()
        );
        Ok(fields)
    }

    /// Infers relationship fields from an already fetched sample.
    ///
    /// Fields are returned in order of first appearance.
    #[must_use]
    pub fn infer_from_sample(&self, sample: &[SourceRecord]) -> Vec<AttributeDescriptor> {
        let mut candidates: IndexMap<&str, bool> = IndexMap::new();

        for record in sample.iter().take(self.sample_size) {
            for (key, value) in record {
                if is_metadata_key(key) || !self.pattern.is_match(key) {
                    continue;
                }
                let confirmed = candidates.entry(key.as_str()).or_insert(true);
                if *confirmed && !self.is_reference_value(value) {
                    *confirmed = false;
                }
            }
        }

        candidates
            .into_iter()
            .filter(|(_, confirmed)| *confirmed)
            .map(|(key, _)| AttributeDescriptor::relationship(key))
            .collect()
    }

    fn is_reference_value(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => self.pattern.is_match(s),
            Value::Array(items) => items
                .iter()
                .all(|item| item.as_str().is_some_and(|s| self.pattern.is_match(s))),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PrimitiveType;
    use serde_json::json;

    const FIELD: &str = "01234567890123456789";

    fn inferrer() -> RelationshipInferrer {
        RelationshipInferrer::new("^[0-9a-fA-F]{20}$", 10).unwrap()
    }

    fn record(value: Value) -> SourceRecord {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test records are objects"),
        }
    }

    #[test]
    fn test_confirms_conforming_values() {
        let sample = vec![
            record(json!({"$id": "a", FIELD: "98765432109876543210"})),
            record(json!({"$id": "b", FIELD: null})),
            record(json!({"$id": "c", FIELD: ["aaaaaaaaaabbbbbbbbbb", "ccccccccccdddddddddd"]})),
            record(json!({"$id": "d"})),
        ];

        let fields = inferrer().infer_from_sample(&sample);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].key, FIELD);
        assert_eq!(fields[0].primitive_type, PrimitiveType::Relationship);
        assert!(!fields[0].required);
    }

    #[test]
    fn test_rejects_one_non_conforming_value() {
        let sample = vec![
            record(json!({FIELD: "98765432109876543210"})),
            record(json!({FIELD: "hello"})),
        ];
        assert!(inferrer().infer_from_sample(&sample).is_empty());
    }

    #[test]
    fn test_rejects_mixed_arrays_and_objects() {
        let other = "aaaaaaaaaaaaaaaaaaaa";
        let sample = vec![
            record(json!({FIELD: ["98765432109876543210", 5], other: {"$id": "x"}})),
        ];
        assert!(inferrer().infer_from_sample(&sample).is_empty());
    }

    #[test]
    fn test_ignores_keys_not_shaped_like_ids() {
        let sample = vec![record(json!({"author": "98765432109876543210"}))];
        assert!(inferrer().infer_from_sample(&sample).is_empty());
    }

    #[test]
    fn test_ignores_metadata_keys() {
        let sample = vec![record(json!({"$collectionId": "98765432109876543210"}))];
        assert!(inferrer().infer_from_sample(&sample).is_empty());
    }

    #[test]
    fn test_only_sample_window_is_considered() {
        let inferrer = RelationshipInferrer::new("^[0-9a-f]{20}$", 1).unwrap();
        let sample = vec![
            record(json!({FIELD: "98765432109876543210"})),
            record(json!({FIELD: "not an id"})),
        ];
        assert_eq!(inferrer.infer_from_sample(&sample).len(), 1);
    }

    #[test]
    fn test_custom_pattern() {
        let inferrer = RelationshipInferrer::new("^[0-9a-f]{24}$", 10).unwrap();
        let key = "507f1f77bcf86cd799439011";
        let sample = vec![record(json!({key: "507f191e810c19729de860ea"}))];
        assert_eq!(inferrer.infer_from_sample(&sample)[0].key, key);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(RelationshipInferrer::new("([", 10).is_err());
    }
}
