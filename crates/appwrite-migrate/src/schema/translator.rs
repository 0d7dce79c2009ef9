//! Collection schema → target schema.

use indexmap::IndexSet;
use tracing::{debug, info, warn};

use super::{
    map_attribute, sanitize_table_name, CollectionMapping, CollectionSchema, RelationshipInferrer,
    TargetFieldSpec, RESERVED_FIELDS,
};
use crate::error::Result;
use crate::schema::CollectionRef;
use crate::source::DocumentSource;
use crate::target::{Dialect, DialectFamily, TargetStore};

/// Result of translating one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedCollection {
    /// Declared plus inferred attributes.
    pub schema: CollectionSchema,
    /// Resolved target table / collection name.
    pub target_name: String,
    /// Fields passed to `create_schema`, implicit fields first.
    pub fields: Vec<TargetFieldSpec>,
    /// Keys holding relationship values.
    pub relationship_keys: IndexSet<String>,
}

/// Builds target schemas and mappings for source collections.
#[derive(Debug, Clone)]
pub struct SchemaTranslator {
    inferrer: RelationshipInferrer,
    dialect: Dialect,
    max_identifier_length: usize,
}

impl SchemaTranslator {
    /// Creates a translator; `max_identifier_length` defaults to the dialect's limit.
    #[must_use]
    pub fn new(
        inferrer: RelationshipInferrer,
        dialect: Dialect,
        max_identifier_length: Option<usize>,
    ) -> Self {
        Self {
            inferrer,
            dialect,
            max_identifier_length: max_identifier_length
                .unwrap_or_else(|| dialect.max_identifier_length()),
        }
    }

    /// Target dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Derives the target name for a collection.
    #[must_use]
    pub fn target_name(&self, collection: &CollectionRef) -> String {
        sanitize_table_name(
            collection.name.as_deref().unwrap_or_default(),
            &collection.id,
            self.max_identifier_length,
        )
    }

    /// Target fields for a schema: implicit fields, then one per attribute.
    ///
    /// Attributes named like an implicit field are skipped.
    #[must_use]
    pub fn target_fields(&self, schema: &CollectionSchema) -> Vec<TargetFieldSpec> {
        let native = self.dialect.family() == DialectFamily::Document;
        let mut fields = TargetFieldSpec::implicit_fields(native);
        for attribute in &schema.attributes {
            if RESERVED_FIELDS.contains(&attribute.key.as_str()) {
                warn!(
                    "Skipping attribute '{}' of {}: name is reserved",
                    attribute.key, schema.collection_id
                );
                continue;
            }
            fields.push(map_attribute(attribute, self.dialect));
        }
        fields
    }

    /// Translates a collection and creates its target schema and mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the target rejects
    /// the schema or mapping.
    pub async fn translate(
        &self,
        source: &dyn DocumentSource,
        target: &mut dyn TargetStore,
        database_id: &str,
        collection: &CollectionRef,
    ) -> Result<TranslatedCollection> {
        let declared = source.list_attributes(database_id, &collection.id).await?;
        let mut schema = CollectionSchema::new(collection, declared);

        let inferred = self
            .inferrer
            .infer(source, database_id, &collection.id)
            .await?;
        for attribute in inferred {
            let key = attribute.key.clone();
            if schema.push(attribute) {
                debug!("Inferred relationship field {} in {}", key, collection.id);
            }
        }

        let target_name = self.target_name(collection);
        let fields = self.target_fields(&schema);
        target.create_schema(&target_name, &fields).await?;

        target
            .record_mapping(&CollectionMapping {
                source_collection_id: collection.id.clone(),
                target_name: target_name.clone(),
                display_name: collection.display_name().to_string(),
                source_database_id: database_id.to_string(),
            })
            .await?;

        info!(
            "Translated {} → {} ({} field(s))",
            collection.display_name(),
            target_name,
            fields.len()
        );

        Ok(TranslatedCollection {
            relationship_keys: schema.relationship_keys(),
            schema,
            target_name,
            fields,
        })
    }
}
