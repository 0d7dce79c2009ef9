//! Collection schemas and their target representation.
//!
//! A source collection's schema is the ordered list of declared attributes
//! followed by any relationship fields inferred from sampled documents.
//! [`mapper`] turns each attribute into a target field, [`sanitize`] derives
//! the target table name, [`inference`] finds undeclared reference fields and
//! [`translator`] ties them together and creates the target schema.

pub mod inference;
pub mod mapper;
pub mod sanitize;
pub mod translator;

use serde::{Deserialize, Serialize};

pub use inference::RelationshipInferrer;
pub use mapper::map_attribute;
pub use sanitize::sanitize_table_name;
pub use translator::{SchemaTranslator, TranslatedCollection};

/// Primary key column present on every target table.
pub const ID_FIELD: &str = "id";
/// Creation timestamp column present on every target table.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Update timestamp column present on every target table.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Names reserved for the implicit fields.
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Primitive attribute types understood by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    /// Text with a declared maximum size.
    String,
    /// 64-bit signed integer.
    Integer,
    /// Floating point number.
    Double,
    /// Boolean.
    Boolean,
    /// ISO 8601 timestamp.
    Datetime,
    /// Text formatted as an email address.
    Email,
    /// Text formatted as a URL.
    Url,
    /// Reference to records in another collection.
    Relationship,
    /// Anything else; mapped to unbounded text.
    #[serde(untagged)]
    Unknown(String),
}

impl PrimitiveType {
    /// Parses an attribute type name, honouring string formats.
    #[must_use]
    pub fn from_source(type_name: &str, format: Option<&str>) -> Self {
        match (type_name, format) {
            ("string", Some("email")) | ("email", _) => Self::Email,
            ("string", Some("url")) | ("url", _) => Self::Url,
            ("string", _) => Self::String,
            ("integer", _) => Self::Integer,
            ("double", _) => Self::Double,
            ("boolean", _) => Self::Boolean,
            ("datetime", _) => Self::Datetime,
            ("relationship", _) => Self::Relationship,
            (other, _) => Self::Unknown(other.to_string()),
        }
    }
}

/// One attribute of a source collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute key, unique within the collection.
    pub key: String,
    /// Primitive type.
    pub primitive_type: PrimitiveType,
    /// Declared maximum size (strings only).
    #[serde(default)]
    pub size: Option<u64>,
    /// Declared requiredness. Never turned into a NOT NULL constraint.
    #[serde(default)]
    pub required: bool,
    /// Attribute holds a list of values.
    #[serde(default)]
    pub array: bool,
}

impl AttributeDescriptor {
    /// Creates a scalar, optional attribute.
    pub fn new(key: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        Self {
            key: key.into(),
            primitive_type,
            size: None,
            required: false,
            array: false,
        }
    }

    /// Sets the declared size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Synthetic descriptor for an inferred relationship field.
    pub fn relationship(key: impl Into<String>) -> Self {
        Self::new(key, PrimitiveType::Relationship)
    }
}

/// A database in the source project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRef {
    /// Source database id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A collection in a source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    /// Source collection id.
    pub id: String,
    /// Display name, if the source reports one.
    pub name: Option<String>,
}

impl CollectionRef {
    /// Display name, or the id when the name is missing.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Ordered attribute list of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Source collection id.
    pub collection_id: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Declared attributes first, inferred relationship fields after.
    pub attributes: Vec<AttributeDescriptor>,
}

impl CollectionSchema {
    /// Builds a schema from declared attributes, dropping duplicate keys.
    #[must_use]
    pub fn new(collection: &CollectionRef, declared: Vec<AttributeDescriptor>) -> Self {
        let mut schema = Self {
            collection_id: collection.id.clone(),
            display_name: collection.name.clone(),
            attributes: Vec::with_capacity(declared.len()),
        };
        for attribute in declared {
            schema.push(attribute);
        }
        schema
    }

    /// Appends an attribute unless its key is already present.
    ///
    /// Returns `true` if the attribute was added.
    pub fn push(&mut self, attribute: AttributeDescriptor) -> bool {
        if self.contains(&attribute.key) {
            return false;
        }
        self.attributes.push(attribute);
        true
    }

    /// Whether an attribute with this key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.attributes.iter().any(|a| a.key == key)
    }

    /// Keys of attributes typed as relationships, in schema order.
    #[must_use]
    pub fn relationship_keys(&self) -> indexmap::IndexSet<String> {
        self.attributes
            .iter()
            .filter(|a| a.primitive_type == PrimitiveType::Relationship)
            .map(|a| a.key.clone())
            .collect()
    }
}

/// Target column / field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    /// Bounded text.
    Varchar(u64),
    /// Unbounded text.
    Text,
    /// 64-bit integer.
    BigInt,
    /// Double precision float.
    Double,
    /// Boolean.
    Boolean,
    /// Timestamp.
    Timestamp,
    /// Stored as-is by a document store; the primitive type is advisory.
    Native(PrimitiveType),
}

/// Role of a field in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRole {
    /// Primary key.
    Identity,
    /// Implicit creation / update timestamp.
    Timestamp,
    /// Regular attribute.
    Attribute,
}

/// One target column / field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFieldSpec {
    /// Column name.
    pub name: String,
    /// Column type.
    pub target_type: TargetType,
    /// Column accepts NULL.
    pub nullable: bool,
    /// Role of the column.
    pub role: FieldRole,
}

impl TargetFieldSpec {
    /// Nullable attribute column.
    pub fn attribute(name: impl Into<String>, target_type: TargetType) -> Self {
        Self {
            name: name.into(),
            target_type,
            nullable: true,
            role: FieldRole::Attribute,
        }
    }

    /// The three fields every target table carries, in order.
    #[must_use]
    pub fn implicit_fields(native: bool) -> Vec<Self> {
        let (id_type, ts_type) = if native {
            (
                TargetType::Native(PrimitiveType::String),
                TargetType::Native(PrimitiveType::Datetime),
            )
        } else {
            (TargetType::Varchar(255), TargetType::Timestamp)
        };
        vec![
            Self {
                name: ID_FIELD.to_string(),
                target_type: id_type,
                nullable: false,
                role: FieldRole::Identity,
            },
            Self {
                name: CREATED_AT_FIELD.to_string(),
                target_type: ts_type.clone(),
                nullable: true,
                role: FieldRole::Timestamp,
            },
            Self {
                name: UPDATED_AT_FIELD.to_string(),
                target_type: ts_type,
                nullable: true,
                role: FieldRole::Timestamp,
            },
        ]
    }
}

/// Persisted link between a source collection and its target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMapping {
    /// Source collection id (metadata key).
    pub source_collection_id: String,
    /// Target table / collection name.
    pub target_name: String,
    /// Source display name.
    pub display_name: String,
    /// Source database id.
    pub source_database_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_from_source_formats() {
        assert_eq!(
            PrimitiveType::from_source("string", Some("email")),
            PrimitiveType::Email
        );
        assert_eq!(
            PrimitiveType::from_source("string", Some("url")),
            PrimitiveType::Url
        );
        assert_eq!(
            PrimitiveType::from_source("string", Some("enum")),
            PrimitiveType::String
        );
        assert_eq!(
            PrimitiveType::from_source("point", None),
            PrimitiveType::Unknown("point".to_string())
        );
    }

    #[test]
    fn test_collection_schema_keeps_first_key() {
        let collection = CollectionRef {
            id: "posts".to_string(),
            name: Some("Posts".to_string()),
        };
        let mut schema = CollectionSchema::new(
            &collection,
            vec![
                AttributeDescriptor::new("title", PrimitiveType::String).with_size(120),
                AttributeDescriptor::new("title", PrimitiveType::Integer),
            ],
        );

        assert_eq!(schema.attributes.len(), 1);
        assert_eq!(schema.attributes[0].primitive_type, PrimitiveType::String);
        assert!(!schema.push(AttributeDescriptor::relationship("title")));
        assert!(schema.push(AttributeDescriptor::relationship("author")));
        assert_eq!(
            schema.relationship_keys().into_iter().collect::<Vec<_>>(),
            vec!["author".to_string()]
        );
    }

    #[test]
    fn test_implicit_fields_order() {
        let fields = TargetFieldSpec::implicit_fields(false);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, RESERVED_FIELDS);
        assert_eq!(fields[0].role, FieldRole::Identity);
        assert!(!fields[0].nullable);
    }

    #[test]
    fn test_collection_display_name_falls_back_to_id() {
        let collection = CollectionRef {
            id: "64f0c0ffee".to_string(),
            name: None,
        };
        assert_eq!(collection.display_name(), "64f0c0ffee");
    }
}
