//! Attribute → target field mapping.

use super::{AttributeDescriptor, PrimitiveType, TargetFieldSpec, TargetType};
use crate::target::Dialect;

/// Width used for strings declared without a size.
pub const DEFAULT_STRING_SIZE: u64 = 255;

/// Width used for email attributes.
pub const EMAIL_SIZE: u64 = 255;

/// Maps one source attribute to a target field for `dialect`.
///
/// Every mapped field is nullable regardless of `attr.required`: historical
/// documents may predate the requirement and must still load.
#[must_use]
pub fn map_attribute(attr: &AttributeDescriptor, dialect: Dialect) -> TargetFieldSpec {
    let Some(sql) = dialect.sql() else {
        return TargetFieldSpec::attribute(
            attr.key.clone(),
            TargetType::Native(attr.primitive_type.clone()),
        );
    };

    // List attributes arrive JSON-encoded, so their declared size no longer applies.
    if attr.array {
        return TargetFieldSpec::attribute(attr.key.clone(), TargetType::Text);
    }

    let target_type = match &attr.primitive_type {
        PrimitiveType::String => {
            let size = attr.size.unwrap_or(DEFAULT_STRING_SIZE);
            if size == 0 || size > sql.max_varchar_length() {
                TargetType::Text
            } else {
                TargetType::Varchar(size)
            }
        }
        PrimitiveType::Integer => TargetType::BigInt,
        PrimitiveType::Double => TargetType::Double,
        PrimitiveType::Boolean => TargetType::Boolean,
        PrimitiveType::Datetime => TargetType::Timestamp,
        PrimitiveType::Email => TargetType::Varchar(EMAIL_SIZE),
        PrimitiveType::Url | PrimitiveType::Relationship | PrimitiveType::Unknown(_) => {
            TargetType::Text
        }
    };

    TargetFieldSpec::attribute(attr.key.clone(), target_type)
}
