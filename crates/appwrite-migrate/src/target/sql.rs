//! SQL rendering shared by the relational stores.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::{ConflictPolicy, METADATA_TABLE};
use crate::error::{Error, Result};
use crate::schema::{
    FieldRole, TargetFieldSpec, TargetType, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::transform::TargetRecord;

/// Key column of the metadata table.
pub const METADATA_KEY: &str = "appwrite_id";

/// Columns written when recording a mapping, in bind order.
pub const METADATA_COLUMNS: [&str; 4] =
    [METADATA_KEY, "table_name", "display_name", "database_id"];

/// SQL flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    /// PostgreSQL.
    Postgres,
    /// MySQL / MariaDB.
    MySql,
}

impl SqlDialect {
    /// Widest `VARCHAR` the dialect accepts.
    #[must_use]
    pub fn max_varchar_length(self) -> u64 {
        match self {
            Self::Postgres => 10_485_760,
            Self::MySql => 16_383,
        }
    }

    /// Quotes an identifier, doubling embedded quote characters.
    #[must_use]
    pub fn quote_identifier(self, ident: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Bind placeholder for the 1-based parameter `n`.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            Self::MySql => "?".to_string(),
        }
    }

    /// Column type for a target type.
    #[must_use]
    pub fn column_type(self, target_type: &TargetType) -> String {
        match (self, target_type) {
            (_, TargetType::Varchar(n)) => format!("VARCHAR({})", n),
            (_, TargetType::Text | TargetType::Native(_)) => "TEXT".to_string(),
            (_, TargetType::BigInt) => "BIGINT".to_string(),
            (Self::Postgres, TargetType::Double) => "DOUBLE PRECISION".to_string(),
            (Self::MySql, TargetType::Double) => "DOUBLE".to_string(),
            (_, TargetType::Boolean) => "BOOLEAN".to_string(),
            (Self::Postgres, TargetType::Timestamp) => "TIMESTAMP".to_string(),
            (Self::MySql, TargetType::Timestamp) => "DATETIME(3)".to_string(),
        }
    }

    /// Column definition for one field.
    #[must_use]
    pub fn render_field_spec(self, spec: &TargetFieldSpec) -> String {
        let name = self.quote_identifier(&spec.name);
        match spec.role {
            FieldRole::Identity => {
                format!("{} {} PRIMARY KEY", name, self.column_type(&spec.target_type))
            }
            FieldRole::Timestamp => format!("{} TIMESTAMP DEFAULT CURRENT_TIMESTAMP", name),
            FieldRole::Attribute => {
                let null = if spec.nullable { "" } else { " NOT NULL" };
                format!("{} {}{}", name, self.column_type(&spec.target_type), null)
            }
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` for a table.
    #[must_use]
    pub fn create_table_sql(self, table: &str, fields: &[TargetFieldSpec]) -> String {
        let columns: Vec<String> = fields.iter().map(|f| self.render_field_spec(f)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(table),
            columns.join(", ")
        )
    }

    /// `CREATE TABLE IF NOT EXISTS` for the metadata table.
    #[must_use]
    pub fn metadata_table_sql(self) -> String {
        self.create_table_sql(METADATA_TABLE, &metadata_fields())
    }

    /// Insert-or-ignore for a mapping row.
    #[must_use]
    pub fn insert_mapping_sql(self) -> String {
        self.insert_sql(
            METADATA_TABLE,
            &METADATA_COLUMNS,
            &self.ignore_clause(METADATA_KEY),
        )
    }

    /// Upsert keyed by `id`.
    ///
    /// On Postgres the statement returns one row with an `inserted` flag
    /// when a row was written, and no row when the conflict was ignored.
    #[must_use]
    pub fn upsert_sql<S: AsRef<str>>(
        self,
        table: &str,
        columns: &[S],
        policy: ConflictPolicy,
    ) -> String {
        let conflict = match policy {
            ConflictPolicy::Ignore => self.ignore_clause(ID_FIELD),
            ConflictPolicy::Update => self.build_update(columns),
        };
        let sql = self.insert_sql(table, columns, &conflict);
        match self {
            Self::Postgres => format!("{} RETURNING (xmax = 0) AS inserted", sql),
            Self::MySql => sql,
        }
    }

    /// Update-on-conflict clause overwriting every non-key column.
    ///
    /// Falls back to the ignore clause when there is nothing to update.
    #[must_use]
    pub fn build_update<S: AsRef<str>>(self, columns: &[S]) -> String {
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| *c != ID_FIELD)
            .map(|c| {
                let q = self.quote_identifier(c);
                match self {
                    Self::Postgres => format!("{} = EXCLUDED.{}", q, q),
                    Self::MySql => format!("{} = VALUES({})", q, q),
                }
            })
            .collect();

        if assignments.is_empty() {
            return self.ignore_clause(ID_FIELD);
        }
        match self {
            Self::Postgres => format!(
                "ON CONFLICT ({}) DO UPDATE SET {}",
                self.quote_identifier(ID_FIELD),
                assignments.join(", ")
            ),
            Self::MySql => format!("ON DUPLICATE KEY UPDATE {}", assignments.join(", ")),
        }
    }

    /// `SELECT 1` probe for an existing id.
    #[must_use]
    pub fn exists_sql(self, table: &str) -> String {
        format!(
            "SELECT 1 FROM {} WHERE {} = {}",
            self.quote_identifier(table),
            self.quote_identifier(ID_FIELD),
            self.placeholder(1)
        )
    }

    fn ignore_clause(self, key: &str) -> String {
        let key = self.quote_identifier(key);
        match self {
            Self::Postgres => format!("ON CONFLICT ({}) DO NOTHING", key),
            Self::MySql => format!("ON DUPLICATE KEY UPDATE {} = {}", key, key),
        }
    }

    fn insert_sql<S: AsRef<str>>(self, table: &str, columns: &[S], conflict: &str) -> String {
        let names: Vec<String> = columns
            .iter()
            .map(|c| self.quote_identifier(c.as_ref()))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| self.placeholder(n)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) {}",
            self.quote_identifier(table),
            names.join(", "),
            placeholders.join(", "),
            conflict
        )
    }
}

/// Fields of the metadata table.
#[must_use]
pub fn metadata_fields() -> Vec<TargetFieldSpec> {
    vec![
        TargetFieldSpec {
            name: METADATA_KEY.to_string(),
            target_type: TargetType::Varchar(255),
            nullable: false,
            role: FieldRole::Identity,
        },
        TargetFieldSpec {
            name: "table_name".to_string(),
            target_type: TargetType::Varchar(255),
            nullable: false,
            role: FieldRole::Attribute,
        },
        TargetFieldSpec::attribute("display_name", TargetType::Text),
        TargetFieldSpec {
            name: "database_id".to_string(),
            target_type: TargetType::Varchar(255),
            nullable: false,
            role: FieldRole::Attribute,
        },
        TargetFieldSpec {
            name: CREATED_AT_FIELD.to_string(),
            target_type: TargetType::Timestamp,
            nullable: true,
            role: FieldRole::Timestamp,
        },
    ]
}

/// A bind parameter typed by its column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Text column value.
    Text(Option<String>),
    /// Integer column value.
    BigInt(Option<i64>),
    /// Float column value.
    Double(Option<f64>),
    /// Boolean column value.
    Boolean(Option<bool>),
    /// Timestamp column value.
    Timestamp(Option<DateTime<Utc>>),
}

/// Converts a JSON value for a column of `target_type`.
///
/// # Errors
///
/// Returns an error if the value cannot be represented in the column.
pub fn to_sql_value(value: &Value, target_type: &TargetType) -> Result<SqlValue> {
    let converted = match target_type {
        TargetType::Varchar(_) | TargetType::Text | TargetType::Native(_) => {
            SqlValue::Text(match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
                Value::Array(_) | Value::Object(_) => Some(serde_json::to_string(value)?),
            })
        }
        TargetType::BigInt => SqlValue::BigInt(checked(
            value,
            target_type,
            match value {
                Value::Number(n) => n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                        .map(|f| f as i64)
                }),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            },
        )?),
        TargetType::Double => SqlValue::Double(checked(
            value,
            target_type,
            match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            },
        )?),
        TargetType::Boolean => SqlValue::Boolean(checked(
            value,
            target_type,
            match value {
                Value::Bool(b) => Some(*b),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
        )?),
        TargetType::Timestamp => SqlValue::Timestamp(checked(
            value,
            target_type,
            value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        )?),
    };
    Ok(converted)
}

/// A failed conversion is NULL for a null value and an error otherwise.
fn checked<T>(value: &Value, target_type: &TargetType, converted: Option<T>) -> Result<Option<T>> {
    match converted {
        Some(v) => Ok(Some(v)),
        None if value.is_null() => Ok(None),
        None => Err(Error::Transform(format!(
            "Value {} does not fit a {:?} column",
            value, target_type
        ))),
    }
}

/// Column names and values for one record, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    /// Column names.
    pub columns: Vec<String>,
    /// Bind values, one per column.
    pub values: Vec<SqlValue>,
}

/// Builds the row for `record` against the table's `fields`.
///
/// Columns follow the order of `fields`. Attribute columns the record does
/// not carry are left out; record keys without a column are dropped with a
/// warning.
///
/// # Errors
///
/// Returns an error if a value does not fit its column.
pub fn build_row(
    table: &str,
    fields: &[TargetFieldSpec],
    record: &TargetRecord,
) -> Result<SqlRow> {
    let mut row = SqlRow {
        columns: Vec::with_capacity(fields.len()),
        values: Vec::with_capacity(fields.len()),
    };

    for field in fields {
        let value = match field.name.as_str() {
            ID_FIELD => SqlValue::Text(Some(record.id.clone())),
            CREATED_AT_FIELD => SqlValue::Timestamp(Some(record.created_at)),
            UPDATED_AT_FIELD => SqlValue::Timestamp(Some(record.updated_at)),
            name => match record.fields.get(name) {
                Some(value) => to_sql_value(value, &field.target_type).map_err(|e| match e {
                    Error::Transform(msg) => {
                        Error::Transform(format!("{}.{}: {}", table, name, msg))
                    }
                    other => other,
                })?,
                None => continue,
            },
        };
        row.columns.push(field.name.clone());
        row.values.push(value);
    }

    for key in record.fields.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            warn!(
                "Dropping field '{}' of record {} in {}: no such column",
                key, record.id, table
            );
        }
    }

    Ok(row)
}

#[cfg(test)]
#[path = "sql_tests.rs"]
mod tests;
