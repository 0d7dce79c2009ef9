//! Target stores.
//!
//! The migration core writes through the [`TargetStore`] trait. SQL stores
//! share their rendering through [`SqlDialect`]; the document store keeps
//! values native. [`memory::MemoryTarget`] backs dry runs and tests.

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::schema::{CollectionMapping, TargetFieldSpec};
use crate::transform::TargetRecord;

pub use memory::MemoryTarget;
pub use sql::SqlDialect;

/// Name of the table / collection holding collection mappings.
pub const METADATA_TABLE: &str = "collection_metadata";

/// Supported target dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL.
    #[serde(rename = "postgres")]
    Postgres,
    /// MySQL / MariaDB.
    #[serde(rename = "mysql")]
    MySql,
    /// MongoDB.
    #[serde(rename = "mongodb")]
    MongoDb,
}

/// Whether a dialect stores rows or documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectFamily {
    /// Relational: compound values are JSON-encoded text.
    Sql,
    /// Document: compound values are stored natively.
    Document,
}

impl Dialect {
    /// Storage family of this dialect.
    #[must_use]
    pub fn family(self) -> DialectFamily {
        match self {
            Self::Postgres | Self::MySql => DialectFamily::Sql,
            Self::MongoDb => DialectFamily::Document,
        }
    }

    /// SQL rendering rules, if this is a SQL dialect.
    #[must_use]
    pub fn sql(self) -> Option<SqlDialect> {
        match self {
            Self::Postgres => Some(SqlDialect::Postgres),
            Self::MySql => Some(SqlDialect::MySql),
            Self::MongoDb => None,
        }
    }

    /// Longest identifier the dialect accepts.
    #[must_use]
    pub fn max_identifier_length(self) -> usize {
        match self {
            Self::Postgres => 63,
            Self::MySql => 64,
            Self::MongoDb => crate::schema::sanitize::DEFAULT_MAX_IDENTIFIER_LENGTH,
        }
    }

    /// Config / feature name of the dialect.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MongoDb => "mongodb",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an upsert does when a row with the same id exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the existing row untouched.
    #[default]
    Ignore,
    /// Overwrite the existing row's fields.
    Update,
}

/// Effect of one upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with this id already existed and was left as is.
    Skipped,
    /// A row with this id already existed and was overwritten.
    Updated,
}

/// Trait for target stores.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Dialect of this store.
    fn dialect(&self) -> Dialect;

    /// Open connections and verify the target is reachable.
    async fn connect(&mut self) -> Result<()>;

    /// Create the collection mapping store if it does not exist.
    async fn ensure_metadata_store(&mut self) -> Result<()>;

    /// Create a table / collection if it does not exist.
    ///
    /// Existing tables are left unchanged.
    async fn create_schema(&mut self, target_name: &str, fields: &[TargetFieldSpec]) -> Result<()>;

    /// Write one record keyed by its id.
    async fn upsert(&self, target_name: &str, record: &TargetRecord) -> Result<UpsertOutcome>;

    /// Insert a collection mapping unless one exists for the same source id.
    async fn record_mapping(&self, mapping: &CollectionMapping) -> Result<()>;

    /// Release connections.
    async fn close(&mut self) -> Result<()>;
}

/// Create a target store from configuration.
///
/// # Errors
///
/// Returns [`Error::UnsupportedDialect`] if the dialect's feature is not
/// compiled in.
pub fn create_target(config: &TargetConfig, policy: ConflictPolicy) -> Result<Box<dyn TargetStore>> {
    match config {
        #[cfg(feature = "postgres")]
        TargetConfig::Postgres(c) => Ok(Box::new(postgres::PostgresTarget::new(c.clone(), policy))),
        #[cfg(feature = "mysql")]
        TargetConfig::MySql(c) => Ok(Box::new(mysql::MySqlTarget::new(c.clone(), policy))),
        #[cfg(feature = "mongodb")]
        TargetConfig::MongoDb(c) => Ok(Box::new(mongodb::MongoTarget::new(c.clone(), policy))),
        #[allow(unreachable_patterns)]
        other => {
            let _ = policy;
            Err(Error::UnsupportedDialect(format!(
                "{} (build with the '{}' feature)",
                other.dialect(),
                other.dialect()
            )))
        }
    }
}
