//! Source connectors.
//!
//! The migration core only sees the [`DocumentSource`] trait; [`appwrite`]
//! implements it over the Appwrite REST API.

pub mod appwrite;
pub mod common;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{AttributeDescriptor, CollectionRef, DatabaseRef};

/// A source document: ordered keys mapped to JSON values.
pub type SourceRecord = serde_json::Map<String, serde_json::Value>;

/// Prefix marking source-internal metadata keys (`$id`, `$createdAt`, ...).
pub const METADATA_PREFIX: char = '$';

/// Identity metadata key.
pub const ID_KEY: &str = "$id";
/// Creation timestamp metadata key.
pub const CREATED_AT_KEY: &str = "$createdAt";
/// Update timestamp metadata key.
pub const UPDATED_AT_KEY: &str = "$updatedAt";

/// Whether `key` is source-internal metadata.
#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with(METADATA_PREFIX)
}

/// Trait for document sources.
///
/// Pages are addressed by `limit`/`offset` and must come back in a stable
/// order for an unchanged collection.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Validate configuration and credentials.
    async fn connect(&mut self) -> Result<()>;

    /// All databases in the project.
    async fn list_databases(&self) -> Result<Vec<DatabaseRef>>;

    /// All collections of a database.
    async fn list_collections(&self, database_id: &str) -> Result<Vec<CollectionRef>>;

    /// Declared attributes of a collection, in source order.
    async fn list_attributes(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<AttributeDescriptor>>;

    /// Total number of documents in a collection.
    async fn count_documents(&self, database_id: &str, collection_id: &str) -> Result<u64>;

    /// One page of documents.
    async fn fetch_page(
        &self,
        database_id: &str,
        collection_id: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<SourceRecord>>;

    /// Up to `n` records from the start of a collection, read for
    /// relationship inference and never counted as a migrated page.
    async fn sample_records(
        &self,
        database_id: &str,
        collection_id: &str,
        n: usize,
    ) -> Result<Vec<SourceRecord>>;

    /// Total number of user accounts.
    async fn count_users(&self) -> Result<u64>;

    /// One page of user accounts.
    async fn fetch_users(&self, limit: usize, offset: u64) -> Result<Vec<SourceRecord>>;

    /// Release resources.
    async fn close(&mut self) -> Result<()>;
}

/// Create the Appwrite source from configuration.
#[must_use]
pub fn create_source(
    config: &crate::config::AppwriteConfig,
    retry: crate::retry::RetryConfig,
) -> Box<dyn DocumentSource> {
    Box::new(appwrite::AppwriteSource::new(config.clone(), retry))
}
