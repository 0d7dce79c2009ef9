//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

use appwrite_migrate::config::{AppwriteConfig, MigrationOptions, SqlTargetConfig};
use appwrite_migrate::schema::{AttributeDescriptor, CollectionRef, DatabaseRef, PrimitiveType};
use appwrite_migrate::{Error, MigrationConfig, Result, SourceRecord, TargetConfig};

/// Relationship field name used across the scenarios.
pub const REL_KEY: &str = "01234567890123456789";
/// Relationship value used across the scenarios.
pub const REL_VALUE: &str = "98765432109876543210";

/// One `fetch_page` call seen by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub collection_id: String,
    pub limit: usize,
    pub offset: u64,
}

/// A collection held by [`MemorySource`].
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    pub reference: CollectionRef,
    pub attributes: Vec<AttributeDescriptor>,
    pub records: Vec<SourceRecord>,
    /// Count reported instead of `records.len()`.
    pub reported_count: Option<u64>,
    /// Fail every page fetched at or past this offset.
    pub fail_at: Option<u64>,
}

impl MemoryCollection {
    pub fn new(id: &str, name: Option<&str>) -> Self {
        Self {
            reference: CollectionRef {
                id: id.to_string(),
                name: name.map(str::to_string),
            },
            attributes: Vec::new(),
            records: Vec::new(),
            reported_count: None,
            fail_at: None,
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_records(mut self, records: Vec<SourceRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn reporting(mut self, count: u64) -> Self {
        self.reported_count = Some(count);
        self
    }

    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_at = Some(offset);
        self
    }
}

/// Document source held in memory, recording every page request.
#[derive(Debug, Default)]
pub struct MemorySource {
    databases: IndexMap<String, (DatabaseRef, Vec<MemoryCollection>)>,
    users: Vec<SourceRecord>,
    fetches: Mutex<Vec<FetchCall>>,
    samples: Mutex<Vec<String>>,
    fail_close: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, database_id: &str, collection: MemoryCollection) -> Self {
        self.databases
            .entry(database_id.to_string())
            .or_insert_with(|| {
                (
                    DatabaseRef {
                        id: database_id.to_string(),
                        name: database_id.to_string(),
                    },
                    Vec::new(),
                )
            })
            .1
            .push(collection);
        self
    }

    pub fn with_users(mut self, users: Vec<SourceRecord>) -> Self {
        self.users = users;
        self
    }

    /// Make `close` fail.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Every page request so far.
    pub fn fetches(&self) -> Vec<FetchCall> {
        self.fetches.lock().clone()
    }

    /// Collection ids sampled for inference so far.
    pub fn samples(&self) -> Vec<String> {
        self.samples.lock().clone()
    }

    /// Offsets of requests made with `limit`.
    pub fn offsets_with_limit(&self, collection_id: &str, limit: usize) -> Vec<u64> {
        self.fetches
            .lock()
            .iter()
            .filter(|f| f.collection_id == collection_id && f.limit == limit)
            .map(|f| f.offset)
            .collect()
    }

    fn collection(&self, database_id: &str, collection_id: &str) -> Result<&MemoryCollection> {
        self.databases
            .get(database_id)
            .and_then(|(_, cols)| cols.iter().find(|c| c.reference.id == collection_id))
            .ok_or_else(|| Error::Extraction(format!("no collection {collection_id}")))
    }
}

fn page(records: &[SourceRecord], limit: usize, offset: u64) -> Vec<SourceRecord> {
    records
        .iter()
        .skip(offset as usize)
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl appwrite_migrate::DocumentSource for MemorySource {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseRef>> {
        Ok(self.databases.values().map(|(db, _)| db.clone()).collect())
    }

    async fn list_collections(&self, database_id: &str) -> Result<Vec<CollectionRef>> {
        Ok(self
            .databases
            .get(database_id)
            .map(|(_, cols)| cols.iter().map(|c| c.reference.clone()).collect())
            .unwrap_or_default())
    }

    async fn list_attributes(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<AttributeDescriptor>> {
        Ok(self.collection(database_id, collection_id)?.attributes.clone())
    }

    async fn count_documents(&self, database_id: &str, collection_id: &str) -> Result<u64> {
        let collection = self.collection(database_id, collection_id)?;
        Ok(collection
            .reported_count
            .unwrap_or(collection.records.len() as u64))
    }

    async fn fetch_page(
        &self,
        database_id: &str,
        collection_id: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<SourceRecord>> {
        let collection = self.collection(database_id, collection_id)?;
        self.fetches.lock().push(FetchCall {
            collection_id: collection_id.to_string(),
            limit,
            offset,
        });
        if collection.fail_at.is_some_and(|at| offset >= at) {
            return Err(Error::SourceConnection("connection reset".to_string()));
        }
        Ok(page(&collection.records, limit, offset))
    }

    async fn sample_records(
        &self,
        database_id: &str,
        collection_id: &str,
        n: usize,
    ) -> Result<Vec<SourceRecord>> {
        let collection = self.collection(database_id, collection_id)?;
        self.samples.lock().push(collection_id.to_string());
        Ok(page(&collection.records, n, 0))
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.users.len() as u64)
    }

    async fn fetch_users(&self, limit: usize, offset: u64) -> Result<Vec<SourceRecord>> {
        Ok(page(&self.users, limit, offset))
    }

    async fn close(&mut self) -> Result<()> {
        if self.fail_close {
            return Err(Error::SourceConnection("close failed".to_string()));
        }
        Ok(())
    }
}

pub fn record(value: Value) -> SourceRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("records are objects, got {other}"),
    }
}

/// `count` numbered documents with a title.
pub fn numbered_records(count: usize) -> Vec<SourceRecord> {
    (0..count)
        .map(|i| {
            record(json!({
                "$id": format!("doc{i:04}"),
                "$createdAt": "2024-03-01T12:00:00.000+00:00",
                "$updatedAt": "2024-03-02T12:00:00.000+00:00",
                "$permissions": [],
                "title": format!("Post {i}")
            }))
        })
        .collect()
}

/// The `Posts` collection: one declared attribute, two records, one with a
/// relationship field.
pub fn posts_collection() -> MemoryCollection {
    MemoryCollection::new("posts0000000000000001", Some("Posts"))
        .with_attribute(AttributeDescriptor::new("title", PrimitiveType::String).with_size(120))
        .with_records(vec![
            record(json!({
                "$id": "p1",
                "$createdAt": "2024-03-01T12:00:00.000+00:00",
                "$updatedAt": "2024-03-01T12:00:00.000+00:00",
                "title": "First"
            })),
            record(json!({
                "$id": "p2",
                "$createdAt": "2024-03-02T12:00:00.000+00:00",
                "$updatedAt": "2024-03-02T12:00:00.000+00:00",
                "title": "Second",
                REL_KEY: REL_VALUE
            })),
        ])
}

pub fn users() -> Vec<SourceRecord> {
    vec![
        record(json!({
            "$id": "u1",
            "name": "Ada",
            "email": "ada@example.com",
            "phone": "",
            "emailVerification": true,
            "status": true,
            "registration": "2023-01-01T00:00:00.000+00:00",
            "prefs": {"theme": "dark"}
        })),
        record(json!({"$id": "u2", "email": "bob@example.com"})),
        record(json!({"$id": "u3", "status": false})),
    ]
}

/// A quiet config for a Postgres target.
pub fn config(options: MigrationOptions) -> MigrationConfig {
    MigrationConfig {
        source: AppwriteConfig {
            endpoint: "http://localhost/v1".to_string(),
            project_id: "test".to_string(),
            api_key: "key".to_string(),
        },
        target: TargetConfig::Postgres(SqlTargetConfig {
            connection_string: "postgres://localhost/test".to_string(),
            max_connections: 1,
        }),
        options: MigrationOptions {
            show_progress: false,
            ..options
        },
    }
}
