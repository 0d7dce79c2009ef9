//! MongoDB target.

use std::collections::HashMap;

use ::mongodb::{Client, Collection, Database};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::{ConflictPolicy, Dialect, TargetStore, UpsertOutcome, METADATA_TABLE};
use crate::config::MongoTargetConfig;
use crate::error::{Error, Result};
use crate::schema::{
    CollectionMapping, PrimitiveType, TargetFieldSpec, TargetType, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};
use crate::transform::TargetRecord;

/// MongoDB target store.
pub struct MongoTarget {
    config: MongoTargetConfig,
    policy: ConflictPolicy,
    database: Option<Database>,
    fields: HashMap<String, HashMap<String, TargetType>>,
}

impl MongoTarget {
    /// Creates an unconnected store.
    #[must_use]
    pub fn new(config: MongoTargetConfig, policy: ConflictPolicy) -> Self {
        Self {
            config,
            policy,
            database: None,
            fields: HashMap::new(),
        }
    }

    fn database(&self) -> Result<&Database> {
        self.database
            .as_ref()
            .ok_or_else(|| Error::TargetConnection("MongoDB target not connected".to_string()))
    }

    async fn create_if_absent(&self, name: &str) -> Result<()> {
        let database = self.database()?;
        let existing = database.list_collection_names().await?;
        if existing.iter().any(|n| n == name) {
            debug!("Collection {} already exists", name);
            return Ok(());
        }
        database
            .create_collection(name)
            .await
            .map_err(|e| Error::Schema(format!("Failed to create collection {}: {}", name, e)))?;
        Ok(())
    }

    fn document_for(&self, target_name: &str, record: &TargetRecord) -> Result<Document> {
        let types = self.fields.get(target_name);
        let mut document = Document::new();
        document.insert(ID_FIELD, record.id.clone());
        document.insert(CREATED_AT_FIELD, bson_datetime(record.created_at));
        document.insert(UPDATED_AT_FIELD, bson_datetime(record.updated_at));
        for (key, value) in &record.fields {
            let target_type = types.and_then(|t| t.get(key));
            document.insert(key.clone(), to_bson_value(value, target_type)?);
        }
        Ok(document)
    }
}

fn bson_datetime(dt: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis()))
}

/// Converts a field value, turning RFC 3339 strings in datetime fields into BSON dates.
fn to_bson_value(value: &Value, target_type: Option<&TargetType>) -> Result<Bson> {
    if let (Some(TargetType::Native(PrimitiveType::Datetime)), Value::String(s)) =
        (target_type, value)
    {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(bson_datetime(dt.with_timezone(&Utc)));
        }
    }
    Ok(bson::to_bson(value)?)
}

#[async_trait]
impl TargetStore for MongoTarget {
    fn dialect(&self) -> Dialect {
        Dialect::MongoDb
    }

    async fn connect(&mut self) -> Result<()> {
        let client = Client::with_uri_str(&self.config.uri)
            .await
            .map_err(|e| Error::TargetConnection(format!("MongoDB connect failed: {}", e)))?;
        let database = client.database(&self.config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::TargetConnection(format!("MongoDB ping failed: {}", e)))?;
        info!("Connected to MongoDB database {}", self.config.database);
        self.database = Some(database);
        Ok(())
    }

    async fn ensure_metadata_store(&mut self) -> Result<()> {
        self.create_if_absent(METADATA_TABLE).await
    }

    async fn create_schema(&mut self, target_name: &str, fields: &[TargetFieldSpec]) -> Result<()> {
        self.create_if_absent(target_name).await?;
        self.fields.insert(
            target_name.to_string(),
            fields
                .iter()
                .map(|f| (f.name.clone(), f.target_type.clone()))
                .collect(),
        );
        Ok(())
    }

    async fn upsert(&self, target_name: &str, record: &TargetRecord) -> Result<UpsertOutcome> {
        let collection: Collection<Document> = self.database()?.collection(target_name);
        let document = self.document_for(target_name, record)?;
        let update = match self.policy {
            ConflictPolicy::Ignore => doc! { "$setOnInsert": document },
            ConflictPolicy::Update => doc! { "$set": document },
        };

        let result = collection
            .update_one(doc! { "_id": record.id.as_str() }, update)
            .upsert(true)
            .await
            .map_err(|e| Error::Loading(format!("Upsert into {} failed: {}", target_name, e)))?;

        Ok(match (result.upserted_id, self.policy) {
            (Some(_), _) => UpsertOutcome::Inserted,
            (None, ConflictPolicy::Update) => UpsertOutcome::Updated,
            (None, ConflictPolicy::Ignore) => UpsertOutcome::Skipped,
        })
    }

    async fn record_mapping(&self, mapping: &CollectionMapping) -> Result<()> {
        let collection: Collection<Document> = self.database()?.collection(METADATA_TABLE);
        collection
            .update_one(
                doc! { "_id": mapping.source_collection_id.as_str() },
                doc! {
                    "$setOnInsert": {
                        "table_name": mapping.target_name.as_str(),
                        "display_name": mapping.display_name.as_str(),
                        "database_id": mapping.source_database_id.as_str(),
                        "created_at": bson_datetime(Utc::now()),
                    }
                },
            )
            .upsert(true)
            .await
            .map_err(|e| Error::Loading(format!("Failed to record mapping: {}", e)))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.database = None;
        Ok(())
    }
}
