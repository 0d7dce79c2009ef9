//! Appwrite REST API source.
//!
//! Talks to the server API with a project id and API key. List endpoints are
//! paged with JSON `limit` / `offset` queries; every request goes through
//! [`with_retry`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::common::{create_http_client, handle_http_error, validate_url};
use super::{DocumentSource, SourceRecord};
use crate::config::AppwriteConfig;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};
use crate::schema::{AttributeDescriptor, CollectionRef, DatabaseRef, PrimitiveType};

/// Page size used when listing databases, collections and attributes.
const LIST_PAGE_SIZE: usize = 100;

/// Appwrite source connector.
pub struct AppwriteSource {
    config: AppwriteConfig,
    client: Client,
    retry: RetryConfig,
}

impl AppwriteSource {
    /// Creates a new Appwrite source with a configured HTTP client.
    #[must_use]
    pub fn new(config: AppwriteConfig, retry: RetryConfig) -> Self {
        Self {
            config,
            client: create_http_client(),
            retry,
        }
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// GET `path` with `limit`/`offset` queries, retrying transient failures.
    async fn get(&self, path: &str, limit: usize, offset: u64) -> Result<Value> {
        let url = self.build_url(path);
        let queries = [
            ("queries[]", page_query("limit", limit as u64)),
            ("queries[]", page_query("offset", offset)),
        ];

        with_retry(&self.retry, path, || {
            let request = self
                .client
                .get(&url)
                .header("X-Appwrite-Project", &self.config.project_id)
                .header("X-Appwrite-Key", &self.config.api_key)
                .header("Content-Type", "application/json")
                .query(&queries);

            async move {
                let response = request.send().await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(handle_http_error(status.as_u16(), &body, "Appwrite"));
                }

                response.json::<Value>().await.map_err(|e| {
                    Error::Extraction(format!("Failed to parse Appwrite response: {}", e))
                })
            }
        })
        .await
    }

    /// One page of a list endpoint: `(total, items)`.
    async fn list_page(
        &self,
        path: &str,
        key: &str,
        limit: usize,
        offset: u64,
    ) -> Result<(u64, Vec<Value>)> {
        let body = self.get(path, limit, offset).await?;
        let total = body.get("total").and_then(Value::as_u64).unwrap_or(0);
        let items = match body.get(key) {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                return Err(Error::Extraction(format!(
                    "Appwrite response for {} has no '{}' array",
                    path, key
                )))
            }
        };
        Ok((total, items))
    }

    /// Every item of a list endpoint.
    async fn list_all(&self, path: &str, key: &str) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        let mut offset = 0u64;
        loop {
            let (total, items) = self.list_page(path, key, LIST_PAGE_SIZE, offset).await?;
            let fetched = items.len();
            all.extend(items);
            offset += fetched as u64;
            if fetched < LIST_PAGE_SIZE || offset >= total {
                break;
            }
        }
        Ok(all)
    }
}

fn page_query(method: &str, value: u64) -> String {
    serde_json::json!({ "method": method, "values": [value] }).to_string()
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(String::from)
}

fn into_record(item: Value) -> Result<SourceRecord> {
    match item {
        Value::Object(map) => Ok(map),
        other => Err(Error::Extraction(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

/// Parses one entry of the attribute listing.
fn parse_attribute(item: &Value) -> Result<AttributeDescriptor> {
    let key = string_field(item, "key")
        .ok_or_else(|| Error::Extraction("Attribute without 'key'".to_string()))?;
    let type_name = string_field(item, "type").unwrap_or_default();
    let format = string_field(item, "format");

    Ok(AttributeDescriptor {
        key,
        primitive_type: PrimitiveType::from_source(&type_name, format.as_deref()),
        size: item.get("size").and_then(Value::as_u64),
        required: item.get("required").and_then(Value::as_bool).unwrap_or(false),
        array: item.get("array").and_then(Value::as_bool).unwrap_or(false),
    })
}

#[async_trait]
impl DocumentSource for AppwriteSource {
    fn source_type(&self) -> &'static str {
        "appwrite"
    }

    async fn connect(&mut self) -> Result<()> {
        validate_url(&self.config.endpoint)?;
        let (total, _) = self.list_page("/databases", "databases", 1, 0).await?;
        info!(
            "Connected to Appwrite project {} ({} databases)",
            self.config.project_id, total
        );
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseRef>> {
        self.list_all("/databases", "databases")
            .await?
            .iter()
            .map(|item| {
                let id = string_field(item, "$id")
                    .ok_or_else(|| Error::Extraction("Database without '$id'".to_string()))?;
                let name = string_field(item, "name").unwrap_or_else(|| id.clone());
                Ok(DatabaseRef { id, name })
            })
            .collect()
    }

    async fn list_collections(&self, database_id: &str) -> Result<Vec<CollectionRef>> {
        let path = format!("/databases/{}/collections", database_id);
        self.list_all(&path, "collections")
            .await?
            .iter()
            .map(|item| {
                let id = string_field(item, "$id")
                    .ok_or_else(|| Error::Extraction("Collection without '$id'".to_string()))?;
                Ok(CollectionRef {
                    id,
                    name: string_field(item, "name").filter(|n| !n.is_empty()),
                })
            })
            .collect()
    }

    async fn list_attributes(
        &self,
        database_id: &str,
        collection_id: &str,
    ) -> Result<Vec<AttributeDescriptor>> {
        let path = format!(
            "/databases/{}/collections/{}/attributes",
            database_id, collection_id
        );
        self.list_all(&path, "attributes")
            .await?
            .iter()
            .map(parse_attribute)
            .collect()
    }

    async fn count_documents(&self, database_id: &str, collection_id: &str) -> Result<u64> {
        let path = format!(
            "/databases/{}/collections/{}/documents",
            database_id, collection_id
        );
        let (total, _) = self.list_page(&path, "documents", 1, 0).await?;
        Ok(total)
    }

    async fn fetch_page(
        &self,
        database_id: &str,
        collection_id: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<SourceRecord>> {
        let path = format!(
            "/databases/{}/collections/{}/documents",
            database_id, collection_id
        );
        let (_, items) = self.list_page(&path, "documents", limit, offset).await?;
        debug!(
            "Fetched {} document(s) from {} at offset {}",
            items.len(),
            collection_id,
            offset
        );
        items.into_iter().map(into_record).collect()
    }

    async fn sample_records(
        &self,
        database_id: &str,
        collection_id: &str,
        n: usize,
    ) -> Result<Vec<SourceRecord>> {
        let path = format!(
            "/databases/{}/collections/{}/documents",
            database_id, collection_id
        );
        let (_, items) = self.list_page(&path, "documents", n, 0).await?;
        items.into_iter().map(into_record).collect()
    }

    async fn count_users(&self) -> Result<u64> {
        let (total, _) = self.list_page("/users", "users", 1, 0).await?;
        Ok(total)
    }

    async fn fetch_users(&self, limit: usize, offset: u64) -> Result<Vec<SourceRecord>> {
        let (_, items) = self.list_page("/users", "users", limit, offset).await?;
        items.into_iter().map(into_record).collect()
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "appwrite_tests.rs"]
mod tests;
