//! In-memory target.
//!
//! Used for dry runs, schema previews and tests. Follows the same conflict
//! rules as the real stores, and SQL dialects convert every record into a
//! typed row the way the SQL stores do. Clones share the same tables.
//!
//! Dry-run stores keep only record ids; row contents are retained by
//! [`MemoryTarget::new`] for inspection.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::sql::build_row;
use super::{ConflictPolicy, Dialect, TargetStore, UpsertOutcome, METADATA_TABLE};
use crate::error::{Error, Result};
use crate::schema::{CollectionMapping, TargetFieldSpec};
use crate::transform::TargetRecord;

/// One table held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    /// Fields passed to the first `create_schema` call.
    pub fields: Vec<TargetFieldSpec>,
    /// Ids of every stored record, in insertion order.
    pub ids: IndexSet<String>,
    /// Rows keyed by id, in insertion order. Empty unless rows are retained.
    pub rows: IndexMap<String, TargetRecord>,
}

#[derive(Debug, Default)]
struct MemoryState {
    metadata_ready: bool,
    tables: IndexMap<String, MemoryTable>,
    mappings: IndexMap<String, CollectionMapping>,
    upserts: usize,
}

/// Target store keeping everything in memory.
#[derive(Debug, Clone)]
pub struct MemoryTarget {
    dialect: Dialect,
    policy: ConflictPolicy,
    retain_rows: bool,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTarget {
    /// Creates an empty store rendering values for `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect, policy: ConflictPolicy) -> Self {
        Self {
            dialect,
            policy,
            retain_rows: true,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Creates an empty store that records ids but drops row contents.
    #[must_use]
    pub fn dry_run(dialect: Dialect, policy: ConflictPolicy) -> Self {
        Self {
            retain_rows: false,
            ..Self::new(dialect, policy)
        }
    }

    /// Table names in creation order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().tables.keys().cloned().collect()
    }

    /// A snapshot of one table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.state.lock().tables.get(name).cloned()
    }

    /// Number of rows in a table (0 if it does not exist).
    #[must_use]
    pub fn row_count(&self, name: &str) -> usize {
        self.state.lock().tables.get(name).map_or(0, |t| t.ids.len())
    }

    /// One row by id.
    #[must_use]
    pub fn row(&self, name: &str, id: &str) -> Option<TargetRecord> {
        self.state
            .lock()
            .tables
            .get(name)
            .and_then(|t| t.rows.get(id).cloned())
    }

    /// Recorded collection mappings in insertion order.
    #[must_use]
    pub fn mappings(&self) -> Vec<CollectionMapping> {
        self.state.lock().mappings.values().cloned().collect()
    }

    /// Total upsert calls received.
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.state.lock().upserts
    }

    /// Statements or descriptions that would create the held schema.
    ///
    /// SQL dialects produce `CREATE TABLE` statements; the document dialect
    /// lists each collection with its advisory fields.
    #[must_use]
    pub fn render_schema(&self) -> Vec<String> {
        let state = self.state.lock();
        match self.dialect.sql() {
            Some(sql) => {
                let mut out = Vec::with_capacity(state.tables.len() + 1);
                if state.metadata_ready {
                    out.push(sql.metadata_table_sql());
                }
                out.extend(
                    state
                        .tables
                        .iter()
                        .map(|(name, table)| sql.create_table_sql(name, &table.fields)),
                );
                out
            }
            None => {
                let mut out = Vec::with_capacity(state.tables.len() + 1);
                if state.metadata_ready {
                    out.push(format!("collection {}", METADATA_TABLE));
                }
                out.extend(state.tables.iter().map(|(name, table)| {
                    let fields: Vec<String> = table
                        .fields
                        .iter()
                        .map(|f| format!("{}: {:?}", f.name, f.target_type))
                        .collect();
                    format!("collection {} {{ {} }}", name, fields.join(", "))
                }));
                out
            }
        }
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn ensure_metadata_store(&mut self) -> Result<()> {
        self.state.lock().metadata_ready = true;
        Ok(())
    }

    async fn create_schema(&mut self, target_name: &str, fields: &[TargetFieldSpec]) -> Result<()> {
        self.state
            .lock()
            .tables
            .entry(target_name.to_string())
            .or_insert_with(|| MemoryTable {
                fields: fields.to_vec(),
                ids: IndexSet::new(),
                rows: IndexMap::new(),
            });
        Ok(())
    }

    async fn upsert(&self, target_name: &str, record: &TargetRecord) -> Result<UpsertOutcome> {
        let mut state = self.state.lock();
        state.upserts += 1;
        let table = state.tables.get_mut(target_name).ok_or_else(|| {
            Error::Loading(format!("Table '{}' does not exist", target_name))
        })?;

        let columns = match self.dialect.sql() {
            Some(_) => Some(build_row(target_name, &table.fields, record)?.columns),
            None => None,
        };

        let outcome = match (table.ids.contains(&record.id), self.policy) {
            (false, _) => UpsertOutcome::Inserted,
            (true, ConflictPolicy::Ignore) => return Ok(UpsertOutcome::Skipped),
            (true, ConflictPolicy::Update) => UpsertOutcome::Updated,
        };
        table.ids.insert(record.id.clone());

        if self.retain_rows {
            let fields = match columns {
                Some(columns) => record
                    .fields
                    .iter()
                    .filter(|(key, _)| columns.contains(*key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
                None => record.fields.clone(),
            };
            table.rows.insert(
                record.id.clone(),
                TargetRecord {
                    id: record.id.clone(),
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                    fields,
                },
            );
        }
        Ok(outcome)
    }

    async fn record_mapping(&self, mapping: &CollectionMapping) -> Result<()> {
        let mut state = self.state.lock();
        if !state.metadata_ready {
            return Err(Error::Loading(format!(
                "Table '{}' does not exist",
                METADATA_TABLE
            )));
        }
        state
            .mappings
            .entry(mapping.source_collection_id.clone())
            .or_insert_with(|| mapping.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
