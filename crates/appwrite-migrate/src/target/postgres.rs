//! PostgreSQL target.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use tracing::{debug, info};

use super::sql::{build_row, SqlDialect, SqlValue};
use super::{ConflictPolicy, Dialect, TargetStore, UpsertOutcome};
use crate::config::SqlTargetConfig;
use crate::error::{Error, Result};
use crate::schema::{CollectionMapping, TargetFieldSpec};
use crate::transform::TargetRecord;

const SQL: SqlDialect = SqlDialect::Postgres;

/// PostgreSQL target store.
pub struct PostgresTarget {
    config: SqlTargetConfig,
    policy: ConflictPolicy,
    pool: Option<PgPool>,
    tables: HashMap<String, Vec<TargetFieldSpec>>,
}

impl PostgresTarget {
    /// Creates an unconnected store.
    #[must_use]
    pub fn new(config: SqlTargetConfig, policy: ConflictPolicy) -> Self {
        Self {
            config,
            policy,
            pool: None,
            tables: HashMap::new(),
        }
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::TargetConnection("PostgreSQL target not connected".to_string()))
    }
}

fn bind_value(
    query: Query<'_, Postgres, PgArguments>,
    value: SqlValue,
) -> Query<'_, Postgres, PgArguments> {
    match value {
        SqlValue::Text(v) => query.bind(v),
        SqlValue::BigInt(v) => query.bind(v),
        SqlValue::Double(v) => query.bind(v),
        SqlValue::Boolean(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v.map(|t| t.naive_utc())),
    }
}

#[async_trait]
impl TargetStore for PostgresTarget {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&mut self) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect(&self.config.connection_string)
            .await
            .map_err(|e| Error::TargetConnection(format!("PostgreSQL connect failed: {}", e)))?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("Connected to PostgreSQL target");
        self.pool = Some(pool);
        Ok(())
    }

    async fn ensure_metadata_store(&mut self) -> Result<()> {
        sqlx::query(&SQL.metadata_table_sql())
            .execute(self.pool()?)
            .await
            .map_err(|e| Error::Schema(format!("Failed to create metadata table: {}", e)))?;
        Ok(())
    }

    async fn create_schema(&mut self, target_name: &str, fields: &[TargetFieldSpec]) -> Result<()> {
        let ddl = SQL.create_table_sql(target_name, fields);
        debug!("{}", ddl);
        sqlx::query(&ddl)
            .execute(self.pool()?)
            .await
            .map_err(|e| Error::Schema(format!("Failed to create {}: {}", target_name, e)))?;
        self.tables.insert(target_name.to_string(), fields.to_vec());
        Ok(())
    }

    async fn upsert(&self, target_name: &str, record: &TargetRecord) -> Result<UpsertOutcome> {
        let fields = self.tables.get(target_name).ok_or_else(|| {
            Error::Loading(format!("No schema created for '{}'", target_name))
        })?;
        let row = build_row(target_name, fields, record)?;
        let sql = SQL.upsert_sql(target_name, &row.columns, self.policy);

        let returned = row
            .values
            .into_iter()
            .fold(sqlx::query(&sql), bind_value)
            .fetch_optional(self.pool()?)
            .await
            .map_err(|e| Error::Loading(format!("Upsert into {} failed: {}", target_name, e)))?;

        let Some(returned) = returned else {
            return Ok(UpsertOutcome::Skipped);
        };
        if returned.try_get::<bool, _>("inserted")? {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    async fn record_mapping(&self, mapping: &CollectionMapping) -> Result<()> {
        sqlx::query(&SQL.insert_mapping_sql())
            .bind(&mapping.source_collection_id)
            .bind(&mapping.target_name)
            .bind(&mapping.display_name)
            .bind(&mapping.source_database_id)
            .execute(self.pool()?)
            .await
            .map_err(|e| Error::Loading(format!("Failed to record mapping: {}", e)))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }
}
