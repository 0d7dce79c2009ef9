//! Migration pipeline orchestration.

use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::migrator::{CollectionReport, PaginatedMigrator};
use crate::schema::{CollectionRef, DatabaseRef, RelationshipInferrer, SchemaTranslator};
use crate::source::{create_source, DocumentSource};
use crate::target::{create_target, MemoryTarget, TargetStore};
use crate::users::UserMigrator;

/// Migration statistics.
#[derive(Debug, Default, Clone)]
pub struct MigrationStats {
    /// Databases visited.
    pub databases: u64,
    /// Collections migrated.
    pub collections: u64,
    /// Records the source reported.
    pub expected: u64,
    /// Records sent to the target.
    pub attempted: u64,
    /// Rows newly written.
    pub inserted: u64,
    /// Rows left untouched because they already existed.
    pub skipped: u64,
    /// Rows overwritten.
    pub updated: u64,
    /// Short pages seen.
    pub discrepancies: u64,
    /// User accounts sent to the target.
    pub users: u64,
    /// Per-collection reports, users included, in run order.
    pub reports: Vec<CollectionReport>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationStats {
    /// Calculate throughput (records per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.attempted as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    fn absorb(&mut self, report: CollectionReport) {
        self.expected += report.expected;
        self.attempted += report.attempted;
        self.inserted += report.inserted;
        self.skipped += report.skipped;
        self.updated += report.updated;
        self.discrepancies += report.discrepancies.len() as u64;
        self.reports.push(report);
    }
}

/// Migration pipeline.
pub struct Pipeline {
    config: MigrationConfig,
    source: Box<dyn DocumentSource>,
    target: Box<dyn TargetStore>,
    migrator: PaginatedMigrator,
    users: UserMigrator,
}

impl Pipeline {
    /// Create a new migration pipeline from configuration.
    ///
    /// Dry runs write into a [`MemoryTarget`] of the configured dialect.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the target
    /// dialect is not compiled in.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let source = create_source(&config.source, config.options.retry_config());
        let target: Box<dyn TargetStore> = if config.options.dry_run {
            Box::new(MemoryTarget::dry_run(
                config.target.dialect(),
                config.options.on_conflict,
            ))
        } else {
            create_target(&config.target, config.options.on_conflict)?
        };
        Self::with_parts(config, source, target)
    }

    /// Create a pipeline over explicit source and target stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier pattern is invalid.
    pub fn with_parts(
        config: MigrationConfig,
        source: Box<dyn DocumentSource>,
        target: Box<dyn TargetStore>,
    ) -> Result<Self> {
        let options = &config.options;
        let inferrer = RelationshipInferrer::new(&options.identifier_pattern, options.sample_size)?;
        let translator =
            SchemaTranslator::new(inferrer, target.dialect(), options.max_identifier_length);
        let migrator = PaginatedMigrator::new(translator, options.page_size, options.show_progress);
        let users = UserMigrator::new(options.page_size, options.show_progress);

        Ok(Self {
            config,
            source,
            target,
            migrator,
            users,
        })
    }

    /// Target store of this pipeline.
    #[must_use]
    pub fn target(&self) -> &dyn TargetStore {
        self.target.as_ref()
    }

    /// Run the migration pipeline.
    ///
    /// A failing collection aborts the run. The target is closed either way.
    ///
    /// # Errors
    ///
    /// Returns the first failure, wrapped with the collection it aborted.
    pub async fn run(&mut self) -> Result<MigrationStats> {
        let start = std::time::Instant::now();
        let mut stats = MigrationStats::default();

        info!(
            "Starting migration of project {} into {}{}",
            self.config.source.project_id,
            self.target.dialect(),
            if self.config.options.dry_run { " (dry run)" } else { "" }
        );

        self.source.connect().await?;
        let result = self.run_connected(&mut stats).await;
        let target_closed = self.target.close().await;
        let source_closed = self.source.close().await;
        result?;
        target_closed?;
        source_closed?;

        stats.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Migration complete: {} collection(s), {} record(s) ({} inserted, {} skipped, {} updated), {} user(s) in {:.2}s ({:.0} records/sec)",
            stats.collections,
            stats.attempted,
            stats.inserted,
            stats.skipped,
            stats.updated,
            stats.users,
            stats.duration_secs,
            stats.throughput()
        );
        if stats.discrepancies > 0 {
            warn!("{} short page(s) seen during the run", stats.discrepancies);
        }

        Ok(stats)
    }

    async fn run_connected(&mut self, stats: &mut MigrationStats) -> Result<()> {
        self.target.connect().await?;
        self.target.ensure_metadata_store().await?;

        if self.config.options.migrate_users {
            let report = self
                .users
                .migrate(self.source.as_ref(), self.target.as_mut())
                .await
                .map_err(|e| e.in_collection("users"))?;
            stats.users = report.attempted;
            stats.absorb(report);
        }

        if !self.config.options.migrate_documents {
            return Ok(());
        }

        for database in self.selected_databases().await? {
            stats.databases += 1;
            info!("Migrating database {} ({})", database.name, database.id);

            for collection in self.selected_collections(&database).await? {
                let report = self
                    .migrator
                    .migrate_collection(
                        self.source.as_ref(),
                        self.target.as_mut(),
                        &database.id,
                        &collection,
                    )
                    .await
                    .map_err(|e| e.in_collection(collection.id.clone()))?;
                stats.collections += 1;
                stats.absorb(report);
            }
        }

        Ok(())
    }

    /// Databases passing the `databases` allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if the source listing fails.
    pub async fn selected_databases(&self) -> Result<Vec<DatabaseRef>> {
        let allow = &self.config.options.databases;
        let databases = self.source.list_databases().await?;
        Ok(databases
            .into_iter()
            .filter(|d| allow.is_empty() || allow.contains(&d.id))
            .collect())
    }

    /// Collections of `database` passing the `collections` allow-list (id or name).
    ///
    /// # Errors
    ///
    /// Returns an error if the source listing fails.
    pub async fn selected_collections(&self, database: &DatabaseRef) -> Result<Vec<CollectionRef>> {
        let allow = &self.config.options.collections;
        let collections = self.source.list_collections(&database.id).await?;
        Ok(collections
            .into_iter()
            .filter(|c| {
                allow.is_empty()
                    || allow.contains(&c.id)
                    || c.name.as_ref().is_some_and(|n| allow.contains(n))
            })
            .collect())
    }

    /// Connect to the source and target, then disconnect.
    ///
    /// # Errors
    ///
    /// Returns the first connection failure.
    pub async fn check_connections(&mut self) -> Result<()> {
        self.source.connect().await?;
        info!("Source {} reachable", self.source.source_type());
        self.target.connect().await?;
        info!("Target {} reachable", self.target.dialect());
        self.target.close().await?;
        self.source.close().await
    }

    /// Translate every selected collection into a [`MemoryTarget`] and
    /// render the resulting schema. The configured target is never contacted.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the source cannot be read.
    pub async fn preview_schema(config: MigrationConfig) -> Result<Vec<String>> {
        config.validate()?;
        let memory = MemoryTarget::new(config.target.dialect(), config.options.on_conflict);
        let source = create_source(&config.source, config.options.retry_config());
        let mut pipeline = Self::with_parts(config, source, Box::new(memory.clone()))?;
        pipeline.translate_all().await?;
        Ok(memory.render_schema())
    }

    async fn translate_all(&mut self) -> Result<()> {
        self.source.connect().await?;
        self.target.connect().await?;
        self.target.ensure_metadata_store().await?;

        for database in self.selected_databases().await? {
            for collection in self.selected_collections(&database).await? {
                self.migrator
                    .translator()
                    .translate(
                        self.source.as_ref(),
                        self.target.as_mut(),
                        &database.id,
                        &collection,
                    )
                    .await
                    .map_err(|e| e.in_collection(collection.id.clone()))?;
            }
        }

        self.target.close().await?;
        self.source.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_stats_throughput() {
        let stats = MigrationStats {
            attempted: 1000,
            inserted: 1000,
            duration_secs: 2.0,
            ..MigrationStats::default()
        };

        assert!((stats.throughput() - 500.0).abs() < 0.001);
    }

    #[test]
    fn test_migration_stats_zero_duration() {
        let stats = MigrationStats::default();
        assert_eq!(stats.throughput(), 0.0);
    }

    #[test]
    fn test_absorb_accumulates() {
        let mut stats = MigrationStats::default();
        let mut report = CollectionReport::new("c1", "Posts", "posts");
        report.expected = 3;
        report.attempted = 2;
        report.inserted = 2;
        report.discrepancies.push(crate::migrator::PageDiscrepancy {
            offset: 0,
            expected: 3,
            received: 2,
        });
        stats.absorb(report);

        assert_eq!(stats.expected, 3);
        assert_eq!(stats.attempted, 2);
        assert_eq!(stats.discrepancies, 1);
        assert_eq!(stats.reports.len(), 1);
    }
}
