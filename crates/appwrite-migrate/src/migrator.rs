//! Page-by-page migration of one collection.

use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::error::Result;
use crate::schema::{CollectionRef, SchemaTranslator};
use crate::source::{DocumentSource, SourceRecord};
use crate::target::{TargetStore, UpsertOutcome};
use crate::transform::{DocumentTransformer, TargetRecord};

/// Progress of one collection through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    /// Not started.
    Pending,
    /// Target schema and mapping exist.
    SchemaTranslated,
    /// Pages are being copied.
    Migrating,
    /// All pages drained. Counts may still disagree.
    Done,
}

/// A page that came back shorter than requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDiscrepancy {
    /// Offset the page was requested at.
    pub offset: u64,
    /// Records expected on the page.
    pub expected: usize,
    /// Records actually returned.
    pub received: usize,
}

/// Outcome of migrating one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    /// Source collection id.
    pub collection_id: String,
    /// Source display name.
    pub display_name: String,
    /// Target table / collection.
    pub target_name: String,
    /// Last state reached.
    pub state: CollectionState,
    /// Records the source reported up front.
    pub expected: u64,
    /// Records returned by the source.
    pub fetched: u64,
    /// Records transformed and sent to the target.
    pub attempted: u64,
    /// Rows newly written.
    pub inserted: u64,
    /// Rows that already existed and were left alone.
    pub skipped: u64,
    /// Rows that already existed and were overwritten.
    pub updated: u64,
    /// Short pages seen while draining.
    pub discrepancies: Vec<PageDiscrepancy>,
}

impl CollectionReport {
    /// An empty report in the `Pending` state.
    pub fn new(
        collection_id: impl Into<String>,
        display_name: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            collection_id: collection_id.into(),
            display_name: display_name.into(),
            target_name: target_name.into(),
            state: CollectionState::Pending,
            expected: 0,
            fetched: 0,
            attempted: 0,
            inserted: 0,
            skipped: 0,
            updated: 0,
            discrepancies: Vec::new(),
        }
    }

    /// Whether the attempted count differs from the reported total.
    #[must_use]
    pub fn count_mismatch(&self) -> bool {
        self.attempted != self.expected
    }

    fn record_outcome(&mut self, outcome: UpsertOutcome) {
        self.attempted += 1;
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

/// Migrates collections one page at a time.
#[derive(Debug, Clone)]
pub struct PaginatedMigrator {
    translator: SchemaTranslator,
    page_size: usize,
    show_progress: bool,
}

impl PaginatedMigrator {
    /// Creates a migrator requesting `page_size` records per page.
    #[must_use]
    pub fn new(translator: SchemaTranslator, page_size: usize, show_progress: bool) -> Self {
        Self {
            translator,
            page_size: page_size.max(1),
            show_progress,
        }
    }

    /// Schema translator in use.
    #[must_use]
    pub fn translator(&self) -> &SchemaTranslator {
        &self.translator
    }

    /// Records requested per page.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Translates a collection and copies all of its documents.
    ///
    /// Short pages and count mismatches are reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns the first source, transform or target error.
    pub async fn migrate_collection(
        &self,
        source: &dyn DocumentSource,
        target: &mut dyn TargetStore,
        database_id: &str,
        collection: &CollectionRef,
    ) -> Result<CollectionReport> {
        let translated = self
            .translator
            .translate(source, &mut *target, database_id, collection)
            .await?;
        let mut report = CollectionReport::new(
            collection.id.clone(),
            collection.display_name(),
            translated.target_name.clone(),
        );
        report.state = CollectionState::SchemaTranslated;

        report.expected = source.count_documents(database_id, &collection.id).await?;
        report.state = CollectionState::Migrating;
        if report.expected == 0 {
            info!("{} is empty, nothing to migrate", collection.display_name());
            report.state = CollectionState::Done;
            return Ok(report);
        }

        let transformer =
            DocumentTransformer::new(target.dialect().family(), translated.relationship_keys);
        let progress = create_progress_bar(report.expected, self.show_progress);
        progress.set_message(collection.display_name().to_string());

        let page_size = self.page_size;
        drain_pages(
            &*target,
            &mut report,
            page_size,
            &progress,
            |offset| source.fetch_page(database_id, &collection.id, page_size, offset),
            |record| transformer.transform(record),
        )
        .await?;

        progress.finish_and_clear();
        finish_report(&mut report);
        Ok(report)
    }
}

/// Fetches pages from offset 0 until the reported total is reached and
/// upserts every record into `report.target_name`.
///
/// The offset always advances by `page_size`, so a short page does not
/// stop the loop.
pub(crate) async fn drain_pages<'a, F, T>(
    target: &dyn TargetStore,
    report: &mut CollectionReport,
    page_size: usize,
    progress: &ProgressBar,
    mut fetch_page: F,
    transform: T,
) -> Result<()>
where
    F: FnMut(u64) -> BoxFuture<'a, Result<Vec<SourceRecord>>>,
    T: Fn(&SourceRecord) -> Result<TargetRecord>,
{
    let total = report.expected;
    let mut offset = 0u64;

    while offset < total {
        let page = fetch_page(offset).await?;
        let expected = usize::try_from((total - offset).min(page_size as u64)).unwrap_or(page_size);
        report.fetched += page.len() as u64;

        if page.len() < expected {
            warn!(
                "{}: page at offset {} returned {} of {} record(s)",
                report.collection_id,
                offset,
                page.len(),
                expected
            );
            report.discrepancies.push(PageDiscrepancy {
                offset,
                expected,
                received: page.len(),
            });
        }

        for record in &page {
            let record = transform(record)?;
            let outcome = target.upsert(&report.target_name, &record).await?;
            report.record_outcome(outcome);
            progress.inc(1);
        }

        offset += page_size as u64;
    }

    Ok(())
}

/// Marks a drained report done and logs its totals.
pub(crate) fn finish_report(report: &mut CollectionReport) {
    report.state = CollectionState::Done;
    if report.count_mismatch() {
        warn!(
            "{}: source reported {} record(s) but {} were migrated",
            report.collection_id, report.expected, report.attempted
        );
    }
    info!(
        "{} → {}: {} inserted, {} skipped, {} updated",
        report.display_name, report.target_name, report.inserted, report.skipped, report.updated
    );
}

pub(crate) fn create_progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}
