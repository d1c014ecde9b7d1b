//! Filter listing, bulk deletion and bulk upload
use crate::client::{ExistingFilter, GmailClient};
use crate::error::Result;
use crate::label_manager::{resolve_label_references, LabelManager};
use crate::models::FilterSpec;
use tracing::{info, warn};

/// Outcome of a batch of independent API calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// (item description, error message) for every failed call
    pub failures: Vec<(String, String)>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, item: String, error: String) {
        self.attempted += 1;
        self.failures.push((item, error));
    }
}

/// Manages Gmail filters through an injected client
pub struct FilterManager<'a> {
    client: &'a dyn GmailClient,
}

impl<'a> FilterManager<'a> {
    pub fn new(client: &'a dyn GmailClient) -> Self {
        Self { client }
    }

    pub async fn list_filters(&self) -> Result<Vec<ExistingFilter>> {
        let filters = self.client.list_filters().await?;
        info!("Found {} filters", filters.len());
        Ok(filters)
    }

    pub async fn get_filter(&self, filter_id: &str) -> Result<ExistingFilter> {
        let filter = self.client.get_filter(filter_id).await?;
        info!("Filter {} Criteria {} Action {}", filter.id, filter.criteria, filter.action);
        Ok(filter)
    }

    /// Delete every filter of the account.
    ///
    /// A listing failure aborts; a failed deletion is logged and the
    /// remaining filters are still deleted.
    pub async fn delete_all_filters(&self) -> Result<BatchReport> {
        let filters = self.list_filters().await?;
        let mut report = BatchReport::default();

        for filter in &filters {
            info!("Deleting filter ID {} Criteria {}", filter.id, filter.criteria);
            match self.client.delete_filter(&filter.id).await {
                Ok(()) => report.record_success(),
                Err(e) => {
                    warn!("Failed to delete filter {}: {}", filter.id, e);
                    report.record_failure(filter.id.clone(), e.to_string());
                }
            }
        }

        info!(
            "Deleted {}/{} filters ({} failed)",
            report.succeeded,
            report.attempted,
            report.failed()
        );
        Ok(report)
    }

    /// Create all `specs`, translating label names to IDs first.
    ///
    /// A label listing failure aborts before anything is created. Each
    /// creation is independent: a failure is logged and the batch continues,
    /// with no rollback of filters already created.
    pub async fn upload_filters(&self, mut specs: Vec<FilterSpec>) -> Result<BatchReport> {
        let labels = LabelManager::new(self.client).label_map().await?;
        let mut report = BatchReport::default();

        for spec in specs.iter_mut() {
            resolve_label_references(spec, &labels);
            info!("Creating filter {} Action {}", spec.criteria, spec.action);

            match self.client.create_filter(spec).await {
                Ok(created) => {
                    info!("Created filter {}", created.id);
                    report.record_success();
                }
                Err(e) => {
                    warn!("Failed to create filter {}: {}", spec.criteria, e);
                    report.record_failure(spec.criteria.to_string(), e.to_string());
                }
            }
        }

        info!(
            "Created {}/{} filters ({} failed)",
            report.succeeded,
            report.attempted,
            report.failed()
        );
        Ok(report)
    }
}
