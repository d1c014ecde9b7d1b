//! Common test utilities and fixtures
#![allow(dead_code)]

use gmail_filters::client::{ExistingFilter, GmailClient, LabelInfo};
use gmail_filters::error::Result;
use gmail_filters::models::{FilterAction, FilterCriteria, FilterSpec};
use mockall::mock;

/// Create a test LabelInfo
pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Create a filter spec matching one sender and adding the given labels
pub fn create_test_spec(from: &str, add_labels: Vec<&str>) -> FilterSpec {
    FilterSpec {
        criteria: FilterCriteria {
            from: Some(from.to_string()),
            ..Default::default()
        },
        action: FilterAction {
            add_label_ids: add_labels.into_iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        },
    }
}

/// Create a test ExistingFilter
pub fn create_test_existing_filter(id: &str, from: &str, add_label_ids: Vec<&str>) -> ExistingFilter {
    let spec = create_test_spec(from, add_label_ids);
    ExistingFilter {
        id: id.to_string(),
        criteria: spec.criteria,
        action: spec.action,
    }
}

/// Client without a proxy for talking to local test servers
pub fn local_http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn list_filters(&self) -> Result<Vec<ExistingFilter>>;
        async fn get_filter(&self, filter_id: &str) -> Result<ExistingFilter>;
        async fn delete_filter(&self, filter_id: &str) -> Result<()>;
        async fn create_filter(&self, spec: &FilterSpec) -> Result<ExistingFilter>;
    }
}
