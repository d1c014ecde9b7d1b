//! Gmail API client for labels and filters

use async_trait::async_trait;
use google_gmail1::api::{Filter, FilterAction as ApiFilterAction, FilterCriteria as ApiFilterCriteria};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{GmailError, Result};
use crate::models::{FilterAction, FilterCriteria, FilterSpec};

const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";
const SETTINGS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.settings.basic";

/// Upper bound on a single API call
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// A filter as stored by Gmail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFilter {
    pub id: String,
    pub criteria: FilterCriteria,
    pub action: FilterAction,
}

/// Trait defining Gmail client operations for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// List all existing filters
    async fn list_filters(&self) -> Result<Vec<ExistingFilter>>;

    /// Fetch one filter by ID
    async fn get_filter(&self, filter_id: &str) -> Result<ExistingFilter>;

    /// Delete an existing filter by ID
    async fn delete_filter(&self, filter_id: &str) -> Result<()>;

    /// Create a new filter; label references must already be canonical IDs
    async fn create_filter(&self, spec: &FilterSpec) -> Result<ExistingFilter>;
}

/// Gmail client backed by the authenticated API hub
///
/// Built once per invocation and handed to every component that talks to
/// Gmail. Each call is attempted exactly once.
pub struct ProductionGmailClient {
    hub: GmailHub,
    user: String,
}

impl ProductionGmailClient {
    /// Create a new client acting as `user` (`me` for the authorized account)
    pub fn new(hub: GmailHub, user: impl Into<String>) -> Self {
        Self {
            hub,
            user: user.into(),
        }
    }

    /// Run an API call with a timeout to prevent indefinite hangs
    async fn with_timeout<T, Fut>(operation_name: &str, api_call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        debug!("Calling Gmail API: {}", operation_name);
        match tokio::time::timeout(API_TIMEOUT, api_call).await {
            Ok(result) => result.map_err(GmailError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, API_TIMEOUT);
                Err(GmailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    API_TIMEOUT
                )))
            }
        }
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let call = self
            .hub
            .users()
            .labels_list(&self.user)
            .add_scope(LABELS_SCOPE)
            .doit();
        let (_, response) = Self::with_timeout("labels.list", call).await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn list_filters(&self) -> Result<Vec<ExistingFilter>> {
        let call = self
            .hub
            .users()
            .settings_filters_list(&self.user)
            .add_scope(SETTINGS_SCOPE)
            .doit();
        let (_, response) = Self::with_timeout("filters.list", call).await?;

        let filters: Vec<ExistingFilter> = response
            .filter
            .unwrap_or_default()
            .into_iter()
            .filter_map(existing_from_api)
            .collect();

        debug!("Successfully parsed {} filters", filters.len());
        Ok(filters)
    }

    async fn get_filter(&self, filter_id: &str) -> Result<ExistingFilter> {
        let call = self
            .hub
            .users()
            .settings_filters_get(&self.user, filter_id)
            .add_scope(SETTINGS_SCOPE)
            .doit();
        let (_, filter) = Self::with_timeout("filters.get", call).await?;

        existing_from_api(filter)
            .ok_or_else(|| GmailError::FilterError(format!("Filter {} has no ID", filter_id)))
    }

    async fn delete_filter(&self, filter_id: &str) -> Result<()> {
        let call = self
            .hub
            .users()
            .settings_filters_delete(&self.user, filter_id)
            .add_scope(SETTINGS_SCOPE)
            .doit();
        Self::with_timeout("filters.delete", call).await?;
        Ok(())
    }

    async fn create_filter(&self, spec: &FilterSpec) -> Result<ExistingFilter> {
        let call = self
            .hub
            .users()
            .settings_filters_create(filter_to_api(spec), &self.user)
            .add_scope(SETTINGS_SCOPE)
            .doit();
        let (_, created) = Self::with_timeout("filters.create", call).await?;

        existing_from_api(created)
            .ok_or_else(|| GmailError::FilterError("Created filter has no ID".to_string()))
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

/// Convert a configured filter into the API representation
pub fn filter_to_api(spec: &FilterSpec) -> Filter {
    let criteria = &spec.criteria;
    let action = &spec.action;

    Filter {
        id: None,
        criteria: Some(ApiFilterCriteria {
            from: criteria.from.clone(),
            to: criteria.to.clone(),
            subject: criteria.subject.clone(),
            query: criteria.query.clone(),
            negated_query: criteria.negated_query.clone(),
            has_attachment: criteria.has_attachment,
            exclude_chats: criteria.exclude_chats,
            size: criteria.size,
            size_comparison: criteria.size_comparison.clone(),
        }),
        action: Some(ApiFilterAction {
            add_label_ids: non_empty(&action.add_label_ids),
            remove_label_ids: non_empty(&action.remove_label_ids),
            forward: action.forward.clone(),
        }),
    }
}

/// Convert an API filter; filters without an ID are skipped
pub fn existing_from_api(filter: Filter) -> Option<ExistingFilter> {
    let id = filter.id?;
    let criteria = filter.criteria.unwrap_or_default();
    let action = filter.action.unwrap_or_default();

    Some(ExistingFilter {
        id,
        criteria: FilterCriteria {
            from: criteria.from,
            to: criteria.to,
            subject: criteria.subject,
            query: criteria.query,
            negated_query: criteria.negated_query,
            has_attachment: criteria.has_attachment,
            exclude_chats: criteria.exclude_chats,
            size: criteria.size,
            size_comparison: criteria.size_comparison,
        },
        action: FilterAction {
            add_label_ids: action.add_label_ids.unwrap_or_default(),
            remove_label_ids: action.remove_label_ids.unwrap_or_default(),
            forward: action.forward,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_to_api_omits_empty_label_lists() {
        let spec = FilterSpec {
            criteria: FilterCriteria {
                from: Some("news@example.com".to_string()),
                ..Default::default()
            },
            action: FilterAction {
                add_label_ids: vec!["Label_1".to_string()],
                remove_label_ids: Vec::new(),
                forward: None,
            },
        };

        let filter = filter_to_api(&spec);
        assert!(filter.id.is_none());
        let criteria = filter.criteria.unwrap();
        assert_eq!(criteria.from.as_deref(), Some("news@example.com"));
        let action = filter.action.unwrap();
        assert_eq!(action.add_label_ids, Some(vec!["Label_1".to_string()]));
        assert!(action.remove_label_ids.is_none());
    }

    #[test]
    fn test_existing_from_api() {
        let filter = Filter {
            id: Some("ANe1Bmj".to_string()),
            criteria: Some(ApiFilterCriteria {
                subject: Some("invoice".to_string()),
                ..Default::default()
            }),
            action: Some(ApiFilterAction {
                remove_label_ids: Some(vec!["INBOX".to_string()]),
                ..Default::default()
            }),
        };

        let existing = existing_from_api(filter).unwrap();
        assert_eq!(existing.id, "ANe1Bmj");
        assert_eq!(existing.criteria.subject.as_deref(), Some("invoice"));
        assert!(existing.action.add_label_ids.is_empty());
        assert_eq!(existing.action.remove_label_ids, vec!["INBOX"]);
    }

    #[test]
    fn test_existing_from_api_without_id() {
        assert!(existing_from_api(Filter::default()).is_none());
    }
}
