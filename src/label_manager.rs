//! Label lookup and name-to-ID resolution
use crate::client::{GmailClient, LabelInfo};
use crate::error::Result;
use crate::models::FilterSpec;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Label display name to canonical label ID
pub type LabelMap = HashMap<String, String>;

/// Reads the account's labels through an injected client
pub struct LabelManager<'a> {
    client: &'a dyn GmailClient,
}

impl<'a> LabelManager<'a> {
    pub fn new(client: &'a dyn GmailClient) -> Self {
        Self { client }
    }

    /// All labels of the account; a listing failure is returned to the caller
    pub async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let labels = self.client.list_labels().await?;
        info!("Found {} labels", labels.len());
        Ok(labels)
    }

    /// Fresh name→ID map from the account's current labels
    pub async fn label_map(&self) -> Result<LabelMap> {
        let labels = self.list_labels().await?;
        if labels.is_empty() {
            warn!("No labels found; label names in the configuration will be sent as-is");
        }
        Ok(build_label_map(&labels))
    }
}

pub fn build_label_map(labels: &[LabelInfo]) -> LabelMap {
    labels
        .iter()
        .map(|label| (label.name.clone(), label.id.clone()))
        .collect()
}

/// Replace label names with their IDs, in place.
///
/// References that match no known label name are left untouched; they are
/// assumed to be canonical IDs already.
pub fn resolve_label_references(spec: &mut FilterSpec, labels: &LabelMap) {
    for reference in spec
        .action
        .add_label_ids
        .iter_mut()
        .chain(spec.action.remove_label_ids.iter_mut())
    {
        if let Some(id) = labels.get(reference.as_str()) {
            debug!("Resolved label {:?} to {}", reference, id);
            *reference = id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilterAction;

    fn label_map() -> LabelMap {
        build_label_map(&[
            LabelInfo {
                id: "L1".to_string(),
                name: "Work".to_string(),
            },
            LabelInfo {
                id: "L2".to_string(),
                name: "Personal".to_string(),
            },
        ])
    }

    #[test]
    fn test_unknown_references_pass_through() {
        let mut spec = FilterSpec {
            action: FilterAction {
                add_label_ids: vec!["Work".to_string(), "L9".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        resolve_label_references(&mut spec, &label_map());
        assert_eq!(spec.action.add_label_ids, vec!["L1", "L9"]);
    }

    #[test]
    fn test_remove_labels_are_resolved_too() {
        let mut spec = FilterSpec {
            action: FilterAction {
                add_label_ids: vec!["Personal".to_string()],
                remove_label_ids: vec!["INBOX".to_string(), "Work".to_string()],
                forward: None,
            },
            ..Default::default()
        };

        resolve_label_references(&mut spec, &label_map());
        assert_eq!(spec.action.add_label_ids, vec!["L2"]);
        assert_eq!(spec.action.remove_label_ids, vec!["INBOX", "L1"]);
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let mut spec = FilterSpec {
            action: FilterAction {
                add_label_ids: vec!["work".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        resolve_label_references(&mut spec, &label_map());
        assert_eq!(spec.action.add_label_ids, vec!["work"]);
    }

    #[test]
    fn test_empty_label_map_changes_nothing() {
        let mut spec = FilterSpec {
            action: FilterAction {
                add_label_ids: vec!["Work".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let original = spec.clone();

        resolve_label_references(&mut spec, &LabelMap::new());
        assert_eq!(spec, original);
    }
}
