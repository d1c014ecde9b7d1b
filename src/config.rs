use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GmailError, Result};
use crate::models::FilterSpec;

/// Contents of the filter configuration file
///
/// ```yaml
/// filters:
///   - criteria:
///       from: alerts@example.com
///     action:
///       addLabelIds: [Alerts]
///       removeLabelIds: [INBOX]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FiltersConfig {
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

impl FiltersConfig {
    /// Load the configuration; `.toml` files are parsed as TOML, anything else as YAML
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GmailError::ConfigError(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = if is_toml(path) {
            Self::from_toml(&content)?
        } else {
            Self::from_yaml(&content)?
        };

        tracing::info!(
            "Loaded {} filter(s) from {:?}",
            config.filters.len(),
            path
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty YAML document has no mapping at all
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}
