use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tokens expiring within this window are treated as already expired
const EXPIRY_DELTA_SECS: i64 = 10;

/// OAuth2 token as issued by the provider's token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Whether the access token is expired (or about to be) at `now`.
    /// Tokens without an expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + Duration::seconds(EXPIRY_DELTA_SECS),
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// User identifier (usually an email address or `me`) to token
pub type TokenMap = HashMap<String, OAuthToken>;

/// Match criteria of a filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, alias = "negatedquery", skip_serializing_if = "Option::is_none")]
    pub negated_query: Option<String>,
    #[serde(default, alias = "hasattachment", skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(default, alias = "excludechats", skip_serializing_if = "Option::is_none")]
    pub exclude_chats: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, alias = "sizecomparison", skip_serializing_if = "Option::is_none")]
    pub size_comparison: Option<String>,
}

/// Action applied to messages matching a filter.
///
/// Label references may be display names or canonical label IDs; names are
/// resolved to IDs right before upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    #[serde(default, alias = "addlabelids", skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(default, alias = "removelabelids", skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,
}

/// One filter entry of the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub criteria: FilterCriteria,
    #[serde(default)]
    pub action: FilterAction,
}

impl fmt::Display for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let text_fields = [
            ("from", &self.from),
            ("to", &self.to),
            ("subject", &self.subject),
            ("query", &self.query),
            ("negatedQuery", &self.negated_query),
        ];
        for (name, value) in text_fields {
            if let Some(value) = value {
                parts.push(format!("{}:({})", name, value));
            }
        }
        if self.has_attachment == Some(true) {
            parts.push("has:attachment".to_string());
        }
        if self.exclude_chats == Some(true) {
            parts.push("-in:chats".to_string());
        }
        if let Some(size) = self.size {
            let comparison = self.size_comparison.as_deref().unwrap_or("larger");
            parts.push(format!("{}:{}", comparison, size));
        }

        if parts.is_empty() {
            write!(f, "(no criteria)")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.add_label_ids.iter().map(|id| format!("+{}", id)));
        parts.extend(self.remove_label_ids.iter().map(|id| format!("-{}", id)));
        if let Some(forward) = &self.forward {
            parts.push(format!("forward:{}", forward));
        }

        if parts.is_empty() {
            write!(f, "(no action)")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let mut token = OAuthToken {
            access_token: "ya29.abc".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expiry: None,
        };
        assert!(!token.is_expired_at(now));

        token.expiry = Some(now + Duration::minutes(30));
        assert!(!token.is_expired_at(now));

        // Inside the grace window counts as expired
        token.expiry = Some(now + Duration::seconds(5));
        assert!(token.is_expired_at(now));

        token.expiry = Some(now - Duration::minutes(1));
        assert!(token.is_expired_at(now));
    }

    #[test]
    fn test_token_json_shape() {
        let json = r#"{"access_token":"a","token_type":"Bearer","refresh_token":"r","expiry":"2024-01-01T10:00:00Z"}"#;
        let token: OAuthToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "a");
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert!(token.expiry.is_some());

        // token_type defaults to Bearer when absent
        let token: OAuthToken = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expiry.is_none());
    }

    #[test]
    fn test_filter_action_accepts_lowercase_keys() {
        let json = r#"{"addlabelids":["Work"],"removelabelids":["INBOX"]}"#;
        let action: FilterAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.add_label_ids, vec!["Work"]);
        assert_eq!(action.remove_label_ids, vec!["INBOX"]);

        let json = r#"{"addLabelIds":["Work"]}"#;
        let action: FilterAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.add_label_ids, vec!["Work"]);
        assert!(action.remove_label_ids.is_empty());
    }

    #[test]
    fn test_display() {
        let spec = FilterSpec {
            criteria: FilterCriteria {
                from: Some("boss@example.com".to_string()),
                has_attachment: Some(true),
                ..Default::default()
            },
            action: FilterAction {
                add_label_ids: vec!["L1".to_string()],
                remove_label_ids: vec!["INBOX".to_string()],
                forward: None,
            },
        };
        assert_eq!(spec.criteria.to_string(), "from:(boss@example.com) has:attachment");
        assert_eq!(spec.action.to_string(), "+L1 -INBOX");
        assert_eq!(FilterCriteria::default().to_string(), "(no criteria)");
        assert_eq!(FilterAction::default().to_string(), "(no action)");
    }
}
