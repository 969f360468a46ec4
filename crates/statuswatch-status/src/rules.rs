//! Operator-authored health rules
//!
//! Rules arrive either as a `customHealthChecks` entry on the controller's
//! configuration resource (camelCase, strongly shaped) or as a loose string
//! map from older configuration layouts. Each rule is a boolean CEL
//! expression over `self`, the resource's live document.

use serde::{Deserialize, Serialize};

/// Identifies the resource shape a reader handles. The group is the
/// `apiVersion` prefix, empty for core-group resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> GroupKind {
        GroupKind {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Derives the group from an `apiVersion` string: everything before the
    /// `/`, or the core group when there is no slash.
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> GroupKind {
        let group = match api_version.split_once('/') {
            Some((group, _version)) => group,
            None => "",
        };
        GroupKind::new(group, kind)
    }
}

/// One `customHealthChecks` entry as it appears on the configuration resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomHealthCheck {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<String>,
}

/// The rule set a reader classifies with. Any rule may be absent; a fully
/// empty set always classifies as in-progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthRules {
    pub current: Option<String>,
    pub failed: Option<String>,
    pub in_progress: Option<String>,
}

impl HealthRules {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.failed.is_none() && self.in_progress.is_none()
    }

    /// Builds rules from a loose key/value map. Recognized keys are
    /// `current`, `failed`, and `inProgress`; anything else is ignored so a
    /// newer configuration does not break an older controller.
    pub fn from_map<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> HealthRules {
        let mut rules = HealthRules::default();
        for (key, expression) in entries {
            match key {
                "current" => rules.current = Some(expression.to_string()),
                "failed" => rules.failed = Some(expression.to_string()),
                "inProgress" => rules.in_progress = Some(expression.to_string()),
                other => {
                    tracing::debug!(key = other, "ignoring unrecognized health rule key");
                }
            }
        }
        rules
    }
}

impl From<&CustomHealthCheck> for HealthRules {
    fn from(check: &CustomHealthCheck) -> HealthRules {
        HealthRules {
            current: check.current.clone(),
            failed: check.failed.clone(),
            in_progress: check.in_progress.clone(),
        }
    }
}
