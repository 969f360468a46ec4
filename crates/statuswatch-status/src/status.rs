//! Status data model
//!
//! The three-state lifecycle a GitOps controller reports for a managed
//! resource, plus the kstatus-style conditions that explain a non-`Current`
//! state. A `StatusResult` is transient: it is re-derived from the live
//! document on every poll and never stored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The observed state matches the desired state
    Current,
    /// The resource is reconciling toward the desired state
    InProgress,
    /// The resource cannot reach the desired state without intervention
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Current => "Current",
            Status::InProgress => "InProgress",
            Status::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// Condition type, following the kstatus "abnormal-true" convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    /// The resource is still working toward the desired state
    Reconciling,
    /// The resource has stopped making progress
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A structured explanation attached to a non-Current status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// Outcome of one status read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl StatusResult {
    pub(crate) fn current(message: String) -> StatusResult {
        StatusResult {
            status: Status::Current,
            message,
            conditions: Vec::new(),
        }
    }

    pub(crate) fn failed(message: String, reason: String) -> StatusResult {
        StatusResult {
            status: Status::Failed,
            message: message.clone(),
            conditions: vec![Condition {
                condition_type: ConditionType::Stalled,
                status: ConditionStatus::True,
                reason,
                message,
            }],
        }
    }

    pub(crate) fn in_progress(message: String, reason: String) -> StatusResult {
        StatusResult {
            status: Status::InProgress,
            message: message.clone(),
            conditions: vec![Condition {
                condition_type: ConditionType::Reconciling,
                status: ConditionStatus::True,
                reason,
                message,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Current.to_string(), "Current");
        assert_eq!(Status::InProgress.to_string(), "InProgress");
        assert_eq!(Status::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_condition_serialization_uses_type_key() {
        let condition = Condition {
            condition_type: ConditionType::Stalled,
            status: ConditionStatus::True,
            reason: "JobFailed".to_string(),
            message: "Job Failed".to_string(),
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "Stalled");
        assert_eq!(json["status"], "True");
    }

    #[test]
    fn test_current_result_has_no_conditions() {
        let result = StatusResult::current("Job Succeeded".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "Current");
        assert!(json.get("conditions").is_none());
    }

    #[test]
    fn test_failed_result_carries_stalled_condition() {
        let result = StatusResult::failed("Job Failed".to_string(), "JobFailed".to_string());
        assert_eq!(result.conditions.len(), 1);
        assert_eq!(result.conditions[0].condition_type, ConditionType::Stalled);
        assert_eq!(result.conditions[0].status, ConditionStatus::True);
        assert_eq!(result.conditions[0].reason, "JobFailed");
    }
}
