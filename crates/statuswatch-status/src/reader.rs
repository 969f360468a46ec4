//! Custom status reader
//!
//! Classifies a resource's live document against operator-authored health
//! rules. Rules are evaluated in a fixed priority order — `Failed`, then
//! `Current`, then `InProgress` — so a document matching several rules always
//! classifies the same way regardless of how the rules were declared. When no
//! rule matches, the resource is reported as still reconciling; absence of
//! positive evidence never yields `Current` or `Failed`.

use statuswatch_cel::{Evaluator, cached_program};

use crate::error::{Result, StatusError};
use crate::rules::{CustomHealthCheck, GroupKind, HealthRules};
use crate::status::StatusResult;

/// Reads the lifecycle status of one resource shape.
///
/// Implementations are stateless and safe to share across polling threads.
pub trait StatusReader: Send + Sync {
    /// Whether this reader handles resources of the given group/kind
    fn supports(&self, gk: &GroupKind) -> bool;

    /// Derives the status of the given live document
    fn read_status(&self, object: &serde_json::Value) -> Result<StatusResult>;
}

/// The document is bound to this variable inside rule expressions
const SELF_VAR: &str = "self";

/// A [`StatusReader`] driven by operator-authored CEL rules
#[derive(Debug, Clone)]
pub struct CustomStatusReader {
    group_kind: GroupKind,
    rules: HealthRules,
}

impl CustomStatusReader {
    pub fn new(group_kind: GroupKind, rules: HealthRules) -> CustomStatusReader {
        CustomStatusReader { group_kind, rules }
    }

    /// Builds a reader from a `customHealthChecks` configuration entry
    pub fn from_check(check: &CustomHealthCheck) -> CustomStatusReader {
        CustomStatusReader {
            group_kind: GroupKind::from_api_version(&check.api_version, check.kind.clone()),
            rules: HealthRules::from(check),
        }
    }

    pub fn group_kind(&self) -> &GroupKind {
        &self.group_kind
    }

    fn evaluate_rule(&self, expression: &str, object: &serde_json::Value) -> Result<bool> {
        let program = cached_program(expression, &[SELF_VAR])?;
        let response = Evaluator::metered().evaluate(&program, &[(SELF_VAR, object)])?;
        tracing::trace!(
            kind = %self.group_kind.kind,
            expression,
            result = response.result,
            cost = response.cost,
            "evaluated health rule"
        );
        Ok(response.result)
    }
}

impl StatusReader for CustomStatusReader {
    fn supports(&self, gk: &GroupKind) -> bool {
        *gk == self.group_kind
    }

    fn read_status(&self, object: &serde_json::Value) -> Result<StatusResult> {
        if !object.is_object() {
            return Err(StatusError::InvalidObject(json_type_name(object)));
        }
        let kind = &self.group_kind.kind;

        // Priority order, not declaration order. Evaluator errors abort the
        // whole read; a partially-classified resource is worse than a failed
        // poll.
        if let Some(rule) = &self.rules.failed
            && self.evaluate_rule(rule, object)?
        {
            return Ok(StatusResult::failed(
                format!("{kind} Failed"),
                format!("{kind}Failed"),
            ));
        }

        if let Some(rule) = &self.rules.current
            && self.evaluate_rule(rule, object)?
        {
            return Ok(StatusResult::current(format!("{kind} Succeeded")));
        }

        if let Some(rule) = &self.rules.in_progress
            && self.evaluate_rule(rule, object)?
        {
            return Ok(StatusResult::in_progress(
                format!("{kind} in progress"),
                format!("{kind}InProgress"),
            ));
        }

        Ok(StatusResult::in_progress(
            format!("{kind} in progress"),
            format!("{kind}InProgress"),
        ))
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
