//! Error types for expression compilation and evaluation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CelError>;

/// Errors surfaced to callers of the expression engine.
///
/// `Compilation` covers everything detectable from the expression text alone;
/// the remaining variants arise only while evaluating against an input
/// document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CelError {
    #[error("failed to compile expression '{expression}': {detail}")]
    Compilation { expression: String, detail: String },

    #[error("expression cost limit exceeded: consumed {cost} of {limit} allowed units")]
    CostLimitExceeded { cost: u64, limit: u64 },

    #[error("expression produced unsupported result type '{type_name}'")]
    UnsupportedResultType { type_name: &'static str },

    #[error("failed to evaluate expression '{expression}': {detail}")]
    Runtime { expression: String, detail: String },
}

impl CelError {
    /// True when the failure happened while evaluating, not compiling
    pub fn is_runtime(&self) -> bool {
        !matches!(self, CelError::Compilation { .. })
    }
}
