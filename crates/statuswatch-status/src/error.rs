//! Error types for status reading

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatusError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatusError {
    /// The document handed to the reader was not a JSON object
    #[error("expected a JSON object, got {0}")]
    InvalidObject(&'static str),

    /// A health rule failed to compile or evaluate. Propagated unmodified so
    /// the caller can distinguish a bad rule from a bad resource.
    #[error(transparent)]
    Expression(#[from] statuswatch_cel::CelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_error_passes_through() {
        let cel = statuswatch_cel::CelError::UnsupportedResultType { type_name: "int" };
        let wrapped = StatusError::from(cel);
        assert!(wrapped.to_string().contains("int"));
    }
}
