//! Error types for name validation.

use thiserror::Error;

/// Errors that can occur when validating object names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty.
    #[error("name cannot be empty")]
    Empty,

    /// The name exceeds the maximum length for its kind.
    #[error("name too long: {actual} characters, at most {max} allowed")]
    TooLong { max: usize, actual: usize },

    /// The name contains a character outside the allowed set.
    #[error("invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    /// A label starts or ends with something other than `[a-z0-9]`.
    #[error("label '{label}' must start and end with a lowercase alphanumeric character")]
    InvalidBoundary { label: String },

    /// The generation prefix cannot produce a valid name.
    #[error("invalid prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },
}

impl NameError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, NameError::Empty)
    }

    /// Returns true if this error is a character or boundary violation.
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            NameError::InvalidCharacter { .. } | NameError::InvalidBoundary { .. }
        )
    }
}
