//! Error types for the reactive core.
//!
//! None of these errors are fatal. The record wrapper recovers from them
//! locally (reads yield `None`, writes become no-ops) and only the `try_*`
//! variants surface them to the caller.

use thiserror::Error;

/// Errors raised by record access and watcher registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The record has no field with this name.
    #[error("field `{field}` not found")]
    FieldNotFound { field: String },

    /// The field exists but cannot be written.
    #[error("field `{field}` is not writable")]
    NotWritable { field: String },

    /// The record rejected a value of the wrong shape for this field.
    #[error("field `{field}` expects a value of type {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    /// A watcher was registered with a kind other than read or write.
    #[error("unknown watch kind `{kind}`")]
    UnknownWatchKind { kind: String },
}

impl ReactiveError {
    pub fn field_not_found(field: impl Into<String>) -> Self {
        Self::FieldNotFound { field: field.into() }
    }

    pub fn not_writable(field: impl Into<String>) -> Self {
        Self::NotWritable { field: field.into() }
    }

    pub fn type_mismatch(field: impl Into<String>, expected: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
