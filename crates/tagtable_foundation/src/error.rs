//! Error types for the Tagtable system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::entity::EntityId;

/// Result alias used throughout Tagtable.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Tagtable operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(id: EntityId) -> Self {
        Self::new(ErrorKind::EntityNotFound(id))
    }

    /// Creates a singleton violation error.
    #[must_use]
    pub fn not_singleton(count: usize) -> Self {
        Self::new(ErrorKind::NotSingleton { count })
    }

    /// Creates an unresolved reference error.
    #[must_use]
    pub fn unresolved_reference(path: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvedReference { path: path.into() })
    }

    /// Creates an invalid descriptor error.
    #[must_use]
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDescriptor(message.into()))
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Entity was never allocated by this store.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// A singleton read found zero or several matching entities.
    #[error("expected exactly one entity, found {count}")]
    NotSingleton {
        /// Number of entities actually matched.
        count: usize,
    },

    /// A reference path could not be resolved after loading.
    #[error("could not resolve reference: {path}")]
    UnresolvedReference {
        /// The reference path as written in the descriptor.
        path: String,
    },

    /// A descriptor had the wrong shape.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// A single commit kept draining re-entrantly staged transitions.
    MaxCommitRounds {
        /// The configured limit.
        limit: u32,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxCommitRounds { limit } => {
                write!(f, "max commit rounds ({limit}) exceeded")
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Entity or descriptor the error was raised for.
    pub source: Option<String>,
    /// Chain of keys leading to the failing value.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source location.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "at {source}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
