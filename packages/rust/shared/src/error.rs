//! Error types for stacharvest.
//!
//! Library crates use [`HarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all stacharvest operations.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Registry source unreachable or malformed. Fatal to the run; never
    /// retried internally.
    #[error("registry error: {0}")]
    Registry(String),

    /// A service's declared type does not match any extractor, or does not
    /// match the extractor it was bound to. Configuration issue, fatal.
    #[error("unsupported service type `{found}` (expected {expected})")]
    UnsupportedServiceType { expected: String, found: String },

    /// Remote call failed during collection enumeration or record iteration.
    /// Terminates that collection's extraction; other collections unaffected.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A record failed schema validation or mapping, or a transformer was
    /// asked for a (source, target) schema pair it does not handle.
    #[error("schema input error: {message}")]
    SchemaInput { message: String },

    /// Surfaced from the ingestion boundary; terminal for that collection's
    /// ingestion attempt.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Database or collection-index layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error on a stage artifact.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a schema-input error from any displayable message.
    pub fn schema_input(msg: impl Into<String>) -> Self {
        Self::SchemaInput {
            message: msg.into(),
        }
    }

    /// Create an unsupported-service-type error from the expected/found pair.
    pub fn unsupported_service_type(
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::UnsupportedServiceType {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that are recoverable at record granularity (the record
    /// is skipped and tallied; the collection continues).
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::SchemaInput { .. })
    }
}
