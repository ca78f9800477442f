//! Error types for relfeat core

use std::fmt;

use thiserror::Error;

/// Boxed cause carried by query and reconstruction errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum RelfeatError {
    /// Malformed mapping, detected while loading a feature type.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A follow-up SELECT could not be prepared or executed.
    #[error("Query error: {message} (sql: {sql})")]
    QueryError {
        message: String,
        sql: String,
        #[source]
        source: BoxError,
    },

    /// Decoding or assembling a particle failed; the whole feature is lost.
    #[error("Reconstruction error: {message}")]
    ReconstructionError {
        message: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, RelfeatError>;

impl RelfeatError {
    pub fn config(msg: impl Into<String>) -> Self {
        RelfeatError::ConfigurationError(msg.into())
    }

    pub fn query(message: impl Into<String>, sql: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RelfeatError::QueryError {
            message: message.into(),
            sql: sql.into(),
            source: source.into(),
        }
    }

    pub fn reconstruction(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RelfeatError::ReconstructionError {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, RelfeatError::QueryError { .. })
    }

    pub fn is_reconstruction(&self) -> bool {
        matches!(self, RelfeatError::ReconstructionError { .. })
    }
}

/// Non-fatal conditions. They are logged and counted, never returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// Path shape or mapping kind the engine cannot reconstruct; the particle is dropped.
    UnsupportedMapping,
    /// The produced document will not validate against its schema.
    SchemaViolation,
}

impl Warning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Warning::UnsupportedMapping => "unsupported_mapping",
            Warning::SchemaViolation => "schema_violation",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log a [`Warning`] through `tracing` and bump its counter.
macro_rules! warning {
    ($kind:expr, $($arg:tt)+) => {{
        let kind: $crate::error::Warning = $kind;
        $crate::metrics::EngineMetrics::warning(kind);
        ::tracing::warn!(warning = %kind, $($arg)+);
    }};
}

pub(crate) use warning;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn query_error_keeps_cause_and_sql() {
        let err = RelfeatError::query(
            "subsequent SELECT failed",
            "SELECT 1",
            anyhow::anyhow!("connection reset"),
        );
        assert!(err.is_query());
        assert!(err.to_string().contains("SELECT 1"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("connection reset"));
    }

    #[test]
    fn warning_kinds_render_as_snake_case() {
        assert_eq!(Warning::UnsupportedMapping.to_string(), "unsupported_mapping");
        assert_eq!(Warning::SchemaViolation.to_string(), "schema_violation");
    }
}
