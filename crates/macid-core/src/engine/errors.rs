//! Error types for MACID construction, installation and queries.

use thiserror::Error;

/// Errors that can occur while building a model, installing distributions,
/// imputing policies or answering queries.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// without breaking changes. Every failure aborts the triggering call; there is
/// no retry anywhere in the engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExecError {
    /// Malformed model structure (duplicate or unknown nodes, cycles,
    /// evidence that disagrees with the graph, malformed tables).
    #[error("structural error: {0}")]
    Structure(String),

    /// A decision node has no domain or policy where one is required.
    #[error("configuration error: no domain specified for decision '{decision}'")]
    MissingDomain { decision: String },

    /// A query is strategically dependent on a decision that only carries a
    /// domain placeholder.
    #[error("query {query} depends on decision '{decision}', but no policy is imputed for it")]
    UnpoliciedDecision { decision: String, query: String },

    /// A query depends on a node whose distribution is missing or still pending.
    #[error("query depends on node '{node}', which has no resolved distribution")]
    Unresolved { node: String },

    /// Numerical failure (NaN expected values, degenerate normalization).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Invalid arguments or configuration.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Runtime execution error (e.g. an inference resource limit).
    #[error("execution error: {0}")]
    Execution(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecError {
    pub(crate) fn structure(msg: impl Into<String>) -> Self {
        ExecError::Structure(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ExecError::ValidationError(msg.into())
    }
}
