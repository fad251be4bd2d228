// src/errors.rs

//! Crate-wide error type.
//!
//! Every variant except `IoError`, `TomlError` and `Other` is a structural
//! error: it rejects a manifest or a graph before any task is dispatched.
//! Failures of individual tasks at run time are not errors of this type;
//! they are recorded as [`crate::engine::FailureReason`]s on the task.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagweaveError {
    #[error("Manifest error: {0}")]
    ManifestError(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("duplicate template name '{0}'")]
    DuplicateTemplateName(String),

    #[error("template '{template}' requires argument '{parameter}' (no default declared)")]
    MissingArgument { template: String, parameter: String },

    #[error("template '{template}' has no input parameter named '{parameter}'")]
    UnknownArgument { template: String, parameter: String },

    #[error("Cycle detected: {0}")]
    CyclicDependency(String),

    #[error("invalid depends expression '{expression}' at offset {position}: {message}")]
    DependencySyntax {
        expression: String,
        position: usize,
        message: String,
    },

    #[error("task '{task}' depends on unknown task '{reference}'")]
    UnknownTaskReference { task: String, reference: String },

    #[error("malformed expression '{expression}': {message}")]
    MalformedExpression { expression: String, message: String },

    #[error("unresolved reference '{reference}': {reason}")]
    UnresolvedReference { reference: String, reason: String },

    #[error("output '{output}' of template '{template}' was never produced: {reason}")]
    UnresolvedOutput {
        template: String,
        output: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagweaveError {
    /// Whether this error is a structural (build-time) error that rejects a
    /// graph before anything executes.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            DagweaveError::UnresolvedOutput { .. }
                | DagweaveError::IoError(_)
                | DagweaveError::TomlError(_)
                | DagweaveError::Other(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagweaveError>;
