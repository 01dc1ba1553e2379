use std::fmt;

use serde::Serialize;

use crate::source_ref::SourceRef;

/// A fatal pipeline error with optional location information.
///
/// Every pass visit function returns `Result<_, PipelineError>`; the driver
/// aborts the run on the first error rather than attempting partial output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
}

impl PipelineError {
    /// Create a new pipeline error.
    pub fn new(kind: PipelineErrorKind, source_ref: Option<SourceRef>) -> Self {
        Self { kind, source_ref }
    }

    /// The input tree contains a node kind or shape the pipeline does not
    /// recognize. Indicates an upstream front-end producing an unsupported
    /// construct.
    pub fn structural(what: impl Into<String>, source_ref: Option<SourceRef>) -> Self {
        Self::new(PipelineErrorKind::Structural(what.into()), source_ref)
    }

    /// An assertion about expected node shape failed. Indicates a contract
    /// breach between passes, not a user error.
    pub fn invariant(what: impl Into<String>, source_ref: Option<SourceRef>) -> Self {
        Self::new(PipelineErrorKind::Invariant(what.into()), source_ref)
    }

    /// A name lookup failed across all variable environment partitions.
    pub fn unresolved(name: impl Into<String>, source_ref: Option<SourceRef>) -> Self {
        Self::new(PipelineErrorKind::UnresolvedReference(name.into()), source_ref)
    }
}

/// The specific kind of pipeline error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineErrorKind {
    /// Unrecognized node kind or malformed node shape in the input tree.
    Structural(String),
    /// A structural invariant between passes was violated.
    Invariant(String),
    /// A variable reference resolved in no environment partition.
    UnresolvedReference(String),
}

impl fmt::Display for PipelineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural(what) => write!(f, "unsupported construct: {what}"),
            Self::Invariant(what) => write!(f, "pipeline invariant violated: {what}"),
            Self::UnresolvedReference(name) => {
                write!(f, "unresolved variable reference: {name}")
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_ref {
            Some(loc) => write!(f, "{} at {}", self.kind, loc),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for PipelineError {}
