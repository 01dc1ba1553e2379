//! Shared types for the GroMEt pipeline.
//!
//! Every layer of the pipeline speaks in terms of these types: CAST and
//! AnnCast nodes carry [`SourceRef`]s from the front-end, lowering attaches
//! them to graph metadata, and every pass reports failures as a
//! [`PipelineError`].

pub mod error;
pub mod source_ref;

pub use error::{PipelineError, PipelineErrorKind};
pub use source_ref::SourceRef;
