//! The pass pipeline from CAST to a GroMEt function network.
//!
//! A run takes one parsed [`CastNode`] tree from a front-end, decorates it
//! into `AnnCast`, rewrites the decorated tree in place through three
//! annotation passes, and lowers the result into a [`GrometFNModule`] held
//! by the final [`PipelineState`]:
//!
//! - [`annotate`]: CAST → AnnCast decoration
//! - [`id_collapse`]: collapse sparse front-end identifiers to a dense
//!   range, registering function definitions by collapsed id
//! - [`con_scope`]: container scope chains on containers and names
//! - [`versioning`]: per-container variable versions and used-variable maps
//! - [`lower`]: the GroMEt function-network construction
//!
//! Passes run in that order over one shared [`PipelineState`], `&mut` each
//! time, and the pipeline aborts on the first error any pass returns.
//!
//! [`GrometFNModule`]: gromet_fn::GrometFNModule

pub mod annotate;
pub mod con_scope;
pub mod id_collapse;
pub mod lower;
pub mod versioning;

use gromet_anncast::PipelineState;
use gromet_cast::CastNode;
use gromet_common::PipelineError;

/// Settings shared by every pass in one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Path of the source file the CAST was extracted from. The file stem
    /// names the module; the file name is stamped into code-file metadata.
    pub file_name: String,
    /// Source language recorded in metadata on literals and imported boxes.
    pub source_language: String,
    pub source_language_version: String,
    /// Log one line per pass to stderr.
    pub verbose: bool,
}

impl PipelineOptions {
    pub fn new(file_name: impl Into<String>) -> Self {
        PipelineOptions {
            file_name: file_name.into(),
            source_language: "Python".to_string(),
            source_language_version: "3.10".to_string(),
            verbose: false,
        }
    }
}

/// Run every pass over `root`. On success the returned state carries the
/// produced module in `gromet_module`.
pub fn run_pipeline(
    root: CastNode,
    options: &PipelineOptions,
) -> Result<PipelineState, PipelineError> {
    let trace = |pass: &str| {
        if options.verbose {
            eprintln!("  {}: done", pass);
        }
    };

    let annotated = annotate::run(root)?;
    trace("annotate");

    let mut state = PipelineState::new(vec![annotated]);
    id_collapse::run(&mut state)?;
    trace("id_collapse");

    con_scope::run(&mut state)?;
    trace("con_scope");

    versioning::run(&mut state)?;
    trace("versioning");

    lower::run(&mut state, options)?;
    trace("lower");

    Ok(state)
}
