//! The annotated CAST tree and the state shared by every pipeline pass.
//!
//! AnnCast is structurally identical to CAST but decorated with the mutable
//! bookkeeping the passes need: collapsed integer identifiers on names,
//! structural scope paths on containers and names, reassignment version
//! counters, and per-container used-variable maps. The annotation visitor
//! creates AnnCast nodes exactly once; later passes mutate them in place and
//! never replace them.

pub mod node;
pub mod state;

pub use node::{
    AnnCast, AnnCastAssignment, AnnCastAttribute, AnnCastCall, AnnCastFunctionDef,
    AnnCastLiteralValue, AnnCastLoop, AnnCastModelBreak, AnnCastModelContinue, AnnCastModelIf,
    AnnCastModelImport, AnnCastModelReturn, AnnCastModule, AnnCastName, AnnCastOperator,
    AnnCastRecordDef, AnnCastVar, AnnLiteralPayload,
};
pub use state::{FunctionDefRecord, PipelineState};
