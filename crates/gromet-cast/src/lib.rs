//! The CAST tree model.
//!
//! CAST ("common abstract syntax tree") is the language-neutral program
//! representation produced by source front-ends and consumed by this
//! pipeline. The node-kind set is fixed: front-ends for any source language
//! must emit exactly these kinds, each carrying source references.
//!
//! The crate owns the CAST JSON encoding: each node serializes with an
//! internal `"node_type"` tag naming its kind. An input document with an
//! unknown `node_type` fails deserialization, which is the pipeline's
//! structural-error boundary for unsupported constructs.

pub mod node;

pub use node::{
    CastAssignment, CastAttribute, CastCall, CastFunctionDef, CastLiteralValue, CastLoop,
    CastModelBreak, CastModelContinue, CastModelIf, CastModelImport, CastModelReturn, CastModule,
    CastName, CastNode, CastOperator, CastRecordDef, CastVar, LiteralPayload,
};

/// Literal `value_type` tag for tuple literals.
pub const VALUE_TYPE_TUPLE: &str = "Tuple";
/// Literal `value_type` tag for sized list constructions.
pub const VALUE_TYPE_LIST: &str = "List[Any]";
