//! The GroMEt Function Network graph model.
//!
//! A GroMEt FN represents program semantics as boxes (units of computation),
//! ports (typed attachment points on boxes), and wires (directed value flow
//! between ports). One [`GrometFN`] is one function network; a
//! [`GrometFNModule`] is the ordered collection of networks produced from one
//! compilation unit, with one distinguished module network.
//!
//! Table position is identity: a port's id and a wire's endpoints are 1-based
//! positions within their tables at the moment of appending, and a box's
//! `body` is a 1-based index into the FN collection. All tables are
//! append-only; nothing is ever deleted or reordered. The serialized field
//! names (`b`, `opi`, `wff`, `fn_array`, …) are a stable contract consumed
//! byte-for-byte by downstream tools.
//!
//! # Architecture
//!
//! - [`boxes`]: box kinds and the three box record types (function, loop,
//!   conditional) plus literal payloads.
//! - [`ports`]: ports, wires, and the unresolved-endpoint encoding.
//! - [`network`]: [`GrometFN`], [`GrometFNModule`], and the append helpers
//!   that compute positional identities.
//! - [`metadata`]: the metadata side-table records referenced by index from
//!   boxes and ports.

pub mod boxes;
pub mod metadata;
pub mod network;
pub mod ports;

pub use boxes::{
    FnLiteralValue, FunctionType, GrometBoxConditional, GrometBoxFunction, GrometBoxLoop,
    ImportType,
};
pub use metadata::{CodeFileReference, Metadata, Provenance};
pub use network::{BoxTable, FnRef, GrometFN, GrometFNModule, PortTable, WireTable};
pub use ports::{GrometPort, GrometWire};

/// Schema name stamped on every emitted module.
pub const SCHEMA: &str = "FN";
/// Schema version stamped on every emitted module.
pub const SCHEMA_VERSION: &str = "0.1.6";
