//! Metadata side-table records.
//!
//! Boxes and ports never embed metadata inline; they carry a 1-based index
//! into the module's `metadata_collection`, each entry of which is a list of
//! records. Entry 1 of the collection is reserved for record bookkeeping
//! (see [`crate::network::GrometFNModule::insert_record_info`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Who produced a metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub method: String,
}

impl Provenance {
    /// The provenance stamped on every record this pipeline emits.
    ///
    /// Deliberately carries no wall-clock component so that repeated runs
    /// over the same input are byte-identical.
    pub fn generate() -> Self {
        Self {
            method: "gromet_program_analysis".to_string(),
        }
    }
}

/// One source file of the analyzed collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFileReference {
    pub uid: String,
    pub name: String,
    pub path: String,
}

/// A metadata record. The `metadata_type` tag is part of the stable output
/// schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metadata_type", rename_all = "snake_case")]
pub enum Metadata {
    /// Span of source text a box or port was lowered from.
    SourceCodeReference {
        provenance: Provenance,
        code_file_reference_uid: String,
        line_begin: u32,
        line_end: u32,
        col_begin: u32,
        col_end: u32,
    },
    /// Front-end data-type provenance of a literal.
    SourceCodeDataType {
        provenance: Provenance,
        source_language: String,
        source_language_version: String,
        data_type: String,
    },
    /// The set of source files this module was produced from.
    SourceCodeCollection {
        provenance: Provenance,
        name: String,
        global_reference_id: String,
        files: Vec<CodeFileReference>,
    },
    /// Identifies the producer of the module.
    GrometCreation {
        provenance: Provenance,
        gromet_version: String,
    },
    /// Marks a conditional that encodes a short-circuit `and`.
    SourceCodeBoolAnd { provenance: Provenance },
    /// Marks a conditional that encodes a short-circuit `or`.
    SourceCodeBoolOr { provenance: Provenance },
    /// Record-type bookkeeping: fields and methods of one record definition.
    ProgramAnalysisRecordBookkeeping {
        provenance: Provenance,
        type_name: String,
        /// Field name → name of the record that declared it.
        field_declarations: BTreeMap<String, String>,
        method_declarations: Vec<String>,
    },
}

impl Metadata {
    /// The creation record stamped on every module.
    pub fn creation() -> Self {
        Metadata::GrometCreation {
            provenance: Provenance::generate(),
            gromet_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
