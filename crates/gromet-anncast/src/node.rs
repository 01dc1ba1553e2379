//! AnnCast node definitions.
//!
//! Mirrors the CAST node set one-for-one. Bookkeeping fields start at their
//! zero values and are filled by the passes: the identifier-normalization
//! pass rewrites `id` fields and call bookkeeping, the container-scope pass
//! fills `con_scope`, the versioning pass fills `version` and `used_vars`.

use std::collections::BTreeMap;

use gromet_common::SourceRef;

/// Any AnnCast node. Closed sum type; every pass matches exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnCast {
    Module(AnnCastModule),
    FunctionDef(AnnCastFunctionDef),
    RecordDef(AnnCastRecordDef),
    Assignment(AnnCastAssignment),
    Call(AnnCastCall),
    Attribute(AnnCastAttribute),
    Operator(AnnCastOperator),
    LiteralValue(AnnCastLiteralValue),
    Var(AnnCastVar),
    Name(AnnCastName),
    Loop(AnnCastLoop),
    ModelIf(AnnCastModelIf),
    ModelReturn(AnnCastModelReturn),
    ModelBreak(AnnCastModelBreak),
    ModelContinue(AnnCastModelContinue),
    ModelImport(AnnCastModelImport),
}

impl AnnCast {
    /// The node's kind name, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AnnCast::Module(_) => "Module",
            AnnCast::FunctionDef(_) => "FunctionDef",
            AnnCast::RecordDef(_) => "RecordDef",
            AnnCast::Assignment(_) => "Assignment",
            AnnCast::Call(_) => "Call",
            AnnCast::Attribute(_) => "Attribute",
            AnnCast::Operator(_) => "Operator",
            AnnCast::LiteralValue(_) => "LiteralValue",
            AnnCast::Var(_) => "Var",
            AnnCast::Name(_) => "Name",
            AnnCast::Loop(_) => "Loop",
            AnnCast::ModelIf(_) => "ModelIf",
            AnnCast::ModelReturn(_) => "ModelReturn",
            AnnCast::ModelBreak(_) => "ModelBreak",
            AnnCast::ModelContinue(_) => "ModelContinue",
            AnnCast::ModelImport(_) => "ModelImport",
        }
    }

    /// The first source reference on the node, if any.
    pub fn source_ref(&self) -> Option<&SourceRef> {
        let refs = match self {
            AnnCast::Module(n) => &n.source_refs,
            AnnCast::FunctionDef(n) => &n.source_refs,
            AnnCast::RecordDef(n) => &n.source_refs,
            AnnCast::Assignment(n) => &n.source_refs,
            AnnCast::Call(n) => &n.source_refs,
            AnnCast::Attribute(n) => &n.source_refs,
            AnnCast::Operator(n) => &n.source_refs,
            AnnCast::LiteralValue(n) => &n.source_refs,
            AnnCast::Var(n) => &n.source_refs,
            AnnCast::Name(n) => &n.source_refs,
            AnnCast::Loop(n) => &n.source_refs,
            AnnCast::ModelIf(n) => &n.source_refs,
            AnnCast::ModelReturn(n) => &n.source_refs,
            AnnCast::ModelBreak(n) => &n.source_refs,
            AnnCast::ModelContinue(n) => &n.source_refs,
            AnnCast::ModelImport(n) => &n.source_refs,
        };
        refs.first()
    }

    /// True for a tuple literal, the shape pack/unpack lowering dispatches on.
    pub fn is_tuple_literal(&self) -> bool {
        matches!(
            self,
            AnnCast::LiteralValue(lit) if lit.value_type == "Tuple"
        )
    }
}

// ── Containers ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastModule {
    pub name: Option<String>,
    pub body: Vec<AnnCast>,
    pub con_scope: Vec<String>,
    /// Collapsed id → name, for every variable referenced in the subtree.
    pub used_vars: BTreeMap<u32, String>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastFunctionDef {
    pub name: AnnCastName,
    pub func_args: Vec<AnnCast>,
    pub body: Vec<AnnCast>,
    pub con_scope: Vec<String>,
    pub used_vars: BTreeMap<u32, String>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastRecordDef {
    pub name: String,
    pub bases: Vec<AnnCast>,
    pub funcs: Vec<AnnCast>,
    pub fields: Vec<AnnCast>,
    pub source_refs: Vec<SourceRef>,
}

// ── Statements ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastAssignment {
    pub left: Box<AnnCast>,
    pub right: Box<AnnCast>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastLoop {
    pub pre: Vec<AnnCast>,
    pub expr: Box<AnnCast>,
    pub body: Vec<AnnCast>,
    pub post: Vec<AnnCast>,
    pub con_scope: Vec<String>,
    pub used_vars: BTreeMap<u32, String>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastModelIf {
    pub expr: Box<AnnCast>,
    pub body: Vec<AnnCast>,
    pub orelse: Vec<AnnCast>,
    pub con_scope: Vec<String>,
    pub used_vars: BTreeMap<u32, String>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastModelReturn {
    pub value: Box<AnnCast>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastModelBreak {
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastModelContinue {
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastModelImport {
    pub name: String,
    pub alias: Option<String>,
    pub symbol: Option<String>,
    pub all: bool,
    pub source_refs: Vec<SourceRef>,
}

// ── Expressions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastCall {
    pub func: Box<AnnCast>,
    pub arguments: Vec<AnnCast>,
    /// 0-based occurrence number among calls to the same function,
    /// assigned by the identifier-normalization pass.
    pub invocation_index: u32,
    /// Whether a definition for the called name exists anywhere in the unit,
    /// resolved after the full traversal.
    pub has_func_def: bool,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastAttribute {
    pub value: Box<AnnCast>,
    pub attr: Box<AnnCast>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastOperator {
    pub op: String,
    pub operands: Vec<AnnCast>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastLiteralValue {
    pub value_type: String,
    pub value: AnnLiteralPayload,
    pub source_code_data_type: Option<Vec<String>>,
    pub source_refs: Vec<SourceRef>,
}

/// Payload of an [`AnnCastLiteralValue`], shaped by its `value_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnLiteralPayload {
    Scalar(serde_json::Value),
    Elements(Vec<AnnCast>),
    Sized {
        size: Box<AnnCast>,
        initial_value: Box<AnnCast>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastVar {
    pub val: Box<AnnCast>,
    pub ty: Option<String>,
    pub default_value: Option<Box<AnnCast>>,
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnCastName {
    pub name: String,
    /// Collapsed identifier once the normalization pass has run; before
    /// that, the front-end's raw id.
    pub id: u32,
    pub con_scope: Vec<String>,
    /// Number of writes to this variable preceding this occurrence in its
    /// scope.
    pub version: u32,
    pub source_refs: Vec<SourceRef>,
}

impl AnnCastName {
    pub fn new(name: impl Into<String>, id: u32, source_refs: Vec<SourceRef>) -> Self {
        Self {
            name: name.into(),
            id,
            con_scope: Vec::new(),
            version: 0,
            source_refs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_literal_detection() {
        let tuple = AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Tuple".to_string(),
            value: AnnLiteralPayload::Elements(vec![]),
            source_code_data_type: None,
            source_refs: vec![],
        });
        assert!(tuple.is_tuple_literal());

        let scalar = AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Integer".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::json!(1)),
            source_code_data_type: None,
            source_refs: vec![],
        });
        assert!(!scalar.is_tuple_literal());
        assert!(!AnnCast::ModelBreak(AnnCastModelBreak { source_refs: vec![] }).is_tuple_literal());
    }

    #[test]
    fn name_starts_unversioned() {
        let name = AnnCastName::new("x", 4, vec![]);
        assert_eq!(name.version, 0);
        assert!(name.con_scope.is_empty());
    }
}
