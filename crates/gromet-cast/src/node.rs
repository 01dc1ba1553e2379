//! CAST node definitions.
//!
//! One struct per node kind, collected under the closed [`CastNode`] sum
//! type. Children are exclusively owned by their parent (`Box`/`Vec`); there
//! are no back-pointers. All structural fields are public: front-ends build
//! these directly or through serde, and the pipeline only reads them.

use gromet_common::SourceRef;
use serde::{Deserialize, Serialize};

// ── CastNode enum ────────────────────────────────────────────────────────

/// Any CAST node. The kind set is closed; downstream passes match
/// exhaustively so new kinds cannot be silently skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type")]
pub enum CastNode {
    Module(CastModule),
    FunctionDef(CastFunctionDef),
    RecordDef(CastRecordDef),
    Assignment(CastAssignment),
    Call(CastCall),
    Attribute(CastAttribute),
    Operator(CastOperator),
    LiteralValue(CastLiteralValue),
    Var(CastVar),
    Name(CastName),
    Loop(CastLoop),
    ModelIf(CastModelIf),
    ModelReturn(CastModelReturn),
    ModelBreak(CastModelBreak),
    ModelContinue(CastModelContinue),
    ModelImport(CastModelImport),
}

impl CastNode {
    /// The node's kind name, as it appears in the `node_type` tag.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CastNode::Module(_) => "Module",
            CastNode::FunctionDef(_) => "FunctionDef",
            CastNode::RecordDef(_) => "RecordDef",
            CastNode::Assignment(_) => "Assignment",
            CastNode::Call(_) => "Call",
            CastNode::Attribute(_) => "Attribute",
            CastNode::Operator(_) => "Operator",
            CastNode::LiteralValue(_) => "LiteralValue",
            CastNode::Var(_) => "Var",
            CastNode::Name(_) => "Name",
            CastNode::Loop(_) => "Loop",
            CastNode::ModelIf(_) => "ModelIf",
            CastNode::ModelReturn(_) => "ModelReturn",
            CastNode::ModelBreak(_) => "ModelBreak",
            CastNode::ModelContinue(_) => "ModelContinue",
            CastNode::ModelImport(_) => "ModelImport",
        }
    }

    /// The first source reference on the node, if any.
    pub fn source_ref(&self) -> Option<&SourceRef> {
        let refs = match self {
            CastNode::Module(n) => &n.source_refs,
            CastNode::FunctionDef(n) => &n.source_refs,
            CastNode::RecordDef(n) => &n.source_refs,
            CastNode::Assignment(n) => &n.source_refs,
            CastNode::Call(n) => &n.source_refs,
            CastNode::Attribute(n) => &n.source_refs,
            CastNode::Operator(n) => &n.source_refs,
            CastNode::LiteralValue(n) => &n.source_refs,
            CastNode::Var(n) => &n.source_refs,
            CastNode::Name(n) => &n.source_refs,
            CastNode::Loop(n) => &n.source_refs,
            CastNode::ModelIf(n) => &n.source_refs,
            CastNode::ModelReturn(n) => &n.source_refs,
            CastNode::ModelBreak(n) => &n.source_refs,
            CastNode::ModelContinue(n) => &n.source_refs,
            CastNode::ModelImport(n) => &n.source_refs,
        };
        refs.first()
    }
}

// ── Containers ───────────────────────────────────────────────────────────

/// A whole compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastModule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub body: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// A function definition. `name` is a [`CastName`] so the definition carries
/// the same identifier payload as references to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastFunctionDef {
    pub name: CastName,
    /// Formal parameters, each a `Var` node (optionally with a default).
    pub func_args: Vec<CastNode>,
    pub body: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// A record (class-like) definition: base types, methods, and fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastRecordDef {
    pub name: String,
    /// Base type references, each a `Name` node.
    #[serde(default)]
    pub bases: Vec<CastNode>,
    /// Method definitions, each a `FunctionDef` node.
    #[serde(default)]
    pub funcs: Vec<CastNode>,
    /// Field declarations, each a `Var` node.
    #[serde(default)]
    pub fields: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

// ── Statements ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastAssignment {
    pub left: Box<CastNode>,
    pub right: Box<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// A loop. `pre` holds statements run once before iteration begins (e.g.
/// iterator setup desugared by the front-end), `post` statements run once
/// after it ends. `expr` is the continuation condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastLoop {
    #[serde(default)]
    pub pre: Vec<CastNode>,
    pub expr: Box<CastNode>,
    pub body: Vec<CastNode>,
    #[serde(default)]
    pub post: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastModelIf {
    pub expr: Box<CastNode>,
    pub body: Vec<CastNode>,
    #[serde(default)]
    pub orelse: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastModelReturn {
    pub value: Box<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastModelBreak {
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastModelContinue {
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// An import of a module or of symbols from a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastModelImport {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// True for a wildcard import of every symbol in the module.
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

// ── Expressions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastCall {
    /// Call target: a `Name` or an `Attribute`.
    pub func: Box<CastNode>,
    #[serde(default)]
    pub arguments: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// Attribute access `value.attr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastAttribute {
    pub value: Box<CastNode>,
    /// The accessed member, a `Name` node.
    pub attr: Box<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// A unary or n-ary operator application. `op` is the front-end's operator
/// name (e.g. `"ast.Add"`); operands are ordered left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastOperator {
    pub op: String,
    pub operands: Vec<CastNode>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// A literal value. Scalar literals carry their value as raw JSON; tuple
/// literals carry child nodes; sized list constructions carry a size and an
/// initial element, both expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastLiteralValue {
    pub value_type: String,
    pub value: LiteralPayload,
    /// Front-end data-type provenance: `[language, language_version, type]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code_data_type: Option<Vec<String>>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// The payload of a [`CastLiteralValue`], shaped by its `value_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralPayload {
    /// `value_type == "List[Any]"`: a construction with a size expression
    /// and an initial-value expression.
    Sized {
        size: Box<CastNode>,
        initial_value: Box<CastNode>,
    },
    /// `value_type == "Tuple"`: the tuple's element expressions.
    Elements(Vec<CastNode>),
    /// Any scalar literal, kept as raw JSON.
    Scalar(serde_json::Value),
}

/// A variable occurrence that introduces or rebinds a name: assignment
/// targets, formal parameters, record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastVar {
    /// The underlying `Name` node.
    pub val: Box<CastNode>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// Default value, present on defaulted formal parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Box<CastNode>>,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

/// A read of a name. `id` is the front-end's identifier for the variable;
/// ids may be sparse, the identifier-normalization pass collapses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastName {
    pub name: String,
    pub id: u32,
    #[serde(default)]
    pub source_refs: Vec<SourceRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str, id: u32) -> CastNode {
        CastNode::Name(CastName {
            name: s.to_string(),
            id,
            source_refs: vec![],
        })
    }

    #[test]
    fn deserialize_assignment() {
        let json = r#"{
            "node_type": "Assignment",
            "left": {
                "node_type": "Var",
                "val": {"node_type": "Name", "name": "x", "id": 7}
            },
            "right": {
                "node_type": "LiteralValue",
                "value_type": "Integer",
                "value": 2
            }
        }"#;
        let node: CastNode = serde_json::from_str(json).unwrap();
        let CastNode::Assignment(assign) = node else {
            panic!("expected Assignment");
        };
        match assign.left.as_ref() {
            CastNode::Var(var) => match var.val.as_ref() {
                CastNode::Name(n) => {
                    assert_eq!(n.name, "x");
                    assert_eq!(n.id, 7);
                }
                other => panic!("expected Name, got {}", other.kind_name()),
            },
            other => panic!("expected Var, got {}", other.kind_name()),
        }
        match assign.right.as_ref() {
            CastNode::LiteralValue(lit) => {
                assert_eq!(lit.value_type, "Integer");
                assert_eq!(lit.value, LiteralPayload::Scalar(serde_json::json!(2)));
            }
            other => panic!("expected LiteralValue, got {}", other.kind_name()),
        }
    }

    #[test]
    fn deserialize_tuple_literal_payload() {
        let json = r#"{
            "node_type": "LiteralValue",
            "value_type": "Tuple",
            "value": [
                {"node_type": "Name", "name": "a", "id": 0},
                {"node_type": "Name", "name": "b", "id": 1}
            ]
        }"#;
        let node: CastNode = serde_json::from_str(json).unwrap();
        let CastNode::LiteralValue(lit) = node else {
            panic!("expected LiteralValue");
        };
        match lit.value {
            LiteralPayload::Elements(elems) => assert_eq!(elems.len(), 2),
            other => panic!("expected Elements payload, got {:?}", other),
        }
    }

    #[test]
    fn deserialize_sized_list_payload() {
        let json = r#"{
            "node_type": "LiteralValue",
            "value_type": "List[Any]",
            "value": {
                "size": {"node_type": "LiteralValue", "value_type": "Integer", "value": 3},
                "initial_value": {"node_type": "LiteralValue", "value_type": "Integer", "value": 0}
            }
        }"#;
        let node: CastNode = serde_json::from_str(json).unwrap();
        let CastNode::LiteralValue(lit) = node else {
            panic!("expected LiteralValue");
        };
        assert!(matches!(lit.value, LiteralPayload::Sized { .. }));
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let json = r#"{"node_type": "Lambda", "body": []}"#;
        let result: Result<CastNode, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn serialize_round_trips() {
        let module = CastNode::Module(CastModule {
            name: Some("prog".to_string()),
            body: vec![CastNode::Assignment(CastAssignment {
                left: Box::new(CastNode::Var(CastVar {
                    val: Box::new(name("x", 0)),
                    ty: None,
                    default_value: None,
                    source_refs: vec![],
                })),
                right: Box::new(name("y", 1)),
                source_refs: vec![],
            })],
            source_refs: vec![],
        });
        let text = serde_json::to_string(&module).unwrap();
        let back: CastNode = serde_json::from_str(&text).unwrap();
        assert_eq!(module, back);
    }

    #[test]
    fn kind_name_matches_tag() {
        let node = name("n", 0);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["node_type"], node.kind_name());
    }
}
