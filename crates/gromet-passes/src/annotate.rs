//! CAST annotation: build the AnnCast tree the rest of the pipeline mutates.
//!
//! Structure is preserved node-for-node. What this pass adds is the zeroed
//! bookkeeping the later passes fill in (collapsed ids, scope chains,
//! versions, used-variable maps) and shape validation: literal payloads must
//! agree with their `value_type`, attribute members and variable bindings
//! must be names, and call targets must be names or attribute accesses.
//! Anything else is an unsupported construct and aborts the run.

use std::collections::BTreeMap;

use gromet_anncast::{
    AnnCast, AnnCastAssignment, AnnCastAttribute, AnnCastCall, AnnCastFunctionDef,
    AnnCastLiteralValue, AnnCastLoop, AnnCastModelBreak, AnnCastModelContinue, AnnCastModelIf,
    AnnCastModelImport, AnnCastModelReturn, AnnCastModule, AnnCastName, AnnCastOperator,
    AnnCastRecordDef, AnnCastVar, AnnLiteralPayload,
};
use gromet_cast::{CastLiteralValue, CastName, CastNode, LiteralPayload};
use gromet_common::PipelineError;

/// Annotate one CAST tree rooted at a module.
pub fn run(root: CastNode) -> Result<AnnCast, PipelineError> {
    annotate(root)
}

fn annotate_all(nodes: Vec<CastNode>) -> Result<Vec<AnnCast>, PipelineError> {
    nodes.into_iter().map(annotate).collect()
}

fn annotate_boxed(node: Box<CastNode>) -> Result<Box<AnnCast>, PipelineError> {
    Ok(Box::new(annotate(*node)?))
}

fn annotate_name(name: CastName) -> AnnCastName {
    AnnCastName::new(name.name, name.id, name.source_refs)
}

fn annotate(node: CastNode) -> Result<AnnCast, PipelineError> {
    match node {
        CastNode::Module(m) => Ok(AnnCast::Module(AnnCastModule {
            name: m.name,
            body: annotate_all(m.body)?,
            con_scope: Vec::new(),
            used_vars: BTreeMap::new(),
            source_refs: m.source_refs,
        })),
        CastNode::FunctionDef(def) => Ok(AnnCast::FunctionDef(AnnCastFunctionDef {
            name: annotate_name(def.name),
            func_args: annotate_all(def.func_args)?,
            body: annotate_all(def.body)?,
            con_scope: Vec::new(),
            used_vars: BTreeMap::new(),
            source_refs: def.source_refs,
        })),
        CastNode::RecordDef(def) => Ok(AnnCast::RecordDef(AnnCastRecordDef {
            name: def.name,
            bases: annotate_all(def.bases)?,
            funcs: annotate_all(def.funcs)?,
            fields: annotate_all(def.fields)?,
            source_refs: def.source_refs,
        })),
        CastNode::Assignment(assign) => Ok(AnnCast::Assignment(AnnCastAssignment {
            left: annotate_boxed(assign.left)?,
            right: annotate_boxed(assign.right)?,
            source_refs: assign.source_refs,
        })),
        CastNode::Call(call) => {
            if !matches!(*call.func, CastNode::Name(_) | CastNode::Attribute(_)) {
                return Err(PipelineError::structural(
                    format!("call target of kind {}", call.func.kind_name()),
                    call.func.source_ref().cloned(),
                ));
            }
            Ok(AnnCast::Call(AnnCastCall {
                func: annotate_boxed(call.func)?,
                arguments: annotate_all(call.arguments)?,
                invocation_index: 0,
                has_func_def: false,
                source_refs: call.source_refs,
            }))
        }
        CastNode::Attribute(attr) => {
            if !matches!(*attr.attr, CastNode::Name(_)) {
                return Err(PipelineError::structural(
                    format!("attribute member of kind {}", attr.attr.kind_name()),
                    attr.attr.source_ref().cloned(),
                ));
            }
            Ok(AnnCast::Attribute(AnnCastAttribute {
                value: annotate_boxed(attr.value)?,
                attr: annotate_boxed(attr.attr)?,
                source_refs: attr.source_refs,
            }))
        }
        CastNode::Operator(op) => Ok(AnnCast::Operator(AnnCastOperator {
            op: op.op,
            operands: annotate_all(op.operands)?,
            source_refs: op.source_refs,
        })),
        CastNode::LiteralValue(lit) => annotate_literal(lit),
        CastNode::Var(var) => {
            if !matches!(*var.val, CastNode::Name(_)) {
                return Err(PipelineError::structural(
                    format!("variable binding of kind {}", var.val.kind_name()),
                    var.val.source_ref().cloned(),
                ));
            }
            Ok(AnnCast::Var(AnnCastVar {
                val: annotate_boxed(var.val)?,
                ty: var.ty,
                default_value: var
                    .default_value
                    .map(annotate_boxed)
                    .transpose()?,
                source_refs: var.source_refs,
            }))
        }
        CastNode::Name(name) => Ok(AnnCast::Name(annotate_name(name))),
        CastNode::Loop(l) => Ok(AnnCast::Loop(AnnCastLoop {
            pre: annotate_all(l.pre)?,
            expr: annotate_boxed(l.expr)?,
            body: annotate_all(l.body)?,
            post: annotate_all(l.post)?,
            con_scope: Vec::new(),
            used_vars: BTreeMap::new(),
            source_refs: l.source_refs,
        })),
        CastNode::ModelIf(cond) => Ok(AnnCast::ModelIf(AnnCastModelIf {
            expr: annotate_boxed(cond.expr)?,
            body: annotate_all(cond.body)?,
            orelse: annotate_all(cond.orelse)?,
            con_scope: Vec::new(),
            used_vars: BTreeMap::new(),
            source_refs: cond.source_refs,
        })),
        CastNode::ModelReturn(ret) => Ok(AnnCast::ModelReturn(AnnCastModelReturn {
            value: annotate_boxed(ret.value)?,
            source_refs: ret.source_refs,
        })),
        CastNode::ModelBreak(b) => Ok(AnnCast::ModelBreak(AnnCastModelBreak {
            source_refs: b.source_refs,
        })),
        CastNode::ModelContinue(c) => Ok(AnnCast::ModelContinue(AnnCastModelContinue {
            source_refs: c.source_refs,
        })),
        CastNode::ModelImport(imp) => Ok(AnnCast::ModelImport(AnnCastModelImport {
            name: imp.name,
            alias: imp.alias,
            symbol: imp.symbol,
            all: imp.all,
            source_refs: imp.source_refs,
        })),
    }
}

/// Literal payloads must agree with their `value_type`: tuples carry element
/// nodes, sized lists carry a size and an initial value, everything else is
/// a scalar.
fn annotate_literal(lit: CastLiteralValue) -> Result<AnnCast, PipelineError> {
    let source_ref = lit.source_refs.first().cloned();
    let value = match (lit.value_type.as_str(), lit.value) {
        (gromet_cast::VALUE_TYPE_TUPLE, LiteralPayload::Elements(elems)) => {
            AnnLiteralPayload::Elements(annotate_all(elems)?)
        }
        (gromet_cast::VALUE_TYPE_TUPLE, _) => {
            return Err(PipelineError::structural(
                "tuple literal without element list",
                source_ref,
            ));
        }
        (gromet_cast::VALUE_TYPE_LIST, LiteralPayload::Sized { size, initial_value }) => {
            AnnLiteralPayload::Sized {
                size: annotate_boxed(size)?,
                initial_value: annotate_boxed(initial_value)?,
            }
        }
        (gromet_cast::VALUE_TYPE_LIST, _) => {
            return Err(PipelineError::structural(
                "sized list literal without size and initial value",
                source_ref,
            ));
        }
        (_, LiteralPayload::Scalar(value)) => AnnLiteralPayload::Scalar(value),
        (other, _) => {
            return Err(PipelineError::structural(
                format!("literal of type {other} with structured payload"),
                source_ref,
            ));
        }
    };
    Ok(AnnCast::LiteralValue(AnnCastLiteralValue {
        value_type: lit.value_type,
        value,
        source_code_data_type: lit.source_code_data_type,
        source_refs: lit.source_refs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gromet_common::PipelineErrorKind;

    fn parse(json: &str) -> CastNode {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn annotates_assignment_with_zeroed_bookkeeping() {
        let node = parse(
            r#"{
                "node_type": "Module",
                "name": "prog",
                "body": [{
                    "node_type": "Assignment",
                    "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 4}},
                    "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 2}
                }]
            }"#,
        );
        let ann = run(node).unwrap();
        let AnnCast::Module(module) = ann else {
            panic!("expected Module");
        };
        assert!(module.con_scope.is_empty());
        assert!(module.used_vars.is_empty());
        let AnnCast::Assignment(assign) = &module.body[0] else {
            panic!("expected Assignment");
        };
        let AnnCast::Var(var) = assign.left.as_ref() else {
            panic!("expected Var");
        };
        let AnnCast::Name(name) = var.val.as_ref() else {
            panic!("expected Name");
        };
        assert_eq!(name.name, "x");
        assert_eq!(name.id, 4);
        assert_eq!(name.version, 0);
    }

    #[test]
    fn tuple_literal_keeps_elements() {
        let node = parse(
            r#"{
                "node_type": "LiteralValue",
                "value_type": "Tuple",
                "value": [
                    {"node_type": "Name", "name": "a", "id": 0},
                    {"node_type": "Name", "name": "b", "id": 1}
                ]
            }"#,
        );
        let ann = run(node).unwrap();
        assert!(ann.is_tuple_literal());
        let AnnCast::LiteralValue(lit) = ann else {
            panic!("expected LiteralValue");
        };
        let AnnLiteralPayload::Elements(elems) = lit.value else {
            panic!("expected Elements payload");
        };
        assert_eq!(elems.len(), 2);
    }

    #[test]
    fn tuple_literal_with_scalar_payload_is_rejected() {
        let node = parse(
            r#"{"node_type": "LiteralValue", "value_type": "Tuple", "value": 3}"#,
        );
        let err = run(node).unwrap_err();
        assert!(matches!(err.kind, PipelineErrorKind::Structural(_)));
    }

    #[test]
    fn sized_list_requires_sized_payload() {
        let node = parse(
            r#"{"node_type": "LiteralValue", "value_type": "List[Any]", "value": 3}"#,
        );
        assert!(run(node).is_err());
    }

    #[test]
    fn attribute_member_must_be_a_name() {
        let node = parse(
            r#"{
                "node_type": "Attribute",
                "value": {"node_type": "Name", "name": "obj", "id": 0},
                "attr": {"node_type": "LiteralValue", "value_type": "Integer", "value": 1}
            }"#,
        );
        let err = run(node).unwrap_err();
        assert!(err.to_string().contains("attribute member"));
    }

    #[test]
    fn call_target_must_be_name_or_attribute() {
        let node = parse(
            r#"{
                "node_type": "Call",
                "func": {"node_type": "LiteralValue", "value_type": "Integer", "value": 1},
                "arguments": []
            }"#,
        );
        assert!(run(node).is_err());

        let node = parse(
            r#"{
                "node_type": "Call",
                "func": {
                    "node_type": "Attribute",
                    "value": {"node_type": "Name", "name": "m", "id": 0},
                    "attr": {"node_type": "Name", "name": "f", "id": 1}
                },
                "arguments": []
            }"#,
        );
        assert!(run(node).is_ok());
    }
}
