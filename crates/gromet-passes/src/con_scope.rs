//! Container scope chains.
//!
//! Every container and every name occurrence gets a `con_scope` chain naming
//! the path of containers it sits in: the module contributes `"module"`, a
//! function or record its name, each loop `"loop<N>"` and each conditional
//! `"if<N>"`. Loop and conditional numbering restarts per enclosing
//! container, and conditional branches append `"ifbody"` / `"elsebody"`.
//! Name nodes carry the chain of the site they appear at, which is what
//! qualified call-site names are built from.

use gromet_anncast::{AnnCast, AnnLiteralPayload, PipelineState};
use gromet_common::PipelineError;

/// Run the pass over every top-level node in the state.
pub fn run(state: &mut PipelineState) -> Result<(), PipelineError> {
    for node in &mut state.nodes {
        scope_node(node, &[]);
    }
    Ok(())
}

/// Numbering for the loops and conditionals directly inside one container.
#[derive(Default)]
struct ContainerCounters {
    loops: u32,
    ifs: u32,
}

fn scope_all(nodes: &mut [AnnCast], chain: &[String], counters: &mut ContainerCounters) {
    for node in nodes {
        scope_child(node, chain, counters);
    }
}

/// Entry for a node that starts a fresh counter scope (the module, a
/// function, a record, or a top-level node outside any module).
fn scope_node(node: &mut AnnCast, chain: &[String]) {
    let mut counters = ContainerCounters::default();
    scope_child(node, chain, &mut counters);
}

fn extended(chain: &[String], segment: String) -> Vec<String> {
    let mut next = chain.to_vec();
    next.push(segment);
    next
}

fn scope_child(node: &mut AnnCast, chain: &[String], counters: &mut ContainerCounters) {
    match node {
        AnnCast::Module(module) => {
            let inner = extended(chain, "module".to_string());
            module.con_scope = inner.clone();
            let mut inner_counters = ContainerCounters::default();
            scope_all(&mut module.body, &inner, &mut inner_counters);
        }
        AnnCast::FunctionDef(def) => {
            let inner = extended(chain, def.name.name.clone());
            def.con_scope = inner.clone();
            def.name.con_scope = inner.clone();
            let mut inner_counters = ContainerCounters::default();
            scope_all(&mut def.func_args, &inner, &mut inner_counters);
            scope_all(&mut def.body, &inner, &mut inner_counters);
        }
        AnnCast::RecordDef(def) => {
            let inner = extended(chain, def.name.clone());
            let mut inner_counters = ContainerCounters::default();
            scope_all(&mut def.bases, &inner, &mut inner_counters);
            scope_all(&mut def.funcs, &inner, &mut inner_counters);
            scope_all(&mut def.fields, &inner, &mut inner_counters);
        }
        AnnCast::Loop(l) => {
            let segment = format!("loop{}", counters.loops);
            counters.loops += 1;
            let inner = extended(chain, segment);
            l.con_scope = inner.clone();
            let mut inner_counters = ContainerCounters::default();
            scope_all(&mut l.pre, &inner, &mut inner_counters);
            scope_child(&mut l.expr, &inner, &mut inner_counters);
            scope_all(&mut l.body, &inner, &mut inner_counters);
            scope_all(&mut l.post, &inner, &mut inner_counters);
        }
        AnnCast::ModelIf(cond) => {
            let segment = format!("if{}", counters.ifs);
            counters.ifs += 1;
            let inner = extended(chain, segment);
            cond.con_scope = inner.clone();
            let mut inner_counters = ContainerCounters::default();
            scope_child(&mut cond.expr, &inner, &mut inner_counters);
            let body_chain = extended(&inner, "ifbody".to_string());
            scope_all(&mut cond.body, &body_chain, &mut inner_counters);
            let else_chain = extended(&inner, "elsebody".to_string());
            scope_all(&mut cond.orelse, &else_chain, &mut inner_counters);
        }
        AnnCast::Assignment(assign) => {
            scope_child(&mut assign.right, chain, counters);
            scope_child(&mut assign.left, chain, counters);
        }
        AnnCast::Call(call) => {
            scope_child(&mut call.func, chain, counters);
            scope_all(&mut call.arguments, chain, counters);
        }
        AnnCast::Attribute(attr) => {
            scope_child(&mut attr.value, chain, counters);
            scope_child(&mut attr.attr, chain, counters);
        }
        AnnCast::Operator(op) => scope_all(&mut op.operands, chain, counters),
        AnnCast::LiteralValue(lit) => match &mut lit.value {
            AnnLiteralPayload::Sized { size, initial_value } => {
                scope_child(size, chain, counters);
                scope_child(initial_value, chain, counters);
            }
            AnnLiteralPayload::Elements(elems) => scope_all(elems, chain, counters),
            AnnLiteralPayload::Scalar(_) => {}
        },
        AnnCast::Var(var) => {
            scope_child(&mut var.val, chain, counters);
            if let Some(default) = &mut var.default_value {
                scope_child(default, chain, counters);
            }
        }
        AnnCast::Name(name) => name.con_scope = chain.to_vec(),
        AnnCast::ModelReturn(ret) => scope_child(&mut ret.value, chain, counters),
        AnnCast::ModelBreak(_) | AnnCast::ModelContinue(_) | AnnCast::ModelImport(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{annotate, id_collapse};
    use gromet_cast::CastNode;

    fn scoped_module(json: &str) -> gromet_anncast::AnnCastModule {
        let cast: CastNode = serde_json::from_str(json).unwrap();
        let ann = annotate::run(cast).unwrap();
        let mut state = PipelineState::new(vec![ann]);
        id_collapse::run(&mut state).unwrap();
        run(&mut state).unwrap();
        let AnnCast::Module(module) = state.nodes.remove(state.module_index.unwrap()) else {
            panic!("expected Module");
        };
        module
    }

    #[test]
    fn function_and_loop_chains() {
        let module = scoped_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "FunctionDef",
                    "name": {"node_type": "Name", "name": "f", "id": 0},
                    "func_args": [],
                    "body": [
                        {
                            "node_type": "Loop",
                            "pre": [],
                            "expr": {"node_type": "Name", "name": "x", "id": 1},
                            "body": [{"node_type": "Name", "name": "y", "id": 2}],
                            "post": []
                        },
                        {
                            "node_type": "Loop",
                            "pre": [],
                            "expr": {"node_type": "Name", "name": "x", "id": 1},
                            "body": [],
                            "post": []
                        }
                    ]
                }]
            }"#,
        );
        assert_eq!(module.con_scope, vec!["module"]);
        let AnnCast::FunctionDef(def) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        assert_eq!(def.con_scope, vec!["module", "f"]);
        let AnnCast::Loop(first) = &def.body[0] else {
            panic!("expected Loop");
        };
        assert_eq!(first.con_scope, vec!["module", "f", "loop0"]);
        let AnnCast::Name(inner) = &first.body[0] else {
            panic!("expected Name");
        };
        assert_eq!(inner.con_scope, vec!["module", "f", "loop0"]);
        // Sibling loops number from the same enclosing counter.
        let AnnCast::Loop(second) = &def.body[1] else {
            panic!("expected Loop");
        };
        assert_eq!(second.con_scope, vec!["module", "f", "loop1"]);
    }

    #[test]
    fn conditional_branch_suffixes() {
        let module = scoped_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "ModelIf",
                    "expr": {"node_type": "Name", "name": "c", "id": 0},
                    "body": [{"node_type": "Name", "name": "a", "id": 1}],
                    "orelse": [{"node_type": "Name", "name": "b", "id": 2}]
                }]
            }"#,
        );
        let AnnCast::ModelIf(cond) = &module.body[0] else {
            panic!("expected ModelIf");
        };
        assert_eq!(cond.con_scope, vec!["module", "if0"]);
        let AnnCast::Name(expr) = cond.expr.as_ref() else {
            panic!("expected Name");
        };
        assert_eq!(expr.con_scope, vec!["module", "if0"]);
        let AnnCast::Name(body_name) = &cond.body[0] else {
            panic!("expected Name");
        };
        assert_eq!(body_name.con_scope, vec!["module", "if0", "ifbody"]);
        let AnnCast::Name(else_name) = &cond.orelse[0] else {
            panic!("expected Name");
        };
        assert_eq!(else_name.con_scope, vec!["module", "if0", "elsebody"]);
    }

    #[test]
    fn nested_containers_restart_numbering() {
        let module = scoped_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "Loop",
                    "pre": [],
                    "expr": {"node_type": "Name", "name": "c", "id": 0},
                    "body": [{
                        "node_type": "Loop",
                        "pre": [],
                        "expr": {"node_type": "Name", "name": "d", "id": 1},
                        "body": [],
                        "post": []
                    }],
                    "post": []
                }]
            }"#,
        );
        let AnnCast::Loop(outer) = &module.body[0] else {
            panic!("expected Loop");
        };
        assert_eq!(outer.con_scope, vec!["module", "loop0"]);
        let AnnCast::Loop(inner) = &outer.body[0] else {
            panic!("expected Loop");
        };
        // The inner loop is the first loop of its own enclosing container.
        assert_eq!(inner.con_scope, vec!["module", "loop0", "loop0"]);
    }

    #[test]
    fn call_site_names_carry_the_site_chain() {
        let module = scoped_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "FunctionDef",
                    "name": {"node_type": "Name", "name": "g", "id": 0},
                    "func_args": [],
                    "body": [{
                        "node_type": "Call",
                        "func": {"node_type": "Name", "name": "f", "id": 1},
                        "arguments": []
                    }]
                }]
            }"#,
        );
        let AnnCast::FunctionDef(def) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        let AnnCast::Call(call) = &def.body[0] else {
            panic!("expected Call");
        };
        let AnnCast::Name(func) = call.func.as_ref() else {
            panic!("expected Name");
        };
        assert_eq!(func.con_scope, vec!["module", "g"]);
    }
}
