//! Variable versions and per-container used-variable maps.
//!
//! Runs after scoping. Each variable occurrence gets a version: the number
//! of writes to that variable completed earlier in its container scope.
//! Writes (assignment left sides, formal parameters) stamp the current count
//! and then advance it; reads adopt the current count. Counters are keyed by
//! the occurrence's own scope chain, so a function-local `x` versions
//! independently of a module-level `x`.
//!
//! The same pass fills each `Loop`/`ModelIf`/`FunctionDef` container's
//! `used_vars` with every variable its subtree references, keyed by
//! collapsed id. Names in call position, attribute members, and a function's
//! own name are not variable references. Function bodies do not leak into
//! enclosing containers' maps; loop and conditional subtrees do, since their
//! variables live in the enclosing scope.

use gromet_anncast::{AnnCast, AnnCastName, AnnLiteralPayload, PipelineState};
use gromet_common::PipelineError;
use rustc_hash::FxHashMap;

/// Run the pass over every top-level node in the state.
pub fn run(state: &mut PipelineState) -> Result<(), PipelineError> {
    let mut versions = Versions::default();
    for node in &mut state.nodes {
        versions.visit(node, Access::Read);
    }
    for node in &mut state.nodes {
        let mut escaped = Vec::new();
        collect_used(node, &mut escaped);
    }
    Ok(())
}

/// How an occurrence touches its variable.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

#[derive(Default)]
struct Versions {
    /// (scope chain, collapsed id) → number of completed writes.
    counters: FxHashMap<(String, u32), u32>,
}

impl Versions {
    fn stamp(&mut self, name: &mut AnnCastName, access: Access) {
        let key = (name.con_scope.join("."), name.id);
        let counter = self.counters.entry(key).or_insert(0);
        name.version = *counter;
        if access == Access::Write {
            *counter += 1;
        }
    }

    fn visit_all(&mut self, nodes: &mut [AnnCast], access: Access) {
        for node in nodes {
            self.visit(node, access);
        }
    }

    fn visit(&mut self, node: &mut AnnCast, access: Access) {
        match node {
            AnnCast::Module(module) => self.visit_all(&mut module.body, Access::Read),
            AnnCast::FunctionDef(def) => {
                // Formal parameters are the first writes in the function's
                // scope.
                self.visit_all(&mut def.func_args, Access::Write);
                self.visit_all(&mut def.body, Access::Read);
            }
            AnnCast::RecordDef(def) => {
                self.visit_all(&mut def.bases, Access::Read);
                self.visit_all(&mut def.funcs, Access::Read);
                self.visit_all(&mut def.fields, Access::Read);
            }
            AnnCast::Assignment(assign) => {
                self.visit(&mut assign.right, Access::Read);
                match assign.left.as_mut() {
                    AnnCast::Attribute(attr) => {
                        // A field write reads the object, not the member.
                        self.visit(&mut attr.value, Access::Read);
                    }
                    left => self.visit(left, Access::Write),
                }
            }
            AnnCast::Call(call) => {
                if let AnnCast::Attribute(attr) = call.func.as_mut() {
                    self.visit(&mut attr.value, Access::Read);
                }
                self.visit_all(&mut call.arguments, Access::Read);
            }
            AnnCast::Attribute(attr) => self.visit(&mut attr.value, Access::Read),
            AnnCast::Operator(op) => self.visit_all(&mut op.operands, Access::Read),
            AnnCast::LiteralValue(lit) => match &mut lit.value {
                AnnLiteralPayload::Sized { size, initial_value } => {
                    self.visit(size, Access::Read);
                    self.visit(initial_value, Access::Read);
                }
                AnnLiteralPayload::Elements(elems) => self.visit_all(elems, access),
                AnnLiteralPayload::Scalar(_) => {}
            },
            AnnCast::Var(var) => {
                self.visit(&mut var.val, access);
                if let Some(default) = &mut var.default_value {
                    self.visit(default, Access::Read);
                }
            }
            AnnCast::Name(name) => self.stamp(name, access),
            AnnCast::Loop(l) => {
                self.visit_all(&mut l.pre, Access::Read);
                self.visit(&mut l.expr, Access::Read);
                self.visit_all(&mut l.body, Access::Read);
                self.visit_all(&mut l.post, Access::Read);
            }
            AnnCast::ModelIf(cond) => {
                self.visit(&mut cond.expr, Access::Read);
                self.visit_all(&mut cond.body, Access::Read);
                self.visit_all(&mut cond.orelse, Access::Read);
            }
            AnnCast::ModelReturn(ret) => self.visit(&mut ret.value, Access::Read),
            AnnCast::ModelBreak(_) | AnnCast::ModelContinue(_) | AnnCast::ModelImport(_) => {}
        }
    }
}

fn collect_all(nodes: &mut [AnnCast], acc: &mut Vec<(u32, String)>) {
    for node in nodes {
        collect_used(node, acc);
    }
}

/// Collect the variables referenced in `node`'s subtree into `acc`, filling
/// container `used_vars` maps along the way.
fn collect_used(node: &mut AnnCast, acc: &mut Vec<(u32, String)>) {
    match node {
        AnnCast::Module(module) => {
            let mut inner = Vec::new();
            collect_all(&mut module.body, &mut inner);
            module.used_vars.extend(inner);
        }
        AnnCast::FunctionDef(def) => {
            let mut inner = Vec::new();
            collect_all(&mut def.func_args, &mut inner);
            collect_all(&mut def.body, &mut inner);
            def.used_vars.extend(inner);
            // Locals stay inside the function.
        }
        AnnCast::RecordDef(def) => {
            let mut inner = Vec::new();
            collect_all(&mut def.funcs, &mut inner);
            collect_all(&mut def.fields, &mut inner);
        }
        AnnCast::Assignment(assign) => {
            collect_used(&mut assign.right, acc);
            match assign.left.as_mut() {
                AnnCast::Attribute(attr) => collect_used(&mut attr.value, acc),
                left => collect_used(left, acc),
            }
        }
        AnnCast::Call(call) => {
            if let AnnCast::Attribute(attr) = call.func.as_mut() {
                collect_used(&mut attr.value, acc);
            }
            collect_all(&mut call.arguments, acc);
        }
        AnnCast::Attribute(attr) => collect_used(&mut attr.value, acc),
        AnnCast::Operator(op) => collect_all(&mut op.operands, acc),
        AnnCast::LiteralValue(lit) => match &mut lit.value {
            AnnLiteralPayload::Sized { size, initial_value } => {
                collect_used(size, acc);
                collect_used(initial_value, acc);
            }
            AnnLiteralPayload::Elements(elems) => collect_all(elems, acc),
            AnnLiteralPayload::Scalar(_) => {}
        },
        AnnCast::Var(var) => {
            collect_used(&mut var.val, acc);
            if let Some(default) = &mut var.default_value {
                collect_used(default, acc);
            }
        }
        AnnCast::Name(name) => acc.push((name.id, name.name.clone())),
        AnnCast::Loop(l) => {
            let mut inner = Vec::new();
            collect_all(&mut l.pre, &mut inner);
            collect_used(&mut l.expr, &mut inner);
            collect_all(&mut l.body, &mut inner);
            collect_all(&mut l.post, &mut inner);
            l.used_vars.extend(inner.iter().cloned());
            // Loop variables live in the enclosing scope.
            acc.extend(inner);
        }
        AnnCast::ModelIf(cond) => {
            let mut inner = Vec::new();
            collect_used(&mut cond.expr, &mut inner);
            collect_all(&mut cond.body, &mut inner);
            collect_all(&mut cond.orelse, &mut inner);
            cond.used_vars.extend(inner.iter().cloned());
            acc.extend(inner);
        }
        AnnCast::ModelReturn(ret) => collect_used(&mut ret.value, acc),
        AnnCast::ModelBreak(_) | AnnCast::ModelContinue(_) | AnnCast::ModelImport(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{annotate, con_scope, id_collapse};
    use gromet_cast::CastNode;

    fn versioned_module(json: &str) -> gromet_anncast::AnnCastModule {
        let cast: CastNode = serde_json::from_str(json).unwrap();
        let ann = annotate::run(cast).unwrap();
        let mut state = PipelineState::new(vec![ann]);
        id_collapse::run(&mut state).unwrap();
        con_scope::run(&mut state).unwrap();
        run(&mut state).unwrap();
        let AnnCast::Module(module) = state.nodes.remove(state.module_index.unwrap()) else {
            panic!("expected Module");
        };
        module
    }

    fn lhs_name(node: &AnnCast) -> &AnnCastName {
        let AnnCast::Assignment(assign) = node else {
            panic!("expected Assignment");
        };
        let AnnCast::Var(var) = assign.left.as_ref() else {
            panic!("expected Var");
        };
        let AnnCast::Name(name) = var.val.as_ref() else {
            panic!("expected Name");
        };
        name
    }

    #[test]
    fn writes_advance_reads_adopt() {
        // x = 1 ; y = x ; x = 2
        let module = versioned_module(
            r#"{
                "node_type": "Module",
                "body": [
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 0}},
                        "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 1}
                    },
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "y", "id": 1}},
                        "right": {"node_type": "Name", "name": "x", "id": 0}
                    },
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 0}},
                        "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 2}
                    }
                ]
            }"#,
        );
        assert_eq!(lhs_name(&module.body[0]).version, 0);
        let AnnCast::Assignment(second) = &module.body[1] else {
            panic!("expected Assignment");
        };
        let AnnCast::Name(read) = second.right.as_ref() else {
            panic!("expected Name");
        };
        // One write to x has completed before this read.
        assert_eq!(read.version, 1);
        assert_eq!(lhs_name(&module.body[2]).version, 1);
    }

    #[test]
    fn scopes_version_independently() {
        // x = 1 at module scope; def f(x): return x
        let module = versioned_module(
            r#"{
                "node_type": "Module",
                "body": [
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 0}},
                        "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 1}
                    },
                    {
                        "node_type": "FunctionDef",
                        "name": {"node_type": "Name", "name": "f", "id": 1},
                        "func_args": [{"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 2}}],
                        "body": [{"node_type": "ModelReturn", "value": {"node_type": "Name", "name": "x", "id": 2}}]
                    },
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 0}},
                        "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 2}
                    }
                ]
            }"#,
        );
        // The parameter write does not advance the module-level counter.
        assert_eq!(lhs_name(&module.body[2]).version, 1);
        let AnnCast::FunctionDef(def) = &module.body[1] else {
            panic!("expected FunctionDef");
        };
        let AnnCast::ModelReturn(ret) = &def.body[0] else {
            panic!("expected ModelReturn");
        };
        let AnnCast::Name(read) = ret.value.as_ref() else {
            panic!("expected Name");
        };
        assert_eq!(read.version, 1);
    }

    #[test]
    fn loop_used_vars_cover_reads_and_writes() {
        // while i < n: s = s + i — the loop must see i, n, and s.
        let module = versioned_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "Loop",
                    "pre": [],
                    "expr": {
                        "node_type": "Operator",
                        "op": "ast.Lt",
                        "operands": [
                            {"node_type": "Name", "name": "i", "id": 0},
                            {"node_type": "Name", "name": "n", "id": 1}
                        ]
                    },
                    "body": [{
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "s", "id": 2}},
                        "right": {
                            "node_type": "Operator",
                            "op": "ast.Add",
                            "operands": [
                                {"node_type": "Name", "name": "s", "id": 2},
                                {"node_type": "Name", "name": "i", "id": 0}
                            ]
                        }
                    }],
                    "post": []
                }]
            }"#,
        );
        let AnnCast::Loop(l) = &module.body[0] else {
            panic!("expected Loop");
        };
        let names: Vec<&str> = l.used_vars.values().map(String::as_str).collect();
        assert_eq!(names, vec!["i", "n", "s"]);
        // Loop variables surface in the enclosing container too.
        assert!(module.used_vars.values().any(|n| n == "s"));
    }

    #[test]
    fn call_and_attribute_names_are_not_uses() {
        let module = versioned_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "ModelIf",
                    "expr": {
                        "node_type": "Call",
                        "func": {"node_type": "Name", "name": "check", "id": 0},
                        "arguments": [{
                            "node_type": "Attribute",
                            "value": {"node_type": "Name", "name": "obj", "id": 1},
                            "attr": {"node_type": "Name", "name": "field", "id": 2}
                        }]
                    },
                    "body": [{"node_type": "Name", "name": "a", "id": 3}],
                    "orelse": []
                }]
            }"#,
        );
        let AnnCast::ModelIf(cond) = &module.body[0] else {
            panic!("expected ModelIf");
        };
        let names: Vec<&str> = cond.used_vars.values().map(String::as_str).collect();
        assert_eq!(names, vec!["obj", "a"]);
    }

    #[test]
    fn function_locals_stay_out_of_enclosing_maps() {
        let module = versioned_module(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "FunctionDef",
                    "name": {"node_type": "Name", "name": "f", "id": 0},
                    "func_args": [{"node_type": "Var", "val": {"node_type": "Name", "name": "a", "id": 1}}],
                    "body": [{
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "t", "id": 2}},
                        "right": {"node_type": "Name", "name": "a", "id": 1}
                    }]
                }]
            }"#,
        );
        let AnnCast::FunctionDef(def) = &module.body[0] else {
            panic!("expected FunctionDef");
        };
        let names: Vec<&str> = def.used_vars.values().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "t"]);
        assert!(!module.used_vars.values().any(|n| n == "t"));
        assert!(!def.used_vars.values().any(|n| n == "f"));
    }
}
