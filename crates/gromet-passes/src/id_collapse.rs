//! Identifier normalization.
//!
//! Front-end name ids are arbitrary and may be sparse. This pass rewrites
//! every id into the dense range `{0, …, k-1}`, assigned in first-seen order
//! of a depth-first walk. Along the way it gives each call its invocation
//! index (0-based occurrence number among calls to the same collapsed
//! function id), registers every function definition under its collapsed id,
//! and records module-scope name reads in the module's `used_vars` map.
//! A second walk then resolves each call's `has_func_def` flag, so calls
//! that precede their definition in source order still see it.

use gromet_anncast::{AnnCast, AnnCastCall, AnnLiteralPayload, FunctionDefRecord, PipelineState};
use gromet_common::PipelineError;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Run the pass over every top-level node in the state.
pub fn run(state: &mut PipelineState) -> Result<(), PipelineError> {
    let mut nodes = std::mem::take(&mut state.nodes);
    let mut cx = Collapse::default();
    for (position, node) in nodes.iter_mut().enumerate() {
        if state.module_index.is_none() && matches!(node, AnnCast::Module(_)) {
            state.module_index = Some(position);
        }
        cx.collapse(node, true)?;
    }
    for node in &mut nodes {
        resolve_call_defs(node, &cx.defs);
    }
    state.nodes = nodes;
    state.collapsed_id_counter = cx.next_id;
    state.func_id_to_def = cx.defs;
    Ok(())
}

#[derive(Default)]
struct Collapse {
    old_to_new: FxHashMap<u32, u32>,
    next_id: u32,
    /// Collapsed function id → number of invocations seen so far.
    invocations: FxHashMap<u32, u32>,
    defs: FxHashMap<u32, FunctionDefRecord>,
    /// Names read at module scope, drained into the module's `used_vars`.
    module_used: BTreeMap<u32, String>,
}

impl Collapse {
    fn collapse_id(&mut self, old: u32) -> u32 {
        *self.old_to_new.entry(old).or_insert_with(|| {
            let id = self.next_id;
            self.next_id += 1;
            id
        })
    }

    fn next_invocation(&mut self, func_id: u32) -> u32 {
        let counter = self.invocations.entry(func_id).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    fn collapse_all(
        &mut self,
        nodes: &mut [AnnCast],
        at_module_scope: bool,
    ) -> Result<(), PipelineError> {
        for node in nodes {
            self.collapse(node, at_module_scope)?;
        }
        Ok(())
    }

    fn collapse(&mut self, node: &mut AnnCast, at_module_scope: bool) -> Result<(), PipelineError> {
        match node {
            AnnCast::Module(module) => {
                self.collapse_all(&mut module.body, true)?;
                module.used_vars.append(&mut self.module_used);
            }
            AnnCast::FunctionDef(def) => {
                def.name.id = self.collapse_id(def.name.id);
                self.defs.insert(
                    def.name.id,
                    FunctionDefRecord {
                        name: def.name.name.clone(),
                        num_args: def.func_args.len(),
                    },
                );
                self.collapse_all(&mut def.func_args, false)?;
                self.collapse_all(&mut def.body, false)?;
            }
            AnnCast::RecordDef(def) => {
                self.collapse_all(&mut def.bases, false)?;
                self.collapse_all(&mut def.funcs, false)?;
                self.collapse_all(&mut def.fields, false)?;
            }
            AnnCast::Assignment(assign) => {
                // Right side first, so ids dense in evaluation order.
                self.collapse(&mut assign.right, at_module_scope)?;
                let left_ok = matches!(assign.left.as_ref(), AnnCast::Var(_) | AnnCast::Attribute(_))
                    || assign.left.is_tuple_literal();
                if !left_ok {
                    return Err(PipelineError::invariant(
                        format!(
                            "assignment left side is {}, expected Var, tuple literal, or Attribute",
                            assign.left.kind_name()
                        ),
                        assign.source_refs.first().cloned(),
                    ));
                }
                self.collapse(&mut assign.left, at_module_scope)?;
            }
            AnnCast::Call(call) => self.collapse_call(call, at_module_scope)?,
            AnnCast::Attribute(attr) => {
                self.collapse(&mut attr.value, at_module_scope)?;
                self.collapse(&mut attr.attr, at_module_scope)?;
            }
            AnnCast::Operator(op) => self.collapse_all(&mut op.operands, at_module_scope)?,
            AnnCast::LiteralValue(lit) => match &mut lit.value {
                // Only the size of a sized-list construction carries names.
                AnnLiteralPayload::Sized { size, .. } => self.collapse(size, at_module_scope)?,
                AnnLiteralPayload::Elements(elems) => self.collapse_all(elems, at_module_scope)?,
                AnnLiteralPayload::Scalar(_) => {}
            },
            AnnCast::Var(var) => {
                self.collapse(&mut var.val, at_module_scope)?;
                if let Some(default) = &mut var.default_value {
                    self.collapse(default, at_module_scope)?;
                }
            }
            AnnCast::Name(name) => {
                name.id = self.collapse_id(name.id);
                if at_module_scope {
                    self.module_used.insert(name.id, name.name.clone());
                }
            }
            AnnCast::Loop(l) => {
                self.collapse_all(&mut l.pre, at_module_scope)?;
                self.collapse(&mut l.expr, at_module_scope)?;
                self.collapse_all(&mut l.body, at_module_scope)?;
                self.collapse_all(&mut l.post, at_module_scope)?;
            }
            AnnCast::ModelIf(cond) => {
                self.collapse(&mut cond.expr, at_module_scope)?;
                self.collapse_all(&mut cond.body, at_module_scope)?;
                self.collapse_all(&mut cond.orelse, at_module_scope)?;
            }
            AnnCast::ModelReturn(ret) => self.collapse(&mut ret.value, at_module_scope)?,
            AnnCast::ModelBreak(_) | AnnCast::ModelContinue(_) | AnnCast::ModelImport(_) => {}
        }
        Ok(())
    }

    /// Call targets are collapsed without entering `used_vars`: a name in
    /// function position is a call, not a variable read.
    fn collapse_call(
        &mut self,
        call: &mut AnnCastCall,
        at_module_scope: bool,
    ) -> Result<(), PipelineError> {
        match call.func.as_mut() {
            AnnCast::Name(func) => {
                func.id = self.collapse_id(func.id);
                call.invocation_index = self.next_invocation(func.id);
            }
            AnnCast::Attribute(attr) => {
                let value = attr.value.as_mut();
                if matches!(
                    value,
                    AnnCast::Call(_)
                        | AnnCast::Attribute(_)
                        | AnnCast::Operator(_)
                        | AnnCast::Assignment(_)
                ) {
                    self.collapse(value, at_module_scope)?;
                } else if let AnnCast::Name(name) = value {
                    name.id = self.collapse_id(name.id);
                } else if !matches!(value, AnnCast::LiteralValue(_)) {
                    return Err(PipelineError::invariant(
                        format!("call target accesses a member of {}", value.kind_name()),
                        call.source_refs.first().cloned(),
                    ));
                }
                let AnnCast::Name(attr_name) = attr.attr.as_mut() else {
                    return Err(PipelineError::invariant(
                        "call target member is not a name",
                        call.source_refs.first().cloned(),
                    ));
                };
                attr_name.id = self.collapse_id(attr_name.id);
                call.invocation_index = self.next_invocation(attr_name.id);
            }
            other => {
                return Err(PipelineError::invariant(
                    format!("call target is {}", other.kind_name()),
                    call.source_refs.first().cloned(),
                ));
            }
        }
        self.collapse_all(&mut call.arguments, at_module_scope)
    }
}

/// Second walk: flag every call whose target has a definition anywhere in
/// the unit.
fn resolve_call_defs(node: &mut AnnCast, defs: &FxHashMap<u32, FunctionDefRecord>) {
    let mut resolve_all = |nodes: &mut Vec<AnnCast>| {
        for child in nodes {
            resolve_call_defs(child, defs);
        }
    };
    match node {
        AnnCast::Module(module) => resolve_all(&mut module.body),
        AnnCast::FunctionDef(def) => {
            resolve_all(&mut def.func_args);
            resolve_all(&mut def.body);
        }
        AnnCast::RecordDef(def) => {
            resolve_all(&mut def.bases);
            resolve_all(&mut def.funcs);
            resolve_all(&mut def.fields);
        }
        AnnCast::Assignment(assign) => {
            resolve_call_defs(&mut assign.right, defs);
            resolve_call_defs(&mut assign.left, defs);
        }
        AnnCast::Call(call) => {
            let func_id = match call.func.as_ref() {
                AnnCast::Name(name) => Some(name.id),
                AnnCast::Attribute(attr) => match attr.attr.as_ref() {
                    AnnCast::Name(name) => Some(name.id),
                    _ => None,
                },
                _ => None,
            };
            call.has_func_def = func_id.is_some_and(|id| defs.contains_key(&id));
            resolve_call_defs(&mut call.func, defs);
            resolve_all(&mut call.arguments);
        }
        AnnCast::Attribute(attr) => {
            resolve_call_defs(&mut attr.value, defs);
            resolve_call_defs(&mut attr.attr, defs);
        }
        AnnCast::Operator(op) => resolve_all(&mut op.operands),
        AnnCast::LiteralValue(lit) => match &mut lit.value {
            AnnLiteralPayload::Sized { size, initial_value } => {
                resolve_call_defs(size, defs);
                resolve_call_defs(initial_value, defs);
            }
            AnnLiteralPayload::Elements(elems) => resolve_all(elems),
            AnnLiteralPayload::Scalar(_) => {}
        },
        AnnCast::Var(var) => {
            resolve_call_defs(&mut var.val, defs);
            if let Some(default) = &mut var.default_value {
                resolve_call_defs(default, defs);
            }
        }
        AnnCast::Name(_) => {}
        AnnCast::Loop(l) => {
            resolve_all(&mut l.pre);
            resolve_call_defs(&mut l.expr, defs);
            resolve_all(&mut l.body);
            resolve_all(&mut l.post);
        }
        AnnCast::ModelIf(cond) => {
            resolve_call_defs(&mut cond.expr, defs);
            resolve_all(&mut cond.body);
            resolve_all(&mut cond.orelse);
        }
        AnnCast::ModelReturn(ret) => resolve_call_defs(&mut ret.value, defs),
        AnnCast::ModelBreak(_) | AnnCast::ModelContinue(_) | AnnCast::ModelImport(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate;
    use gromet_cast::CastNode;

    fn collapsed_state(json: &str) -> PipelineState {
        let cast: CastNode = serde_json::from_str(json).unwrap();
        let ann = annotate::run(cast).unwrap();
        let mut state = PipelineState::new(vec![ann]);
        run(&mut state).unwrap();
        state
    }

    fn module_of(state: &PipelineState) -> &gromet_anncast::AnnCastModule {
        let AnnCast::Module(module) = &state.nodes[state.module_index.unwrap()] else {
            panic!("expected Module");
        };
        module
    }

    #[test]
    fn ids_collapse_densely_in_first_seen_order() {
        // x = 2 ; y = x — front-end ids 14 and 9 collapse to 0 and 1.
        let state = collapsed_state(
            r#"{
                "node_type": "Module",
                "body": [
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "x", "id": 14}},
                        "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 2}
                    },
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "y", "id": 9}},
                        "right": {"node_type": "Name", "name": "x", "id": 14}
                    }
                ]
            }"#,
        );
        assert_eq!(state.collapsed_id_counter, 2);
        let module = module_of(&state);
        assert_eq!(module.used_vars.get(&0), Some(&"x".to_string()));
        assert_eq!(module.used_vars.get(&1), Some(&"y".to_string()));
    }

    #[test]
    fn invocation_indices_count_per_function() {
        // f() ; f() ; g() — f gets invocations 0 and 1, g gets 0. The
        // definition of f appears after its first call; has_func_def still
        // resolves for both call sites.
        let state = collapsed_state(
            r#"{
                "node_type": "Module",
                "body": [
                    {"node_type": "Call", "func": {"node_type": "Name", "name": "f", "id": 3}, "arguments": []},
                    {
                        "node_type": "FunctionDef",
                        "name": {"node_type": "Name", "name": "f", "id": 3},
                        "func_args": [],
                        "body": [{"node_type": "ModelReturn", "value": {"node_type": "LiteralValue", "value_type": "Integer", "value": 1}}]
                    },
                    {"node_type": "Call", "func": {"node_type": "Name", "name": "f", "id": 3}, "arguments": []},
                    {"node_type": "Call", "func": {"node_type": "Name", "name": "g", "id": 8}, "arguments": []}
                ]
            }"#,
        );
        let module = module_of(&state);
        let calls: Vec<&AnnCastCall> = module
            .body
            .iter()
            .filter_map(|n| match n {
                AnnCast::Call(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].invocation_index, 0);
        assert_eq!(calls[1].invocation_index, 1);
        assert_eq!(calls[2].invocation_index, 0);
        assert!(calls[0].has_func_def);
        assert!(calls[1].has_func_def);
        assert!(!calls[2].has_func_def);
        assert!(state.func_def_exists(0));
    }

    #[test]
    fn function_bodies_stay_out_of_module_used_vars() {
        let state = collapsed_state(
            r#"{
                "node_type": "Module",
                "body": [
                    {
                        "node_type": "FunctionDef",
                        "name": {"node_type": "Name", "name": "f", "id": 0},
                        "func_args": [{"node_type": "Var", "val": {"node_type": "Name", "name": "a", "id": 1}}],
                        "body": [{"node_type": "ModelReturn", "value": {"node_type": "Name", "name": "a", "id": 1}}]
                    },
                    {
                        "node_type": "Assignment",
                        "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "y", "id": 2}},
                        "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 5}
                    }
                ]
            }"#,
        );
        let module = module_of(&state);
        let names: Vec<&str> = module.used_vars.values().map(String::as_str).collect();
        assert_eq!(names, vec!["y"]);
    }

    #[test]
    fn call_names_are_not_variable_reads() {
        let state = collapsed_state(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "Assignment",
                    "left": {"node_type": "Var", "val": {"node_type": "Name", "name": "y", "id": 5}},
                    "right": {
                        "node_type": "Call",
                        "func": {"node_type": "Name", "name": "f", "id": 1},
                        "arguments": [{"node_type": "Name", "name": "x", "id": 2}]
                    }
                }]
            }"#,
        );
        let module = module_of(&state);
        let names: Vec<&str> = module.used_vars.values().map(String::as_str).collect();
        assert!(names.contains(&"x"));
        assert!(names.contains(&"y"));
        assert!(!names.contains(&"f"));
    }

    #[test]
    fn bad_assignment_left_side_is_an_invariant_violation() {
        let cast: CastNode = serde_json::from_str(
            r#"{
                "node_type": "Module",
                "body": [{
                    "node_type": "Assignment",
                    "left": {"node_type": "LiteralValue", "value_type": "Integer", "value": 3},
                    "right": {"node_type": "LiteralValue", "value_type": "Integer", "value": 2}
                }]
            }"#,
        )
        .unwrap();
        let ann = annotate::run(cast).unwrap();
        let mut state = PipelineState::new(vec![ann]);
        let err = run(&mut state).unwrap_err();
        assert!(err.to_string().contains("assignment left side"));
    }
}
