//! Control flow lowering: loops, conditionals, returns.
//!
//! A loop becomes a `bl` entry with up to four attached networks (setup,
//! condition, body, update); a conditional becomes a `bc` entry with a
//! predicate and one network per branch. Each attached network declares one
//! input and one output port per variable the construct uses, so state
//! threads through the construct positionally.

use gromet_anncast::{AnnCastLoop, AnnCastModelIf, AnnCastModelReturn};
use gromet_fn::{GrometBoxConditional, GrometBoxLoop};

use super::*;

impl GrometLowering {
    // ── Loops ────────────────────────────────────────────────────────────

    pub(super) fn visit_loop(
        &mut self,
        l: &AnnCastLoop,
        f: &mut GrometFN,
    ) -> Result<(), PipelineError> {
        let metadata = self.source_ref_metadata(&l.source_refs);
        let bl_idx = f.add_loop(GrometBoxLoop::new(metadata));
        let used: Vec<String> = l.used_vars.values().cloned().collect();
        for name in &used {
            f.add_port(PortTable::Pil, GrometPort::named(name, bl_idx));
        }

        if !l.pre.is_empty() {
            let idx = self.loop_setup_fn(l, &used)?;
            f.bl[bl_idx - 1].pre = Some(idx);
        }
        let idx = self.loop_condition_fn(&l.expr, &used)?;
        f.bl[bl_idx - 1].condition = Some(idx);
        let idx = self.loop_body_fn(l, &used)?;
        f.bl[bl_idx - 1].body = Some(idx);
        if !l.post.is_empty() {
            let idx = self.loop_update_fn(&l.post, &used)?;
            f.bl[bl_idx - 1].post = Some(idx);
        }

        for name in &used {
            let pos = f.add_port(PortTable::Pol, GrometPort::named(name, bl_idx));
            self.add_var_to_env(name, pos, Parent::Loop);
        }
        Ok(())
    }

    /// The setup network runs once before the first condition check. For a
    /// desugared iteration it ends with the iterator triple (element,
    /// iterator, stop flag), which must reach the same-named outputs.
    fn loop_setup_fn(&mut self, l: &AnnCastLoop, used: &[String]) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));

        self.env.push_args(FrameKind::Isolated);
        self.env.push_local(FrameKind::Isolated);
        for name in used {
            let pos = pf.add_port(PortTable::Opi, GrometPort::named(name, 1));
            self.env.insert_arg(name, pos);
            pf.add_port(PortTable::Opo, GrometPort::named(name, 1));
        }
        for stmt in &l.pre {
            self.visit(stmt, &mut pf, Parent::FunctionDef)?;
        }
        if pf.pof.len() < 3 {
            return Err(PipelineError::invariant(
                "loop setup expects an iterator triple",
                l.source_refs.first().cloned(),
            ));
        }
        let n = pf.pof.len();
        for pos in [n - 2, n - 1, n] {
            let Some(name) = pf.pof[pos - 1].name.clone() else {
                continue;
            };
            let Some(opo_idx) = pf.opo.iter().position(|p| p.name.as_deref() == Some(&name))
            else {
                continue;
            };
            pf.add_wire(WireTable::Wfopo, GrometWire::connected(opo_idx + 1, pos));
        }
        // Variables the setup never touched pass straight through.
        for (i, name) in used.iter().enumerate() {
            if !self.env.is_local(name) {
                pf.add_wire(WireTable::Wopio, GrometWire::connected(i + 1, i + 1));
            }
        }
        self.env.pop_local();
        self.env.pop_args();

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    /// The condition network carries every used variable through unchanged
    /// and adds one unnamed output for the test result.
    fn loop_condition_fn(&mut self, expr: &AnnCast, used: &[String]) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Predicate));
        for (i, name) in used.iter().enumerate() {
            pf.add_port(PortTable::Opi, GrometPort::named(name, 1));
            pf.add_port(PortTable::Opo, GrometPort::named(name, 1));
            pf.add_wire(WireTable::Wopio, GrometWire::connected(i + 1, i + 1));
        }
        self.visit(expr, &mut pf, Parent::Loop)?;
        let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
        let tgt = last_pof(&pf);
        add_wfopo(&mut pf, opo_pos, tgt);

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    fn loop_body_fn(&mut self, l: &AnnCastLoop, used: &[String]) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let metadata = l.body.first().and_then(|s| self.node_metadata(s));
        let mut pf = GrometFN::default();
        pf.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Function).with_metadata(metadata),
        );

        self.env.push_args(FrameKind::Isolated);
        for name in used {
            let pos = pf.add_port(PortTable::Opi, GrometPort::named(name, 1));
            self.env.insert_arg(name, pos);
            pf.add_port(PortTable::Opo, GrometPort::named(name, 1));
        }
        self.lower_body(&mut pf, &l.body, FrameKind::Isolated)?;
        self.env.pop_args();

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    /// The update network runs after each body pass; a desugared iteration
    /// advances the iterator here.
    fn loop_update_fn(
        &mut self,
        post: &[AnnCast],
        used: &[String],
    ) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));

        self.env.push_args(FrameKind::Isolated);
        self.env.push_local(FrameKind::Isolated);
        for name in used {
            let pos = pf.add_port(PortTable::Opi, GrometPort::named(name, 1));
            self.env.insert_arg(name, pos);
            pf.add_port(PortTable::Opo, GrometPort::named(name, 1));
        }
        for stmt in post {
            self.visit(stmt, &mut pf, Parent::FunctionDef)?;
        }
        for (i, name) in used.iter().enumerate() {
            if !self.env.is_local(name) {
                pf.add_wire(WireTable::Wopio, GrometWire::connected(i + 1, i + 1));
            }
        }
        self.env.pop_local();
        self.env.pop_args();

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    // ── Conditionals ─────────────────────────────────────────────────────

    pub(super) fn visit_model_if(
        &mut self,
        cond: &AnnCastModelIf,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let metadata = self.source_ref_metadata(&cond.source_refs);
        let bc_idx = f.add_conditional(GrometBoxConditional::new(metadata));
        let used: Vec<String> = cond.used_vars.values().cloned().collect();
        let mut poc_positions = Vec::with_capacity(used.len());
        for name in &used {
            f.add_port(PortTable::Pic, GrometPort::named(name, bc_idx));
            poc_positions.push(f.add_port(PortTable::Poc, GrometPort::named(name, bc_idx)));
        }

        if parent == Parent::FunctionDef {
            let src = (!f.pic.is_empty()).then_some(f.pic.len());
            let tgt = (!f.opi.is_empty()).then_some(f.opi.len());
            f.add_wire(WireTable::Wcopi, GrometWire { src, tgt });
        }

        let idx = self.if_condition_fn(cond, &used)?;
        f.bc[bc_idx - 1].condition = Some(idx);
        let idx = self.branch_fn(&cond.body, &used, true)?;
        f.bc[bc_idx - 1].body_if = Some(idx);
        if !cond.orelse.is_empty() {
            let idx = self.branch_fn(&cond.orelse, &used, false)?;
            f.bc[bc_idx - 1].body_else = Some(idx);
        }

        for (name, pos) in used.iter().zip(poc_positions) {
            self.add_var_to_env(name, pos, Parent::Conditional);
        }
        Ok(())
    }

    fn if_condition_fn(
        &mut self,
        cond: &AnnCastModelIf,
        used: &[String],
    ) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Predicate));
        for (i, name) in used.iter().enumerate() {
            pf.add_port(PortTable::Opi, GrometPort::named(name, 1));
            pf.add_port(PortTable::Opo, GrometPort::named(name, 1));
            pf.add_wire(WireTable::Wopio, GrometWire::connected(i + 1, i + 1));
        }
        self.visit(&cond.expr, &mut pf, Parent::Conditional)?;
        let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
        if matches!(cond.expr.as_ref(), AnnCast::ModelIf(_)) {
            // A ternary test nests a conditional inside the predicate; its
            // interface threads through rather than wiring a plain output.
            for i in 1..=pf.opi.len() {
                pf.add_wire(WireTable::Wcopi, GrometWire::connected(i, i));
            }
            pf.add_port(PortTable::Poc, GrometPort::new(pf.bc.len()));
            for i in 1..=pf.opo.len() {
                pf.add_wire(WireTable::Wcopo, GrometWire::connected(i, i));
            }
        } else {
            let tgt = last_pof(&pf);
            add_wfopo(&mut pf, opo_pos, tgt);
        }
        pf.metadata = cond.expr.source_ref().map(|r| self.ref_metadata(r));

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    /// One branch body as its own network. Inputs stay unnamed (the branch
    /// interface is positional); outputs carry the variable names so the
    /// body wiring can find them.
    fn branch_fn(
        &mut self,
        branch: &[AnnCast],
        used: &[String],
        is_if_side: bool,
    ) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();

        let bool_literal = matches!(
            branch.first(),
            Some(AnnCast::LiteralValue(lit)) if lit.value_type == "Boolean"
        );
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        if bool_literal {
            // Short-circuit desugaring: the branch that keeps the test's
            // truth value marks which boolean operator produced it.
            let record = if is_if_side {
                Metadata::SourceCodeBoolOr {
                    provenance: Provenance::generate(),
                }
            } else {
                Metadata::SourceCodeBoolAnd {
                    provenance: Provenance::generate(),
                }
            };
            pf.metadata = Some(self.gromet.insert_metadata(vec![record]));
        }

        self.env.push_args(FrameKind::Isolated);
        for name in used {
            let pos = pf.add_port(PortTable::Opi, GrometPort::new(1));
            self.env.insert_arg(name, pos);
            pf.add_port(PortTable::Opo, GrometPort::named(name, 1));
        }
        self.lower_body(&mut pf, branch, FrameKind::Isolated)?;
        self.env.pop_args();

        let comparison = matches!(
            branch.first(),
            Some(AnnCast::Operator(op)) if primitives::is_comparison(&op.op)
        );
        if bool_literal || comparison {
            let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
            let tgt = last_pof(&pf);
            add_wfopo(&mut pf, opo_pos, tgt);
        }

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    // ── Returns ──────────────────────────────────────────────────────────

    /// Declare the outer output a return produces. Tuples stay unvisited
    /// here; the pack that feeds the output is built at wiring time.
    pub(super) fn visit_model_return(
        &mut self,
        ret: &AnnCastModelReturn,
        f: &mut GrometFN,
    ) -> Result<(), PipelineError> {
        if !ret.value.is_tuple_literal() {
            self.visit(&ret.value, f, Parent::Return)?;
        }
        let box_id = f.b.len();
        match ret.value.as_ref() {
            value if value.is_tuple_literal() => {
                let metadata = self.node_metadata(&ret.value);
                f.add_port(
                    PortTable::Opo,
                    GrometPort::new(box_id).with_metadata(metadata),
                );
            }
            AnnCast::Operator(_) | AnnCast::LiteralValue(_) => {
                let metadata = self.node_metadata(&ret.value);
                f.add_port(
                    PortTable::Opo,
                    GrometPort::new(box_id).with_metadata(metadata),
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Wire a trailing return's value to the network's outer outputs.
    pub(super) fn wire_return_node(
        &mut self,
        value: &AnnCast,
        f: &mut GrometFN,
    ) -> Result<(), PipelineError> {
        match value {
            value if value.is_tuple_literal() => {
                if let Some(elems) = tuple_elements(value) {
                    let pos = self.build_pack(elems, value, f)?;
                    f.add_wire(
                        WireTable::Wfopo,
                        GrometWire::connected(f.opo.len(), pos),
                    );
                }
            }
            AnnCast::LiteralValue(_) => {
                let tgt = last_pof(f);
                add_wfopo(f, f.opo.len(), tgt);
            }
            AnnCast::Name(name) => self.wire_return_name(&name.name, f, 1),
            AnnCast::Var(var) => {
                if let AnnCast::Name(name) = var.val.as_ref() {
                    self.wire_return_name(&name.name, f, 1);
                }
            }
            AnnCast::Operator(_) => {
                let tgt = last_pof(f);
                add_wfopo(f, 1, tgt);
            }
            _ => {}
        }
        Ok(())
    }

    fn wire_return_name(&self, name: &str, f: &mut GrometFN, index: usize) {
        match self.env.resolve(name) {
            Some(Resolution::Local(entry)) => {
                let table = match entry.owner {
                    VarOwner::Loop => WireTable::Wlopo,
                    VarOwner::Conditional => WireTable::Wcopo,
                    VarOwner::Function => WireTable::Wfopo,
                };
                f.add_wire(table, GrometWire::connected(index, entry.port));
            }
            Some(Resolution::Arg(port)) => {
                f.add_wire(WireTable::Wopio, GrometWire::connected(index, port));
            }
            Some(Resolution::Global(_)) | None => {
                f.add_wire(WireTable::Wfopo, GrometWire::dangling_tgt(index));
            }
        }
    }

    /// Gather a returned tuple's parts into one `pack` box; returns the
    /// position of the pack's output port.
    fn build_pack(
        &mut self,
        values: &[AnnCast],
        origin: &AnnCast,
        f: &mut GrometFN,
    ) -> Result<usize, PipelineError> {
        let metadata = self.node_metadata(origin);
        let pack_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::named("pack", FunctionType::Abstract).with_metadata(metadata),
        );
        for val in values {
            match val {
                AnnCast::Name(name) => {
                    f.add_port(PortTable::Pif, GrometPort::new(pack_idx));
                    if !self.wire_from_var_env(&name.name, f) {
                        return Err(PipelineError::unresolved(
                            name.name.clone(),
                            name.source_refs.first().cloned(),
                        ));
                    }
                }
                val if val.is_tuple_literal() => {
                    let Some(inner) = tuple_elements(val) else {
                        continue;
                    };
                    let inner_pos = self.build_pack(inner, val, f)?;
                    let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(pack_idx));
                    f.add_wire(WireTable::Wff, GrometWire::connected(pif_pos, inner_pos));
                }
                _ => {
                    self.visit(val, f, Parent::Return)?;
                    let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(pack_idx));
                    let tgt = last_pof(f);
                    add_wff(f, pif_pos, tgt);
                }
            }
        }
        Ok(f.add_port(PortTable::Pof, GrometPort::new(pack_idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gromet_anncast::{
        AnnCastAssignment, AnnCastCall, AnnCastLiteralValue, AnnCastName, AnnCastOperator,
        AnnCastVar,
    };
    use std::collections::BTreeMap;

    fn lowering() -> GrometLowering {
        GrometLowering::new(&crate::PipelineOptions::new("prog.py"))
    }

    fn module_fn() -> GrometFN {
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::named("module", FunctionType::Module),
        );
        f
    }

    fn name(n: &str) -> AnnCast {
        let mut node = AnnCastName::new(n, 0, vec![]);
        node.con_scope = vec!["module".to_string()];
        AnnCast::Name(node)
    }

    fn var(n: &str) -> AnnCast {
        AnnCast::Var(AnnCastVar {
            val: Box::new(name(n)),
            ty: None,
            default_value: None,
            source_refs: vec![],
        })
    }

    fn int(v: i64) -> AnnCast {
        AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Integer".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::json!(v)),
            source_code_data_type: None,
            source_refs: vec![],
        })
    }

    fn boolean(v: bool) -> AnnCast {
        AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Boolean".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::json!(v)),
            source_code_data_type: None,
            source_refs: vec![],
        })
    }

    fn tuple(elems: Vec<AnnCast>) -> AnnCast {
        AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: gromet_cast::VALUE_TYPE_TUPLE.to_string(),
            value: AnnLiteralPayload::Elements(elems),
            source_code_data_type: None,
            source_refs: vec![],
        })
    }

    fn call(func: AnnCast, arguments: Vec<AnnCast>) -> AnnCast {
        AnnCast::Call(AnnCastCall {
            func: Box::new(func),
            arguments,
            invocation_index: 0,
            has_func_def: false,
            source_refs: vec![],
        })
    }

    fn assign(left: AnnCast, right: AnnCast) -> AnnCast {
        AnnCast::Assignment(AnnCastAssignment {
            left: Box::new(left),
            right: Box::new(right),
            source_refs: vec![],
        })
    }

    fn op(operator: &str, operands: Vec<AnnCast>) -> AnnCast {
        AnnCast::Operator(AnnCastOperator {
            op: operator.to_string(),
            operands,
            source_refs: vec![],
        })
    }

    fn used(names: &[&str]) -> BTreeMap<u32, String> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u32, n.to_string()))
            .collect()
    }

    #[test]
    fn while_loop_builds_condition_and_body_networks() {
        let mut lowering = lowering();
        let mut f = module_fn();
        let l = AnnCastLoop {
            pre: vec![],
            expr: Box::new(op("ast.Lt", vec![name("i"), name("n")])),
            body: vec![assign(var("i"), name("n"))],
            post: vec![],
            con_scope: vec!["module".to_string()],
            used_vars: used(&["i", "n"]),
            source_refs: vec![],
        };
        lowering.visit_loop(&l, &mut f).unwrap();

        let bl = &f.bl[0];
        assert!(bl.pre.is_none());
        assert_eq!(bl.condition, Some(1));
        assert_eq!(bl.body, Some(2));
        assert!(bl.post.is_none());

        let names = |ports: &Vec<GrometPort>| {
            ports
                .iter()
                .map(|p| p.name.clone().unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&f.pil), vec!["i", "n"]);
        assert_eq!(names(&f.pol), vec!["i", "n"]);

        // The condition passes both variables through and tests them.
        let cond = &lowering.gromet.fn_array[0];
        assert_eq!(cond.b[0].function_type, FunctionType::Predicate);
        assert_eq!(
            cond.wopio,
            vec![GrometWire::connected(1, 1), GrometWire::connected(2, 2)]
        );
        assert_eq!(cond.bf[0].name.as_deref(), Some("ast.Lt"));
        assert_eq!(cond.opo.len(), 3);
        assert!(cond.opo[2].name.is_none());

        // The body rebinds i and passes n through.
        let body = &lowering.gromet.fn_array[1];
        assert!(body.wfopo.contains(&GrometWire::connected(1, 1)));
        assert!(body.wopio.contains(&GrometWire::connected(2, 2)));

        // After the loop both variables resolve to its output ports.
        match lowering.env.resolve("i") {
            Some(Resolution::Local(entry)) => {
                assert_eq!(entry.owner, VarOwner::Loop);
                assert_eq!(entry.port, 1);
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    #[test]
    fn iteration_setup_wires_the_trailing_triple() {
        let mut lowering = lowering();
        let mut f = module_fn();
        lowering.env.insert_global("xs", 1);
        let l = AnnCastLoop {
            pre: vec![
                assign(var("it"), call(name("iter"), vec![name("xs")])),
                assign(
                    tuple(vec![var("elem"), var("it"), var("sb")]),
                    call(name("next"), vec![name("it")]),
                ),
            ],
            expr: Box::new(op("ast.Eq", vec![name("sb"), boolean(false)])),
            body: vec![assign(var("acc"), name("elem"))],
            post: vec![],
            con_scope: vec!["module".to_string()],
            used_vars: used(&["elem", "it", "xs", "acc"]),
            source_refs: vec![],
        };
        lowering.visit_loop(&l, &mut f).unwrap();

        let setup = &lowering.gromet.fn_array[0];
        // iter yields one output, next three; the last three carry the
        // element and iterator names, the stop flag stays unnamed.
        assert_eq!(setup.pof.len(), 4);
        assert_eq!(setup.pof[1].name.as_deref(), Some("elem"));
        assert_eq!(setup.pof[2].name.as_deref(), Some("it"));
        assert!(setup.pof[3].name.is_none());
        assert!(setup.wfopo.contains(&GrometWire::connected(1, 2)));
        assert!(setup.wfopo.contains(&GrometWire::connected(2, 3)));
        // Untouched variables pass straight through.
        assert!(setup.wopio.contains(&GrometWire::connected(3, 3)));
        assert!(setup.wopio.contains(&GrometWire::connected(4, 4)));
    }

    #[test]
    fn setup_without_an_iterator_triple_is_rejected() {
        let mut lowering = lowering();
        let mut f = module_fn();
        let l = AnnCastLoop {
            pre: vec![assign(var("x"), int(1))],
            expr: Box::new(boolean(true)),
            body: vec![],
            post: vec![],
            con_scope: vec!["module".to_string()],
            used_vars: used(&["x"]),
            source_refs: vec![],
        };
        assert!(lowering.visit_loop(&l, &mut f).is_err());
    }

    #[test]
    fn conditional_declares_interface_and_branches() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        let cond = AnnCastModelIf {
            expr: Box::new(op("ast.Lt", vec![name("x"), name("y")])),
            body: vec![assign(var("x"), int(1))],
            orelse: vec![assign(var("x"), int(2))],
            con_scope: vec!["module".to_string(), "f".to_string()],
            used_vars: used(&["x", "y"]),
            source_refs: vec![],
        };
        lowering
            .visit_model_if(&cond, &mut f, Parent::FunctionDef)
            .unwrap();

        let bc = &f.bc[0];
        assert_eq!(bc.condition, Some(1));
        assert_eq!(bc.body_if, Some(2));
        assert_eq!(bc.body_else, Some(4));
        assert_eq!(f.pic.len(), 2);
        assert_eq!(f.poc.len(), 2);
        // No outer inputs to attach to yet: the interface wire dangles.
        assert_eq!(
            f.wcopi,
            vec![GrometWire {
                src: Some(2),
                tgt: None
            }]
        );

        // Branch inputs are positional, outputs named.
        let body_if = &lowering.gromet.fn_array[1];
        assert!(body_if.opi.iter().all(|p| p.name.is_none()));
        assert_eq!(body_if.opo[0].name.as_deref(), Some("x"));
        assert!(body_if.wfopo.contains(&GrometWire::connected(1, 1)));
        assert!(body_if.wopio.contains(&GrometWire::connected(2, 2)));

        // Both variables now resolve to the conditional's outputs.
        match lowering.env.resolve("y") {
            Some(Resolution::Local(entry)) => {
                assert_eq!(entry.owner, VarOwner::Conditional);
                assert_eq!(entry.port, 2);
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }

    #[test]
    fn boolean_branch_records_short_circuit_metadata() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        let cond = AnnCastModelIf {
            expr: Box::new(op("ast.Lt", vec![name("x"), name("x")])),
            body: vec![boolean(true)],
            orelse: vec![],
            con_scope: vec!["module".to_string(), "f".to_string()],
            used_vars: used(&["x"]),
            source_refs: vec![],
        };
        lowering
            .visit_model_if(&cond, &mut f, Parent::FunctionDef)
            .unwrap();

        let branch = &lowering.gromet.fn_array[1];
        let meta_idx = branch.metadata.unwrap();
        let records = &lowering.gromet.metadata_collection[meta_idx - 1];
        assert!(matches!(records[0], Metadata::SourceCodeBoolOr { .. }));
        // The truth value reaches an extra unnamed output.
        assert!(branch.opo.last().unwrap().name.is_none());
        assert_eq!(
            branch.wfopo.last(),
            Some(&GrometWire::connected(2, 1))
        );
    }

    #[test]
    fn return_of_an_expression_wires_the_output() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        let ret = AnnCastModelReturn {
            value: Box::new(op("ast.Add", vec![int(1), int(2)])),
            source_refs: vec![],
        };
        lowering.visit_model_return(&ret, &mut f).unwrap();
        lowering.wire_return_node(&ret.value, &mut f).unwrap();

        assert_eq!(f.opo.len(), 1);
        assert!(f.opo[0].name.is_none());
        // The operator's output feeds the declared output port.
        assert_eq!(
            f.wfopo.last(),
            Some(&GrometWire::connected(1, f.pof.len()))
        );
    }

    #[test]
    fn tuple_return_packs_its_parts() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        lowering.env.insert_local("a", VarOwner::Function, 1);
        lowering.env.insert_local("b", VarOwner::Function, 2);
        let ret = AnnCastModelReturn {
            value: Box::new(tuple(vec![name("a"), name("b")])),
            source_refs: vec![],
        };
        lowering.visit_model_return(&ret, &mut f).unwrap();
        lowering.wire_return_node(&ret.value, &mut f).unwrap();

        let pack = f.bf.last().unwrap();
        assert_eq!(pack.name.as_deref(), Some("pack"));
        assert_eq!(
            f.wff,
            vec![GrometWire::connected(1, 1), GrometWire::connected(2, 2)]
        );
        // One declared output, fed by the pack's output port.
        assert_eq!(f.opo.len(), 1);
        assert_eq!(
            f.wfopo,
            vec![GrometWire::connected(1, f.pof.len())]
        );
    }

    #[test]
    fn returned_name_wires_by_owner() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        f.add_port(PortTable::Opo, GrometPort::new(1));
        lowering.env.insert_local("x", VarOwner::Loop, 3);
        lowering.wire_return_node(&name("x"), &mut f).unwrap();
        assert_eq!(f.wlopo, vec![GrometWire::connected(1, 3)]);

        // A name nobody bound leaves the output dangling.
        lowering.wire_return_node(&name("ghost"), &mut f).unwrap();
        assert_eq!(f.wfopo, vec![GrometWire::dangling_tgt(1)]);
    }
}
