//! Assignment lowering.
//!
//! The right side decides the shape: calls leave their box in place and the
//! assignment names its result port, plain reads become a pass-through
//! expression network, literals and compound expressions each get their own
//! expression network. The left side then binds the produced ports, either
//! directly or through `pack`/`unpack` boxes for tuple targets.

use gromet_anncast::AnnCastAssignment;

use super::*;

impl GrometLowering {
    pub(super) fn visit_assignment(
        &mut self,
        assign: &AnnCastAssignment,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        match assign.right.as_ref() {
            AnnCast::Call(call) => self.assign_from_call(assign, f, parent),
            AnnCast::Name(_) => self.assign_from_name(assign, f, parent),
            right if right.is_tuple_literal() => self.assign_from_tuple(assign, f, parent),
            AnnCast::LiteralValue(_) => self.assign_from_literal(assign, f, parent),
            AnnCast::Var(var) => match var.val.as_ref() {
                AnnCast::Name(_) => self.assign_from_name(assign, f, parent),
                _ => self.assign_general(assign, f, parent),
            },
            _ => self.assign_general(assign, f, parent),
        }
    }

    // ── Call right side ──────────────────────────────────────────────────

    fn assign_from_call(
        &mut self,
        assign: &AnnCastAssignment,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let AnnCast::Call(call) = assign.right.as_ref() else {
            return Err(PipelineError::invariant(
                format!("assignment source of kind {}", assign.right.kind_name()),
                assign.right.source_ref().cloned(),
            ));
        };
        let ret_idx = self.visit_call(call, f, Parent::Assignment)?;

        // Inline primitives and method calls already left their output
        // ports on the box; everything else waits for the target to name
        // its result.
        let ports_in_place = match call.func.as_ref() {
            AnnCast::Attribute(_) => true,
            AnnCast::Name(name) => {
                primitives::is_inline(&name.name) && self.func_in_module(&name.name).is_none()
            }
            _ => false,
        };

        if ports_in_place {
            if let Some(targets) = tuple_elements(&assign.left) {
                if call_name(call).is_some_and(|n| n == "next") {
                    return self.bind_iteration_step(targets, f, parent, assign);
                }
                let producer = last_pof(f);
                return self.create_unpack(targets, producer, f, parent);
            }
            let name = get_left_side_name(&assign.left)?;
            let Some(pos) = last_pof(f) else {
                return Err(PipelineError::invariant(
                    "call produced no output port",
                    assign.source_refs.first().cloned(),
                ));
            };
            f.pof[pos - 1].name = Some(name.clone());
            self.add_var_to_env(&name, pos, parent);
            return Ok(());
        }

        if let Some(targets) = tuple_elements(&assign.left) {
            let producer = f.add_port(PortTable::Pof, GrometPort::new(ret_idx));
            return self.create_unpack(targets, Some(producer), f, parent);
        }

        let name = get_left_side_name(&assign.left)?;
        if let AnnCast::Name(func) = call.func.as_ref() {
            if self.records.contains_key(&func.name) {
                self.initialized_records
                    .insert(name.clone(), func.name.clone());
            }
        }
        let metadata = self.node_metadata(&assign.left);
        let pos = f.add_port(
            PortTable::Pof,
            GrometPort::named(&name, ret_idx).with_metadata(metadata),
        );
        self.add_var_to_env(&name, pos, parent);
        Ok(())
    }

    /// `elem, it = next(it)` style targets: the first two outputs of the
    /// iteration step take the target names, the stop flag stays unnamed.
    fn bind_iteration_step(
        &mut self,
        targets: &[AnnCast],
        f: &mut GrometFN,
        parent: Parent,
        assign: &AnnCastAssignment,
    ) -> Result<(), PipelineError> {
        let n = f.pof.len();
        if n < 3 || targets.len() < 2 {
            return Err(PipelineError::invariant(
                "iteration step expects three outputs and two targets",
                assign.source_refs.first().cloned(),
            ));
        }
        for (offset, target) in targets.iter().take(2).enumerate() {
            let name = binding_name(target)?;
            let pos = n - 2 + offset;
            f.pof[pos - 1].name = Some(name.clone());
            self.add_var_to_env(&name, pos, parent);
        }
        Ok(())
    }

    // ── Name right side ──────────────────────────────────────────────────

    fn assign_from_name(
        &mut self,
        assign: &AnnCastAssignment,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let source = match assign.right.as_ref() {
            AnnCast::Name(name) => name,
            AnnCast::Var(var) => match var.val.as_ref() {
                AnnCast::Name(name) => name,
                other => {
                    return Err(PipelineError::invariant(
                        format!("assignment source of kind {}", other.kind_name()),
                        other.source_ref().cloned(),
                    ))
                }
            },
            other => {
                return Err(PipelineError::invariant(
                    format!("assignment source of kind {}", other.kind_name()),
                    other.source_ref().cloned(),
                ))
            }
        };

        // A copy is an identity network: one input passed through to one
        // output.
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Expression));
        pf.add_port(PortTable::Opi, GrometPort::new(1));
        pf.add_port(PortTable::Opo, GrometPort::new(1));
        pf.add_wire(WireTable::Wopio, GrometWire::connected(1, 1));
        let idx = self.gromet.add_fn(pf);

        let bf_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::new(FunctionType::Expression).with_body(idx),
        );
        let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(bf_idx));
        if expression_context(f) {
            let opi_pos = find_or_create_opi(f, &source.name);
            f.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, opi_pos));
        } else if !self.wire_from_var_env(&source.name, f) {
            return Err(PipelineError::unresolved(
                source.name.clone(),
                source.source_refs.first().cloned(),
            ));
        }

        if let Some(targets) = tuple_elements(&assign.left) {
            let producer = f.add_port(PortTable::Pof, GrometPort::new(bf_idx));
            return self.create_unpack(targets, Some(producer), f, parent);
        }
        let name = get_left_side_name(&assign.left)?;
        let pos = f.add_port(PortTable::Pof, GrometPort::named(&name, bf_idx));
        self.add_var_to_env(&name, pos, parent);
        Ok(())
    }

    // ── Literal right sides ──────────────────────────────────────────────

    fn assign_from_tuple(
        &mut self,
        assign: &AnnCastAssignment,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let Some(elems) = tuple_elements(&assign.right) else {
            return Err(PipelineError::invariant(
                "tuple assignment without elements",
                assign.source_refs.first().cloned(),
            ));
        };

        let mut positions = Vec::with_capacity(elems.len());
        for elem in elems {
            match elem {
                AnnCast::LiteralValue(_) => {
                    let mut pf = GrometFN::default();
                    pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Expression));
                    self.visit(elem, &mut pf, Parent::Assignment)?;
                    let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
                    let tgt = last_pof(&pf);
                    add_wfopo(&mut pf, opo_pos, tgt);
                    let idx = self.gromet.add_fn(pf);

                    let metadata = self.source_ref_metadata(&assign.source_refs);
                    let bf_idx = f.add_box(
                        BoxTable::Bf,
                        GrometBoxFunction::new(FunctionType::Expression)
                            .with_body(idx)
                            .with_metadata(metadata),
                    );
                    positions.push(f.add_port(PortTable::Pof, GrometPort::new(bf_idx)));
                }
                AnnCast::Name(name) => {
                    let port = match self.env.resolve(&name.name) {
                        Some(Resolution::Local(entry)) => entry.port,
                        Some(Resolution::Arg(port)) | Some(Resolution::Global(port)) => port,
                        None => {
                            return Err(PipelineError::unresolved(
                                name.name.clone(),
                                name.source_refs.first().cloned(),
                            ))
                        }
                    };
                    positions.push(port);
                }
                other => {
                    return Err(PipelineError::structural(
                        format!("tuple element of kind {}", other.kind_name()),
                        other.source_ref().cloned(),
                    ))
                }
            }
        }

        if let Some(targets) = tuple_elements(&assign.left) {
            if targets.len() != positions.len() {
                return Err(PipelineError::structural(
                    "tuple assignment arity mismatch",
                    assign.source_refs.first().cloned(),
                ));
            }
            for (target, &pos) in targets.iter().zip(&positions) {
                let name = binding_name(target)?;
                f.pof[pos - 1].name = Some(name.clone());
                self.add_var_to_env(&name, pos, parent);
            }
            return Ok(());
        }
        self.create_pack(&positions, &assign.left, f, parent)
    }

    fn assign_from_literal(
        &mut self,
        assign: &AnnCastAssignment,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Expression));
        self.visit(&assign.right, &mut pf, Parent::Assignment)?;
        let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
        let tgt = last_pof(&pf);
        add_wfopo(&mut pf, opo_pos, tgt);
        let idx = self.gromet.add_fn(pf);

        let metadata = self.source_ref_metadata(&assign.source_refs);
        let bf_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::new(FunctionType::Expression)
                .with_body(idx)
                .with_metadata(metadata),
        );
        let name = get_left_side_name(&assign.left)?;
        let pos = f.add_port(PortTable::Pof, GrometPort::named(&name, bf_idx));
        if parent == Parent::Conditional {
            expose_through_branch(f);
        }
        self.add_var_to_env(&name, pos, parent);
        Ok(())
    }

    // ── Compound right sides ─────────────────────────────────────────────

    fn assign_general(
        &mut self,
        assign: &AnnCastAssignment,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let mut pf = GrometFN::default();
        pf.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Expression));
        self.visit(&assign.right, &mut pf, Parent::Assignment)?;
        let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
        let tgt = last_pof(&pf);
        add_wfopo(&mut pf, opo_pos, tgt);

        let named_opis: Vec<(usize, String)> = pf
            .opi
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.name.clone().map(|n| (i, n)))
            .collect();
        let idx = self.gromet.add_fn(pf);

        let metadata = self.source_ref_metadata(&assign.source_refs);
        let bf_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::new(FunctionType::Expression)
                .with_body(idx)
                .with_metadata(metadata),
        );

        // The free variables of the expression surface as inputs; their
        // working labels come off once the outer wiring is in place.
        for (i, name) in &named_opis {
            f.add_port(PortTable::Pif, GrometPort::new(bf_idx));
            if !self.wire_from_var_env(name, f) {
                return Err(PipelineError::unresolved(
                    name.clone(),
                    assign.source_refs.first().cloned(),
                ));
            }
            self.gromet.fn_mut(FnRef::Array(idx)).opi[*i].name = None;
        }

        if let AnnCast::Attribute(attr) = assign.left.as_ref() {
            let name = binding_name(&attr.attr)?;
            let pos = f.add_port(PortTable::Pof, GrometPort::named(&name, bf_idx));
            if parent == Parent::Conditional {
                expose_through_branch(f);
            }
            self.add_var_to_env(&name, pos, parent);
            return Ok(());
        }
        if let Some(targets) = tuple_elements(&assign.left) {
            let producer = f.add_port(PortTable::Pof, GrometPort::new(bf_idx));
            return self.create_unpack(targets, Some(producer), f, parent);
        }
        let name = get_left_side_name(&assign.left)?;
        let pos = f.add_port(PortTable::Pof, GrometPort::named(&name, bf_idx));
        if parent == Parent::Conditional {
            expose_through_branch(f);
        }
        self.add_var_to_env(&name, pos, parent);
        Ok(())
    }

    // ── Tuple plumbing ───────────────────────────────────────────────────

    /// Split one produced value into named outputs, one per target.
    fn create_unpack(
        &mut self,
        targets: &[AnnCast],
        producer: Option<usize>,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let unpack_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::named("unpack", FunctionType::Abstract),
        );
        let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(unpack_idx));
        add_wff(f, pif_pos, producer);
        self.unpack_collection_pofs(targets, f, unpack_idx, parent)
    }

    fn unpack_collection_pofs(
        &mut self,
        targets: &[AnnCast],
        f: &mut GrometFN,
        unpack_idx: usize,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        for target in targets {
            if let Some(inner) = tuple_elements(target) {
                self.unpack_collection_pofs(inner, f, unpack_idx, parent)?;
                continue;
            }
            let name = binding_name(target)?;
            let metadata = self.node_metadata(target);
            let pos = f.add_port(
                PortTable::Pof,
                GrometPort::named(&name, unpack_idx).with_metadata(metadata),
            );
            self.add_var_to_env(&name, pos, parent);
        }
        Ok(())
    }

    /// Gather already-produced values into one named output.
    fn create_pack(
        &mut self,
        positions: &[usize],
        left: &AnnCast,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let pack_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::named("pack", FunctionType::Abstract),
        );
        for &pos in positions {
            let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(pack_idx));
            f.add_wire(WireTable::Wff, GrometWire::connected(pif_pos, pos));
        }
        let name = get_left_side_name(left)?;
        let pos = f.add_port(PortTable::Pof, GrometPort::named(&name, pack_idx));
        self.add_var_to_env(&name, pos, parent);
        Ok(())
    }
}

/// The variable name an assignment target binds.
fn get_left_side_name(left: &AnnCast) -> Result<String, PipelineError> {
    match left {
        AnnCast::Var(var) => binding_name(&var.val),
        AnnCast::Attribute(attr) => binding_name(&attr.attr),
        AnnCast::Name(name) => Ok(name.name.clone()),
        other => Err(PipelineError::invariant(
            format!("assignment target of kind {}", other.kind_name()),
            other.source_ref().cloned(),
        )),
    }
}

/// The name a binding site refers to, looking through wrappers.
fn binding_name(node: &AnnCast) -> Result<String, PipelineError> {
    match node {
        AnnCast::Name(name) => Ok(name.name.clone()),
        AnnCast::Var(var) => binding_name(&var.val),
        AnnCast::Call(call) => binding_name(&call.func),
        AnnCast::Attribute(attr) => binding_name(&attr.attr),
        other => Err(PipelineError::invariant(
            format!("binding of kind {}", other.kind_name()),
            other.source_ref().cloned(),
        )),
    }
}

/// The callee name, when the call target is a plain name.
fn call_name(call: &gromet_anncast::AnnCastCall) -> Option<&str> {
    match call.func.as_ref() {
        AnnCast::Name(name) => Some(&name.name),
        AnnCast::Attribute(attr) => match attr.attr.as_ref() {
            AnnCast::Name(name) => Some(&name.name),
            _ => None,
        },
        _ => None,
    }
}

/// An assignment sitting directly in a branch exposes its value through the
/// branch boundary with a pass-through port pair.
fn expose_through_branch(f: &mut GrometFN) {
    let box_id = f.b.len();
    f.add_port(PortTable::Opi, GrometPort::new(box_id));
    let opo_pos = f.add_port(PortTable::Opo, GrometPort::new(box_id));
    let tgt = last_pof(f);
    add_wfopo(f, opo_pos, tgt);
}
