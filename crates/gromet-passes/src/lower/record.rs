//! Record definition lowering.
//!
//! A record becomes one constructor network (`new:Name`) plus one network
//! per method. The constructor materializes the record value with
//! `new_Record`, threads it through a `new_Field`/`set` pair per field
//! assigned in the initializer, and returns the final value. A bookkeeping
//! metadata record preserves the declared fields and methods.

use std::collections::BTreeMap;

use gromet_anncast::AnnCastRecordDef;
use gromet_fn::FnLiteralValue;

use super::*;

impl GrometLowering {
    pub(super) fn visit_record_def(&mut self, def: &AnnCastRecordDef) -> Result<(), PipelineError> {
        let record = def.name.clone();
        let mut methods: FxHashMap<String, usize> = FxHashMap::default();
        let mut fields: Vec<String> = Vec::new();

        let init = def.funcs.iter().find_map(|node| match node {
            AnnCast::FunctionDef(fd) if fd.name.name == "__init__" => Some(fd),
            _ => None,
        });

        let ctor = format!("new:{record}");
        let idx = self.constructor_fn(def, init, &ctor, &mut fields)?;
        methods.insert(ctor, idx);

        for node in &def.funcs {
            let AnnCast::FunctionDef(fd) = node else {
                continue;
            };
            if fd.name.name == "__init__" {
                continue;
            }
            let idx = self.method_fn(&record, fd)?;
            methods.insert(fd.name.name.clone(), idx);
        }

        // Declared fields outside the initializer count too.
        for field in &def.fields {
            if let Ok(name) = parameter_name(field) {
                if !fields.contains(&name) {
                    fields.push(name);
                }
            }
        }

        let mut field_declarations = BTreeMap::new();
        for field in &fields {
            field_declarations.insert(field.clone(), record.clone());
        }
        let mut method_declarations = Vec::new();
        if init.is_some() {
            method_declarations.push("__init__".to_string());
        }
        for node in &def.funcs {
            if let AnnCast::FunctionDef(fd) = node {
                if fd.name.name != "__init__" {
                    method_declarations.push(fd.name.name.clone());
                }
            }
        }
        self.gromet
            .insert_record_info(Metadata::ProgramAnalysisRecordBookkeeping {
                provenance: Provenance::generate(),
                type_name: record.clone(),
                field_declarations,
                method_declarations,
            });

        self.records.insert(record, methods);
        Ok(())
    }

    /// Build `new:Name`: inputs are the initializer's parameters (minus
    /// `self`) plus an `obj` slot for a superclass instance; the output is
    /// the constructed record.
    fn constructor_fn(
        &mut self,
        def: &AnnCastRecordDef,
        init: Option<&gromet_anncast::AnnCastFunctionDef>,
        ctor: &str,
        fields: &mut Vec<String>,
    ) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();
        let metadata = self.source_ref_metadata(&def.source_refs);
        pf.add_box(
            BoxTable::B,
            GrometBoxFunction::named(ctor, FunctionType::Function).with_metadata(metadata),
        );

        self.env.push_args(FrameKind::Isolated);
        self.env.push_local(FrameKind::Isolated);

        if let Some(init) = init {
            for arg in &init.func_args {
                let name = parameter_name(arg)?;
                if name == "self" {
                    continue;
                }
                let pos = pf.add_port(PortTable::Opi, GrometPort::named(&name, 1));
                self.env.insert_arg(&name, pos);
            }
        }
        let obj_pos = pf.add_port(PortTable::Opi, GrometPort::named("obj", 1));
        self.env.insert_arg("obj", obj_pos);
        pf.add_port(PortTable::Opo, GrometPort::new(1));

        // The record value comes out of new_Record, seeded with the type
        // name and the superclass slot.
        let lit_idx = pf.add_box(
            BoxTable::Bf,
            GrometBoxFunction::literal(FnLiteralValue::new(
                "string",
                serde_json::json!(def.name.clone()),
            )),
        );
        let name_pof = pf.add_port(PortTable::Pof, GrometPort::new(lit_idx));
        let new_record_idx = pf.add_box(
            BoxTable::Bf,
            GrometBoxFunction::named("new_Record", FunctionType::Abstract),
        );
        let pif = pf.add_port(PortTable::Pif, GrometPort::new(new_record_idx));
        pf.add_wire(WireTable::Wff, GrometWire::connected(pif, name_pof));
        let pif = pf.add_port(PortTable::Pif, GrometPort::new(new_record_idx));
        pf.add_wire(WireTable::Wfopi, GrometWire::connected(pif, obj_pos));
        for base in &def.bases {
            let Ok(base_name) = parameter_name(base) else {
                continue;
            };
            let b_idx = pf.add_box(
                BoxTable::Bf,
                GrometBoxFunction::literal(FnLiteralValue::new(
                    "string",
                    serde_json::json!(base_name),
                )),
            );
            let b_pof = pf.add_port(PortTable::Pof, GrometPort::new(b_idx));
            let pif = pf.add_port(PortTable::Pif, GrometPort::new(new_record_idx));
            pf.add_wire(WireTable::Wff, GrometWire::connected(pif, b_pof));
        }
        let mut record_pof = pf.add_port(PortTable::Pof, GrometPort::new(new_record_idx));

        // Each `self.x = value` in the initializer grows the record by one
        // field and sets it.
        if let Some(init) = init {
            for stmt in &init.body {
                let AnnCast::Assignment(assign) = stmt else {
                    continue;
                };
                let AnnCast::Attribute(attr) = assign.left.as_ref() else {
                    continue;
                };
                let AnnCast::Name(field) = attr.attr.as_ref() else {
                    continue;
                };
                fields.push(field.name.clone());

                let s_idx = pf.add_box(
                    BoxTable::Bf,
                    GrometBoxFunction::literal(FnLiteralValue::new(
                        "string",
                        serde_json::json!(field.name.clone()),
                    )),
                );
                let s_pof = pf.add_port(PortTable::Pof, GrometPort::new(s_idx));

                let nf_idx = pf.add_box(
                    BoxTable::Bf,
                    GrometBoxFunction::named("new_Field", FunctionType::Abstract),
                );
                let pif = pf.add_port(PortTable::Pif, GrometPort::new(nf_idx));
                pf.add_wire(WireTable::Wff, GrometWire::connected(pif, record_pof));
                let pif = pf.add_port(PortTable::Pif, GrometPort::new(nf_idx));
                pf.add_wire(WireTable::Wff, GrometWire::connected(pif, s_pof));
                let nf_pof = pf.add_port(PortTable::Pof, GrometPort::new(nf_idx));

                let set_idx = pf.add_box(
                    BoxTable::Bf,
                    GrometBoxFunction::named("set", FunctionType::Abstract),
                );
                let pif = pf.add_port(PortTable::Pif, GrometPort::new(set_idx));
                pf.add_wire(WireTable::Wff, GrometWire::connected(pif, nf_pof));
                let pif = pf.add_port(PortTable::Pif, GrometPort::new(set_idx));
                pf.add_wire(WireTable::Wff, GrometWire::connected(pif, s_pof));
                match assign.right.as_ref() {
                    AnnCast::Name(value) => {
                        let Some(opi_idx) = pf
                            .opi
                            .iter()
                            .position(|p| p.name.as_deref() == Some(&value.name))
                        else {
                            return Err(PipelineError::unresolved(
                                value.name.clone(),
                                value.source_refs.first().cloned(),
                            ));
                        };
                        let pif = pf.add_port(PortTable::Pif, GrometPort::new(set_idx));
                        pf.add_wire(WireTable::Wfopi, GrometWire::connected(pif, opi_idx + 1));
                    }
                    other => {
                        self.visit(other, &mut pf, Parent::FunctionDef)?;
                        let pif = pf.add_port(PortTable::Pif, GrometPort::new(set_idx));
                        let tgt = last_pof(&pf);
                        add_wff(&mut pf, pif, tgt);
                    }
                }
                record_pof = pf.add_port(PortTable::Pof, GrometPort::new(set_idx));
            }
        }
        pf.add_wire(
            WireTable::Wfopo,
            GrometWire::connected(pf.opo.len(), record_pof),
        );

        self.env.pop_local();
        self.env.pop_args();
        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }

    /// A method network keeps `self` as an ordinary first input.
    fn method_fn(
        &mut self,
        record: &str,
        fd: &gromet_anncast::AnnCastFunctionDef,
    ) -> Result<usize, PipelineError> {
        let idx = self.gromet.add_fn(GrometFN::default());
        let mut pf = GrometFN::default();
        let metadata = self.source_ref_metadata(&fd.source_refs);
        pf.add_box(
            BoxTable::B,
            GrometBoxFunction::named(format!("{record}:{}", fd.name.name), FunctionType::Function)
                .with_metadata(metadata),
        );

        self.env.push_args(FrameKind::Isolated);
        self.env.push_local(FrameKind::Isolated);
        for arg in &fd.func_args {
            let name = parameter_name(arg)?;
            let pos = pf.add_port(PortTable::Opi, GrometPort::named(&name, 1));
            self.env.insert_arg(&name, pos);
        }
        let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
        for stmt in &fd.body {
            self.visit(stmt, &mut pf, Parent::FunctionDef)?;
        }
        let tgt = last_pof(&pf);
        add_wfopo(&mut pf, opo_pos, tgt);
        self.env.pop_local();
        self.env.pop_args();

        *self.gromet.fn_mut(FnRef::Array(idx)) = pf;
        Ok(idx)
    }
}

/// The name of a parameter or declared field.
fn parameter_name(node: &AnnCast) -> Result<String, PipelineError> {
    match node {
        AnnCast::Var(var) => match var.val.as_ref() {
            AnnCast::Name(name) => Ok(name.name.clone()),
            other => Err(PipelineError::invariant(
                format!("parameter binding of kind {}", other.kind_name()),
                other.source_ref().cloned(),
            )),
        },
        AnnCast::Name(name) => Ok(name.name.clone()),
        other => Err(PipelineError::invariant(
            format!("parameter of kind {}", other.kind_name()),
            other.source_ref().cloned(),
        )),
    }
}
