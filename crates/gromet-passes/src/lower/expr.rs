//! Expression lowering: operators, literals, attribute access.

use gromet_anncast::{AnnCastAttribute, AnnCastLiteralValue, AnnCastOperator};
use gromet_fn::FnLiteralValue;

use super::*;

/// Where an operand's value comes from when wiring the operator box.
enum OperandSource {
    /// A variable, wired through the environment or an outer input.
    ByName(String),
    /// An already-produced output port, or nothing when the operand
    /// produced no port.
    ByPort(Option<usize>),
}

impl GrometLowering {
    /// Lower an operator application: one `LANGUAGE_PRIMITIVE` box with one
    /// input per operand and a single output. Operands are lowered first,
    /// left to right, so their ports exist before the operator's inputs are
    /// wired.
    pub(super) fn visit_operator(
        &mut self,
        op: &AnnCastOperator,
        f: &mut GrometFN,
    ) -> Result<(), PipelineError> {
        let mut sources = Vec::with_capacity(op.operands.len());
        for operand in &op.operands {
            let produced = self.visit(operand, f, Parent::Operator)?;
            let source = match operand {
                AnnCast::Name(name) => OperandSource::ByName(name.name.clone()),
                AnnCast::Var(var) => match var.val.as_ref() {
                    AnnCast::Name(name) => OperandSource::ByName(name.name.clone()),
                    _ => OperandSource::ByPort(last_pof(f)),
                },
                AnnCast::Call(_) => {
                    let Some(idx) = produced else {
                        return Err(PipelineError::invariant(
                            "call operand produced no box",
                            operand.source_ref().cloned(),
                        ));
                    };
                    let pos = f.add_port(PortTable::Pof, GrometPort::new(idx));
                    OperandSource::ByPort(Some(pos))
                }
                _ => OperandSource::ByPort(last_pof(f)),
            };
            sources.push(source);
        }

        let metadata = self.source_ref_metadata(&op.source_refs);
        let bf_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::named(&op.op, FunctionType::LanguagePrimitive)
                .with_metadata(metadata),
        );
        for source in sources {
            let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(bf_idx));
            match source {
                OperandSource::ByName(name) => {
                    if expression_context(f) {
                        let opi_pos = find_or_create_opi(f, &name);
                        f.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, opi_pos));
                    } else if !self.wire_from_var_env(&name, f) {
                        return Err(PipelineError::unresolved(
                            name,
                            op.source_refs.first().cloned(),
                        ));
                    }
                }
                OperandSource::ByPort(Some(pos)) => {
                    f.add_wire(WireTable::Wff, GrometWire::connected(pif_pos, pos));
                }
                OperandSource::ByPort(None) => {
                    f.add_wire(WireTable::Wff, GrometWire::dangling_tgt(pif_pos));
                }
            }
        }
        f.add_port(PortTable::Pof, GrometPort::new(bf_idx));
        Ok(())
    }

    /// Wire name operands of an operator argument onto the current last
    /// inner box. Used when a primitive call takes operator expressions as
    /// arguments; the operator boxes already exist, this adds the inputs
    /// feeding them from enclosing bindings.
    pub(super) fn wire_binary_op_args(&mut self, op: &AnnCastOperator, f: &mut GrometFN) {
        for operand in &op.operands {
            match operand {
                AnnCast::Name(name) => {
                    let box_id = f.bf.len();
                    let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(box_id));
                    match self.env.resolve(&name.name) {
                        Some(Resolution::Local(entry)) => {
                            let table = match entry.owner {
                                VarOwner::Loop => WireTable::Wlf,
                                VarOwner::Conditional => WireTable::Wcf,
                                VarOwner::Function => WireTable::Wff,
                            };
                            f.add_wire(table, GrometWire::connected(pif_pos, entry.port));
                        }
                        Some(Resolution::Arg(port)) => {
                            f.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, port));
                        }
                        Some(Resolution::Global(_)) | None => {}
                    }
                }
                AnnCast::Operator(inner) => self.wire_binary_op_args(inner, f),
                _ => {}
            }
        }
    }

    /// Lower a literal. Tuples flatten into their elements; every other
    /// literal becomes one `LITERAL` box with the payload attached and one
    /// output port.
    pub(super) fn visit_literal_value(
        &mut self,
        lit: &AnnCastLiteralValue,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        if lit.value_type == gromet_cast::VALUE_TYPE_TUPLE {
            if let AnnLiteralPayload::Elements(elems) = &lit.value {
                for elem in elems {
                    self.visit(elem, f, parent)?;
                }
            }
            return Ok(());
        }

        let mut records = Vec::new();
        if let Some(dt) = &lit.source_code_data_type {
            if dt.len() >= 3 {
                records.push(Metadata::SourceCodeDataType {
                    provenance: Provenance::generate(),
                    source_language: dt[0].clone(),
                    source_language_version: dt[1].clone(),
                    data_type: dt[2].clone(),
                });
            }
        }
        if let Some(r) = lit.source_refs.first() {
            records.push(self.ref_record(r));
        }
        let metadata = if records.is_empty() {
            None
        } else {
            Some(self.gromet.insert_metadata(records))
        };

        let value = match &lit.value {
            AnnLiteralPayload::Scalar(serde_json::Value::Null) => serde_json::json!("None"),
            AnnLiteralPayload::Scalar(v) => v.clone(),
            // Sized and element lists carry structure, not a scalar payload.
            AnnLiteralPayload::Elements(_) | AnnLiteralPayload::Sized { .. } => {
                serde_json::Value::Null
            }
        };
        let bf_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::literal(FnLiteralValue::new(&lit.value_type, value))
                .with_metadata(metadata),
        );
        f.add_port(PortTable::Pof, GrometPort::new(bf_idx));
        Ok(())
    }

    /// Lower attribute access. The shape depends on what the base is: a
    /// member of an imported module, a field read on `self`, a method call
    /// on a record instance, or an unknown external member.
    pub(super) fn visit_attribute(
        &mut self,
        attr: &AnnCastAttribute,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let AnnCast::Name(attr_name) = attr.attr.as_ref() else {
            return Err(PipelineError::invariant(
                format!("attribute member of kind {}", attr.attr.kind_name()),
                attr.attr.source_ref().cloned(),
            ));
        };
        let member = attr_name.name.clone();

        match attr.value.as_ref() {
            AnnCast::Name(value_name) => {
                let base = value_name.name.clone();
                if self.import_collection.contains_key(&base) {
                    let info = self.determine_func_type(&member, true);
                    let metadata = self.source_ref_metadata(&attr.source_refs);
                    f.add_box(
                        BoxTable::Bf,
                        info.boxed(format!("{base}.{member}")).with_metadata(metadata),
                    );
                } else if base == "self" {
                    // Field read: a string literal naming the field, fed to
                    // a get on the receiver (always the first outer input).
                    let lit_idx = f.add_box(
                        BoxTable::Bf,
                        GrometBoxFunction::literal(FnLiteralValue::new(
                            "string",
                            serde_json::json!(member),
                        )),
                    );
                    let lit_pof = f.add_port(PortTable::Pof, GrometPort::new(lit_idx));
                    let get_idx = f.add_box(
                        BoxTable::Bf,
                        GrometBoxFunction::named("get", FunctionType::Abstract),
                    );
                    let self_pif = f.add_port(PortTable::Pif, GrometPort::new(get_idx));
                    f.add_wire(WireTable::Wfopi, GrometWire::connected(self_pif, 1));
                    let field_pif = f.add_port(PortTable::Pif, GrometPort::new(get_idx));
                    f.add_wire(WireTable::Wff, GrometWire::connected(field_pif, lit_pof));
                    f.add_port(PortTable::Pof, GrometPort::new(get_idx));
                } else if parent == Parent::Call {
                    let method_idx = self
                        .initialized_records
                        .get(&base)
                        .and_then(|record| self.records.get(record))
                        .and_then(|methods| methods.get(&member))
                        .copied();
                    if let Some(idx) = method_idx {
                        let bf_idx = f.add_box(
                            BoxTable::Bf,
                            GrometBoxFunction::named(&member, FunctionType::Function)
                                .with_body(idx),
                        );
                        f.add_port(PortTable::Pif, GrometPort::named(&base, bf_idx));
                        if !self.wire_from_var_env(&base, f) {
                            return Err(PipelineError::unresolved(
                                base,
                                attr.source_refs.first().cloned(),
                            ));
                        }
                    } else {
                        let info = self.determine_func_type(&member, false);
                        f.add_box(BoxTable::Bf, info.boxed(format!("{base}.{member}")));
                    }
                }
                // A bare attribute read on an unknown base produces nothing.
            }
            AnnCast::Call(call) => {
                // Chained call: lower the producing call, then an anonymous
                // box standing for the member applied to its result.
                self.visit_call(call, f, Parent::Attribute)?;
                let metadata = self.source_ref_metadata(&attr.source_refs);
                f.add_box(
                    BoxTable::Bf,
                    GrometBoxFunction::new(FunctionType::Function).with_metadata(metadata),
                );
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gromet_anncast::{AnnCastModelImport, AnnCastName};

    fn lowering() -> GrometLowering {
        GrometLowering::new(&crate::PipelineOptions::new("prog.py"))
    }

    fn name(n: &str, id: u32) -> AnnCast {
        AnnCast::Name(AnnCastName::new(n, id, vec![]))
    }

    fn int_literal(v: i64) -> AnnCast {
        AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Integer".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::json!(v)),
            source_code_data_type: None,
            source_refs: vec![],
        })
    }

    #[test]
    fn operator_in_expression_network_shares_named_inputs() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression),
        );
        let op = AnnCastOperator {
            op: "ast.Add".to_string(),
            operands: vec![name("x", 0), name("x", 0)],
            source_refs: vec![],
        };
        lowering.visit_operator(&op, &mut f).unwrap();

        assert_eq!(f.bf.len(), 1);
        assert_eq!(f.bf[0].name.as_deref(), Some("ast.Add"));
        assert_eq!(f.bf[0].function_type, FunctionType::LanguagePrimitive);
        // Both operands share one outer input.
        assert_eq!(f.opi.len(), 1);
        assert_eq!(f.pif.len(), 2);
        assert_eq!(f.wfopi, vec![GrometWire::connected(1, 1), GrometWire::connected(2, 1)]);
        assert_eq!(f.pof.len(), 1);
    }

    #[test]
    fn operator_with_literal_operand_wires_its_port() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression),
        );
        let op = AnnCastOperator {
            op: "ast.Mult".to_string(),
            operands: vec![name("x", 0), int_literal(2)],
            source_refs: vec![],
        };
        lowering.visit_operator(&op, &mut f).unwrap();

        // Literal box plus operator box.
        assert_eq!(f.bf.len(), 2);
        // The literal's output feeds the operator's second input.
        assert_eq!(f.wff, vec![GrometWire::connected(2, 1)]);
        assert_eq!(f.pof.len(), 2);
    }

    #[test]
    fn operator_outside_expression_resolves_through_env() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        lowering.env.insert_local("x", VarOwner::Function, 3);
        let op = AnnCastOperator {
            op: "ast.USub".to_string(),
            operands: vec![name("x", 0)],
            source_refs: vec![],
        };
        lowering.visit_operator(&op, &mut f).unwrap();
        assert_eq!(f.wff, vec![GrometWire::connected(1, 3)]);

        let bad = AnnCastOperator {
            op: "ast.USub".to_string(),
            operands: vec![name("missing", 1)],
            source_refs: vec![],
        };
        let err = lowering.visit_operator(&bad, &mut f).unwrap_err();
        assert!(err.to_string().contains("unresolved variable reference"));
    }

    #[test]
    fn tuple_literal_flattens_into_elements() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression),
        );
        let lit = AnnCastLiteralValue {
            value_type: "Tuple".to_string(),
            value: AnnLiteralPayload::Elements(vec![int_literal(1), int_literal(2)]),
            source_code_data_type: None,
            source_refs: vec![],
        };
        lowering
            .visit_literal_value(&lit, &mut f, Parent::Assignment)
            .unwrap();
        assert_eq!(f.bf.len(), 2);
        assert_eq!(f.pof.len(), 2);
        assert!(f.bf.iter().all(|b| b.function_type == FunctionType::Literal));
    }

    #[test]
    fn null_literal_becomes_none_string() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression),
        );
        let lit = AnnCastLiteralValue {
            value_type: "None".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::Value::Null),
            source_code_data_type: None,
            source_refs: vec![],
        };
        lowering
            .visit_literal_value(&lit, &mut f, Parent::Assignment)
            .unwrap();
        let payload = f.bf[0].value.as_ref().unwrap();
        assert_eq!(payload.value, serde_json::json!("None"));
    }

    #[test]
    fn literal_data_type_metadata_precedes_source_ref() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression),
        );
        let lit = AnnCastLiteralValue {
            value_type: "Integer".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::json!(3)),
            source_code_data_type: Some(vec![
                "Python".to_string(),
                "3.10".to_string(),
                "int".to_string(),
            ]),
            source_refs: vec![gromet_common::SourceRef::new(1, 1, 5, 6)],
        };
        lowering
            .visit_literal_value(&lit, &mut f, Parent::Assignment)
            .unwrap();
        let idx = f.bf[0].metadata.unwrap();
        let records = &lowering.gromet.metadata_collection[idx - 1];
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], Metadata::SourceCodeDataType { .. }));
        assert!(matches!(records[1], Metadata::SourceCodeReference { .. }));
    }

    #[test]
    fn self_attribute_lowers_to_field_get() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        let attr = AnnCastAttribute {
            value: Box::new(name("self", 0)),
            attr: Box::new(name("count", 1)),
            source_refs: vec![],
        };
        lowering
            .visit_attribute(&attr, &mut f, Parent::Operator)
            .unwrap();

        assert_eq!(f.bf.len(), 2);
        assert_eq!(f.bf[0].function_type, FunctionType::Literal);
        assert_eq!(f.bf[1].name.as_deref(), Some("get"));
        assert_eq!(f.bf[1].function_type, FunctionType::Abstract);
        // Receiver comes from the first outer input; the field name from
        // the literal's output.
        assert_eq!(f.wfopi, vec![GrometWire::connected(1, 1)]);
        assert_eq!(f.wff, vec![GrometWire::connected(2, 1)]);
        assert_eq!(f.pof.len(), 2);
    }

    #[test]
    fn imported_module_member_becomes_named_box() {
        let mut lowering = lowering();
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::named("module", FunctionType::Module),
        );
        let imp = AnnCastModelImport {
            name: "math".to_string(),
            alias: None,
            symbol: None,
            all: false,
            source_refs: vec![],
        };
        lowering.visit_model_import(&imp, &mut f);

        let attr = AnnCastAttribute {
            value: Box::new(name("math", 0)),
            attr: Box::new(name("pi", 1)),
            source_refs: vec![],
        };
        lowering
            .visit_attribute(&attr, &mut f, Parent::Attribute)
            .unwrap();
        let bf = f.bf.last().unwrap();
        assert_eq!(bf.name.as_deref(), Some("math.pi"));
        assert_eq!(bf.function_type, FunctionType::Imported);
        // Member boxes carry no output port; call sites attach their own.
        assert!(f.pof.is_empty());
    }
}
