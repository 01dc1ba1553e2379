//! Call lowering.
//!
//! A call becomes an inner box whose inputs are wired from the lowered
//! arguments. What kind of box depends on the callee: user definitions get
//! a body pointing at their network (a placeholder network for forward
//! references), record names get their constructor network, builtins and
//! imported names get typed boxes with no body, and primitives collapse to
//! `LANGUAGE_PRIMITIVE` boxes or a synthesized expression network.

use gromet_anncast::{AnnCastAssignment, AnnCastCall};
use gromet_fn::{FnLiteralValue, ImportType};

use super::*;

/// How a callee box should be typed, derived from the callee name and
/// where it came from.
pub(super) struct FuncInfo {
    function_type: FunctionType,
    import_type: Option<ImportType>,
    import_version: Option<String>,
    import_source: Option<String>,
    source_language: Option<String>,
    source_language_version: Option<String>,
}

impl FuncInfo {
    fn plain(function_type: FunctionType) -> Self {
        FuncInfo {
            function_type,
            import_type: None,
            import_version: None,
            import_source: None,
            source_language: None,
            source_language_version: None,
        }
    }

    /// Materialize a named box carrying this typing.
    pub(super) fn boxed(self, name: impl Into<String>) -> GrometBoxFunction {
        GrometBoxFunction {
            name: Some(name.into()),
            function_type: self.function_type,
            import_type: self.import_type,
            import_version: self.import_version,
            import_source: self.import_source,
            source_language: self.source_language,
            source_language_version: self.source_language_version,
            body: None,
            value: None,
            metadata: None,
        }
    }
}

impl GrometLowering {
    pub(super) fn determine_func_type(
        &self,
        name: &str,
        attribute_base_imported: bool,
    ) -> FuncInfo {
        if primitives::is_primitive(name) {
            return FuncInfo::plain(FunctionType::Abstract);
        }
        let lang = Some(self.source_language.clone());
        let ver = Some(self.source_language_version.clone());
        let mut info = if primitives::is_builtin(name) {
            if attribute_base_imported {
                let mut info = FuncInfo::plain(FunctionType::Imported);
                info.import_type = Some(ImportType::Native);
                info
            } else {
                FuncInfo::plain(FunctionType::LanguagePrimitive)
            }
        } else if attribute_base_imported {
            let mut info = FuncInfo::plain(FunctionType::Imported);
            info.import_type = Some(ImportType::Other);
            info
        } else {
            // No definition anywhere in reach: an external method.
            let mut info = FuncInfo::plain(FunctionType::ImportedMethod);
            info.import_type = Some(ImportType::Other);
            info
        };
        info.source_language = lang;
        info.source_language_version = ver;
        info
    }

    /// Lower one call into `f`; returns the call box's position in `bf`.
    pub(super) fn visit_call(
        &mut self,
        call: &AnnCastCall,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<usize, PipelineError> {
        let from_assignment = parent == Parent::Assignment;

        if let AnnCast::Attribute(attr_func) = call.func.as_ref() {
            if let AnnCast::Name(attr_name) = attr_func.attr.as_ref() {
                if primitives::is_primitive(&attr_name.name) {
                    return self.handle_primitive(call, f, from_assignment);
                }
            }
            return self.visit_method_call(call, f);
        }

        let AnnCast::Name(func) = call.func.as_ref() else {
            return Err(PipelineError::invariant(
                format!("call target of kind {}", call.func.kind_name()),
                call.func.source_ref().cloned(),
            ));
        };
        let func_name = func.name.clone();
        let in_module = self.func_in_module(&func_name);

        if primitives::is_primitive(&func_name) && in_module.is_none() {
            let idx = self.handle_primitive(call, f, from_assignment)?;
            for arg in &call.arguments {
                if let AnnCast::Operator(op) = arg {
                    self.wire_binary_op_args(op, f);
                }
            }
            return Ok(idx);
        }

        let arg_positions = self.lower_call_arguments(call, f)?;

        let metadata = self.source_ref_metadata(&call.source_refs);
        let qualified =
            self.qualified_call_name(&func_name, &func.con_scope, call.invocation_index);
        let func_call_idx = if let Some(module) = in_module {
            let info = self.determine_func_type(&func_name, false);
            f.add_box(
                BoxTable::Bf,
                info.boxed(format!("{module}.{func_name}"))
                    .with_metadata(metadata),
            )
        } else if primitives::is_builtin(&func_name) {
            let info = self.determine_func_type(&func_name, false);
            f.add_box(BoxTable::Bf, info.boxed(&qualified).with_metadata(metadata))
        } else {
            let constructor = self
                .records
                .get(&func_name)
                .and_then(|methods| methods.get(&format!("new:{func_name}")))
                .copied();
            let body_idx = match constructor {
                Some(idx) => idx,
                None => self.find_or_placeholder_fn(&func_name),
            };
            f.add_box(
                BoxTable::Bf,
                GrometBoxFunction::named(&qualified, FunctionType::Function)
                    .with_body(body_idx)
                    .with_metadata(metadata),
            )
        };

        self.wire_call_arguments(call, f, func_call_idx, &func_name, &arg_positions)?;

        // A record construction also feeds the constructor's superclass
        // slot, which plain calls do not have.
        if self.records.contains_key(&func_name) {
            let lit_idx = f.add_box(
                BoxTable::Bf,
                GrometBoxFunction::literal(FnLiteralValue::new("None", serde_json::json!("None"))),
            );
            let lit_pof = f.add_port(PortTable::Pof, GrometPort::new(lit_idx));
            let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(func_call_idx));
            f.add_wire(WireTable::Wff, GrometWire::connected(pif_pos, lit_pof));
        }

        Ok(func_call_idx)
    }

    /// Lower a call whose target is an attribute: a method on a record
    /// instance, an imported module's function, or an unknown external
    /// member. The attribute visit decides which box anchors the call.
    fn visit_method_call(
        &mut self,
        call: &AnnCastCall,
        f: &mut GrometFN,
    ) -> Result<usize, PipelineError> {
        let bf_before = f.bf.len();
        self.visit(call.func.as_ref(), f, Parent::Call)?;
        if f.bf.len() == bf_before {
            // Nothing anchored the call; give the arguments a box to land on.
            f.add_box(BoxTable::Bf, GrometBoxFunction::new(FunctionType::Function));
        }
        let func_call_idx = f.bf.len();

        let mut arg_positions = Vec::with_capacity(call.arguments.len());
        for arg in &call.arguments {
            match arg {
                AnnCast::Call(inner) => {
                    let idx = self.visit_call(inner, f, Parent::Call)?;
                    let pos = f.add_port(PortTable::Pof, GrometPort::new(idx));
                    arg_positions.push(Some(pos));
                }
                AnnCast::Name(_) => arg_positions.push(None),
                _ => {
                    self.visit(arg, f, Parent::Call)?;
                    arg_positions.push(last_pof(f));
                }
            }
        }

        for (arg, recorded) in call.arguments.iter().zip(arg_positions) {
            let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(func_call_idx));
            match arg {
                AnnCast::Name(name) => {
                    if expression_context(f) {
                        let opi_pos = find_or_create_opi(f, &name.name);
                        f.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, opi_pos));
                    } else if !self.wire_from_var_env(&name.name, f) {
                        return Err(PipelineError::unresolved(
                            name.name.clone(),
                            name.source_refs.first().cloned(),
                        ));
                    }
                }
                _ => add_wff(f, pif_pos, recorded),
            }
        }

        // The method's result port.
        f.add_port(PortTable::Pof, GrometPort::new(func_call_idx));
        Ok(func_call_idx)
    }

    /// First argument sweep: lower each argument and record the output-port
    /// position its value will flow from, where one is known in advance.
    fn lower_call_arguments(
        &mut self,
        call: &AnnCastCall,
        f: &mut GrometFN,
    ) -> Result<Vec<Option<usize>>, PipelineError> {
        let mut positions = Vec::with_capacity(call.arguments.len());
        for arg in &call.arguments {
            match arg {
                AnnCast::Call(inner) => {
                    let idx = self.visit_call(inner, f, Parent::Call)?;
                    let pos = f.add_port(PortTable::Pof, GrometPort::new(idx));
                    positions.push(Some(pos));
                }
                AnnCast::Assignment(kw) => positions.push(self.lower_keyword_value(kw, f)?),
                AnnCast::Name(_) => positions.push(None),
                _ => {
                    self.visit(arg, f, Parent::Call)?;
                    positions.push(last_pof(f));
                }
            }
        }
        Ok(positions)
    }

    /// The value side of a `name=value` argument.
    fn lower_keyword_value(
        &mut self,
        kw: &AnnCastAssignment,
        f: &mut GrometFN,
    ) -> Result<Option<usize>, PipelineError> {
        match kw.right.as_ref() {
            AnnCast::Name(name) => match self.env.resolve(&name.name) {
                Some(Resolution::Local(entry)) => Ok(Some(entry.port)),
                Some(Resolution::Arg(port)) | Some(Resolution::Global(port)) => Ok(Some(port)),
                None => Err(PipelineError::unresolved(
                    name.name.clone(),
                    name.source_refs.first().cloned(),
                )),
            },
            right if right.is_tuple_literal() => {
                let metadata = self.node_metadata(right);
                let bf_idx = f.add_box(
                    BoxTable::Bf,
                    GrometBoxFunction::new(FunctionType::Function).with_metadata(metadata),
                );
                Ok(Some(f.add_port(PortTable::Pof, GrometPort::new(bf_idx))))
            }
            right => {
                self.visit(right, f, Parent::Call)?;
                Ok(last_pof(f))
            }
        }
    }

    /// Second argument sweep: input ports on the call box, wired from
    /// wherever the first sweep left each value. A known callee gets one
    /// port per formal parameter so keyword arguments land on their
    /// parameter's port; otherwise one per supplied argument.
    fn wire_call_arguments(
        &mut self,
        call: &AnnCastCall,
        f: &mut GrometFN,
        func_call_idx: usize,
        func_name: &str,
        arg_positions: &[Option<usize>],
    ) -> Result<(), PipelineError> {
        let formals = self.functions.get(func_name).map_or(0, |p| p.len());
        let first_pif = f.pif.len();
        for _ in 0..formals.max(call.arguments.len()) {
            f.add_port(PortTable::Pif, GrometPort::new(func_call_idx));
        }
        for (i, arg) in call.arguments.iter().enumerate() {
            let pif_pos = first_pif + i + 1;
            match arg {
                AnnCast::Name(name) => {
                    if self.functions.contains_key(&name.name) {
                        // Passing a function by name: a literal carrying it.
                        let metadata = self.node_metadata(arg);
                        let lit_idx = f.add_box(
                            BoxTable::Bf,
                            GrometBoxFunction::literal(FnLiteralValue::new(
                                "Function",
                                serde_json::json!(name.name.clone()),
                            ))
                            .with_metadata(metadata),
                        );
                        let pos = f.add_port(PortTable::Pof, GrometPort::new(lit_idx));
                        f.add_wire(WireTable::Wff, GrometWire::connected(pif_pos, pos));
                    } else if expression_context(f) {
                        let opi_pos = find_or_create_opi(f, &name.name);
                        f.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, opi_pos));
                    } else if !self.wire_pif_from_env(&name.name, f, pif_pos) {
                        return Err(PipelineError::unresolved(
                            name.name.clone(),
                            name.source_refs.first().cloned(),
                        ));
                    }
                }
                arg if arg.is_tuple_literal() => {
                    if let AnnCast::LiteralValue(lit) = arg {
                        if let AnnLiteralPayload::Elements(elems) = &lit.value {
                            for elem in elems {
                                if let AnnCast::Name(name) = elem {
                                    if !self.wire_pif_from_env(&name.name, f, pif_pos) {
                                        return Err(PipelineError::unresolved(
                                            name.name.clone(),
                                            name.source_refs.first().cloned(),
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
                AnnCast::Assignment(kw) => {
                    let src = match self.functions.get(func_name) {
                        Some(params) => first_pif + self.keyword_position(kw, params, func_name)?,
                        None => pif_pos,
                    };
                    add_wff(f, src, arg_positions[i]);
                }
                _ => add_wff(f, pif_pos, arg_positions[i]),
            }
        }
        Ok(())
    }

    /// 1-based position of a keyword argument among the callee's formal
    /// parameters.
    fn keyword_position(
        &self,
        kw: &AnnCastAssignment,
        params: &[String],
        func_name: &str,
    ) -> Result<usize, PipelineError> {
        let AnnCast::Var(var) = kw.left.as_ref() else {
            return Err(PipelineError::invariant(
                format!("keyword argument binding of kind {}", kw.left.kind_name()),
                kw.left.source_ref().cloned(),
            ));
        };
        let AnnCast::Name(name) = var.val.as_ref() else {
            return Err(PipelineError::invariant(
                format!("keyword argument binding of kind {}", var.val.kind_name()),
                var.val.source_ref().cloned(),
            ));
        };
        match params.iter().position(|p| p == &name.name) {
            Some(pos) => Ok(pos + 1),
            None => Err(PipelineError::structural(
                format!(
                    "keyword argument {} not among the parameters of {}",
                    name.name, func_name
                ),
                kw.source_refs.first().cloned(),
            )),
        }
    }

    /// Lower a primitive call. Inline primitives (and any primitive not on
    /// an assignment right side) become a box in the current network;
    /// otherwise the primitive gets its own expression network and a call
    /// box referencing it.
    pub(super) fn handle_primitive(
        &mut self,
        call: &AnnCastCall,
        f: &mut GrometFN,
        from_assignment: bool,
    ) -> Result<usize, PipelineError> {
        let func_name = match call.func.as_ref() {
            AnnCast::Name(name) => name.name.clone(),
            AnnCast::Attribute(attr) => match attr.attr.as_ref() {
                AnnCast::Name(name) => name.name.clone(),
                other => {
                    return Err(PipelineError::invariant(
                        format!("attribute member of kind {}", other.kind_name()),
                        other.source_ref().cloned(),
                    ))
                }
            },
            other => {
                return Err(PipelineError::invariant(
                    format!("call target of kind {}", other.kind_name()),
                    other.source_ref().cloned(),
                ))
            }
        };

        if !from_assignment || primitives::is_inline(&func_name) {
            let metadata = self.source_ref_metadata(&call.source_refs);
            let bf_idx = f.add_box(
                BoxTable::Bf,
                GrometBoxFunction::named(&func_name, FunctionType::LanguagePrimitive)
                    .with_metadata(metadata),
            );
            for arg in &call.arguments {
                self.visit(arg, f, Parent::Call)?;
                let pif_pos = f.add_port(PortTable::Pif, GrometPort::new(bf_idx));
                match arg_variable_name(arg) {
                    Some(name) => {
                        if expression_context(f) {
                            let opi_pos = find_or_create_opi(f, name);
                            f.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, opi_pos));
                        } else if !self.wire_from_var_env(name, f) {
                            return Err(PipelineError::unresolved(
                                name.to_string(),
                                arg.source_ref().cloned(),
                            ));
                        }
                    }
                    None => add_wff(f, pif_pos, last_pof(f)),
                }
            }
            for _ in 0..primitives::get_outputs(&func_name) {
                f.add_port(PortTable::Pof, GrometPort::new(bf_idx));
            }
            return Ok(bf_idx);
        }

        // Standalone: the primitive gets its own expression network.
        let inner_idx = self.gromet.add_fn(GrometFN::default());
        let metadata = self.source_ref_metadata(&call.source_refs);
        let mut pf = GrometFN::default();
        pf.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression).with_metadata(metadata),
        );
        let prim_idx = pf.add_box(
            BoxTable::Bf,
            GrometBoxFunction::named(&func_name, FunctionType::LanguagePrimitive),
        );
        let opo_pos = pf.add_port(PortTable::Opo, GrometPort::new(1));
        let prim_pof = pf.add_port(PortTable::Pof, GrometPort::new(prim_idx));
        pf.add_wire(WireTable::Wfopo, GrometWire::connected(opo_pos, prim_pof));

        let mut opi_names = Vec::new();
        for arg in &call.arguments {
            match arg {
                AnnCast::Call(inner) => {
                    let idx = self.visit_call(inner, &mut pf, Parent::Call)?;
                    let pos = pf.add_port(PortTable::Pof, GrometPort::new(idx));
                    let pif_pos = pf.add_port(PortTable::Pif, GrometPort::new(prim_idx));
                    pf.add_wire(WireTable::Wff, GrometWire::connected(pif_pos, pos));
                }
                _ => match arg_variable_name(arg) {
                    Some(name) => {
                        let opi_pos = pf.add_port(PortTable::Opi, GrometPort::named(name, 1));
                        opi_names.push(name.to_string());
                        let pif_pos = pf.add_port(PortTable::Pif, GrometPort::new(prim_idx));
                        pf.add_wire(WireTable::Wfopi, GrometWire::connected(pif_pos, opi_pos));
                    }
                    None => {
                        self.visit(arg, &mut pf, Parent::Call)?;
                        let pif_pos = pf.add_port(PortTable::Pif, GrometPort::new(prim_idx));
                        let tgt = last_pof(&pf);
                        add_wff(&mut pf, pif_pos, tgt);
                    }
                },
            }
        }
        *self.gromet.fn_mut(FnRef::Array(inner_idx)) = pf;

        let metadata = self.source_ref_metadata(&call.source_refs);
        let call_idx = f.add_box(
            BoxTable::Bf,
            GrometBoxFunction::new(FunctionType::Expression)
                .with_body(inner_idx)
                .with_metadata(metadata),
        );
        for name in &opi_names {
            f.add_port(PortTable::Pif, GrometPort::new(call_idx));
            if !self.wire_from_var_env(name, f) {
                return Err(PipelineError::unresolved(
                    name.clone(),
                    call.source_refs.first().cloned(),
                ));
            }
        }
        Ok(call_idx)
    }
}

/// The variable name an argument reads, when it is a plain read.
fn arg_variable_name(arg: &AnnCast) -> Option<&str> {
    match arg {
        AnnCast::Name(name) => Some(&name.name),
        AnnCast::Var(var) => match var.val.as_ref() {
            AnnCast::Name(name) => Some(&name.name),
            _ => None,
        },
        _ => None,
    }
}
