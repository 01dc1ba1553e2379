//! Lowering from AnnCast to the GroMEt function-network model.
//!
//! This pass consumes the fully annotated tree (collapsed ids, container
//! scopes, versions, used-variable maps) and produces one [`GrometFNModule`].
//! Each container becomes a function network; expressions become inner boxes
//! wired port-to-port; variable flow is resolved through a
//! [`VariableEnvironment`] tracking which output port currently holds each
//! live variable.
//!
//! Networks under construction are local values. A network that must be
//! referable before it is finished (a function definition whose body may
//! call it) reserves its slot in the collection first, parks a named
//! placeholder there so lookups resolve, and writes the finished network
//! back over the placeholder.

mod assign;
mod call;
mod control;
mod env;
mod expr;
mod primitives;
mod record;

use std::collections::BTreeMap;
use std::path::Path;

use gromet_anncast::{
    AnnCast, AnnCastFunctionDef, AnnCastModelImport, AnnCastModule, AnnLiteralPayload,
    PipelineState,
};
use gromet_common::{PipelineError, SourceRef};
use gromet_fn::{
    BoxTable, CodeFileReference, FnRef, FunctionType, GrometBoxFunction, GrometFN,
    GrometFNModule, GrometPort, GrometWire, Metadata, PortTable, Provenance, WireTable,
};
use rustc_hash::FxHashMap;

use crate::PipelineOptions;
use env::{FrameKind, Resolution, VarOwner, VariableEnvironment};

/// Run the lowering over the pipeline state, storing the produced module in
/// `state.gromet_module`.
pub fn run(state: &mut PipelineState, options: &PipelineOptions) -> Result<(), PipelineError> {
    let mut lowering = GrometLowering::new(options);
    for node in &state.nodes {
        match node {
            AnnCast::Module(module) => lowering.visit_module(module)?,
            other => {
                return Err(PipelineError::invariant(
                    format!("top-level node of kind {}", other.kind_name()),
                    other.source_ref().cloned(),
                ))
            }
        }
    }
    state.gromet_module = Some(lowering.gromet);
    Ok(())
}

/// The syntactic position a node is visited from. Visitors branch on this
/// instead of inspecting the node stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Module,
    FunctionDef,
    Loop,
    Conditional,
    Assignment,
    Return,
    Call,
    Operator,
    Attribute,
}

/// What one `from <module> import …` family of statements accumulated.
#[derive(Debug, Default)]
struct ImportEntry {
    alias: Option<String>,
    symbols: Vec<String>,
    wildcard: bool,
}

struct GrometLowering {
    gromet: GrometFNModule,
    env: VariableEnvironment,
    /// Module-level function name → formal parameter names in order, for
    /// positioning keyword arguments at call sites.
    functions: FxHashMap<String, Vec<String>>,
    /// Record name → method name → FN-collection index. Constructors are
    /// registered under `new:<record>`.
    records: FxHashMap<String, FxHashMap<String, usize>>,
    /// Variable name → record name, for resolving method calls on record
    /// instances.
    initialized_records: FxHashMap<String, String>,
    /// Imported module → accumulated entry. Ordered so emitted boxes do not
    /// depend on hash order.
    import_collection: BTreeMap<String, ImportEntry>,
    code_file_uid: String,
    source_language: String,
    source_language_version: String,
}

impl GrometLowering {
    fn new(options: &PipelineOptions) -> Self {
        let path = Path::new(&options.file_name);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| options.file_name.clone());
        let module_name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        GrometLowering {
            gromet: GrometFNModule::new(module_name),
            env: VariableEnvironment::new(),
            functions: FxHashMap::default(),
            records: FxHashMap::default(),
            initialized_records: FxHashMap::default(),
            import_collection: BTreeMap::new(),
            code_file_uid: file_name,
            source_language: options.source_language.clone(),
            source_language_version: options.source_language_version.clone(),
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Visit one node into the network `f`. Only calls produce a value:
    /// their inner-box position, which callers use to attach result ports.
    fn visit(
        &mut self,
        node: &AnnCast,
        f: &mut GrometFN,
        parent: Parent,
    ) -> Result<Option<usize>, PipelineError> {
        match node {
            AnnCast::Module(module) => Err(PipelineError::invariant(
                "nested module",
                module.source_refs.first().cloned(),
            )),
            AnnCast::FunctionDef(def) => {
                self.visit_function_def(def, parent)?;
                Ok(None)
            }
            AnnCast::RecordDef(def) => {
                self.visit_record_def(def)?;
                Ok(None)
            }
            AnnCast::Assignment(assign) => {
                self.visit_assignment(assign, f, parent)?;
                Ok(None)
            }
            AnnCast::Call(call) => self.visit_call(call, f, parent).map(Some),
            AnnCast::Attribute(attr) => {
                self.visit_attribute(attr, f, parent)?;
                Ok(None)
            }
            AnnCast::Operator(op) => {
                self.visit_operator(op, f)?;
                Ok(None)
            }
            AnnCast::LiteralValue(lit) => {
                self.visit_literal_value(lit, f, parent)?;
                Ok(None)
            }
            AnnCast::Var(var) => self.visit(&var.val, f, parent),
            AnnCast::Name(_) => {
                if parent == Parent::Return {
                    let box_id = f.b.len();
                    f.add_port(PortTable::Opo, GrometPort::new(box_id));
                }
                Ok(None)
            }
            AnnCast::Loop(l) => {
                self.visit_loop(l, f)?;
                Ok(None)
            }
            AnnCast::ModelIf(cond) => {
                self.visit_model_if(cond, f, parent)?;
                Ok(None)
            }
            AnnCast::ModelReturn(ret) => {
                self.visit_model_return(ret, f)?;
                Ok(None)
            }
            AnnCast::ModelBreak(_) | AnnCast::ModelContinue(_) => Ok(None),
            AnnCast::ModelImport(imp) => {
                self.visit_model_import(imp, f);
                Ok(None)
            }
        }
    }

    // ── Module ───────────────────────────────────────────────────────────

    fn visit_module(&mut self, module: &AnnCastModule) -> Result<(), PipelineError> {
        self.env.reset_global();

        // Entry 1 of the side-table is reserved for record bookkeeping.
        self.gromet.metadata_collection.push(Vec::new());
        let collection = Metadata::SourceCodeCollection {
            provenance: Provenance::generate(),
            name: String::new(),
            global_reference_id: String::new(),
            files: vec![CodeFileReference {
                uid: self.code_file_uid.clone(),
                name: self.code_file_uid.clone(),
                path: String::new(),
            }],
        };
        let idx = self
            .gromet
            .insert_metadata(vec![collection, Metadata::creation()]);
        self.gromet.metadata = Some(idx);

        self.build_function_arguments(&module.body);

        let mut f = GrometFN::default();
        let metadata = self.source_ref_metadata(&module.source_refs);
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::named("module", FunctionType::Module).with_metadata(metadata),
        );
        for node in &module.body {
            self.visit(node, &mut f, Parent::Module)?;
        }
        self.gromet.module_fn = f;
        Ok(())
    }

    /// Record each module-level function's parameter names, in order, so
    /// call sites can position keyword arguments.
    fn build_function_arguments(&mut self, body: &[AnnCast]) {
        for node in body {
            if let AnnCast::FunctionDef(def) = node {
                let mut args = Vec::new();
                for arg in &def.func_args {
                    if let AnnCast::Var(var) = arg {
                        if let AnnCast::Name(name) = var.val.as_ref() {
                            args.push(name.name.clone());
                        }
                    }
                }
                self.functions.insert(def.name.name.clone(), args);
            }
        }
    }

    // ── Function definitions ─────────────────────────────────────────────

    fn visit_function_def(
        &mut self,
        def: &AnnCastFunctionDef,
        parent: Parent,
    ) -> Result<(), PipelineError> {
        let nested = parent == Parent::FunctionDef;
        let name = def.name.name.clone();

        let idx = match self.gromet.find_fn_by_name(&name) {
            Some(idx) => idx,
            None => self.gromet.add_fn(GrometFN::default()),
        };
        // Park a named placeholder so calls from inside the body (recursion)
        // resolve to this slot.
        let mut placeholder = GrometFN::default();
        placeholder.add_box(
            BoxTable::B,
            GrometBoxFunction::named(&name, FunctionType::Function),
        );
        *self.gromet.fn_mut(FnRef::Array(idx)) = placeholder;

        let metadata = self.source_ref_metadata(&def.source_refs);
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::named(&name, FunctionType::Function).with_metadata(metadata),
        );

        // A nested definition sees the enclosing function's bindings.
        let kind = if nested {
            FrameKind::Inherited
        } else {
            FrameKind::Isolated
        };
        self.env.push_args(kind);
        for arg in &def.func_args {
            let AnnCast::Var(var) = arg else {
                return Err(PipelineError::invariant(
                    format!("parameter of kind {}", arg.kind_name()),
                    arg.source_ref().cloned(),
                ));
            };
            let AnnCast::Name(arg_name) = var.val.as_ref() else {
                return Err(PipelineError::invariant(
                    format!("parameter binding of kind {}", var.val.kind_name()),
                    var.val.source_ref().cloned(),
                ));
            };
            let metadata = self.source_ref_metadata(&var.source_refs);
            let mut port = GrometPort::named(&arg_name.name, 1).with_metadata(metadata);
            if let Some(default) = &var.default_value {
                port.default_value = default_literal_value(default);
            }
            let pos = f.add_port(PortTable::Opi, port);
            self.env.insert_arg(&arg_name.name, pos);
        }

        self.lower_body(&mut f, &def.body, kind)?;
        self.env.pop_args();

        *self.gromet.fn_mut(FnRef::Array(idx)) = f;
        Ok(())
    }

    /// Lower a container body into `f` and wire its outer outputs.
    ///
    /// If the body ends in a return statement, the return value drives the
    /// outer outputs. Otherwise any named outer outputs (loop and branch
    /// bodies declare one per used variable) are wired from wherever the
    /// environment last saw the variable.
    fn lower_body(
        &mut self,
        f: &mut GrometFN,
        body: &[AnnCast],
        kind: FrameKind,
    ) -> Result<(), PipelineError> {
        self.env.push_local(kind);
        for node in body {
            self.visit(node, f, Parent::FunctionDef)?;
        }
        if let Some(AnnCast::ModelReturn(ret)) = body.last() {
            self.wire_return_node(&ret.value, f)?;
        } else if !f.opo.is_empty() {
            for i in 1..=f.opo.len() {
                let Some(name) = f.opo[i - 1].name.clone() else {
                    f.add_wire(WireTable::Wfopo, GrometWire::dangling_tgt(i));
                    continue;
                };
                match self.env.resolve(&name) {
                    Some(Resolution::Local(entry)) => {
                        let table = match entry.owner {
                            VarOwner::Loop => WireTable::Wlopo,
                            VarOwner::Conditional => WireTable::Wcopo,
                            VarOwner::Function => WireTable::Wfopo,
                        };
                        f.add_wire(table, GrometWire::connected(i, entry.port));
                    }
                    Some(Resolution::Arg(port)) => {
                        f.add_wire(WireTable::Wopio, GrometWire::connected(i, port));
                    }
                    Some(Resolution::Global(_)) | None => {
                        f.add_wire(WireTable::Wfopo, GrometWire::dangling_tgt(i));
                    }
                }
            }
        }
        self.env.pop_local();
        Ok(())
    }

    // ── Imports ──────────────────────────────────────────────────────────

    fn visit_model_import(&mut self, imp: &AnnCastModelImport, f: &mut GrometFN) {
        let entry = self.import_collection.entry(imp.name.clone()).or_default();
        if imp.alias.is_some() {
            entry.alias = imp.alias.clone();
        }
        if imp.all {
            entry.wildcard = true;
        }
        if let Some(symbol) = &imp.symbol {
            if !entry.symbols.contains(symbol) {
                entry.symbols.push(symbol.clone());
            }
            // An imported symbol becomes a value-producing box so later
            // reads have a port to wire from.
            let bf_idx = f.add_box(
                BoxTable::Bf,
                GrometBoxFunction::named(symbol, FunctionType::Expression),
            );
            let pos = f.add_port(PortTable::Pof, GrometPort::named(symbol, bf_idx));
            self.env.insert_global(symbol, pos);
        }
    }

    /// The module a name was imported from, if any. Wildcard imports do not
    /// claim names; an unlisted name stays unresolved rather than being
    /// attributed to an arbitrary module.
    fn func_in_module(&self, name: &str) -> Option<String> {
        self.import_collection.iter().find_map(|(module, entry)| {
            entry
                .symbols
                .iter()
                .any(|s| s == name)
                .then(|| module.clone())
        })
    }

    // ── Shared wiring ────────────────────────────────────────────────────

    /// Wire the most recently added `pif` from wherever the environment
    /// holds `name`. The wire table is chosen by the producer's level.
    /// Returns false when the name is not bound.
    fn wire_from_var_env(&self, name: &str, f: &mut GrometFN) -> bool {
        let src = f.pif.len();
        self.wire_pif_from_env(name, f, src)
    }

    /// Wire the `pif` at position `src` from wherever the environment holds
    /// `name`. Returns false when the name is not bound.
    fn wire_pif_from_env(&self, name: &str, f: &mut GrometFN, src: usize) -> bool {
        match self.env.resolve(name) {
            Some(Resolution::Local(entry)) => {
                let table = match entry.owner {
                    VarOwner::Loop => WireTable::Wlf,
                    VarOwner::Conditional => WireTable::Wcf,
                    VarOwner::Function => WireTable::Wff,
                };
                f.add_wire(table, GrometWire::connected(src, entry.port));
                true
            }
            Some(Resolution::Arg(port)) => {
                f.add_wire(WireTable::Wfopi, GrometWire::connected(src, port));
                true
            }
            Some(Resolution::Global(port)) => {
                f.add_wire(WireTable::Wff, GrometWire::connected(src, port));
                true
            }
            None => false,
        }
    }

    /// Bind a freshly produced variable port at the level `parent` implies.
    fn add_var_to_env(&mut self, name: &str, port: usize, parent: Parent) {
        match parent {
            Parent::Module => self.env.insert_global(name, port),
            Parent::FunctionDef => self.env.insert_local(name, VarOwner::Function, port),
            Parent::Loop => self.env.insert_local(name, VarOwner::Loop, port),
            Parent::Conditional => self.env.insert_local(name, VarOwner::Conditional, port),
            Parent::Assignment
            | Parent::Return
            | Parent::Call
            | Parent::Operator
            | Parent::Attribute => {}
        }
    }

    /// Find the network named `name`, creating a placeholder for forward
    /// references. Returns the 1-based collection index.
    fn find_or_placeholder_fn(&mut self, name: &str) -> usize {
        if let Some(idx) = self.gromet.find_fn_by_name(name) {
            return idx;
        }
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::named(name, FunctionType::Function),
        );
        self.gromet.add_fn(f)
    }

    /// The unique box name for one call site: the site's scope chain, the
    /// callee name, and the call's occurrence number.
    fn qualified_call_name(
        &self,
        func_name: &str,
        con_scope: &[String],
        invocation_index: u32,
    ) -> String {
        format!("{}.{}_{}", con_scope.join("."), func_name, invocation_index)
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    fn ref_record(&self, r: &SourceRef) -> Metadata {
        Metadata::SourceCodeReference {
            provenance: Provenance::generate(),
            code_file_reference_uid: self.code_file_uid.clone(),
            line_begin: r.row_start,
            line_end: r.row_end,
            col_begin: r.col_start,
            col_end: r.col_end,
        }
    }

    fn ref_metadata(&mut self, r: &SourceRef) -> usize {
        let record = self.ref_record(r);
        self.gromet.insert_metadata(vec![record])
    }

    fn source_ref_metadata(&mut self, refs: &[SourceRef]) -> Option<usize> {
        let r = refs.first()?.clone();
        Some(self.ref_metadata(&r))
    }

    fn node_metadata(&mut self, node: &AnnCast) -> Option<usize> {
        let r = node.source_ref()?.clone();
        Some(self.ref_metadata(&r))
    }
}

// ── Free helpers ─────────────────────────────────────────────────────────

/// Reuse an existing outer input port named `name`, or add one. Several
/// operands naming the same variable inside one expression network share a
/// single outer input.
fn find_or_create_opi(f: &mut GrometFN, name: &str) -> usize {
    if let Some(pos) = f.opi.iter().position(|p| p.name.as_deref() == Some(name)) {
        return pos + 1;
    }
    let box_id = f.b.len();
    f.add_port(PortTable::Opi, GrometPort::named(name, box_id))
}

/// Position of the most recently added function output port, if any.
fn last_pof(f: &GrometFN) -> Option<usize> {
    (!f.pof.is_empty()).then_some(f.pof.len())
}

/// Whether `f` is an expression or predicate network, where free variables
/// surface as outer inputs instead of resolving through the environment.
fn expression_context(f: &GrometFN) -> bool {
    f.b.first().is_some_and(|b| {
        matches!(
            b.function_type,
            FunctionType::Expression | FunctionType::Predicate
        )
    })
}

/// Add a box-to-box wire, dangling when the producer is absent.
fn add_wff(f: &mut GrometFN, src: usize, tgt: Option<usize>) {
    match tgt {
        Some(tgt) => f.add_wire(WireTable::Wff, GrometWire::connected(src, tgt)),
        None => f.add_wire(WireTable::Wff, GrometWire::dangling_tgt(src)),
    };
}

/// Add an output wire, dangling when the producer is absent.
fn add_wfopo(f: &mut GrometFN, src: usize, tgt: Option<usize>) {
    match tgt {
        Some(tgt) => f.add_wire(WireTable::Wfopo, GrometWire::connected(src, tgt)),
        None => f.add_wire(WireTable::Wfopo, GrometWire::dangling_tgt(src)),
    };
}

/// The elements of a tuple literal, if `node` is one.
fn tuple_elements(node: &AnnCast) -> Option<&[AnnCast]> {
    if let AnnCast::LiteralValue(lit) = node {
        if lit.value_type == gromet_cast::VALUE_TYPE_TUPLE {
            if let AnnLiteralPayload::Elements(elems) = &lit.value {
                return Some(elems);
            }
        }
    }
    None
}

/// The serializable default for a defaulted parameter: scalar literals
/// carry their value, anything computed carries none.
fn default_literal_value(node: &AnnCast) -> Option<serde_json::Value> {
    if let AnnCast::LiteralValue(lit) = node {
        if let AnnLiteralPayload::Scalar(value) = &lit.value {
            return Some(value.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opi_reuse_by_name() {
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::new(FunctionType::Expression),
        );
        let first = find_or_create_opi(&mut f, "x");
        let second = find_or_create_opi(&mut f, "x");
        let other = find_or_create_opi(&mut f, "y");
        assert_eq!((first, second, other), (1, 1, 2));
        assert_eq!(f.opi.len(), 2);
    }

    #[test]
    fn expression_context_looks_at_outer_box() {
        let mut f = GrometFN::default();
        assert!(!expression_context(&f));
        f.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Predicate));
        assert!(expression_context(&f));

        let mut g = GrometFN::default();
        g.add_box(BoxTable::B, GrometBoxFunction::new(FunctionType::Function));
        assert!(!expression_context(&g));
    }

    #[test]
    fn scalar_defaults_survive_computed_defaults_do_not() {
        use gromet_anncast::AnnCastLiteralValue;
        let scalar = AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Integer".to_string(),
            value: AnnLiteralPayload::Scalar(serde_json::json!(7)),
            source_code_data_type: None,
            source_refs: vec![],
        });
        assert_eq!(default_literal_value(&scalar), Some(serde_json::json!(7)));

        let tuple = AnnCast::LiteralValue(AnnCastLiteralValue {
            value_type: "Tuple".to_string(),
            value: AnnLiteralPayload::Elements(vec![]),
            source_code_data_type: None,
            source_refs: vec![],
        });
        assert_eq!(default_literal_value(&tuple), None);
    }

    #[test]
    fn import_symbols_resolve_to_their_module() {
        let options = PipelineOptions::new("prog.py");
        let mut lowering = GrometLowering::new(&options);
        let mut f = GrometFN::default();
        f.add_box(
            BoxTable::B,
            GrometBoxFunction::named("module", FunctionType::Module),
        );
        let imp = AnnCastModelImport {
            name: "math".to_string(),
            alias: None,
            symbol: Some("sqrt".to_string()),
            all: false,
            source_refs: vec![],
        };
        lowering.visit_model_import(&imp, &mut f);
        assert_eq!(lowering.func_in_module("sqrt"), Some("math".to_string()));
        assert_eq!(lowering.func_in_module("cos"), None);
        // The symbol gets a producing box and a named output port.
        assert_eq!(f.bf.len(), 1);
        assert_eq!(f.pof[0].name.as_deref(), Some("sqrt"));

        let wildcard = AnnCastModelImport {
            name: "os".to_string(),
            alias: None,
            symbol: None,
            all: true,
            source_refs: vec![],
        };
        lowering.visit_model_import(&wildcard, &mut f);
        // Wildcards never claim names.
        assert_eq!(lowering.func_in_module("path"), None);
    }

    #[test]
    fn module_and_file_names_derived_from_path() {
        let options = PipelineOptions::new("dir/prog.py");
        let lowering = GrometLowering::new(&options);
        assert_eq!(lowering.gromet.name, "prog");
        assert_eq!(lowering.code_file_uid, "prog.py");
    }
}
