//! Function networks and the module-level collection.

use serde::{Deserialize, Serialize};

use crate::boxes::{GrometBoxConditional, GrometBoxFunction, GrometBoxLoop};
use crate::metadata::Metadata;
use crate::ports::{GrometPort, GrometWire};
use crate::{SCHEMA, SCHEMA_VERSION};

// ── Table selectors ──────────────────────────────────────────────────────

/// Selects one of the eight port tables of a [`GrometFN`].
///
/// The table is determined jointly by the owning box's structural role
/// (function-local, outer, conditional, loop) and the port's direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTable {
    /// Outer input ports.
    Opi,
    /// Outer output ports.
    Opo,
    /// Inner function input ports.
    Pif,
    /// Inner function output ports.
    Pof,
    /// Loop input ports.
    Pil,
    /// Loop output ports.
    Pol,
    /// Conditional input ports.
    Pic,
    /// Conditional output ports.
    Poc,
}

/// Selects one of the sixteen wire tables of a [`GrometFN`]. The kind of a
/// wire is the ordered pair of structural levels its endpoints live at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTable {
    /// Outer input directly to outer output (pass-through).
    Wopio,
    /// Function input from outer input.
    Wfopi,
    /// Loop input from function output.
    Wfl,
    /// Function input from function output (same level).
    Wff,
    /// Conditional input from function output.
    Wfc,
    /// Outer output from function output.
    Wfopo,
    /// Loop input from outer input.
    Wlopi,
    /// Loop input from loop output.
    Wll,
    /// Function input from loop output.
    Wlf,
    /// Loop input from conditional output.
    Wlc,
    /// Outer output from loop output.
    Wlopo,
    /// Conditional input from outer input.
    Wcopi,
    /// Conditional input from loop output.
    Wcl,
    /// Function input from conditional output.
    Wcf,
    /// Conditional input from conditional output.
    Wcc,
    /// Outer output from conditional output.
    Wcopo,
}

/// Selects one of the two function-box tables of a [`GrometFN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxTable {
    /// The outer box table (one entry in practice).
    B,
    /// Inner function boxes.
    Bf,
}

// ── GrometFN ─────────────────────────────────────────────────────────────

/// One function network: an outer box, its port tables, its inner boxes,
/// and its wire tables.
///
/// Every table is append-only and owned by the network (the per-FN arena);
/// use the `add_*` helpers so positional identities are computed correctly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GrometFN {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub b: Vec<GrometBoxFunction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opi: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opo: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wopio: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bf: Vec<GrometBoxFunction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pif: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pof: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wfopi: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wfl: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wff: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wfc: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wfopo: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bl: Vec<GrometBoxLoop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pil: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pol: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wlopi: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wll: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wlf: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wlc: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wlopo: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bc: Vec<GrometBoxConditional>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pic: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub poc: Vec<GrometPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wcopi: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wcl: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wcf: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wcc: Vec<GrometWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wcopo: Vec<GrometWire>,
    /// Index into the module's metadata side-table, for networks that carry
    /// their own metadata (predicate and branch-body networks do).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
}

impl GrometFN {
    /// Read access to a port table.
    pub fn ports(&self, table: PortTable) -> &Vec<GrometPort> {
        match table {
            PortTable::Opi => &self.opi,
            PortTable::Opo => &self.opo,
            PortTable::Pif => &self.pif,
            PortTable::Pof => &self.pof,
            PortTable::Pil => &self.pil,
            PortTable::Pol => &self.pol,
            PortTable::Pic => &self.pic,
            PortTable::Poc => &self.poc,
        }
    }

    fn ports_mut(&mut self, table: PortTable) -> &mut Vec<GrometPort> {
        match table {
            PortTable::Opi => &mut self.opi,
            PortTable::Opo => &mut self.opo,
            PortTable::Pif => &mut self.pif,
            PortTable::Pof => &mut self.pof,
            PortTable::Pil => &mut self.pil,
            PortTable::Pol => &mut self.pol,
            PortTable::Pic => &mut self.pic,
            PortTable::Poc => &mut self.poc,
        }
    }

    /// Read access to a wire table.
    pub fn wires(&self, table: WireTable) -> &Vec<GrometWire> {
        match table {
            WireTable::Wopio => &self.wopio,
            WireTable::Wfopi => &self.wfopi,
            WireTable::Wfl => &self.wfl,
            WireTable::Wff => &self.wff,
            WireTable::Wfc => &self.wfc,
            WireTable::Wfopo => &self.wfopo,
            WireTable::Wlopi => &self.wlopi,
            WireTable::Wll => &self.wll,
            WireTable::Wlf => &self.wlf,
            WireTable::Wlc => &self.wlc,
            WireTable::Wlopo => &self.wlopo,
            WireTable::Wcopi => &self.wcopi,
            WireTable::Wcl => &self.wcl,
            WireTable::Wcf => &self.wcf,
            WireTable::Wcc => &self.wcc,
            WireTable::Wcopo => &self.wcopo,
        }
    }

    fn wires_mut(&mut self, table: WireTable) -> &mut Vec<GrometWire> {
        match table {
            WireTable::Wopio => &mut self.wopio,
            WireTable::Wfopi => &mut self.wfopi,
            WireTable::Wfl => &mut self.wfl,
            WireTable::Wff => &mut self.wff,
            WireTable::Wfc => &mut self.wfc,
            WireTable::Wfopo => &mut self.wfopo,
            WireTable::Wlopi => &mut self.wlopi,
            WireTable::Wll => &mut self.wll,
            WireTable::Wlf => &mut self.wlf,
            WireTable::Wlc => &mut self.wlc,
            WireTable::Wlopo => &mut self.wlopo,
            WireTable::Wcopi => &mut self.wcopi,
            WireTable::Wcl => &mut self.wcl,
            WireTable::Wcf => &mut self.wcf,
            WireTable::Wcc => &mut self.wcc,
            WireTable::Wcopo => &mut self.wcopo,
        }
    }

    /// Read access to a function-box table.
    pub fn boxes(&self, table: BoxTable) -> &Vec<GrometBoxFunction> {
        match table {
            BoxTable::B => &self.b,
            BoxTable::Bf => &self.bf,
        }
    }

    /// Append a port. Its `id` is computed as one plus the number of ports
    /// already in the table belonging to the same box. Returns the port's
    /// 1-based table position, which is what wires reference.
    pub fn add_port(&mut self, table: PortTable, mut port: GrometPort) -> usize {
        let ports = self.ports_mut(table);
        port.id = Some(ports.iter().filter(|p| p.box_id == port.box_id).count() + 1);
        ports.push(port);
        ports.len()
    }

    /// Append a wire; returns its 1-based table position.
    pub fn add_wire(&mut self, table: WireTable, wire: GrometWire) -> usize {
        let wires = self.wires_mut(table);
        wires.push(wire);
        wires.len()
    }

    /// Append a function box; returns its 1-based table position.
    pub fn add_box(&mut self, table: BoxTable, bf: GrometBoxFunction) -> usize {
        let boxes = match table {
            BoxTable::B => &mut self.b,
            BoxTable::Bf => &mut self.bf,
        };
        boxes.push(bf);
        boxes.len()
    }

    /// Append a loop box; returns its 1-based position in `bl`.
    pub fn add_loop(&mut self, bl: GrometBoxLoop) -> usize {
        self.bl.push(bl);
        self.bl.len()
    }

    /// Append a conditional box; returns its 1-based position in `bc`.
    pub fn add_conditional(&mut self, bc: GrometBoxConditional) -> usize {
        self.bc.push(bc);
        self.bc.len()
    }
}

// ── GrometFNModule ───────────────────────────────────────────────────────

/// Handle to one function network inside a [`GrometFNModule`]: either the
/// distinguished module network or a 1-based position in `fn_array`.
///
/// Handles are only ever constructed from [`GrometFNModule::add_fn`] return
/// values (or [`FnRef::Module`]), so resolution cannot go out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnRef {
    Module,
    Array(usize),
}

/// The output of lowering one compilation unit: the module network, the
/// ordered FN collection, and the metadata side-table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrometFNModule {
    pub schema: String,
    pub schema_version: String,
    pub name: String,
    #[serde(rename = "fn")]
    pub module_fn: GrometFN,
    pub fn_array: Vec<GrometFN>,
    pub metadata_collection: Vec<Vec<Metadata>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
}

impl GrometFNModule {
    /// An empty module with the schema fields stamped.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: SCHEMA.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            name: name.into(),
            module_fn: GrometFN::default(),
            fn_array: Vec::new(),
            metadata_collection: Vec::new(),
            metadata: None,
        }
    }

    /// Append a network to the collection; returns its 1-based index, the
    /// value box `body` fields refer to.
    pub fn add_fn(&mut self, f: GrometFN) -> usize {
        self.fn_array.push(f);
        self.fn_array.len()
    }

    /// Resolve a handle immutably.
    pub fn fn_ref(&self, r: FnRef) -> &GrometFN {
        match r {
            FnRef::Module => &self.module_fn,
            FnRef::Array(idx) => &self.fn_array[idx - 1],
        }
    }

    /// Resolve a handle mutably.
    pub fn fn_mut(&mut self, r: FnRef) -> &mut GrometFN {
        match r {
            FnRef::Module => &mut self.module_fn,
            FnRef::Array(idx) => &mut self.fn_array[idx - 1],
        }
    }

    /// Find the network whose outer box carries the given name. Returns its
    /// 1-based collection index. Used to resolve calls to user-defined
    /// functions, including placeholders created for forward references.
    pub fn find_fn_by_name(&self, name: &str) -> Option<usize> {
        self.fn_array
            .iter()
            .position(|f| {
                f.b.first()
                    .is_some_and(|b| b.name.as_deref() == Some(name))
            })
            .map(|idx| idx + 1)
    }

    /// Append one metadata entry (a list of records) to the side-table and
    /// return its 1-based index, which boxes/ports store.
    pub fn insert_metadata(&mut self, records: Vec<Metadata>) -> usize {
        self.metadata_collection.push(records);
        self.metadata_collection.len()
    }

    /// Record bookkeeping metadata lives in the reserved first entry of the
    /// side-table.
    pub fn insert_record_info(&mut self, record: Metadata) {
        if self.metadata_collection.is_empty() {
            self.metadata_collection.push(Vec::new());
        }
        self.metadata_collection[0].push(record);
    }
}
