//! Variable environment with frame stacks.
//!
//! The lowering pass tracks where each live variable's current value is
//! produced: an output port position plus which structural level owns it.
//! Three partitions mirror the three ways a value enters scope. Globals are
//! one flat map for the module body. Arguments and locals are frame stacks
//! so that entering a container (function body, loop body, branch body)
//! pushes a frame and leaving pops it, restoring the enclosing bindings
//! without copying them.
//!
//! A frame is either isolated or inherited. Lookup searches from the
//! innermost frame outward and stops after the first isolated frame, so a
//! function body never sees the locals of whatever surrounded its
//! definition, while an expression frame inside that body still does.

use rustc_hash::FxHashMap;

/// Whether a frame's lookup falls through to the frames beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Lookup stops here; bindings beneath are invisible.
    Isolated,
    /// Lookup continues into enclosing frames.
    Inherited,
}

/// The structural level that produced a local binding's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarOwner {
    Function,
    Loop,
    Conditional,
}

/// A local binding: the owning level and the 1-based output-port position
/// holding the variable's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEntry {
    pub owner: VarOwner,
    pub port: usize,
}

/// Where a name resolved, with local bindings shadowing arguments and
/// arguments shadowing globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local(LocalEntry),
    Arg(usize),
    Global(usize),
}

struct Frame<T> {
    kind: FrameKind,
    vars: FxHashMap<String, T>,
}

impl<T> Frame<T> {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            vars: FxHashMap::default(),
        }
    }
}

fn lookup<'a, T>(frames: &'a [Frame<T>], name: &str) -> Option<&'a T> {
    for frame in frames.iter().rev() {
        if let Some(entry) = frame.vars.get(name) {
            return Some(entry);
        }
        if frame.kind == FrameKind::Isolated {
            break;
        }
    }
    None
}

/// The lowering pass's view of live variables.
pub struct VariableEnvironment {
    global: FxHashMap<String, usize>,
    args: Vec<Frame<usize>>,
    local: Vec<Frame<LocalEntry>>,
}

impl VariableEnvironment {
    /// A fresh environment: empty globals and one isolated base frame per
    /// stack.
    pub fn new() -> Self {
        VariableEnvironment {
            global: FxHashMap::default(),
            args: vec![Frame::new(FrameKind::Isolated)],
            local: vec![Frame::new(FrameKind::Isolated)],
        }
    }

    /// Drop all module-level bindings. Called once per compilation unit.
    pub fn reset_global(&mut self) {
        self.global.clear();
    }

    pub fn push_args(&mut self, kind: FrameKind) {
        self.args.push(Frame::new(kind));
    }

    /// Pop the top argument frame.
    ///
    /// # Panics
    ///
    /// Panics if called when only the base frame remains.
    pub fn pop_args(&mut self) {
        assert!(self.args.len() > 1, "cannot pop the base argument frame");
        self.args.pop();
    }

    pub fn push_local(&mut self, kind: FrameKind) {
        self.local.push(Frame::new(kind));
    }

    /// Pop the top local frame.
    ///
    /// # Panics
    ///
    /// Panics if called when only the base frame remains.
    pub fn pop_local(&mut self) {
        assert!(self.local.len() > 1, "cannot pop the base local frame");
        self.local.pop();
    }

    /// Bind a module-level variable to its output-port position.
    pub fn insert_global(&mut self, name: impl Into<String>, port: usize) {
        self.global.insert(name.into(), port);
    }

    /// Bind a formal parameter to its outer-input-port position in the
    /// current frame.
    pub fn insert_arg(&mut self, name: impl Into<String>, port: usize) {
        let frame = self.args.last_mut();
        debug_assert!(frame.is_some(), "argument stack never empty");
        if let Some(frame) = frame {
            frame.vars.insert(name.into(), port);
        }
    }

    /// Bind a local variable in the current frame.
    pub fn insert_local(&mut self, name: impl Into<String>, owner: VarOwner, port: usize) {
        let frame = self.local.last_mut();
        debug_assert!(frame.is_some(), "local stack never empty");
        if let Some(frame) = frame {
            frame.vars.insert(name.into(), LocalEntry { owner, port });
        }
    }

    /// Resolve a name, searching locals, then arguments, then globals.
    pub fn resolve(&self, name: &str) -> Option<Resolution> {
        if let Some(entry) = lookup(&self.local, name) {
            return Some(Resolution::Local(*entry));
        }
        if let Some(port) = lookup(&self.args, name) {
            return Some(Resolution::Arg(*port));
        }
        self.global.get(name).map(|port| Resolution::Global(*port))
    }

    /// Whether the name is bound in a visible local frame.
    pub fn is_local(&self, name: &str) -> bool {
        lookup(&self.local, name).is_some()
    }
}

impl Default for VariableEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
