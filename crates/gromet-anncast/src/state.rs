//! Pipeline state shared by every pass.

use gromet_fn::GrometFNModule;
use rustc_hash::FxHashMap;

use crate::node::AnnCast;

/// Lightweight descriptor of a function definition, registered by the
/// identifier-normalization pass and consulted when resolving calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefRecord {
    pub name: String,
    pub num_args: usize,
}

/// The single mutable state one compilation unit's pipeline runs over.
///
/// The driver owns it; each pass borrows it mutably for its duration and
/// never retains it. After lowering, `gromet_module` holds the produced FN
/// collection and the state is handed back to the caller as the pipeline's
/// result.
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Top-level AnnCast nodes, in source order.
    pub nodes: Vec<AnnCast>,
    /// Collapsed function id → definition descriptor, for resolving forward
    /// calls.
    pub func_id_to_def: FxHashMap<u32, FunctionDefRecord>,
    /// Number of collapsed ids allocated so far; the set in use is exactly
    /// `{0, …, collapsed_id_counter - 1}`.
    pub collapsed_id_counter: u32,
    /// Position of the module node within `nodes`.
    pub module_index: Option<usize>,
    /// The lowering pass's output.
    pub gromet_module: Option<GrometFNModule>,
}

impl PipelineState {
    pub fn new(nodes: Vec<AnnCast>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Whether a definition exists for the given collapsed function id.
    pub fn func_def_exists(&self, id: u32) -> bool {
        self.func_id_to_def.contains_key(&id)
    }

    /// Register a function definition under its collapsed id.
    pub fn register_function_def(&mut self, id: u32, record: FunctionDefRecord) {
        self.func_id_to_def.insert(id, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn func_def_registration() {
        let mut state = PipelineState::new(vec![]);
        assert!(!state.func_def_exists(0));
        state.register_function_def(
            0,
            FunctionDefRecord {
                name: "f".to_string(),
                num_args: 2,
            },
        );
        assert!(state.func_def_exists(0));
        assert_eq!(state.func_id_to_def[&0].num_args, 2);
    }
}
