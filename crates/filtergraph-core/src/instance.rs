// crates/filtergraph-core/src/instance.rs
//
// A live filter node. Pad vectors are deep-copied from the kind so a filter
// can grow its own pad set at runtime (`insert_pad`); link slots mirror them
// 1:1 at all times (`|input_pads| == |inputs|`, same for outputs).

use std::sync::Arc;

use crate::command::CommandQueue;
use crate::ids::LinkId;
use crate::kind::{FilterKind, PrivState};
use crate::pad::PadDescriptor;

pub struct FilterInstance {
    pub kind: Arc<FilterKind>,
    pub name: String,
    pub input_pads: Vec<PadDescriptor>,
    pub output_pads: Vec<PadDescriptor>,
    pub inputs: Vec<Option<LinkId>>,
    pub outputs: Vec<Option<LinkId>>,
    pub priv_state: PrivState,
    pub commands: CommandQueue,
}

impl FilterInstance {
    /// Invariant check used by tests and after structural mutations
    /// (`link`, `insert_pad`).
    pub fn pads_consistent(&self) -> bool {
        self.input_pads.len() == self.inputs.len() && self.output_pads.len() == self.outputs.len()
    }
}
