// crates/filtergraph-core/src/pad.rs
//
// Pad descriptors. Each pad is a value with four optional function-pointer
// callback slots rather than a trait object — most pads only ever need one
// or two of the four hooks, and a plain struct keeps that cheap to express.

use crate::error::GraphResult;
use crate::frame::{Frame, MediaType};
use crate::graph::Graph;
use crate::ids::LinkId;

pub type ConfigPropsFn = fn(&mut Graph, LinkId) -> GraphResult<()>;
pub type RequestFrameFn = fn(&mut Graph, LinkId) -> GraphResult<()>;
pub type FilterFrameFn = fn(&mut Graph, LinkId, Frame) -> GraphResult<()>;

/// `poll_frame`'s no-hook-declared sentinel, kept distinct from `GraphError`
/// so it can never collide with a real error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of frames currently buffered and ready without blocking.
    Available(u32),
    Unknown,
}

pub type PollFrameFn = fn(&mut Graph, LinkId) -> GraphResult<PollOutcome>;

#[derive(Clone)]
pub struct PadDescriptor {
    pub name: String,
    pub media_type: MediaType,
    pub config_props: Option<ConfigPropsFn>,
    pub request_frame: Option<RequestFrameFn>,
    pub filter_frame: Option<FilterFrameFn>,
    pub poll_frame: Option<PollFrameFn>,
    pub needs_writable: bool,
    /// True for pads (e.g. a scaler's input) that legitimately reformat their
    /// input, so `filter_frame`'s format-consistency assertion should not
    /// fire. Replaces a name check against `"scale"` (open question).
    pub accepts_reformat: bool,
}

impl PadDescriptor {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            name: name.into(),
            media_type,
            config_props: None,
            request_frame: None,
            filter_frame: None,
            poll_frame: None,
            needs_writable: false,
            accepts_reformat: false,
        }
    }

    pub fn with_config_props(mut self, f: ConfigPropsFn) -> Self {
        self.config_props = Some(f);
        self
    }

    pub fn with_request_frame(mut self, f: RequestFrameFn) -> Self {
        self.request_frame = Some(f);
        self
    }

    pub fn with_filter_frame(mut self, f: FilterFrameFn) -> Self {
        self.filter_frame = Some(f);
        self
    }

    pub fn with_poll_frame(mut self, f: PollFrameFn) -> Self {
        self.poll_frame = Some(f);
        self
    }

    pub fn needs_writable(mut self, v: bool) -> Self {
        self.needs_writable = v;
        self
    }

    pub fn accepts_reformat(mut self, v: bool) -> Self {
        self.accepts_reformat = v;
        self
    }
}
