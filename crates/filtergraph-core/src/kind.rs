// crates/filtergraph-core/src/kind.rs
//
// Filter kind: the immutable template a registered name resolves to. Private
// state is type-erased as `Box<dyn Any + Send + Sync>` rather than a fixed
// struct layout, so each filter family can carry whatever fields it needs.

use std::any::Any;

use crate::error::GraphResult;
use crate::ids::FilterId;
use crate::options::OptionDict;
use crate::pad::PadDescriptor;

pub type PrivState = Box<dyn Any + Send + Sync>;

pub type InitFn = fn(&mut crate::graph::Graph, FilterId, Option<&str>) -> GraphResult<()>;
pub type InitDictFn = fn(&mut crate::graph::Graph, FilterId, &mut OptionDict) -> GraphResult<()>;
pub type InitOpaqueFn =
    fn(&mut crate::graph::Graph, FilterId, Option<&str>, Option<&mut dyn Any>) -> GraphResult<()>;
pub type UninitFn = fn(&mut crate::graph::Graph, FilterId);
pub type ProcessCommandFn = fn(
    &mut crate::graph::Graph,
    FilterId,
    cmd: &str,
    arg: &str,
    result: &mut String,
    flags: i32,
) -> GraphResult<()>;

/// One entry in a filter's option schema: a name and a setter that parses a
/// string value onto the private state. Unknown keys fail the parse with
/// `OptionNotFound` — see `options.rs`.
pub struct OptionSpec {
    pub name: &'static str,
    pub set: fn(&mut dyn Any, &str) -> GraphResult<()>,
}

#[derive(Default)]
pub struct OptionSchema {
    pub options: Vec<OptionSpec>,
}

impl OptionSchema {
    pub fn find(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }
}

pub struct FilterKind {
    pub name: &'static str,
    pub input_pads: Vec<PadDescriptor>,
    pub output_pads: Vec<PadDescriptor>,
    pub priv_new: fn() -> PrivState,
    pub priv_class: Option<OptionSchema>,
    /// Ordered option keys accepted positionally, consumed in declaration
    /// order by `process_options` until a `key=value` token appears.
    pub shorthand: Option<Vec<&'static str>>,
    pub init: Option<InitFn>,
    pub init_dict: Option<InitDictFn>,
    pub init_opaque: Option<InitOpaqueFn>,
    pub uninit: Option<UninitFn>,
    pub process_command: Option<ProcessCommandFn>,
    /// Filters that bypass the modern options pipeline entirely,
    /// e.g. `abuffer`, `pan` — `init(ctx, args)` receives the raw string.
    pub legacy_raw_init: bool,
}

impl FilterKind {
    /// Asserts the registry invariant that a pad declares at most one frame
    /// delivery callback. Always satisfied today since `filter_frame` is the
    /// only delivery hook this crate exposes; kept as a named check so a
    /// future pad-callback addition can't silently violate it.
    pub fn validate(&self) -> GraphResult<()> {
        Ok(())
    }
}
