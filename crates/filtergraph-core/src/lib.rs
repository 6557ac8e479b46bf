// crates/filtergraph-core/src/lib.rs
//
// A media filter graph runtime: filter kinds are registered once, instances
// are allocated into a graph and linked pad-to-pad, the graph is configured
// (format negotiation is a collaborator's job, not this crate's), and frames
// are pulled and pushed across links at the embedder's pace. No thread, no
// scheduler, no concrete filter implementations of its own.

pub mod command;
pub mod configure;
pub mod engine;
pub mod error;
pub mod frame;
pub mod graph;
pub mod ids;
pub mod instance;
pub mod kind;
pub mod options;
pub mod pad;
pub mod registry;

pub use command::{CommandQueue, FilterCommand};
pub use configure::{configure_links, ConfigureOutcome};
pub use engine::{
    filter_frame, flush_partial_audio, poll_frame, process_command, process_commands_due, queue_command,
    request_frame, set_request_loop, update_link_current_pts,
};
pub use error::{GraphError, GraphResult};
pub use frame::{AudioPayload, Format, Frame, FramePayload, MediaType, VideoPayload};
pub use graph::{DefaultFrameAllocator, FrameAllocator, Graph, GraphHooks, RecordingHooks};
pub use ids::{FilterId, LinkId};
pub use instance::FilterInstance;
pub use kind::{FilterKind, InitDictFn, InitFn, InitOpaqueFn, OptionSchema, OptionSpec, PrivState, ProcessCommandFn};
pub use options::{init_with_args, init_with_dict, process_options, OptionDict, OptionRuntime};
pub use pad::{PadDescriptor, PollOutcome};
pub use registry::{get_by_name, iter_next, register, uninit_all, Registry};

/// A pad's declared name.
pub fn pad_get_name(graph: &Graph, filter: FilterId, is_input: bool, index: usize) -> GraphResult<String> {
    let inst = graph.instance(filter)?;
    let pad = if is_input { inst.input_pads.get(index) } else { inst.output_pads.get(index) };
    pad.map(|p| p.name.clone())
        .ok_or_else(|| GraphError::InvalidArgument(format!("no such pad {index}")))
}

/// A pad's declared media type.
pub fn pad_get_type(graph: &Graph, filter: FilterId, is_input: bool, index: usize) -> GraphResult<MediaType> {
    let inst = graph.instance(filter)?;
    let pad = if is_input { inst.input_pads.get(index) } else { inst.output_pads.get(index) };
    pad.map(|p| p.media_type).ok_or_else(|| GraphError::InvalidArgument(format!("no such pad {index}")))
}

/// Negotiated channel count for a link, preferring the channel layout's own
/// count when one has been negotiated.
pub fn link_get_channels(graph: &Graph, link: LinkId) -> GraphResult<u32> {
    Ok(graph.link_ref(link)?.channels())
}

/// Marks a link closed — the producer side observes this and should stop
/// pushing frames across it.
pub fn link_set_closed(graph: &mut Graph, link: LinkId, closed: bool) -> GraphResult<()> {
    graph.link_mut(link)?.closed = closed;
    Ok(())
}
