// crates/filtergraph-core/src/graph.rs
//
// The graph itself: an arena of filter instances and an arena of links
// between them, plus two collaborator traits an embedder plugs in: frame
// memory allocation, and scheduler hooks (command queue position, removal
// notifications). Nothing here owns a thread or a scheduler loop.

use std::any::Any;
use std::sync::Arc;

use ffmpeg_the_third::format::{Pixel, Sample};
use ffmpeg_the_third::util::channel_layout::ChannelLayout;
use ffmpeg_the_third::util::rational::Rational;

use crate::command::CommandQueue;
use crate::error::{GraphError, GraphResult};
use crate::frame::{AudioPayload, Frame, FramePayload, VideoPayload};
use crate::ids::{FilterId, LinkId};
use crate::instance::FilterInstance;
use crate::kind::FilterKind;
use crate::link::{check_pad_range, FormatSets, Link};
use crate::pad::PadDescriptor;

/// Frame memory allocation collaborator ("buffer allocation is out of
/// scope" — an embedder supplies the real thing; this crate only calls it).
pub trait FrameAllocator: Send {
    fn get_video_buffer(&self, format: Pixel, width: u32, height: u32) -> GraphResult<Frame>;
    fn get_audio_buffer(
        &self,
        format: Sample,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        nb_samples: usize,
    ) -> GraphResult<Frame>;
}

/// Scheduler collaborator: the embedder's own dataflow graph is told
/// about structural changes so it can keep its own bookkeeping (priority
/// heap position, teardown) in sync. Out of scope to implement for real —
/// a minimal default collaborator for tests and small embedders.
pub trait GraphHooks: Send {
    fn remove_filter(&mut self, id: FilterId);
    fn update_heap(&mut self, link: LinkId);
}

/// Default, allocating `FrameAllocator` — zero-fills planes/samples sized by
/// the requested format. Good enough for a standalone embedder or tests;
/// production callers that pool buffers supply their own.
pub struct DefaultFrameAllocator;

impl FrameAllocator for DefaultFrameAllocator {
    fn get_video_buffer(&self, format: Pixel, width: u32, height: u32) -> GraphResult<Frame> {
        let plane_size = (width as usize) * (height as usize);
        Ok(Frame::new(
            None,
            Rational::new(0, 1),
            FramePayload::Video(VideoPayload {
                format,
                width,
                height,
                sample_aspect_ratio: Rational::new(1, 1),
                planes: vec![vec![0u8; plane_size]],
            }),
        ))
    }

    fn get_audio_buffer(
        &self,
        format: Sample,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        nb_samples: usize,
    ) -> GraphResult<Frame> {
        let bytes_per_sample = 2usize;
        Ok(Frame::new(
            None,
            Rational::new(1, sample_rate as i32),
            FramePayload::Audio(AudioPayload {
                format,
                sample_rate,
                channel_layout,
                nb_samples,
                data: vec![vec![0u8; nb_samples * bytes_per_sample]],
            }),
        ))
    }
}

/// Records every hook call instead of acting on it — lets tests assert the
/// core fires the hooks at the right moments without wiring up a real
/// scheduler.
#[derive(Default)]
pub struct RecordingHooks {
    pub removed_filters: Vec<FilterId>,
    pub heap_updates: Vec<LinkId>,
}

impl GraphHooks for RecordingHooks {
    fn remove_filter(&mut self, id: FilterId) {
        self.removed_filters.push(id);
    }

    fn update_heap(&mut self, link: LinkId) {
        self.heap_updates.push(link);
    }
}

pub struct Graph {
    instances: Vec<Option<FilterInstance>>,
    links: Vec<Option<Link>>,
    pub hooks: Box<dyn GraphHooks>,
    pub allocator: Box<dyn FrameAllocator>,
}

impl Graph {
    pub fn new(hooks: Box<dyn GraphHooks>, allocator: Box<dyn FrameAllocator>) -> Self {
        Self { instances: Vec::new(), links: Vec::new(), hooks, allocator }
    }

    pub fn with_recording_hooks() -> Self {
        Self::new(Box::new(RecordingHooks::default()), Box::new(DefaultFrameAllocator))
    }

    // ── Filter instances ──────────────────────────────────────────────────────

    pub fn alloc(&mut self, kind: Arc<FilterKind>, name: impl Into<String>) -> FilterId {
        let priv_state = (kind.priv_new)();
        let input_pads = kind.input_pads.clone();
        let output_pads = kind.output_pads.clone();
        let inputs = vec![None; input_pads.len()];
        let outputs = vec![None; output_pads.len()];
        let instance = FilterInstance {
            kind,
            name: name.into(),
            input_pads,
            output_pads,
            inputs,
            outputs,
            priv_state,
            commands: CommandQueue::new(),
        };

        for (idx, slot) in self.instances.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(instance);
                return FilterId(idx);
            }
        }
        self.instances.push(Some(instance));
        FilterId(self.instances.len() - 1)
    }

    pub fn instance(&self, id: FilterId) -> GraphResult<&FilterInstance> {
        self.instances
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| GraphError::InvalidArgument(format!("no such filter instance {}", id.0)))
    }

    pub fn instance_mut(&mut self, id: FilterId) -> GraphResult<&mut FilterInstance> {
        self.instances
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| GraphError::InvalidArgument(format!("no such filter instance {}", id.0)))
    }

    /// Tears an instance down per §4.12: uninit, then every input and
    /// output link is unhooked from its other endpoint and freed, then the
    /// command queue is drained and the instance slot released. Idempotent
    /// on an already-absent instance.
    pub fn free(&mut self, id: FilterId) -> GraphResult<()> {
        if self.instances.get(id.0).map(Option::is_none).unwrap_or(true) {
            return Ok(());
        }

        if let Some(uninit) = self.instance(id)?.kind.uninit {
            uninit(self, id);
        }

        let inputs: Vec<LinkId> = self.instance(id)?.inputs.iter().filter_map(|l| *l).collect();
        for link_id in inputs {
            self.link_free(link_id)?;
        }
        let outputs: Vec<LinkId> = self.instance(id)?.outputs.iter().filter_map(|l| *l).collect();
        for link_id in outputs {
            self.link_free(link_id)?;
        }

        self.instance_mut(id)?.commands.drain_all();
        self.hooks.remove_filter(id);
        self.instances[id.0] = None;
        Ok(())
    }

    /// Inserts a new pad at `index` (clamped), shifting subsequent pads and
    /// their link slots right by one. Every link already hooked to a
    /// shifted slot has its stored `src_pad`/`dst_pad` back-reference bumped
    /// to match, per §4.3 — otherwise a link's pad index would silently go
    /// stale the moment a filter grows its pad set at runtime.
    pub fn insert_pad(
        &mut self,
        id: FilterId,
        is_input: bool,
        index: usize,
        pad: PadDescriptor,
    ) -> GraphResult<()> {
        let shifted: Vec<LinkId> = {
            let inst = self.instance_mut(id)?;
            let shifted = if is_input {
                let idx = index.min(inst.input_pads.len());
                inst.input_pads.insert(idx, pad);
                inst.inputs.insert(idx, None);
                inst.inputs[idx + 1..].iter().filter_map(|l| *l).collect()
            } else {
                let idx = index.min(inst.output_pads.len());
                inst.output_pads.insert(idx, pad);
                inst.outputs.insert(idx, None);
                inst.outputs[idx + 1..].iter().filter_map(|l| *l).collect()
            };
            debug_assert!(inst.pads_consistent());
            shifted
        };

        for link_id in shifted {
            let link = self.link_mut(link_id)?;
            if is_input {
                link.dst_pad += 1;
            } else {
                link.src_pad += 1;
            }
        }
        Ok(())
    }

    // ── Links ─────────────────────────────────────────────────────────────────

    pub fn link(&mut self, src: FilterId, src_pad: usize, dst: FilterId, dst_pad: usize) -> GraphResult<LinkId> {
        let media_type = {
            let src_inst = self.instance(src)?;
            check_pad_range(src_inst.output_pads.len(), src_pad)?;
            if src_inst.outputs[src_pad].is_some() {
                return Err(GraphError::InvalidConfiguration(format!(
                    "output pad {src_pad} of '{}' is already linked",
                    src_inst.name
                )));
            }

            let dst_inst = self.instance(dst)?;
            check_pad_range(dst_inst.input_pads.len(), dst_pad)?;
            if dst_inst.inputs[dst_pad].is_some() {
                return Err(GraphError::InvalidConfiguration(format!(
                    "input pad {dst_pad} of '{}' is already linked",
                    dst_inst.name
                )));
            }

            let src_type = src_inst.output_pads[src_pad].media_type;
            let dst_type = dst_inst.input_pads[dst_pad].media_type;
            if src_type != dst_type {
                return Err(GraphError::InvalidConfiguration(format!(
                    "media type mismatch linking '{}' pad {src_pad} to '{}' pad {dst_pad}",
                    src_inst.name, dst_inst.name
                )));
            }
            src_type
        };

        let id = self.next_link_id();
        let link = Link::new(id, src, src_pad, dst, dst_pad, media_type);
        self.set_link(id, link);

        self.instance_mut(src)?.outputs[src_pad] = Some(id);
        self.instance_mut(dst)?.inputs[dst_pad] = Some(id);
        Ok(id)
    }

    pub fn link_free(&mut self, id: LinkId) -> GraphResult<()> {
        let (src, src_pad, dst, dst_pad) = {
            let link = self.link_ref(id)?;
            (link.src, link.src_pad, link.dst, link.dst_pad)
        };
        if let Ok(inst) = self.instance_mut(src) {
            if let Some(slot) = inst.outputs.get_mut(src_pad) {
                *slot = None;
            }
        }
        if let Ok(inst) = self.instance_mut(dst) {
            if let Some(slot) = inst.inputs.get_mut(dst_pad) {
                *slot = None;
            }
        }
        self.links[id.0] = None;
        self.hooks.update_heap(id);
        Ok(())
    }

    /// Splices a newly-allocated filter into an existing link:
    /// `existing -> dst` becomes `existing -> new -> dst`. Format-negotiation
    /// state already accumulated on the output side of `existing` is handed
    /// to the new downstream link, since the new filter is now the producer
    /// `dst` actually negotiated with.
    ///
    /// Per §4.5, failure of the `new -> dst` link operation must restore
    /// `existing`'s original destination binding rather than leave it
    /// half-spliced; the rehook onto `new_filter`'s input pad is validated
    /// (range, occupancy, media type) before anything is mutated, matching
    /// the checks `link()` itself performs for the other end of the splice.
    pub fn insert_filter(
        &mut self,
        existing: LinkId,
        new_filter: FilterId,
        new_input_pad: usize,
        new_output_pad: usize,
    ) -> GraphResult<LinkId> {
        let (dst, dst_pad, media_type) = {
            let link = self.link_ref(existing)?;
            (link.dst, link.dst_pad, link.media_type)
        };

        {
            let new_inst = self.instance(new_filter)?;
            check_pad_range(new_inst.input_pads.len(), new_input_pad)?;
            if new_inst.inputs[new_input_pad].is_some() {
                return Err(GraphError::InvalidConfiguration(format!(
                    "input pad {new_input_pad} of '{}' is already linked",
                    new_inst.name
                )));
            }
            if new_inst.input_pads[new_input_pad].media_type != media_type {
                return Err(GraphError::InvalidConfiguration(format!(
                    "media type mismatch inserting '{}' pad {new_input_pad} into an existing link",
                    new_inst.name
                )));
            }
        }

        // Clear `dst`'s old input slot so the validated `link()` call below
        // doesn't see it as already occupied; restored on failure.
        self.instance_mut(dst)?.inputs[dst_pad] = None;

        let new_id = match self.link(new_filter, new_output_pad, dst, dst_pad) {
            Ok(id) => id,
            Err(err) => {
                self.instance_mut(dst)?.inputs[dst_pad] = Some(existing);
                return Err(err);
            }
        };

        if let Some(mut carried) = self.link_ref(existing)?.format_sets.clone() {
            let mut outbound = FormatSets::default();
            carried.swap_output_side(&mut outbound);
            self.link_mut(new_id)?.format_sets = Some(outbound);
            self.link_mut(existing)?.format_sets = Some(carried);
        }

        self.instance_mut(new_filter)?.inputs[new_input_pad] = Some(existing);
        let link = self.link_mut(existing)?;
        link.dst = new_filter;
        link.dst_pad = new_input_pad;

        self.hooks.update_heap(existing);
        self.hooks.update_heap(new_id);
        Ok(new_id)
    }

    pub fn link_ref(&self, id: LinkId) -> GraphResult<&Link> {
        self.links
            .get(id.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| GraphError::InvalidArgument(format!("no such link {}", id.0)))
    }

    pub fn link_mut(&mut self, id: LinkId) -> GraphResult<&mut Link> {
        self.links
            .get_mut(id.0)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| GraphError::InvalidArgument(format!("no such link {}", id.0)))
    }

    pub fn all_link_ids(&self) -> Vec<LinkId> {
        self.links.iter().enumerate().filter_map(|(i, l)| l.as_ref().map(|_| LinkId(i))).collect()
    }

    pub fn all_filter_ids(&self) -> Vec<FilterId> {
        self.instances.iter().enumerate().filter_map(|(i, f)| f.as_ref().map(|_| FilterId(i))).collect()
    }

    fn next_link_id(&self) -> LinkId {
        for (idx, slot) in self.links.iter().enumerate() {
            if slot.is_none() {
                return LinkId(idx);
            }
        }
        LinkId(self.links.len())
    }

    fn set_link(&mut self, id: LinkId, link: Link) {
        if id.0 < self.links.len() {
            self.links[id.0] = Some(link);
        } else {
            self.links.push(Some(link));
        }
    }
}

#[allow(dead_code)]
fn _assert_any_state(_p: &dyn Any) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MediaType;
    use crate::pad::PadDescriptor;

    fn passthrough_kind(name: &'static str) -> Arc<FilterKind> {
        Arc::new(FilterKind {
            name,
            input_pads: vec![PadDescriptor::new("in", MediaType::Video)],
            output_pads: vec![PadDescriptor::new("out", MediaType::Video)],
            priv_new: || Box::new(()),
            priv_class: None,
            shorthand: None,
            init: None,
            init_dict: None,
            init_opaque: None,
            uninit: None,
            process_command: None,
            legacy_raw_init: false,
        })
    }

    #[test]
    fn link_rejects_already_linked_output_pad() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let c = g.alloc(passthrough_kind("c"), "c0");
        g.link(a, 0, b, 0).unwrap();
        let err = g.link(a, 0, c, 0).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfiguration(_)));
    }

    #[test]
    fn link_rejects_media_type_mismatch() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let audio_kind = Arc::new(FilterKind {
            name: "audio_sink",
            input_pads: vec![PadDescriptor::new("in", MediaType::Audio)],
            output_pads: vec![],
            priv_new: || Box::new(()),
            priv_class: None,
            shorthand: None,
            init: None,
            init_dict: None,
            init_opaque: None,
            uninit: None,
            process_command: None,
            legacy_raw_init: false,
        });
        let b = g.alloc(audio_kind, "b0");
        let err = g.link(a, 0, b, 0).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfiguration(_)));
    }

    #[test]
    fn free_unhooks_and_frees_its_links() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let link_id = g.link(a, 0, b, 0).unwrap();
        g.free(a).unwrap();
        assert!(g.link_ref(link_id).is_err());
        assert_eq!(g.instance(b).unwrap().inputs[0], None);
    }

    #[test]
    fn free_is_idempotent_on_absent_instance() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        g.free(a).unwrap();
        g.free(a).unwrap();
    }

    #[test]
    fn link_free_then_free_succeeds() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let link_id = g.link(a, 0, b, 0).unwrap();
        g.link_free(link_id).unwrap();
        g.free(a).unwrap();
        g.free(b).unwrap();
    }

    #[test]
    fn insert_filter_transfers_output_side_format_sets_to_new_link() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let ab = g.link(a, 0, b, 0).unwrap();
        g.link_mut(ab).unwrap().format_sets = Some(FormatSets {
            in_formats: Some(vec![1]),
            out_formats: Some(vec![2, 3]),
            in_samplerates: None,
            out_samplerates: Some(vec![48000]),
            in_channel_layouts: None,
            out_channel_layouts: None,
        });

        let conv = g.alloc(passthrough_kind("conv"), "conv0");
        let new_id = g.insert_filter(ab, conv, 0, 0).unwrap();

        // b's former producer is now `conv`, not `a`.
        assert_eq!(g.instance(b).unwrap().inputs[0], Some(new_id));
        assert_eq!(g.link_ref(new_id).unwrap().src, conv);
        assert_eq!(g.link_ref(new_id).unwrap().dst, b);

        // `a -> conv` keeps the original link id and its input-side sets,
        // but its output-side sets moved to the new `conv -> b` link.
        assert_eq!(g.link_ref(ab).unwrap().dst, conv);
        let old_sets = g.link_ref(ab).unwrap().format_sets.as_ref().unwrap();
        assert_eq!(old_sets.in_formats, Some(vec![1]));
        assert_eq!(old_sets.out_formats, None);
        assert_eq!(old_sets.out_samplerates, None);

        let new_sets = g.link_ref(new_id).unwrap().format_sets.as_ref().unwrap();
        assert_eq!(new_sets.out_formats, Some(vec![2, 3]));
        assert_eq!(new_sets.out_samplerates, Some(vec![48000]));
        assert_eq!(new_sets.in_formats, None);
    }

    #[test]
    fn insert_filter_rejects_out_of_range_input_pad_leaving_topology_unchanged() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let ab = g.link(a, 0, b, 0).unwrap();
        let conv = g.alloc(passthrough_kind("conv"), "conv0");

        // `conv` only declares one input pad (index 0); index 5 is out of range.
        let err = g.insert_filter(ab, conv, 5, 0).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));

        // Nothing was mutated: `ab` still runs straight from `a` to `b`.
        assert_eq!(g.link_ref(ab).unwrap().src, a);
        assert_eq!(g.link_ref(ab).unwrap().dst, b);
        assert_eq!(g.instance(b).unwrap().inputs[0], Some(ab));
        assert_eq!(g.instance(conv).unwrap().inputs[0], None);
    }

    #[test]
    fn insert_filter_rejects_already_occupied_input_pad_on_new_filter() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let ab = g.link(a, 0, b, 0).unwrap();

        let conv = g.alloc(passthrough_kind("conv"), "conv0");
        let other = g.alloc(passthrough_kind("other"), "other0");
        // Occupy `conv`'s only input pad ahead of time.
        g.link(other, 0, conv, 0).unwrap();

        let err = g.insert_filter(ab, conv, 0, 0).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfiguration(_)));
        assert_eq!(g.link_ref(ab).unwrap().dst, b);
        assert_eq!(g.instance(b).unwrap().inputs[0], Some(ab));
    }

    #[test]
    fn insert_filter_restores_original_destination_binding_when_new_link_fails() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let ab = g.link(a, 0, b, 0).unwrap();

        let conv = g.alloc(passthrough_kind("conv"), "conv0");
        // Occupy `conv`'s only output pad so the `conv -> b` link fails.
        let sink = g.alloc(passthrough_kind("sink"), "sink0");
        g.link(conv, 0, sink, 0).unwrap();

        let err = g.insert_filter(ab, conv, 0, 0).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfiguration(_)));

        // `b`'s input slot is restored to the original link, not left empty.
        assert_eq!(g.instance(b).unwrap().inputs[0], Some(ab));
        assert_eq!(g.link_ref(ab).unwrap().dst, b);
        assert_eq!(g.link_ref(ab).unwrap().dst_pad, 0);
    }

    #[test]
    fn insert_pad_bumps_stored_pad_index_of_shifted_links() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(passthrough_kind("a"), "a0");
        let b0 = g.alloc(passthrough_kind("b0"), "b0");
        let b1 = g.alloc(passthrough_kind("b1"), "b1");

        // give `a` a second output pad up front so pad 1 is already linked
        // before the insertion we're testing shifts it.
        g.insert_pad(a, false, 1, PadDescriptor::new("out1", MediaType::Video)).unwrap();
        let link0 = g.link(a, 0, b0, 0).unwrap();
        let link1 = g.link(a, 1, b1, 0).unwrap();

        // insert a brand new output pad at index 0: the pad formerly at
        // index 1 (feeding `link1`) is now at index 2.
        g.insert_pad(a, false, 0, PadDescriptor::new("new_out", MediaType::Video)).unwrap();

        assert_eq!(g.link_ref(link0).unwrap().src_pad, 1, "link0 shifted from 0 to 1");
        assert_eq!(g.link_ref(link1).unwrap().src_pad, 2, "link1 shifted from 1 to 2");
        assert_eq!(g.instance(a).unwrap().outputs[1], Some(link0));
        assert_eq!(g.instance(a).unwrap().outputs[2], Some(link1));
    }
}
