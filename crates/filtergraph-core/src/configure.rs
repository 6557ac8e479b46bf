// crates/filtergraph-core/src/configure.rs
//
// The configuration driver: walks every link back to its producers,
// calling each destination pad's `config_props` hook once its upstream links
// are themselves configured, and tolerates cycles rather than looping forever
// or failing outright — see DESIGN.md's Open Question decisions.

use std::collections::HashSet;

use ffmpeg_the_third::util::rational::Rational;

use crate::error::{GraphError, GraphResult};
use crate::frame::MediaType;
use crate::graph::Graph;
use crate::ids::{FilterId, LinkId};
use crate::link::InitState;

/// Default time base used when a video source has no inherited input to
/// take one from: microsecond resolution.
fn default_video_time_base() -> Rational {
    Rational::new(1, 1_000_000)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigureOutcome {
    Configured,
    /// At least one cycle was found and tolerated; links inside the cycle
    /// remain configured using whatever partial state was available when the
    /// recursion doubled back on itself.
    CycleDetected,
}

/// §4.6's entry point: "for every input link of the target instance", DFS
/// into its producers and converge their parameters. Callers typically
/// invoke this on a sink filter, which pulls the whole upstream graph
/// through by recursion; it is not itself a whole-graph scan.
pub fn configure_links(graph: &mut Graph, target: FilterId) -> GraphResult<ConfigureOutcome> {
    let inputs: Vec<LinkId> = graph.instance(target)?.inputs.iter().filter_map(|l| *l).collect();
    let mut cycle_found = false;
    for id in inputs {
        let mut visiting = HashSet::new();
        if configure_one(graph, id, &mut visiting)? {
            cycle_found = true;
        }
    }
    Ok(if cycle_found { ConfigureOutcome::CycleDetected } else { ConfigureOutcome::Configured })
}

/// Returns `true` if configuring this link (or one of its upstream
/// dependencies) closed a cycle. A link caught in a cycle is deliberately
/// left at `STARTINIT` rather than promoted to `INIT` — see boundary
/// cycles are tolerated, but the half-configured state must stay
/// observable, not get silently papered over.
fn configure_one(graph: &mut Graph, id: LinkId, visiting: &mut HashSet<LinkId>) -> GraphResult<bool> {
    if graph.link_ref(id)?.init_state == InitState::Init {
        return Ok(false);
    }
    if visiting.contains(&id) {
        return Ok(true);
    }
    visiting.insert(id);
    graph.link_mut(id)?.init_state = InitState::StartInit;

    let mut cycle = false;
    let src = graph.link_ref(id)?.src;
    let upstream: Vec<LinkId> = graph.instance(src)?.inputs.iter().filter_map(|l| *l).collect();
    for up in upstream {
        if configure_one(graph, up, visiting)? {
            cycle = true;
        }
    }

    visiting.remove(&id);
    if cycle {
        return Ok(true);
    }

    let src = graph.link_ref(id)?.src;
    let src_pad = graph.link_ref(id)?.src_pad;
    if let Some(config_props) = graph.instance(src)?.output_pads[src_pad].config_props {
        config_props(graph, id)?;
    } else if graph.instance(src)?.input_pads.len() != 1 {
        return Err(GraphError::InvalidConfiguration(format!(
            "'{}' has no config_props on output pad {src_pad} and is not a single-input pass-through",
            graph.instance(src)?.name
        )));
    }

    inherit_link_params(graph, id)?;

    let dst = graph.link_ref(id)?.dst;
    let dst_pad = graph.link_ref(id)?.dst_pad;
    if let Some(config_props) = graph.instance(dst)?.input_pads[dst_pad].config_props {
        config_props(graph, id)?;
    }

    graph.link_mut(id)?.init_state = InitState::Init;
    Ok(false)
}

/// The inheritance rules of §4.6, applied after the source's own
/// `config_props` (if any) has had a chance to set parameters explicitly.
/// An "inherited input" is the source filter's own first input link, if it
/// has exactly one and it's configured — the pass-through convention used
/// throughout this driver.
fn inherit_link_params(graph: &mut Graph, id: LinkId) -> GraphResult<()> {
    let src = graph.link_ref(id)?.src;
    let inherited: Option<LinkId> = graph.instance(src)?.inputs.first().copied().flatten();
    let media_type = graph.link_ref(id)?.media_type;

    match media_type {
        MediaType::Video => {
            let (in_tb, in_sar, in_fr, in_w, in_h) = match inherited {
                Some(up) => {
                    let l = graph.link_ref(up)?;
                    (Some(l.time_base), Some(l.sample_aspect_ratio), Some(l.frame_rate), Some(l.w), Some(l.h))
                }
                None => (None, None, None, None, None),
            };

            let link = graph.link_mut(id)?;
            if is_zero(link.time_base) {
                link.time_base = in_tb.unwrap_or_else(default_video_time_base);
            }
            if is_zero(link.sample_aspect_ratio) {
                link.sample_aspect_ratio = in_sar.unwrap_or(Rational::new(1, 1));
            }
            if is_zero(link.frame_rate) {
                if let Some(fr) = in_fr {
                    link.frame_rate = fr;
                }
            }
            if link.w == 0 || link.h == 0 {
                match (in_w, in_h) {
                    (Some(w), Some(h)) if w > 0 && h > 0 => {
                        link.w = w;
                        link.h = h;
                    }
                    _ => {
                        return Err(GraphError::InvalidConfiguration(format!(
                            "source '{}' must set dimensions on link {}",
                            graph.instance(src)?.name,
                            id.0
                        )));
                    }
                }
            }
        }
        MediaType::Audio => {
            let in_tb = match inherited {
                Some(up) => Some(graph.link_ref(up)?.time_base),
                None => None,
            };
            let link = graph.link_mut(id)?;
            if is_zero(link.time_base) {
                link.time_base = match in_tb {
                    Some(tb) => tb,
                    None => Rational::new(1, link.sample_rate.max(1) as i32),
                };
            }
        }
    }
    Ok(())
}

fn is_zero(r: Rational) -> bool {
    r.numerator() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MediaType;
    use crate::kind::FilterKind;
    use crate::pad::PadDescriptor;
    use std::sync::Arc;

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

    fn set_640x480(graph: &mut Graph, link: LinkId) -> GraphResult<()> {
        let l = graph.link_mut(link)?;
        l.w = 640;
        l.h = 480;
        Ok(())
    }

    fn video_source_kind(name: &'static str) -> Arc<FilterKind> {
        Arc::new(FilterKind {
            name,
            input_pads: vec![],
            output_pads: vec![PadDescriptor::new("out", MediaType::Video).with_config_props(set_640x480)],
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
    fn linear_chain_configures_cleanly() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(video_source_kind("a"), "a0");
        let b = g.alloc(passthrough_kind("b"), "b0");
        let c = g.alloc(passthrough_kind("c"), "c0");
        g.link(a, 0, b, 0).unwrap();
        g.link(b, 0, c, 0).unwrap();
        assert_eq!(configure_links(&mut g, c).unwrap(), ConfigureOutcome::Configured);

        let ab = g.instance(a).unwrap().outputs[0].unwrap();
        let bc = g.instance(b).unwrap().outputs[0].unwrap();
        assert_eq!((g.link_ref(ab).unwrap().w, g.link_ref(ab).unwrap().h), (640, 480));
        // inherited through the passthrough `b`, which declares no config_props
        // of its own and so relies on the single-input inheritance rule.
        assert_eq!((g.link_ref(bc).unwrap().w, g.link_ref(bc).unwrap().h), (640, 480));
        assert!(g.link_ref(bc).unwrap().time_base.denominator() > 0);
    }

    #[test]
    fn source_without_config_props_or_single_input_fails() {
        let mut g = Graph::with_recording_hooks();
        let src = g.alloc(
            Arc::new(FilterKind {
                name: "bare_src",
                input_pads: vec![],
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
            }),
            "src",
        );
        let sink = g.alloc(passthrough_kind("sink"), "sink0");
        g.link(src, 0, sink, 0).unwrap();
        let err = configure_links(&mut g, sink).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfiguration(_)));
    }

    #[test]
    fn cycle_is_tolerated_not_an_error() {
        let mut g = Graph::with_recording_hooks();
        let a = g.alloc(
            Arc::new(FilterKind {
                name: "loopable",
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
            }),
            "a0",
        );
        g.insert_pad(a, true, 1, PadDescriptor::new("feedback_in", MediaType::Video)).unwrap();
        g.insert_pad(a, false, 1, PadDescriptor::new("feedback_out", MediaType::Video)).unwrap();
        g.link(a, 1, a, 1).unwrap();

        let outcome = configure_links(&mut g, a).unwrap();
        assert_eq!(outcome, ConfigureOutcome::CycleDetected);
        let loop_link = g.instance(a).unwrap().outputs[1].unwrap();
        assert_eq!(g.link_ref(loop_link).unwrap().init_state, InitState::StartInit);
    }
}
