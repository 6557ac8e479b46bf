// crates/filtergraph-core/src/engine.rs
//
// The pull/push frame engine, the audio framing path, the framed delivery
// path, and command draining. This is the runtime's hot path — everything
// here runs on whatever thread the embedder calls it from, cooperatively,
// with no thread or scheduler of its own.

use crate::command::FilterCommand;
use crate::error::{GraphError, GraphResult};
use crate::frame::{Frame, FramePayload};
use crate::graph::Graph;
use crate::ids::LinkId;
use crate::link::LinkFlags;
use crate::pad::PollOutcome;

/// Pulls on a link: an EOF-closed link always returns EOF with no side
/// effects, otherwise the link is marked requested and the engine loops,
/// invoking the source pad's `request_frame` hook (or recursing into the
/// source filter's single input link, the pass-through convention) until the
/// request is satisfied. A framing-path `REQUEST_LOOP` flag keeps the loop
/// going after an otherwise-successful pull that didn't yet fill a partial
/// audio buffer; an EOF from upstream with a pending partial buffer is
/// translated into one final flush before the link is marked closed.
pub fn request_frame(graph: &mut Graph, link_id: LinkId) -> GraphResult<()> {
    if graph.link_ref(link_id)?.closed {
        return Err(GraphError::Eof);
    }
    debug_assert!(!graph.link_ref(link_id)?.frame_requested, "request_frame re-entered on link {}", link_id.0);
    graph.link_mut(link_id)?.frame_requested = true;

    loop {
        match pull_once(graph, link_id) {
            Ok(()) => {
                let still_requested = graph.link_ref(link_id)?.frame_requested;
                let looping = graph.link_ref(link_id)?.flags.contains(LinkFlags::REQUEST_LOOP);
                if !still_requested {
                    return Ok(());
                }
                if looping {
                    continue;
                }
                // Non-negative return without REQUEST_LOOP must leave
                // frame_requested clear; treat a hook that forgot to do so as
                // "done" rather than spin forever.
                graph.link_mut(link_id)?.frame_requested = false;
                return Ok(());
            }
            Err(GraphError::Eof) => {
                // Upstream EOF with a pending partial buffer delivers that
                // buffer as a final (possibly undersized) frame instead of
                // surfacing EOF immediately; the flush's own return code
                // becomes this call's result, and only the *next* pull on
                // this now-closed link sees EOF.
                let had_partial = graph.link_ref(link_id)?.partial_buf.is_some();
                let result = if had_partial { flush_partial_audio(graph, link_id) } else { Err(GraphError::Eof) };
                graph.link_mut(link_id)?.frame_requested = false;
                graph.link_mut(link_id)?.closed = true;
                return result;
            }
            Err(other) => {
                graph.link_mut(link_id)?.frame_requested = false;
                return Err(other);
            }
        }
    }
}

fn pull_once(graph: &mut Graph, link_id: LinkId) -> GraphResult<()> {
    let src = graph.link_ref(link_id)?.src;
    let src_pad = graph.link_ref(link_id)?.src_pad;
    let hook = graph.instance(src)?.output_pads[src_pad].request_frame;

    if let Some(hook) = hook {
        return hook(graph, link_id);
    }

    match graph.instance(src)?.inputs.first().copied().flatten() {
        Some(first) => request_frame(graph, first),
        None => Err(GraphError::OperationNotSupported),
    }
}

/// Pushes a frame downstream across a link. Format consistency
/// is checked unless the destination pad declares `accepts_reformat`. Audio
/// links with framing constraints are routed through the partial-buffer path
/// instead of delivered directly.
pub fn filter_frame(graph: &mut Graph, link_id: LinkId, frame: Frame) -> GraphResult<()> {
    let dst = graph.link_ref(link_id)?.dst;
    let dst_pad = graph.link_ref(link_id)?.dst_pad;
    let accepts_reformat = graph.instance(dst)?.input_pads[dst_pad].accepts_reformat;

    if !accepts_reformat && !graph.link_ref(link_id)?.format_matches(&frame) {
        return Err(GraphError::InvalidConfiguration(format!(
            "frame format does not match negotiated link {} format",
            link_id.0
        )));
    }

    let nb_samples = frame.payload().nb_samples();
    if graph.link_ref(link_id)?.needs_audio_framing(nb_samples) {
        return push_audio_framed(graph, link_id, frame);
    }

    deliver(graph, link_id, frame)
}

/// The framed delivery path (§4.9): drop-on-closed, the writability copy,
/// command draining against the passing frame's PTS, then the callback
/// itself — default is a pass-through onto the destination filter's first
/// output link if the destination pad declares no `filter_frame` of its own.
fn deliver(graph: &mut Graph, link_id: LinkId, mut frame: Frame) -> GraphResult<()> {
    if graph.link_ref(link_id)?.closed {
        return Err(GraphError::Eof);
    }

    let dst = graph.link_ref(link_id)?.dst;
    let dst_pad = graph.link_ref(link_id)?.dst_pad;

    if graph.instance(dst)?.input_pads[dst_pad].needs_writable {
        frame.make_writable();
    }

    if let Some(pts) = frame.pts {
        // §4.9: "time ≤ frame.pts · av_q2d(link.time_base)" — always the
        // link's own negotiated time base, never one the frame happens to
        // carry.
        let time_base = graph.link_ref(link_id)?.time_base;
        let current_time = pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
        process_commands_due(graph, dst, current_time)?;
    }

    let pts = frame.pts;
    let result = match graph.instance(dst)?.input_pads[dst_pad].filter_frame {
        Some(hook) => hook(graph, link_id, frame),
        None => {
            let default_out = graph.instance(dst)?.outputs.first().copied().flatten();
            match default_out {
                Some(out_link) => filter_frame(graph, out_link, frame),
                None => Err(GraphError::OperationNotSupported),
            }
        }
    };

    graph.link_mut(link_id)?.frame_requested = false;
    if let Some(pts) = pts {
        update_link_current_pts(graph, link_id, pts)?;
    }
    result
}

/// Audio framing path: frames arriving on a link with
/// `[min_samples, max_samples]` constraints are sliced and accumulated into
/// `partial_buf` rather than delivered as-is; whenever enough samples have
/// accumulated, a frame is drawn from the allocator collaborator and
/// delivered, with any left-over samples carried to the next call.
fn push_audio_framed(graph: &mut Graph, link_id: LinkId, frame: Frame) -> GraphResult<()> {
    let FramePayload::Audio(payload) = frame.payload().clone() else {
        return Err(GraphError::InvalidArgument("non-audio frame on an audio-framed link".into()));
    };

    let min_samples = graph.link_ref(link_id)?.min_samples;
    let (max_samples, partial_buf_size, link_time_base) = {
        let link = graph.link_ref(link_id)?;
        (link.max_samples, link.partial_buf_size, link.time_base)
    };
    // The accumulator's allocation size is `partial_buf_size`, the emission
    // granularity named in §4.8 — independent of `max_samples`, which only
    // bounds the emitted frame. Filters that never set it (the common fixed-
    // framing case) get a buffer sized to the emission window itself.
    let capacity = if partial_buf_size > 0 { partial_buf_size } else { max_samples.max(min_samples).max(1) };
    let mut offset = 0usize;

    while offset < payload.nb_samples {
        let buf_exists = graph.link_ref(link_id)?.partial_buf.is_some();
        if !buf_exists {
            // Sizing only; the allocator collaborator owns real pooled memory.
            // This crate just needs `nb_planes` scratch buffers of the right
            // shape to accumulate into. Per §4.8/§7, an allocation failure
            // here is a log-and-drop, not a call failure: the input frame is
            // silently dropped and the next pull retries.
            if let Err(err) =
                graph.allocator.get_audio_buffer(payload.format, payload.sample_rate, payload.channel_layout.clone(), capacity)
            {
                eprintln!("[filtergraph] audio framing buffer allocation failed on link {}: {err}", link_id.0);
                return Ok(());
            }
            let bytes_per_sample = 2usize;
            let nb_planes = payload.data.len().max(1);
            // §4.8: the partial buffer's PTS is offset through `(1/sample_rate)
            // → link.time_base`, not the input frame's own time base.
            let base_pts = frame.pts.unwrap_or(0) + samples_to_pts_offset(offset, payload.sample_rate, link_time_base);
            graph.link_mut(link_id)?.partial_buf = Some(crate::link::PartialBuffer {
                capacity,
                filled: 0,
                pts: base_pts,
                time_base: link_time_base,
                format: crate::frame::Format::Audio(payload.format),
                sample_rate: payload.sample_rate,
                channel_layout: payload.channel_layout.clone(),
                planes: vec![vec![0u8; capacity * bytes_per_sample]; nb_planes],
                bytes_per_sample,
            });
        }

        let remaining = graph.link_ref(link_id)?.partial_buf.as_ref().unwrap().remaining();
        let take = remaining.min(payload.nb_samples - offset);
        debug_assert!(take > 0, "link {} misconfigured: partial_buf_size below min_samples stalls framing", link_id.0);
        if take == 0 {
            break;
        }

        {
            let buf = graph.link_mut(link_id)?.partial_buf.as_mut().unwrap();
            for (plane_idx, plane) in buf.planes.iter_mut().enumerate() {
                if let Some(src_plane) = payload.data.get(plane_idx) {
                    let bps = buf.bytes_per_sample;
                    let src_start = offset * bps;
                    let dst_start = buf.filled * bps;
                    let len = take * bps;
                    if src_start + len <= src_plane.len() && dst_start + len <= plane.len() {
                        plane[dst_start..dst_start + len].copy_from_slice(&src_plane[src_start..src_start + len]);
                    }
                }
            }
            buf.filled += take;
        }
        offset += take;

        let filled = graph.link_ref(link_id)?.partial_buf.as_ref().unwrap().filled;
        if filled >= min_samples.max(1) {
            emit_partial_buffer(graph, link_id)?;
        }
    }

    // Keep the pull engine looping on this link until a partial buffer
    // actually reaches emission size; once it has (or there never was one to
    // begin with, e.g. this call drained straight through), stop looping.
    set_request_loop(graph, link_id, graph.link_ref(link_id)?.partial_buf.is_some())?;
    Ok(())
}

/// Converts a sample offset within an input frame to a PTS delta in
/// `time_base` units, per §4.8's "`input_position_in_samples` converted
/// through `(1/sample_rate) → time_base`".
fn samples_to_pts_offset(samples: usize, sample_rate: u32, time_base: ffmpeg_the_third::util::rational::Rational) -> i64 {
    if samples == 0 || sample_rate == 0 {
        return 0;
    }
    let seconds = samples as f64 / sample_rate as f64;
    let tb = time_base.denominator() as f64 / time_base.numerator().max(1) as f64;
    (seconds * tb).round() as i64
}

fn emit_partial_buffer(graph: &mut Graph, link_id: LinkId) -> GraphResult<()> {
    let buf = graph.link_mut(link_id)?.partial_buf.take().unwrap();
    let crate::frame::Format::Audio(format) = buf.format else {
        return Err(GraphError::InvalidConfiguration("partial audio buffer lost its sample format".into()));
    };
    let out = Frame::new(
        Some(buf.pts),
        buf.time_base,
        FramePayload::Audio(crate::frame::AudioPayload {
            format,
            sample_rate: buf.sample_rate,
            channel_layout: buf.channel_layout,
            nb_samples: buf.filled,
            data: buf.planes,
        }),
    );
    deliver(graph, link_id, out)
}

/// Flushes whatever is left in the partial buffer at EOF, even if it never
/// reached `min_samples` — the EOF-flushes-partial-audio-buffer case.
pub fn flush_partial_audio(graph: &mut Graph, link_id: LinkId) -> GraphResult<()> {
    if graph.link_ref(link_id)?.partial_buf.is_some() {
        emit_partial_buffer(graph, link_id)?;
    }
    Ok(())
}

/// Looks up the poll hook on the *source* pad (the same side `request_frame`
/// consults, not the destination side); absent a hook, fans out over the
/// source filter's own input links and takes the minimum reported
/// availability, per §4.7's pass-through convention. An unconnected input
/// slot, or any upstream link reporting `Unknown`, makes the whole query
/// `Unknown` rather than colliding with a real availability count.
pub fn poll_frame(graph: &mut Graph, link_id: LinkId) -> GraphResult<PollOutcome> {
    let src = graph.link_ref(link_id)?.src;
    let src_pad = graph.link_ref(link_id)?.src_pad;
    if let Some(hook) = graph.instance(src)?.output_pads[src_pad].poll_frame {
        return hook(graph, link_id);
    }

    let inputs: Vec<Option<LinkId>> = graph.instance(src)?.inputs.clone();
    if inputs.is_empty() {
        return Ok(PollOutcome::Unknown);
    }

    let mut min_available: Option<u32> = None;
    for input in inputs {
        let outcome = match input {
            None => PollOutcome::Unknown,
            Some(id) => poll_frame(graph, id)?,
        };
        match outcome {
            PollOutcome::Unknown => return Ok(PollOutcome::Unknown),
            PollOutcome::Available(n) => {
                min_available = Some(min_available.map_or(n, |cur: u32| cur.min(n)));
            }
        }
    }
    Ok(min_available.map(PollOutcome::Available).unwrap_or(PollOutcome::Unknown))
}

/// Updates a link's observed PTS and notifies the scheduler collaborator —
/// the one place `update_heap` fires outside structural graph edits.
pub fn update_link_current_pts(graph: &mut Graph, link_id: LinkId, pts: i64) -> GraphResult<()> {
    graph.link_mut(link_id)?.current_pts = Some(pts);
    graph.hooks.update_heap(link_id);
    Ok(())
}

pub fn set_request_loop(graph: &mut Graph, link_id: LinkId, on: bool) -> GraphResult<()> {
    let link = graph.link_mut(link_id)?;
    if on {
        link.flags.insert(LinkFlags::REQUEST_LOOP);
    } else {
        link.flags.remove(LinkFlags::REQUEST_LOOP);
    }
    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────

/// Drains every command on `filter_id` whose scheduled `time` has arrived
/// (`current_time >= cmd.time`), applying each in FIFO order. Built-in `ping`
/// is handled here regardless of whether the filter registers its own
/// `process_command` hook, matching the original's always-available
/// diagnostic command.
pub fn process_commands_due(
    graph: &mut Graph,
    filter_id: crate::ids::FilterId,
    current_time: f64,
) -> GraphResult<Vec<(FilterCommand, String)>> {
    let mut applied = Vec::new();
    loop {
        let due = matches!(graph.instance(filter_id)?.commands.front(), Some(c) if c.time <= current_time);
        if !due {
            break;
        }
        let cmd = graph.instance_mut(filter_id)?.commands.pop_front().unwrap();
        // §7: a failing command is logged and still popped, not allowed to
        // abort the rest of the drain — later commands may still be due.
        match apply_command(graph, filter_id, &cmd) {
            Ok(result) => applied.push((cmd, result)),
            Err(err) => {
                eprintln!("[filtergraph] command '{}' failed on filter {}: {err}", cmd.command, filter_id.0);
            }
        }
    }
    Ok(applied)
}

fn apply_command(graph: &mut Graph, filter_id: crate::ids::FilterId, cmd: &FilterCommand) -> GraphResult<String> {
    if cmd.command == "ping" {
        return Ok("pong".to_string());
    }
    let hook = graph.instance(filter_id)?.kind.process_command;
    match hook {
        Some(hook) => {
            let mut result = String::new();
            hook(graph, filter_id, &cmd.command, &cmd.arg, &mut result, cmd.flags)?;
            Ok(result)
        }
        None => Err(GraphError::OperationNotSupported),
    }
}

pub fn queue_command(graph: &mut Graph, filter_id: crate::ids::FilterId, cmd: FilterCommand) -> GraphResult<()> {
    graph.instance_mut(filter_id)?.commands.push(cmd);
    Ok(())
}

/// Immediate, unqueued command application — the public-surface
/// `process_command(inst, cmd, arg, buf, flags)`, distinct from the
/// time-scheduled `queue_command` / `process_commands_due` pair used for
/// commands carrying a future `time`.
pub fn process_command(
    graph: &mut Graph,
    filter_id: crate::ids::FilterId,
    cmd: &str,
    arg: &str,
    flags: i32,
) -> GraphResult<String> {
    let scheduled = FilterCommand { time: 0.0, command: cmd.to_string(), arg: arg.to_string(), flags };
    apply_command(graph, filter_id, &scheduled)
}
