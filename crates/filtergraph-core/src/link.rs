// crates/filtergraph-core/src/link.rs
//
// Links: runtime edges between a source output pad and a destination input
// pad. Holds negotiated parameters, the pending partial audio buffer, and
// flow-control state.

use bitflags::bitflags;
use ffmpeg_the_third::util::channel_layout::ChannelLayout;
use ffmpeg_the_third::util::rational::Rational;

use crate::error::{GraphError, GraphResult};
use crate::frame::{Format, Frame, MediaType};
use crate::ids::{FilterId, LinkId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitState {
    Uninit,
    StartInit,
    Init,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LinkFlags: u32 {
        /// Set by the audio framing path to make the pull engine keep
        /// pulling until a partial buffer reaches emission size.
        const REQUEST_LOOP = 0b01;
    }
}

/// The four opaque format-admissibility sets the external format-negotiation
/// collaborator reads and constrains between linking and configuration. The
/// core only creates, swaps, and releases these — it never interprets them.
#[derive(Clone, Debug, Default)]
pub struct FormatSets {
    pub in_formats: Option<Vec<i32>>,
    pub out_formats: Option<Vec<i32>>,
    pub in_samplerates: Option<Vec<i32>>,
    pub out_samplerates: Option<Vec<i32>>,
    pub in_channel_layouts: Option<Vec<u64>>,
    pub out_channel_layouts: Option<Vec<u64>>,
}

impl FormatSets {
    /// Swap the output-side sets between `self` (the original link, now
    /// feeding an inserted filter's input) and `other` (the new link the
    /// inserted filter produces on). Used by `insert_filter`: the
    /// inserted filter is now the producer for the original destination, so
    /// its outbound format sets should carry whatever had already been
    /// negotiated for the link it was spliced into.
    pub fn swap_output_side(&mut self, other: &mut FormatSets) {
        std::mem::swap(&mut self.out_formats, &mut other.out_formats);
        std::mem::swap(&mut self.out_samplerates, &mut other.out_samplerates);
        std::mem::swap(&mut self.out_channel_layouts, &mut other.out_channel_layouts);
    }
}

/// Accumulator for the audio framing path. Raw sample bytes only —
/// materializing a concrete `Frame` from this is the allocator collaborator's
/// job (`FrameAllocator::get_audio_buffer`); this type never owns pooled
/// memory itself.
#[derive(Clone, Debug)]
pub struct PartialBuffer {
    pub capacity: usize,
    pub filled: usize,
    pub pts: i64,
    pub time_base: Rational,
    pub format: Format,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    /// Per-channel (planar) or single (packed) sample byte buffers, each
    /// sized to `capacity` sample-slots worth of bytes for its plane.
    pub planes: Vec<Vec<u8>>,
    pub bytes_per_sample: usize,
}

impl PartialBuffer {
    pub fn remaining(&self) -> usize {
        self.capacity - self.filled
    }
}

pub struct Link {
    pub id: LinkId,
    pub src: FilterId,
    pub src_pad: usize,
    pub dst: FilterId,
    pub dst_pad: usize,
    pub media_type: MediaType,

    pub format: Format,

    // video-only
    pub w: u32,
    pub h: u32,
    pub sample_aspect_ratio: Rational,
    pub frame_rate: Rational,

    // audio-only
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: Option<ChannelLayout>,
    pub min_samples: usize,
    pub max_samples: usize,
    pub partial_buf_size: usize,

    // shared
    pub time_base: Rational,
    pub format_sets: Option<FormatSets>,

    pub init_state: InitState,
    pub closed: bool,
    pub frame_requested: bool,
    pub current_pts: Option<i64>,
    pub partial_buf: Option<PartialBuffer>,
    pub flags: LinkFlags,
    pub age_index: Option<usize>,
}

impl Link {
    pub fn new(id: LinkId, src: FilterId, src_pad: usize, dst: FilterId, dst_pad: usize, media_type: MediaType) -> Self {
        Self {
            id,
            src,
            src_pad,
            dst,
            dst_pad,
            media_type,
            format: Format::Unset,
            w: 0,
            h: 0,
            sample_aspect_ratio: Rational::new(0, 1),
            frame_rate: Rational::new(0, 1),
            sample_rate: 0,
            channels: 0,
            channel_layout: None,
            min_samples: 0,
            max_samples: 0,
            partial_buf_size: 0,
            time_base: Rational::new(0, 1),
            format_sets: None,
            init_state: InitState::Uninit,
            closed: false,
            frame_requested: false,
            current_pts: None,
            partial_buf: None,
            flags: LinkFlags::empty(),
            age_index: None,
        }
    }

    /// §4.7's dispatch condition: an audio link with a nonzero `min_samples`
    /// only takes the framing path when a partial buffer is already pending,
    /// or the incoming frame's sample count falls outside
    /// `[min_samples, max_samples]` — a frame that already satisfies the
    /// window with nothing pending goes straight to the framed delivery path.
    pub fn needs_audio_framing(&self, nb_samples: usize) -> bool {
        self.media_type == MediaType::Audio
            && self.min_samples > 0
            && (self.partial_buf.is_some() || nb_samples < self.min_samples || nb_samples > self.max_samples)
    }

    /// Checks the link against the frame's format attributes: pixel format
    /// plus dimensions for video, sample format plus sample rate and channel
    /// layout for audio. `scaler` exceptions are expressed at the pad
    /// (`accepts_reformat`), not here.
    pub fn format_matches(&self, frame: &Frame) -> bool {
        match (self.media_type, frame.payload()) {
            (MediaType::Video, crate::frame::FramePayload::Video(v)) => {
                self.format == Format::Video(v.format) && self.w == v.width && self.h == v.height
            }
            (MediaType::Audio, crate::frame::FramePayload::Audio(a)) => {
                let channel_layout_matches =
                    self.channel_layout.as_ref().map(|cl| cl == &a.channel_layout).unwrap_or(true);
                self.format == Format::Audio(a.format)
                    && self.sample_rate == a.sample_rate
                    && channel_layout_matches
                    && self.channels() == a.channel_layout.channels() as u32
            }
            _ => false,
        }
    }

    pub fn channels(&self) -> u32 {
        self.channel_layout.as_ref().map(|cl| cl.channels() as u32).unwrap_or(self.channels)
    }
}

pub fn check_pad_range(count: usize, idx: usize) -> GraphResult<()> {
    if idx >= count {
        Err(GraphError::InvalidArgument(format!("pad index {idx} out of range (have {count})")))
    } else {
        Ok(())
    }
}
