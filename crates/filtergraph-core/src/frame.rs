// crates/filtergraph-core/src/frame.rs
//
// Frame metadata: the opaque carrier of one media sample (a video plane or
// an audio block) plus the timing/format attributes that ride along with it.
// Grounded on the same `ffmpeg-the-third` types `velocut-media` uses for real
// decode/encode (`Rational` for time bases, `Pixel` / `Sample` for formats,
// `ChannelLayout` for audio) — this crate never owns a decode pipeline, so
// plane/sample storage is plain `Vec<u8>`, deep-copied on write when shared.

use std::sync::Arc;

use ffmpeg_the_third::format::{Pixel, Sample};
use ffmpeg_the_third::util::channel_layout::ChannelLayout;
use ffmpeg_the_third::util::rational::Rational;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
}

/// Negotiated link format. `Unset` marks a link whose format hasn't been
/// decided yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Format {
    Unset,
    Video(Pixel),
    Audio(Sample),
}

impl Default for Format {
    fn default() -> Self {
        Format::Unset
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoPayload {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    /// One entry per plane, tightly packed (no stride padding).
    pub planes: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioPayload {
    pub format: Sample,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub nb_samples: usize,
    /// One entry per plane for planar formats, a single entry for packed.
    pub data: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FramePayload {
    Video(VideoPayload),
    Audio(AudioPayload),
}

impl FramePayload {
    pub fn media_type(&self) -> MediaType {
        match self {
            FramePayload::Video(_) => MediaType::Video,
            FramePayload::Audio(_) => MediaType::Audio,
        }
    }

    pub fn nb_samples(&self) -> usize {
        match self {
            FramePayload::Video(_) => 0,
            FramePayload::Audio(a) => a.nb_samples,
        }
    }
}

/// A uniquely-owned or shared media sample with timing attached.
///
/// The payload is `Arc`-wrapped refcounted storage; `is_uniquely_owned` /
/// `make_writable` give the same writability check and copy-on-write clone
/// that a refcounted frame format needs before in-place mutation.
#[derive(Clone, Debug)]
pub struct Frame {
    pub pts: Option<i64>,
    pub time_base: Rational,
    payload: Arc<FramePayload>,
}

impl Frame {
    pub fn new(pts: Option<i64>, time_base: Rational, payload: FramePayload) -> Self {
        Self { pts, time_base, payload: Arc::new(payload) }
    }

    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    pub fn media_type(&self) -> MediaType {
        self.payload.media_type()
    }

    pub fn is_uniquely_owned(&self) -> bool {
        Arc::strong_count(&self.payload) == 1
    }

    /// Deep-copy the payload if it is shared, so the caller can mutate it.
    /// No-op when already uniquely owned — matches `av_frame_make_writable`'s
    /// fast path.
    pub fn make_writable(&mut self) {
        if !self.is_uniquely_owned() {
            self.payload = Arc::new((*self.payload).clone());
        }
    }

    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts.map(|p| p as f64 * self.time_base.numerator() as f64 / self.time_base.denominator() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video() -> FramePayload {
        FramePayload::Video(VideoPayload {
            format: Pixel::YUV420P,
            width: 4,
            height: 2,
            sample_aspect_ratio: Rational::new(1, 1),
            planes: vec![vec![1, 2, 3, 4, 5, 6, 7, 8]],
        })
    }

    #[test]
    fn make_writable_is_noop_when_unique() {
        let mut f = Frame::new(Some(0), Rational::new(1, 25), sample_video());
        let before = f.payload().clone();
        f.make_writable();
        assert_eq!(*f.payload(), before);
    }

    #[test]
    fn make_writable_deep_copies_shared_payload_preserving_bytes() {
        let f1 = Frame::new(Some(0), Rational::new(1, 25), sample_video());
        let mut f2 = f1.clone();
        assert!(!f2.is_uniquely_owned());
        f2.make_writable();
        assert!(f2.is_uniquely_owned());
        assert_eq!(f1.payload(), f2.payload());
    }
}
