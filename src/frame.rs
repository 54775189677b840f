//! Frame-level data model: per-frame descriptors, track metadata, and the
//! scratch record handed to a filter chain for the frame currently being
//! muxed.

use crate::continuity::ContinuityCounter;

/// Which elementary stream a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    /// Sort key used by the stream-selection tie-break: video before audio.
    pub fn sort_key(self) -> u8 {
        match self {
            MediaType::Video => 0,
            MediaType::Audio => 1,
        }
    }
}

/// One elementary-stream frame as produced by the upstream MP4 parse.
#[derive(Debug, Clone, Copy)]
pub struct FrameDescriptor {
    /// Duration in the track's source timescale.
    pub duration: u32,
    /// `pts - dts`, always such that `pts >= dts`.
    pub pts_delay: u32,
    pub key_frame: bool,
    /// Size in bytes of the frame's data in the source.
    pub size: u32,
}

/// Static per-track metadata the muxer needs at init time.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub media_type: MediaType,
    /// Stable ordinal used as the stream-selection tie-break.
    pub track_index: u32,
    pub source_timescale: u32,
    pub frames: Vec<FrameDescriptor>,
    /// Byte offset of each frame's data within its source, parallel to
    /// `frames`.
    pub frame_offsets: Vec<u64>,
    pub first_frame_time_offset: u64,
    /// Total track duration in source ticks.
    pub duration: u64,
    /// Codec configuration: parameter-set box for video,
    /// `AudioSpecificConfig` for audio.
    pub extra_data: Vec<u8>,
    /// Video only: byte width of the AVCC/HVCC NAL length prefix (1, 2, or
    /// 4). Ignored for audio tracks.
    pub nal_length_size: u8,
}

/// Scratch record describing the frame currently being handed to a filter
/// chain. One lives per stream, rewritten on each `start_frame`.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    pub pid: u16,
    pub sid: u8,
    pub pts: u64,
    pub dts: u64,
    pub key: bool,
    pub original_size: u32,
    /// True once this stream has no more frames after this one.
    pub last_stream_frame: bool,
    pub cc: ContinuityCounter,
}

impl OutputFrame {
    pub fn new(pid: u16, sid: u8, cc: ContinuityCounter) -> Self {
        Self {
            pid,
            sid,
            pts: 0,
            dts: 0,
            key: false,
            original_size: 0,
            last_stream_frame: false,
            cc,
        }
    }
}
