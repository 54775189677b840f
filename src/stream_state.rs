//! Per-track runtime state: cursor position, timing, and the filter chain
//! terminating in the shared packetizer.

use crate::continuity::ContinuityCounter;
use crate::error::Result;
use crate::filters::TopFilter;
use crate::frame::{FrameDescriptor, MediaType, OutputFrame, TrackMetadata};
use crate::packetizer::TS_OUTPUT_TIMESCALE;
use crate::rescale::rescale_time;

pub struct StreamState {
    pub media_type: MediaType,
    pub track_index: u32,
    pub source_timescale: u32,
    pub frames: Vec<FrameDescriptor>,
    pub frame_offsets: Vec<u64>,
    pub cursor: usize,
    pub first_frame_time_offset: u64,
    pub next_frame_time_offset: u64,
    pub next_frame_dts: u64,
    pub cc: ContinuityCounter,
    pub output_frame: OutputFrame,
    pub filter: TopFilter,
}

impl StreamState {
    pub fn new(track: &TrackMetadata, pid: u16, sid: u8, pes_payload_size: u32) -> Result<Self> {
        let cc = ContinuityCounter::new();
        let next_frame_time_offset = track.first_frame_time_offset;
        let next_frame_dts = rescale_time(
            next_frame_time_offset,
            track.source_timescale,
            TS_OUTPUT_TIMESCALE,
        );

        Ok(Self {
            media_type: track.media_type,
            track_index: track.track_index,
            source_timescale: track.source_timescale,
            frames: track.frames.clone(),
            frame_offsets: track.frame_offsets.clone(),
            cursor: 0,
            first_frame_time_offset: track.first_frame_time_offset,
            next_frame_time_offset,
            next_frame_dts,
            output_frame: OutputFrame::new(pid, sid, cc.clone()),
            cc,
            filter: TopFilter::new(track, pes_payload_size)?,
        })
    }

    pub fn has_frames_remaining(&self) -> bool {
        self.cursor < self.frames.len()
    }

    /// Reset to the state right after `new`, for repeated simulation runs
    /// (Invariant 5: buffers themselves never need resetting, since both
    /// real and simulated runs always drain them to empty).
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.next_frame_time_offset = self.first_frame_time_offset;
        self.next_frame_dts = rescale_time(
            self.next_frame_time_offset,
            self.source_timescale,
            TS_OUTPUT_TIMESCALE,
        );
        self.cc.reset();
        self.output_frame.last_stream_frame = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> TrackMetadata {
        TrackMetadata {
            media_type: MediaType::Audio,
            track_index: 0,
            source_timescale: 48_000,
            frames: vec![
                FrameDescriptor {
                    duration: 1024,
                    pts_delay: 0,
                    key_frame: true,
                    size: 200,
                },
                FrameDescriptor {
                    duration: 1024,
                    pts_delay: 0,
                    key_frame: true,
                    size: 210,
                },
            ],
            frame_offsets: vec![0, 200],
            first_frame_time_offset: 0,
            duration: 2048,
            extra_data: vec![0b00010_001, 0b0_0010_000],
            nal_length_size: 0,
        }
    }

    #[test]
    fn test_new_computes_initial_dts_from_first_frame_time_offset() {
        let track = sample_track();
        let state = StreamState::new(&track, 0x100, 0xC0, 2_760).unwrap();
        assert_eq!(state.next_frame_dts, 0);
        assert!(state.has_frames_remaining());
    }

    #[test]
    fn test_reset_restores_cursor_and_continuity_counter() {
        let track = sample_track();
        let mut state = StreamState::new(&track, 0x100, 0xC0, 2_760).unwrap();
        state.cursor = 1;
        state.cc.next();
        state.cc.next();
        state.output_frame.last_stream_frame = true;

        state.reset();

        assert_eq!(state.cursor, 0);
        assert_eq!(state.cc.get(), 0);
        assert!(!state.output_frame.last_stream_frame);
    }
}
