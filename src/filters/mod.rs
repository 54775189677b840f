//! Per-track filter chains: the transform between decoder-framed
//! elementary-stream bytes and what the packetizer needs to PES-wrap.
//!
//! Only one filter chain is ever active at a time (the muxer drives
//! streams one frame at a time, single-threaded), so `TopFilter` is a
//! plain enum dispatched with `match` rather than a trait object or a
//! shared, ref-counted sink — see Design Note D2 in `SPEC_FULL.md`.

pub mod adts;
pub mod annexb;
pub mod buffer;

use crate::error::Result;
use crate::frame::{MediaType, OutputFrame, TrackMetadata};
use crate::packetizer::Packetizer;

use adts::AdtsFilter;
use annexb::AnnexBFilter;

pub enum TopFilter {
    Video(AnnexBFilter),
    Audio(AdtsFilter),
}

impl TopFilter {
    /// `pes_payload_size` only matters for the audio variant (the target
    /// size its [`BufferFilter`](buffer::BufferFilter) accumulates to
    /// before flushing); video has no equivalent buffering stage.
    pub fn new(track: &TrackMetadata, pes_payload_size: u32) -> Result<Self> {
        match track.media_type {
            MediaType::Video => Ok(TopFilter::Video(AnnexBFilter::new(
                &track.extra_data,
                track.nal_length_size,
            )?)),
            MediaType::Audio => Ok(TopFilter::Audio(AdtsFilter::new(
                &track.extra_data,
                pes_payload_size,
            )?)),
        }
    }

    pub fn start_frame(
        &mut self,
        frame: &OutputFrame,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        match self {
            TopFilter::Video(f) => f.start_frame(frame, packetizer, sink),
            TopFilter::Audio(f) => f.start_frame(frame, packetizer, sink),
        }
    }

    pub fn write(
        &mut self,
        data: &[u8],
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        match self {
            TopFilter::Video(f) => f.write(data, packetizer, sink),
            TopFilter::Audio(f) => f.write(data),
        }
    }

    pub fn flush_frame(
        &mut self,
        padding_size: u32,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        match self {
            TopFilter::Video(f) => f.flush_frame(padding_size, packetizer, sink),
            TopFilter::Audio(f) => f.flush_frame(packetizer, sink),
        }
    }

    /// Force out whatever's buffered regardless of whether the target size
    /// has been reached. Audio-only: video never buffers past a frame
    /// boundary, so this is a no-op for `TopFilter::Video`.
    pub fn force_flush(
        &mut self,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        match self {
            TopFilter::Video(_) => Ok(()),
            TopFilter::Audio(f) => f.force_flush(packetizer, sink),
        }
    }

    /// DTS of the oldest frame currently buffered, if any. Audio-only;
    /// used by the muxer's delayed-flush check.
    pub fn buffer_dts(&self) -> Option<u64> {
        match self {
            TopFilter::Video(_) => None,
            TopFilter::Audio(f) => f.buffer_dts(),
        }
    }

    pub fn simulated_write(&mut self, packetizer: &mut Packetizer, frame: &OutputFrame) {
        match self {
            TopFilter::Video(f) => f.simulated_write(packetizer, frame),
            TopFilter::Audio(f) => f.simulated_write(packetizer, frame),
        }
    }

    pub fn simulated_force_flush(&mut self, packetizer: &mut Packetizer) {
        match self {
            TopFilter::Video(_) => {}
            TopFilter::Audio(f) => f.simulated_force_flush(packetizer),
        }
    }

    pub fn simulated_buffer_dts(&self) -> Option<u64> {
        match self {
            TopFilter::Video(_) => None,
            TopFilter::Audio(f) => f.simulated_buffer_dts(),
        }
    }

    pub fn simulation_supported(&self) -> bool {
        match self {
            TopFilter::Video(f) => f.simulation_supported(),
            TopFilter::Audio(f) => f.simulation_supported(),
        }
    }
}
