//! HLS MPEG-TS segment muxer.
//!
//! Given pre-demuxed video/audio elementary frames from an upstream MP4
//! parse, [`Muxer`] interleaves them into one MPEG-TS segment, either as a
//! real byte stream ([`Muxer::process`]) or as one of two byte-exact dry
//! runs that report segment size or trick-play keyframe extents without
//! performing any I/O.

pub mod cache;
pub mod config;
pub mod continuity;
pub mod error;
pub mod filters;
pub mod frame;
pub mod muxer;
pub mod packetizer;
pub mod rescale;
pub mod stream_state;

#[cfg(test)]
pub(crate) mod tests;

pub use cache::{CacheLookup, InMemoryReadCache, ReadCache};
pub use config::{init_tracing, MuxerConfig};
pub use error::{MuxError, Result};
pub use frame::{FrameDescriptor, MediaType, TrackMetadata};
pub use muxer::{IframeExtent, Muxer, ProcessOutcome};
