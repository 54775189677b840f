//! Synthetic track builders shared by the scenario tests in
//! `scenarios.rs`.

use bytes::Bytes;

use crate::frame::{FrameDescriptor, MediaType, TrackMetadata};

/// A minimal `avcC` configuration record with one SPS and one PPS, usable
/// wherever a test needs `AnnexBFilter` to have parameter sets to inject.
pub fn avcc_extra_data() -> Vec<u8> {
    let sps = [0x67, 0x42, 0x00, 0x1e];
    let pps = [0x68, 0xce, 0x3c, 0x80];
    let mut record = vec![0x01, 0x42, 0x00, 0x1e, 0xFF, 0xE1];
    record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    record.extend_from_slice(&sps);
    record.push(1);
    record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    record.extend_from_slice(&pps);
    record
}

/// AAC-LC, stereo, 44.1kHz `AudioSpecificConfig`.
pub fn aac_asc() -> Vec<u8> {
    vec![0b00010_001, 0b0_0010_000]
}

/// Build a video track with one length-prefixed (4-byte) NAL per
/// `(payload_len, key_frame)` entry, plus the Annex-B source bytes a cache
/// would serve for it. Each frame is 1000 source ticks long.
pub fn video_track_with_frames(
    frame_specs: &[(u32, bool)],
    source_timescale: u32,
) -> (TrackMetadata, Bytes) {
    let mut data = Vec::new();
    let mut frames = Vec::with_capacity(frame_specs.len());
    let mut offsets = Vec::with_capacity(frame_specs.len());

    for &(payload_len, key) in frame_specs {
        offsets.push(data.len() as u64);
        data.extend_from_slice(&payload_len.to_be_bytes());
        let fill_byte = if key { 0x65 } else { 0x41 };
        data.extend(std::iter::repeat(fill_byte).take(payload_len as usize));
        frames.push(FrameDescriptor {
            duration: 1000,
            pts_delay: 0,
            key_frame: key,
            size: 4 + payload_len,
        });
    }

    let duration = frames.len() as u64 * 1000;
    let track = TrackMetadata {
        media_type: MediaType::Video,
        track_index: 0,
        source_timescale,
        frames,
        frame_offsets: offsets,
        first_frame_time_offset: 0,
        duration,
        extra_data: avcc_extra_data(),
        nal_length_size: 4,
    };
    (track, Bytes::from(data))
}

/// Build an audio track of `count` ADTS-unframed AAC frames of
/// `frame_len` raw bytes each, plus its source bytes. Each frame is 1024
/// source ticks long.
pub fn audio_track_with_frames(
    count: usize,
    frame_len: u32,
    source_timescale: u32,
    first_frame_time_offset: u64,
) -> (TrackMetadata, Bytes) {
    let mut data = Vec::new();
    let mut frames = Vec::with_capacity(count);
    let mut offsets = Vec::with_capacity(count);

    for _ in 0..count {
        offsets.push(data.len() as u64);
        data.extend(std::iter::repeat(0x5Au8).take(frame_len as usize));
        frames.push(FrameDescriptor {
            duration: 1024,
            pts_delay: 0,
            key_frame: true,
            size: frame_len,
        });
    }

    let duration = frames.len() as u64 * 1024;
    let track = TrackMetadata {
        media_type: MediaType::Audio,
        track_index: 1,
        source_timescale,
        frames,
        frame_offsets: offsets,
        first_frame_time_offset,
        duration,
        extra_data: aac_asc(),
        nal_length_size: 0,
    };
    (track, Bytes::from(data))
}
