//! MP4 (length-prefixed NAL) to Annex-B (start-code-prefixed NAL)
//! conversion for video.
//!
//! Per Design Note D5 in `SPEC_FULL.md`, this conversion is
//! size-preserving: each `nal_length_size`-byte length field is replaced
//! by a start code of the same byte width, so the only size change is the
//! parameter sets injected before every keyframe.

use crate::error::{MuxError, Result};
use crate::frame::OutputFrame;
use crate::packetizer::Packetizer;

enum ParseState {
    ReadingLength { have: Vec<u8> },
    ReadingPayload { remaining: u32 },
}

pub struct AnnexBFilter {
    nal_length_size: u8,
    /// SPS/PPS (or VPS/SPS/PPS), Annex-B framed, injected before every
    /// keyframe's first NAL.
    param_sets: Vec<u8>,
    state: ParseState,
}

impl AnnexBFilter {
    pub fn new(extra_data: &[u8], nal_length_size: u8) -> Result<Self> {
        if !matches!(nal_length_size, 1 | 2 | 4) {
            return Err(MuxError::BadData(format!(
                "unsupported nal_length_size {nal_length_size}"
            )));
        }
        Ok(Self {
            nal_length_size,
            param_sets: extract_annexb_param_sets(extra_data),
            state: ParseState::ReadingLength { have: Vec::new() },
        })
    }

    pub fn start_frame(
        &mut self,
        frame: &OutputFrame,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        packetizer.start_frame(
            frame.pid,
            &frame.cc,
            frame.pts,
            frame.dts,
            frame.key,
            frame.sid,
            sink,
        )?;
        self.state = ParseState::ReadingLength { have: Vec::new() };
        if frame.key && !self.param_sets.is_empty() {
            packetizer.write(&self.param_sets, sink)?;
        }
        Ok(())
    }

    pub fn write(
        &mut self,
        data: &[u8],
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let length_size = self.nal_length_size as usize;
        let mut cursor = 0usize;

        while cursor < data.len() {
            match std::mem::replace(&mut self.state, ParseState::ReadingLength { have: Vec::new() }) {
                ParseState::ReadingLength { mut have } => {
                    let need = length_size - have.len();
                    let take = need.min(data.len() - cursor);
                    have.extend_from_slice(&data[cursor..cursor + take]);
                    cursor += take;

                    if have.len() == length_size {
                        let length = parse_nal_length(&have, length_size)?;
                        let mut start_code = vec![0u8; length_size];
                        *start_code.last_mut().unwrap() = 1;
                        packetizer.write(&start_code, sink)?;
                        self.state = ParseState::ReadingPayload { remaining: length };
                    } else {
                        self.state = ParseState::ReadingLength { have };
                    }
                }
                ParseState::ReadingPayload { remaining } => {
                    let take = (remaining as usize).min(data.len() - cursor);
                    packetizer.write(&data[cursor..cursor + take], sink)?;
                    cursor += take;

                    let left = remaining - take as u32;
                    self.state = if left == 0 {
                        ParseState::ReadingLength { have: Vec::new() }
                    } else {
                        ParseState::ReadingPayload { remaining: left }
                    };
                }
            }
        }
        Ok(())
    }

    pub fn flush_frame(
        &mut self,
        padding_size: u32,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        packetizer.flush_frame(padding_size, sink)
    }

    pub fn simulation_supported(&self) -> bool {
        true
    }

    pub fn simulated_write(&mut self, packetizer: &mut Packetizer, frame: &OutputFrame) {
        let extra = if frame.key { self.param_sets.len() as u32 } else { 0 };
        packetizer.simulated_write_frame(frame.pid, frame.key, frame.original_size + extra);
    }
}

fn parse_nal_length(have: &[u8], length_size: usize) -> Result<u32> {
    match length_size {
        1 => Ok(have[0] as u32),
        2 => Ok(u16::from_be_bytes([have[0], have[1]]) as u32),
        4 => Ok(u32::from_be_bytes([have[0], have[1], have[2], have[3]])),
        other => Err(MuxError::BadData(format!("unsupported nal_length_size {other}"))),
    }
}

/// Extract SPS/PPS from an `avcC`-style configuration record and re-frame
/// them as Annex-B (4-byte start code + raw bytes each). Returns an empty
/// vector for anything that doesn't parse as a well-formed record, rather
/// than failing init outright — a track with no usable parameter sets
/// simply won't get them injected before keyframes.
fn extract_annexb_param_sets(extra_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    if extra_data.len() < 6 {
        return out;
    }

    let mut pos = 5;
    let num_sps = (extra_data[pos] & 0x1F) as usize;
    pos += 1;
    for _ in 0..num_sps {
        match read_length_prefixed(extra_data, pos) {
            Some((bytes, next)) => {
                out.extend_from_slice(&[0, 0, 0, 1]);
                out.extend_from_slice(bytes);
                pos = next;
            }
            None => return out,
        }
    }

    if pos >= extra_data.len() {
        return out;
    }
    let num_pps = extra_data[pos] as usize;
    pos += 1;
    for _ in 0..num_pps {
        match read_length_prefixed(extra_data, pos) {
            Some((bytes, next)) => {
                out.extend_from_slice(&[0, 0, 0, 1]);
                out.extend_from_slice(bytes);
                pos = next;
            }
            None => return out,
        }
    }

    out
}

fn read_length_prefixed(data: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    if pos + 2 > data.len() {
        return None;
    }
    let len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
    let start = pos + 2;
    if start + len > data.len() {
        return None;
    }
    Some((&data[start..start + len], start + len))
}
