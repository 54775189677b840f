//! The shared MPEG-TS sink: PAT/PMT emission, real TS-packet draining, and
//! byte-exact simulated accounting.

pub mod pes;
pub mod psi;

use bytes::BytesMut;

use crate::continuity::ContinuityCounter;
use crate::error::Result;
use crate::frame::MediaType;

/// Target timescale of every rescaled timestamp this crate emits.
pub const TS_OUTPUT_TIMESCALE: u32 = 90_000;

/// Default target size, in bytes, of a buffered audio PES before it is
/// flushed (see [`crate::filters::buffer::BufferFilter`]).
pub const DEFAULT_PES_PAYLOAD_SIZE: u32 = 2_760;

const STREAM_ID_VIDEO: u8 = 0xE0;
const STREAM_ID_AUDIO: u8 = 0xC0;

struct PacketizerStream {
    pid: u16,
    sid: u8,
    stream_type: u8,
}

/// The MPEG-TS packetizer. Owned once per [`crate::muxer::Muxer`] and
/// passed by `&mut` into whichever filter chain is currently active — see
/// Design Note D2 in `SPEC_FULL.md` for why this isn't a shared/ref-counted
/// sink.
pub struct Packetizer {
    streams: Vec<PacketizerStream>,
    pat_cc: ContinuityCounter,
    pmt_cc: ContinuityCounter,
    pcr_on_keyframes: bool,

    // Real-path draining state for the frame currently in flight.
    pending: BytesMut,
    emitted_any: bool,
    pcr_pending: bool,
    cur_pid: u16,
    cur_cc: Option<ContinuityCounter>,
    cur_dts: u64,

    // Simulated-path accounting.
    sim_offset: u32,
}

impl Packetizer {
    pub fn new(pcr_on_keyframes: bool) -> Self {
        Self {
            streams: Vec::new(),
            pat_cc: ContinuityCounter::new(),
            pmt_cc: ContinuityCounter::new(),
            pcr_on_keyframes,
            pending: BytesMut::new(),
            emitted_any: false,
            pcr_pending: false,
            cur_pid: 0,
            cur_cc: None,
            cur_dts: 0,
            sim_offset: 0,
        }
    }

    /// Register a track and assign it a PID/stream-id. Returns `(pid,
    /// stream_id)`; call order determines PID (`0x100 + index`).
    pub fn add_stream(&mut self, media_type: MediaType) -> (u16, u8) {
        let index = self.streams.len() as u16;
        let pid = 0x100 + index;
        let (sid, stream_type) = match media_type {
            MediaType::Video => (STREAM_ID_VIDEO, psi::STREAM_TYPE_H264),
            MediaType::Audio => (STREAM_ID_AUDIO, psi::STREAM_TYPE_AAC_ADTS),
        };
        self.streams.push(PacketizerStream {
            pid,
            sid,
            stream_type,
        });
        (pid, sid)
    }

    /// Whether the active stream this frame belongs to carries PTS+DTS
    /// (video) or PTS only (audio, per Design Note in `pes.rs`).
    fn includes_dts(&self, pid: u16) -> bool {
        self.streams
            .iter()
            .find(|s| s.pid == pid)
            .map(|s| s.stream_type == psi::STREAM_TYPE_H264)
            .unwrap_or(false)
    }

    /// Emit PAT and PMT through `sink`. Call once, after every track has
    /// been registered via `add_stream`.
    pub fn finalize_streams(&mut self, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        let pat_entries = [psi::PatEntry {
            program_number: 1,
            program_map_pid: psi::PID_PMT,
        }];
        let pat_section = psi::build_pat_section(&pat_entries, 0);
        let pat_packet = pes::build_ts_packet(
            psi::PID_PAT,
            true,
            self.pat_cc.next(),
            None,
            &pad_section(&pat_section),
        );
        sink(&pat_packet)?;

        let pcr_pid = self
            .streams
            .first()
            .map(|s| s.pid)
            .unwrap_or(psi::PID_PMT);
        let pmt_entries: Vec<psi::PmtStreamEntry> = self
            .streams
            .iter()
            .map(|s| psi::PmtStreamEntry {
                stream_type: s.stream_type,
                elementary_pid: s.pid,
            })
            .collect();
        let pmt_section = psi::build_pmt_section(pcr_pid, &pmt_entries, 0);
        let pmt_packet = pes::build_ts_packet(
            psi::PID_PMT,
            true,
            self.pmt_cc.next(),
            None,
            &pad_section(&pmt_section),
        );
        sink(&pmt_packet)?;

        Ok(())
    }

    /// Begin a new PES for `pid`/`cc`, writing its header into the pending
    /// buffer (draining any full packets the header alone produces, which
    /// in practice never happens since a PES header is always under 184
    /// bytes).
    pub fn start_frame(
        &mut self,
        pid: u16,
        cc: &ContinuityCounter,
        pts: u64,
        dts: u64,
        key: bool,
        sid: u8,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let include_dts = self.includes_dts(pid);
        let header = pes::build_pes_header(sid, pts, dts, include_dts);

        self.cur_pid = pid;
        self.cur_cc = Some(cc.clone());
        self.cur_dts = dts;
        self.pending = header;
        self.emitted_any = false;
        self.pcr_pending = self.pcr_on_keyframes && key;

        self.drain(sink)
    }

    /// Append elementary-stream bytes to the frame in flight, draining any
    /// TS packets that become full.
    pub fn write(&mut self, data: &[u8], sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        self.pending.extend_from_slice(data);
        self.drain(sink)
    }

    fn drain(&mut self, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        loop {
            let needs_pcr_now = !self.emitted_any && self.pcr_pending;
            let capacity = if !self.emitted_any {
                pes::first_packet_capacity(self.pcr_pending)
            } else {
                pes::FULL_PAYLOAD_CAPACITY
            };

            if self.pending.len() < capacity {
                break;
            }

            let payload = self.pending.split_to(capacity);
            let cc = self
                .cur_cc
                .as_ref()
                .expect("drain called without an active frame")
                .next();
            let pcr = needs_pcr_now.then_some(self.cur_dts);
            let packet = pes::build_ts_packet(self.cur_pid, !self.emitted_any, cc, pcr, &payload);
            sink(&packet)?;

            self.emitted_any = true;
            if needs_pcr_now {
                self.pcr_pending = false;
            }
        }
        Ok(())
    }

    /// Flush whatever remains of the frame in flight as one final,
    /// stuffing-padded TS packet, then clear the in-flight state.
    pub fn flush_frame(
        &mut self,
        _padding_size: u32,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        if !self.pending.is_empty() || !self.emitted_any {
            let needs_pcr_now = !self.emitted_any && self.pcr_pending;
            let payload = self.pending.split_to(self.pending.len());
            let cc = self
                .cur_cc
                .as_ref()
                .expect("flush_frame called without an active frame")
                .next();
            let pcr = needs_pcr_now.then_some(self.cur_dts);
            let packet = pes::build_ts_packet(self.cur_pid, !self.emitted_any, cc, pcr, &payload);
            sink(&packet)?;
        }

        self.pending.clear();
        self.emitted_any = false;
        self.pcr_pending = false;
        self.cur_cc = None;
        Ok(())
    }

    /// No-op unless a frame was left mid-flight (defensive only — every
    /// normal code path already drains to empty via `flush_frame`).
    pub fn flush(&mut self, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        if !self.pending.is_empty() {
            self.flush_frame(0, sink)?;
        }
        Ok(())
    }

    /// Account for the bytes a PAT+PMT pair would occupy at the start of a
    /// new simulated segment.
    pub fn simulated_start_segment(&mut self) {
        self.sim_offset += 2 * pes::TS_PACKET_SIZE as u32;
    }

    /// Account, without writing any bytes, for the TS packets one frame
    /// of `es_len` elementary-stream bytes on track `pid` would occupy.
    pub fn simulated_write_frame(&mut self, pid: u16, key: bool, es_len: u32) {
        let include_dts = self.includes_dts(pid);
        let header_len = pes::pes_header_len(include_dts) as u32;
        let needs_pcr = self.pcr_on_keyframes && key;
        let packets = pes::ts_packet_count(header_len + es_len, needs_pcr);
        self.sim_offset += packets * pes::TS_PACKET_SIZE as u32;
    }

    pub fn simulated_offset(&self) -> u32 {
        self.sim_offset
    }

    /// Zero the simulated byte counter, for a repeated simulation run over
    /// the same input (`Muxer::simulation_reset`).
    pub fn simulated_reset(&mut self) {
        self.sim_offset = 0;
    }
}

/// Pad a PSI section with a leading pointer field and trailing `0xFF` to
/// fill a single TS packet's payload capacity.
fn pad_section(section: &[u8]) -> BytesMut {
    let mut payload = BytesMut::with_capacity(pes::FULL_PAYLOAD_CAPACITY);
    payload.extend_from_slice(&[0x00]); // pointer_field: section starts immediately
    payload.extend_from_slice(section);
    while payload.len() < pes::FULL_PAYLOAD_CAPACITY {
        payload.extend_from_slice(&[0xFF]);
    }
    payload.truncate(pes::FULL_PAYLOAD_CAPACITY);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_sink(out: &mut Vec<u8>) -> impl FnMut(&[u8]) -> Result<()> + '_ {
        move |bytes: &[u8]| {
            out.extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_finalize_streams_emits_pat_and_pmt_packets() {
        let mut packetizer = Packetizer::new(true);
        packetizer.add_stream(MediaType::Video);
        packetizer.add_stream(MediaType::Audio);

        let mut out = Vec::new();
        packetizer
            .finalize_streams(&mut collecting_sink(&mut out))
            .unwrap();

        assert_eq!(out.len(), 2 * pes::TS_PACKET_SIZE);
        assert_eq!(out[0], pes::TS_SYNC_BYTE);
        assert_eq!(out[pes::TS_PACKET_SIZE], pes::TS_SYNC_BYTE);
    }

    #[test]
    fn test_real_and_simulated_offsets_agree_for_small_frame() {
        let mut real = Packetizer::new(true);
        let (pid, sid) = real.add_stream(MediaType::Audio);
        let cc = ContinuityCounter::new();

        let mut out = Vec::new();
        let mut sink = collecting_sink(&mut out);
        real.start_frame(pid, &cc, 1000, 1000, false, sid, &mut sink)
            .unwrap();
        real.write(&[0xAA; 100], &mut sink).unwrap();
        real.flush_frame(0, &mut sink).unwrap();

        let mut simulated = Packetizer::new(true);
        simulated.add_stream(MediaType::Audio);
        simulated.simulated_write_frame(pid, false, 100);

        assert_eq!(out.len() as u32, simulated.simulated_offset());
    }

    #[test]
    fn test_real_and_simulated_offsets_agree_across_multiple_packets() {
        let mut real = Packetizer::new(true);
        let (pid, sid) = real.add_stream(MediaType::Video);
        let cc = ContinuityCounter::new();

        let mut out = Vec::new();
        let mut sink = collecting_sink(&mut out);
        real.start_frame(pid, &cc, 1200, 1000, true, sid, &mut sink)
            .unwrap();
        real.write(&[0x11; 500], &mut sink).unwrap();
        real.flush_frame(0, &mut sink).unwrap();

        let mut simulated = Packetizer::new(true);
        simulated.add_stream(MediaType::Video);
        simulated.simulated_write_frame(pid, true, 500);

        assert_eq!(out.len() as u32, simulated.simulated_offset());
    }

    #[test]
    fn test_continuity_counter_advances_per_frame() {
        let mut real = Packetizer::new(false);
        let (pid, sid) = real.add_stream(MediaType::Audio);
        let cc = ContinuityCounter::new();

        let mut out = Vec::new();
        let mut sink = collecting_sink(&mut out);
        real.start_frame(pid, &cc, 1000, 1000, false, sid, &mut sink)
            .unwrap();
        real.write(&[0; 10], &mut sink).unwrap();
        real.flush_frame(0, &mut sink).unwrap();
        assert_eq!(cc.get(), 1);

        real.start_frame(pid, &cc, 2000, 2000, false, sid, &mut sink)
            .unwrap();
        real.write(&[0; 10], &mut sink).unwrap();
        real.flush_frame(0, &mut sink).unwrap();
        assert_eq!(cc.get(), 2);
    }
}
