//! PES header construction and TS-packet-level byte accounting.
//!
//! The draining loop in [`super::Packetizer`] and the byte-exact simulation
//! path both need to agree, exactly, on how many 188-byte TS packets a PES
//! payload of a given length occupies. [`ts_packet_count`] is the single
//! source of truth both paths call into.

use bytes::{BufMut, BytesMut};

pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
/// Bytes available for payload in a TS packet carrying no adaptation field.
pub const FULL_PAYLOAD_CAPACITY: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
/// Adaptation-field overhead when carrying a PCR: length byte + flags byte
/// + 6-byte PCR.
pub const PCR_ADAPTATION_OVERHEAD: usize = 8;

/// Payload capacity of the first TS packet of a PES, which alone may carry
/// a PCR-bearing adaptation field.
pub fn first_packet_capacity(needs_pcr: bool) -> usize {
    if needs_pcr {
        FULL_PAYLOAD_CAPACITY - PCR_ADAPTATION_OVERHEAD
    } else {
        FULL_PAYLOAD_CAPACITY
    }
}

/// Number of 188-byte TS packets needed to carry `total_len` bytes of PES
/// data (header included), given whether the first packet also carries a
/// PCR adaptation field.
pub fn ts_packet_count(total_len: u32, needs_pcr: bool) -> u32 {
    let total_len = total_len as u64;
    let first_cap = first_packet_capacity(needs_pcr) as u64;
    if total_len <= first_cap {
        return 1;
    }
    let remaining = total_len - first_cap;
    let continuing = FULL_PAYLOAD_CAPACITY as u64;
    1 + ((remaining + continuing - 1) / continuing) as u32
}

/// Encode a 33-bit PTS/DTS value into its 5-byte PES representation.
/// `marker_nibble` is `0b0010` for a lone PTS, `0b0011` for PTS when a DTS
/// follows, `0b0001` for the DTS itself.
fn timestamp_bytes(marker_nibble: u8, value: u64) -> [u8; 5] {
    let v = value & 0x1_FFFF_FFFF;
    [
        (marker_nibble << 4) | ((((v >> 30) & 0x07) as u8) << 1) | 0x01,
        ((v >> 22) & 0xFF) as u8,
        ((((v >> 15) & 0x7F) as u8) << 1) | 0x01,
        ((v >> 7) & 0xFF) as u8,
        (((v & 0x7F) as u8) << 1) | 0x01,
    ]
}

/// Length of the PES header `build_pes_header` will produce, without
/// actually building it.
pub fn pes_header_len(has_dts: bool) -> usize {
    if has_dts {
        19
    } else {
        14
    }
}

/// Build a PES header with `PES_packet_length = 0` (unbounded, valid for
/// elementary streams carried outside a Program Stream).
///
/// `include_dts` is decided by media type, not by comparing `pts` and
/// `dts` at call time (video always carries PTS+DTS, audio always carries
/// PTS only) — see [`super::Packetizer::start_frame`]. This keeps header
/// length a function of which track is being muxed, so the byte-exact
/// simulation path never has to know a frame's actual PTS.
pub fn build_pes_header(stream_id: u8, pts: u64, dts: u64, include_dts: bool) -> BytesMut {
    let has_dts = include_dts;
    let mut header = BytesMut::with_capacity(pes_header_len(has_dts));

    header.put_u8(0x00);
    header.put_u8(0x00);
    header.put_u8(0x01);
    header.put_u8(stream_id);
    header.put_u16(0); // pes_packet_length: unbounded

    header.put_u8(0x80); // '10' marker + no scrambling/priority/alignment/copyright flags
    header.put_u8(if has_dts { 0xC0 } else { 0x80 }); // PTS_DTS_flags
    header.put_u8(if has_dts { 10 } else { 5 }); // PES_header_data_length

    let pts_marker = if has_dts { 0x3 } else { 0x2 };
    header.extend_from_slice(&timestamp_bytes(pts_marker, pts));
    if has_dts {
        header.extend_from_slice(&timestamp_bytes(0x1, dts));
    }

    header
}

/// Build the 4-byte TS packet header.
fn write_ts_header(packet: &mut BytesMut, pid: u16, pusi: bool, afc: u8, cc: u8) {
    packet.put_u8(TS_SYNC_BYTE);
    packet.put_u8(((pusi as u8) << 6) | (((pid >> 8) as u8) & 0x1F));
    packet.put_u8((pid & 0xFF) as u8);
    packet.put_u8((afc << 4) | (cc & 0x0F));
}

/// Build an adaptation field occupying exactly `total_af_bytes` bytes
/// (including its own length byte), optionally carrying a PCR (given in
/// 90kHz ticks; encoded as the 33-bit PCR base with a zero 9-bit
/// extension) and the random-access indicator.
fn build_adaptation_field(pcr: Option<u64>, random_access: bool, total_af_bytes: usize) -> BytesMut {
    let mut af = BytesMut::with_capacity(total_af_bytes);

    if pcr.is_none() && total_af_bytes == 1 {
        af.put_u8(0);
        return af;
    }

    let body_len = total_af_bytes - 1;
    af.put_u8(body_len as u8);

    let mut flags = 0u8;
    if pcr.is_some() {
        flags |= 0x10;
    }
    if random_access {
        flags |= 0x40;
    }
    af.put_u8(flags);

    if let Some(pcr_value) = pcr {
        let base = pcr_value & 0x1_FFFF_FFFF;
        let ext: u16 = 0;
        af.put_u8((base >> 25) as u8);
        af.put_u8((base >> 17) as u8);
        af.put_u8((base >> 9) as u8);
        af.put_u8((base >> 1) as u8);
        af.put_u8((((base & 0x1) as u8) << 7) | 0x7E | ((ext >> 8) as u8 & 0x01));
        af.put_u8((ext & 0xFF) as u8);
    }

    let consumed = 1 + if pcr.is_some() { 6 } else { 0 };
    let stuffing = body_len - consumed;
    for _ in 0..stuffing {
        af.put_u8(0xFF);
    }

    af
}

/// Build one complete 188-byte TS packet carrying `payload`, padding with
/// an adaptation field as needed so the packet is always exactly
/// `TS_PACKET_SIZE` bytes.
pub fn build_ts_packet(pid: u16, pusi: bool, cc: u8, pcr: Option<u64>, payload: &[u8]) -> BytesMut {
    debug_assert!(payload.len() <= FULL_PAYLOAD_CAPACITY);
    if pcr.is_some() {
        debug_assert!(payload.len() <= first_packet_capacity(true));
    }

    let padding_needed = TS_PACKET_SIZE - TS_HEADER_SIZE - payload.len();
    let has_adaptation = pcr.is_some() || padding_needed > 0;

    let mut packet = BytesMut::with_capacity(TS_PACKET_SIZE);
    write_ts_header(
        &mut packet,
        pid,
        pusi,
        if has_adaptation { 0b11 } else { 0b01 },
        cc,
    );

    if has_adaptation {
        let af = build_adaptation_field(pcr, pcr.is_some(), padding_needed);
        packet.extend_from_slice(&af);
    }
    packet.extend_from_slice(payload);

    debug_assert_eq!(packet.len(), TS_PACKET_SIZE);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_only_header_length() {
        let header = build_pes_header(0xE0, 1000, 1000, false);
        assert_eq!(header.len(), 14);
        assert_eq!(&header[0..3], &[0x00, 0x00, 0x01]);
        assert_eq!(header[3], 0xE0);
        assert_eq!(header[7], 0x80); // PTS only flag
        assert_eq!(header[8], 5);
    }

    #[test]
    fn test_pts_dts_header_length() {
        let header = build_pes_header(0xC0, 1200, 1000, true);
        assert_eq!(header.len(), 19);
        assert_eq!(header[7], 0xC0);
        assert_eq!(header[8], 10);
    }

    #[test]
    fn test_timestamp_round_trip_low_bits() {
        let header = build_pes_header(0xE0, 0x1_2345_6789 & 0x1_FFFF_FFFF, 1000, true);
        // Marker bits (low bit of each relevant byte) must always be 1.
        assert_eq!(header[9] & 0x01, 0x01);
        assert_eq!(header[11] & 0x01, 0x01);
        assert_eq!(header[13] & 0x01, 0x01);
    }

    #[test]
    fn test_packet_count_single_packet() {
        assert_eq!(ts_packet_count(100, false), 1);
        assert_eq!(ts_packet_count(184, false), 1);
    }

    #[test]
    fn test_packet_count_spills_into_second_packet() {
        assert_eq!(ts_packet_count(185, false), 2);
        assert_eq!(ts_packet_count(184 + 184, false), 2);
        assert_eq!(ts_packet_count(184 + 184 + 1, false), 3);
    }

    #[test]
    fn test_packet_count_with_pcr_reserves_capacity() {
        assert_eq!(ts_packet_count(176, true), 1);
        assert_eq!(ts_packet_count(177, true), 2);
    }

    #[test]
    fn test_build_ts_packet_is_always_188_bytes() {
        let packet = build_ts_packet(0x100, true, 3, None, &[0xAB; 184]);
        assert_eq!(packet.len(), TS_PACKET_SIZE);

        let short = build_ts_packet(0x100, false, 4, None, &[0xCD; 50]);
        assert_eq!(short.len(), TS_PACKET_SIZE);

        let one_byte_pad = build_ts_packet(0x100, false, 5, None, &[0xEE; 183]);
        assert_eq!(one_byte_pad.len(), TS_PACKET_SIZE);

        let with_pcr = build_ts_packet(0x100, true, 6, Some(90_000), &[0xAA; 176]);
        assert_eq!(with_pcr.len(), TS_PACKET_SIZE);
    }

    #[test]
    fn test_continuity_counter_in_header() {
        let packet = build_ts_packet(0x101, true, 9, None, &[0; 100]);
        assert_eq!(packet[3] & 0x0F, 9);
    }
}
