//! PSI tables: PAT, PMT, and the CRC-32/MPEG-2 trailer they both need.

use bytes::{BufMut, BytesMut};

pub const PID_PAT: u16 = 0x0000;
pub const PID_PMT: u16 = 0x1000;

pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0f;

/// CRC-32/MPEG-2: polynomial 0x04C11DB7, init 0xFFFFFFFF, no final XOR.
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// A single program's PAT entry: program number 0 carries the network PID,
/// all other program numbers carry a PMT PID.
pub struct PatEntry {
    pub program_number: u16,
    pub program_map_pid: u16,
}

/// Build a PAT section (table id, length, program entries, CRC), wrapped at
/// the caller's pointer-field + payload level (see [`super::Packetizer`]).
pub fn build_pat_section(entries: &[PatEntry], version: u8) -> BytesMut {
    let mut section = BytesMut::new();
    section.put_u8(TABLE_ID_PAT);

    // section_length placeholder, filled in below.
    let length_pos = section.len();
    section.put_u16(0);

    section.put_u16(1); // transport_stream_id
    section.put_u8(0xC0 | (version << 1) | 0x01); // reserved(2)=11, version(5), current_next=1
    section.put_u8(0); // section_number
    section.put_u8(0); // last_section_number

    for entry in entries {
        section.put_u16(entry.program_number);
        section.put_u16(0xE000 | entry.program_map_pid);
    }

    let section_length = (section.len() - length_pos - 2 + 4) as u16; // + CRC
    let length_bytes = (0xB000 | section_length).to_be_bytes();
    section[length_pos] = length_bytes[0];
    section[length_pos + 1] = length_bytes[1];

    let crc = crc32_mpeg2(&section);
    section.put_u32(crc);
    section
}

/// One elementary stream's entry in a PMT.
pub struct PmtStreamEntry {
    pub stream_type: u8,
    pub elementary_pid: u16,
}

/// Build a PMT section for a single program, PCR carried on the first
/// stream's PID.
pub fn build_pmt_section(pcr_pid: u16, streams: &[PmtStreamEntry], version: u8) -> BytesMut {
    let mut section = BytesMut::new();
    section.put_u8(TABLE_ID_PMT);

    let length_pos = section.len();
    section.put_u16(0);

    section.put_u16(1); // program_number
    section.put_u8(0xC0 | (version << 1) | 0x01);
    section.put_u8(0); // section_number
    section.put_u8(0); // last_section_number
    section.put_u16(0xE000 | pcr_pid);
    section.put_u16(0xF000); // program_info_length = 0

    for stream in streams {
        section.put_u8(stream.stream_type);
        section.put_u16(0xE000 | stream.elementary_pid);
        section.put_u16(0xF000); // ES_info_length = 0
    }

    let section_length = (section.len() - length_pos - 2 + 4) as u16;
    let length_bytes = (0xB000 | section_length).to_be_bytes();
    section[length_pos] = length_bytes[0];
    section[length_pos + 1] = length_bytes[1];

    let crc = crc32_mpeg2(&section);
    section.put_u32(crc);
    section
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_value() {
        // CRC over an empty buffer is just the (inverted) initial register.
        assert_eq!(crc32_mpeg2(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn test_pat_section_has_crc_and_length() {
        let entries = [PatEntry {
            program_number: 1,
            program_map_pid: PID_PMT,
        }];
        let section = build_pat_section(&entries, 0);
        // table_id(1) + length(2) + ts_id(2) + flags(1) + sect_no(1) + last(1)
        // + per-entry(4) + crc(4)
        assert_eq!(section.len(), 1 + 2 + 2 + 1 + 1 + 1 + 4 + 4);
        assert_eq!(section[0], TABLE_ID_PAT);
    }

    #[test]
    fn test_pmt_section_lists_all_streams() {
        let streams = [
            PmtStreamEntry {
                stream_type: STREAM_TYPE_H264,
                elementary_pid: 0x100,
            },
            PmtStreamEntry {
                stream_type: STREAM_TYPE_AAC_ADTS,
                elementary_pid: 0x101,
            },
        ];
        let section = build_pmt_section(0x100, &streams, 0);
        assert_eq!(section[0], TABLE_ID_PMT);
        assert_eq!(
            section.len(),
            1 + 2 + 2 + 1 + 1 + 1 + 2 + 2 + (5 * streams.len()) + 4
        );
    }
}
