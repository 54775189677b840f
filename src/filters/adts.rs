//! ADTS framing for AAC, stacked on top of the audio [`BufferFilter`].

use crate::error::{MuxError, Result};
use crate::frame::OutputFrame;
use crate::filters::buffer::BufferFilter;
use crate::packetizer::Packetizer;

const ADTS_HEADER_LEN: u32 = 7;

/// Fields decoded from an MPEG-4 `AudioSpecificConfig` (the first two bytes
/// of an `esds` box's decoder-specific info) needed to build ADTS headers.
struct AudioSpecificConfig {
    profile: u8, // ADTS profile = object_type - 1
    sampling_frequency_index: u8,
    channel_configuration: u8,
}

fn parse_audio_specific_config(extra_data: &[u8]) -> Result<AudioSpecificConfig> {
    if extra_data.len() < 2 {
        return Err(MuxError::BadData(
            "AudioSpecificConfig shorter than 2 bytes".to_string(),
        ));
    }
    let b0 = extra_data[0];
    let b1 = extra_data[1];

    let object_type = (b0 >> 3) & 0x1F;
    let sampling_frequency_index = ((b0 & 0x07) << 1) | (b1 >> 7);
    let channel_configuration = (b1 >> 3) & 0x0F;

    if object_type == 0 {
        return Err(MuxError::BadData("AudioSpecificConfig has object_type 0".to_string()));
    }

    Ok(AudioSpecificConfig {
        profile: object_type - 1,
        sampling_frequency_index,
        channel_configuration,
    })
}

/// Build a 7-byte ADTS header (no CRC) for a frame of `aac_payload_len`
/// raw AAC bytes.
fn build_adts_header(config: &AudioSpecificConfig, aac_payload_len: u32) -> [u8; 7] {
    let frame_length = ADTS_HEADER_LEN + aac_payload_len;

    let mut header = [0u8; 7];
    header[0] = 0xFF;
    header[1] = 0xF1; // syncword tail, MPEG-4, layer 00, protection_absent=1
    header[2] = (config.profile << 6)
        | (config.sampling_frequency_index << 2)
        | ((config.channel_configuration >> 2) & 0x01);
    header[3] = ((config.channel_configuration & 0x03) << 6)
        | ((frame_length >> 11) & 0x03) as u8;
    header[4] = ((frame_length >> 3) & 0xFF) as u8;
    header[5] = (((frame_length & 0x07) as u8) << 5) | 0x1F;
    header[6] = 0xFC;
    header
}

pub struct AdtsFilter {
    config: AudioSpecificConfig,
    buffer: BufferFilter,
}

impl AdtsFilter {
    pub fn new(extra_data: &[u8], target_buffer_size: u32) -> Result<Self> {
        Ok(Self {
            config: parse_audio_specific_config(extra_data)?,
            buffer: BufferFilter::new(target_buffer_size),
        })
    }

    /// `packetizer`/`sink` are accepted (and unused) only so this matches
    /// the signature `TopFilter::start_frame` dispatches to uniformly
    /// across both variants — the Buffer filter never writes to the
    /// packetizer except when its size threshold is reached in
    /// `flush_frame`.
    pub fn start_frame(
        &mut self,
        frame: &OutputFrame,
        _packetizer: &mut Packetizer,
        _sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        self.buffer.start_frame(frame)?;
        let header = build_adts_header(&self.config, frame.original_size);
        self.buffer.write(&header)?;
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.write(data)
    }

    pub fn flush_frame(
        &mut self,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        self.buffer.flush_frame(packetizer, sink)
    }

    pub fn force_flush(
        &mut self,
        packetizer: &mut Packetizer,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        self.buffer.force_flush(packetizer, sink)
    }

    pub fn buffer_dts(&self) -> Option<u64> {
        self.buffer.buffer_dts()
    }

    pub fn simulated_write(&mut self, packetizer: &mut Packetizer, frame: &OutputFrame) {
        let total_len = ADTS_HEADER_LEN + frame.original_size;
        self.buffer.simulated_write(packetizer, frame, total_len);
    }

    pub fn simulated_force_flush(&mut self, packetizer: &mut Packetizer) {
        self.buffer.simulated_force_flush(packetizer)
    }

    pub fn simulated_buffer_dts(&self) -> Option<u64> {
        self.buffer.simulated_buffer_dts()
    }

    pub fn simulation_supported(&self) -> bool {
        true
    }
}
