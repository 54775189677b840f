//! Audio Buffer filter: accumulates consecutive AAC frames (already
//! ADTS-framed by the filter above it) into one PES, flushing once the
//! accumulated payload reaches a target size.

use crate::error::Result;
use crate::frame::OutputFrame;
use crate::packetizer::Packetizer;

/// Header source captured from the oldest frame currently buffered.
#[derive(Clone)]
struct PendingHeader {
    frame: OutputFrame,
}

pub struct BufferFilter {
    target_size: u32,
    pending: Vec<u8>,
    header: Option<PendingHeader>,

    sim_pending_size: u32,
    sim_header: Option<OutputFrame>,
}

impl BufferFilter {
    pub fn new(target_size: u32) -> Self {
        Self {
            target_size,
            pending: Vec::new(),
            header: None,
            sim_pending_size: 0,
            sim_header: None,
        }
    }

    pub fn start_frame(&mut self, frame: &OutputFrame) -> Result<()> {
        if self.header.is_none() {
            self.header = Some(PendingHeader {
                frame: frame.clone(),
            });
        }
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        Ok(())
    }

    pub fn flush_frame(&mut self, packetizer: &mut Packetizer, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        if self.pending.len() as u32 >= self.target_size {
            self.emit(packetizer, sink)?;
        }
        Ok(())
    }

    pub fn force_flush(&mut self, packetizer: &mut Packetizer, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        if !self.pending.is_empty() {
            self.emit(packetizer, sink)?;
        }
        Ok(())
    }

    pub fn buffer_dts(&self) -> Option<u64> {
        self.header.as_ref().map(|h| h.frame.dts)
    }

    fn emit(&mut self, packetizer: &mut Packetizer, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        let header = self.header.take().expect("emit called with nothing buffered");
        packetizer.start_frame(
            header.frame.pid,
            &header.frame.cc,
            header.frame.pts,
            header.frame.dts,
            header.frame.key,
            header.frame.sid,
            sink,
        )?;
        packetizer.write(&self.pending, sink)?;
        packetizer.flush_frame(0, sink)?;
        self.pending.clear();
        Ok(())
    }

    // --- simulated path ---

    pub fn simulated_write(&mut self, packetizer: &mut Packetizer, frame: &OutputFrame, es_len: u32) {
        if self.sim_header.is_none() {
            self.sim_header = Some(frame.clone());
        }
        self.sim_pending_size += es_len;
        if self.sim_pending_size >= self.target_size {
            self.simulated_emit(packetizer);
        }
    }

    pub fn simulated_force_flush(&mut self, packetizer: &mut Packetizer) {
        if self.sim_pending_size > 0 {
            self.simulated_emit(packetizer);
        }
    }

    pub fn simulated_buffer_dts(&self) -> Option<u64> {
        self.sim_header.as_ref().map(|f| f.dts)
    }

    fn simulated_emit(&mut self, packetizer: &mut Packetizer) {
        let header = self
            .sim_header
            .take()
            .expect("simulated emit called with nothing buffered");
        packetizer.simulated_write_frame(header.pid, header.key, self.sim_pending_size);
        self.sim_pending_size = 0;
    }
}
