//! Muxer configuration.

use serde::{Deserialize, Serialize};

use crate::packetizer::DEFAULT_PES_PAYLOAD_SIZE;

/// Tunable knobs for a [`crate::muxer::Muxer`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxerConfig {
    /// Target size, in bytes, of a buffered audio PES before it is flushed.
    pub pes_payload_size: u32,

    /// Inter-stream delay budget, in 90kHz ticks, before a lagging audio
    /// buffer is force-flushed ahead of a newly-selected video frame.
    pub hls_delay_ticks: u64,

    /// Whether to carry a PCR in the adaptation field of the first TS
    /// packet of a video keyframe's PES.
    pub pcr_on_keyframes: bool,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            pes_payload_size: DEFAULT_PES_PAYLOAD_SIZE,
            hls_delay_ticks: 135_000,
            pcr_on_keyframes: true,
        }
    }
}

impl MuxerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: MuxerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Install a `tracing-subscriber` filtered by `RUST_LOG` (default `info`).
///
/// Library code never calls this; it exists for binaries and tests that
/// want the muxer's `tracing` events on stderr.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
