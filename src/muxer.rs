//! The muxer core: stream selection, frame interleaving, and the two
//! byte-exact simulation modes that must agree with it.

use tracing::{debug, trace, warn};

use crate::cache::{CacheLookup, ReadCache};
use crate::config::MuxerConfig;
use crate::error::{MuxError, Result};
use crate::frame::{FrameDescriptor, MediaType, TrackMetadata};
use crate::packetizer::{Packetizer, TS_OUTPUT_TIMESCALE};
use crate::rescale::rescale_time;
use crate::stream_state::StreamState;

/// Outcome of a `process` call: either the segment is fully muxed, or the
/// caller needs to supply more bytes at `offset` and call `process` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Complete,
    NeedMoreData { offset: u64 },
}

/// One trick-play extent: the byte range and duration of a single GOP
/// (from one keyframe up to, but not including, the next).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IframeExtent {
    pub segment_index: u32,
    pub duration_ms: u64,
    pub start_offset: u32,
    pub size: u32,
}

struct ActiveFrame {
    stream_index: usize,
    frame_offset: u64,
    frame_size: u32,
    pos: u32,
}

struct PendingExtent {
    segment_index: u32,
    start_offset: u32,
    start_time_ms: u64,
}

/// Interleaves per-track elementary frames into one MPEG-TS segment.
///
/// Single-threaded and fully synchronous: the only suspension point is a
/// cache miss inside [`Muxer::process`] (see the crate's concurrency
/// model), so `Muxer` freely holds `&mut` access to everything it owns.
pub struct Muxer {
    streams: Vec<StreamState>,
    packetizer: Packetizer,
    config: MuxerConfig,
    /// Milliseconds of video remaining inside the requested segment window,
    /// clamped per spec.md §4.1 step 6. Used as the final trick-play
    /// extent's duration bound in [`Muxer::simulate_get_iframes`].
    video_duration: u64,
    active: Option<ActiveFrame>,
}

impl Muxer {
    /// Build a muxer over `tracks` for the requested segment time window
    /// `[start_ms, end_ms]`, emitting PAT/PMT through `sink` immediately.
    pub fn init(
        tracks: Vec<TrackMetadata>,
        config: MuxerConfig,
        start_ms: u64,
        end_ms: u64,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<Self> {
        let mut sorted_tracks = tracks;
        sorted_tracks.sort_by_key(|t| (t.media_type.sort_key(), t.track_index));

        let mut packetizer = Packetizer::new(config.pcr_on_keyframes);
        let mut streams = Vec::with_capacity(sorted_tracks.len());
        let mut max_video_duration_ms: u64 = 0;

        for track in &sorted_tracks {
            let (pid, sid) = packetizer.add_stream(track.media_type);
            if track.media_type == MediaType::Video {
                let rescaled_ms = rescale_time(track.duration, track.source_timescale, 1000);
                max_video_duration_ms = max_video_duration_ms.max(rescaled_ms);
            }
            streams.push(StreamState::new(track, pid, sid, config.pes_payload_size)?);
        }

        packetizer.finalize_streams(sink)?;

        // video_duration = min(max_video_duration_ms, end) - start, clamped
        // to zero if the video does not reach `start` (spec.md §4.1 step 6;
        // see Design Note D-OQ1 for why this reads the local candidate
        // rather than the not-yet-assigned field the original C read).
        let video_duration = max_video_duration_ms.min(end_ms).saturating_sub(start_ms);

        debug!(
            track_count = streams.len(),
            start_ms, end_ms, video_duration, "muxer initialized"
        );

        Ok(Self {
            streams,
            packetizer,
            config,
            video_duration,
            active: None,
        })
    }

    /// Drive the mux forward, writing real TS bytes through `sink` and
    /// reading frame data from `cache`. Call repeatedly, satisfying each
    /// `NeedMoreData` offset, until `Complete`.
    pub fn process(
        &mut self,
        cache: &mut dyn ReadCache,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<ProcessOutcome> {
        let first_time = self.active.is_none();
        let mut wrote_data = false;

        loop {
            if self.active.is_none() {
                if !self.start_frame(sink)? {
                    for stream in &mut self.streams {
                        stream.filter.force_flush(&mut self.packetizer, sink)?;
                    }
                    self.packetizer.flush(sink)?;
                    return Ok(ProcessOutcome::Complete);
                }
            }

            let active = self.active.as_ref().expect("just ensured active is Some");
            let stream_index = active.stream_index;
            let offset = active.frame_offset + active.pos as u64;
            let pid = self.streams[stream_index].output_frame.pid;

            match cache.get(pid, offset) {
                CacheLookup::Miss => {
                    if !wrote_data && !first_time {
                        warn!(pid, offset, "input truncated mid-frame");
                        return Err(MuxError::BadData(format!(
                            "no data available for pid {pid} at offset {offset}"
                        )));
                    }
                    trace!(pid, offset, "suspending for more data");
                    return Ok(ProcessOutcome::NeedMoreData { offset });
                }
                CacheLookup::Hit(bytes) => {
                    wrote_data = true;
                    let active = self.active.as_mut().expect("checked above");
                    let remaining = active.frame_size - active.pos;
                    let take = (remaining as usize).min(bytes.len());
                    let chunk = bytes.slice(0..take);

                    self.streams[stream_index].filter.write(
                        &chunk,
                        &mut self.packetizer,
                        sink,
                    )?;

                    let active = self.active.as_mut().expect("checked above");
                    active.pos += take as u32;
                    if active.pos >= active.frame_size {
                        self.streams[stream_index].filter.flush_frame(
                            0,
                            &mut self.packetizer,
                            sink,
                        )?;
                        self.active = None;
                    }
                }
            }
        }
    }

    /// Byte-exact dry run: report the final segment size without any I/O.
    pub fn simulate_get_segment_size(&mut self) -> u32 {
        self.packetizer.simulated_start_segment();

        loop {
            let Some(chosen) = choose_stream(&self.streams) else {
                break;
            };
            let cur_frame_dts = self.streams[chosen].next_frame_dts;
            self.flush_lagging_buffers_simulated(cur_frame_dts, chosen);
            self.advance_chosen_stream(chosen);
            // `last_stream_frame` is meaningless for a segment-size-only
            // dry run; force it false so simulated output never depends on
            // it.
            self.streams[chosen].output_frame.last_stream_frame = false;
            let output_frame = self.streams[chosen].output_frame.clone();
            self.streams[chosen]
                .filter
                .simulated_write(&mut self.packetizer, &output_frame);
        }

        for stream in &mut self.streams {
            stream.filter.simulated_force_flush(&mut self.packetizer);
        }

        self.packetizer.simulated_offset()
    }

    /// Byte-exact dry run: report one trick-play extent per video
    /// keyframe, via `callback`, without any I/O other than the callback
    /// itself.
    pub fn simulate_get_iframes(
        &mut self,
        segment_duration_ms: u64,
        mut callback: impl FnMut(IframeExtent) -> Result<()>,
    ) -> Result<()> {
        let segment_duration_ticks = segment_duration_ms * 90;
        let mut segment_end_dts = segment_duration_ticks;
        self.packetizer.simulated_start_segment();

        let mut segment_index: u32 = 0;
        let mut pending: Option<PendingExtent> = None;
        let mut first_frame_time_ms: Option<u64> = None;

        loop {
            let Some(chosen) = choose_stream(&self.streams) else {
                break;
            };

            let cur_frame_dts = self.streams[chosen].next_frame_dts;
            let (frame, _frame_offset) = self.advance_chosen_stream(chosen);

            if cur_frame_dts >= segment_end_dts {
                for s in &mut self.streams {
                    s.filter.simulated_force_flush(&mut self.packetizer);
                }
                self.packetizer.simulated_start_segment();
                segment_index += 1;
                segment_end_dts += segment_duration_ticks;
            }

            self.flush_lagging_buffers_simulated(cur_frame_dts, chosen);

            let cur_frame_start = self.packetizer.simulated_offset();
            let last_frame = self.streams[chosen].next_frame_dts >= segment_end_dts;
            self.streams[chosen].output_frame.last_stream_frame = last_frame;

            let output_frame = self.streams[chosen].output_frame.clone();
            self.streams[chosen]
                .filter
                .simulated_write(&mut self.packetizer, &output_frame);

            if self.streams[chosen].media_type == MediaType::Video && frame.key_frame {
                let source_timescale = self.streams[chosen].source_timescale;
                let cur_frame_time_offset =
                    self.streams[chosen].next_frame_time_offset - frame.duration as u64;
                let cur_frame_time_ms = rescale_time(
                    cur_frame_time_offset + frame.pts_delay as u64,
                    source_timescale,
                    1000,
                );

                if let Some(p) = pending.take() {
                    // See Design Note D6: the closing size spans from the
                    // previous keyframe's start to this keyframe's start,
                    // not the single-frame placeholder a literal reading
                    // of the per-iteration description would produce.
                    let size = cur_frame_start - p.start_offset;
                    if cur_frame_time_ms > p.start_time_ms {
                        callback(IframeExtent {
                            segment_index: p.segment_index,
                            duration_ms: cur_frame_time_ms - p.start_time_ms,
                            start_offset: p.start_offset,
                            size,
                        })?;
                    }
                } else {
                    first_frame_time_ms = Some(cur_frame_time_ms);
                }

                pending = Some(PendingExtent {
                    segment_index,
                    start_offset: cur_frame_start,
                    start_time_ms: cur_frame_time_ms,
                });
            }
        }

        for s in &mut self.streams {
            s.filter.simulated_force_flush(&mut self.packetizer);
        }

        if let (Some(p), Some(first_ms)) = (pending, first_frame_time_ms) {
            let end_time_ms = first_ms + self.video_duration;
            if end_time_ms > p.start_time_ms {
                callback(IframeExtent {
                    segment_index: p.segment_index,
                    duration_ms: end_time_ms - p.start_time_ms,
                    start_offset: p.start_offset,
                    size: self.packetizer.simulated_offset() - p.start_offset,
                })?;
            }
        }

        Ok(())
    }

    /// Rewind every stream (and the packetizer's simulated byte counter) to
    /// the state right after `init`, for a repeated simulation run over the
    /// same input.
    pub fn simulation_reset(&mut self) {
        self.active = None;
        for stream in &mut self.streams {
            stream.reset();
        }
        self.packetizer.simulated_reset();
    }

    /// Pick the next frame to mux, run the cross-stream delayed-flush
    /// check, advance the chosen stream, and hand its Output Frame to the
    /// filter chain's real `start_frame`. Returns `false` if no stream has
    /// frames remaining.
    fn start_frame(&mut self, sink: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<bool> {
        let Some(chosen) = choose_stream(&self.streams) else {
            return Ok(false);
        };

        let cur_frame_dts = self.streams[chosen].next_frame_dts;
        self.flush_lagging_buffers_real(cur_frame_dts, chosen, sink)?;
        let (frame, frame_offset) = self.advance_chosen_stream(chosen);

        let output_frame = self.streams[chosen].output_frame.clone();
        self.streams[chosen]
            .filter
            .start_frame(&output_frame, &mut self.packetizer, sink)?;

        self.active = Some(ActiveFrame {
            stream_index: chosen,
            frame_offset,
            frame_size: frame.size,
            pos: 0,
        });
        Ok(true)
    }

    /// Advance `chosen`'s cursor/timing and populate its Output Frame.
    /// Shared by the real path and both simulation paths so the timing
    /// arithmetic can't drift between them.
    fn advance_chosen_stream(&mut self, chosen: usize) -> (FrameDescriptor, u64) {
        let stream = &mut self.streams[chosen];
        let frame = stream.frames[stream.cursor];
        let frame_offset = stream.frame_offsets[stream.cursor];
        stream.cursor += 1;

        let dts = stream.next_frame_dts;
        let cur_frame_time_offset = stream.next_frame_time_offset;
        stream.next_frame_time_offset += frame.duration as u64;
        stream.next_frame_dts = rescale_time(
            stream.next_frame_time_offset,
            stream.source_timescale,
            TS_OUTPUT_TIMESCALE,
        );

        // Rescale `cur_frame_time_offset + pts_delay` as one expression
        // (spec.md §4.4 step 3) rather than summing two independently
        // rounded rescales, which can disagree with it by a tick.
        let pts = rescale_time(
            cur_frame_time_offset + frame.pts_delay as u64,
            stream.source_timescale,
            TS_OUTPUT_TIMESCALE,
        );
        let last_stream_frame = stream.cursor >= stream.frames.len();

        stream.output_frame.pts = pts;
        stream.output_frame.dts = dts;
        stream.output_frame.key = frame.key_frame;
        stream.output_frame.original_size = frame.size;
        stream.output_frame.last_stream_frame = last_stream_frame;

        (frame, frame_offset)
    }

    fn flush_lagging_buffers_real(
        &mut self,
        cur_frame_dts: u64,
        chosen: usize,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let threshold = self.config.hls_delay_ticks / 2;
        for i in 0..self.streams.len() {
            if i == chosen {
                continue;
            }
            if let Some(buffer_dts) = self.streams[i].filter.buffer_dts() {
                if cur_frame_dts > buffer_dts + threshold {
                    trace!(stream = i, buffer_dts, "force-flushing lagging audio buffer");
                    self.streams[i].filter.force_flush(&mut self.packetizer, sink)?;
                }
            }
        }
        Ok(())
    }

    fn flush_lagging_buffers_simulated(&mut self, cur_frame_dts: u64, chosen: usize) {
        let threshold = self.config.hls_delay_ticks / 2;
        for i in 0..self.streams.len() {
            if i == chosen {
                continue;
            }
            if let Some(buffer_dts) = self.streams[i].filter.simulated_buffer_dts() {
                if cur_frame_dts > buffer_dts + threshold {
                    self.streams[i].filter.simulated_force_flush(&mut self.packetizer);
                }
            }
        }
    }
}

/// Among streams with frames remaining, the one with the smallest
/// `next_frame_dts`; ties break toward the earlier array position, which
/// after `init`'s sort means video before audio, then ascending
/// `track_index`.
fn choose_stream(streams: &[StreamState]) -> Option<usize> {
    streams
        .iter()
        .enumerate()
        .filter(|(_, s)| s.has_frames_remaining())
        .min_by_key(|(_, s)| s.next_frame_dts)
        .map(|(i, _)| i)
}
