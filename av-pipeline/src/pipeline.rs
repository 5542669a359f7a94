//! The demux, decode, transform, encode, mux loop.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::codec::{CodecProvider, EncoderSettings};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::io::{Sink, Source};
use crate::packet::Packet;
use crate::pump::CodecState;
use crate::stream::MediaType;
use crate::stream_table::{Mode, Route, StreamMapping, StreamTable};
use crate::timebase::{FirstPacketTime, Timestamp, TrimDecision, TrimRange, translate};
use crate::transform::{FrameTransform, Identity};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    pub mode: Mode,
    pub trim: TrimRange,
    pub video: EncoderSettings,
    pub audio: EncoderSettings,
}

impl PipelineOptions {
    pub fn remux() -> Self {
        Self {
            mode: Mode::Remux,
            ..Self::default()
        }
    }

    pub fn with_trim(mut self, trim: TrimRange) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_video(mut self, settings: EncoderSettings) -> Self {
        self.video = settings;
        self
    }

    pub fn with_audio(mut self, settings: EncoderSettings) -> Self {
        self.audio = settings;
        self
    }

    fn encoder_settings(&self, media_type: MediaType) -> &EncoderSettings {
        match media_type {
            MediaType::Audio => &self.audio,
            _ => &self.video,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub packets_read: u64,
    /// Unmapped streams, or past the end of the trim range.
    pub packets_discarded: u64,
    pub packets_written: u64,
    pub write_failures: u64,
    /// Decoded frames without a presentation time, not encoded.
    pub frames_dropped: u64,
    /// Packets written per destination stream.
    pub written_per_stream: BTreeMap<usize, u64>,
    pub cancelled: bool,
}

pub struct Pipeline {
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs to the end of the source, the end of the trim range or
    /// cancellation, whichever comes first.
    ///
    /// On success the sink has a trailer. On error every codec has still been
    /// released, but the sink must be considered unusable.
    pub fn run(
        &self,
        source: &mut dyn Source,
        sink: &mut dyn Sink,
        provider: &dyn CodecProvider,
        transform: &mut dyn FrameTransform,
    ) -> Result<RunStats> {
        let mut table = StreamTable::new();
        let mut run = Run {
            options: &self.options,
            sink,
            transform,
            stats: RunStats::default(),
        };
        let result = run.execute(&mut table, source, provider, &self.cancel);
        table.teardown();
        let stats = run.stats;
        result.map(|()| {
            log::info!(
                "run finished: read {} packets, wrote {}, discarded {}, {} write failures{}",
                stats.packets_read,
                stats.packets_written,
                stats.packets_discarded,
                stats.write_failures,
                if stats.cancelled { ", cancelled" } else { "" }
            );
            stats
        })
    }
}

/// Runs with default options and no frame transform.
pub fn run(
    source: &mut dyn Source,
    sink: &mut dyn Sink,
    provider: &dyn CodecProvider,
) -> Result<RunStats> {
    Pipeline::new(PipelineOptions::default()).run(source, sink, provider, &mut Identity)
}

struct Run<'a> {
    options: &'a PipelineOptions,
    sink: &'a mut dyn Sink,
    transform: &'a mut dyn FrameTransform,
    stats: RunStats,
}

impl Run<'_> {
    fn execute(
        &mut self,
        table: &mut StreamTable,
        source: &mut dyn Source,
        provider: &dyn CodecProvider,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for index in 0..source.stream_count() {
            let params = source.stream_parameters(index).map_err(|e| {
                PipelineError::StreamInfoUnavailable {
                    index,
                    reason: e.to_string(),
                }
            })?;
            let settings = self.options.encoder_settings(params.media_type);
            table.add_stream(index, &params, self.options.mode, provider, settings, self.sink)?;
        }
        if table.is_empty() {
            log::warn!("source has no stream to process");
        }

        self.sink
            .write_header()
            .map_err(PipelineError::HeaderWriteFailed)?;
        table.finalize(self.sink);

        if let Some(start) = self.options.trim.start() {
            if let Err(e) = source.seek(start) {
                log::warn!("seek to {:?} failed, reading from current position: {}", start, e);
            }
        }

        loop {
            if cancel.is_cancelled() {
                log::info!("cancelled, draining");
                self.stats.cancelled = true;
                break;
            }
            let packet = match source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("read failed, treating as end of input: {}", e);
                    break;
                }
            };
            self.stats.packets_read += 1;

            let Some(mapping) = table.get_mut(packet.stream_index) else {
                log::trace!(
                    "dropping {} byte packet of unmapped stream {}",
                    packet.size(),
                    packet.stream_index
                );
                self.stats.packets_discarded += 1;
                continue;
            };
            if mapping.finished {
                self.stats.packets_discarded += 1;
                continue;
            }
            let Some(packet) = trim_packet(mapping, packet, &self.options.trim) else {
                self.stats.packets_discarded += 1;
                if table.all_finished() {
                    log::debug!("every stream is past the end of the trim range");
                    break;
                }
                continue;
            };
            self.process(mapping, packet)?;
            if mapping.finished && table.all_finished() {
                log::debug!("every stream has ended");
                break;
            }
        }

        self.drain(table)?;
        self.sink
            .write_trailer()
            .map_err(PipelineError::TrailerWriteFailed)
    }

    fn process(&mut self, mapping: &mut StreamMapping, packet: Packet) -> Result<()> {
        let frames = match &mut mapping.route {
            Route::Copy => {
                self.write(mapping, packet);
                return Ok(());
            }
            Route::Transcode { decoder, .. } => decoder.feed_and_drain(packet)?,
        };
        for frame in frames {
            self.encode(mapping, frame)?;
        }
        if let Route::Transcode { decoder, encoder } = &mapping.route {
            if decoder.state() == CodecState::Closed || encoder.state() == CodecState::Closed {
                log::info!(
                    "stream {}: codec ended before the input, discarding the rest",
                    mapping.src_index
                );
                mapping.finished = true;
            }
        }
        Ok(())
    }

    fn encode(&mut self, mapping: &mut StreamMapping, frame: Frame) -> Result<()> {
        if !frame.pts.is_set() {
            self.stats.frames_dropped += 1;
            return Ok(());
        }
        let Route::Transcode { encoder, .. } = &mut mapping.route else {
            return Ok(());
        };
        if encoder.state() == CodecState::Closed {
            self.stats.frames_dropped += 1;
            return Ok(());
        }
        let mut frame = self
            .transform
            .transform(frame)
            .map_err(PipelineError::Transform)?;
        let time_base = encoder.codec().time_base();
        frame.pts = translate(frame.pts, frame.time_base, time_base);
        frame.time_base = time_base;

        let packets = encoder.feed_and_drain(frame)?;
        for packet in packets {
            self.write(mapping, packet);
        }
        Ok(())
    }

    /// Flushes decoders, then encoders.
    fn drain(&mut self, table: &mut StreamTable) -> Result<()> {
        for mapping in table.iter_mut() {
            let frames = match &mut mapping.route {
                Route::Transcode { decoder, .. } if decoder.state() != CodecState::Closed => {
                    decoder.drain()?
                }
                _ => continue,
            };
            log::debug!(
                "decoder of stream {} flushed {} frames",
                mapping.src_index,
                frames.len()
            );
            for frame in frames {
                self.encode(mapping, frame)?;
            }
        }
        for mapping in table.iter_mut() {
            let packets = match &mut mapping.route {
                Route::Transcode { encoder, .. } if encoder.state() != CodecState::Closed => {
                    encoder.drain()?
                }
                _ => continue,
            };
            log::debug!(
                "encoder of stream {} flushed {} packets",
                mapping.src_index,
                packets.len()
            );
            for packet in packets {
                self.write(mapping, packet);
            }
        }
        Ok(())
    }

    /// A failed write drops the packet; the run goes on.
    fn write(&mut self, mapping: &StreamMapping, packet: Packet) {
        let packet = mapping.to_destination(packet);
        let dst = packet.stream_index;
        match self.sink.write_packet_interleaved(packet) {
            Ok(()) => {
                self.stats.packets_written += 1;
                *self.stats.written_per_stream.entry(dst).or_default() += 1;
            }
            Err(e) => {
                self.stats.write_failures += 1;
                log::error!("stream {}: {}", dst, PipelineError::WriteFailed(e));
            }
        }
    }
}

/// Applies the trim range to a source packet and re-bases it so the kept
/// range starts at zero. `None` means the stream is past the end.
fn trim_packet(mapping: &mut StreamMapping, mut packet: Packet, trim: &TrimRange) -> Option<Packet> {
    if trim.is_unbounded() {
        return Some(packet);
    }
    if mapping.first_packet.is_none() {
        mapping.first_packet = FirstPacketTime::from_packet(packet.dts, packet.pts);
        if let Some(first) = mapping.first_packet {
            log::debug!(
                "stream {} starts at dts {} pts {} ({}), {:?} into the input",
                mapping.src_index,
                first.dts,
                first.pts,
                mapping.src_time_base,
                Timestamp::new(first.pts)
                    .to_duration(mapping.src_time_base)
                    .unwrap_or_default()
            );
        }
    }

    match trim.classify(packet.dts, packet.pts, packet.time_base) {
        TrimDecision::Stop => {
            log::debug!(
                "stream {} reached the end of the trim range at dts {}",
                mapping.src_index,
                packet.dts
            );
            mapping.finished = true;
            return None;
        }
        TrimDecision::KeepHidden => packet.pts = Timestamp::UNSET,
        TrimDecision::Keep => {}
    }

    if let Some(first) = mapping.first_packet {
        let (dts, pts) = first.rebase(packet.dts, packet.pts);
        packet.dts = dts;
        packet.pts = pts;
    }
    Some(packet)
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
