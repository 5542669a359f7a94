//! Source stream to destination stream bookkeeping.

use std::collections::HashMap;

use crate::codec::{CodecProvider, EncoderSettings};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::io::Sink;
use crate::packet::Packet;
use crate::pump::{CodecPump, codec_failure};
use crate::stream::{CodecParameters, MediaType};
use crate::timebase::{FirstPacketTime, TimeBase};

/// Whether streams are re-encoded or copied as they are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Transcode,
    Remux,
}

pub enum Route {
    Transcode {
        decoder: CodecPump<Packet, Frame>,
        encoder: CodecPump<Frame, Packet>,
    },
    Copy,
}

pub struct StreamMapping {
    pub src_index: usize,
    pub dst_index: usize,
    pub media_type: MediaType,
    pub src_time_base: TimeBase,
    dst_time_base: TimeBase,
    finalized: bool,
    pub route: Route,
    /// First packet kept on this stream, in `src_time_base`.
    pub first_packet: Option<FirstPacketTime>,
    /// Past the end of the trim range.
    pub finished: bool,
}

impl StreamMapping {
    /// Destination time base. Only final once the header has been written.
    pub fn dst_time_base(&self) -> TimeBase {
        self.dst_time_base
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Readies a packet for the sink: destination index, destination time
    /// base.
    pub fn to_destination(&self, mut packet: Packet) -> Packet {
        packet.rescale_ts(self.dst_time_base);
        packet.stream_index = self.dst_index;
        packet
    }
}

#[derive(Default)]
pub struct StreamTable {
    mappings: Vec<StreamMapping>,
    by_src: HashMap<usize, usize>,
    torn_down: bool,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a source stream to a new destination stream.
    ///
    /// Returns `None` for streams that are skipped: unidentified codecs, and
    /// streams that are neither audio nor video when transcoding. Codecs are
    /// opened before the sink sees the stream, so a codec failure leaves
    /// neither a mapping nor a destination stream behind.
    pub fn add_stream(
        &mut self,
        src_index: usize,
        params: &CodecParameters,
        mode: Mode,
        provider: &dyn CodecProvider,
        settings: &EncoderSettings,
        sink: &mut dyn Sink,
    ) -> Result<Option<usize>> {
        if self.by_src.contains_key(&src_index) {
            return Ok(self.get(src_index).map(|m| m.dst_index));
        }
        if !params.codec_id.is_identified() {
            log::info!("skipping source stream {}: unidentified codec", src_index);
            return Ok(None);
        }

        let (route, dst_params) = match mode {
            Mode::Remux => (Route::Copy, params.clone()),
            Mode::Transcode => {
                if params.media_type == MediaType::Other {
                    log::info!(
                        "skipping source stream {}: {} is neither audio nor video",
                        src_index,
                        params.codec_id
                    );
                    return Ok(None);
                }
                let (decoder, encoder) = open_codecs(params, provider, settings)?;
                let dst_params = encoder.codec().parameters();
                (Route::Transcode { decoder, encoder }, dst_params)
            }
        };

        let dst_index = match sink.add_stream(&dst_params) {
            Ok(index) => index,
            Err(e) => {
                if let Route::Transcode {
                    mut decoder,
                    mut encoder,
                } = route
                {
                    encoder.release();
                    decoder.release();
                }
                return Err(PipelineError::SinkOpenFailed(e));
            }
        };

        let dst_time_base = match &route {
            Route::Transcode { encoder, .. } => encoder.codec().time_base(),
            Route::Copy => params.time_base,
        };
        log::info!(
            "source stream {} ({:?} {}) -> destination stream {}, time base {} -> {}",
            src_index,
            params.media_type,
            params.codec_id,
            dst_index,
            params.time_base,
            dst_time_base
        );

        self.by_src.insert(src_index, self.mappings.len());
        self.mappings.push(StreamMapping {
            src_index,
            dst_index,
            media_type: params.media_type,
            src_time_base: params.time_base,
            dst_time_base,
            finalized: false,
            route,
            first_packet: None,
            finished: false,
        });
        Ok(Some(dst_index))
    }

    /// Picks up the time bases the sink settled on when writing the header.
    /// Called once, right after the header.
    pub fn finalize(&mut self, sink: &dyn Sink) {
        for mapping in &mut self.mappings {
            match sink.stream_time_base(mapping.dst_index) {
                Some(tb) if tb.is_valid() => {
                    if tb != mapping.dst_time_base {
                        log::info!(
                            "destination stream {} time base changed by header: {} -> {}",
                            mapping.dst_index,
                            mapping.dst_time_base,
                            tb
                        );
                    }
                    mapping.dst_time_base = tb;
                }
                _ => log::warn!(
                    "no time base for destination stream {}, keeping {}",
                    mapping.dst_index,
                    mapping.dst_time_base
                ),
            }
            mapping.finalized = true;
        }
    }

    pub fn get(&self, src_index: usize) -> Option<&StreamMapping> {
        self.by_src.get(&src_index).map(|&i| &self.mappings[i])
    }

    pub fn get_mut(&mut self, src_index: usize) -> Option<&mut StreamMapping> {
        self.by_src.get(&src_index).map(|&i| &mut self.mappings[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamMapping> {
        self.mappings.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StreamMapping> {
        self.mappings.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn all_finished(&self) -> bool {
        !self.mappings.is_empty() && self.mappings.iter().all(|m| m.finished)
    }

    /// Releases every codec context, newest first. Runs once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        for mapping in self.mappings.iter_mut().rev() {
            if let Route::Transcode { decoder, encoder } = &mut mapping.route {
                encoder.release();
                decoder.release();
            }
        }
        log::debug!("released codecs of {} streams", self.mappings.len());
    }
}

fn open_codecs(
    params: &CodecParameters,
    provider: &dyn CodecProvider,
    settings: &EncoderSettings,
) -> Result<(CodecPump<Packet, Frame>, CodecPump<Frame, Packet>)> {
    let mut decoder = provider
        .find_decoder(&params.codec_id)
        .ok_or_else(|| PipelineError::CodecUnavailable(format!("{} decoder", params.codec_id)))?;
    decoder
        .open(params)
        .map_err(|e| codec_failure(decoder.name(), e))?;
    let mut decoder = CodecPump::new(decoder);

    let encoder = match &settings.encoder {
        Some(name) => provider.find_encoder_by_name(name),
        None => provider.find_encoder(&params.codec_id),
    };
    let Some(mut encoder) = encoder else {
        decoder.release();
        let wanted = settings
            .encoder
            .clone()
            .unwrap_or_else(|| format!("{} encoder", params.codec_id));
        return Err(PipelineError::CodecUnavailable(wanted));
    };
    let encoder_params = settings.encoder_parameters(params, &decoder.codec().parameters());
    if let Err(e) = encoder.open(&encoder_params) {
        decoder.release();
        return Err(codec_failure(encoder.name(), e));
    }
    log::debug!(
        "opened {} -> {} ({:?}, time base {})",
        decoder.name(),
        encoder.name(),
        params.media_type,
        encoder.time_base()
    );
    Ok((decoder, CodecPump::new(encoder)))
}

#[cfg(test)]
#[path = "stream_table_test.rs"]
mod stream_table_test;
