use bytes::Bytes;
use ffmpeg_next::{Codec as AvCodec, codec, frame};

use super::{channel_mask, error_is_again, pixel_name, read_context, sample_name, write_context};
use crate::codec::{Codec, Received};
use crate::error::CodecError;
use crate::frame::{Frame, FrameKind};
use crate::packet::Packet;
use crate::stream::CodecParameters;
use crate::timebase::{TimeBase, Timestamp};

enum DecoderType {
    Video(codec::decoder::Video),
    Audio(codec::decoder::Audio),
}

impl DecoderType {
    fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<(), ffmpeg_next::Error> {
        match self {
            DecoderType::Video(decoder) => decoder.send_packet(packet),
            DecoderType::Audio(decoder) => decoder.send_packet(packet),
        }
    }

    fn send_eof(&mut self) -> Result<(), ffmpeg_next::Error> {
        match self {
            DecoderType::Video(decoder) => decoder.send_eof(),
            DecoderType::Audio(decoder) => decoder.send_eof(),
        }
    }

    fn context(&self) -> &codec::Context {
        match self {
            DecoderType::Video(decoder) => decoder,
            DecoderType::Audio(decoder) => decoder,
        }
    }
}

/// A video or audio decoder. Frames come out in the packet time base.
pub struct FfmpegDecoder {
    codec: AvCodec,
    inner: Option<DecoderType>,
    time_base: TimeBase,
    params: Option<CodecParameters>,
}

unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    pub fn new(codec: AvCodec) -> Self {
        Self {
            codec,
            inner: None,
            time_base: TimeBase::MICROSECONDS,
            params: None,
        }
    }

    fn inner(&mut self) -> Result<&mut DecoderType, CodecError> {
        self.inner
            .as_mut()
            .ok_or_else(|| CodecError::Failed("decoder is not open".to_string()))
    }

    fn receive_frame(&mut self) -> Result<Option<Frame>, ffmpeg_next::Error> {
        let time_base = self.time_base;
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match inner {
            DecoderType::Video(decoder) => {
                let mut decoded = frame::Video::empty();
                decoder.receive_frame(&mut decoded)?;
                Ok(Some(video_frame(&decoded, time_base)))
            }
            DecoderType::Audio(decoder) => {
                let mut decoded = frame::Audio::empty();
                decoder.receive_frame(&mut decoded)?;
                Ok(Some(audio_frame(&decoded, time_base)))
            }
        }
    }
}

impl Codec<Packet, Frame> for FfmpegDecoder {
    fn name(&self) -> &str {
        self.codec.name()
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        let mut ctx = codec::Context::new_with_codec(self.codec);
        write_context(&mut ctx, params);
        let decoder = ctx.decoder();
        let inner = if params.is_video() {
            let decoder = decoder
                .video()
                .map_err(|e| CodecError::ConfigRejected(e.to_string()))?;
            if decoder.width() == 0 || decoder.height() == 0 {
                return Err(CodecError::ConfigRejected(
                    "missing codec parameters".to_string(),
                ));
            }
            DecoderType::Video(decoder)
        } else if params.is_audio() {
            let decoder = decoder
                .audio()
                .map_err(|e| CodecError::ConfigRejected(e.to_string()))?;
            DecoderType::Audio(decoder)
        } else {
            return Err(CodecError::ConfigRejected(format!(
                "{} is neither audio nor video",
                params.codec_id
            )));
        };
        self.time_base = params.time_base;
        self.params = Some(read_context(inner.context(), params.time_base));
        self.inner = Some(inner);
        Ok(())
    }

    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn parameters(&self) -> CodecParameters {
        match &self.inner {
            Some(inner) => read_context(inner.context(), self.time_base),
            None => self.params.clone().unwrap_or_else(|| {
                CodecParameters::other(self.codec.name(), self.time_base)
            }),
        }
    }

    fn send(&mut self, input: Option<Packet>) -> Result<(), CodecError> {
        let inner = self.inner()?;
        let result = match input {
            Some(packet) => inner.send_packet(&to_av_packet(&packet)),
            None => inner.send_eof(),
        };
        match result {
            Ok(()) => Ok(()),
            // damaged packet, the decoder resyncs on its own
            Err(ffmpeg_next::Error::InvalidData) => {
                log::debug!("{}: skipping invalid packet", self.codec.name());
                Ok(())
            }
            Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(e) => Err(CodecError::Failed(e.to_string())),
        }
    }

    fn receive(&mut self) -> Result<Received<Frame>, CodecError> {
        match self.receive_frame() {
            Ok(Some(frame)) => Ok(Received::Unit(frame)),
            Ok(None) => Err(CodecError::Failed("decoder is not open".to_string())),
            Err(ffmpeg_next::Error::Eof) => Ok(Received::EndOfStream),
            Err(e) if error_is_again(&e) => Ok(Received::WouldBlock),
            Err(e) => Err(CodecError::Failed(e.to_string())),
        }
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

pub(crate) fn to_av_packet(packet: &Packet) -> ffmpeg_next::Packet {
    let mut av = ffmpeg_next::Packet::copy(&packet.data);
    av.set_dts(packet.dts.value());
    av.set_pts(packet.pts.value());
    av.set_duration(packet.duration);
    av.set_stream(packet.stream_index);
    av.set_position(-1);
    if packet.is_key {
        av.set_flags(ffmpeg_next::codec::packet::Flags::KEY);
    }
    av
}

fn video_frame(decoded: &frame::Video, time_base: TimeBase) -> Frame {
    let pixel_format = pixel_name(decoded.format().into()).unwrap_or_default();
    let mut frame = Frame {
        planes: Vec::with_capacity(decoded.planes()),
        line_sizes: Vec::with_capacity(decoded.planes()),
        pts: Timestamp::from(decoded.pts()),
        time_base,
        kind: FrameKind::Video {
            width: decoded.width(),
            height: decoded.height(),
            pixel_format,
        },
    };
    for plane in 0..decoded.planes() {
        frame.planes.push(Bytes::copy_from_slice(decoded.data(plane)));
        frame.line_sizes.push(decoded.stride(plane));
    }
    frame
}

fn audio_frame(decoded: &frame::Audio, time_base: TimeBase) -> Frame {
    let sample_format = sample_name(decoded.format().into()).unwrap_or_default();
    let mut frame = Frame {
        planes: Vec::with_capacity(decoded.planes()),
        line_sizes: Vec::with_capacity(decoded.planes()),
        pts: Timestamp::from(decoded.pts()),
        time_base,
        kind: FrameKind::Audio {
            sample_rate: decoded.rate(),
            channels: decoded.channels(),
            channel_layout: channel_mask(unsafe { &(*decoded.as_ptr()).ch_layout }),
            sample_format,
            samples: decoded.samples(),
        },
    };
    for plane in 0..decoded.planes() {
        let data = decoded.data(plane);
        frame.line_sizes.push(data.len());
        frame.planes.push(Bytes::copy_from_slice(data));
    }
    frame
}
