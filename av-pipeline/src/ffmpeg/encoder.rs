use bytes::Bytes;
use ffmpeg_next::{Codec as AvCodec, Dictionary, codec, ffi, frame, picture};

use super::{
    NativeParameters, error_is_again, pixel_format, read_context, sample_format, set_channel_layout,
    to_rational, to_time_base, write_context,
};
use crate::codec::{Codec, Received};
use crate::error::CodecError;
use crate::frame::{Frame, FrameKind};
use crate::packet::Packet;
use crate::stream::CodecParameters;
use crate::timebase::{TimeBase, Timestamp};

pub enum EncoderType {
    Video(codec::encoder::Video),
    Audio(codec::encoder::Audio),
}

impl EncoderType {
    fn context(&self) -> &codec::Context {
        match self {
            EncoderType::Video(encoder) => encoder,
            EncoderType::Audio(encoder) => encoder,
        }
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        let result = match self {
            EncoderType::Video(encoder) => {
                let av = to_video_frame(frame)?;
                encoder.send_frame(&av)
            }
            EncoderType::Audio(encoder) => {
                let av = to_audio_frame(frame)?;
                encoder.send_frame(&av)
            }
        };
        result.map_err(|e| CodecError::Failed(e.to_string()))
    }

    fn send_eof(&mut self) -> Result<(), ffmpeg_next::Error> {
        match self {
            EncoderType::Video(encoder) => encoder.send_eof(),
            EncoderType::Audio(encoder) => encoder.send_eof(),
        }
    }

    fn receive_packet(&mut self, packet: &mut ffmpeg_next::Packet) -> Result<(), ffmpeg_next::Error> {
        match self {
            EncoderType::Video(encoder) => encoder.receive_packet(packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(packet),
        }
    }
}

/// A video or audio encoder. Takes frames in the time base it was opened
/// with and emits packets in the same base.
pub struct FfmpegEncoder {
    codec: AvCodec,
    global_header: bool,
    inner: Option<EncoderType>,
    time_base: TimeBase,
}

unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    pub fn new(codec: AvCodec, global_header: bool) -> Self {
        Self {
            codec,
            global_header,
            inner: None,
            time_base: TimeBase::MICROSECONDS,
        }
    }

    fn inner(&mut self) -> Result<&mut EncoderType, CodecError> {
        self.inner
            .as_mut()
            .ok_or_else(|| CodecError::Failed("encoder is not open".to_string()))
    }
}

impl Codec<Frame, Packet> for FfmpegEncoder {
    fn name(&self) -> &str {
        self.codec.name()
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        let mut ctx = codec::Context::new_with_codec(self.codec);
        let mut params = params.clone();
        params.codec_id = self.codec.id().name().into();
        // encoders generate their own
        params.extradata = Bytes::new();
        write_context(&mut ctx, &params);
        if self.global_header {
            ctx.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        for (key, value) in &params.options {
            options.set(key, value);
        }

        let rejected = |e: ffmpeg_next::Error| CodecError::ConfigRejected(e.to_string());
        let inner = if params.is_video() {
            let mut encoder = ctx.encoder().video().map_err(rejected)?;
            encoder.set_width(params.width);
            encoder.set_height(params.height);
            encoder.set_format(pixel_format(params.pixel_format.as_deref()).into());
            encoder.set_time_base(to_rational(params.time_base));
            if let Some((num, den)) = params.frame_rate {
                encoder.set_frame_rate(Some(ffmpeg_next::Rational::new(num, den)));
            }
            if params.bit_rate > 0 {
                encoder.set_bit_rate(params.bit_rate as usize);
            }
            if let Some(gop) = params.gop_size {
                encoder.set_gop(gop);
            }
            EncoderType::Video(encoder.open_with(options).map_err(rejected)?)
        } else if params.is_audio() {
            let mut encoder = ctx.encoder().audio().map_err(rejected)?;
            encoder.set_rate(params.sample_rate as i32);
            encoder.set_format(sample_format(params.sample_format.as_deref()).into());
            encoder.set_time_base(to_rational(params.time_base));
            if params.bit_rate > 0 {
                encoder.set_bit_rate(params.bit_rate as usize);
            }
            EncoderType::Audio(encoder.open_with(options).map_err(rejected)?)
        } else {
            return Err(CodecError::ConfigRejected(format!(
                "{} is neither audio nor video",
                params.codec_id
            )));
        };

        let time_base: ffmpeg_next::Rational = unsafe { (*inner.context().as_ptr()).time_base.into() };
        self.time_base = to_time_base(time_base).unwrap_or(params.time_base);
        log::info!("encoder {} opened, time base {}", self.codec.name(), self.time_base);
        self.inner = Some(inner);
        Ok(())
    }

    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn parameters(&self) -> CodecParameters {
        match &self.inner {
            Some(inner) => {
                let mut params = read_context(inner.context(), self.time_base);
                params.native = NativeParameters::from_context(inner.context());
                params
            }
            None => CodecParameters::other(self.codec.id().name(), self.time_base),
        }
    }

    fn send(&mut self, input: Option<Frame>) -> Result<(), CodecError> {
        let inner = self.inner()?;
        match input {
            Some(frame) => inner.send_frame(&frame),
            None => match inner.send_eof() {
                Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
                Err(e) => Err(CodecError::Failed(e.to_string())),
            },
        }
    }

    fn receive(&mut self) -> Result<Received<Packet>, CodecError> {
        let time_base = self.time_base;
        let inner = self.inner()?;
        let mut av = ffmpeg_next::Packet::empty();
        match inner.receive_packet(&mut av) {
            Ok(()) => {
                let data = av.data().map(Bytes::copy_from_slice).unwrap_or_default();
                Ok(Received::Unit(
                    Packet::new(av.stream(), data, time_base)
                        .with_timestamps(Timestamp::from(av.dts()), Timestamp::from(av.pts()))
                        .with_duration(av.duration())
                        .with_key(av.is_key()),
                ))
            }
            Err(ffmpeg_next::Error::Eof) => Ok(Received::EndOfStream),
            Err(e) if error_is_again(&e) => Ok(Received::WouldBlock),
            Err(e) => Err(CodecError::Failed(e.to_string())),
        }
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

fn to_video_frame(frame: &Frame) -> Result<frame::Video, CodecError> {
    let FrameKind::Video {
        width,
        height,
        pixel_format: format,
    } = &frame.kind
    else {
        return Err(CodecError::Failed("audio frame sent to a video encoder".to_string()));
    };
    let mut av = frame::Video::new(pixel_format(Some(format)).into(), *width, *height);
    for (plane, data) in frame.planes.iter().enumerate().take(av.planes()) {
        let src_stride = frame.line_sizes.get(plane).copied().unwrap_or(0);
        let dst_stride = av.stride(plane);
        if src_stride == 0 || dst_stride == 0 {
            continue;
        }
        let row = src_stride.min(dst_stride);
        let dst = av.data_mut(plane);
        for (src_row, dst_row) in data.chunks(src_stride).zip(dst.chunks_mut(dst_stride)) {
            let n = row.min(src_row.len());
            dst_row[..n].copy_from_slice(&src_row[..n]);
        }
    }
    av.set_pts(frame.pts.value());
    av.set_kind(picture::Type::None);
    Ok(av)
}

fn to_audio_frame(frame: &Frame) -> Result<frame::Audio, CodecError> {
    let FrameKind::Audio {
        sample_rate,
        channels,
        channel_layout,
        sample_format: format,
        samples,
    } = &frame.kind
    else {
        return Err(CodecError::Failed("video frame sent to an audio encoder".to_string()));
    };
    let mut av = frame::Audio::empty();
    unsafe {
        let f = av.as_mut_ptr();
        (*f).format = sample_format(Some(format)) as i32;
        (*f).nb_samples = *samples as i32;
        (*f).sample_rate = *sample_rate as i32;
        set_channel_layout(&mut (*f).ch_layout, *channel_layout, *channels);
        if ffi::av_frame_get_buffer(f, 0) < 0 {
            return Err(CodecError::Failed("cannot allocate audio frame".to_string()));
        }
    }
    for (plane, data) in frame.planes.iter().enumerate().take(av.planes()) {
        let dst = av.data_mut(plane);
        let n = dst.len().min(data.len());
        dst[..n].copy_from_slice(&data[..n]);
    }
    av.set_pts(frame.pts.value());
    Ok(av)
}
