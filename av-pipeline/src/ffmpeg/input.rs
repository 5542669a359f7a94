use std::ffi::CString;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use ffmpeg_next::{Dictionary, codec, format};

use super::{NativeParameters, read_context, to_time_base};
use crate::error::SourceError;
use crate::io::Source;
use crate::packet::Packet;
use crate::stream::CodecParameters;
use crate::timebase::{TimeBase, Timestamp};

/// A demuxer over a file or URL.
pub struct FfmpegSource {
    inner: format::context::Input,
    streams: Vec<Result<CodecParameters, String>>,
}

unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(locator: &str) -> Result<Self, SourceError> {
        Self::open_with(locator, None, None)
    }

    /// Opens `locator` with a forced input format (e.g. "v4l2", "mpegts")
    /// and demuxer options.
    pub fn open_with(
        locator: &str,
        format_name: Option<&str>,
        options: Option<Dictionary>,
    ) -> Result<Self, SourceError> {
        let path = Path::new(locator);
        let opened = match format_name {
            Some(name) => {
                let fmt = find_input_format(name)?;
                format::open_with(path, &format::format::Format::Input(fmt), options.unwrap_or_default())
                    .map(|ctx| ctx.input())
            }
            None => match options {
                Some(opts) => format::input_with_dictionary(path, opts),
                None => format::input(path),
            },
        };
        let inner = opened.map_err(|e| match e {
            ffmpeg_next::Error::DemuxerNotFound
            | ffmpeg_next::Error::ProtocolNotFound
            | ffmpeg_next::Error::InvalidData => SourceError::Unsupported(format!("{locator}: {e}")),
            e => SourceError::NotFound(format!("{locator}: {e}")),
        })?;

        let streams = inner.streams().map(|stream| stream_parameters(&stream)).collect::<Vec<_>>();
        for (index, params) in streams.iter().enumerate() {
            match params {
                Ok(p) => log::info!(
                    "input stream {}: {} {:?}, time base {}",
                    index,
                    p.codec_id,
                    p.media_type,
                    p.time_base
                ),
                Err(reason) => log::warn!("input stream {}: {}", index, reason),
            }
        }
        Ok(Self { inner, streams })
    }

    fn time_base(&self, index: usize) -> Option<TimeBase> {
        self.streams.get(index)?.as_ref().ok().map(|p| p.time_base)
    }
}

fn find_input_format(name: &str) -> Result<format::format::Input, SourceError> {
    let cname = CString::new(name)
        .map_err(|e| SourceError::Unsupported(format!("invalid format name {name:?}: {e}")))?;
    let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
    if ptr.is_null() {
        return Err(SourceError::Unsupported(format!("input format not found: {name}")));
    }
    Ok(unsafe { format::format::Input::wrap(ptr as *mut _) })
}

fn stream_parameters(stream: &format::stream::Stream) -> Result<CodecParameters, String> {
    let time_base = to_time_base(stream.time_base())
        .ok_or_else(|| format!("invalid time base {}", stream.time_base()))?;
    let native = stream.parameters();
    let ctx = codec::Context::from_parameters(native.clone()).map_err(|e| e.to_string())?;
    let mut params = read_context(&ctx, time_base);
    params.native = NativeParameters::copy_of(&native);
    let rate = stream.avg_frame_rate();
    if rate.numerator() > 0 && rate.denominator() > 0 {
        params.frame_rate = Some((rate.numerator(), rate.denominator()));
    }
    Ok(params)
}

impl Source for FfmpegSource {
    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn stream_parameters(&self, index: usize) -> Result<CodecParameters, SourceError> {
        match self.streams.get(index) {
            Some(Ok(params)) => Ok(params.clone()),
            Some(Err(reason)) => Err(SourceError::Unsupported(reason.clone())),
            None => Err(SourceError::NotFound(format!("stream {index}"))),
        }
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        loop {
            let mut av = ffmpeg_next::Packet::empty();
            match av.read(&mut self.inner) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(SourceError::Read(e.to_string())),
            }
            // streams without usable parameters were never mapped
            let Some(time_base) = self.time_base(av.stream()) else {
                continue;
            };
            let data = av.data().map(Bytes::copy_from_slice).unwrap_or_default();
            return Ok(Some(
                Packet::new(av.stream(), data, time_base)
                    .with_timestamps(Timestamp::from(av.dts()), Timestamp::from(av.pts()))
                    .with_duration(av.duration())
                    .with_key(av.is_key()),
            ));
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), SourceError> {
        let target = i64::try_from(position.as_micros()).unwrap_or(i64::MAX);
        self.inner
            .seek(target, ..target)
            .map_err(|e| SourceError::Read(format!("seek to {position:?}: {e}")))
    }
}
