use ffmpeg_next::{codec, ffi, format};

use super::decoder::to_av_packet;
use super::{codec_id, to_rational, to_time_base, write_context};
use crate::error::SinkError;
use crate::io::Sink;
use crate::packet::Packet;
use crate::stream::CodecParameters;
use crate::timebase::TimeBase;

/// A muxer writing to a file or URL. The container is picked from the
/// locator's extension.
pub struct FfmpegSink {
    inner: format::context::Output,
    have_written_header: bool,
    have_written_trailer: bool,
}

unsafe impl Send for FfmpegSink {}

impl FfmpegSink {
    pub fn open(locator: &str) -> Result<Self, SinkError> {
        let inner = format::output(locator).map_err(|e| match e {
            ffmpeg_next::Error::MuxerNotFound => SinkError::Unsupported(format!("{locator}: {e}")),
            e => SinkError::IoFailure(format!("{locator}: {e}")),
        })?;
        log::info!("output {} opened as {}", locator, inner.format().name());
        Ok(Self {
            inner,
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    /// Whether the container wants codec headers out of band.
    pub fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER)
    }
}

impl Sink for FfmpegSink {
    fn add_stream(&mut self, params: &CodecParameters) -> Result<usize, SinkError> {
        if self.have_written_header {
            return Err(SinkError::Unsupported("header already written".to_string()));
        }
        let encoder = codec_id(&params.codec_id).and_then(ffmpeg_next::encoder::find);
        let mut stream = self
            .inner
            .add_stream(encoder)
            .map_err(|e| SinkError::IoFailure(e.to_string()))?;

        let ret = match &params.native {
            Some(native) => unsafe {
                ffi::avcodec_parameters_copy((*stream.as_mut_ptr()).codecpar, native.as_ptr())
            },
            None => {
                let mut ctx = codec::Context::new();
                write_context(&mut ctx, params);
                unsafe {
                    ffi::avcodec_parameters_from_context((*stream.as_mut_ptr()).codecpar, ctx.as_ptr())
                }
            }
        };
        if ret < 0 {
            return Err(SinkError::IoFailure(ffmpeg_next::Error::from(ret).to_string()));
        }
        unsafe {
            (*(*stream.as_mut_ptr()).codecpar).codec_tag = 0;
        }
        stream.set_time_base(to_rational(params.time_base));
        Ok(stream.index())
    }

    fn write_header(&mut self) -> Result<(), SinkError> {
        self.inner
            .write_header()
            .map_err(|e| SinkError::HeaderRejected(e.to_string()))?;
        self.have_written_header = true;
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<TimeBase> {
        to_time_base(self.inner.stream(index)?.time_base())
    }

    fn write_packet_interleaved(&mut self, packet: Packet) -> Result<(), SinkError> {
        if !self.have_written_header {
            return Err(SinkError::WriteFailure("header not written".to_string()));
        }
        let mut av = to_av_packet(&packet);
        av.write_interleaved(&mut self.inner)
            .map_err(|e| SinkError::WriteFailure(e.to_string()))
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer().map_err(trailer_error)?;
        }
        Ok(())
    }
}

fn trailer_error(e: ffmpeg_next::Error) -> SinkError {
    SinkError::WriteFailure(format!("trailer: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::{NativeParameters, channel_mask, init};

    /// 5.1 PCM, whose block alignment and layout cannot be derived from
    /// the channel count.
    fn pcm_surround() -> NativeParameters {
        let mut source = codec::Parameters::new();
        unsafe {
            let p = source.as_mut_ptr();
            (*p).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
            (*p).codec_id = ffi::AVCodecID::AV_CODEC_ID_PCM_S16LE;
            (*p).format = ffi::AVSampleFormat::AV_SAMPLE_FMT_S16 as i32;
            (*p).sample_rate = 48000;
            (*p).block_align = 12;
            (*p).bits_per_coded_sample = 16;
            ffi::av_channel_layout_from_mask(&mut (*p).ch_layout, 0x60F);
        }
        NativeParameters::copy_of(&source).unwrap()
    }

    #[test]
    fn native_parameters_are_copied_whole() {
        init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mkv");
        let mut sink = FfmpegSink::open(path.to_str().unwrap()).unwrap();

        let mut params = CodecParameters::audio("pcm_s16le", 48000, 6, "s16");
        params.native = Some(pcm_surround());
        let index = sink.add_stream(&params).unwrap();

        let stream = sink.inner.stream(index).unwrap();
        let par = unsafe { &*(*stream.as_ptr()).codecpar };
        assert_eq!(par.block_align, 12);
        assert_eq!(par.bits_per_coded_sample, 16);
        assert_eq!(par.ch_layout.nb_channels, 6);
        assert_eq!(channel_mask(&par.ch_layout), 0x60F);
        assert_eq!(par.codec_tag, 0);
        assert_eq!(sink.stream_time_base(index), Some(TimeBase::new(1, 48000)));
    }

    #[test]
    fn trailer_failures_are_write_failures() {
        let err = trailer_error(ffmpeg_next::Error::Other {
            errno: ffmpeg_next::util::error::EAGAIN,
        });
        assert!(matches!(err, SinkError::WriteFailure(ref reason) if reason.starts_with("trailer")));
    }
}
