//! FFmpeg-backed [`Source`](crate::io::Source), [`Sink`](crate::io::Sink) and
//! [`CodecProvider`].

use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use ffmpeg_next::ffi;
use ffmpeg_next::{Rational, codec, media};

use crate::codec::{BoxDecoder, BoxEncoder, CodecProvider};
use crate::stream::{CodecId, CodecParameters, MediaType};
use crate::timebase::TimeBase;

mod decoder;
mod encoder;
mod input;
mod output;

pub use decoder::FfmpegDecoder;
pub use encoder::FfmpegEncoder;
pub use input::FfmpegSource;
pub use output::FfmpegSink;

/// Registers FFmpeg components. Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

/// Looks codecs up in the linked FFmpeg build.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegCodecProvider {
    global_header: bool,
}

impl FfmpegCodecProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoders write their headers out of band, as some containers (mp4,
    /// mkv) require. See [`FfmpegSink::needs_global_header`].
    pub fn with_global_header(mut self, global_header: bool) -> Self {
        self.global_header = global_header;
        self
    }
}

impl CodecProvider for FfmpegCodecProvider {
    fn find_decoder(&self, id: &CodecId) -> Option<BoxDecoder> {
        let codec = ffmpeg_next::decoder::find(codec_id(id)?)?;
        Some(Box::new(FfmpegDecoder::new(codec)))
    }

    fn find_encoder(&self, id: &CodecId) -> Option<BoxEncoder> {
        let codec = ffmpeg_next::encoder::find(codec_id(id)?)?;
        Some(Box::new(FfmpegEncoder::new(codec, self.global_header)))
    }

    fn find_encoder_by_name(&self, name: &str) -> Option<BoxEncoder> {
        let codec = ffmpeg_next::encoder::find_by_name(name)?;
        Some(Box::new(FfmpegEncoder::new(codec, self.global_header)))
    }
}

/// Shared, read-only copy of an `AVCodecParameters`.
#[derive(Clone)]
pub struct NativeParameters(Arc<codec::Parameters>);

// owned deep copies, never mutated after construction
unsafe impl Send for NativeParameters {}
unsafe impl Sync for NativeParameters {}

impl NativeParameters {
    /// Deep copy of a demuxer stream's parameters.
    pub fn copy_of(source: &codec::Parameters) -> Option<Self> {
        let mut parameters = codec::Parameters::new();
        let ret = unsafe { ffi::avcodec_parameters_copy(parameters.as_mut_ptr(), source.as_ptr()) };
        (ret >= 0).then(|| Self(Arc::new(parameters)))
    }

    /// Snapshot of an opened codec context, extradata included.
    pub(crate) fn from_context(ctx: &codec::Context) -> Option<Self> {
        let mut parameters = codec::Parameters::new();
        let ret = unsafe { ffi::avcodec_parameters_from_context(parameters.as_mut_ptr(), ctx.as_ptr()) };
        (ret >= 0).then(|| Self(Arc::new(parameters)))
    }

    pub fn as_ptr(&self) -> *const ffi::AVCodecParameters {
        self.0.as_ptr()
    }
}

impl fmt::Debug for NativeParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeParameters").field(&self.0.id()).finish()
    }
}

impl PartialEq for NativeParameters {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Native channel mask of a layout, 0 when the order is not a plain mask.
pub(crate) fn channel_mask(layout: &ffi::AVChannelLayout) -> u64 {
    if layout.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE {
        unsafe { layout.u.mask }
    } else {
        0
    }
}

/// Fills `layout` from a channel mask, or the default layout for `channels`
/// when there is no mask.
pub(crate) unsafe fn set_channel_layout(layout: *mut ffi::AVChannelLayout, mask: u64, channels: u16) {
    unsafe {
        ffi::av_channel_layout_uninit(layout);
        if mask == 0 || ffi::av_channel_layout_from_mask(layout, mask) < 0 {
            ffi::av_channel_layout_default(layout, channels as i32);
        }
    }
}

pub(crate) fn to_time_base(rational: Rational) -> Option<TimeBase> {
    TimeBase::try_new(rational.numerator(), rational.denominator())
}

pub(crate) fn to_rational(time_base: TimeBase) -> Rational {
    Rational::new(time_base.num, time_base.den)
}

fn codec_id(id: &CodecId) -> Option<codec::Id> {
    if !id.is_identified() {
        return None;
    }
    let name = CString::new(id.name()).ok()?;
    let descriptor = unsafe { ffi::avcodec_descriptor_get_by_name(name.as_ptr()) };
    if descriptor.is_null() {
        return None;
    }
    Some(unsafe { (*descriptor).id }.into())
}

fn c_name(ptr: *const std::os::raw::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

pub(crate) fn pixel_name(format: ffi::AVPixelFormat) -> Option<String> {
    c_name(unsafe { ffi::av_get_pix_fmt_name(format) })
}

pub(crate) fn sample_name(format: ffi::AVSampleFormat) -> Option<String> {
    c_name(unsafe { ffi::av_get_sample_fmt_name(format) })
}

pub(crate) fn pixel_format(name: Option<&str>) -> ffi::AVPixelFormat {
    name.and_then(|n| CString::new(n).ok())
        .map(|n| unsafe { ffi::av_get_pix_fmt(n.as_ptr()) })
        .unwrap_or(ffi::AVPixelFormat::AV_PIX_FMT_NONE)
}

pub(crate) fn sample_format(name: Option<&str>) -> ffi::AVSampleFormat {
    name.and_then(|n| CString::new(n).ok())
        .map(|n| unsafe { ffi::av_get_sample_fmt(n.as_ptr()) })
        .unwrap_or(ffi::AVSampleFormat::AV_SAMPLE_FMT_NONE)
}

/// Reads codec parameters off a codec context.
pub(crate) fn read_context(ctx: &codec::Context, time_base: TimeBase) -> CodecParameters {
    let media_type = match ctx.medium() {
        media::Type::Video => MediaType::Video,
        media::Type::Audio => MediaType::Audio,
        _ => MediaType::Other,
    };
    let id = ctx.id();
    let codec_id = if id == codec::Id::None {
        CodecId::none()
    } else {
        CodecId::new(id.name())
    };
    let mut params = CodecParameters::other(codec_id, time_base);
    params.media_type = media_type;
    unsafe {
        let c = ctx.as_ptr();
        params.bit_rate = (*c).bit_rate;
        match media_type {
            MediaType::Video => {
                params.width = (*c).width.max(0) as u32;
                params.height = (*c).height.max(0) as u32;
                params.pixel_format = pixel_name((*c).pix_fmt);
                let rate = (*c).framerate;
                if rate.num > 0 && rate.den > 0 {
                    params.frame_rate = Some((rate.num, rate.den));
                }
            }
            MediaType::Audio => {
                params.sample_rate = (*c).sample_rate.max(0) as u32;
                params.channels = (*c).ch_layout.nb_channels.max(0) as u16;
                params.channel_layout = channel_mask(&(*c).ch_layout);
                params.sample_format = sample_name((*c).sample_fmt);
            }
            MediaType::Other => {}
        }
        if !(*c).extradata.is_null() && (*c).extradata_size > 0 {
            let data = std::slice::from_raw_parts((*c).extradata, (*c).extradata_size as usize);
            params.extradata = Bytes::copy_from_slice(data);
        }
    }
    params
}

/// Writes codec parameters into a codec context that has not been opened.
pub(crate) fn write_context(ctx: &mut codec::Context, params: &CodecParameters) {
    unsafe {
        let c = ctx.as_mut_ptr();
        (*c).codec_type = match params.media_type {
            MediaType::Video => media::Type::Video,
            MediaType::Audio => media::Type::Audio,
            MediaType::Other => media::Type::Data,
        }
        .into();
        if let Some(id) = codec_id(&params.codec_id) {
            (*c).codec_id = id.into();
        }
        (*c).time_base = to_rational(params.time_base).into();
        (*c).pkt_timebase = to_rational(params.time_base).into();
        (*c).bit_rate = params.bit_rate;
        match params.media_type {
            MediaType::Video => {
                (*c).width = params.width as i32;
                (*c).height = params.height as i32;
                (*c).pix_fmt = pixel_format(params.pixel_format.as_deref());
                if let Some((num, den)) = params.frame_rate {
                    (*c).framerate = Rational::new(num, den).into();
                }
            }
            MediaType::Audio => {
                (*c).sample_rate = params.sample_rate as i32;
                (*c).sample_fmt = sample_format(params.sample_format.as_deref());
                set_channel_layout(&mut (*c).ch_layout, params.channel_layout, params.channels);
            }
            MediaType::Other => {}
        }
        if !params.extradata.is_empty() {
            let size = params.extradata.len();
            let buf = ffi::av_mallocz(size + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize) as *mut u8;
            if !buf.is_null() {
                std::ptr::copy_nonoverlapping(params.extradata.as_ptr(), buf, size);
                ffi::av_freep(&mut (*c).extradata as *mut *mut u8 as *mut std::ffi::c_void);
                (*c).extradata = buf;
                (*c).extradata_size = size as i32;
            }
        }
    }
}

pub(crate) fn error_is_again(err: &ffmpeg_next::Error) -> bool {
    matches!(err, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}
