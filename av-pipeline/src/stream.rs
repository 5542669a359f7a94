use std::fmt;

use bytes::Bytes;

use crate::timebase::TimeBase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Other,
}

/// Codec identifier, by the codec's short name (`h264`, `aac`, ...).
///
/// `"none"` marks a stream whose codec the demuxer could not identify.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecId(String);

impl CodecId {
    pub const NONE: &'static str = "none";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_identified(&self) -> bool {
        !self.0.is_empty() && self.0 != Self::NONE
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CodecId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Everything needed to configure a codec or create a container stream.
///
/// Video fields are zero/`None` for audio streams and the other way round.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    pub media_type: MediaType,
    pub codec_id: CodecId,
    pub time_base: TimeBase,
    /// Frames per second as `num/den`.
    pub frame_rate: Option<(i32, i32)>,
    pub bit_rate: i64,

    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<String>,

    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,
    pub sample_format: Option<String>,

    pub extradata: Bytes,

    // Encoder only.
    pub gop_size: Option<u32>,
    pub options: Vec<(String, String)>,

    /// Stream parameters exactly as the demuxer or an opened encoder
    /// reported them. Muxers copy these whole when present.
    #[cfg(feature = "ffmpeg")]
    pub native: Option<crate::ffmpeg::NativeParameters>,
}

impl CodecParameters {
    fn empty(media_type: MediaType, codec_id: CodecId, time_base: TimeBase) -> Self {
        Self {
            media_type,
            codec_id,
            time_base,
            frame_rate: None,
            bit_rate: 0,
            width: 0,
            height: 0,
            pixel_format: None,
            sample_rate: 0,
            channels: 0,
            channel_layout: 0,
            sample_format: None,
            extradata: Bytes::new(),
            gop_size: None,
            options: Vec::new(),
            #[cfg(feature = "ffmpeg")]
            native: None,
        }
    }

    pub fn video(
        codec_id: impl Into<CodecId>,
        width: u32,
        height: u32,
        pixel_format: &str,
        time_base: TimeBase,
    ) -> Self {
        Self {
            width,
            height,
            pixel_format: Some(pixel_format.to_string()),
            ..Self::empty(MediaType::Video, codec_id.into(), time_base)
        }
    }

    /// Audio parameters; the time base is `1/sample_rate`.
    pub fn audio(
        codec_id: impl Into<CodecId>,
        sample_rate: u32,
        channels: u16,
        sample_format: &str,
    ) -> Self {
        let time_base = TimeBase::new(1, sample_rate.max(1) as i32);
        Self {
            sample_rate,
            channels,
            sample_format: Some(sample_format.to_string()),
            ..Self::empty(MediaType::Audio, codec_id.into(), time_base)
        }
    }

    pub fn other(codec_id: impl Into<CodecId>, time_base: TimeBase) -> Self {
        Self::empty(MediaType::Other, codec_id.into(), time_base)
    }

    pub fn with_frame_rate(mut self, num: i32, den: i32) -> Self {
        self.frame_rate = Some((num, den));
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: i64) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_time_base(mut self, time_base: TimeBase) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.media_type == MediaType::Audio
    }

    pub fn fps(&self) -> Option<f32> {
        self.frame_rate
            .filter(|(_, den)| *den != 0)
            .map(|(num, den)| num as f32 / den as f32)
    }
}

impl From<String> for CodecId {
    fn from(name: String) -> Self {
        Self(name)
    }
}
