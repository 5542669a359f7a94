use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::stream::MediaType;
use crate::timebase::{TimeBase, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Video {
        width: u32,
        height: u32,
        pixel_format: String,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        channel_layout: u64,
        sample_format: String,
        /// Samples per channel.
        samples: usize,
    },
}

/// A decoded picture or block of audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub planes: Vec<Bytes>,
    /// Bytes per row (video) or per plane (audio), one entry per plane.
    pub line_sizes: Vec<usize>,
    pub pts: Timestamp,
    pub time_base: TimeBase,
    pub kind: FrameKind,
}

impl Frame {
    pub fn video(width: u32, height: u32, pixel_format: &str, time_base: TimeBase) -> Self {
        Self {
            planes: Vec::new(),
            line_sizes: Vec::new(),
            pts: Timestamp::UNSET,
            time_base,
            kind: FrameKind::Video {
                width,
                height,
                pixel_format: pixel_format.to_string(),
            },
        }
    }

    pub fn audio(sample_rate: u32, channels: u16, sample_format: &str, samples: usize) -> Self {
        Self {
            planes: Vec::new(),
            line_sizes: Vec::new(),
            pts: Timestamp::UNSET,
            time_base: TimeBase::new(1, sample_rate.max(1) as i32),
            kind: FrameKind::Audio {
                sample_rate,
                channels,
                channel_layout: 0,
                sample_format: sample_format.to_string(),
                samples,
            },
        }
    }

    pub fn with_plane(mut self, data: impl Into<Bytes>, line_size: usize) -> Self {
        self.planes.push(data.into());
        self.line_sizes.push(line_size);
        self
    }

    pub fn with_pts(mut self, pts: impl Into<Timestamp>) -> Self {
        self.pts = pts.into();
        self
    }

    pub fn media_type(&self) -> MediaType {
        match self.kind {
            FrameKind::Video { .. } => MediaType::Video,
            FrameKind::Audio { .. } => MediaType::Audio,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, FrameKind::Video { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, FrameKind::Audio { .. })
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FrameKind::Video {
                width,
                height,
                pixel_format,
            } => write!(
                f,
                "video {}x{} {} pts={} tb={}",
                width, height, pixel_format, self.pts, self.time_base
            ),
            FrameKind::Audio {
                sample_rate,
                channels,
                sample_format,
                samples,
                ..
            } => write!(
                f,
                "audio {}Hz {}ch {} samples={} pts={} tb={}",
                sample_rate, channels, sample_format, samples, self.pts, self.time_base
            ),
        }
    }
}
