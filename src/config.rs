use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use av_pipeline::{EncoderSettings, Mode, PipelineOptions, TrimRange};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "transcode.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Transcode,
    Remux,
}

/// Encoder override for one media type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderConfig {
    pub encoder: Option<String>,
    pub bit_rate: Option<i64>,
    pub gop_size: Option<u32>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl EncoderConfig {
    fn to_settings(&self) -> EncoderSettings {
        let mut settings = EncoderSettings::default();
        if let Some(name) = &self.encoder {
            settings = settings.with_encoder(name.clone());
        }
        if let Some(bit_rate) = self.bit_rate {
            settings = settings.with_bit_rate(bit_rate);
        }
        if let Some(gop_size) = self.gop_size {
            settings = settings.with_gop_size(gop_size);
        }
        for (key, value) in &self.options {
            settings = settings.with_option(key.clone(), value.clone());
        }
        settings
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub mode: RunMode,
    /// Milliseconds; zero or absent keeps the start.
    #[serde(default)]
    pub start_ms: i64,
    /// Milliseconds; zero or absent keeps the end.
    #[serde(default)]
    pub end_ms: i64,
    #[serde(default)]
    pub video: EncoderConfig,
    #[serde(default)]
    pub audio: EncoderConfig,
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading run config {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing run config {}", path.display()))
    }

    pub fn to_options(&self) -> PipelineOptions {
        let mode = match self.mode {
            RunMode::Transcode => Mode::Transcode,
            RunMode::Remux => Mode::Remux,
        };
        PipelineOptions {
            mode,
            ..PipelineOptions::default()
        }
        .with_trim(TrimRange::from_millis(self.start_ms, self.end_ms))
        .with_video(self.video.to_settings())
        .with_audio(self.audio.to_settings())
    }
}
