//! The codec seam: what the pipeline needs from a decoder or encoder, and
//! where it gets them from.

use crate::error::CodecError;
use crate::frame::Frame;
use crate::packet::Packet;
use crate::stream::{CodecId, CodecParameters};
use crate::timebase::TimeBase;

/// Outcome of asking a codec for output.
#[derive(Debug, Clone, PartialEq)]
pub enum Received<T> {
    Unit(T),
    /// Nothing available until more input is sent.
    WouldBlock,
    /// Fully drained. Nothing more will come out.
    EndOfStream,
}

/// A send/receive codec context.
///
/// `send(None)` is the end marker. After it, only `receive` is called until
/// it reports [`Received::EndOfStream`].
pub trait Codec<I, O>: Send {
    fn name(&self) -> &str;

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError>;

    /// Time base of the units going in (encoder) or coming out (decoder).
    fn time_base(&self) -> TimeBase;

    /// Output parameters, valid after `open`.
    fn parameters(&self) -> CodecParameters;

    fn send(&mut self, input: Option<I>) -> Result<(), CodecError>;

    fn receive(&mut self) -> Result<Received<O>, CodecError>;

    /// Releases the native context. Called once, at teardown.
    fn close(&mut self) {}
}

pub type BoxDecoder = Box<dyn Codec<Packet, Frame>>;
pub type BoxEncoder = Box<dyn Codec<Frame, Packet>>;

/// Looks codec implementations up. Returned codecs are not opened yet.
pub trait CodecProvider {
    fn find_decoder(&self, id: &CodecId) -> Option<BoxDecoder>;

    fn find_encoder(&self, id: &CodecId) -> Option<BoxEncoder>;

    fn find_encoder_by_name(&self, name: &str) -> Option<BoxEncoder>;
}

/// Per media type encoder overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderSettings {
    /// Encoder name, e.g. `libx264`. Defaults to an encoder for the source codec.
    pub encoder: Option<String>,
    pub bit_rate: Option<i64>,
    pub gop_size: Option<u32>,
    pub options: Vec<(String, String)>,
}

impl EncoderSettings {
    pub fn with_encoder(mut self, name: impl Into<String>) -> Self {
        self.encoder = Some(name.into());
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: i64) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = Some(gop_size);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Encoder input parameters for a stream whose decoder produces
    /// `decoded`. Video keeps the source time base, audio counts samples.
    pub fn encoder_parameters(
        &self,
        source: &CodecParameters,
        decoded: &CodecParameters,
    ) -> CodecParameters {
        let mut params = decoded.clone();
        params.time_base = if decoded.is_audio() && decoded.sample_rate > 0 {
            TimeBase::new(1, decoded.sample_rate as i32)
        } else {
            source.time_base
        };
        if params.frame_rate.is_none() {
            params.frame_rate = source.frame_rate;
        }
        params.bit_rate = self.bit_rate.unwrap_or(source.bit_rate);
        params.gop_size = self.gop_size;
        params.options = self.options.clone();
        params
    }
}
