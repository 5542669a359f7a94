//! Demux, decode, transform, encode and mux orchestration.
//!
//! The [`Pipeline`] pulls packets from a [`Source`], runs them through a
//! decoder and encoder per stream (or copies them when remuxing) and writes
//! the result to a [`Sink`], translating timestamps between the time bases
//! of every stage. Codecs come from an injected [`CodecProvider`].

pub mod codec;
pub mod error;
pub mod frame;
pub mod io;
pub mod packet;
pub mod pipeline;
pub mod pump;
pub mod stream;
pub mod stream_table;
pub mod task;
pub mod timebase;
pub mod transform;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod mock;

pub use codec::{Codec, CodecProvider, EncoderSettings, Received};
pub use error::{CodecError, PipelineError, Result, SinkError, SourceError};
pub use frame::{Frame, FrameKind};
pub use io::{Sink, Source};
pub use packet::Packet;
pub use pipeline::{Pipeline, PipelineOptions, RunStats, run};
pub use pump::{CodecPump, CodecState};
pub use stream::{CodecId, CodecParameters, MediaType};
pub use stream_table::{Mode, StreamTable};
pub use task::TranscodeTask;
pub use timebase::{TimeBase, Timestamp, TrimRange, translate};
pub use transform::{FrameTransform, Identity};
