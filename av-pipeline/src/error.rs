use thiserror::Error;

use crate::pump::CodecState;

/// Errors raised by the pipeline and its stages.
///
/// Every variant except [`PipelineError::WriteFailed`] ends the run. A failed
/// write of a single packet is logged, the packet is dropped and the run
/// continues.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to open source: {0}")]
    SourceOpenFailed(#[from] SourceError),

    #[error("stream info unavailable for source stream {index}: {reason}")]
    StreamInfoUnavailable { index: usize, reason: String },

    #[error("no codec implementation for {0}")]
    CodecUnavailable(String),

    #[error("codec {codec} rejected its configuration: {reason}")]
    CodecConfigRejected { codec: String, reason: String },

    #[error("{operation} is not valid while the codec is {state:?}")]
    InvalidCodecState {
        operation: &'static str,
        state: CodecState,
    },

    #[error("codec {codec} failed: {reason}")]
    Codec { codec: String, reason: String },

    #[error("frame transform failed: {0:#}")]
    Transform(anyhow::Error),

    #[error("failed to open sink: {0}")]
    SinkOpenFailed(SinkError),

    #[error("failed to write header: {0}")]
    HeaderWriteFailed(SinkError),

    #[error("failed to write packet: {0}")]
    WriteFailed(SinkError),

    #[error("failed to write trailer: {0}")]
    TrailerWriteFailed(SinkError),
}

/// Errors reported by a [`Source`](crate::io::Source).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("read failed: {0}")]
    Read(String),
}

/// Errors reported by a [`Sink`](crate::io::Sink).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("header rejected: {0}")]
    HeaderRejected(String),

    #[error("write failure: {0}")]
    WriteFailure(String),
}

/// Errors reported by a codec implementation.
///
/// `WouldBlock` and end of stream are not errors; they are
/// [`Received`](crate::codec::Received) variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
