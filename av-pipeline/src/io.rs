//! Container input and output, as seen by the pipeline.
//!
//! Opening a source or sink is the caller's business; the pipeline only
//! works on something already open.

use std::time::Duration;

use crate::error::{SinkError, SourceError};
use crate::packet::Packet;
use crate::stream::CodecParameters;
use crate::timebase::TimeBase;

pub trait Source {
    fn stream_count(&self) -> usize;

    fn stream_parameters(&self, index: usize) -> Result<CodecParameters, SourceError>;

    /// Next packet in container order, `None` at end of input.
    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError>;

    /// Moves to the last keyframe at or before `position`, measured from the
    /// start of the container.
    fn seek(&mut self, position: Duration) -> Result<(), SourceError>;
}

pub trait Sink {
    /// Adds an output stream and returns its index.
    fn add_stream(&mut self, params: &CodecParameters) -> Result<usize, SinkError>;

    fn write_header(&mut self) -> Result<(), SinkError>;

    /// Time base of an output stream. May change when the header is written.
    fn stream_time_base(&self, index: usize) -> Option<TimeBase>;

    /// Takes a packet already expressed in its stream's time base. The sink
    /// interleaves across streams but keeps each stream's order.
    fn write_packet_interleaved(&mut self, packet: Packet) -> Result<(), SinkError>;

    fn write_trailer(&mut self) -> Result<(), SinkError>;
}
