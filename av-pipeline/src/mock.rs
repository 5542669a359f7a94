//! Scripted collaborators for tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::codec::{BoxDecoder, BoxEncoder, Codec, CodecProvider, Received};
use crate::error::{CodecError, SinkError, SourceError};
use crate::frame::Frame;
use crate::io::{Sink, Source};
use crate::packet::Packet;
use crate::stream::{CodecId, CodecParameters, MediaType};
use crate::timebase::{TimeBase, Timestamp, duration_to_ticks};

#[derive(Debug, Default)]
pub struct CodecCounters {
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
}

impl CodecCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// FIFO that holds back `delay` units until the end marker arrives.
struct Buffer<T> {
    queue: VecDeque<T>,
    delay: usize,
    draining: bool,
}

impl<T> Buffer<T> {
    fn new(delay: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            delay,
            draining: false,
        }
    }

    fn push(&mut self, unit: Option<T>) -> Result<(), CodecError> {
        if self.draining {
            return Err(CodecError::Failed("fed after end marker".to_string()));
        }
        match unit {
            Some(unit) => self.queue.push_back(unit),
            None => self.draining = true,
        }
        Ok(())
    }

    fn pop(&mut self) -> Received<T> {
        if self.draining {
            return match self.queue.pop_front() {
                Some(unit) => Received::Unit(unit),
                None => Received::EndOfStream,
            };
        }
        if self.queue.len() > self.delay {
            if let Some(unit) = self.queue.pop_front() {
                return Received::Unit(unit);
            }
        }
        Received::WouldBlock
    }
}

/// Turns packets into frames carrying the packet payload as their only plane.
pub struct MockDecoder {
    name: String,
    params: Option<CodecParameters>,
    buffer: Buffer<Packet>,
    reject: Option<String>,
    fail_after: Option<usize>,
    end_after: Option<usize>,
    sent: usize,
    counters: Arc<CodecCounters>,
}

impl MockDecoder {
    pub fn new(name: &str, delay: usize) -> Self {
        Self {
            name: name.to_string(),
            params: None,
            buffer: Buffer::new(delay),
            reject: None,
            fail_after: None,
            end_after: None,
            sent: 0,
            counters: Arc::default(),
        }
    }

    pub fn with_counters(mut self, counters: Arc<CodecCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_string());
        self
    }

    /// Fails the send after `count` successful ones.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Flushes and reports end of stream on its own once `count` packets
    /// went in, without waiting for the end marker.
    pub fn ending_after(mut self, count: usize) -> Self {
        self.end_after = Some(count);
        self
    }

    fn to_frame(&self, packet: Packet) -> Frame {
        let mut frame = match &self.params {
            Some(p) if p.is_audio() => {
                Frame::audio(p.sample_rate, p.channels, "fltp", 1024)
            }
            Some(p) => Frame::video(p.width, p.height, "yuv420p", packet.time_base),
            None => Frame::video(0, 0, "yuv420p", packet.time_base),
        };
        frame.time_base = packet.time_base;
        let len = packet.data.len();
        frame.with_plane(packet.data, len).with_pts(packet.pts)
    }
}

impl Codec<Packet, Frame> for MockDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        if let Some(reason) = &self.reject {
            return Err(CodecError::ConfigRejected(reason.clone()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.params = Some(params.clone());
        Ok(())
    }

    fn time_base(&self) -> TimeBase {
        self.params
            .as_ref()
            .map(|p| p.time_base)
            .unwrap_or(TimeBase::MILLISECONDS)
    }

    fn parameters(&self) -> CodecParameters {
        let mut params = self
            .params
            .clone()
            .unwrap_or_else(|| CodecParameters::other(CodecId::none(), TimeBase::MILLISECONDS));
        if params.is_video() {
            params.pixel_format = Some("yuv420p".to_string());
        }
        if params.is_audio() {
            params.sample_format = Some("fltp".to_string());
        }
        params
    }

    fn send(&mut self, input: Option<Packet>) -> Result<(), CodecError> {
        if input.is_some() {
            if self.fail_after.is_some_and(|n| self.sent >= n) {
                return Err(CodecError::Failed("corrupt packet".to_string()));
            }
            self.sent += 1;
        }
        self.buffer.push(input)?;
        if self.end_after.is_some_and(|n| self.sent >= n) {
            self.buffer.draining = true;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Received<Frame>, CodecError> {
        Ok(match self.buffer.pop() {
            Received::Unit(packet) => Received::Unit(self.to_frame(packet)),
            Received::WouldBlock => Received::WouldBlock,
            Received::EndOfStream => Received::EndOfStream,
        })
    }

    fn close(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Turns frames into packets whose dts equals pts, in the time base it was
/// opened with.
pub struct MockEncoder {
    name: String,
    codec_id: CodecId,
    params: Option<CodecParameters>,
    buffer: Buffer<Frame>,
    encoded: u64,
    counters: Arc<CodecCounters>,
}

impl MockEncoder {
    pub fn new(name: &str, codec_id: &str, delay: usize) -> Self {
        Self {
            name: name.to_string(),
            codec_id: CodecId::new(codec_id),
            params: None,
            buffer: Buffer::new(delay),
            encoded: 0,
            counters: Arc::default(),
        }
    }

    pub fn with_counters(mut self, counters: Arc<CodecCounters>) -> Self {
        self.counters = counters;
        self
    }
}

impl Codec<Frame, Packet> for MockEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        if params.is_video() && (params.width == 0 || params.height == 0) {
            return Err(CodecError::ConfigRejected(format!(
                "invalid size {}x{}",
                params.width, params.height
            )));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.params = Some(params.clone());
        Ok(())
    }

    fn time_base(&self) -> TimeBase {
        self.params
            .as_ref()
            .map(|p| p.time_base)
            .unwrap_or(TimeBase::MILLISECONDS)
    }

    fn parameters(&self) -> CodecParameters {
        let mut params = self
            .params
            .clone()
            .unwrap_or_else(|| CodecParameters::other(CodecId::none(), TimeBase::MILLISECONDS));
        params.codec_id = self.codec_id.clone();
        params
    }

    fn send(&mut self, input: Option<Frame>) -> Result<(), CodecError> {
        if let Some(frame) = &input {
            if frame.time_base != self.time_base() {
                return Err(CodecError::Failed(format!(
                    "frame in {} sent to encoder in {}",
                    frame.time_base,
                    self.time_base()
                )));
            }
        }
        self.buffer.push(input)
    }

    fn receive(&mut self) -> Result<Received<Packet>, CodecError> {
        Ok(match self.buffer.pop() {
            Received::Unit(frame) => {
                let data = frame.planes.first().cloned().unwrap_or_default();
                let is_key = self.encoded == 0;
                self.encoded += 1;
                Received::Unit(
                    Packet::new(0, data, frame.time_base)
                        .with_timestamps(frame.pts, frame.pts)
                        .with_key(is_key),
                )
            }
            Received::WouldBlock => Received::WouldBlock,
            Received::EndOfStream => Received::EndOfStream,
        })
    }

    fn close(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out mock codecs for a fixed set of codec names.
pub struct MockProvider {
    pub decoders: Vec<String>,
    /// `(encoder name, codec id)`.
    pub encoders: Vec<(String, String)>,
    pub rejecting_decoders: Vec<String>,
    /// `(decoder name, packets before it ends by itself)`.
    pub ending_decoders: Vec<(String, usize)>,
    pub decoder_delay: usize,
    pub encoder_delay: usize,
    pub counters: Arc<CodecCounters>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            decoders: vec!["h264".to_string(), "aac".to_string()],
            encoders: vec![
                ("libx264".to_string(), "h264".to_string()),
                ("aac".to_string(), "aac".to_string()),
            ],
            rejecting_decoders: Vec::new(),
            ending_decoders: Vec::new(),
            decoder_delay: 2,
            encoder_delay: 3,
            counters: Arc::default(),
        }
    }

    pub fn without_decoder(mut self, name: &str) -> Self {
        self.decoders.retain(|d| d != name);
        self
    }

    pub fn rejecting_decoder(mut self, name: &str) -> Self {
        self.rejecting_decoders.push(name.to_string());
        self
    }

    pub fn ending_decoder(mut self, name: &str, after: usize) -> Self {
        self.ending_decoders.push((name.to_string(), after));
        self
    }

    pub fn with_delays(mut self, decoder_delay: usize, encoder_delay: usize) -> Self {
        self.decoder_delay = decoder_delay;
        self.encoder_delay = encoder_delay;
        self
    }

    fn encoder(&self, name: &str, codec_id: &str) -> BoxEncoder {
        Box::new(
            MockEncoder::new(name, codec_id, self.encoder_delay)
                .with_counters(self.counters.clone()),
        )
    }
}

impl CodecProvider for MockProvider {
    fn find_decoder(&self, id: &CodecId) -> Option<BoxDecoder> {
        let name = self.decoders.iter().find(|d| d.as_str() == id.name())?;
        let mut decoder =
            MockDecoder::new(name, self.decoder_delay).with_counters(self.counters.clone());
        if self.rejecting_decoders.iter().any(|d| d == name) {
            decoder = decoder.rejecting("unsupported profile");
        }
        if let Some((_, after)) = self.ending_decoders.iter().find(|(d, _)| d == name) {
            decoder = decoder.ending_after(*after);
        }
        Some(Box::new(decoder))
    }

    fn find_encoder(&self, id: &CodecId) -> Option<BoxEncoder> {
        let (name, codec) = self.encoders.iter().find(|(_, c)| c.as_str() == id.name())?;
        Some(self.encoder(name, codec))
    }

    fn find_encoder_by_name(&self, name: &str) -> Option<BoxEncoder> {
        let (name, codec) = self.encoders.iter().find(|(n, _)| n == name)?;
        Some(self.encoder(name, codec))
    }
}

/// A source replaying a fixed packet list.
pub struct MockSource {
    pub streams: Vec<CodecParameters>,
    pub packets: VecDeque<Packet>,
    pub broken_streams: HashSet<usize>,
    pub fail_seek: bool,
    /// Read error once this many packets have been read.
    pub read_error_after: Option<usize>,
    pub seeks: Vec<Duration>,
    read: usize,
}

impl MockSource {
    pub fn new(streams: Vec<CodecParameters>, packets: Vec<Packet>) -> Self {
        Self {
            streams,
            packets: packets.into(),
            broken_streams: HashSet::new(),
            fail_seek: false,
            read_error_after: None,
            seeks: Vec::new(),
            read: 0,
        }
    }

    /// One 30 fps h264 stream in 1/90000 and one 48 kHz aac stream, muxed in
    /// presentation order, `seconds` long. Video has a keyframe every second.
    pub fn av(seconds: i64) -> Self {
        let video_tb = TimeBase::MPEG;
        let audio_tb = TimeBase::new(1, 48000);
        let streams = vec![
            CodecParameters::video("h264", 1280, 720, "yuv420p", video_tb).with_frame_rate(30, 1),
            CodecParameters::audio("aac", 48000, 2, "fltp"),
        ];

        let mut packets = Vec::new();
        let mut audio_pts = 0;
        for frame in 0..seconds * 30 {
            let pts = frame * 3000;
            packets.push(
                Packet::new(0, Bytes::from(frame.to_le_bytes().to_vec()), video_tb)
                    .with_timestamps(pts, pts)
                    .with_duration(3000)
                    .with_key(frame % 30 == 0),
            );
            // audio up to the next video frame
            let next = (frame + 1) * 1600;
            while audio_pts < next {
                packets.push(
                    Packet::new(1, Bytes::from_static(b"aac"), audio_tb)
                        .with_timestamps(audio_pts, audio_pts)
                        .with_duration(1024)
                        .with_key(true),
                );
                audio_pts += 1024;
            }
        }
        Self::new(streams, packets)
    }
}

impl Source for MockSource {
    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn stream_parameters(&self, index: usize) -> Result<CodecParameters, SourceError> {
        if self.broken_streams.contains(&index) {
            return Err(SourceError::Read(format!("no codec parameters for stream {index}")));
        }
        self.streams
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("stream {index}")))
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, SourceError> {
        if self.read_error_after.is_some_and(|n| self.read >= n) {
            return Err(SourceError::Read("truncated input".to_string()));
        }
        self.read += 1;
        Ok(self.packets.pop_front())
    }

    /// Moves to the last keyframe at or before `position`.
    fn seek(&mut self, position: Duration) -> Result<(), SourceError> {
        self.seeks.push(position);
        if self.fail_seek {
            return Err(SourceError::Unsupported("stream is not seekable".to_string()));
        }
        let keyframe = self.packets.iter().rposition(|p| {
            let target = duration_to_ticks(position, p.time_base);
            p.is_key
                && self.streams[p.stream_index].media_type == MediaType::Video
                && p.pts.value().is_some_and(|pts| pts <= target)
        });
        if let Some(index) = keyframe {
            self.packets.drain(..index);
        }
        Ok(())
    }
}

/// Records everything written to it.
#[derive(Default)]
pub struct RecordingSink {
    pub streams: Vec<CodecParameters>,
    pub written: Vec<Packet>,
    pub header_written: bool,
    pub trailer_written: bool,
    /// Time base every stream gets once the header is written.
    pub normalized_time_base: Option<TimeBase>,
    /// Write calls (counted from zero) that fail.
    pub fail_writes: HashSet<usize>,
    pub fail_header: bool,
    pub write_calls: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_packets(&self, index: usize) -> Vec<&Packet> {
        self.written.iter().filter(|p| p.stream_index == index).collect()
    }
}

impl Sink for RecordingSink {
    fn add_stream(&mut self, params: &CodecParameters) -> Result<usize, SinkError> {
        if self.header_written {
            return Err(SinkError::Unsupported("stream added after header".to_string()));
        }
        self.streams.push(params.clone());
        Ok(self.streams.len() - 1)
    }

    fn write_header(&mut self) -> Result<(), SinkError> {
        if self.fail_header {
            return Err(SinkError::HeaderRejected("no streams".to_string()));
        }
        if let Some(tb) = self.normalized_time_base {
            for stream in &mut self.streams {
                stream.time_base = tb;
            }
        }
        self.header_written = true;
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<TimeBase> {
        self.streams.get(index).map(|s| s.time_base)
    }

    fn write_packet_interleaved(&mut self, packet: Packet) -> Result<(), SinkError> {
        let call = self.write_calls;
        self.write_calls += 1;
        if !self.header_written || self.trailer_written {
            return Err(SinkError::WriteFailure("sink is not writable".to_string()));
        }
        if self.fail_writes.contains(&call) {
            return Err(SinkError::WriteFailure(format!("disk full at write {call}")));
        }
        if packet.time_base != self.streams[packet.stream_index].time_base {
            return Err(SinkError::WriteFailure(format!(
                "packet in {} for stream in {}",
                packet.time_base, self.streams[packet.stream_index].time_base
            )));
        }
        self.written.push(packet);
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        if !self.header_written {
            return Err(SinkError::WriteFailure("trailer before header".to_string()));
        }
        self.trailer_written = true;
        Ok(())
    }
}

pub fn ts(ticks: i64) -> Timestamp {
    Timestamp::new(ticks)
}
