//! Feed-then-drain driver for a single codec context.
//!
//! A codec may hold on to any number of inputs before it emits anything, and
//! one input may release several outputs. The pump always pulls until the
//! codec says it has nothing more for now, so outputs leave in the order the
//! codec produced them and nothing is left behind between feeds.

use crate::codec::{Codec, Received};
use crate::error::{CodecError, PipelineError, Result};

/// Lifecycle of a codec context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    /// Opened, nothing fed yet.
    Idle,
    Open,
    /// End marker sent, only extraction is valid.
    Draining,
    /// End of stream reported.
    Closed,
}

pub struct CodecPump<I, O> {
    codec: Box<dyn Codec<I, O>>,
    state: CodecState,
    receive_calls: u64,
    released: bool,
}

impl<I, O> CodecPump<I, O> {
    pub fn new(codec: Box<dyn Codec<I, O>>) -> Self {
        Self {
            codec,
            state: CodecState::Idle,
            receive_calls: 0,
            released: false,
        }
    }

    pub fn codec(&self) -> &dyn Codec<I, O> {
        self.codec.as_ref()
    }

    pub fn name(&self) -> &str {
        self.codec.name()
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    /// Total `receive` calls made on the codec so far.
    pub fn receive_calls(&self) -> u64 {
        self.receive_calls
    }

    /// Sends one unit and returns everything the codec releases in response.
    pub fn feed_and_drain(&mut self, input: I) -> Result<Vec<O>> {
        match self.state {
            CodecState::Idle | CodecState::Open => {}
            state => {
                return Err(PipelineError::InvalidCodecState {
                    operation: "feed",
                    state,
                });
            }
        }
        self.codec
            .send(Some(input))
            .map_err(|e| codec_failure(self.codec.name(), e))?;
        self.state = CodecState::Open;
        self.extract()
    }

    /// Sends the end marker and extracts until end of stream.
    pub fn drain(&mut self) -> Result<Vec<O>> {
        match self.state {
            CodecState::Idle | CodecState::Open => {
                self.codec
                    .send(None)
                    .map_err(|e| codec_failure(self.codec.name(), e))?;
                self.state = CodecState::Draining;
            }
            CodecState::Draining => {}
            CodecState::Closed => {
                return Err(PipelineError::InvalidCodecState {
                    operation: "drain",
                    state: self.state,
                });
            }
        }
        self.extract()
    }

    fn extract(&mut self) -> Result<Vec<O>> {
        let mut out = Vec::new();
        loop {
            self.receive_calls += 1;
            match self
                .codec
                .receive()
                .map_err(|e| codec_failure(self.codec.name(), e))?
            {
                Received::Unit(unit) => out.push(unit),
                Received::WouldBlock if self.state == CodecState::Draining => {
                    return Err(PipelineError::Codec {
                        codec: self.codec.name().to_string(),
                        reason: "no output available while draining".to_string(),
                    });
                }
                Received::WouldBlock => break,
                Received::EndOfStream => {
                    log::debug!("{} reached end of stream", self.codec.name());
                    self.state = CodecState::Closed;
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Releases the codec context. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.codec.close();
    }
}

pub(crate) fn codec_failure(codec: &str, err: CodecError) -> PipelineError {
    match err {
        CodecError::ConfigRejected(reason) => PipelineError::CodecConfigRejected {
            codec: codec.to_string(),
            reason,
        },
        CodecError::Failed(reason) => PipelineError::Codec {
            codec: codec.to_string(),
            reason,
        },
    }
}

#[cfg(test)]
#[path = "pump_test.rs"]
mod pump_test;
