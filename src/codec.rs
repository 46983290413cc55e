//! Inbound line framing
//!
//! Wraps `LinesCodec` so that a line over the byte cap comes out as an
//! `Inbound::Oversized` frame instead of a decode error. `FramedRead`
//! ends the stream after any decode error, and an overlong line should
//! only cost the sender that one line.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    /// A line longer than the byte cap; its bytes were discarded
    Oversized,
}

/// Line decoder with a hard per-line byte cap
#[derive(Debug, Clone)]
pub struct InboundCodec {
    lines: LinesCodec,
}

impl InboundCodec {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_bytes),
        }
    }
}

fn frame(decoded: Result<Option<String>, LinesCodecError>) -> Result<Option<Inbound>, LinesCodecError> {
    match decoded {
        Ok(line) => Ok(line.map(Inbound::Line)),
        // LinesCodec keeps discarding up to the next newline on its own
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Inbound::Oversized)),
        Err(e) => Err(e),
    }
}

impl Decoder for InboundCodec {
    type Item = Inbound;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, LinesCodecError> {
        frame(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, LinesCodecError> {
        frame(self.lines.decode_eof(src))
    }
}
