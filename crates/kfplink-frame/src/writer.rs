use kfplink_transport::ByteSink;
use tracing::trace;

use crate::codec::encode;
use crate::error::Result;
use crate::frame::Frame;

/// Encodes frames and writes each one to a [`ByteSink`] in a single call.
///
/// There is no retry: a failed send is reported and the caller decides what
/// to do next.
pub struct FrameTransmitter<W> {
    sink: W,
    frames_sent: u64,
}

impl<W: ByteSink> FrameTransmitter<W> {
    /// Create a transmitter over a sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            frames_sent: 0,
        }
    }

    /// Encode and write one frame. Returns the number of wire bytes written.
    pub fn send(&mut self, frame: &Frame) -> Result<usize> {
        let encoded = encode(frame);
        let written = self.sink.write_bytes(encoded.as_bytes())?;
        self.frames_sent += 1;
        trace!(written, id = ?frame.id, "frame sent");
        Ok(written)
    }

    /// Frames successfully written so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Consume the transmitter and return the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}
