use kfplink_transport::ByteSource;
use tracing::debug;

use crate::codec::{Decoder, DecoderStats, Step};
use crate::error::Result;
use crate::frame::Frame;

/// Pulls bytes from a [`ByteSource`] through the frame decoder.
///
/// The reader never blocks on more than one byte at a time, so a caller
/// polling with [`FrameReader::poll_step`] regains control at least once per
/// channel read timeout.
pub struct FrameReader<S> {
    source: S,
    decoder: Decoder,
}

impl<S: ByteSource> FrameReader<S> {
    /// Create a reader with a fresh decoder.
    pub fn new(source: S) -> Self {
        Self {
            source,
            decoder: Decoder::new(),
        }
    }

    /// Read one byte and advance the decoder.
    ///
    /// Returns `Ok(None)` if the read timed out with no byte.
    pub fn poll_step(&mut self) -> Result<Option<Step>> {
        match self.source.read_byte()? {
            Some(byte) => {
                let step = self.decoder.step(byte);
                match step {
                    Step::Frame(_) => debug!("frame complete"),
                    Step::Discarded { len, overflowed } => {
                        debug!(len, overflowed, "frame discarded")
                    }
                    _ => {}
                }
                Ok(Some(step))
            }
            None => Ok(None),
        }
    }

    /// Block until the next complete frame.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the channel closes.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(Step::Frame(frame)) = self.poll_step()? {
                return Ok(frame);
            }
        }
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Totals from the decoder.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Borrow the decoder.
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Consume the reader and return the source. Partial frame state is lost.
    pub fn into_inner(self) -> S {
        self.source
    }
}
