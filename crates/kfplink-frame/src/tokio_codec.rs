use bytes::{Buf, BytesMut};

use crate::codec::{encode_frame, Decoder, DecoderStats};
use crate::error::FrameError;
use crate::frame::Frame;

/// `tokio_util` codec over the frame decoder, for use with `FramedRead` /
/// `FramedWrite`.
///
/// Decoder state survives across calls, so a frame split over several reads
/// is reassembled. Corrupt input is dropped exactly as in [`Decoder`].
#[derive(Debug, Default)]
pub struct KfpCodec {
    decoder: Decoder,
}

impl KfpCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals from the underlying decoder.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl tokio_util::codec::Decoder for KfpCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let mut consumed = 0usize;
        let mut decoded = None;
        for &byte in src.iter() {
            consumed += 1;
            if let Some(frame) = self.decoder.feed(byte) {
                decoded = Some(frame);
                break;
            }
        }
        src.advance(consumed);
        Ok(decoded)
    }
}

impl tokio_util::codec::Encoder<Frame> for KfpCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(&frame, dst);
        Ok(())
    }
}
