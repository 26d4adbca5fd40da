//! SLIP-style framing of fixed-size frames over an unreliable byte stream.
//!
//! Every frame carries exactly 12 data bytes (a 4-byte id and an 8-byte
//! payload) and goes on the wire as:
//! - the `0xC0` delimiter
//! - the 12 data bytes, with `0xC0` and `0xDB` escaped as two-byte sequences
//! - the `0xC0` delimiter again
//!
//! Corrupt, short, long and stray input is dropped silently; the decoder
//! resynchronises on the next delimiter.

pub mod codec;
pub mod error;
pub mod frame;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode_all, encode, encode_frame, Decoder, DecoderState, DecoderStats, EncodedFrame, Step,
    DELIMITER, ESC, ESC_DELIMITER, ESC_ESC, MAX_ENCODED_SIZE,
};
pub use error::{FrameError, Result};
pub use frame::{
    ByteOrder, Field, Frame, FrameDisplay, FrameFormat, Id, Payload, FRAME_SIZE, ID_SIZE,
    PAYLOAD_SIZE,
};
pub use reader::FrameReader;
pub use writer::FrameTransmitter;

#[cfg(feature = "async")]
pub use tokio_codec::KfpCodec;
