use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::frame::{Frame, FRAME_SIZE};

/// Frame boundary marker, sent before and after every frame.
pub const DELIMITER: u8 = 0xC0;

/// Escape marker. Always followed by exactly one substitute byte.
pub const ESC: u8 = 0xDB;

/// Follows [`ESC`] to carry a literal [`DELIMITER`] data byte.
pub const ESC_DELIMITER: u8 = 0xDC;

/// Follows [`ESC`] to carry a literal [`ESC`] data byte.
pub const ESC_ESC: u8 = 0xDD;

/// Worst-case wire size: delimiter + 12 fully escaped bytes + delimiter.
pub const MAX_ENCODED_SIZE: usize = 1 + FRAME_SIZE * 2 + 1;

/// A frame in wire form, held in a fixed worst-case buffer.
#[derive(Clone, Copy)]
pub struct EncodedFrame {
    buf: [u8; MAX_ENCODED_SIZE],
    len: usize,
}

impl EncodedFrame {
    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Encoded length: 14 with nothing escaped, at most [`MAX_ENCODED_SIZE`].
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; an encoded frame carries at least both delimiters.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for EncodedFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedFrame({:02x?})", self.as_bytes())
    }
}

/// Encode a frame into its delimited, escaped wire form.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────────────────────────────────────┬──────┐
/// │ 0xC0 │ id (4B) ‖ payload (8B), escaped:          │ 0xC0 │
/// │      │   0xC0 -> 0xDB 0xDC    0xDB -> 0xDB 0xDD  │      │
/// └──────┴──────────────────────────────────────────┴──────┘
/// ```
pub fn encode(frame: &Frame) -> EncodedFrame {
    let mut buf = [0u8; MAX_ENCODED_SIZE];
    let mut len = 0usize;

    buf[len] = DELIMITER;
    len += 1;

    for byte in frame.to_bytes() {
        match byte {
            DELIMITER => {
                buf[len] = ESC;
                buf[len + 1] = ESC_DELIMITER;
                len += 2;
            }
            ESC => {
                buf[len] = ESC;
                buf[len + 1] = ESC_ESC;
                len += 2;
            }
            other => {
                buf[len] = other;
                len += 1;
            }
        }
    }

    buf[len] = DELIMITER;
    len += 1;

    EncodedFrame { buf, len }
}

/// Encode a frame and append it to `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    let encoded = encode(frame);
    dst.reserve(encoded.len());
    dst.put_slice(encoded.as_bytes());
}

/// Decode every complete frame in `bytes` with a fresh decoder.
pub fn decode_all(bytes: &[u8]) -> Vec<Frame> {
    let mut decoder = Decoder::new();
    bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
}

/// Where the decoder is within the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// Outside any frame; only a delimiter leaves this state.
    #[default]
    Idle,
    /// Collecting data bytes.
    InFrame,
    /// Inside a frame, the previous byte was [`ESC`].
    AfterEscape,
}

/// What one input byte did to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Byte outside any frame, ignored.
    Stray(u8),
    /// Opening delimiter.
    Started,
    /// Data byte collected, or an escape awaiting its substitute.
    Pending,
    /// Closing delimiter after exactly 12 data bytes.
    Frame(Frame),
    /// Closing delimiter after the wrong number of data bytes.
    Discarded {
        /// Data bytes collected before the delimiter (never above 12).
        len: usize,
        /// Whether bytes beyond the 12-byte capacity were rejected.
        overflowed: bool,
    },
    /// Unknown substitute after [`ESC`]; dropped, frame continues.
    InvalidEscape(u8),
    /// Data byte beyond the 12-byte capacity; dropped.
    Overflow(u8),
}

impl Step {
    /// True for the closing-delimiter outcomes, successful or not.
    pub fn ends_frame(&self) -> bool {
        matches!(self, Step::Frame(_) | Step::Discarded { .. })
    }
}

/// Running totals of what a decoder has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub discarded: u64,
    pub stray: u64,
    pub invalid_escapes: u64,
    pub overflow_bytes: u64,
}

/// Incremental frame decoder.
///
/// Single pass, constant memory: at most 12 data bytes are ever held. Bytes
/// offered beyond that capacity are rejected and the frame is discarded when
/// its closing delimiter arrives.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    state: DecoderState,
    buf: [u8; FRAME_SIZE],
    len: usize,
    overflowed: bool,
    stats: DecoderStats,
}

impl Decoder {
    /// Create a decoder in the `Idle` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state machine by one byte.
    pub fn step(&mut self, byte: u8) -> Step {
        match self.state {
            DecoderState::Idle => {
                if byte == DELIMITER {
                    self.begin();
                    Step::Started
                } else {
                    self.stats.stray += 1;
                    trace!(byte, "stray byte outside frame");
                    Step::Stray(byte)
                }
            }
            DecoderState::InFrame => match byte {
                DELIMITER => self.finish(),
                ESC => {
                    self.state = DecoderState::AfterEscape;
                    Step::Pending
                }
                other => self.push(other),
            },
            DecoderState::AfterEscape => {
                self.state = DecoderState::InFrame;
                match byte {
                    ESC_DELIMITER => self.push(DELIMITER),
                    ESC_ESC => self.push(ESC),
                    other => {
                        self.stats.invalid_escapes += 1;
                        trace!(byte = other, "invalid escape sequence dropped");
                        Step::InvalidEscape(other)
                    }
                }
            }
        }
    }

    /// Advance by one byte, returning a frame if this byte completed one.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.step(byte) {
            Step::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Drop any partial frame and return to `Idle`. Statistics are kept.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.len = 0;
        self.overflowed = false;
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Data bytes collected for the frame in progress.
    pub fn collected(&self) -> usize {
        self.len
    }

    /// Running totals.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn begin(&mut self) {
        self.state = DecoderState::InFrame;
        self.len = 0;
        self.overflowed = false;
    }

    fn push(&mut self, byte: u8) -> Step {
        if self.len < FRAME_SIZE {
            self.buf[self.len] = byte;
            self.len += 1;
            Step::Pending
        } else {
            self.overflowed = true;
            self.stats.overflow_bytes += 1;
            trace!(byte, "data byte beyond frame capacity rejected");
            Step::Overflow(byte)
        }
    }

    fn finish(&mut self) -> Step {
        let len = self.len;
        let overflowed = self.overflowed;
        self.reset();

        if len == FRAME_SIZE && !overflowed {
            self.stats.frames += 1;
            Step::Frame(Frame::from_bytes(self.buf))
        } else {
            self.stats.discarded += 1;
            trace!(len, overflowed, "discarding malformed frame");
            Step::Discarded { len, overflowed }
        }
    }
}
