use std::fmt;

/// Bytes in the id field.
pub const ID_SIZE: usize = 4;

/// Bytes in the payload field.
pub const PAYLOAD_SIZE: usize = 8;

/// Data bytes in one frame (id + payload).
pub const FRAME_SIZE: usize = ID_SIZE + PAYLOAD_SIZE;

/// Byte order used when reading or writing multi-byte values in a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Least significant byte first (the order the controller boards use).
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// A fixed-width frame field, readable as bytes, half-words or words.
///
/// Indexes count units of the requested width: `half_word(1, ..)` covers
/// bytes 2..4. Out-of-range accesses return `None` (or `false` for setters).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field<const N: usize>([u8; N]);

/// The 4-byte frame id.
pub type Id = Field<ID_SIZE>;

/// The 8-byte frame payload.
pub type Payload = Field<PAYLOAD_SIZE>;

impl<const N: usize> Field<N> {
    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Unwrap into raw bytes.
    pub fn into_bytes(self) -> [u8; N] {
        self.0
    }

    pub fn byte(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    pub fn half_word(&self, index: usize, order: ByteOrder) -> Option<u16> {
        let bytes = self.chunk::<2>(index)?;
        Some(match order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn word(&self, index: usize, order: ByteOrder) -> Option<u32> {
        let bytes = self.chunk::<4>(index)?;
        Some(match order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn set_byte(&mut self, index: usize, value: u8) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn set_half_word(&mut self, index: usize, value: u16, order: ByteOrder) -> bool {
        let bytes = match order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.set_chunk(index, bytes)
    }

    pub fn set_word(&mut self, index: usize, value: u32, order: ByteOrder) -> bool {
        let bytes = match order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.set_chunk(index, bytes)
    }

    fn range<const W: usize>(index: usize) -> Option<std::ops::Range<usize>> {
        let start = index.checked_mul(W)?;
        let end = start.checked_add(W)?;
        (end <= N).then_some(start..end)
    }

    fn chunk<const W: usize>(&self, index: usize) -> Option<[u8; W]> {
        let range = Self::range::<W>(index)?;
        self.0[range].try_into().ok()
    }

    fn set_chunk<const W: usize>(&mut self, index: usize, bytes: [u8; W]) -> bool {
        match Self::range::<W>(index) {
            Some(range) => {
                self.0[range].copy_from_slice(&bytes);
                true
            }
            None => false,
        }
    }
}

impl<const N: usize> Default for Field<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> From<[u8; N]> for Field<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> AsRef<[u8]> for Field<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> fmt::Debug for Field<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x?}", self.0)
    }
}

/// One fixed-size protocol frame.
///
/// Frames are plain values: each receive and each send works on its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Frame {
    /// Classifies the frame (e.g. which controller channel group it carries).
    pub id: Id,
    /// Frame data.
    pub payload: Payload,
}

impl Frame {
    /// Create a frame from raw id and payload bytes.
    pub fn new(id: [u8; ID_SIZE], payload: [u8; PAYLOAD_SIZE]) -> Self {
        Self {
            id: Id::new(id),
            payload: Payload::new(payload),
        }
    }

    /// Build a frame from its 12 data bytes in id‖payload order.
    pub fn from_bytes(bytes: [u8; FRAME_SIZE]) -> Self {
        let mut id = [0u8; ID_SIZE];
        let mut payload = [0u8; PAYLOAD_SIZE];
        id.copy_from_slice(&bytes[..ID_SIZE]);
        payload.copy_from_slice(&bytes[ID_SIZE..]);
        Self::new(id, payload)
    }

    /// The 12 data bytes in id‖payload order.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[..ID_SIZE].copy_from_slice(self.id.as_bytes());
        bytes[ID_SIZE..].copy_from_slice(self.payload.as_bytes());
        bytes
    }

    /// Render as a one-line console dump.
    pub fn display(&self, format: FrameFormat) -> FrameDisplay<'_> {
        FrameDisplay {
            frame: self,
            format,
        }
    }
}

impl From<[u8; FRAME_SIZE]> for Frame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// How payload bytes are rendered by [`Frame::display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    #[default]
    Hex,
    /// Printable ASCII as characters, everything else as `.`.
    Ascii,
}

/// Console rendering of a frame: `ID = 1 0 0 0 Data = 10 20 ...`.
pub struct FrameDisplay<'a> {
    frame: &'a Frame,
    format: FrameFormat,
}

impl fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID =")?;
        for byte in self.frame.id.as_bytes() {
            write!(f, " {byte}")?;
        }
        write!(f, " Data =")?;
        for &byte in self.frame.payload.as_bytes() {
            match self.format {
                FrameFormat::Hex => write!(f, " {byte:02x}")?,
                FrameFormat::Ascii => {
                    let ch = if byte.is_ascii_graphic() || byte == b' ' {
                        byte as char
                    } else {
                        '.'
                    };
                    write!(f, " {ch}")?;
                }
            }
        }
        Ok(())
    }
}
