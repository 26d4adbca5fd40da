use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Pulls bytes one at a time from a channel.
///
/// `Ok(None)` means the channel's read timeout elapsed without a byte
/// arriving. Callers that need to stop a blocked reader check their stop
/// signal on every `None`.
pub trait ByteSource: Send {
    /// Read exactly one byte, waiting at most one read timeout.
    fn read_byte(&mut self) -> Result<Option<u8>>;
}

/// Pushes complete byte sequences to a channel.
pub trait ByteSink: Send {
    /// Write the whole buffer and flush it. Returns the number of bytes written.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize>;
}

impl<T: Read + Send> ByteSource for T {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.read(&mut byte) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(None)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<T: Write + Send> ByteSink for T {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.flush() {
                Ok(()) => return Ok(offset),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

/// A physical channel that can be split into a receive half and a send half.
///
/// Both halves refer to the same underlying handle. The receive half is handed
/// to exactly one reader; the send half is owned by the transmitter, so the two
/// directions never contend for one handle.
pub trait ByteChannel {
    /// Receive half.
    type Reader: Read + Send + 'static;
    /// Send half.
    type Writer: Write + Send + 'static;

    /// Split the channel. `read_timeout` bounds each blocking byte read on the
    /// receive half; `None` blocks indefinitely.
    fn split(self, read_timeout: Option<Duration>) -> Result<(Self::Reader, Self::Writer)>;
}

/// Pre-split halves. The read timeout is the caller's business.
impl<R, W> ByteChannel for (R, W)
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    type Reader = R;
    type Writer = W;

    fn split(self, _read_timeout: Option<Duration>) -> Result<(R, W)> {
        Ok(self)
    }
}

#[cfg(unix)]
impl ByteChannel for std::os::unix::net::UnixStream {
    type Reader = std::os::unix::net::UnixStream;
    type Writer = std::os::unix::net::UnixStream;

    fn split(self, read_timeout: Option<Duration>) -> Result<(Self::Reader, Self::Writer)> {
        self.set_read_timeout(read_timeout.filter(|t| !t.is_zero()))?;
        let writer = self.try_clone()?;
        Ok((self, writer))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_bytes_then_reports_closed() {
        let mut source = Cursor::new(vec![0xC0, 0x01]);
        assert_eq!(source.read_byte().unwrap(), Some(0xC0));
        assert_eq!(source.read_byte().unwrap(), Some(0x01));
        assert!(matches!(source.read_byte(), Err(TransportError::Closed)));
    }

    #[test]
    fn timeout_is_not_an_error() {
        let mut source = Scripted {
            script: vec![Err(ErrorKind::WouldBlock), Err(ErrorKind::TimedOut), Ok(7)],
        };
        assert_eq!(source.read_byte().unwrap(), None);
        assert_eq!(source.read_byte().unwrap(), None);
        assert_eq!(source.read_byte().unwrap(), Some(7));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut source = Scripted {
            script: vec![Err(ErrorKind::Interrupted), Ok(0xDB)],
        };
        assert_eq!(source.read_byte().unwrap(), Some(0xDB));
    }

    #[test]
    fn other_read_errors_propagate() {
        let mut source = Scripted {
            script: vec![Err(ErrorKind::BrokenPipe)],
        };
        let err = source.read_byte().unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn sink_writes_everything() {
        let mut sink = Vec::new();
        let written = sink.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(written, 3);
        assert_eq!(sink, vec![1, 2, 3]);
    }

    #[test]
    fn sink_zero_write_is_closed() {
        let mut sink = ZeroWriter;
        assert!(matches!(
            sink.write_bytes(&[1]),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn pair_split_returns_halves() {
        let (reader, writer) = (Cursor::new(vec![9u8]), Vec::<u8>::new())
            .split(Some(Duration::from_millis(5)))
            .unwrap();
        assert_eq!(reader.get_ref(), &vec![9u8]);
        assert!(writer.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn unix_stream_split_applies_read_timeout() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let (mut reader, _writer) = left.split(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(reader.read_byte().unwrap(), None);

        let (_right_reader, mut right_writer) = right.split(None).unwrap();
        right_writer.write_bytes(&[0x42]).unwrap();
        assert_eq!(reader.read_byte().unwrap(), Some(0x42));
    }

    struct Scripted {
        script: Vec<std::result::Result<u8, ErrorKind>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.script.is_empty() {
                return Ok(0);
            }
            match self.script.remove(0) {
                Ok(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                Err(kind) => Err(std::io::Error::from(kind)),
            }
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
