use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::ByteChannel;

/// Line rates supported by the radio modules the link talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Baud {
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    #[default]
    B115200,
}

impl Baud {
    /// Every supported rate, slowest first.
    pub const ALL: [Baud; 6] = [
        Baud::B4800,
        Baud::B9600,
        Baud::B19200,
        Baud::B38400,
        Baud::B57600,
        Baud::B115200,
    ];

    /// Rate in bits per second.
    pub fn bits_per_second(self) -> u32 {
        match self {
            Baud::B4800 => 4800,
            Baud::B9600 => 9600,
            Baud::B19200 => 19200,
            Baud::B38400 => 38400,
            Baud::B57600 => 57600,
            Baud::B115200 => 115200,
        }
    }

    fn speed(self) -> libc::speed_t {
        match self {
            Baud::B4800 => libc::B4800,
            Baud::B9600 => libc::B9600,
            Baud::B19200 => libc::B19200,
            Baud::B38400 => libc::B38400,
            Baud::B57600 => libc::B57600,
            Baud::B115200 => libc::B115200,
        }
    }
}

impl TryFrom<u32> for Baud {
    type Error = TransportError;

    fn try_from(rate: u32) -> Result<Self> {
        Baud::ALL
            .into_iter()
            .find(|baud| baud.bits_per_second() == rate)
            .ok_or(TransportError::UnsupportedBaud(rate))
    }
}

impl fmt::Display for Baud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

/// Line settings for a serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line rate. Default: 115200.
    pub baud: Baud,
    /// Upper bound on one blocking read. `None` blocks until a byte arrives.
    pub read_timeout: Option<Duration>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: Baud::default(),
            read_timeout: Some(Duration::from_millis(100)),
        }
    }
}

/// A tty device configured for 8-bit binary transfer with no echo.
///
/// Reads honour the configured timeout through termios `VMIN`/`VTIME`; a read
/// that times out surfaces as [`ErrorKind::TimedOut`] rather than as a
/// zero-length read, so it is never mistaken for a hangup.
pub struct SerialPort {
    file: File,
    path: PathBuf,
    config: SerialConfig,
}

impl SerialPort {
    /// Open and configure a serial device.
    pub fn open(path: impl AsRef<Path>, config: SerialConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        configure(&file, &config).map_err(|source| TransportError::Configure {
            path: path.clone(),
            source,
        })?;

        info!(?path, baud = %config.baud, "opened serial device");

        Ok(Self { file, path, config })
    }

    /// Change the read timeout and re-apply the line settings.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let mut config = self.config.clone();
        config.read_timeout = timeout.filter(|t| !t.is_zero());
        configure(&self.file, &config).map_err(|source| TransportError::Configure {
            path: self.path.clone(),
            source,
        })?;
        self.config = config;
        Ok(())
    }

    /// Open a second handle to the same device.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            path: self.path.clone(),
            config: self.config.clone(),
        })
    }

    /// Device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active line settings.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.file.read(buf) {
            Ok(0) if !buf.is_empty() && self.config.read_timeout.is_some() => {
                Err(std::io::Error::from(ErrorKind::TimedOut))
            }
            other => other,
        }
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl ByteChannel for SerialPort {
    type Reader = SerialPort;
    type Writer = SerialPort;

    fn split(mut self, read_timeout: Option<Duration>) -> Result<(Self::Reader, Self::Writer)> {
        if read_timeout != self.config.read_timeout {
            self.set_read_timeout(read_timeout)?;
        }
        let writer = self.try_clone()?;
        Ok((self, writer))
    }
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.path)
            .field("baud", &self.config.baud)
            .finish()
    }
}

fn configure(file: &File, config: &SerialConfig) -> std::io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: termios is plain old data; tcgetattr fully initialises it before use.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open descriptor owned by `file`, `tio` is a valid writable termios.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` is a valid termios obtained from tcgetattr.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !libc::CSTOPB;
    tio.c_lflag &= !(libc::ECHO | libc::ECHONL);

    match config.read_timeout {
        Some(timeout) => {
            tio.c_cc[libc::VMIN] = 0;
            tio.c_cc[libc::VTIME] = vtime_deciseconds(timeout);
        }
        None => {
            tio.c_cc[libc::VMIN] = 1;
            tio.c_cc[libc::VTIME] = 0;
        }
    }

    let speed = config.baud.speed();
    // SAFETY: `tio` is a valid termios; speed is one of the libc B* constants.
    if unsafe { libc::cfsetispeed(&mut tio, speed) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::cfsetospeed(&mut tio, speed) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is open and `tio` is fully initialised.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    debug!(
        baud = %config.baud,
        read_timeout = ?config.read_timeout,
        "applied serial line settings"
    );
    Ok(())
}

/// termios expresses read timeouts in tenths of a second, 1..=255.
fn vtime_deciseconds(timeout: Duration) -> libc::cc_t {
    let tenths = timeout.as_millis().div_ceil(100);
    tenths.clamp(1, 255) as libc::cc_t
}
