use clap::{Args, Subcommand};
#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use kfplink_frame::{Frame, ID_SIZE, PAYLOAD_SIZE};
#[cfg(unix)]
use kfplink_transport::{Baud, SerialConfig};

#[cfg(unix)]
use crate::exit::transport_error;
use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
#[cfg(unix)]
pub mod listen;
#[cfg(unix)]
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a serial link and print received frames.
    #[cfg(unix)]
    Listen(ListenArgs),
    /// Send a single frame over a serial link.
    #[cfg(unix)]
    Send(SendArgs),
    /// Print the wire encoding of a frame.
    Encode(EncodeArgs),
    /// Decode a captured byte stream.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        #[cfg(unix)]
        Command::Listen(args) => listen::run(args, format),
        #[cfg(unix)]
        Command::Send(args) => send::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device path.
    #[arg(env = "KFPLINK_DEVICE")]
    pub path: PathBuf,
    /// Line speed.
    #[arg(long, env = "KFPLINK_BAUD", default_value_t = 115_200)]
    pub baud: u32,
}

#[cfg(unix)]
impl DeviceArgs {
    pub fn serial_config(&self, read_timeout: Duration) -> CliResult<SerialConfig> {
        let baud = Baud::try_from(self.baud).map_err(|err| transport_error("invalid --baud", err))?;
        Ok(SerialConfig {
            baud,
            read_timeout: Some(read_timeout),
        })
    }

    pub fn link_name(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    /// Frame id: exactly 4 hex bytes (e.g. `01000000` or `01 00 00 00`).
    #[arg(long)]
    pub id: String,
    /// Payload: up to 8 hex bytes, zero padded.
    #[arg(long, default_value = "")]
    pub payload: String,
}

impl FrameArgs {
    pub fn to_frame(&self) -> CliResult<Frame> {
        let id = parse_hex(&self.id)?;
        let id: [u8; ID_SIZE] = id.as_slice().try_into().map_err(|_| {
            CliError::usage(format!("--id needs {ID_SIZE} bytes, got {}", id.len()))
        })?;

        let payload = parse_hex(&self.payload)?;
        if payload.len() > PAYLOAD_SIZE {
            return Err(CliError::usage(format!(
                "--payload holds at most {PAYLOAD_SIZE} bytes, got {}",
                payload.len()
            )));
        }
        let mut padded = [0u8; PAYLOAD_SIZE];
        padded[..payload.len()].copy_from_slice(&payload);

        Ok(Frame::new(id, padded))
    }
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Pause after each frame, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub quiescent_ms: u64,
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(flatten)]
    pub frame: FrameArgs,
    /// Wait for one frame back and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub frame: FrameArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured wire bytes in hex. Read from stdin when omitted.
    pub input: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse hex bytes, ignoring whitespace and `:`/`,`/`-` separators. An
/// optional `0x` prefix applies to the whole string.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = trimmed
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && !matches!(b, b':' | b',' | b'-'))
        .collect();

    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!(
            "odd number of hex digits in '{input}'"
        )));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap_or("??");
            u8::from_str_radix(text, 16)
                .map_err(|_| CliError::usage(format!("invalid hex byte '{text}' in '{input}'")))
        })
        .collect()
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn parse_hex_accepts_separators() {
        assert_eq!(parse_hex("01000000").unwrap(), [1, 0, 0, 0]);
        assert_eq!(parse_hex("c0 db:dc,dd").unwrap(), [0xC0, 0xDB, 0xDC, 0xDD]);
        assert_eq!(parse_hex("0xFF10").unwrap(), [0xFF, 0x10]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn frame_args_pad_payload() {
        let args = FrameArgs {
            id: "01 00 00 00".into(),
            payload: "10 20".into(),
        };
        let frame = args.to_frame().unwrap();
        assert_eq!(frame, Frame::new([1, 0, 0, 0], [0x10, 0x20, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn frame_args_reject_wrong_sizes() {
        let short_id = FrameArgs {
            id: "0100".into(),
            payload: String::new(),
        };
        assert_eq!(short_id.to_frame().unwrap_err().code, USAGE);

        let long_payload = FrameArgs {
            id: "01000000".into(),
            payload: "00".repeat(9),
        };
        assert_eq!(long_payload.to_frame().unwrap_err().code, USAGE);
    }

    #[test]
    #[cfg(unix)]
    fn device_args_validate_baud() {
        let args = DeviceArgs {
            path: PathBuf::from("/dev/ttyUSB0"),
            baud: 9600,
        };
        let config = args.serial_config(Duration::from_millis(100)).unwrap();
        assert_eq!(config.baud, Baud::B9600);

        let bad = DeviceArgs {
            path: PathBuf::from("/dev/ttyUSB0"),
            baud: 1234,
        };
        assert_eq!(
            bad.serial_config(Duration::from_millis(100)).unwrap_err().code,
            USAGE
        );
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }
}
