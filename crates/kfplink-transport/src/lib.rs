//! Byte-channel abstraction for the Killalot frame protocol.
//!
//! The framing layer only ever needs two things from a transport:
//! - pull one byte, waiting at most one read timeout for it
//! - push a complete encoded frame
//!
//! This is the lowest layer of kfplink. Serial devices, Unix stream pairs and
//! in-memory buffers all plug in through [`ByteSource`] / [`ByteSink`], and
//! [`ByteChannel`] splits one physical handle into independently owned halves.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};
pub use traits::{ByteChannel, ByteSink, ByteSource};

#[cfg(unix)]
pub use serial::{Baud, SerialConfig, SerialPort};
