//! Framed serial link to the Killalot motor and sensor boards.
//!
//! Fixed 12-byte frames (4-byte id, 8-byte payload) travel SLIP-style over a
//! serial line. Received frames are fanned out to registered listeners.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte channels (serial devices, local streams)
//! - [`frame`]: frame type, wire codec, reader and transmitter
//! - [`service`]: listener bus, receive loop and link lifecycle

/// Re-export transport types.
pub mod transport {
    pub use kfplink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use kfplink_frame::*;
}

/// Re-export link service types.
pub mod service {
    pub use kfplink_service::*;
}
