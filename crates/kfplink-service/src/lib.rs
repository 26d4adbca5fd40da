//! Frame dispatch and link lifecycle for the Killalot frame protocol.
//!
//! A [`Link`] owns one byte channel. Its receive loop runs on a dedicated
//! thread, decodes frames and fans each one out through a [`FrameBus`] to the
//! registered listeners. Sends happen synchronously on the caller's thread.
//! Links are ordinary values: any number can run side by side.

pub mod bus;
pub mod error;
pub mod link;
pub mod receive;

#[cfg(feature = "async")]
pub mod async_link;

pub use bus::{Delivery, FrameBus, FrameListener, ListenerId};
pub use error::{LinkError, Result};
pub use link::{Link, LinkConfig};
pub use receive::{receive_loop, StopReason, StopSignal};

#[cfg(feature = "async")]
pub use async_link::AsyncLink;
