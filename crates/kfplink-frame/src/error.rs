use kfplink_transport::TransportError;

/// Errors that can occur while moving frames over a channel.
///
/// Corrupt input is not an error: the decoder drops it and resynchronises.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The channel could not be read or written.
    #[error("channel error: {0}")]
    Transport(#[source] TransportError),

    /// An I/O error occurred outside the channel abstraction.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel was closed by the far end.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<TransportError> for FrameError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => FrameError::ConnectionClosed,
            other => FrameError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
