/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The channel could not be opened or split.
    #[error("transport error: {0}")]
    Transport(#[from] kfplink_transport::TransportError),

    /// A frame could not be sent or received.
    #[error("frame error: {0}")]
    Frame(#[from] kfplink_frame::FrameError),

    /// `start` was called on a running link.
    #[error("link '{0}' already started")]
    AlreadyStarted(String),

    /// `stop` or `wait` was called on a link that is not running.
    #[error("link '{0}' not started")]
    NotStarted(String),

    /// The receive half of the channel was lost (its loop panicked).
    #[error("link '{0}' has no receive channel")]
    ChannelUnavailable(String),

    /// The receive thread could not be spawned.
    #[error("failed to spawn receive loop: {0}")]
    Spawn(#[source] std::io::Error),

    /// The receive loop panicked.
    #[error("receive loop of link '{0}' panicked")]
    ReceiverPanicked(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
