use dapbridge_frame::FrameError;

/// Errors that can occur while serving a client.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] dapbridge_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The command processor reported a response longer than it was allowed to write.
    #[error("command processor returned a {len}-byte response (max {max})")]
    ProcessorContract { len: usize, max: usize },
}

impl ServerError {
    /// Whether the active connection must be dropped after this error.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            ServerError::Frame(err) => err.is_connection_fatal(),
            ServerError::Transport(_) | ServerError::ProcessorContract { .. } => true,
        }
    }

    /// Whether this error is the peer going away rather than misbehaving.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, ServerError::Frame(FrameError::ConnectionClosed))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
