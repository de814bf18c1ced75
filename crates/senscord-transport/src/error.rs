use senscord_proto::Cause;

/// Errors a [`crate::Transport`] operation can fail with. Every variant maps
/// onto one [`Cause`] via [`TransportError::cause`] so adapters can forward
/// it straight into a wire `MessageStatus`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("operation not supported by this transport: {0}")]
    NotSupported(&'static str),
    #[error("wait_readable timed out")]
    Timeout,
    #[error("peer disconnected")]
    Cancelled,
    #[error("invalid address: {0}")]
    InvalidArgument(String),
    #[error("failed to spawn transport resource: {0}")]
    Aborted(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire codec error: {0}")]
    Codec(#[from] senscord_proto::CodecError),
}

impl TransportError {
    pub fn cause(&self) -> Cause {
        match self {
            TransportError::NotConnected | TransportError::AlreadyConnected => {
                Cause::InvalidOperation
            }
            TransportError::NotSupported(_) => Cause::NotSupported,
            TransportError::Timeout => Cause::Timeout,
            TransportError::Cancelled => Cause::Cancelled,
            TransportError::InvalidArgument(_) => Cause::InvalidArgument,
            TransportError::Aborted(_) => Cause::Aborted,
            TransportError::Io(_) | TransportError::Codec(_) => Cause::Unknown,
        }
    }
}
