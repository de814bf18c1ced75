use senscord_proto::Cause;

/// Errors a client-side port operation can fail with (spec §4.10).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection disconnected while waiting for a reply")]
    Disconnected,

    #[error("reply wait timed out")]
    Timeout,

    #[error("server reported {cause:?}: {message}")]
    Remote { cause: Cause, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] senscord_transport::TransportError),

    #[error("shared-memory allocator error: {0}")]
    Allocator(#[from] senscord_shmem::AllocatorError),

    #[error("unexpected reply payload for this request")]
    UnexpectedReply,
}

impl ClientError {
    pub fn from_status(status: &senscord_proto::MessageStatus) -> Option<Self> {
        if status.ok {
            None
        } else {
            Some(ClientError::Remote {
                cause: status.cause,
                message: status.message.clone(),
            })
        }
    }
}
