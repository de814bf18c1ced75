use senscord_proto::Cause;

/// Internal adapter/manager errors (spec §7's "Error kinds via sum type"
/// note), carrying their own `cause()` mapping into the wire taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unknown resource id: {0}")]
    NotFound(u64),
    #[error("resource in wrong state: {0}")]
    InvalidOperation(String),
    #[error("sdk operation failed: {0}")]
    Sdk(#[from] senscord_sdk::SdkError),
    #[error("transport send failed: {0}")]
    Transport(#[from] senscord_transport::TransportError),
}

impl AdapterError {
    pub fn cause(&self) -> Cause {
        match self {
            AdapterError::NotFound(_) => Cause::NotFound,
            AdapterError::InvalidOperation(_) => Cause::InvalidOperation,
            AdapterError::Sdk(e) => sdk_cause(e),
            AdapterError::Transport(e) => e.cause(),
        }
    }
}

pub(crate) fn sdk_cause(err: &senscord_sdk::SdkError) -> Cause {
    use senscord_sdk::SdkError;
    match err {
        SdkError::UnknownStream(_) | SdkError::UnknownLockResource(_) => Cause::NotFound,
        SdkError::AlreadyStarted | SdkError::NotStarted => Cause::InvalidOperation,
        SdkError::UnknownProperty(_) => Cause::NotFound,
        SdkError::LockTimeout(_) => Cause::Timeout,
        SdkError::PublishRejected(_) => Cause::InvalidArgument,
    }
}
