/// Errors the sensor SDK can return. Kept small and orthogonal to the wire
/// `Cause` taxonomy in `senscord-proto` — adapters translate these at the
/// boundary rather than this crate depending on the wire layer.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("unknown stream key: {0}")]
    UnknownStream(String),
    #[error("stream already started")]
    AlreadyStarted,
    #[error("stream not started")]
    NotStarted,
    #[error("unknown property key: {0}")]
    UnknownProperty(String),
    #[error("lock timed out after {0}ms")]
    LockTimeout(i32),
    #[error("unknown lock resource id: {0}")]
    UnknownLockResource(u64),
    #[error("publisher rejected frame: {0}")]
    PublishRejected(String),
}
