//! Wire error taxonomy carried by [`crate::status::MessageStatus::cause`].

use serde::{Deserialize, Serialize};

/// The closed set of failure causes that can cross the wire or be returned
/// by a transport operation. `None` means success and is rarely constructed
/// directly — prefer [`crate::status::MessageStatus::ok`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Cause {
    None = 0,
    NotFound = 1,
    InvalidArgument = 2,
    InvalidOperation = 3,
    NotSupported = 4,
    Aborted = 5,
    ResourceExhausted = 6,
    Timeout = 7,
    Cancelled = 8,
    Unknown = 9,
}

impl Cause {
    pub fn is_success(self) -> bool {
        matches!(self, Cause::None)
    }
}

impl Default for Cause {
    fn default() -> Self {
        Cause::None
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Cause::None => "none",
            Cause::NotFound => "not_found",
            Cause::InvalidArgument => "invalid_argument",
            Cause::InvalidOperation => "invalid_operation",
            Cause::NotSupported => "not_supported",
            Cause::Aborted => "aborted",
            Cause::ResourceExhausted => "resource_exhausted",
            Cause::Timeout => "timeout",
            Cause::Cancelled => "cancelled",
            Cause::Unknown => "unknown",
        };
        f.write_str(text)
    }
}
