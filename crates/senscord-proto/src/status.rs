use serde::{Deserialize, Serialize};

use crate::cause::Cause;

/// Severity attached to a non-OK status. Mirrors the original's numeric
/// levels so existing log tooling that greps for the integer keeps working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Level {
    Undefined = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

/// Every reply begins with a `MessageStatus`. On `ok == false` the remaining
/// fields of the reply are unspecified (see spec §3) — callers must check
/// `ok` before reading anything else out of a reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStatus {
    pub ok: bool,
    pub level: Level,
    pub cause: Cause,
    pub message: String,
    pub block: String,
}

impl MessageStatus {
    pub fn ok() -> Self {
        Self {
            ok: true,
            level: Level::Undefined,
            cause: Cause::None,
            message: String::new(),
            block: String::new(),
        }
    }

    pub fn error(cause: Cause, block: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            level: Level::Error,
            cause,
            message: message.into(),
            block: block.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_has_none_cause() {
        let status = MessageStatus::ok();
        assert!(status.ok);
        assert!(status.cause.is_success());
    }

    #[test]
    fn error_status_carries_block_and_message() {
        let status = MessageStatus::error(Cause::NotFound, "client_adapter", "unknown stream id");
        assert!(!status.ok);
        assert_eq!(status.cause, Cause::NotFound);
        assert_eq!(status.block, "client_adapter");
    }
}
