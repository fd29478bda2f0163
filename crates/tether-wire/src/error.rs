//! Serialized error shape carried in command responses.

use serde::{Deserialize, Serialize};

/// Error name used when the target node (or an ancestor) was disposed.
/// Controllers classify on this name, so it is part of the wire contract.
pub const TARGET_CLOSED_ERROR_NAME: &str = "TargetClosedError";

/// Default human-readable message for a closed target when no more specific
/// close reason was recorded.
pub const TARGET_CLOSED_MESSAGE: &str = "Target page, context or browser has been closed";

/// Wire form of an error attached to a [`Response`](crate::Response).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    pub error: ErrorDetails,
}

/// The error payload proper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error class name, e.g. `"TargetClosedError"` or `"Error"`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Optional stack or diagnostic detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedError {
    /// Build a generic error with name `"Error"`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// Build an error with an explicit class name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                name: name.into(),
                message: message.into(),
                stack: None,
            },
        }
    }

    /// Build a target-closed error, using the given close reason if present.
    pub fn target_closed(reason: Option<&str>) -> Self {
        Self::named(
            TARGET_CLOSED_ERROR_NAME,
            reason.unwrap_or(TARGET_CLOSED_MESSAGE),
        )
    }

    /// Whether this error is a target-closed error.
    pub fn is_target_closed(&self) -> bool {
        self.error.name == TARGET_CLOSED_ERROR_NAME
    }
}
