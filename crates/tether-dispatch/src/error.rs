//! Error types for the tether-dispatch crate.

use thiserror::Error;

use tether_wire::{SerializedError, TARGET_CLOSED_MESSAGE};

/// Errors that can occur while dispatching a call or mutating the node graph.
///
/// Every variant is terminal for a single call only; none of them tears down
/// the connection. Handlers return these from their method implementations,
/// and the router turns them into error responses.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The target node (or an ancestor scope) was disposed. The reason, when
    /// present, is the most specific close reason recorded on the ancestor
    /// chain.
    #[error("{}", reason.as_deref().unwrap_or(TARGET_CLOSED_MESSAGE))]
    TargetClosed { reason: Option<String> },

    /// The underlying domain object died during the call.
    #[error("Target crashed {detail}")]
    Crashed { detail: String },

    /// Params, metadata, or a result payload failed schema validation.
    /// `path` pinpoints the offending field.
    #[error("{path}: {message}")]
    Validation { path: String, message: String },

    /// The node exists but its kind declares no handler with that name.
    #[error("\"{kind}\" does not implement \"{method}\"")]
    UnsupportedMethod { kind: String, method: String },

    /// The root `initialize` method was called a second time.
    #[error("root scope is already initialized")]
    AlreadyInitialized,

    /// A handler-defined domain error, surfaced verbatim with its class name.
    #[error("{message}")]
    Domain { name: String, message: String },
}

impl DispatchError {
    /// Shorthand for a path-qualified validation error.
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// A target-closed error with no recorded reason.
    pub fn target_closed() -> Self {
        Self::TargetClosed { reason: None }
    }

    /// A handler-defined error with name `"Error"`.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            name: "Error".to_string(),
            message: message.into(),
        }
    }

    /// Whether this error means the target (or its scope) is gone.
    pub fn is_target_closed(&self) -> bool {
        matches!(self, Self::TargetClosed { .. })
    }

    /// Wire form of this error.
    pub fn serialize(&self) -> SerializedError {
        match self {
            Self::TargetClosed { reason } => SerializedError::target_closed(reason.as_deref()),
            Self::Domain { name, message } => SerializedError::named(name.clone(), message.clone()),
            other => SerializedError::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_closed_display_uses_reason() {
        let err = DispatchError::TargetClosed {
            reason: Some("browser closed by operator".to_string()),
        };
        assert_eq!(err.to_string(), "browser closed by operator");
        assert_eq!(
            DispatchError::target_closed().to_string(),
            TARGET_CLOSED_MESSAGE
        );
    }

    #[test]
    fn serialize_preserves_target_closed_name() {
        let wire = DispatchError::target_closed().serialize();
        assert!(wire.is_target_closed());
    }

    #[test]
    fn serialize_preserves_domain_name() {
        let err = DispatchError::Domain {
            name: "TimeoutError".to_string(),
            message: "timeout 5000ms exceeded".to_string(),
        };
        let wire = err.serialize();
        assert_eq!(wire.error.name, "TimeoutError");
        assert_eq!(wire.error.message, "timeout 5000ms exceeded");
    }

    #[test]
    fn unsupported_method_message() {
        let err = DispatchError::UnsupportedMethod {
            kind: "Page".to_string(),
            method: "launch".to_string(),
        };
        assert_eq!(err.to_string(), "\"Page\" does not implement \"launch\"");
    }
}
