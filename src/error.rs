// Error handling module
// Defines the error taxonomy of the session core

use serde_json::Value;
use thiserror::Error;

use crate::auth::Role;

/// Errors surfaced by the session core
#[derive(Error, Debug)]
pub enum SessionError {
    /// Refresh failed or the single 401 retry failed; credentials were cleared
    #[error("Session expired")]
    SessionExpired,

    /// The identity is valid but lacks permission for this action
    #[error("Forbidden: {status} - {body}")]
    Forbidden { status: u16, body: Value },

    /// Any other non-success response
    #[error("Request failed: {status} - {body}")]
    Request { status: u16, body: Value },

    /// Transport failure of a business request
    #[error("Network error: {0}")]
    Network(String),

    /// Success response that could not be parsed into the requested shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Login rejected by the auth server (message is the server's, verbatim)
    #[error("{0}")]
    Login(String),

    /// Resolved identity does not belong to the portal being loaded
    #[error("Role mismatch: expected {expected}, got {actual}")]
    RoleMismatch { expected: Role, actual: Role },

    /// No token pair is stored
    #[error("No active session")]
    NoActiveSession,

    /// An impersonation record already exists for this kind
    #[error("An impersonation session is already active")]
    ImpersonationActive,

    /// `end()` called without an impersonation record
    #[error("Not impersonating")]
    NotImpersonating,

    /// An impersonation started on top of this one is still active
    #[error("A nested impersonation session must be ended first")]
    NestedImpersonationActive,

    /// The active role may not start this kind of impersonation
    #[error("Role {role:?} may not start this impersonation")]
    ImpersonationNotPermitted { role: Option<Role> },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// Whether this error was handled globally (credentials cleared, redirected)
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, SessionError::SessionExpired)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Forbidden { status, .. } | SessionError::Request { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_messages() {
        let err = SessionError::SessionExpired;
        assert_eq!(err.to_string(), "Session expired");

        let err = SessionError::Request {
            status: 429,
            body: json!("Rate limit exceeded"),
        };
        assert_eq!(err.to_string(), "Request failed: 429 - \"Rate limit exceeded\"");

        let err = SessionError::RoleMismatch {
            expected: Role::Trainer,
            actual: Role::Trainee,
        };
        assert_eq!(err.to_string(), "Role mismatch: expected TRAINER, got TRAINEE");
    }

    #[test]
    fn test_login_message_is_verbatim() {
        let err = SessionError::Login("No active account found".to_string());
        assert_eq!(err.to_string(), "No active account found");
    }

    #[test]
    fn test_internal_error_message() {
        let err = SessionError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_only_session_expired_is_fatal() {
        assert!(SessionError::SessionExpired.is_session_fatal());
        assert!(!SessionError::Forbidden {
            status: 403,
            body: Value::Null
        }
        .is_session_fatal());
        assert!(!SessionError::Request {
            status: 500,
            body: Value::Null
        }
        .is_session_fatal());
        assert!(!SessionError::Network("offline".to_string()).is_session_fatal());
    }

    #[test]
    fn test_status_accessor() {
        let err = SessionError::Forbidden {
            status: 403,
            body: json!({"detail": "nope"}),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(SessionError::SessionExpired.status(), None);
    }
}
