use thiserror::Error;

use super::types::{ApiErrorBody, ConflictDetails};

/// Failure taxonomy for gateway operations. Variants carry the server
/// message where one exists so callers can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("another session is already active for this account")]
    SessionConflict(ConflictDetails),
    #[error("an equivalent operation is already in flight")]
    Busy,
}

impl ErrorKind {
    /// Transient failures worth another silent-restore attempt. Everything
    /// else is terminal and must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network(_) | ErrorKind::ServerError { .. })
    }
}

impl From<reqwest::Error> for ErrorKind {
    fn from(error: reqwest::Error) -> Self {
        ErrorKind::Network(error.to_string())
    }
}

/// Maps a non-2xx status and its parsed body onto the taxonomy. A conflict
/// is recognized by status 409 or by the body flag, whichever the backend
/// sent.
pub(crate) fn classify(status: u16, body: ApiErrorBody) -> ErrorKind {
    let ApiErrorBody {
        message,
        error,
        requires_force_login,
        active_session,
    } = body;
    let message = message
        .or(error)
        .unwrap_or_else(|| format!("request failed with status {status}"));
    if status == 409 || requires_force_login {
        return ErrorKind::SessionConflict(active_session.unwrap_or_default());
    }
    match status {
        401 => ErrorKind::Unauthorized(message),
        400..=499 => ErrorKind::Validation(message),
        _ => ErrorKind::ServerError { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with_message(message: &str) -> ApiErrorBody {
        ApiErrorBody {
            message: Some(message.to_string()),
            ..ApiErrorBody::default()
        }
    }

    #[test]
    fn status_401_classifies_as_unauthorized() {
        let kind = classify(401, body_with_message("Invalid token"));
        assert_eq!(kind, ErrorKind::Unauthorized("Invalid token".into()));
        assert!(!kind.is_retryable());
    }

    #[test]
    fn status_409_classifies_as_session_conflict() {
        let body = ApiErrorBody {
            message: Some("Another session is active".into()),
            active_session: Some(ConflictDetails {
                existing_device: Some("Mozilla/5.0".into()),
                ..ConflictDetails::default()
            }),
            ..ApiErrorBody::default()
        };
        match classify(409, body) {
            ErrorKind::SessionConflict(details) => {
                assert_eq!(details.existing_device.as_deref(), Some("Mozilla/5.0"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn force_login_flag_classifies_as_conflict_regardless_of_status() {
        let body = ApiErrorBody {
            requires_force_login: true,
            ..ApiErrorBody::default()
        };
        assert!(matches!(
            classify(403, body),
            ErrorKind::SessionConflict(_)
        ));
    }

    #[test]
    fn server_errors_are_retryable_and_keep_the_status() {
        let kind = classify(503, body_with_message("upstream down"));
        assert_eq!(
            kind,
            ErrorKind::ServerError {
                status: 503,
                message: "upstream down".into()
            }
        );
        assert!(kind.is_retryable());
    }

    #[test]
    fn client_errors_classify_as_validation_and_are_terminal() {
        let kind = classify(400, body_with_message("email is required"));
        assert_eq!(kind, ErrorKind::Validation("email is required".into()));
        assert!(!kind.is_retryable());
    }

    #[test]
    fn machine_code_is_used_when_message_is_absent() {
        let body = ApiErrorBody {
            error: Some("EMAIL_NOT_VERIFIED".into()),
            ..ApiErrorBody::default()
        };
        assert_eq!(
            classify(403, body),
            ErrorKind::Validation("EMAIL_NOT_VERIFIED".into())
        );
    }

    #[test]
    fn empty_body_falls_back_to_the_status_code() {
        let kind = classify(500, ApiErrorBody::default());
        assert_eq!(
            kind,
            ErrorKind::ServerError {
                status: 500,
                message: "request failed with status 500".into()
            }
        );
    }

    #[test]
    fn network_errors_are_retryable() {
        assert!(ErrorKind::Network("connection refused".into()).is_retryable());
        assert!(!ErrorKind::Busy.is_retryable());
    }
}
