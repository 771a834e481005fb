// ── Core error types ──
//
// User-facing errors from fleetalarm-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<fleetalarm_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::model::AlarmStatus;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach alarm backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Alarm backend request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Alarm not found: {id}")]
    AlarmNotFound { id: String },

    #[error("Alarm {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: AlarmStatus,
        to: AlarmStatus,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Backend rejected {action} for alarm {id}")]
    MutationRejected { action: String, id: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Reconciler is stopped")]
    Stopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error came from the backend answering "no" rather
    /// than from the request never completing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::MutationRejected { .. } | Self::InvalidTransition { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fleetalarm_api::Error> for CoreError {
    fn from(err: fleetalarm_api::Error) -> Self {
        use fleetalarm_api::Error as Api;

        match err {
            Api::Authentication { status } => CoreError::AuthenticationFailed {
                message: format!("backend answered HTTP {status}; check the bearer token"),
            },
            Api::InvalidToken(reason) => CoreError::AuthenticationFailed {
                message: format!("token is not a valid header value: {reason}"),
            },
            Api::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            Api::Rejected { action, id } => CoreError::MutationRejected {
                action: action.to_owned(),
                id,
            },
            Api::StreamConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            Api::StreamIdle { idle_secs } => CoreError::Timeout {
                timeout_secs: idle_secs,
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("unexpected backend response: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_mutation_maps_through() {
        let err: CoreError = fleetalarm_api::Error::Rejected {
            action: "resolve",
            id: "A1".into(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::MutationRejected { ref action, ref id } if action == "resolve" && id == "A1"
        ));
        assert!(err.is_rejection());
    }

    #[test]
    fn request_timeout_keeps_configured_seconds() {
        let err: CoreError = fleetalarm_api::Error::Timeout { timeout_secs: 30 }.into();
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 30 }));
        assert!(err.to_string().ends_with("after 30s"));
    }

    #[test]
    fn auth_status_becomes_authentication_failed() {
        let err: CoreError = fleetalarm_api::Error::Authentication { status: 403 }.into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
        assert!(!err.is_rejection());
    }
}
