use thiserror::Error;

/// Top-level error type for the `fleetalarm-api` crate.
///
/// Covers every failure mode of the alarm backend surfaces:
/// authentication, transport, REST responses, and the event stream.
/// `fleetalarm-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The backend rejected the bearer token (HTTP 401/403).
    #[error("Authentication rejected (HTTP {status})")]
    Authentication { status: u16 },

    /// The configured token cannot be carried in an HTTP header.
    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Non-success HTTP status with the (truncated) response body.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The backend answered a mutation with `{"success": false}`.
    #[error("Backend rejected {action} for alarm {id}")]
    Rejected { action: &'static str, id: String },

    // ── Event stream ────────────────────────────────────────────────
    /// Opening or reading the event stream failed.
    #[error("Stream connection failed: {0}")]
    StreamConnect(String),

    /// No bytes arrived on the event stream within the idle window.
    #[error("Stream idle for {idle_secs}s")]
    StreamIdle { idle_secs: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the token was rejected
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } | Self::StreamConnect(_) | Self::StreamIdle { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = Error::Api {
            status: 404,
            message: "missing".into(),
        };
        assert!(!err.is_transient());
        assert!(err.is_not_found());
    }

    #[test]
    fn rejected_token_is_auth_expired() {
        assert!(Error::Authentication { status: 401 }.is_auth_expired());
        assert!(!Error::StreamIdle { idle_secs: 90 }.is_auth_expired());
        assert!(Error::StreamIdle { idle_secs: 90 }.is_transient());
    }
}
