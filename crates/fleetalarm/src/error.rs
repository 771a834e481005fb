//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use fleetalarm_config::ConfigError;
use fleetalarm_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the alarm backend at {url}")]
    #[diagnostic(
        code(fleetalarm::connection_failed),
        help(
            "Check that the API URL is correct and reachable.\n\
             Reason: {reason}\n\
             For self-signed certificates try --insecure (-k) or set ca_cert."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(fleetalarm::auth_failed),
        help("Refresh the bearer token with: fleetalarm config set-token")
    )]
    AuthFailed { message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(fleetalarm::no_credentials),
        help(
            "Store one with: fleetalarm config set-token --profile {profile}\n\
             Or set the FLEETALARM_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Alarms ───────────────────────────────────────────────────────

    #[error("Alarm '{id}' not found")]
    #[diagnostic(
        code(fleetalarm::not_found),
        help("Run: fleetalarm history to see recent alarm ids")
    )]
    NotFound { id: String },

    #[error("Backend refused to {action} alarm '{id}'")]
    #[diagnostic(code(fleetalarm::rejected))]
    Rejected { action: String, id: String },

    #[error("Alarm '{id}' cannot move from {from} to {to}")]
    #[diagnostic(code(fleetalarm::invalid_transition))]
    InvalidTransition { id: String, from: String, to: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(fleetalarm::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetalarm::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetalarm::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetalarm config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No configuration found")]
    #[diagnostic(
        code(fleetalarm::no_config),
        help(
            "Create one with: fleetalarm config init\n\
             Expected at: {path}\n\
             Or pass --api-url and --token."
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(fleetalarm::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(fleetalarm::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::InvalidTransition { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::AlarmNotFound { id } => CliError::NotFound { id },

            CoreError::InvalidTransition { id, from, to } => CliError::InvalidTransition {
                id,
                from: from.to_string(),
                to: to.to_string(),
            },

            CoreError::MutationRejected { action, id } => CliError::Rejected { action, id },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "transport".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Stopped => CliError::ApiError {
                code: "stopped".into(),
                message: "reconciler stopped".into(),
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::Keyring(reason) => CliError::Validation {
                field: "keyring".into(),
                reason,
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
