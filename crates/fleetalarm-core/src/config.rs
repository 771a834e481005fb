// ── Runtime reconciler configuration ──
//
// These types describe *where* the alarm backend lives and how the
// reconciler should pace its channels. They carry the bearer token but
// never touch disk: the CLI builds a `ReconcilerConfig` and hands it in.

use std::time::Duration;

use fleetalarm_api::{ReconnectConfig, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::merge::DEFAULT_CAPACITY;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab backends).
    DangerAcceptInvalid,
}

/// Configuration for one alarm backend.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// API root (e.g., `https://fleet.example.com/api`).
    pub api_url: Url,
    /// Bearer token for every request, including the event stream.
    pub token: Option<SecretString>,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Per-request timeout for REST calls; connect timeout for the stream.
    pub timeout: Duration,
    /// Open the live event stream.
    pub stream_enabled: bool,
    /// Scope the stream to a single device (`local_sse` source).
    pub device_id: Option<String>,
    /// Stream reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Reconnect when the stream yields nothing for this long. `None` = never.
    pub idle_timeout: Option<Duration>,
    /// Polling fallback interval while the stream is down. Zero disables polling.
    pub poll_interval: Duration,
    /// Page size for history loads and fallback polls.
    pub history_page_size: u32,
    /// Pages of history fetched by `start()`. Zero skips the initial load.
    pub initial_history_pages: u32,
    /// Maximum alarms kept in the canonical set.
    pub capacity: usize,
    /// Report `Liveness::Stale` when no channel delivered for this long.
    pub stale_after: Duration,
}

impl ReconcilerConfig {
    /// Defaults for everything except the backend location.
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            stream_enabled: true,
            device_id: None,
            reconnect: ReconnectConfig::default(),
            idle_timeout: Some(Duration::from_secs(90)),
            poll_interval: Duration::from_secs(10),
            history_page_size: 100,
            initial_history_pages: 1,
            capacity: DEFAULT_CAPACITY,
            stale_after: Duration::from_secs(30),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
            token: self.token.clone(),
        }
    }
}
