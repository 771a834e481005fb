//! Configuration for the fleetalarm CLI.
//!
//! TOML profiles, bearer-token resolution (env var + keyring + plaintext),
//! and translation to `fleetalarm_core::ReconcilerConfig`. The core never
//! reads files; everything it needs arrives through that struct.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use fleetalarm_core::{ReconcilerConfig, ReconnectConfig, TlsVerification};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "fleetalarm";

/// Prefix for environment overrides, e.g. `FLEETALARM_DEFAULTS__TIMEOUT=5`.
pub const ENV_PREFIX: &str = "FLEETALARM_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick `name`, else the configured default profile, else `"default"`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// REST request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Fallback poll interval while the stream is down. 0 disables polling.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,

    /// Unset: reconnect forever.
    #[serde(default)]
    pub reconnect_max_retries: Option<u32>,

    /// 0 disables the idle-read timeout.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub history_page_size: u32,

    /// History pages loaded when `watch` starts.
    #[serde(default = "default_history_pages")]
    pub history_pages: u32,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Terminal bell on every new live alarm.
    #[serde(default = "default_true")]
    pub sound: bool,

    /// Platform notification line on every new live alarm.
    #[serde(default = "default_true")]
    pub notifications: bool,

    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            poll_interval_secs: default_poll_interval(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
            reconnect_max_retries: None,
            idle_timeout_secs: default_idle_timeout(),
            history_page_size: default_page_size(),
            history_pages: default_history_pages(),
            capacity: default_capacity(),
            sound: true,
            notifications: true,
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    10
}
fn default_reconnect_initial() -> u64 {
    1_000
}
fn default_reconnect_max() -> u64 {
    30_000
}
fn default_idle_timeout() -> u64 {
    90
}
fn default_page_size() -> u32 {
    100
}
fn default_history_pages() -> u32 {
    1
}
fn default_capacity() -> usize {
    fleetalarm_core::DEFAULT_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_stale_after() -> u64 {
    30
}

/// A named alarm backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API root (e.g., "https://fleet.example.com/api").
    pub api_url: String,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Skip TLS certificate verification.
    pub insecure: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Scope the event stream to a single vehicle.
    pub device_id: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "fleetalarm", "fleetalarm").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetalarm");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

/// Resolve a bearer token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, keyring_token)
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    keyring: impl FnOnce(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
        debug!(profile = profile_name, env = %env_name, "token_env set but variable missing");
    }

    // 2. System keyring
    if let Some(secret) = keyring(profile_name) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_token(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .ok()?
        .get_password()
        .ok()
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to ReconcilerConfig ─────────────────────────────────

/// Build a `ReconcilerConfig` from a profile plus global defaults.
///
/// `token` is the already-resolved bearer token, if any; CLI flag
/// precedence is the caller's concern.
pub fn to_reconciler_config(
    profile: &Profile,
    defaults: &Defaults,
    token: Option<SecretString>,
) -> Result<ReconcilerConfig, ConfigError> {
    let api_url: url::Url = profile
        .api_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "api_url".into(),
            reason: format!("invalid URL: {}", profile.api_url),
        })?;
    if !matches!(api_url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "api_url".into(),
            reason: format!("expected http or https, got '{}'", api_url.scheme()),
        });
    }
    if defaults.history_page_size == 0 {
        return Err(ConfigError::Validation {
            field: "history_page_size".into(),
            reason: "must be at least 1".into(),
        });
    }
    if defaults.capacity == 0 {
        return Err(ConfigError::Validation {
            field: "capacity".into(),
            reason: "must be at least 1".into(),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = ReconcilerConfig::new(api_url);
    config.token = token;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.device_id.clone_from(&profile.device_id);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(defaults.reconnect_initial_ms),
        max_delay: Duration::from_millis(defaults.reconnect_max_ms),
        max_retries: defaults.reconnect_max_retries,
    };
    config.idle_timeout =
        (defaults.idle_timeout_secs > 0).then(|| Duration::from_secs(defaults.idle_timeout_secs));
    config.poll_interval = Duration::from_secs(defaults.poll_interval_secs);
    config.history_page_size = defaults.history_page_size;
    config.initial_history_pages = defaults.history_pages;
    config.capacity = defaults.capacity;
    config.stale_after = Duration::from_secs(defaults.stale_after_secs);
    Ok(config)
}

/// Resolve the token through the full chain and build a
/// `ReconcilerConfig`, no CLI flag overrides.
pub fn profile_to_reconciler_config(
    config: &Config,
    profile_name: Option<&str>,
) -> Result<ReconcilerConfig, ConfigError> {
    let (name, profile) = config.profile(profile_name)?;
    let token = resolve_token(profile, name)?;
    to_reconciler_config(profile, &config.defaults, Some(token))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn profile(url: &str) -> Profile {
        Profile {
            api_url: url.into(),
            ..Profile::default()
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.poll_interval_secs, 10);
        assert_eq!(config.defaults.capacity, 500);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn toml_profiles_and_env_overlay() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    default_profile = "depot"

                    [defaults]
                    history_pages = 3
                    sound = false

                    [profiles.depot]
                    api_url = "https://fleet.example.com/api"
                    device_id = "truck-7"
                "#,
            )?;
            jail.set_env("FLEETALARM_DEFAULTS__POLL_INTERVAL_SECS", "2");

            let config = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(config.defaults.history_pages, 3);
            assert_eq!(config.defaults.poll_interval_secs, 2);
            assert!(!config.defaults.sound);

            let (name, depot) = config.profile(None).unwrap();
            assert_eq!(name, "depot");
            assert_eq!(depot.device_id.as_deref(), Some("truck-7"));
            Ok(())
        });
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config
            .profiles
            .insert("default".into(), profile("http://localhost:8080"));
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (_, p) = loaded.profile(None).unwrap();
        assert_eq!(p.api_url, "http://localhost:8080");
    }

    #[test]
    fn unknown_profile_is_reported() {
        let config = Config::default();
        let err = config.profile(Some("ghost")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { ref name } if name == "ghost"));
    }

    #[test]
    fn token_env_beats_keyring_and_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("DEPOT_TOKEN", "from-env");
            let p = Profile {
                token: Some("plain".into()),
                token_env: Some("DEPOT_TOKEN".into()),
                ..profile("https://x")
            };
            let token = resolve_token_with(&p, "depot", |_| Some("from-keyring".into())).unwrap();
            assert_eq!(token.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn keyring_beats_plaintext() {
        let p = Profile {
            token: Some("plain".into()),
            ..profile("https://x")
        };
        let token = resolve_token_with(&p, "depot", |name| {
            assert_eq!(name, "depot");
            Some("from-keyring".into())
        })
        .unwrap();
        assert_eq!(token.expose_secret(), "from-keyring");

        let token = resolve_token_with(&p, "depot", |_| None).unwrap();
        assert_eq!(token.expose_secret(), "plain");
    }

    #[test]
    fn no_token_anywhere_is_an_error() {
        let err = resolve_token_with(&profile("https://x"), "depot", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn reconciler_config_reflects_defaults_and_profile() {
        let defaults = Defaults {
            idle_timeout_secs: 0,
            reconnect_max_retries: Some(4),
            ..Defaults::default()
        };
        let p = Profile {
            insecure: Some(true),
            timeout: Some(5),
            device_id: Some("truck-7".into()),
            ..profile("https://fleet.example.com/api")
        };

        let config = to_reconciler_config(&p, &defaults, None).unwrap();
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.reconnect.max_retries, Some(4));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(config.device_id.as_deref(), Some("truck-7"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.token.is_none());
    }

    #[test]
    fn rejects_bad_urls_and_zero_sizes() {
        let defaults = Defaults::default();
        for url in ["not a url", "ftp://fleet.example.com"] {
            let err = to_reconciler_config(&profile(url), &defaults, None).unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api_url"));
        }

        let zero = Defaults {
            history_page_size: 0,
            ..Defaults::default()
        };
        let err = to_reconciler_config(&profile("https://x"), &zero, None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
