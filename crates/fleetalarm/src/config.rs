//! CLI configuration: thin wrapper around `fleetalarm_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --token, --insecure, --timeout).

use secrecy::SecretString;

use fleetalarm_core::ReconcilerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use fleetalarm_config::{
    Config, Profile, config_path, load_config, save_config, store_token,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ReconcilerConfig` from the config file, profile, and CLI
/// overrides. Without a profile, `--api-url` and `--token` must both
/// be given.
pub fn build_reconciler_config(global: &GlobalOpts) -> Result<ReconcilerConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let (mut profile, stored_token) = if let Some(profile) = cfg.profiles.get(&profile_name) {
        let stored = if global.token.is_some() {
            None
        } else {
            Some(fleetalarm_config::resolve_token(profile, &profile_name)?)
        };
        (profile.clone(), stored)
    } else if global.profile.is_some() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    } else {
        let api_url = global.api_url.clone().ok_or_else(|| CliError::NoConfig {
            path: config_path().display().to_string(),
        })?;
        if global.token.is_none() {
            return Err(CliError::NoCredentials {
                profile: profile_name,
            });
        }
        (
            Profile {
                api_url,
                ..Profile::default()
            },
            None,
        )
    };

    // Flag > env > profile
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    let token = global
        .token
        .clone()
        .map(SecretString::from)
        .or(stored_token);

    Ok(fleetalarm_config::to_reconciler_config(
        &profile,
        &cfg.defaults,
        token,
    )?)
}
