//! Config subcommand handlers.

use std::io::BufRead;

use dialoguer::{Input, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.token.is_some() {
                    profile.token = Some(REDACTED.into());
                }
            }
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|_| format!("{c:#?}")),
                |_| "config".into(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        // ── Set-token ───────────────────────────────────────────────
        ConfigCommand::SetToken { stdin } => {
            let cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);

            let token = if stdin {
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line)?;
                line.trim().to_owned()
            } else {
                rpassword::prompt_password(format!("Token for profile '{profile_name}': "))
                    .map_err(prompt_err)?
            };
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }

            config::store_token(&profile_name, &token)?;
            if !global.quiet {
                eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("fleetalarm configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config().unwrap_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let api_url: String = Input::new()
        .with_prompt("Alarm API URL")
        .default("https://fleet.example.com/api".into())
        .interact_text()
        .map_err(prompt_err)?;

    let device_id: String = Input::new()
        .with_prompt("Follow a single vehicle (blank for the whole fleet)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    let store_choices = &[
        "Store token in system keyring (recommended)",
        "Read token from an environment variable",
        "Save token to config file (plaintext)",
    ];
    let store_selection = Select::new()
        .with_prompt("How should the bearer token be provided?")
        .items(store_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let mut profile = Profile {
        api_url,
        device_id: (!device_id.trim().is_empty()).then(|| device_id.trim().to_owned()),
        ..Profile::default()
    };

    match store_selection {
        0 | 2 => {
            let token = rpassword::prompt_password("Bearer token: ").map_err(prompt_err)?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            if store_selection == 0 {
                config::store_token(&profile_name, &token)?;
                eprintln!("   ✓ Token stored in system keyring");
            } else {
                profile.token = Some(token);
            }
        }
        _ => {
            let env_name: String = Input::new()
                .with_prompt("Environment variable name")
                .default("FLEET_TOKEN".into())
                .interact_text()
                .map_err(prompt_err)?;
            profile.token_env = Some(env_name);
        }
    }

    // Validate before writing anything.
    fleetalarm_config::to_reconciler_config(&profile, &cfg.defaults, None)?;

    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    let written = config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", written.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: fleetalarm history");
    Ok(())
}
