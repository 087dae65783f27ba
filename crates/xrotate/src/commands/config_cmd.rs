//! Config subcommand handlers.

use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load(global)?.redacted();
            let text = cfg.to_toml()?;
            let path = config::active_path(global);
            let out = output::render_single(
                &global.output,
                &cfg,
                |_| format!("# {}\n{text}", path.display()),
                |_| path.display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config::active_path(global).display().to_string(), false);
            Ok(())
        }

        // ── SetPassword ─────────────────────────────────────────────
        ConfigCommand::SetPassword => {
            let cfg = config::load(global)?;
            let url = cfg.panel_url()?;
            let username = cfg.panel_username()?;

            let secret = rpassword::prompt_password(format!("Password for {username}: "))?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "value cannot be empty".into(),
                });
            }

            xrotate_config::store_password(username, &url, &SecretString::from(secret))?;
            if !global.quiet {
                eprintln!(
                    "✓ Password stored in system keyring for {}",
                    xrotate_config::keyring_user(username, &url)
                );
            }
            Ok(())
        }
    }
}
