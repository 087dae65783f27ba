//! Configuration bridge: config file + environment, then CLI flag overrides.

use std::path::PathBuf;

use xrotate_core::PipelineConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use xrotate_config::{Config, config_path};

/// The config file in effect: `--config` / `XROTATE_CONFIG`, else the
/// platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the config and apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = xrotate_config::load_config(&active_path(global))?;
    apply_overrides(&mut cfg, global);
    Ok(cfg)
}

fn apply_overrides(cfg: &mut Config, global: &GlobalOpts) {
    if let Some(ref url) = global.panel_url {
        cfg.panel.url = Some(url.clone());
    }
    if let Some(ref username) = global.username {
        cfg.panel.username = Some(username.clone());
    }
    if global.insecure {
        cfg.panel.insecure = true;
    }
    if let Some(ref prefix) = global.prefix {
        cfg.prefix.clone_from(prefix);
    }
}

/// Resolve a validated `PipelineConfig`; `with_panel` also resolves the
/// panel credentials.
pub fn pipeline_config(global: &GlobalOpts, with_panel: bool) -> Result<PipelineConfig, CliError> {
    Ok(load(global)?.pipeline_config(with_panel)?)
}
