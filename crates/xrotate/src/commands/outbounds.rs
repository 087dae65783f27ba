//! `outbounds`: list the panel's live outbounds.

use serde_json::Value;
use tabled::Tabled;
use xrotate_core::{Reconciler, is_managed};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct OutboundRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Tag")]
    tag: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Managed")]
    managed: String,
}

fn field<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("-")
}

/// First server address for the common protocols, if any.
fn address(entry: &Value) -> &str {
    let settings = &entry["settings"];
    settings["servers"][0]["address"]
        .as_str()
        .or_else(|| settings["vnext"][0]["address"].as_str())
        .unwrap_or("-")
}

/// Render an outbound list with its managed flag.
pub(crate) fn render_outbounds(
    global: &GlobalOpts,
    entries: &[Value],
    prefix: &str,
) -> Result<String, CliError> {
    let color = output::should_color(&global.color);
    let mut index = 0;
    output::render_list(
        &global.output,
        entries,
        |entry| {
            index += 1;
            OutboundRow {
                index,
                tag: field(entry, "tag").to_owned(),
                protocol: field(entry, "protocol").to_owned(),
                address: address(entry).to_owned(),
                managed: output::flag(is_managed(entry, prefix), color),
            }
        },
        |entry| field(entry, "tag").to_owned(),
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let config = config::pipeline_config(global, true)?;
    let reconciler = Reconciler::new(&config)?;
    let live = reconciler.live_outbounds().await?;

    let out = render_outbounds(global, &live, reconciler.prefix())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
