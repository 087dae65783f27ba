// ── Template expansion ──
//
// Every scanned address crossed with every template, address-major. Each
// pair gets its own deep copy of the template with the server address
// and tag rewritten. Protocols we don't know how to rewrite pass through
// untouched.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{GeneratedOutbound, IpRecord, OutboundTemplate, Protocol, managed_tag};

/// Templates loaded from a directory, plus the files that failed to load.
#[derive(Debug, Default)]
pub struct TemplateSet {
    pub templates: Vec<OutboundTemplate>,
    pub rejected: Vec<CoreError>,
}

/// Load every `*.json` file in `dir`, sorted by file name.
///
/// A malformed file is skipped and recorded in [`TemplateSet::rejected`].
/// If no file loads at all the first rejection is returned.
pub async fn load_templates(dir: &Path) -> Result<TemplateSet, CoreError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CoreError::io(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::io(dir, e))? {
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| CoreError::io(&path, e))?
            .is_file();
        if is_json && is_file {
            files.push(path);
        }
    }
    files.sort();

    let mut set = TemplateSet::default();
    for path in files {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::io(&path, e))?;
        match OutboundTemplate::from_json(&name, &text) {
            Ok(template) => set.templates.push(template),
            Err(err) => {
                warn!(file = %name, error = %err, "skipping malformed template");
                set.rejected.push(err);
            }
        }
    }

    if set.templates.is_empty() && !set.rejected.is_empty() {
        return Err(set.rejected.swap_remove(0));
    }
    debug!(
        dir = %dir.display(),
        loaded = set.templates.len(),
        rejected = set.rejected.len(),
        "templates loaded"
    );
    Ok(set)
}

/// Instantiate every template for every address.
///
/// Output order is address-major, template-minor. A template whose
/// structure prevents the rewrite fails the whole expansion.
pub fn expand(
    ips: &[IpRecord],
    templates: &[OutboundTemplate],
    prefix: &str,
) -> Result<Vec<GeneratedOutbound>, CoreError> {
    let mut generated = Vec::with_capacity(ips.len() * templates.len());
    for ip in ips {
        for template in templates {
            generated.push(instantiate(template, &ip.address, prefix)?);
        }
    }
    info!(
        addresses = ips.len(),
        templates = templates.len(),
        outbounds = generated.len(),
        "templates expanded"
    );
    Ok(generated)
}

fn instantiate(
    template: &OutboundTemplate,
    address: &str,
    prefix: &str,
) -> Result<GeneratedOutbound, CoreError> {
    let mut doc = template.document().clone();
    let protocol = template.protocol();

    match protocol {
        Protocol::Trojan => {
            let server = settings_list(&mut doc, "servers", template)?
                .first_mut()
                .ok_or_else(|| structure(template, "`settings.servers` is empty"))?;
            set_address(server, address, template, "settings.servers[0]")?;
        }
        Protocol::Vless => {
            let vnext = settings_list(&mut doc, "vnext", template)?;
            for (i, entry) in vnext.iter_mut().enumerate() {
                set_address(entry, address, template, &format!("settings.vnext[{i}]"))?;
            }
        }
        Protocol::Other(ref name) => {
            debug!(template = template.source(), protocol = %name, "passing template through");
            return Ok(GeneratedOutbound::new(doc));
        }
    }

    doc.insert(
        "tag".to_owned(),
        Value::String(managed_tag(prefix, &protocol, address)),
    );
    Ok(GeneratedOutbound::new(doc))
}

fn settings_list<'a>(
    doc: &'a mut Map<String, Value>,
    key: &str,
    template: &OutboundTemplate,
) -> Result<&'a mut Vec<Value>, CoreError> {
    doc.get_mut("settings")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| structure(template, "missing `settings` object"))?
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| structure(template, format!("missing `settings.{key}` array")))
}

fn set_address(
    entry: &mut Value,
    address: &str,
    template: &OutboundTemplate,
    at: &str,
) -> Result<(), CoreError> {
    let object = entry
        .as_object_mut()
        .ok_or_else(|| structure(template, format!("`{at}` is not an object")))?;
    object.insert("address".to_owned(), Value::String(address.to_owned()));
    Ok(())
}

fn structure(template: &OutboundTemplate, detail: impl std::fmt::Display) -> CoreError {
    CoreError::config(format!("template {}: {detail}", template.source()))
}

// ── Generated-outbound artifact ──────────────────────────────────────

/// Render outbounds as the artifact's JSON text: two-space indent,
/// trailing newline.
pub fn render_generated(outbounds: &[GeneratedOutbound]) -> Result<String, CoreError> {
    let mut text = serde_json::to_string_pretty(outbounds)
        .map_err(|e| CoreError::parse("generated outbounds", e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Write the generated-outbound artifact, creating its directory.
pub async fn write_generated(path: &Path, outbounds: &[GeneratedOutbound]) -> Result<(), CoreError> {
    let text = render_generated(outbounds)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::io(parent, e))?;
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|e| CoreError::io(path, e))
}

/// Read the generated-outbound artifact back.
pub async fn read_generated(path: &Path) -> Result<Vec<GeneratedOutbound>, CoreError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| CoreError::parse(path.display(), e.to_string()))
}
