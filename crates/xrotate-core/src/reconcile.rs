// ── Outbound reconciliation ──
//
// Live outbounds are split by tag prefix. Unmanaged entries are kept
// verbatim and in order; managed ones are dropped and replaced wholesale
// by the freshly generated set. The merge is a pure function; the
// `Reconciler` wraps it in one authenticated panel session.

use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use xrotate_api::{PanelClient, SessionToken};

use crate::config::PipelineConfig;
use crate::error::CoreError;
use crate::model::GeneratedOutbound;

/// Whether `entry` is owned by this tool: an object whose string `tag`
/// starts with `prefix`.
pub fn is_managed(entry: &Value, prefix: &str) -> bool {
    entry
        .get("tag")
        .and_then(Value::as_str)
        .is_some_and(|tag| tag.starts_with(prefix))
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Unmanaged entries carried over.
    pub preserved: usize,
    /// Managed entries dropped.
    pub removed: usize,
    /// Generated entries appended.
    pub added: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.preserved + self.added
    }
}

/// The merged outbound list and what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub outbounds: Vec<Value>,
    pub report: ReconcileReport,
}

/// Replace the managed entries of `live` with `generated`.
///
/// Result: unmanaged entries in their original order, then `generated` in
/// the order given.
pub fn merge_outbounds(
    live: Vec<Value>,
    generated: &[GeneratedOutbound],
    prefix: &str,
) -> Result<MergeOutcome, CoreError> {
    if prefix.is_empty() {
        return Err(CoreError::config(
            "tag prefix must not be empty (it would mark every outbound as managed)",
        ));
    }

    let before = live.len();
    let mut outbounds: Vec<Value> = live
        .into_iter()
        .filter(|entry| !is_managed(entry, prefix))
        .collect();
    let preserved = outbounds.len();
    outbounds.extend(generated.iter().map(GeneratedOutbound::to_value));

    Ok(MergeOutcome {
        outbounds,
        report: ReconcileReport {
            preserved,
            removed: before - preserved,
            added: generated.len(),
        },
    })
}

/// Pulls `outbounds` out of an `xraySetting`. Absent reads as empty.
fn take_outbounds(setting: &mut Map<String, Value>) -> Result<Vec<Value>, CoreError> {
    match setting.remove("outbounds") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(list)) => Ok(list),
        Some(_) => Err(CoreError::config("`xraySetting.outbounds` is not an array")),
    }
}

/// Pushes a generated set to the panel.
///
/// Each call logs in afresh; no session outlives the call.
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: PanelClient,
    username: String,
    password: SecretString,
    prefix: String,
}

impl Reconciler {
    pub fn new(config: &PipelineConfig) -> Result<Self, CoreError> {
        if config.tag_prefix.is_empty() {
            return Err(CoreError::config("tag prefix must not be empty"));
        }
        let panel = config.panel()?;
        let client = PanelClient::new(panel.url.clone(), &panel.transport())?
            .with_cookie_name(panel.cookie_name.clone());
        Ok(Self {
            client,
            username: panel.username.clone(),
            password: panel.password.clone(),
            prefix: config.tag_prefix.clone(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The panel's current outbound list.
    pub async fn live_outbounds(&self) -> Result<Vec<Value>, CoreError> {
        self.with_session(|token| async move {
            let config = self.client.fetch_config(&token).await?;
            Ok(config.outbounds()?.to_vec())
        })
        .await
    }

    /// Compute the merge against the live configuration without writing.
    pub async fn dry_run(&self, generated: &[GeneratedOutbound]) -> Result<MergeOutcome, CoreError> {
        self.with_session(|token| async move {
            let mut setting = self.client.fetch_config(&token).await?.into_xray_setting()?;
            merge_outbounds(take_outbounds(&mut setting)?, generated, &self.prefix)
        })
        .await
    }

    /// Merge `generated` into the live configuration, write it back and
    /// restart xray. Stops at the first failing call.
    pub async fn reconcile(
        &self,
        generated: &[GeneratedOutbound],
    ) -> Result<ReconcileReport, CoreError> {
        let unmanaged = generated
            .iter()
            .filter(|o| !o.tag().is_some_and(|tag| tag.starts_with(&self.prefix)))
            .count();
        if unmanaged > 0 {
            warn!(
                count = unmanaged,
                prefix = %self.prefix,
                "generated outbounds without a managed tag will be kept as unmanaged on the next run"
            );
        }

        self.with_session(|token| async move {
            let mut setting = self.client.fetch_config(&token).await?.into_xray_setting()?;
            let merged = merge_outbounds(take_outbounds(&mut setting)?, generated, &self.prefix)?;
            setting.insert("outbounds".to_owned(), Value::Array(merged.outbounds));

            self.client.update_xray_setting(&token, &setting).await?;
            debug!("xraySetting replaced");
            self.client.restart_xray(&token).await?;

            let report = merged.report;
            info!(
                preserved = report.preserved,
                removed = report.removed,
                added = report.added,
                "panel outbounds reconciled"
            );
            Ok(report)
        })
        .await
    }

    /// Log in, run `op`, then log out whatever `op` returned.
    async fn with_session<T, F, Fut>(&self, op: F) -> Result<T, CoreError>
    where
        F: FnOnce(SessionToken) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let token = self.client.login(&self.username, &self.password).await?;
        let logout_token = token.clone();
        let result = op(token).await;
        if let Err(e) = self.client.logout(&logout_token).await {
            debug!(error = %e, "logout failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn generated(tags: &[&str]) -> Vec<GeneratedOutbound> {
        tags.iter()
            .map(|tag| {
                let Value::Object(doc) = json!({"protocol": "trojan", "tag": tag}) else {
                    unreachable!("json! object literal")
                };
                GeneratedOutbound::new(doc)
            })
            .collect()
    }

    fn live() -> Vec<Value> {
        vec![
            json!({"tag": "direct", "protocol": "freedom"}),
            json!({"tag": "cf-clean-trojan-9.9.9.9", "protocol": "trojan"}),
            json!({"protocol": "blackhole"}),
            json!({"tag": "cf-clean-vless-9.9.9.9", "protocol": "vless"}),
            json!({"tag": "warp", "protocol": "wireguard"}),
        ]
    }

    #[test]
    fn managed_requires_string_tag_with_prefix() {
        assert!(is_managed(&json!({"tag": "cf-clean-x"}), "cf-clean-"));
        assert!(!is_managed(&json!({"tag": "direct"}), "cf-clean-"));
        assert!(!is_managed(&json!({"tag": 7}), "cf-clean-"));
        assert!(!is_managed(&json!({}), "cf-clean-"));
        assert!(!is_managed(&json!("cf-clean-x"), "cf-clean-"));
    }

    #[test]
    fn unmanaged_first_then_generated() {
        let gen_set = generated(&[
            "cf-clean-trojan-1.1.1.1",
            "cf-clean-vless-1.1.1.1",
            "cf-clean-trojan-2.2.2.2",
            "cf-clean-vless-2.2.2.2",
        ]);
        let outcome = merge_outbounds(live(), &gen_set, "cf-clean-").expect("merges");

        assert_eq!(outcome.outbounds.len(), 7);
        assert_eq!(outcome.outbounds[0]["tag"], "direct");
        assert_eq!(outcome.outbounds[1]["protocol"], "blackhole");
        assert_eq!(outcome.outbounds[2]["tag"], "warp");
        assert_eq!(outcome.outbounds[3]["tag"], "cf-clean-trojan-1.1.1.1");
        assert_eq!(outcome.outbounds[6]["tag"], "cf-clean-vless-2.2.2.2");
        assert_eq!(
            outcome.report,
            ReconcileReport {
                preserved: 3,
                removed: 2,
                added: 4
            }
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let gen_set = generated(&["cf-clean-trojan-1.1.1.1", "cf-clean-trojan-2.2.2.2"]);
        let first = merge_outbounds(live(), &gen_set, "cf-clean-").expect("merges");
        let second = merge_outbounds(first.outbounds.clone(), &gen_set, "cf-clean-").expect("merges");
        assert_eq!(second.outbounds, first.outbounds);
        assert_eq!(second.report.removed, 2);
    }

    #[test]
    fn empty_generated_set_clears_managed_entries() {
        let outcome = merge_outbounds(live(), &[], "cf-clean-").expect("merges");
        assert_eq!(outcome.outbounds.len(), 3);
        assert!(outcome.outbounds.iter().all(|o| !is_managed(o, "cf-clean-")));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let err = merge_outbounds(live(), &[], "").expect_err("empty prefix");
        assert!(matches!(err, CoreError::Configuration { .. }));
    }

    #[test]
    fn outbounds_must_be_an_array_when_present() {
        let mut setting = Map::new();
        assert!(take_outbounds(&mut setting).expect("absent").is_empty());
        setting.insert("outbounds".into(), json!({"tag": "x"}));
        assert!(take_outbounds(&mut setting).is_err());
    }
}
