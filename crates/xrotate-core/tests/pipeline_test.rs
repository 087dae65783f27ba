#![allow(clippy::unwrap_used)]
// End-to-end pipeline runs against a mocked panel.

use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use xrotate_core::{
    ArtifactPaths, ExistingArtifact, PanelSettings, Phase, Pipeline, PipelineConfig,
    ReconcileReport, ScanBackend, ScanSettings,
};

// ── Fixtures ────────────────────────────────────────────────────────

fn config(server: &MockServer, dir: &Path) -> PipelineConfig {
    PipelineConfig {
        panel: Some(PanelSettings {
            url: Url::parse(&server.uri()).unwrap(),
            username: "admin".into(),
            password: SecretString::from("pw".to_string()),
            insecure: false,
            ca_cert: None,
            timeout: Duration::from_secs(5),
            cookie_name: "3x-ui".into(),
        }),
        paths: ArtifactPaths {
            scan_result: dir.join("ip-scan-result.csv"),
            template_dir: dir.join("configs"),
            generated: dir.join("out/generated-outbounds.json"),
        },
        scan: ScanSettings {
            backend: ScanBackend::Existing,
            ..ScanSettings::default()
        },
        tag_prefix: "cf-clean-".into(),
        interval_minutes: 1,
    }
}

async fn write_inputs(dir: &Path) {
    tokio::fs::write(
        dir.join("ip-scan-result.csv"),
        "IP Address,Sent,Received,Packet Loss,Average Delay,Download Speed (MB/s)\n\
         104.16.1.1,4,4,0.00,120.50,0.00\n\
         104.17.2.2,4,3,0.25,140.00,0.00\n",
    )
    .await
    .unwrap();

    let configs = dir.join("configs");
    tokio::fs::create_dir_all(&configs).await.unwrap();
    let trojan = json!({
        "protocol": "trojan",
        "settings": {"servers": [{"address": "x", "port": 443, "password": "secret"}]},
        "streamSettings": {"network": "ws", "security": "tls"}
    });
    let vless = json!({
        "protocol": "vless",
        "settings": {"vnext": [{"address": "x", "port": 443, "users": [{"id": "uuid"}]}]}
    });
    tokio::fs::write(configs.join("01-trojan.json"), trojan.to_string())
        .await
        .unwrap();
    tokio::fs::write(configs.join("02-vless.json"), vless.to_string())
        .await
        .unwrap();
}

fn live_outbounds() -> Value {
    json!([
        {"tag": "direct", "protocol": "freedom"},
        {"tag": "cf-clean-trojan-9.9.9.9", "protocol": "trojan"},
        {"tag": "blocked", "protocol": "blackhole"},
        {"tag": "cf-clean-vless-9.9.9.9", "protocol": "vless"},
        {"tag": "warp", "protocol": "wireguard"}
    ])
}

fn settings_envelope(outbounds: &Value) -> Value {
    let obj = json!({
        "xraySetting": {"log": {"loglevel": "warning"}, "outbounds": outbounds},
        "inboundTags": ["inbound-443"]
    });
    json!({"success": true, "msg": "", "obj": obj.to_string()})
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).append_header("Set-Cookie", "3x-ui=tok; Path=/"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(302))
        .mount(server)
        .await;
}

async fn mount_fetch(server: &MockServer, outbounds: &Value) {
    Mock::given(method("POST"))
        .and(path("/panel/xray/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_envelope(outbounds)))
        .mount(server)
        .await;
}

fn ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": true, "msg": ""}))
}

/// The `xraySetting` form field of the last update request.
async fn pushed_setting(server: &MockServer) -> Value {
    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let update = requests
        .iter()
        .rev()
        .find(|r| r.url.path() == "/panel/xray/update")
        .unwrap();
    let (_, value) = url::form_urlencoded::parse(&update.body)
        .find(|(k, _)| k == "xraySetting")
        .unwrap();
    serde_json::from_str(&value).unwrap()
}

fn tags(outbounds: &Value) -> Vec<String> {
    outbounds
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["tag"].as_str().unwrap().to_owned())
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_once_replaces_managed_outbounds() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path()).await;
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_fetch(&server, &live_outbounds()).await;
    Mock::given(method("POST"))
        .and(path("/panel/xray/update"))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/api/server/restartXrayService"))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    let report = pipeline.run_once().await.unwrap();

    assert_eq!(report.scan.kept, 2);
    assert_eq!(report.generate.outbounds, 4);
    assert_eq!(
        report.update,
        ReconcileReport {
            preserved: 3,
            removed: 2,
            added: 4
        }
    );

    let setting = pushed_setting(&server).await;
    assert_eq!(setting["log"]["loglevel"], "warning");
    assert_eq!(
        tags(&setting["outbounds"]),
        vec![
            "direct",
            "blocked",
            "warp",
            "cf-clean-trojan-104.16.1.1",
            "cf-clean-vless-104.16.1.1",
            "cf-clean-trojan-104.17.2.2",
            "cf-clean-vless-104.17.2.2",
        ]
    );

    let artifact = tokio::fs::read_to_string(dir.path().join("out/generated-outbounds.json"))
        .await
        .unwrap();
    assert!(artifact.contains("cf-clean-trojan-104.16.1.1"));
}

#[tokio::test]
async fn test_second_run_converges() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path()).await;
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_fetch(&server, &live_outbounds()).await;
    Mock::given(method("POST"))
        .and(path("/panel/xray/update"))
        .respond_with(ack())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/api/server/restartXrayService"))
        .respond_with(ack())
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    pipeline.run_once().await.unwrap();
    let first = pushed_setting(&server).await;

    // The panel now holds what we pushed.
    server.reset().await;
    mount_session(&server).await;
    mount_fetch(&server, &first["outbounds"]).await;
    Mock::given(method("POST"))
        .and(path("/panel/xray/update"))
        .respond_with(ack())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/api/server/restartXrayService"))
        .respond_with(ack())
        .mount(&server)
        .await;

    let report = pipeline.update_from_artifact().await.unwrap();
    let second = pushed_setting(&server).await;

    assert_eq!(report.total(), 7);
    assert_eq!(report.removed, 4);
    assert_eq!(second["outbounds"], first["outbounds"]);
}

async fn mount_writes(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/panel/xray/update"))
        .respond_with(ack())
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/api/server/restartXrayService"))
        .respond_with(ack())
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pass_through_templates_accumulate_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path()).await;
    let fragment = json!({"tag": "fragment", "protocol": "freedom", "settings": {}});
    tokio::fs::write(dir.path().join("configs/03-fragment.json"), fragment.to_string())
        .await
        .unwrap();

    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_fetch(&server, &live_outbounds()).await;
    mount_writes(&server).await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    let report = pipeline.run_once().await.unwrap();
    assert_eq!(report.generate.outbounds, 6);
    let first = pushed_setting(&server).await;
    assert_eq!(first["outbounds"].as_array().unwrap().len(), 9);

    server.reset().await;
    mount_session(&server).await;
    mount_fetch(&server, &first["outbounds"]).await;
    mount_writes(&server).await;

    // Untagged copies look unmanaged, so each run keeps the previous ones.
    let report = pipeline.update_from_artifact().await.unwrap();
    let second = pushed_setting(&server).await;
    assert_eq!(
        report,
        ReconcileReport {
            preserved: 5,
            removed: 4,
            added: 6
        }
    );
    assert_eq!(second["outbounds"].as_array().unwrap().len(), 11);
    assert_eq!(
        tags(&second["outbounds"])
            .iter()
            .filter(|t| *t == "fragment")
            .count(),
        4
    );
}

#[tokio::test]
async fn test_update_failure_stops_before_restart() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path()).await;
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_fetch(&server, &live_outbounds()).await;
    Mock::given(method("POST"))
        .and(path("/panel/xray/update"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "invalid xray config"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/panel/api/server/restartXrayService"))
        .respond_with(ack())
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    let err = pipeline.run_once().await.unwrap_err();

    assert_eq!(err.phase, Phase::Update);
    assert!(err.to_string().contains("invalid xray config"), "{err}");
}

#[tokio::test]
async fn test_login_failure_is_an_update_phase_error() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path()).await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    let err = pipeline.run_once().await.unwrap_err();

    assert_eq!(err.phase, Phase::Update);
    assert!(matches!(
        err.source,
        xrotate_core::CoreError::Authentication { .. }
    ));
}

#[tokio::test]
async fn test_missing_scan_artifact_fails_in_scan_phase() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    let err = pipeline.run_once().await.unwrap_err();

    assert_eq!(err.phase, Phase::Scan);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path()).await;
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_fetch(&server, &live_outbounds()).await;
    Mock::given(method("POST"))
        .and(path("/panel/xray/update"))
        .respond_with(ack())
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config(&server, dir.path()), ExistingArtifact);
    pipeline.generate().await.unwrap();
    let preview = pipeline.preview_update().await.unwrap();

    assert_eq!(preview.outbounds.len(), 7);
    assert_eq!(preview.report.removed, 2);
}
