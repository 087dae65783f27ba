#![allow(clippy::unwrap_used)]
// Scheduler fault policy: panics are survived, reported errors stop the loop.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use xrotate_core::{
    ArtifactPaths, CoreError, CycleOutcome, PanelSettings, Phase, Pipeline, PipelineConfig,
    ScanSettings, ScanSummary, Scanner, Scheduler,
};

/// Panics on the first call, then reports an error.
struct FlakyScanner {
    calls: Arc<AtomicUsize>,
}

impl Scanner for FlakyScanner {
    async fn scan(&self, _output: &Path) -> Result<ScanSummary, CoreError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => panic!("probe pool poisoned"),
            _ => Err(CoreError::Scanner {
                message: "scanner exited with status 2".into(),
            }),
        }
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        panel: Some(PanelSettings {
            url: Url::parse("http://127.0.0.1:9").unwrap(),
            username: "admin".into(),
            password: SecretString::from("pw".to_string()),
            insecure: false,
            ca_cert: None,
            timeout: Duration::from_secs(1),
            cookie_name: "3x-ui".into(),
        }),
        paths: ArtifactPaths::default(),
        scan: ScanSettings::default(),
        tag_prefix: "cf-clean-".into(),
        interval_minutes: 5,
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cycle_is_survived_and_error_stops_loop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scanner = FlakyScanner {
        calls: Arc::clone(&calls),
    };
    let scheduler = Scheduler::new(Pipeline::new(config(), scanner));
    assert_eq!(scheduler.interval(), Duration::from_secs(300));

    let mut faults = Vec::new();
    let started = tokio::time::Instant::now();
    let err = scheduler
        .run_with(|outcome| {
            if let CycleOutcome::Faulted(message) = outcome {
                faults.push(message.clone());
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(faults, vec!["probe pool poisoned".to_owned()]);
    assert_eq!(err.phase, Phase::Scan);
    assert!(matches!(err.source, CoreError::Scanner { .. }));
    // One full interval elapsed between the panicked cycle and the failing one.
    assert!(started.elapsed() >= Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_run_cycle_contains_panic() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::new(Pipeline::new(
        config(),
        FlakyScanner {
            calls: Arc::clone(&calls),
        },
    ))
    .with_interval(Duration::from_secs(60));

    let outcome = scheduler.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Faulted(ref m) if m == "probe pool poisoned"));

    let err = scheduler.run_cycle().await.unwrap_err();
    assert_eq!(err.phase, Phase::Scan);
    assert_eq!(scheduler.interval(), Duration::from_secs(60));
}
