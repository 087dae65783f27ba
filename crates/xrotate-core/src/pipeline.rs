// ── Single-shot pipeline ──
//
// Scan → Generate → Update, strictly in order on the calling task. The
// first failing phase stops the run and is named in the error.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::CoreError;
use crate::expand::{expand, load_templates, read_generated, write_generated};
use crate::model::GeneratedOutbound;
use crate::reconcile::{MergeOutcome, ReconcileReport, Reconciler};
use crate::scan::{ScanSummary, Scanner, read_ip_records};

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Scan,
    Generate,
    Update,
}

/// A phase failure.
#[derive(Debug, thiserror::Error)]
#[error("{phase}: {source}")]
pub struct PipelineError {
    pub phase: Phase,
    #[source]
    pub source: CoreError,
}

impl PipelineError {
    pub fn new(phase: Phase, source: CoreError) -> Self {
        Self { phase, source }
    }
}

trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> Result<T, PipelineError>;
}

impl<T> InPhase<T> for Result<T, CoreError> {
    fn in_phase(self, phase: Phase) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError::new(phase, source))
    }
}

/// What the generate phase produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateSummary {
    pub addresses: usize,
    pub templates: usize,
    /// Template files skipped as malformed.
    pub rejected: usize,
    pub outbounds: usize,
    pub output: PathBuf,
}

/// Results of one full run.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scan: ScanSummary,
    pub generate: GenerateSummary,
    pub update: ReconcileReport,
}

/// The three phases over one immutable configuration.
#[derive(Debug)]
pub struct Pipeline<S> {
    config: PipelineConfig,
    scanner: S,
}

impl<S: Scanner> Pipeline<S> {
    pub fn new(config: PipelineConfig, scanner: S) -> Self {
        Self { config, scanner }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Scan phase: write the IP-quality artifact.
    pub async fn scan(&self) -> Result<ScanSummary, CoreError> {
        let summary = self.scanner.scan(&self.config.paths.scan_result).await?;
        info!(kept = summary.kept, output = %summary.output.display(), "scan complete");
        Ok(summary)
    }

    /// Generate phase: expand templates over the scanned addresses and
    /// write the generated-outbound artifact.
    pub async fn generate(&self) -> Result<(Vec<GeneratedOutbound>, GenerateSummary), CoreError> {
        let paths = &self.config.paths;
        let ips = read_ip_records(&paths.scan_result).await?;
        let set = load_templates(&paths.template_dir).await?;
        let generated = expand(&ips, &set.templates, &self.config.tag_prefix)?;
        write_generated(&paths.generated, &generated).await?;

        let summary = GenerateSummary {
            addresses: ips.len(),
            templates: set.templates.len(),
            rejected: set.rejected.len(),
            outbounds: generated.len(),
            output: paths.generated.clone(),
        };
        info!(outbounds = summary.outbounds, output = %summary.output.display(), "generate complete");
        Ok((generated, summary))
    }

    /// Update phase for a generated set already in memory.
    pub async fn update(&self, generated: &[GeneratedOutbound]) -> Result<ReconcileReport, CoreError> {
        Reconciler::new(&self.config)?.reconcile(generated).await
    }

    /// Update phase fed from the generated-outbound artifact.
    pub async fn update_from_artifact(&self) -> Result<ReconcileReport, CoreError> {
        let generated = read_generated(&self.config.paths.generated).await?;
        self.update(&generated).await
    }

    /// The merge the update phase would push, without writing it.
    pub async fn preview_update(&self) -> Result<MergeOutcome, CoreError> {
        let generated = read_generated(&self.config.paths.generated).await?;
        Reconciler::new(&self.config)?.dry_run(&generated).await
    }

    /// One full cycle. The generated set goes to the update phase in
    /// memory; the artifact is still written for inspection.
    pub async fn run_once(&self) -> Result<CycleReport, PipelineError> {
        let started_at = Utc::now();
        let scan = self.scan().await.in_phase(Phase::Scan)?;
        let (generated, generate) = self.generate().await.in_phase(Phase::Generate)?;
        let update = self.update(&generated).await.in_phase(Phase::Update)?;

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            scan,
            generate,
            update,
        })
    }
}
