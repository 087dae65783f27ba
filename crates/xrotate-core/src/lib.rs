//! Outbound rotation pipeline for 3x-ui panels.
//!
//! `xrotate-core` owns the domain logic between the panel client
//! ([`xrotate_api`]) and the CLI:
//!
//! - **[`scan`]** writes the IP-quality artifact through a [`Scanner`]
//!   backend (built-in TCP prober, external program, or an existing file).
//! - **[`expand`]** turns scanned addresses and outbound templates into
//!   tagged [`GeneratedOutbound`]s.
//! - **[`reconcile`]** swaps the managed slice of the panel's
//!   `xraySetting.outbounds` for the generated set and restarts xray.
//! - **[`Pipeline`]** runs the three phases once; **[`Scheduler`]** repeats
//!   them on a fixed interval, containing panics and stopping on errors.
//!
//! All behaviour is driven by an immutable [`PipelineConfig`] built by the
//! caller.

pub mod config;
pub mod error;
pub mod expand;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod scan;
pub mod scheduler;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    ArtifactPaths, DEFAULT_INTERVAL_MINUTES, DEFAULT_SESSION_COOKIE, DEFAULT_TAG_PREFIX,
    MAX_SCAN_CONCURRENCY, PanelSettings, PipelineConfig, ScanBackend, ScanCommand, ScanSettings,
};
pub use error::CoreError;
pub use expand::{TemplateSet, expand, load_templates, read_generated, write_generated};
pub use model::{GeneratedOutbound, IpRecord, OutboundTemplate, Protocol, QualityMetrics};
pub use pipeline::{CycleReport, GenerateSummary, Phase, Pipeline, PipelineError};
pub use reconcile::{MergeOutcome, ReconcileReport, Reconciler, is_managed, merge_outbounds};
pub use scan::{
    CommandScanner, ExistingArtifact, ScanSummary, Scanner, ScannerBackend, TcpPingScanner,
};
pub use scheduler::{CycleOutcome, Scheduler};
