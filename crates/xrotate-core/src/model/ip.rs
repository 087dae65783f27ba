use serde::{Deserialize, Serialize};

/// One scanned address. Only `address` is consumed downstream; the
/// metrics are kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRecord {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QualityMetrics>,
}

impl IpRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: QualityMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Probe results for one address.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub sent: u32,
    pub received: u32,
    /// Fraction of attempts lost, `0.0..=1.0`.
    pub loss_rate: f64,
    pub avg_latency_ms: f64,
    pub download_mbps: f64,
}
