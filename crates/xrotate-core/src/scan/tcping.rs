// ── Built-in TCP latency prober ──
//
// Measures connect latency to each candidate on one port, a fixed number
// of times, with bounded concurrency. Download throughput is not
// measured; use an external scanner for that.

use std::cmp::Ordering;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream;
use ipnetwork::IpNetwork;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::ScanSettings;
use crate::error::CoreError;
use crate::model::{IpRecord, QualityMetrics};
use crate::scan::artifact::write_ip_records;
use crate::scan::ranges::{candidates, parse_ranges};
use crate::scan::{ScanSummary, Scanner};

/// TCP-connect scanner over configured IP ranges.
#[derive(Debug, Clone)]
pub struct TcpPingScanner {
    settings: ScanSettings,
}

impl TcpPingScanner {
    pub fn new(settings: ScanSettings) -> Self {
        Self { settings }
    }

    async fn load_ranges(&self) -> Result<Vec<IpNetwork>, CoreError> {
        let mut ranges = Vec::new();
        if let Some(ref path) = self.settings.ranges_file {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| CoreError::io(path, e))?;
            ranges.extend(parse_ranges(&text, &path.display().to_string())?);
        }
        if !self.settings.inline_ranges.is_empty() {
            ranges.extend(parse_ranges(
                &self.settings.inline_ranges.join(","),
                "inline ranges",
            )?);
        }
        if ranges.is_empty() {
            return Err(CoreError::config("no IP ranges to scan"));
        }
        Ok(ranges)
    }

    /// Probe every candidate and keep those passing the latency and loss
    /// filters, best first.
    pub async fn probe_all(&self, ips: Vec<IpAddr>) -> Vec<IpRecord> {
        let s = &self.settings;
        let mut records: Vec<IpRecord> = stream::iter(ips)
            .map(|ip| async move {
                let metrics =
                    probe(SocketAddr::new(ip, s.port), s.ping_times, s.connect_timeout).await;
                (ip, metrics)
            })
            .buffer_unordered(s.concurrency.max(1))
            .filter_map(|(ip, metrics)| async move {
                passes(&metrics, s).then(|| IpRecord::new(ip.to_string()).with_metrics(metrics))
            })
            .collect()
            .await;

        records.sort_by(rank);
        records
    }
}

impl Scanner for TcpPingScanner {
    async fn scan(&self, output: &Path) -> Result<ScanSummary, CoreError> {
        let ranges = self.load_ranges().await?;
        let ips = candidates(&ranges, self.settings.test_all, &mut rand::rng());
        let probed = ips.len();
        info!(
            candidates = probed,
            port = self.settings.port,
            concurrency = self.settings.concurrency,
            "probing candidates"
        );

        let records = self.probe_all(ips).await;
        write_ip_records(output, &records).await?;

        Ok(ScanSummary {
            probed: Some(probed),
            kept: records.len(),
            output: output.to_path_buf(),
        })
    }
}

/// Connect `times` times, each under `timeout`.
async fn probe(addr: SocketAddr, times: u32, timeout: Duration) -> QualityMetrics {
    let mut received = 0u32;
    let mut total = Duration::ZERO;

    for _ in 0..times {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                received += 1;
                total += started.elapsed();
            }
            Ok(Err(e)) => debug!(%addr, error = %e, "connect failed"),
            Err(_) => debug!(%addr, "connect timed out"),
        }
    }

    let avg_latency_ms = if received == 0 {
        0.0
    } else {
        total.as_secs_f64() * 1000.0 / f64::from(received)
    };
    let loss_rate = if times == 0 {
        1.0
    } else {
        f64::from(times - received) / f64::from(times)
    };

    QualityMetrics {
        sent: times,
        received,
        loss_rate,
        avg_latency_ms,
        download_mbps: 0.0,
    }
}

fn passes(metrics: &QualityMetrics, settings: &ScanSettings) -> bool {
    let max_ms = settings.max_latency.as_secs_f64() * 1000.0;
    let min_ms = settings.min_latency.as_secs_f64() * 1000.0;
    metrics.received > 0
        && metrics.avg_latency_ms <= max_ms
        && metrics.avg_latency_ms >= min_ms
        && metrics.loss_rate <= settings.max_loss_rate
}

/// Lower loss first, then lower latency.
fn rank(a: &IpRecord, b: &IpRecord) -> Ordering {
    let (a, b) = (a.metrics.unwrap_or_default(), b.metrics.unwrap_or_default());
    a.loss_rate
        .total_cmp(&b.loss_rate)
        .then(a.avg_latency_ms.total_cmp(&b.avg_latency_ms))
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn metrics(loss_rate: f64, avg_latency_ms: f64) -> QualityMetrics {
        QualityMetrics {
            sent: 4,
            received: 4,
            loss_rate,
            avg_latency_ms,
            download_mbps: 0.0,
        }
    }

    #[test]
    fn filters_apply_bounds() {
        let settings = ScanSettings {
            max_latency: Duration::from_millis(200),
            min_latency: Duration::from_millis(10),
            max_loss_rate: 0.25,
            ..ScanSettings::default()
        };
        assert!(passes(&metrics(0.0, 50.0), &settings));
        assert!(!passes(&metrics(0.0, 250.0), &settings));
        assert!(!passes(&metrics(0.0, 5.0), &settings));
        assert!(!passes(&metrics(0.5, 50.0), &settings));
        assert!(!passes(
            &QualityMetrics {
                received: 0,
                ..metrics(0.0, 0.0)
            },
            &settings
        ));
    }

    #[test]
    fn ranking_prefers_loss_then_latency() {
        let mut records = vec![
            IpRecord::new("a").with_metrics(metrics(0.25, 10.0)),
            IpRecord::new("b").with_metrics(metrics(0.0, 90.0)),
            IpRecord::new("c").with_metrics(metrics(0.0, 40.0)),
        ];
        records.sort_by(rank);
        let order: Vec<_> = records.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn probes_a_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        tokio::spawn(async move {
            while let Ok((_socket, _)) = listener.accept().await {}
        });

        let scanner = TcpPingScanner::new(ScanSettings {
            port,
            ping_times: 2,
            ..ScanSettings::default()
        });
        let records = scanner
            .probe_all(vec!["127.0.0.1".parse().expect("ip")])
            .await;

        assert_eq!(records.len(), 1);
        let m = records[0].metrics.expect("metrics");
        assert_eq!((m.sent, m.received), (2, 2));
    }

    #[tokio::test]
    async fn scan_without_ranges_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scanner = TcpPingScanner::new(ScanSettings {
            ranges_file: None,
            ..ScanSettings::default()
        });
        let err = scanner
            .scan(&dir.path().join("out.csv"))
            .await
            .expect_err("no ranges");
        assert!(matches!(err, CoreError::Configuration { .. }), "{err:?}");
    }
}
