// ── IP-quality artifact (CSV) ──
//
// First column is the address; a first row whose first cell is the
// header label is skipped, as are rows with a blank first cell. Columns
// 2..=6 carry probe metrics when the file was written by a scanner that
// reports them.

use std::path::Path;

use crate::error::CoreError;
use crate::model::{IpRecord, QualityMetrics};

/// First cell of the header row.
pub const HEADER_SENTINEL: &str = "IP Address";

const HEADER: [&str; 6] = [
    HEADER_SENTINEL,
    "Sent",
    "Received",
    "Packet Loss",
    "Average Delay",
    "Download Speed (MB/s)",
];

/// Read the scan artifact at `path`.
pub async fn read_ip_records(path: &Path) -> Result<Vec<IpRecord>, CoreError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::io(path, e))?;
    parse_ip_records(&text, &path.display().to_string())
}

/// Parse CSV text. `origin` names the source in errors.
pub fn parse_ip_records(text: &str, origin: &str) -> Result<Vec<IpRecord>, CoreError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| CoreError::parse(origin, e.to_string()))?;
        let first = row.get(0).unwrap_or_default();
        if index == 0 && first == HEADER_SENTINEL {
            continue;
        }
        if first.is_empty() {
            continue;
        }

        let mut record = IpRecord::new(first);
        if let Some(metrics) = parse_metrics(&row) {
            record = record.with_metrics(metrics);
        }
        records.push(record);
    }

    Ok(records)
}

/// Render `records` under the standard header.
pub fn render_ip_records(records: &[IpRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::with_capacity(64 * (records.len() + 1)));
    writer.write_record(HEADER)?;
    for record in records {
        let m = record.metrics.unwrap_or_default();
        writer.write_record([
            record.address.clone(),
            m.sent.to_string(),
            m.received.to_string(),
            format!("{:.2}", m.loss_rate),
            format!("{:.2}", m.avg_latency_ms),
            format!("{:.2}", m.download_mbps),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Write `records` with the standard header.
pub async fn write_ip_records(path: &Path, records: &[IpRecord]) -> Result<(), CoreError> {
    let out = render_ip_records(records).map_err(|e| CoreError::io(path, e.into()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::io(parent, e))?;
    }
    tokio::fs::write(path, out)
        .await
        .map_err(|e| CoreError::io(path, e))
}

fn parse_metrics(row: &csv::StringRecord) -> Option<QualityMetrics> {
    Some(QualityMetrics {
        sent: row.get(1)?.parse().ok()?,
        received: row.get(2)?.parse().ok()?,
        loss_rate: row.get(3)?.parse().ok()?,
        avg_latency_ms: row.get(4)?.parse().ok()?,
        download_mbps: row.get(5)?.parse().ok()?,
    })
}
