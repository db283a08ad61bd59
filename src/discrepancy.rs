use serde::Serialize;
use tracing::warn;

use crate::models::{VideoPerformanceRow, VideoSnapshotRow};
use crate::store::{MetricsStore, StoreResult};

/// Side-by-side readout of the `video_performance` materialized view and the
/// `video_snapshots` source table for one account, with the peak play count
/// of each side and their signed difference. A positive discrepancy means the
/// view under-reports relative to source (staleness).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyReport {
    pub success: bool,
    pub aggregated_rows: Vec<VideoPerformanceRow>,
    pub source_rows: Vec<VideoSnapshotRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub aggregated_peak: i64,
    pub source_peak: i64,
    pub discrepancy: i64,
}

/// Queries both sides concurrently. Either side failing is recorded against
/// that side alone; the other side's data is still reported. Peaks treat a
/// missing or null metric as zero, never as row exclusion, so the discrepancy
/// field is always numeric.
pub async fn compare_video_metrics(
    store: &dyn MetricsStore,
    username: &str,
    limit: Option<u32>,
) -> DiscrepancyReport {
    let (aggregated, source) = tokio::join!(
        store.video_performance(username, limit),
        store.video_snapshots(username, limit),
    );

    let (aggregated_rows, aggregated_error) = split_side("video_performance", aggregated);
    let (source_rows, source_error) = split_side("video_snapshots", source);

    let aggregated_peak = peak(aggregated_rows.iter().map(|row| row.peak_play_count));
    let source_peak = peak(source_rows.iter().map(|row| row.play_count));
    let discrepancy = source_peak - aggregated_peak;

    if discrepancy < 0 {
        warn!(
            username,
            aggregated_peak,
            source_peak,
            "anomalous discrepancy: aggregated view reports a higher peak than the source table"
        );
    }

    DiscrepancyReport {
        success: aggregated_error.is_none() && source_error.is_none(),
        aggregated_rows,
        source_rows,
        aggregated_error,
        source_error,
        aggregated_peak,
        source_peak,
        discrepancy,
    }
}

fn split_side<T>(side: &str, result: StoreResult<Vec<T>>) -> (Vec<T>, Option<String>) {
    match result {
        Ok(rows) => (rows, None),
        Err(err) => {
            warn!(side, error = %err, "comparison query failed");
            (Vec::new(), Some(err.to_string()))
        }
    }
}

/// Maximum of the metric over a row set, with null counted as zero and an
/// empty set peaking at zero.
fn peak(values: impl Iterator<Item = Option<i64>>) -> i64 {
    values.map(|value| value.unwrap_or(0)).max().unwrap_or(0)
}
