use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One tracked social-media account, scoped to a client (tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: i64,
    pub client_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub platform: String,
    pub follower_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Raw per-video metrics snapshot from the source table. Many rows per video
/// accumulate over time; `play_count` is the designated peak metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSnapshotRow {
    pub id: i64,
    pub username: String,
    pub video_id: String,
    pub play_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub share_count: Option<i64>,
    pub captured_at: DateTime<Utc>,
}

/// One row of the `video_performance` materialized view: the per-video rollup
/// of `video_snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPerformanceRow {
    pub username: String,
    pub video_id: String,
    pub peak_play_count: Option<i64>,
    pub peak_like_count: Option<i64>,
    pub snapshot_count: i64,
}

/// One row of the `account_engagement` materialized view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEngagementRow {
    pub username: String,
    pub video_count: i64,
    pub total_plays: i64,
    pub total_likes: i64,
}

/// One row of the `daily_follower_stats` materialized view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyFollowerRow {
    pub username: String,
    pub day: NaiveDate,
    pub follower_count: i64,
}

// Query parameters arrive string-typed; handlers parse and validate them so a
// malformed value becomes a 400 instead of a filter on garbage.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAccountsQuery {
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoMetricsQuery {
    pub username: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountListResponse {
    pub accounts: Vec<AccountRow>,
    pub total_accounts: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPerformanceResponse {
    pub videos: Vec<VideoPerformanceRow>,
    pub total_videos: usize,
    pub average_peak_plays: f64,
}
