use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{
    AccountEngagementRow, AccountRow, DailyFollowerRow, VideoPerformanceRow, VideoSnapshotRow,
};
use crate::refresh::RefreshView;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("store rejected request: {message}")]
    Api {
        message: String,
        code: Option<String>,
        hint: Option<String>,
    },
    #[error("malformed store response: {0}")]
    Decode(String),
}

/// The only seam to the external metrics store. One shared handle serves all
/// in-flight requests; implementations hold no request-specific state.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Accounts belonging to one client, ordered by username.
    async fn list_accounts(&self, client_id: i64) -> StoreResult<Vec<AccountRow>>;

    /// Rows from the `video_performance` materialized view for one account,
    /// ordered by peak play count descending.
    async fn video_performance(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoPerformanceRow>>;

    /// Rows from the authoritative `video_snapshots` source table for one
    /// account, ordered by play count descending.
    async fn video_snapshots(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoSnapshotRow>>;

    /// Current row count of one materialized view.
    async fn view_row_count(&self, view: RefreshView) -> StoreResult<u64>;

    /// Invokes the remote refresh procedure for one view and returns the row
    /// count it reports. Safe to re-invoke: the procedure recomputes the view
    /// from current source data.
    async fn refresh_view(&self, view: RefreshView) -> StoreResult<u64>;
}

/// Error body shape returned by the store's REST facade.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    message: Option<String>,
    code: Option<String>,
    hint: Option<String>,
}

/// Client for the managed store's PostgREST-style HTTP facade. Reads carry
/// the restricted anonymous key; refresh procedure calls carry the elevated
/// service key. Neither key ever appears in logs or responses.
pub struct HttpMetricsStore {
    client: Client,
    base_url: String,
    anon_key: SecretString,
    service_key: SecretString,
    timeout: Duration,
}

impl HttpMetricsStore {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: SecretString,
        service_key: SecretString,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Unreachable(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
            service_key,
            timeout,
        })
    }

    fn relation_url(&self, relation: &str) -> String {
        format!("{}/rest/v1/{relation}", self.base_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else if err.is_connect() {
            StoreError::Unreachable(err.to_string())
        } else {
            StoreError::Decode(err.to_string())
        }
    }

    async fn api_error(response: Response) -> StoreError {
        let status = response.status();
        match response.json::<RemoteErrorBody>().await {
            Ok(body) => StoreError::Api {
                message: body
                    .message
                    .unwrap_or_else(|| format!("store returned status {status}")),
                code: body.code,
                hint: body.hint,
            },
            Err(_) => StoreError::Api {
                message: format!("store returned status {status}"),
                code: None,
                hint: None,
            },
        }
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        relation: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let response = self
            .client
            .get(self.relation_url(relation))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(self.anon_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))
    }
}

#[async_trait]
impl MetricsStore for HttpMetricsStore {
    async fn list_accounts(&self, client_id: i64) -> StoreResult<Vec<AccountRow>> {
        self.rows(
            "accounts",
            &[
                ("select", "*".to_string()),
                ("client_id", format!("eq.{client_id}")),
                ("order", "username.asc".to_string()),
            ],
        )
        .await
    }

    async fn video_performance(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoPerformanceRow>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("username", format!("eq.{username}")),
            ("order", "peak_play_count.desc.nullslast".to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.rows("video_performance", &query).await
    }

    async fn video_snapshots(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoSnapshotRow>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("username", format!("eq.{username}")),
            ("order", "play_count.desc.nullslast".to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.rows("video_snapshots", &query).await
    }

    async fn view_row_count(&self, view: RefreshView) -> StoreResult<u64> {
        let response = self
            .client
            .get(self.relation_url(view.relation()))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(self.anon_key.expose_secret())
            .header("Prefer", "count=exact")
            .header(header::RANGE, "0-0")
            .query(&[("select", "username")])
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let content_range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        content_range
            .as_deref()
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                StoreError::Decode(format!(
                    "missing or malformed Content-Range header: {content_range:?}"
                ))
            })
    }

    async fn refresh_view(&self, view: RefreshView) -> StoreResult<u64> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, view.procedure());
        let response = self
            .client
            .post(url)
            .header("apikey", self.service_key.expose_secret())
            .bearer_auth(self.service_key.expose_secret())
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let payload = response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))?;

        payload.as_u64().ok_or_else(|| {
            StoreError::Decode(format!(
                "refresh procedure {} returned a non-numeric payload",
                view.procedure()
            ))
        })
    }
}

/// Total row count from a `Content-Range` header such as `0-0/1234` or `*/57`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.parse().ok()
}

#[derive(Debug, Default)]
struct InMemoryData {
    accounts: Vec<AccountRow>,
    snapshots: Vec<VideoSnapshotRow>,
    video_performance: Vec<VideoPerformanceRow>,
    account_engagement: Vec<AccountEngagementRow>,
    daily_follower_stats: Vec<DailyFollowerRow>,
}

/// In-process store backend. The materialized views are held as plain
/// vectors and only change when `refresh_view` recomputes them from the
/// snapshots, so staleness between source and view is observable exactly as
/// with the remote store.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    inner: RwLock<InMemoryData>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds accounts and snapshots and computes all rollups once, as if
    /// every view had just been refreshed.
    pub fn with_data(accounts: Vec<AccountRow>, snapshots: Vec<VideoSnapshotRow>) -> Self {
        let mut data = InMemoryData {
            accounts,
            snapshots,
            ..InMemoryData::default()
        };
        data.video_performance = rollup_video_performance(&data.snapshots);
        data.account_engagement = rollup_account_engagement(&data.snapshots);
        data.daily_follower_stats = rollup_daily_followers(&data.accounts, &data.snapshots);
        Self {
            inner: RwLock::new(data),
        }
    }

    /// Appends a source-table row without touching the materialized views.
    pub async fn add_snapshot(&self, snapshot: VideoSnapshotRow) {
        self.inner.write().await.snapshots.push(snapshot);
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn list_accounts(&self, client_id: i64) -> StoreResult<Vec<AccountRow>> {
        let data = self.inner.read().await;
        let mut accounts: Vec<AccountRow> = data
            .accounts
            .iter()
            .filter(|account| account.client_id == client_id)
            .cloned()
            .collect();
        accounts.sort_by(|left, right| left.username.cmp(&right.username));
        Ok(accounts)
    }

    async fn video_performance(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoPerformanceRow>> {
        let data = self.inner.read().await;
        let mut rows: Vec<VideoPerformanceRow> = data
            .video_performance
            .iter()
            .filter(|row| row.username == username)
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.peak_play_count.unwrap_or(0)));
        truncate_to(&mut rows, limit);
        Ok(rows)
    }

    async fn video_snapshots(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoSnapshotRow>> {
        let data = self.inner.read().await;
        let mut rows: Vec<VideoSnapshotRow> = data
            .snapshots
            .iter()
            .filter(|row| row.username == username)
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.play_count.unwrap_or(0)));
        truncate_to(&mut rows, limit);
        Ok(rows)
    }

    async fn view_row_count(&self, view: RefreshView) -> StoreResult<u64> {
        let data = self.inner.read().await;
        let count = match view {
            RefreshView::AccountEngagement => data.account_engagement.len(),
            RefreshView::VideoPerformance => data.video_performance.len(),
            RefreshView::DailyFollowerStats => data.daily_follower_stats.len(),
        };
        Ok(count as u64)
    }

    async fn refresh_view(&self, view: RefreshView) -> StoreResult<u64> {
        let mut data = self.inner.write().await;
        let count = match view {
            RefreshView::AccountEngagement => {
                let rows = rollup_account_engagement(&data.snapshots);
                let count = rows.len();
                data.account_engagement = rows;
                count
            }
            RefreshView::VideoPerformance => {
                let rows = rollup_video_performance(&data.snapshots);
                let count = rows.len();
                data.video_performance = rows;
                count
            }
            RefreshView::DailyFollowerStats => {
                let rows = rollup_daily_followers(&data.accounts, &data.snapshots);
                let count = rows.len();
                data.daily_follower_stats = rows;
                count
            }
        };
        Ok(count as u64)
    }
}

fn truncate_to<T>(rows: &mut Vec<T>, limit: Option<u32>) {
    if let Some(limit) = limit {
        rows.truncate(limit as usize);
    }
}

fn rollup_video_performance(snapshots: &[VideoSnapshotRow]) -> Vec<VideoPerformanceRow> {
    let mut by_video: BTreeMap<(String, String), VideoPerformanceRow> = BTreeMap::new();
    for snapshot in snapshots {
        let key = (snapshot.username.clone(), snapshot.video_id.clone());
        let entry = by_video.entry(key).or_insert_with(|| VideoPerformanceRow {
            username: snapshot.username.clone(),
            video_id: snapshot.video_id.clone(),
            peak_play_count: None,
            peak_like_count: None,
            snapshot_count: 0,
        });
        entry.snapshot_count += 1;
        entry.peak_play_count = Some(
            entry
                .peak_play_count
                .unwrap_or(0)
                .max(snapshot.play_count.unwrap_or(0)),
        );
        entry.peak_like_count = Some(
            entry
                .peak_like_count
                .unwrap_or(0)
                .max(snapshot.like_count.unwrap_or(0)),
        );
    }
    by_video.into_values().collect()
}

fn rollup_account_engagement(snapshots: &[VideoSnapshotRow]) -> Vec<AccountEngagementRow> {
    let per_video = rollup_video_performance(snapshots);
    let mut by_account: BTreeMap<String, AccountEngagementRow> = BTreeMap::new();
    for video in per_video {
        let entry = by_account
            .entry(video.username.clone())
            .or_insert_with(|| AccountEngagementRow {
                username: video.username.clone(),
                video_count: 0,
                total_plays: 0,
                total_likes: 0,
            });
        entry.video_count += 1;
        entry.total_plays += video.peak_play_count.unwrap_or(0);
        entry.total_likes += video.peak_like_count.unwrap_or(0);
    }
    by_account.into_values().collect()
}

fn rollup_daily_followers(
    accounts: &[AccountRow],
    snapshots: &[VideoSnapshotRow],
) -> Vec<DailyFollowerRow> {
    let followers: BTreeMap<&str, i64> = accounts
        .iter()
        .map(|account| {
            (
                account.username.as_str(),
                account.follower_count.unwrap_or(0),
            )
        })
        .collect();

    let mut days: BTreeMap<(String, chrono::NaiveDate), i64> = BTreeMap::new();
    for snapshot in snapshots {
        let key = (snapshot.username.clone(), snapshot.captured_at.date_naive());
        let count = followers.get(snapshot.username.as_str()).copied().unwrap_or(0);
        days.insert(key, count);
    }

    days.into_iter()
        .map(|((username, day), follower_count)| DailyFollowerRow {
            username,
            day,
            follower_count,
        })
        .collect()
}
