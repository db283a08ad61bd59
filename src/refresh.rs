use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::store::{MetricsStore, StoreError, StoreResult};

/// The fixed set of materialized views this service may refresh. Route input
/// never names a procedure; dispatch is only ever over this enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshView {
    AccountEngagement,
    VideoPerformance,
    DailyFollowerStats,
}

impl RefreshView {
    pub const ALL: [RefreshView; 3] = [
        RefreshView::AccountEngagement,
        RefreshView::VideoPerformance,
        RefreshView::DailyFollowerStats,
    ];

    /// Name of the remote refresh procedure.
    pub fn procedure(self) -> &'static str {
        match self {
            RefreshView::AccountEngagement => "refresh_account_engagement",
            RefreshView::VideoPerformance => "refresh_video_performance",
            RefreshView::DailyFollowerStats => "refresh_daily_follower_stats",
        }
    }

    /// Name of the materialized view the procedure rebuilds.
    pub fn relation(self) -> &'static str {
        match self {
            RefreshView::AccountEngagement => "account_engagement",
            RefreshView::VideoPerformance => "video_performance",
            RefreshView::DailyFollowerStats => "daily_follower_stats",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub timed_out: bool,
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(bound) => Self {
                message: format!("refresh timed out after {}ms", bound.as_millis()),
                code: None,
                hint: None,
                timed_out: true,
            },
            StoreError::Api {
                message,
                code,
                hint,
            } => Self {
                message,
                code,
                hint,
                timed_out: false,
            },
            other => Self {
                message: other.to_string(),
                code: None,
                hint: None,
                timed_out: false,
            },
        }
    }
}

/// Outcome of one refresh procedure invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshJob {
    pub view: RefreshView,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub duration_ms: u64,
}

/// Combined outcome of one orchestration request. `success` is true only when
/// every job succeeded; partial failure stays visible per job. `error` is set
/// only when the store was unreachable for every job, which is a different
/// failure than individual procedures rejecting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBatch {
    pub success: bool,
    pub message: String,
    pub jobs: Vec<RefreshJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Dispatches every configured refresh procedure concurrently and waits for
/// all of them to settle. One failing or hanging call neither cancels nor
/// blocks the others; each result is paired with its view before the join, so
/// attribution does not depend on completion order.
pub async fn refresh_all_views(store: &dyn MetricsStore, call_timeout: Duration) -> RefreshBatch {
    let started = Instant::now();

    let dispatches = RefreshView::ALL.iter().map(|&view| async move {
        let job_started = Instant::now();
        let result = match tokio::time::timeout(call_timeout, store.refresh_view(view)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(call_timeout)),
        };
        (view, result, job_started.elapsed())
    });

    let settled = join_all(dispatches).await;

    let total = settled.len();
    let mut jobs = Vec::with_capacity(total);
    let mut failed = 0usize;
    let mut unreachable = 0usize;

    for (view, result, elapsed) in settled {
        let duration_ms = elapsed.as_millis() as u64;
        match result {
            Ok(rows) => jobs.push(RefreshJob {
                view,
                status: JobStatus::Ok,
                rows: Some(rows),
                error: None,
                duration_ms,
            }),
            Err(err) => {
                failed += 1;
                if matches!(err, StoreError::Unreachable(_)) {
                    unreachable += 1;
                }
                warn!(procedure = view.procedure(), error = %err, "view refresh failed");
                jobs.push(RefreshJob {
                    view,
                    status: JobStatus::Error,
                    rows: None,
                    error: Some(err.into()),
                    duration_ms,
                });
            }
        }
    }

    let success = failed == 0;
    let message = if success {
        format!("all {total} views refreshed")
    } else {
        format!("{failed} of {total} view refreshes failed")
    };
    let error = (total > 0 && unreachable == total)
        .then(|| "store unreachable: no refresh procedure could be invoked".to_string());

    RefreshBatch {
        success,
        message,
        jobs,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStatus {
    pub status: &'static str,
    pub views: BTreeMap<&'static str, u64>,
    pub last_checked: DateTime<Utc>,
}

/// Current row counts of every refreshable view, fetched concurrently.
pub async fn view_status(store: &dyn MetricsStore) -> StoreResult<ViewStatus> {
    let counts = RefreshView::ALL
        .iter()
        .map(|&view| async move { (view, store.view_row_count(view).await) });

    let mut views = BTreeMap::new();
    for (view, result) in join_all(counts).await {
        views.insert(view.relation(), result?);
    }

    Ok(ViewStatus {
        status: "active",
        views,
        last_checked: Utc::now(),
    })
}
