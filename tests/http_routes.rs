use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use chrono::{DateTime, Utc};
use insights_backend::{
    app::build_router,
    models::{AccountRow, VideoPerformanceRow, VideoSnapshotRow},
    refresh::RefreshView,
    state::AppState,
    store::{InMemoryMetricsStore, MetricsStore, StoreError, StoreResult},
};
use serde_json::Value;
use tower::ServiceExt;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

fn account(id: i64, client_id: i64, username: &str) -> AccountRow {
    AccountRow {
        id,
        client_id,
        username: username.to_string(),
        display_name: Some(format!("@{username}")),
        platform: "tiktok".to_string(),
        follower_count: Some(25_000),
        created_at: "2026-01-15T09:30:00Z".parse::<DateTime<Utc>>().unwrap(),
    }
}

fn snapshot(id: i64, username: &str, video_id: &str, plays: Option<i64>) -> VideoSnapshotRow {
    VideoSnapshotRow {
        id,
        username: username.to_string(),
        video_id: video_id.to_string(),
        play_count: plays,
        like_count: Some(300),
        comment_count: Some(40),
        share_count: Some(12),
        captured_at: "2026-08-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap(),
    }
}

fn seeded_store() -> Arc<InMemoryMetricsStore> {
    Arc::new(InMemoryMetricsStore::with_data(
        vec![
            account(1, 7, "creator_one"),
            account(2, 7, "creator_two"),
            account(3, 9, "other_client"),
        ],
        vec![
            snapshot(1, "creator_one", "v1", Some(50_000)),
            snapshot(2, "creator_one", "v2", Some(20_000)),
            snapshot(3, "creator_two", "v9", Some(1_000)),
        ],
    ))
}

fn app_with(store: Arc<dyn MetricsStore>) -> axum::Router {
    build_router(AppState::new(store, CALL_TIMEOUT))
}

async fn send(app: &axum::Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }

    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

#[tokio::test]
async fn healthcheck_is_available() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn accounts_are_filtered_by_client_id() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/api/v1/accounts?clientId=7").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalAccounts"], 2);
    let accounts = body["accounts"].as_array().expect("accounts should be array");
    assert!(
        accounts
            .iter()
            .all(|account| account["client_id"] == 7)
    );
}

#[tokio::test]
async fn missing_client_id_is_a_structured_400() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/api/v1/accounts").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn non_numeric_client_id_is_rejected_before_any_query() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/api/v1/accounts?clientId=sevenish").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("clientId"));
}

#[tokio::test]
async fn missing_username_on_discrepancy_is_a_structured_400() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/api/v1/discrepancy").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username is required");
}

#[tokio::test]
async fn discrepancy_tracks_staleness_until_the_views_are_refreshed() {
    let store = seeded_store();
    let app = app_with(store.clone());

    // Freshly seeded: view and source agree.
    let (status, body) = send(&app, Method::GET, "/api/v1/discrepancy?username=creator_one").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["discrepancy"], 0);

    // A newer snapshot lands in the source table; the view is now stale.
    store
        .add_snapshot(snapshot(10, "creator_one", "v1", Some(93_000)))
        .await;

    let (status, body) = send(&app, Method::GET, "/api/v1/discrepancy?username=creator_one").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aggregatedPeak"], 50_000);
    assert_eq!(body["sourcePeak"], 93_000);
    assert_eq!(body["discrepancy"], 43_000);

    // Refreshing the views restores parity.
    let (status, _body) = send(&app, Method::POST, "/api/v1/views/refresh").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/v1/discrepancy?username=creator_one").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["discrepancy"], 0);
}

#[tokio::test]
async fn unknown_username_yields_numeric_zero_peaks() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/api/v1/discrepancy?username=nobody").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aggregatedPeak"], 0);
    assert_eq!(body["sourcePeak"], 0);
    assert_eq!(body["discrepancy"], 0);
    assert!(body["sourceRows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn refresh_reports_every_job_and_an_iso_timestamp() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::POST, "/api/v1/views/refresh").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let jobs = body["jobs"].as_array().expect("jobs should be array");
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|job| job["status"] == "ok"));

    let timestamp = body["timestamp"].as_str().expect("timestamp expected");
    assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn view_status_reports_per_view_row_counts() {
    let app = app_with(seeded_store());

    let (status, body) = send(&app, Method::GET, "/api/v1/views/refresh").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    // Seeding rolled up two creator_one videos and one creator_two video.
    assert_eq!(body["views"]["video_performance"], 3);
    assert_eq!(body["views"]["account_engagement"], 2);
    assert!(body["lastChecked"].is_string());
}

#[tokio::test]
async fn video_performance_average_zero_guards_empty_row_sets() {
    let app = app_with(seeded_store());

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/video-performance?username=nobody",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalVideos"], 0);
    assert_eq!(body["averagePeakPlays"], 0.0);
}

#[tokio::test]
async fn video_performance_reports_rows_and_average() {
    let app = app_with(seeded_store());

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/video-performance?username=creator_one",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalVideos"], 2);
    assert_eq!(body["averagePeakPlays"], 35_000.0);
    assert_eq!(body["videos"][0]["peak_play_count"], 50_000);
}

#[tokio::test]
async fn invalid_limit_is_rejected() {
    let app = app_with(seeded_store());

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/video-performance?username=creator_one&limit=ten",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("limit"));
}

/// Delegates to an in-memory store but fails one view's refresh procedure,
/// as a misbehaving remote procedure would.
struct OneFailingRefresh {
    inner: Arc<InMemoryMetricsStore>,
    failing: RefreshView,
}

#[async_trait]
impl MetricsStore for OneFailingRefresh {
    async fn list_accounts(&self, client_id: i64) -> StoreResult<Vec<AccountRow>> {
        self.inner.list_accounts(client_id).await
    }

    async fn video_performance(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoPerformanceRow>> {
        self.inner.video_performance(username, limit).await
    }

    async fn video_snapshots(
        &self,
        username: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<VideoSnapshotRow>> {
        self.inner.video_snapshots(username, limit).await
    }

    async fn view_row_count(&self, view: RefreshView) -> StoreResult<u64> {
        self.inner.view_row_count(view).await
    }

    async fn refresh_view(&self, view: RefreshView) -> StoreResult<u64> {
        if view == self.failing {
            return Err(StoreError::Api {
                message: "could not refresh materialized view".to_string(),
                code: Some("55000".to_string()),
                hint: Some("retry after the concurrent refresh finishes".to_string()),
            });
        }
        self.inner.refresh_view(view).await
    }
}

#[tokio::test]
async fn partial_refresh_failure_returns_500_with_per_job_detail() {
    let store = OneFailingRefresh {
        inner: seeded_store(),
        failing: RefreshView::DailyFollowerStats,
    };
    let app = app_with(Arc::new(store));

    let (status, body) = send(&app, Method::POST, "/api/v1/views/refresh").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["error"].as_str().unwrap().is_empty());

    let details = &body["details"];
    assert_eq!(details["success"], false);
    let jobs = details["jobs"].as_array().expect("jobs should be array");
    assert_eq!(jobs.len(), 3);

    let failed: Vec<_> = jobs.iter().filter(|job| job["status"] == "error").collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["view"], "daily_follower_stats");
    assert_eq!(failed[0]["error"]["code"], "55000");

    let succeeded = jobs.iter().filter(|job| job["status"] == "ok").count();
    assert_eq!(succeeded, 2);
}
