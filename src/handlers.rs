use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    discrepancy,
    error::{AppError, AppResult},
    models::{
        AccountListResponse, ListAccountsQuery, StatusBody, VideoMetricsQuery,
        VideoPerformanceResponse,
    },
    refresh::{self, RefreshBatch, ViewStatus},
    state::AppState,
};

const DEFAULT_COMPARISON_LIMIT: u32 = 10;
const MAX_ROW_LIMIT: u32 = 100;

pub async fn healthcheck() -> Json<StatusBody> {
    Json(StatusBody { status: "ok" })
}

/// POST: invoke every configured refresh procedure. The response status is
/// success only when every job succeeded; a failing batch still carries the
/// full per-job breakdown in `details`.
pub async fn refresh_views(State(state): State<AppState>) -> Response {
    let batch = refresh::refresh_all_views(state.store.as_ref(), state.call_timeout).await;

    if batch.success {
        (StatusCode::OK, Json(batch)).into_response()
    } else {
        let error = batch
            .error
            .clone()
            .unwrap_or_else(|| batch.message.clone());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RefreshFailureBody {
                error,
                details: batch,
            }),
        )
            .into_response()
    }
}

#[derive(serde::Serialize)]
struct RefreshFailureBody {
    error: String,
    details: RefreshBatch,
}

/// GET: row counts of every refreshable view.
pub async fn views_status(State(state): State<AppState>) -> AppResult<Json<ViewStatus>> {
    let status = refresh::view_status(state.store.as_ref()).await?;
    Ok(Json(status))
}

pub async fn discrepancy_check(
    State(state): State<AppState>,
    Query(query): Query<VideoMetricsQuery>,
) -> AppResult<Json<discrepancy::DiscrepancyReport>> {
    let username = require_username(query.username.as_deref())?;
    let limit = parse_limit(query.limit.as_deref())?.or(Some(DEFAULT_COMPARISON_LIMIT));

    let report = discrepancy::compare_video_metrics(state.store.as_ref(), username, limit).await;
    Ok(Json(report))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<ListAccountsQuery>,
) -> AppResult<Json<AccountListResponse>> {
    let client_id = parse_client_id(query.client_id.as_deref())?;

    let accounts = state.store.list_accounts(client_id).await?;
    Ok(Json(AccountListResponse {
        total_accounts: accounts.len(),
        accounts,
    }))
}

pub async fn video_performance(
    State(state): State<AppState>,
    Query(query): Query<VideoMetricsQuery>,
) -> AppResult<Json<VideoPerformanceResponse>> {
    let username = require_username(query.username.as_deref())?;
    let limit = parse_limit(query.limit.as_deref())?;

    let videos = state.store.video_performance(username, limit).await?;

    let total_plays: i64 = videos
        .iter()
        .map(|video| video.peak_play_count.unwrap_or(0))
        .sum();
    let average_peak_plays = if videos.is_empty() {
        0.0
    } else {
        total_plays as f64 / videos.len() as f64
    };

    Ok(Json(VideoPerformanceResponse {
        total_videos: videos.len(),
        average_peak_plays,
        videos,
    }))
}

fn require_username(username: Option<&str>) -> Result<&str, AppError> {
    match username.map(str::trim) {
        Some(username) if !username.is_empty() => Ok(username),
        _ => Err(AppError::validation("username is required")),
    }
}

fn parse_client_id(raw: Option<&str>) -> Result<i64, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| AppError::validation("clientId is required"))?;

    raw.parse::<i64>()
        .map_err(|_| AppError::validation(format!("clientId must be an integer, got {raw:?}")))
}

fn parse_limit(raw: Option<&str>) -> Result<Option<u32>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    let limit = raw
        .parse::<u32>()
        .map_err(|_| AppError::validation(format!("limit must be a positive integer, got {raw:?}")))?;

    if limit == 0 || limit > MAX_ROW_LIMIT {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {MAX_ROW_LIMIT}"
        )));
    }

    Ok(Some(limit))
}
