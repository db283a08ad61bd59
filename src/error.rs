use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("upstream store error: {0}")]
    Store(#[from] StoreError),
    #[error("internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::Store(err) => {
                let details = match &err {
                    StoreError::Api { code, hint, .. } if code.is_some() || hint.is_some() => {
                        Some(json!({ "code": code, "hint": hint }))
                    }
                    _ => None,
                };
                match &err {
                    StoreError::Timeout(_) => warn!(error = %err, "store call timed out"),
                    _ => warn!(error = %err, "store call failed"),
                }
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), details)
            }
            Self::Internal => {
                error!("unexpected internal fault surfaced at the route boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let response = AppError::validation("clientId is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_errors_map_to_internal_server_error() {
        let response = AppError::from(StoreError::Unreachable("refused".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
