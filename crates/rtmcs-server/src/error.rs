//! ApiError - core のエラーを HTTP レスポンスに変換する

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use rtmcs_core::RtmcsError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub RtmcsError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            RtmcsError::NotFound(_) => {
                (StatusCode::NOT_FOUND, Json(json!({ "msg": "Not found" }))).into_response()
            }
            RtmcsError::Parse(detail) => {
                error!("stored data is malformed: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "msg": "Stored data is malformed" })),
                )
                    .into_response()
            }
            RtmcsError::Transport(detail) => {
                warn!("blob store unavailable: {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "msg": "Storage unavailable" })),
                )
                    .into_response()
            }
        }
    }
}
