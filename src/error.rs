/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / {"message": ...} JSON body)
 * - gate の Denial / forward 失敗を統一的に変換
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::gate::Denial;
use crate::services::forward::types::MSG_FORWARD_FAILED;

/// Every caller-facing error body has this single shape.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Denied {
        status: StatusCode,
        message: &'static str,
    },
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("upstream failure")]
    Upstream,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Denied { status, message } => (status, message),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Upstream => (StatusCode::BAD_GATEWAY, MSG_FORWARD_FAILED),
        };

        let body = ErrorResponse {
            message: message.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<&Denial> for AppError {
    fn from(d: &Denial) -> Self {
        AppError::Denied {
            status: d.status,
            message: d.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn renders_message_body() {
        let resp = AppError::Denied {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Your session has expired",
        }
        .into_response();

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"message":"Your session has expired"}"#);
    }

    #[tokio::test]
    async fn upstream_is_bad_gateway() {
        let resp = AppError::Upstream.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
