use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::{ConflictReason, LibraryError};
use crate::ports::UploadError;

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    Library(LibraryError),
    /// クエリパラメータの不正
    BadRequest(String),
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        ApiError::Library(err)
    }
}

fn conflict_code(reason: ConflictReason) -> &'static str {
    match reason {
        ConflictReason::ItemUnavailable => "ITEM_UNAVAILABLE",
        ConflictReason::AlreadyReturned => "ALREADY_RETURNED",
        ConflictReason::OutstandingLoans { .. } => "OUTSTANDING_LOANS",
        ConflictReason::StockExceeded => "STOCK_EXCEEDED",
        ConflictReason::DuplicateCatalogueCode => "DUPLICATE_CATALOGUE_CODE",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::BadRequest(message) => {
                let body = Json(ErrorResponse::new("BAD_REQUEST", message));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            ApiError::Library(err) => err,
        };

        let (status, body) = match &err {
            // 400 Bad Request - 入力不正。違反したフィールドをすべて返す
            LibraryError::Validation(validation) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("VALIDATION_FAILED", validation.to_string())
                    .with_violations(&validation.violations),
            ),

            // 404 Not Found - リクエストされたリソースが存在しない
            LibraryError::NotFound(kind) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("NOT_FOUND", format!("{} not found", kind)),
            ),

            // 409 Conflict - 不変条件違反
            LibraryError::Conflict(reason) => (
                StatusCode::CONFLICT,
                ErrorResponse::new(conflict_code(*reason), err.to_string()),
            ),

            // 5xx - システム障害
            // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
            LibraryError::Store(source) => {
                tracing::error!(error = ?source, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("STORE_ERROR", "An unexpected error occurred"),
                )
            }
            LibraryError::RetriesExhausted { .. } | LibraryError::TimedOut(_) => {
                tracing::error!(error = %err, "store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new(
                        "SERVICE_UNAVAILABLE",
                        "The service is temporarily unavailable, please retry",
                    ),
                )
            }

            // アップロード内容の不正は呼び出し側の責任
            LibraryError::Upload(UploadError::Empty) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("UPLOAD_REJECTED", err.to_string()),
            ),
            LibraryError::Upload(UploadError::UnsupportedContentType(_)) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorResponse::new("UPLOAD_REJECTED", err.to_string()),
            ),
            LibraryError::Upload(UploadError::Transport(source)) => {
                tracing::error!(error = ?source, "blob store error");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new("UPLOAD_FAILED", "Failed to store the upload"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
