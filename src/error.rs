//! 统一的 API 错误类型与转换：所有失败都以 `{success: false, message}` 返回。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::storage::StorageError;
use crate::upload::UploadError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) | ApiError::Internal(msg) => {
                msg
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            success: false,
            message: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidName(name) => {
                ApiError::BadRequest(format!("invalid file name: {name:?}"))
            }
            StorageError::Io(err) => {
                error!(error = %err, "storage failure");
                ApiError::Internal("failed to store uploaded files".into())
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::NoFilesProvided => ApiError::BadRequest("No files uploaded".into()),
            UploadError::TooManyFiles(limit) => {
                ApiError::BadRequest(format!("Too many files (limit {limit})"))
            }
            UploadError::InvalidMultipart(msg) => {
                ApiError::BadRequest(format!("invalid multipart body: {msg}"))
            }
            UploadError::PayloadTooLarge => {
                ApiError::PayloadTooLarge("Request body exceeds the allowed limit".into())
            }
            UploadError::Storage(err) => err.into(),
        }
    }
}
