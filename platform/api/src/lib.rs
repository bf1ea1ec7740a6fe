use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Shared service result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("User is unauthorized.")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    InvalidInput(String),
    #[error("{message}")]
    Internal { message: String, details: Value },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    pub fn details(&self) -> Value {
        match self {
            ApiError::Internal { details, .. } => details.clone(),
            _ => json!({}),
        }
    }
}

/// Wire shape of an error: `{status, message, details}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    pub details: Value,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            status: err.status().as_u16(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { message, details } = &self {
            tracing::error!(%message, %details, "request failed");
        }
        (self.status(), Json(ErrorBody::from(&self))).into_response()
    }
}

/// Success envelope: `{message: "OK", details}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub details: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(details: T) -> Self {
        Self {
            message: "OK".to_string(),
            details,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
