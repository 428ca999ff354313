//! API error types and conversions

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::api::middleware::auth::AuthError;
use crate::api::types::{ErrorBody, ErrorDetail};
use crate::query::QueryError;
use crate::repository::RepositoryError;
use crate::validation::ValidationError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request body or query parameter
    BadInput {
        message: String,
        field: Option<String>,
        index: Option<usize>,
    },

    /// Caller identity missing or unusable
    Unauthorized(String),

    /// Caller lacks a required role
    Forbidden(String),

    /// A collaborator failed or timed out
    ServiceUnavailable {
        message: String,
        retry_after: Option<u64>,
    },

    /// Internal server error
    Internal(String),
}

impl ApiError {
    pub fn bad_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadInput {
            message: message.into(),
            field: Some(field.into()),
            index: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, field, index, retry_after) = match self {
            ApiError::BadInput {
                message,
                field,
                index,
            } => (message, field, index, None),
            ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => (msg, None, None, None),
            ApiError::ServiceUnavailable {
                message,
                retry_after,
            } => (message, None, None, retry_after),
            ApiError::Internal(detail) => {
                error!("internal error: {detail}");
                ("internal server error".to_string(), None, None, None)
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: status.as_u16(),
                title: status.canonical_reason().unwrap_or("Error").to_string(),
                message,
                field,
                index,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadInput {
            message: err.to_string(),
            field: Some(err.field.as_str().to_string()),
            index: Some(err.index),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::bad_input(err.param, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingTenant | AuthError::InvalidHeader(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::MissingRole | AuthError::DelegationDenied => {
                ApiError::Forbidden(err.to_string())
            }
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::InvalidOffset(_) => ApiError::bad_input("offset", err.to_string()),
            other => {
                error!("metrics repository failed: {other}");
                ApiError::ServiceUnavailable {
                    message: "metrics repository is unavailable".to_string(),
                    retry_after: None,
                }
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
