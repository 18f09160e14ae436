use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::session::Unauthorized;
use crate::validation::{FieldError, ValidationError};

/// Every way a request can fail. Each variant renders as `{ success: false, message, .. }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("Too many requests. Please try again later.")]
    TooManyRequests,
    /// The message is what the client sees; the cause was already logged.
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    /// Log `cause` server-side and hand back a 500 carrying only `message`.
    pub fn internal(message: &'static str, cause: impl std::fmt::Display) -> Self {
        tracing::error!("{message} Cause: {cause}");
        Self::Internal(message)
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Unauthorized> for ApiError {
    fn from(_: Unauthorized) -> Self {
        Self::Unauthorized("Unauthorized")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {rejection}");
        Self::BadRequest("Request body must be a JSON object".into())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let errors = match &self {
            Self::Validation(v) => Some(v.errors.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            errors,
        };
        (self.status(), Json(body)).into_response()
    }
}
