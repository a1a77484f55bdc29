use axum::response::{IntoResponse, Response};
use http::{HeaderValue, Method, StatusCode, header};
use thiserror::Error;

/// Every way a request can fail after it reaches the share handler.
///
/// The `Display` text is for logs only. Clients receive the fixed
/// [`ShareError::public_message`] so no filesystem detail leaks out.
#[derive(Error, Debug)]
pub enum ShareError {
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request path is {len} bytes, limit is {limit}")]
    PathTooLong { len: usize, limit: usize },

    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShareError {
    pub fn status(&self) -> StatusCode {
        match self {
            ShareError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            ShareError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ShareError::NotFound(_) => StatusCode::NOT_FOUND,
            ShareError::PathTooLong { .. } => StatusCode::URI_TOO_LONG,
            ShareError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ShareError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ShareError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            ShareError::InvalidPath(_) => "invalid path",
            ShareError::Unauthorized(_) => "unauthorized",
            ShareError::NotFound(_) => "not found",
            ShareError::PathTooLong { .. } => "path too long",
            ShareError::FileTooLarge { .. } => "file too large",
            ShareError::MethodNotAllowed(_) => "method not allowed",
            ShareError::Internal(_) => "server error",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ShareError::Internal(_))
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
