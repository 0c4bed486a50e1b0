use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no index available for {0}")]
    IndexNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("reference not resolved: {0}")]
    ReferenceNotResolved(String),

    #[error("record source is closed")]
    Closed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::IndexNotFound(_) => "IndexNotFound",
            Error::Network(_) => "NetworkError",
            Error::ReferenceNotResolved(_) => "ReferenceNotResolved",
            Error::Closed => "Closed",
            Error::NotFound(_) => "NotFound",
            Error::UnsupportedFormat(_) => "UnsupportedFormat",
            Error::UnsupportedScheme(_) => "UnsupportedScheme",
            Error::InvalidInput(_) => "InvalidInput",
            Error::InvalidRange(_) => "InvalidRange",
            Error::Io(_) | Error::Internal(_) => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::IndexNotFound(_) | Error::NotFound(_) | Error::ReferenceNotResolved(_) => {
                StatusCode::NOT_FOUND
            }
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            Error::UnsupportedFormat(_)
            | Error::UnsupportedScheme(_)
            | Error::InvalidInput(_)
            | Error::InvalidRange(_) => StatusCode::BAD_REQUEST,
            Error::Closed | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}
