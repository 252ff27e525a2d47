//! The one place `papi_definitions::ErrorKind` is mapped to an HTTP status
//! and JSON body (Design Notes §9: "exactly one place" per spec.md §7's
//! taxonomy table).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use papi_definitions::error::{Error, ErrorKind};
use serde_derive::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<i64>,
}

/// Newtype so the actix `ResponseError` impl can live here rather than in
/// `papi_definitions`, which has no HTTP dependency.
pub struct HttpError(pub Error);

impl From<Error> for HttpError {
    fn from(e: Error) -> HttpError {
        HttpError(e)
    }
}

impl std::fmt::Debug for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

fn label(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::AuthFailed(_) => "auth_failed",
        ErrorKind::BadRequest(_) => "bad_request",
        ErrorKind::UnknownWorkload(_, _) => "unknown_workload",
        ErrorKind::QuotaExceeded { .. } => "quota_exceeded",
        ErrorKind::Forbidden(_) => "forbidden",
        ErrorKind::BackendError(_) => "backend_error",
        ErrorKind::Timeout(_, _) => "timeout",
        ErrorKind::Internal(_) => "internal",
    }
}

impl ResponseError for HttpError {
    fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ErrorKind::UnknownWorkload(_, _) => StatusCode::NOT_FOUND,
            ErrorKind::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Forbidden(_) => StatusCode::FORBIDDEN,
            ErrorKind::BackendError(_) => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout(_, _) => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self.0.kind(), ErrorKind::BackendError(_) | ErrorKind::Internal(_)) {
            error!("{}", self.0);
            sentry::capture_message(&self.0.to_string(), sentry::Level::Error);
        } else {
            warn!("{}", self.0);
        }
        let (resource, limit, current) = match self.0.kind() {
            ErrorKind::QuotaExceeded { resource, limit, current } => {
                (Some(resource.clone()), Some(*limit), Some(*current))
            }
            _ => (None, None, None),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: label(self.0.kind()).to_string(),
            message: self.0.to_string(),
            resource,
            limit,
            current,
        })
    }
}

pub type HttpResult<T> = std::result::Result<T, HttpError>;
