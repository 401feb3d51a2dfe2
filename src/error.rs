use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("unauthorized")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("payload too large")] PayloadTooLarge,
    #[error("too many requests")] TooManyRequests,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Forbidden => ApiError::Forbidden,
            RepoError::Invalid(msg) => ApiError::BadRequest(msg),
            RepoError::Internal(detail) => {
                tracing::error!(%detail, "store failure");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() })
    }
}

/// Turns malformed JSON bodies into the usual `{"error": ..}` 400.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    ApiError::BadRequest(format!("invalid json: {err}")).into()
}
