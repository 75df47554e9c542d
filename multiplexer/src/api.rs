use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use collector::CollectError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to decode request: {0}")]
    RequestDecoding(String),

    #[error("url list size is too big")]
    TooManyUrls,

    #[error(transparent)]
    Collect(#[from] CollectError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self {
            ApiError::RequestDecoding(_)
            | ApiError::TooManyUrls
            | ApiError::Collect(CollectError::EmptyBatch) => StatusCode::BAD_REQUEST,

            ApiError::Collect(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let reason = code.canonical_reason().unwrap_or("Error");

        (code, format!("{}: {}", reason, self)).into_response()
    }
}
