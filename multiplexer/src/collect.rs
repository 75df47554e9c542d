use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiError;
use crate::router::AppState;

/// `POST /collect`: fetch a JSON array of URLs concurrently and answer with
/// a JSON array of `{"Url", "Body"}` pairs, unordered.
pub async fn collect(
    State(state): State<AppState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(urls) = payload.map_err(|rejection| ApiError::RequestDecoding(rejection.body_text()))?;

    if urls.len() > state.max_urls {
        return Err(ApiError::TooManyUrls);
    }

    debug!(urls = urls.len(), "collecting batch");

    // axum drops this future when the client goes away; the collect call's
    // cancellation guard fires with it and aborts the in-flight fetches.
    let batch = CancellationToken::new();
    let data = state
        .collector
        .collect(batch, urls, state.fetch_limit)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        Json(data),
    ))
}
