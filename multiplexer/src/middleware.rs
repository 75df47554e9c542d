use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::router::AppState;

/// Admission gate in front of the collect route: one `allow()` call per
/// request, and a denied request is answered with 429 without ever reaching
/// the handler.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.limiter.allow() {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests\n").into_response();
    }

    next.run(request).await
}
