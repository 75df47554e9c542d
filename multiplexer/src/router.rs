use std::future::ready;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use collector::Collector;
use ratelimit::Limiter;

use crate::collect;
use crate::metrics::{setup_metrics_recorder, track_metrics};
use crate::middleware::rate_limit;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<dyn Collector>,
    pub limiter: Arc<dyn Limiter>,
    /// Largest URL list a single request may carry.
    pub max_urls: usize,
    /// Concurrency handed to the pool for each batch.
    pub fetch_limit: usize,
}

async fn index() -> &'static str {
    "multiplexer"
}

pub fn router(
    collector: Arc<dyn Collector>,
    limiter: Arc<dyn Limiter>,
    max_urls: usize,
    fetch_limit: usize,
    metrics: bool,
) -> Router {
    let state = AppState {
        collector,
        limiter,
        max_urls,
        fetch_limit,
    };

    let router = Router::new()
        .route("/", get(index))
        .route(
            "/collect",
            post(collect::collect)
                .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the router is embedded in tests
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
