use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use collector::FetchPool;
use ratelimit::SlidingWindow;

use crate::config::Config;
use crate::router;

/// Run the multiplexer until `shutdown` completes. The transport drains
/// first; the fetcher pool is retired once the last connection is gone, so
/// accepted batches always finish.
pub async fn serve<F>(config: Config, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let engine_ctx = CancellationToken::new();

    let pool = FetchPool::new(
        config.fixed_fetchers(),
        config.overflow_fetchers(),
        config.collect_timeout_ms.0,
    );
    pool.start(engine_ctx.clone());

    let limiter = SlidingWindow::new(Duration::from_secs(1), config.incoming_limit);

    let app = router::router(
        Arc::new(pool),
        Arc::new(limiter),
        config.max_urls,
        config.outgoing_limit,
        config.export_prometheus,
    );

    let listener = TcpListener::bind(config.address)
        .await
        .expect("failed to bind listen address");

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap();

    engine_ctx.cancel();
}
