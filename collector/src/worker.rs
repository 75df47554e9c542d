use async_channel::Receiver;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CollectError;
use crate::pool::FetchResult;

pub(crate) type JobReceiver = Receiver<Job>;

/// One unit of batch work handed to a fetcher.
pub(crate) struct Job {
    pub(crate) url: String,
    pub(crate) cancel: CancellationToken,
    pub(crate) results: mpsc::Sender<FetchResult>,
    pub(crate) errors: mpsc::Sender<CollectError>,
}

/// Permanent fetcher: blocks on the handoff channel, drains the received
/// batch, then returns to the idle pool. Exits when the handoff channel is
/// closed at engine shutdown.
pub(crate) async fn run_permanent(
    id: usize,
    handoffs: Receiver<JobReceiver>,
    client: reqwest::Client,
) {
    debug!(id, "fetcher started");

    while let Ok(jobs) = handoffs.recv().await {
        debug!(id, "fetcher acquired");
        serve_batch(&client, &jobs).await;
        debug!(id, "fetcher released");
    }

    debug!(id, "fetcher stopped");
}

/// Overflow fetcher: serves exactly one batch, then exits.
pub(crate) async fn run_overflow(jobs: JobReceiver, client: reqwest::Client) {
    debug!("overflow fetcher started");
    serve_batch(&client, &jobs).await;
    debug!("overflow fetcher stopped");
}

async fn serve_batch(client: &reqwest::Client, jobs: &JobReceiver) {
    while let Ok(job) = jobs.recv().await {
        // A decided batch is abandoned wholesale; its dispatcher has already
        // returned and nobody reads these channels anymore.
        if job.cancel.is_cancelled() {
            break;
        }

        debug!(url = %job.url, "fetching");

        match fetch(client, &job.url, &job.cancel).await {
            Ok(Some(result)) => {
                counter!("collector_fetches_total", "outcome" => "ok").increment(1);
                job.results.send(result).await.ok();
            }
            Ok(None) => break,
            Err(err) => {
                counter!("collector_fetches_total", "outcome" => "error").increment(1);
                // First error wins; siblings that lose the race drop theirs.
                job.errors.try_send(err).ok();
                break;
            }
        }
    }
}

/// Execute one GET through the shared client, reading the whole body.
/// Returns `Ok(None)` when the batch was cancelled while the request was in
/// flight; dropping the request future aborts the underlying connection.
async fn fetch(
    client: &reqwest::Client,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Option<FetchResult>, CollectError> {
    let response = tokio::select! {
        () = cancel.cancelled() => return Ok(None),
        response = client.get(url).send() => {
            response.map_err(|source| CollectError::fetch(url, source))?
        }
    };

    let body = tokio::select! {
        () = cancel.cancelled() => return Ok(None),
        body = response.text() => body.map_err(|source| CollectError::fetch(url, source))?,
    };

    Ok(Some(FetchResult {
        url: url.to_owned(),
        body,
    }))
}
