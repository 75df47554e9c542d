use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CollectError;
use crate::worker::{self, Job, JobReceiver};

/// A fetched page: the target URL and its whole response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FetchResult {
    pub url: String,
    pub body: String,
}

/// Batch fetch seam consumed by the transport layer.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Fetch every URL with at most `limit` concurrent requests, returning
    /// one result per input URL (unordered), the first fetch error, or the
    /// cancellation cause — whichever comes first.
    async fn collect(
        &self,
        cancel: CancellationToken,
        urls: Vec<String>,
        limit: usize,
    ) -> Result<Vec<FetchResult>, CollectError>;
}

/// Two-tier fetcher pool.
///
/// `fixed` permanent fetchers block on the handoff channel between batches;
/// each batch gets a private job channel whose receiving half is the handoff
/// token. When every permanent fetcher is taken, up to `overflow` transient
/// fetchers are spawned, bound directly to the batch that needed them.
pub struct FetchPool {
    fixed: usize,
    overflow: usize,
    /// Live overflow fetchers. Incremented when one is spawned, decremented
    /// exactly once when it exits.
    spawned: Arc<AtomicUsize>,
    handoff_tx: async_channel::Sender<JobReceiver>,
    handoff_rx: async_channel::Receiver<JobReceiver>,
    client: reqwest::Client,
}

impl FetchPool {
    /// Build a pool of `fixed` permanent fetchers with `overflow` elastic
    /// headroom and a per-URL request deadline of `timeout`. The pool is
    /// inert until [`FetchPool::start`] is called.
    pub fn new(fixed: usize, overflow: usize, timeout: Duration) -> Self {
        let (handoff_tx, handoff_rx) = async_channel::bounded(fixed.max(1));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to construct reqwest client for the fetcher pool");

        Self {
            fixed,
            overflow,
            spawned: Arc::new(AtomicUsize::new(0)),
            handoff_tx,
            handoff_rx,
            client,
        }
    }

    /// Spawn the permanent fetchers plus a shutdown observer bound to
    /// `shutdown`. Cancellation closes the handoff channel: permanent
    /// fetchers exit, new batches are refused, in-flight batches finish on
    /// their private channels.
    pub fn start(&self, shutdown: CancellationToken) {
        for id in 1..=self.fixed {
            tokio::spawn(worker::run_permanent(
                id,
                self.handoff_rx.clone(),
                self.client.clone(),
            ));
        }

        let handoff_tx = self.handoff_tx.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            debug!("shutting down the fetcher pool");
            handoff_tx.close();
        });
    }

    /// Live overflow fetchers, for saturation monitoring.
    pub fn overflow_in_flight(&self) -> usize {
        self.spawned.load(Ordering::Acquire)
    }

    /// Reserve `count` fetcher slots for one batch and return the sending
    /// half of its job channel, buffered for `buf` jobs so enqueueing never
    /// blocks the dispatcher.
    ///
    /// Rejections are synchronous and consume nothing: the overflow ceiling
    /// is claimed up front, so a pool whose elastic tier is fully spawned
    /// refuses the batch even if permanent fetchers are idle.
    fn acquire_workers(
        &self,
        count: usize,
        buf: usize,
    ) -> Result<async_channel::Sender<Job>, CollectError> {
        if count == 0 || count > self.fixed + self.overflow {
            return Err(CollectError::OverCapacity {
                requested: count,
                capacity: self.fixed + self.overflow,
            });
        }

        if self.overflow > 0 && self.spawned.load(Ordering::Acquire) >= self.overflow {
            return Err(CollectError::Exhausted);
        }

        let (jobs_tx, jobs_rx) = async_channel::bounded(buf);

        for _ in 0..count {
            match self.handoff_tx.try_send(jobs_rx.clone()) {
                Ok(()) => {}
                Err(async_channel::TrySendError::Full(jobs)) => self.spawn_overflow(jobs)?,
                Err(async_channel::TrySendError::Closed(_)) => return Err(CollectError::Closed),
            }
        }

        Ok(jobs_tx)
    }

    /// Spawn one overflow fetcher bound to `jobs`, claiming a slot in the
    /// elastic tier first so concurrent acquisitions cannot overshoot it.
    fn spawn_overflow(&self, jobs: JobReceiver) -> Result<(), CollectError> {
        let claimed = self
            .spawned
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |spawned| {
                (spawned < self.overflow).then_some(spawned + 1)
            });

        if claimed.is_err() {
            return Err(CollectError::Exhausted);
        }

        gauge!("collector_overflow_fetchers").increment(1.0);

        let client = self.client.clone();
        let spawned = Arc::clone(&self.spawned);
        tokio::spawn(async move {
            worker::run_overflow(jobs, client).await;
            spawned.fetch_sub(1, Ordering::AcqRel);
            gauge!("collector_overflow_fetchers").decrement(1.0);
        });

        Ok(())
    }
}

#[async_trait]
impl Collector for FetchPool {
    async fn collect(
        &self,
        cancel: CancellationToken,
        urls: Vec<String>,
        limit: usize,
    ) -> Result<Vec<FetchResult>, CollectError> {
        if urls.is_empty() {
            return Err(CollectError::EmptyBatch);
        }

        let jobs_tx = self.acquire_workers(limit, urls.len())?;

        let (res_tx, mut res_rx) = mpsc::channel(urls.len());
        // Sized so every fetcher can report once; only the first is read and
        // fetchers drop the rest, so nobody ever blocks on this channel.
        let (err_tx, mut err_rx) = mpsc::channel(limit);

        // Cancelled on every exit path, so sibling fetchers stop as soon as
        // the batch is decided.
        let inner = cancel.child_token();
        let _inner_guard = inner.clone().drop_guard();

        let total = urls.len();
        for url in urls {
            let job = Job {
                url,
                cancel: inner.clone(),
                results: res_tx.clone(),
                errors: err_tx.clone(),
            };
            // The job channel is buffered for the whole batch and we hold its
            // only sender, so this cannot fail while the pool is open.
            if jobs_tx.try_send(job).is_err() {
                return Err(CollectError::Closed);
            }
        }

        let mut data = Vec::with_capacity(total);
        loop {
            tokio::select! {
                Some(err) = err_rx.recv() => return Err(err),
                () = cancel.cancelled() => return Err(CollectError::Cancelled),
                Some(result) = res_rx.recv() => {
                    data.push(result);

                    if data.len() == total {
                        return Ok(data);
                    }
                }
            }
        }
    }
}
