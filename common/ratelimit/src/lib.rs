//! Weighted sliding-window request admission with constant memory.
//!
//! Two windows are kept: the current one and the previous one. The effective
//! count blends both, weighted by how far into the current window the clock
//! sits, so the admission rate stays smooth across window boundaries instead
//! of resetting to zero.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Admission gate consumed by transport middleware: one call per request.
pub trait Limiter: Send + Sync {
    fn allow(&self) -> bool;
}

/// Time source for the limiter, injectable so tests can drive the clock.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the unix epoch.
    fn now_ns(&self) -> i64;
}

#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the unix epoch")
            .as_nanos() as i64
    }
}

/// One counting window: `[start, start + rate_ns)`.
#[derive(Default)]
struct Window {
    start: AtomicI64,
    count: AtomicI64,
}

impl Window {
    fn start(&self) -> i64 {
        self.start.load(Ordering::Acquire)
    }

    fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    fn add(&self, n: i64) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    fn reset(&self, start: i64, count: i64) {
        self.start.store(start, Ordering::Release);
        self.count.store(count, Ordering::Release);
    }
}

/// Sliding-window limiter: at most `limit` admissions per `rate` interval,
/// O(1) per call, no lock held across admission.
///
/// The read-modify-write in [`SlidingWindow::allow`] spans two atomic fields
/// and is not linearizable; the drift is bounded by the number of concurrent
/// callers and accepted in exchange for lock-freedom.
pub struct SlidingWindow<C = SystemClock> {
    rate_ns: i64,
    limit: i64,
    curr: Window,
    prev: Window,
    clock: C,
}

impl SlidingWindow<SystemClock> {
    pub fn new(rate: Duration, limit: i64) -> Self {
        Self::with_clock(rate, limit, SystemClock)
    }
}

impl<C: Clock> SlidingWindow<C> {
    pub fn with_clock(rate: Duration, limit: i64, clock: C) -> Self {
        Self {
            rate_ns: rate.as_nanos() as i64,
            limit,
            curr: Window::default(),
            prev: Window::default(),
            clock,
        }
    }

    /// Advance the window pair so that `curr` covers `now`.
    ///
    /// A direct transition (exactly one window elapsed) carries the old count
    /// into `prev`; after a longer gap the history is dropped entirely.
    fn renew(&self, now_ns: i64) {
        let aligned = (now_ns / self.rate_ns) * self.rate_ns;

        let diff = (aligned - self.curr.start()) / self.rate_ns;
        if diff >= 1 {
            let old = if diff == 1 { self.curr.count() } else { 0 };

            self.prev.reset(aligned - self.rate_ns, old);
            self.curr.reset(aligned, 0);
        }
    }

    /// Weighted estimate of admissions in the sliding window ending now:
    /// `floor(prev.count * (rate - offset) / rate) + curr.count`.
    fn count(&self) -> i64 {
        let now_ns = self.clock.now_ns();

        self.renew(now_ns);

        let offset = now_ns - self.curr.start();
        let weight = (self.rate_ns - offset) as f64 / self.rate_ns as f64;

        (weight * self.prev.count() as f64) as i64 + self.curr.count()
    }
}

impl<C: Clock> Limiter for SlidingWindow<C> {
    fn allow(&self) -> bool {
        if self.count() >= self.limit {
            return false;
        }

        self.curr.add(1);

        true
    }
}
