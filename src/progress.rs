//! Progress estimation and the progress-callback trait.
//!
//! [`ProgressEstimator`] turns completion events into a [`ProgressSnapshot`]
//! (fraction done plus a linear ETA). It only moves when a job finishes; there
//! is no timer.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionOptionsBuilder::progress_callback`] to receive
//! those snapshots and the run's lifecycle events. Every callback is invoked
//! from the single task that consumes scheduler events, so calls never
//! overlap; implementations still need to be `Send + Sync` because the run
//! may move between runtime threads.
//!
//! # Example
//!
//! ```rust
//! use webpage2pdf::{CompletionEvent, ConversionOptions, ConversionProgressCallback, ProgressSnapshot};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, event: &CompletionEvent, snapshot: &ProgressSnapshot) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("#{} {} ({}/{})", event.index, event.outcome.label(), snapshot.completed, snapshot.total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let options = ConversionOptions::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::RunReport;
use crate::scheduler::CompletionEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// Linear completion-rate estimator.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    completed: usize,
    total: usize,
    started_at: Instant,
}

impl ProgressEstimator {
    pub fn new(total: usize, started_at: Instant) -> Self {
        Self {
            completed: 0,
            total,
            started_at,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Count one finished job and return the snapshot as of now.
    pub fn record(&mut self) -> ProgressSnapshot {
        self.record_at(Instant::now())
    }

    /// Count one finished job at `now`. Saturates at `total`.
    pub fn record_at(&mut self, now: Instant) -> ProgressSnapshot {
        if self.completed < self.total {
            self.completed += 1;
        }
        self.snapshot_at(now)
    }

    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.started_at);
        let fraction_done = if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        };
        let estimated_remaining = if self.completed == 0 {
            None
        } else {
            let remaining = (self.total - self.completed) as f64;
            Some(elapsed.mul_f64(remaining / self.completed as f64))
        };
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            fraction_done,
            elapsed,
            estimated_remaining,
        }
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    /// `completed / total`, in `[0, 1]`.
    pub fraction_done: f64,
    pub elapsed: Duration,
    /// `None` until the first job finishes.
    pub estimated_remaining: Option<Duration>,
}

/// Called by the run driver as jobs start and finish.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first job is dispatched.
    fn on_run_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a job is handed to the renderer.
    fn on_job_start(&self, index: usize, url: &str) {
        let _ = (index, url);
    }

    /// Called for every job that reaches a terminal status, including jobs
    /// cancelled before dispatch.
    fn on_job_complete(&self, event: &CompletionEvent, snapshot: &ProgressSnapshot) {
        let _ = (event, snapshot);
    }

    /// Called once, the first time the run observes a cancel request.
    fn on_cancel_requested(&self) {}

    /// Called once after aggregation, with the final report.
    fn on_run_complete(&self, report: &RunReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Forwards every snapshot into a Tokio channel.
///
/// Send errors (receiver dropped) are ignored.
pub struct ChannelProgressCallback {
    tx: UnboundedSender<ProgressSnapshot>,
}

impl ChannelProgressCallback {
    pub fn new(tx: UnboundedSender<ProgressSnapshot>) -> Self {
        Self { tx }
    }
}

impl ConversionProgressCallback for ChannelProgressCallback {
    fn on_job_complete(&self, _event: &CompletionEvent, snapshot: &ProgressSnapshot) {
        let _ = self.tx.send(snapshot.clone());
    }
}

/// Convenience alias matching the type stored in [`crate::config::ConversionOptions`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RenderOutcome;

    #[test]
    fn eta_is_unknown_before_first_completion() {
        let t0 = Instant::now();
        let est = ProgressEstimator::new(4, t0);
        let snap = est.snapshot_at(t0 + Duration::from_secs(5));
        assert_eq!(snap.completed, 0);
        assert_eq!(snap.fraction_done, 0.0);
        assert_eq!(snap.estimated_remaining, None);
    }

    #[test]
    fn eta_scales_linearly_with_remaining_jobs() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(4, t0);
        let snap = est.record_at(t0 + Duration::from_secs(10));
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.fraction_done, 0.25);
        assert_eq!(snap.elapsed, Duration::from_secs(10));
        assert_eq!(snap.estimated_remaining, Some(Duration::from_secs(30)));

        let snap = est.record_at(t0 + Duration::from_secs(20));
        assert_eq!(snap.estimated_remaining, Some(Duration::from_secs(20)));
    }

    #[test]
    fn completed_is_capped_at_total() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(2, t0);
        est.record_at(t0);
        est.record_at(t0);
        let snap = est.record_at(t0 + Duration::from_secs(1));
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.fraction_done, 1.0);
        assert_eq!(snap.estimated_remaining, Some(Duration::ZERO));
    }

    #[test]
    fn fraction_never_decreases() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(7, t0);
        let mut last = 0.0;
        for i in 0..10 {
            let snap = est.record_at(t0 + Duration::from_millis(i * 100));
            assert!(snap.fraction_done >= last);
            assert!(snap.fraction_done <= 1.0);
            last = snap.fraction_done;
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_job_start(0, "https://example.com");
        cb.on_cancel_requested();
    }

    #[tokio::test]
    async fn channel_callback_forwards_snapshots() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cb: ProgressCallback = Arc::new(ChannelProgressCallback::new(tx));
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(2, t0);
        let event = CompletionEvent {
            index: 0,
            url: "https://example.com".into(),
            outcome: RenderOutcome::Cancelled,
            started_at: None,
            finished_at: t0,
            dispatched: false,
        };
        cb.on_job_complete(&event, &est.record_at(t0));
        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.total, 2);
    }
}
