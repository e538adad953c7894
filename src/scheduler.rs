//! Bounded worker pool that turns jobs into a stream of lifecycle events.
//!
//! Each job becomes a tiny inner stream (`Started`, then `Finished`) built
//! with [`stream::unfold`]; the outer stream flattens at most `concurrency`
//! of them at a time. Jobs are pulled in index order, so dispatch order is
//! ascending while completion order is whatever the renderer produces.
//!
//! The stream is the only channel between workers and the run driver. It
//! ends when every pulled job has emitted `Finished`, which is what makes a
//! cancelled run drain instead of abandoning in-flight work.

use crate::config::ConversionOptions;
use crate::job::{JobSpec, RenderOutcome};
use crate::pipeline::render::{intermediate_file_name, PageRenderer, RenderRequest};
use crate::session::CancelHandle;
use futures::stream::{self, Stream, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Boxed event stream returned by [`Scheduler::run`].
pub type EventStream = Pin<Box<dyn Stream<Item = SchedulerEvent> + Send>>;

/// A job reached a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub index: usize,
    pub url: String,
    pub outcome: RenderOutcome,
    /// `None` when the job was cancelled before dispatch.
    pub started_at: Option<Instant>,
    pub finished_at: Instant,
    /// Whether the renderer was invoked for this job.
    pub dispatched: bool,
}

/// Lifecycle events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Started {
        index: usize,
        url: String,
        at: Instant,
    },
    Finished(CompletionEvent),
}

/// Dispatches jobs to a [`PageRenderer`], at most `options.concurrency` at once.
pub struct Scheduler {
    renderer: Arc<dyn PageRenderer>,
    options: Arc<ConversionOptions>,
    work_dir: PathBuf,
    cancel: CancelHandle,
}

enum JobState {
    Pending(JobSpec),
    Running { job: JobSpec, started_at: Instant },
    Done,
}

impl Scheduler {
    /// `work_dir` receives one intermediate PDF per job.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        options: Arc<ConversionOptions>,
        work_dir: impl Into<PathBuf>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            renderer,
            options,
            work_dir: work_dir.into(),
            cancel,
        }
    }

    /// Start scheduling `jobs` (expected in ascending index order).
    ///
    /// Nothing runs until the returned stream is polled.
    pub fn run(self, jobs: Vec<JobSpec>) -> EventStream {
        let limit = self.options.concurrency.max(1);
        let ctx = Arc::new(self);
        stream::iter(jobs)
            .map(move |job| {
                let ctx = Arc::clone(&ctx);
                Box::pin(stream::unfold(JobState::Pending(job), move |state| {
                    let ctx = Arc::clone(&ctx);
                    async move { ctx.step(state).await }
                }))
            })
            .flatten_unordered(limit)
            .boxed()
    }

    async fn step(&self, state: JobState) -> Option<(SchedulerEvent, JobState)> {
        match state {
            JobState::Pending(job) => {
                let now = Instant::now();
                if self.cancel.is_cancelled() {
                    debug!(index = job.index, "cancelled before dispatch");
                    let event = CompletionEvent {
                        index: job.index,
                        url: job.url,
                        outcome: RenderOutcome::Cancelled,
                        started_at: None,
                        finished_at: now,
                        dispatched: false,
                    };
                    return Some((SchedulerEvent::Finished(event), JobState::Done));
                }
                let started = SchedulerEvent::Started {
                    index: job.index,
                    url: job.url.clone(),
                    at: now,
                };
                Some((started, JobState::Running { job, started_at: now }))
            }
            JobState::Running { job, started_at } => {
                let request = RenderRequest {
                    index: job.index,
                    url: job.url.clone(),
                    output_path: self.work_dir.join(intermediate_file_name(job.index)),
                };
                let deadline = tokio::time::Instant::now() + self.options.render_timeout();
                let outcome = self
                    .renderer
                    .render(&request, &self.options, deadline, &self.cancel)
                    .await;
                let event = CompletionEvent {
                    index: job.index,
                    url: job.url,
                    outcome,
                    started_at: Some(started_at),
                    finished_at: Instant::now(),
                    dispatched: true,
                };
                Some((SchedulerEvent::Finished(event), JobState::Done))
            }
            JobState::Done => None,
        }
    }
}
