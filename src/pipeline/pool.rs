//! Bounded-concurrency execution of per-listing scrape tasks.
//!
//! Every candidate link gets its own tokio task. A [`Semaphore`] caps how many
//! of them are in flight; a task keeps its permit through the politeness delay
//! that follows its result, so the delay throttles the next task start rather
//! than the delivery of the result itself.

use crate::models::{CandidateLink, PropertyResult};
use crate::pipeline::pacing::PacingPolicy;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Result of one scrape task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub result: PropertyResult,
    /// Whether the page loaded and its HTML was read
    pub succeeded: bool,
}

impl TaskOutcome {
    pub fn succeeded(result: PropertyResult) -> Self {
        Self {
            result,
            succeeded: true,
        }
    }

    /// Url-only result for a task that could not load or read its page
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            result: PropertyResult::url_only(url),
            succeeded: false,
        }
    }
}

/// Runs one task per link with at most `concurrency` in flight
#[derive(Debug, Clone)]
pub struct BoundedWorkerPool {
    concurrency: usize,
    pacing: PacingPolicy,
}

impl BoundedWorkerPool {
    pub fn new(concurrency: usize, pacing: PacingPolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            pacing,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start every task and return a handle yielding outcomes as they finish
    pub fn spawn<F, Fut>(&self, links: Vec<CandidateLink>, per_task: F) -> PoolRun
    where
        F: Fn(CandidateLink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let per_task = Arc::new(per_task);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (index, link) in links.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let per_task = per_task.clone();
            let sender = sender.clone();
            let pacing = self.pacing;

            tasks.spawn(async move {
                let Ok(permit) = semaphore.acquire_owned().await else {
                    warn!(url = %link.url, "Worker pool closed before task started");
                    let _ = sender.send((index, TaskOutcome::failed(link.url)));
                    return;
                };

                let outcome = per_task(link).await;
                let _ = sender.send((index, outcome));

                pacing.wait().await;
                drop(permit);
            });
        }

        debug!(
            tasks = links.len(),
            concurrency = self.concurrency,
            "Worker pool started"
        );

        PoolRun {
            receiver,
            tasks,
            reported: vec![false; links.len()],
            links,
        }
    }

    /// Run every task to completion and collect outcomes in completion order
    pub async fn run<F, Fut>(&self, links: Vec<CandidateLink>, per_task: F) -> Vec<TaskOutcome>
    where
        F: Fn(CandidateLink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let mut run = self.spawn(links, per_task);
        let mut outcomes = Vec::new();
        while let Some(outcome) = run.next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// In-progress pool run
pub struct PoolRun {
    receiver: mpsc::UnboundedReceiver<(usize, TaskOutcome)>,
    tasks: JoinSet<()>,
    reported: Vec<bool>,
    links: Vec<CandidateLink>,
}

impl PoolRun {
    /// Next finished outcome, in completion order.
    ///
    /// Returns `None` only once every task has terminated. A task that
    /// panicked before reporting is yielded as a url-only failure, so there is
    /// exactly one outcome per link.
    pub async fn next(&mut self) -> Option<TaskOutcome> {
        if let Some((index, outcome)) = self.receiver.recv().await {
            self.reported[index] = true;
            return Some(outcome);
        }

        // Every sender is gone, so every task has finished or unwound.
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Scrape task did not complete: {}", e);
            }
        }

        let missing = self.reported.iter().position(|reported| !reported)?;
        self.reported[missing] = true;
        Some(TaskOutcome::failed(self.links[missing].url.clone()))
    }
}
