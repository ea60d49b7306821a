//! Bounded worker pool for per-project tasks.
//!
//! All projects are queued up front; `workers` threads pull from a shared
//! cursor and send one [`TaskReport`] per project back over a channel. A task
//! that panics is recorded as a failure; siblings keep running.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, error};

use crate::core::catalog::ProjectRecord;
use crate::core::outcome::{FailureReason, Stage, TaskOutcome, TaskReport};

/// Run `task` once per project on at most `workers` threads.
///
/// Reports arrive in completion order, which is only deterministic when
/// `workers == 1`. Returns after every task has finished.
pub fn dispatch<F>(projects: &[ProjectRecord], workers: usize, task: F) -> Vec<TaskReport>
where
    F: Fn(&ProjectRecord) -> TaskOutcome + Sync,
{
    if projects.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, projects.len());
    debug!(projects = projects.len(), workers, "dispatching tasks");

    let cursor = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();
    let task = &task;
    let cursor = &cursor;

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            scope.spawn(move || {
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(project) = projects.get(index) else {
                        break;
                    };
                    let outcome = run_isolated(task, project);
                    let report = TaskReport {
                        slug: project.slug.clone(),
                        outcome,
                    };
                    if tx.send(report).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);
        rx.iter().collect()
    })
}

fn run_isolated<F>(task: &F, project: &ProjectRecord) -> TaskOutcome
where
    F: Fn(&ProjectRecord) -> TaskOutcome + Sync,
{
    match panic::catch_unwind(AssertUnwindSafe(|| task(project))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(slug = %project.slug, message = %message, "task panicked");
            TaskOutcome::failed(Stage::Worker, FailureReason::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
