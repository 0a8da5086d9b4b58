// ========================================================================================
//
//                                 The job dispatcher
//
// ========================================================================================
//
// Jobs are pushed onto a bounded lock-free queue up front and a fixed pool of scoped
// worker threads drains it. A worker owns every byte of state for the job it is
// running; the queue is the only thing the workers share. A failing or panicking job
// is logged and counted, and the worker moves on to the next one.

use crate::pipeline::{JobReport, run_job};
use crate::types::Job;
use crossbeam_queue::ArrayQueue;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info};
use std::any::Any;
use std::io::IsTerminal;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// A fixed set of jobs, handed out one at a time.
pub struct WorkQueue {
    jobs: ArrayQueue<Job>,
}

impl WorkQueue {
    pub fn new(jobs: Vec<Job>) -> Self {
        let queue = ArrayQueue::new(jobs.len().max(1));
        for job in jobs {
            queue.push(job).ok();
        }
        Self { jobs: queue }
    }

    /// The next job, or `None` once the queue is drained.
    pub fn try_dequeue(&self) -> Option<Job> {
        self.jobs.pop()
    }

    pub fn remaining(&self) -> usize {
        self.jobs.len()
    }
}

/// Totals for a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<JobReport>,
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn selected_variants(&self) -> usize {
        self.completed.iter().map(|report| report.selected).sum()
    }

    fn absorb(&mut self, other: RunSummary) {
        self.completed.extend(other.completed);
        self.failed.extend(other.failed);
    }
}

/// Pool size for `job_count` jobs: the requested size, or one per core, never
/// more than there are jobs.
pub fn worker_count(requested: Option<usize>, job_count: usize) -> usize {
    requested
        .unwrap_or_else(num_cpus::get)
        .min(job_count)
        .max(1)
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} participants ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn work(queue: &WorkQueue, pb: &ProgressBar) -> RunSummary {
    let mut summary = RunSummary::default();
    while let Some(job) = queue.try_dequeue() {
        pb.set_message(job.participant_id.clone());
        match panic::catch_unwind(AssertUnwindSafe(|| run_job(&job))) {
            Ok(Ok(report)) => {
                info!(
                    "{}: selected {} of {} candidates from {} variant lines in {:.2?} -> {} ({} queued)",
                    report.participant_id,
                    report.selected,
                    report.candidates,
                    report.data_lines,
                    report.elapsed,
                    report.output_path.display(),
                    queue.remaining()
                );
                summary.completed.push(report);
            }
            Ok(Err(err)) => {
                error!("{}: {err}", job.participant_id);
                summary.failed.push(job.participant_id);
            }
            Err(payload) => {
                error!(
                    "{}: worker panicked: {}",
                    job.participant_id,
                    panic_message(payload.as_ref())
                );
                summary.failed.push(job.participant_id);
            }
        }
        pb.inc(1);
    }
    summary
}

/// Runs every job on a pool of `workers` threads and waits for all of them.
pub fn run_jobs(jobs: Vec<Job>, workers: usize) -> RunSummary {
    let started = Instant::now();
    let queue = WorkQueue::new(jobs);
    let pb = create_progress_bar(queue.remaining() as u64);
    let workers = workers.max(1);

    let mut summary = thread::scope(|s| {
        let (queue, pb) = (&queue, &pb);
        let handles: Vec<_> = (0..workers)
            .map(|_| s.spawn(move || work(queue, pb)))
            .collect();

        let mut summary = RunSummary::default();
        for handle in handles {
            // Job panics are caught inside `work`, so a join error cannot occur.
            if let Ok(partial) = handle.join() {
                summary.absorb(partial);
            }
        }
        summary
    });

    pb.finish_and_clear();
    summary.elapsed = started.elapsed();
    summary
}
