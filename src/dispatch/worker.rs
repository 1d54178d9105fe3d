// Copyright @yucwang 2026

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::error::LostReason;
use crate::core::sample_source::SampleSource;
use crate::dispatch::protocol::{Job, RequestId, WorkerId, WorkerMessage};

/// Control-side handle of one worker thread.
///
/// The worker lives until its job channel is closed or its sample source
/// panics. Dropping the handle closes the channel; the thread then exits after
/// finishing whatever job it holds.
pub(crate) struct Worker {
    id: WorkerId,
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    in_flight: Option<RequestId>,
}

impl Worker {
    pub fn spawn(
        id: WorkerId,
        source: Arc<dyn SampleSource>,
        results: Sender<WorkerMessage>,
    ) -> std::io::Result<Worker> {
        let (jobs, job_receiver) = channel();
        let thread = thread::Builder::new()
            .name(format!("sampleloom-{}", id))
            .spawn(move || run_worker(id, job_receiver, source, results))?;

        Ok(Worker {
            id,
            jobs: Some(jobs),
            thread: Some(thread),
            in_flight: None,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Hands a job to the worker. Gives the job back if the thread is gone.
    pub fn assign(&mut self, job: Job) -> Result<(), Job> {
        debug_assert!(self.in_flight.is_none());
        let request = job.request;
        match &self.jobs {
            Some(jobs) => match jobs.send(job) {
                Ok(()) => {
                    self.in_flight = Some(request);
                    Ok(())
                }
                Err(err) => Err(err.0),
            },
            None => Err(job),
        }
    }

    pub fn finish_job(&mut self) -> Option<RequestId> {
        self.in_flight.take()
    }

    pub fn has_exited(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Closes the job channel and waits for the thread to end.
    pub fn join(mut self) {
        self.jobs = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("{} ended with a panic", self.id);
            }
        }
    }
}

/// Main loop, running on the worker thread.
fn run_worker(
    id: WorkerId,
    jobs: Receiver<Job>,
    source: Arc<dyn SampleSource>,
    results: Sender<WorkerMessage>,
) {
    log::debug!("{} started", id);
    for job in jobs.iter() {
        let (width, height) = (job.work.width(), job.work.height());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.produce(width, height)));

        let (message, keep_running) = match outcome {
            Ok(buffer) if buffer.len() == job.work.expected_len() => (
                WorkerMessage::Completed { worker: id, request: job.request, buffer },
                true,
            ),
            Ok(buffer) => (
                WorkerMessage::Failed {
                    worker: id,
                    request: job.request,
                    reason: LostReason::MalformedResult {
                        expected: job.work.expected_len(),
                        actual: buffer.len(),
                    },
                },
                true,
            ),
            Err(payload) => (
                WorkerMessage::Failed {
                    worker: id,
                    request: job.request,
                    reason: LostReason::Panicked(panic_message(payload.as_ref())),
                },
                false,
            ),
        };

        // The control side may already be gone.
        if results.send(message).is_err() || !keep_running {
            break;
        }
    }
    log::debug!("{} stopped", id);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic")
    }
}
