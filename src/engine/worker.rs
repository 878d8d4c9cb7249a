//! Background Workers
//!
//! One thread per maintenance task (flush, compaction). Requests are queued
//! on a channel and run strictly one after another, so two flushes or two
//! compactions never overlap.
//!
//! The queue holds at most [`QUEUE_CAPACITY`] jobs. Callers of `request()`
//! wait for room; an automatic run that finds the queue full is skipped,
//! since every queued job already does the same work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{ErrorSlot, Result, StrataError};

/// Jobs a worker queue holds before `request()` blocks
pub(crate) const QUEUE_CAPACITY: usize = 16;

/// Why a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// A caller asked for it and is waiting on the result
    Requested,
    /// Scheduled by the engine itself; nobody waits
    Automatic,
}

enum Job {
    Run {
        trigger: Trigger,
        reply: Option<Sender<Result<bool>>>,
    },
    /// Sentinel: stop after everything queued before it
    Shutdown,
}

/// Handle to a worker thread running one task
pub(crate) struct Worker {
    name: &'static str,
    sender: Sender<Job>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// An automatic run is queued and has not started yet
    scheduled: Arc<AtomicBool>,
}

impl Worker {
    /// Spawn a thread running `task` once per queued job
    ///
    /// Failures of automatic runs are kept in `errors`; requested runs hand
    /// their result back to the caller instead.
    pub(crate) fn start<F>(name: &'static str, errors: Arc<ErrorSlot>, task: F) -> Result<Self>
    where
        F: FnMut(Trigger) -> Result<bool> + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(QUEUE_CAPACITY);
        let scheduled = Arc::new(AtomicBool::new(false));
        let thread_scheduled = Arc::clone(&scheduled);

        let handle = thread::Builder::new()
            .name(format!("stratakv-{}", name))
            .spawn(move || run(name, receiver, thread_scheduled, errors, task))?;

        Ok(Self {
            name,
            sender,
            handle: Mutex::new(Some(handle)),
            scheduled,
        })
    }

    /// Run the task and wait for its result
    pub(crate) fn request(&self) -> Result<bool> {
        let (reply, done) = channel::bounded(1);
        self.sender
            .send(Job::Run {
                trigger: Trigger::Requested,
                reply: Some(reply),
            })
            .map_err(|_| StrataError::Closed)?;

        done.recv().map_err(|_| {
            StrataError::Background(format!("{} worker stopped before replying", self.name))
        })?
    }

    /// Queue an automatic run unless one is already waiting. Never blocks.
    pub(crate) fn schedule(&self) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let job = Job::Run {
            trigger: Trigger::Automatic,
            reply: None,
        };
        if let Err(e) = self.sender.try_send(job) {
            if e.is_full() {
                tracing::debug!(worker = self.name, "queue full, automatic run skipped");
            }
            self.scheduled.store(false, Ordering::Release);
        }
    }

    /// Finish queued jobs and join the thread
    pub(crate) fn shutdown(&self) -> Result<()> {
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        let _ = self.sender.send(Job::Shutdown);
        handle
            .join()
            .map_err(|_| StrataError::Background(format!("{} worker panicked", self.name)))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(worker = self.name, error = %e, "worker shut down with error");
        }
    }
}

fn run<F>(
    name: &'static str,
    receiver: Receiver<Job>,
    scheduled: Arc<AtomicBool>,
    errors: Arc<ErrorSlot>,
    mut task: F,
) where
    F: FnMut(Trigger) -> Result<bool>,
{
    tracing::debug!(worker = name, "worker started");

    for job in receiver.iter() {
        match job {
            Job::Run { trigger, reply } => {
                if trigger == Trigger::Automatic {
                    scheduled.store(false, Ordering::Release);
                }

                let result = task(trigger);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            errors.record(name, &e);
                        }
                    }
                }
            }
            Job::Shutdown => break,
        }
    }

    tracing::debug!(worker = name, "worker stopped");
}
