//! WAL Writer
//!
//! Asynchronous handle to the commit log. Every operation becomes a message
//! on one channel consumed by a dedicated thread, so records are applied in
//! exactly the order callers enqueued them and `log()` never waits on I/O.
//!
//! The channel is unbounded so that `log()`, and with it every upsert, never
//! blocks. Nothing else bounds it: if the writer thread falls behind,
//! pending records pile up in memory until it catches up.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::entry::Entry;
use crate::error::{ErrorSlot, Result, StrataError};

use super::CommitLog;

/// Messages understood by the writer thread
enum WalCommand {
    Append(Entry),
    /// Remember the current log position as the end of flush `token`
    Mark(u64),
    /// Discard everything before the position marked for `token`
    Clear { token: u64, ack: Sender<Result<()>> },
    Sync { ack: Sender<Result<()>> },
    /// Sentinel: stop once everything queued before it is written
    Shutdown,
}

/// Writes entries to the commit log from a background thread
pub struct WalWriter {
    sender: Sender<WalCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
    errors: Arc<ErrorSlot>,
}

impl WalWriter {
    /// Move `log` onto a new writer thread
    ///
    /// The first failure of a queued append is kept (see [`WalWriter::failure`]);
    /// once one is recorded, further `log()` calls are refused.
    pub fn start(log: CommitLog) -> Result<Self> {
        let errors = Arc::new(ErrorSlot::new());
        let (sender, receiver) = channel::unbounded();
        let thread_errors = Arc::clone(&errors);

        let handle = thread::Builder::new()
            .name("stratakv-wal".to_string())
            .spawn(move || run(log, receiver, thread_errors))?;

        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
            errors,
        })
    }

    /// Queue `entry` for appending
    pub fn log(&self, entry: &Entry) -> Result<()> {
        if let Some(failure) = self.errors.get() {
            return Err(StrataError::StorageFault(format!(
                "commit log unavailable after earlier failure: {}",
                failure
            )));
        }
        self.send(WalCommand::Append(entry.clone()))
    }

    /// Mark the end of the records captured by flush `token`
    pub fn mark(&self, token: u64) -> Result<()> {
        self.send(WalCommand::Mark(token))
    }

    /// Discard the records captured by flush `token` and wait for it
    pub fn clear(&self, token: u64) -> Result<()> {
        let (ack, done) = channel::bounded(1);
        self.send(WalCommand::Clear { token, ack })?;
        done.recv().map_err(|_| StrataError::Closed)?
    }

    /// Write out everything queued so far and msync it
    pub fn sync(&self) -> Result<()> {
        let (ack, done) = channel::bounded(1);
        self.send(WalCommand::Sync { ack })?;
        done.recv().map_err(|_| StrataError::Closed)?
    }

    /// Drain the queue, stop the writer thread and release the file
    pub fn close(&self) -> Result<()> {
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        // The sentinel is queued behind every pending record.
        let _ = self.sender.send(WalCommand::Shutdown);
        handle
            .join()
            .map_err(|_| StrataError::Background("commit log writer panicked".to_string()))?;

        match self.errors.get() {
            Some(failure) => Err(StrataError::Background(failure)),
            None => Ok(()),
        }
    }

    /// First failure of the writer thread, if any
    pub fn failure(&self) -> Option<String> {
        self.errors.get()
    }

    fn send(&self, command: WalCommand) -> Result<()> {
        self.sender.send(command).map_err(|_| StrataError::Closed)
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "commit log writer closed with error");
        }
    }
}

fn run(mut log: CommitLog, receiver: Receiver<WalCommand>, errors: Arc<ErrorSlot>) {
    tracing::debug!(path = %log.path().display(), "commit log writer started");

    let mut marks: HashMap<u64, u64> = HashMap::new();
    let mut failed = false;

    for command in receiver.iter() {
        match command {
            WalCommand::Append(entry) => {
                if failed {
                    continue;
                }
                if let Err(e) = log.append(&entry) {
                    errors.record("commit log append", &e);
                    failed = true;
                }
            }
            WalCommand::Mark(token) => {
                marks.insert(token, log.cursor());
            }
            WalCommand::Clear { token, ack } => {
                let result = match marks.remove(&token) {
                    Some(offset) => log.discard_through(offset).map(|_| {
                        let discarded = offset - super::START_OFFSET;
                        for mark in marks.values_mut() {
                            *mark = mark.saturating_sub(discarded).max(super::START_OFFSET);
                        }
                    }),
                    None => Err(StrataError::InvariantViolation(format!(
                        "no commit log mark for flush {}",
                        token
                    ))),
                };
                let _ = ack.send(result);
            }
            WalCommand::Sync { ack } => {
                let _ = ack.send(log.sync());
            }
            WalCommand::Shutdown => break,
        }
    }

    if let Err(e) = log.sync() {
        errors.record("commit log final sync", &e);
    }
    tracing::debug!("commit log writer stopped");
}
