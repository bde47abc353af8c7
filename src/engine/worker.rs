//! Background worker
//!
//! One thread per read-write engine runs flushes and compactions handed to it
//! over a crossbeam channel. The thread holds only a weak reference to the
//! engine, so dropping the last handle ends it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use super::EngineInner;
use crate::error::Result;

/// Work accepted by the background thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    /// Flush every sealed memtable, then compact if needed
    Flush,
    /// Run compactions until no level is over its trigger
    Compact,
    Shutdown,
}

pub(crate) struct Worker {
    sender: Sender<Job>,
    handle: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn spawn(inner: Weak<EngineInner>, cancelled: Arc<AtomicBool>) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let flag = Arc::clone(&cancelled);
        let handle = thread::Builder::new()
            .name("lodekv-bg".to_string())
            .spawn(move || run(inner, receiver, flag))?;

        Ok(Self {
            sender,
            handle: Some(handle),
            cancelled,
        })
    }

    pub(crate) fn sender(&self) -> Sender<Job> {
        self.sender.clone()
    }

    /// Stop accepting work; with `wait`, block until the current job ends
    pub(crate) fn stop(&mut self, wait: bool) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Job::Shutdown);
        if let Some(handle) = self.handle.take() {
            if wait && handle.thread().id() != thread::current().id() {
                if handle.join().is_err() {
                    tracing::error!("Background worker panicked");
                }
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop(false);
    }
}

fn run(inner: Weak<EngineInner>, receiver: Receiver<Job>, cancelled: Arc<AtomicBool>) {
    tracing::debug!("Background worker started");

    while let Ok(job) = receiver.recv() {
        if job == Job::Shutdown || cancelled.load(Ordering::SeqCst) {
            break;
        }
        let Some(engine) = inner.upgrade() else {
            break;
        };

        let result = match job {
            Job::Flush => engine.flush_immutables().and_then(|_| engine.auto_compact(&cancelled)),
            Job::Compact => engine.auto_compact(&cancelled),
            Job::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(?job, error = %e, "Background job failed");
            engine.log_event(format!("background {:?} failed: {}", job, e));
        }
    }

    tracing::debug!("Background worker stopped");
}
