use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{pending} operations already pending (capacity {capacity})")]
    Full { pending: usize, capacity: usize },
    #[error("mutation worker {name} has stopped")]
    Closed { name: String },
    #[error("failed to spawn mutation worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bounded FIFO of jobs run one at a time on a dedicated thread.
///
/// The worker exits once the queue is dropped and drained.
#[derive(Debug)]
pub struct MutationQueue {
    name: String,
    capacity: usize,
    sender: mpsc::SyncSender<Job>,
    pending: Arc<AtomicUsize>,
}

impl MutationQueue {
    pub fn spawn(name: impl Into<String>, capacity: usize) -> Result<Self, QueueError> {
        let name = name.into();
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        let worker_name = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(&worker_name, &receiver, &worker_pending))
            .map_err(|source| QueueError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            capacity,
            sender,
            pending,
        })
    }

    /// Enqueues `job` without blocking.
    pub fn submit<F>(&self, job: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let result = self.sender.try_send(Box::new(job));
        if let Err(err) = result {
            let pending = self.pending.fetch_sub(1, Ordering::AcqRel) - 1;
            return Err(match err {
                mpsc::TrySendError::Full(_) => QueueError::Full {
                    pending,
                    capacity: self.capacity,
                },
                mpsc::TrySendError::Disconnected(_) => QueueError::Closed {
                    name: self.name.clone(),
                },
            });
        }
        Ok(())
    }

    /// Jobs submitted but not yet finished, including the running one.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn run_worker(name: &str, receiver: &mpsc::Receiver<Job>, pending: &AtomicUsize) {
    tracing::debug!(worker = name, "mutation worker started");
    while let Ok(job) = receiver.recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(worker = name, "mutation job panicked; continuing with next job");
        }
        pending.fetch_sub(1, Ordering::AcqRel);
    }
    tracing::debug!(worker = name, "mutation worker stopped");
}
