//! Per-image editing state: snapshot stack, history, viewport and the
//! worker queue that serializes mutations.
//!
//! The edit-state lock may be taken while a handle's mutation lock is held
//! (history is recorded from inside the locked section), never the other way
//! round. Everything here drops the edit-state lock before cloning or
//! mutating a handle.

mod queue;
mod viewport;

pub use queue::{MutationQueue, QueueError};
pub use viewport::Viewport;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use image::ImageFormat;
use thiserror::Error;

use crate::handle::{AdjustOutcome, HandleError, HandleResult, ImageHandle};
use crate::history::{HistoryEntry, HistoryResponse, HistoryStack};
use crate::native::ImageLoader;
use crate::operation::{AdjustmentKind, AdjustmentValues, Operation};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{lock} lock poisoned")]
    LockPoisoned { lock: &'static str },
    #[error("{job} panicked")]
    Panicked { job: String },
}

impl ContextError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Handle(err) => err.is_fatal(),
            Self::Queue(_) => false,
            Self::LockPoisoned { .. } | Self::Panicked { .. } => true,
        }
    }

    fn is_not_loaded(&self) -> bool {
        matches!(self, Self::Handle(HandleError::NotLoaded))
    }
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Work accepted by [`ImageContext::submit`].
pub enum ContextJob {
    Apply(Operation),
    Undo,
    Reload(Arc<dyn ImageLoader>),
    Save {
        path: PathBuf,
        format: Option<ImageFormat>,
    },
}

impl ContextJob {
    pub fn label(&self) -> String {
        match self {
            Self::Apply(operation) => operation.to_string(),
            Self::Undo => "undo".to_string(),
            Self::Reload(_) => "reload".to_string(),
            Self::Save { .. } => "save".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Point adjustment within epsilon of the applied value.
    Skipped,
    Undone,
    NothingToUndo,
    Reloaded,
    Saved(PathBuf),
    /// No image is loaded.
    Ignored,
    /// Queued before the context was reset.
    Stale,
}

impl MutationOutcome {
    /// Whether the presented image changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied | Self::Undone | Self::Reloaded)
    }
}

struct EditState {
    /// Bottom is the image as loaded, top is the one being edited.
    snapshots: Vec<Arc<ImageHandle>>,
    history: HistoryStack,
    generation: u64,
}

pub struct ImageContext {
    path: PathBuf,
    state: Mutex<EditState>,
    viewport: Mutex<Viewport>,
    version: AtomicU64,
    queue: MutationQueue,
}

impl std::fmt::Debug for ImageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageContext")
            .field("path", &self.path)
            .field("version", &self.version())
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}

impl ImageContext {
    pub fn new(
        path: impl Into<PathBuf>,
        image: Arc<ImageHandle>,
        queue_capacity: usize,
    ) -> ContextResult<Self> {
        let path = path.into();
        let queue = MutationQueue::spawn(worker_name(&path), queue_capacity)?;
        Ok(Self {
            path,
            state: Mutex::new(EditState {
                snapshots: vec![image],
                history: HistoryStack::new(),
                generation: 0,
            }),
            viewport: Mutex::new(Viewport::new()),
            version: AtomicU64::new(0),
            queue,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bumped whenever the presented image or the edit state changes.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> ContextResult<u64> {
        Ok(self.lock_state()?.generation)
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// The handle currently presented and edited.
    pub fn current_handle(&self) -> ContextResult<Arc<ImageHandle>> {
        let state = self.lock_state()?;
        state
            .snapshots
            .last()
            .cloned()
            .ok_or(ContextError::Handle(HandleError::NotLoaded))
    }

    /// Returns the handle the next operation should run on, first pushing a
    /// clone of the top when the last recorded entry needs a snapshot.
    pub fn current_image(&self, response: HistoryResponse) -> ContextResult<Arc<ImageHandle>> {
        let (top, needs_snapshot, generation) = {
            let state = self.lock_state()?;
            let top = state
                .snapshots
                .last()
                .cloned()
                .ok_or(ContextError::Handle(HandleError::NotLoaded))?;
            let needs_snapshot = response == HistoryResponse::Recorded
                && state.history.last().is_some_and(|entry| !entry.trivial_undo());
            (top, needs_snapshot, state.generation)
        };
        if !needs_snapshot {
            return Ok(top);
        }

        let clone = Arc::new(top.duplicate()?);
        let mut state = self.lock_state()?;
        if state.generation == generation {
            state.snapshots.push(Arc::clone(&clone));
            tracing::debug!(
                path = %self.path.display(),
                snapshots = state.snapshots.len(),
                "took snapshot before destructive operation"
            );
        }
        Ok(clone)
    }

    pub fn snapshot_count(&self) -> ContextResult<usize> {
        Ok(self.lock_state()?.snapshots.len())
    }

    pub fn history(&self) -> ContextResult<Vec<HistoryEntry>> {
        Ok(self.lock_state()?.history.entries().to_vec())
    }

    /// Adjustment values implied by the history; 0.0 for untouched kinds.
    pub fn filters(&self) -> ContextResult<AdjustmentValues> {
        Ok(self.lock_state()?.history.adjustment_values())
    }

    pub fn metadata(&self) -> ContextResult<BTreeMap<String, String>> {
        Ok(self.current_handle()?.metadata()?)
    }

    pub fn viewport(&self) -> ContextResult<Viewport> {
        Ok(*self.lock_viewport()?)
    }

    pub fn update_viewport<R>(&self, update: impl FnOnce(&mut Viewport) -> R) -> ContextResult<R> {
        let result = update(&mut *self.lock_viewport()?);
        self.bump_version();
        Ok(result)
    }

    /// Drops history and snapshots in favour of `image`. The viewport is
    /// kept and queued jobs from before the reset become stale.
    pub fn reset_states(&self, image: Arc<ImageHandle>) -> ContextResult<()> {
        let mut state = self.lock_state()?;
        state.snapshots.clear();
        state.snapshots.push(image);
        state.history.reset();
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        self.bump_version();
        tracing::debug!(path = %self.path.display(), generation, "reset image context");
        Ok(())
    }

    pub fn apply(&self, operation: Operation) -> ContextResult<MutationOutcome> {
        let generation = self.generation()?;
        self.apply_in(operation, generation)
    }

    pub fn undo(&self) -> ContextResult<MutationOutcome> {
        let mut state = self.lock_state()?;
        let Some(entry) = state.history.pop() else {
            return Ok(MutationOutcome::NothingToUndo);
        };

        match entry.operation {
            Operation::Adjust { kind, .. } if entry.trivial_undo() => {
                let previous = state
                    .history
                    .last_value(kind)
                    .unwrap_or_else(|| kind.neutral_value());
                let top = state.snapshots.last().cloned();
                drop(state);

                let restored = top
                    .ok_or(HandleError::NotLoaded)
                    .and_then(|top| top.restore_adjustment(kind, previous));
                if let Err(err) = restored {
                    if err.is_unpresented() {
                        self.bump_version();
                    } else {
                        self.lock_state()?.history.restore(entry);
                    }
                    return Err(err.into());
                }
                tracing::debug!(kind = kind.label(), previous, "undid point adjustment");
            }
            _ => {
                if state.snapshots.len() > 1 {
                    state.snapshots.pop();
                } else {
                    tracing::warn!(
                        path = %self.path.display(),
                        operation = %entry.operation,
                        "no snapshot left for destructive entry"
                    );
                }
                drop(state);
                tracing::debug!(operation = %entry.operation, "restored snapshot");
            }
        }

        self.bump_version();
        Ok(MutationOutcome::Undone)
    }

    /// Re-reads the file into the current handle in place, then resets.
    pub fn reload(&self, loader: &dyn ImageLoader) -> ContextResult<MutationOutcome> {
        let top = self.current_handle()?;
        top.load_file(loader, &self.path)?;
        self.reset_states(top)?;
        Ok(MutationOutcome::Reloaded)
    }

    pub fn save(&self, path: &Path, format: Option<ImageFormat>) -> ContextResult<MutationOutcome> {
        self.current_handle()?.save(path, format)?;
        Ok(MutationOutcome::Saved(path.to_path_buf()))
    }

    /// Queues `job` on this context's worker. `on_done` runs on the worker
    /// with the result, also when the job panics.
    pub fn submit<F>(self: &Arc<Self>, job: ContextJob, on_done: F) -> ContextResult<()>
    where
        F: FnOnce(ContextResult<MutationOutcome>) + Send + 'static,
    {
        let generation = self.generation()?;
        let context = Arc::clone(self);
        let label = job.label();
        tracing::debug!(path = %self.path.display(), job = %label, "queueing job");

        self.queue.submit(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| context.run(job, generation)))
                .unwrap_or_else(|_| Err(ContextError::Panicked { job: label.clone() }));
            match &result {
                Ok(outcome) => {
                    tracing::debug!(path = %context.path.display(), job = %label, ?outcome, "job done");
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(path = %context.path.display(), job = %label, ?err, "job aborted");
                }
                Err(err) => {
                    tracing::warn!(path = %context.path.display(), job = %label, %err, "job failed");
                }
            }
            on_done(result);
        })?;
        Ok(())
    }

    fn run(&self, job: ContextJob, generation: u64) -> ContextResult<MutationOutcome> {
        let result = match job {
            ContextJob::Apply(operation) => self.apply_in(operation, generation),
            ContextJob::Undo => {
                if self.generation()? != generation {
                    return Ok(MutationOutcome::Stale);
                }
                self.undo()
            }
            ContextJob::Reload(loader) => self.reload(loader.as_ref()),
            ContextJob::Save { path, format } => self.save(&path, format),
        };
        match result {
            Err(err) if err.is_not_loaded() => Ok(MutationOutcome::Ignored),
            other => other,
        }
    }

    fn apply_in(&self, operation: Operation, generation: u64) -> ContextResult<MutationOutcome> {
        match operation {
            Operation::Adjust { kind, value } => self.apply_adjustment(kind, value, generation),
            Operation::Kernel { kind, radius } => {
                self.apply_destructive(operation, generation, |handle: &ImageHandle| {
                    handle.apply_kernel_operation(kind, radius)
                })
            }
            Operation::Transform(kind) => {
                self.apply_destructive(operation, generation, |handle: &ImageHandle| {
                    handle.apply_geometric_transform(kind)
                })
            }
        }
    }

    fn apply_adjustment(
        &self,
        kind: AdjustmentKind,
        value: f32,
        generation: u64,
    ) -> ContextResult<MutationOutcome> {
        if self.generation()? != generation {
            return Ok(MutationOutcome::Stale);
        }
        let handle = self.current_handle()?;

        let mut pending = PendingEntry::new(self, generation, false);
        let outcome = handle.apply_point_adjustment(kind, value, || {
            let mut state = self
                .state
                .lock()
                .map_err(|_| HandleError::LockPoisoned { lock: "edit state" })?;
            // A reset since submission orphans this handle; leave the new history alone.
            if state.generation == generation {
                state.history.add_history(Operation::Adjust { kind, value });
                pending.armed = true;
            }
            Ok(())
        });

        match outcome {
            Ok(AdjustOutcome::Skipped) => {
                pending.commit();
                self.lock_state()?.history.add_dummy();
                Ok(MutationOutcome::Skipped)
            }
            Ok(AdjustOutcome::Applied { .. }) => {
                pending.commit();
                self.bump_version();
                Ok(MutationOutcome::Applied)
            }
            // The native image moved to `value`; the entry describes it.
            Err(err) if err.is_unpresented() => {
                pending.commit();
                self.bump_version();
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn apply_destructive<F>(
        &self,
        operation: Operation,
        generation: u64,
        mutate: F,
    ) -> ContextResult<MutationOutcome>
    where
        F: FnOnce(&ImageHandle) -> HandleResult<()>,
    {
        let response = {
            let mut state = self.lock_state()?;
            if state.generation != generation {
                return Ok(MutationOutcome::Stale);
            }
            state.history.add_history(operation)
        };

        let mut pending = PendingEntry::new(self, generation, true);
        let handle = self.current_image(response)?;
        pending.snapshot = Some(Arc::clone(&handle));

        mutate(handle.as_ref())?;
        pending.commit();
        self.bump_version();
        Ok(MutationOutcome::Applied)
    }

    /// Removes the entry recorded for a failed operation and the snapshot
    /// pushed for it, if the context has not been reset meanwhile.
    fn rollback(&self, generation: u64, snapshot: Option<&Arc<ImageHandle>>) {
        let Ok(mut state) = self.state.lock() else {
            tracing::error!(path = %self.path.display(), "edit state poisoned during rollback");
            return;
        };
        if state.generation != generation {
            return;
        }
        let entry = state.history.pop();
        if let Some(snapshot) = snapshot {
            let is_top = state
                .snapshots
                .last()
                .is_some_and(|top| Arc::ptr_eq(top, snapshot));
            if is_top && state.snapshots.len() > 1 {
                state.snapshots.pop();
            }
        }
        tracing::debug!(
            path = %self.path.display(),
            entry = ?entry.map(|entry| entry.sequence),
            "rolled back failed operation"
        );
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn lock_state(&self) -> ContextResult<MutexGuard<'_, EditState>> {
        self.state
            .lock()
            .map_err(|_| ContextError::LockPoisoned { lock: "edit state" })
    }

    fn lock_viewport(&self) -> ContextResult<MutexGuard<'_, Viewport>> {
        self.viewport
            .lock()
            .map_err(|_| ContextError::LockPoisoned { lock: "viewport" })
    }
}

/// History entry recorded for an operation that has not finished. Dropping
/// it without [`PendingEntry::commit`] rolls the entry back, whether the
/// operation returned an error or unwound.
struct PendingEntry<'a> {
    context: &'a ImageContext,
    generation: u64,
    snapshot: Option<Arc<ImageHandle>>,
    armed: bool,
}

impl<'a> PendingEntry<'a> {
    fn new(context: &'a ImageContext, generation: u64, armed: bool) -> Self {
        Self {
            context,
            generation,
            snapshot: None,
            armed,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.context
                .rollback(self.generation, self.snapshot.as_ref());
        }
    }
}

fn worker_name(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("mutate:{file}")
}
