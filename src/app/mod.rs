//! Application-wide coordination: which images are open, which one is
//! active, and the signals the UI observes.
//!
//! `AppContext` is owned by the UI thread and passed explicitly. Workers
//! never touch it; their results come back over the completion channel and
//! are applied in [`AppContext::pump`].

mod navigation;
mod signals;
mod worker;

pub use navigation::{Direction, FsPathProvider, PathCursor, PathProvider};
pub use signals::{Signal, Status, StatusLevel, UiSignals};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use image::ImageFormat;

use crate::config::PipelineConfig;
use crate::context::{
    ContextError, ContextJob, ContextResult, ImageContext, MutationOutcome, QueueError,
};
use crate::error::{AppError, AppResult};
use crate::handle::{HandleResult, HandleSettings, ImageHandle};
use crate::native::{ImageLoader, RasterLoader};
use crate::operation::Operation;
use crate::transfer::TransferBuffer;

use self::worker::{spawn_worker_action, ACTION_RESULT_POLL_INTERVAL};

enum Completion {
    Loaded {
        path: PathBuf,
        result: HandleResult<ImageHandle>,
    },
    Mutation {
        path: PathBuf,
        job: String,
        result: ContextResult<MutationOutcome>,
    },
}

pub struct AppContext {
    config: PipelineConfig,
    settings: HandleSettings,
    loader: Arc<dyn ImageLoader>,
    paths: Box<dyn PathProvider>,
    transfer: Arc<TransferBuffer>,
    /// Open images in the order they were first loaded; tab order.
    contexts: Vec<(PathBuf, Arc<ImageContext>)>,
    active: Option<PathBuf>,
    active_tab: Option<usize>,
    cursor: PathCursor,
    signals: UiSignals,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    in_flight: usize,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("active", &self.active)
            .field("active_tab", &self.active_tab)
            .field("open", &self.contexts.len())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn new(
        config: PipelineConfig,
        loader: Arc<dyn ImageLoader>,
        paths: Box<dyn PathProvider>,
    ) -> AppResult<Self> {
        let (completion_tx, completion_rx) = mpsc::channel();
        let transfer = TransferBuffer::with_capacity(config.initial_transfer_bytes)?;
        Ok(Self {
            settings: HandleSettings::from(&config),
            transfer: Arc::new(transfer),
            config,
            loader,
            paths,
            contexts: Vec::new(),
            active: None,
            active_tab: None,
            cursor: PathCursor::default(),
            signals: UiSignals::default(),
            completion_tx,
            completion_rx,
            in_flight: 0,
        })
    }

    /// Decodes with the `image` crate and navigates the real filesystem.
    pub fn with_defaults(config: PipelineConfig) -> AppResult<Self> {
        Self::new(config, Arc::new(RasterLoader), Box::new(FsPathProvider))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn signals(&self) -> &UiSignals {
        &self.signals
    }

    pub fn subscribe(&mut self) -> mpsc::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn active_tab(&self) -> Option<usize> {
        self.active_tab
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.contexts.iter().map(|(path, _)| path.clone()).collect()
    }

    pub fn context(&self, path: &Path) -> Option<Arc<ImageContext>> {
        self.contexts
            .iter()
            .find(|(open, _)| open == path)
            .map(|(_, context)| Arc::clone(context))
    }

    pub fn active_context(&self) -> Option<Arc<ImageContext>> {
        self.active.as_deref().and_then(|path| self.context(path))
    }

    pub fn navigation(&self) -> &PathCursor {
        &self.cursor
    }

    /// Makes `path` active and loads it in the background. Its siblings
    /// become the navigation list.
    pub fn open(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if !self.paths.exists(path) {
            self.signals.error(format!("{} does not exist", path.display()));
            return Err(AppError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let siblings = self.paths.siblings(path);
        self.cursor.seed(siblings, path);
        self.start_load(path.to_path_buf())
    }

    /// Moves to the next or previous image and loads it fresh. Returns the
    /// new active path, or `None` when nothing qualifies.
    pub fn navigate(&mut self, direction: Direction) -> AppResult<Option<PathBuf>> {
        let Some(path) = self
            .cursor
            .advance(direction, self.paths.as_ref())
            .map(Path::to_path_buf)
        else {
            return Ok(None);
        };
        self.start_load(path.clone())?;
        Ok(Some(path))
    }

    /// Re-reads the active file in place. Zoom and pan are kept.
    pub fn reload(&mut self) -> AppResult<bool> {
        let loader = Arc::clone(&self.loader);
        self.submit_active(ContextJob::Reload(loader))
    }

    /// Queues `operation` on the active image. `Ok(false)` when no image is
    /// active.
    pub fn apply(&mut self, operation: Operation) -> AppResult<bool> {
        self.submit_active(ContextJob::Apply(operation))
    }

    pub fn undo(&mut self) -> AppResult<bool> {
        self.submit_active(ContextJob::Undo)
    }

    /// Queues an export of the active image. The format follows the
    /// extension when `format` is `None`.
    pub fn save(
        &mut self,
        path: impl Into<PathBuf>,
        format: Option<ImageFormat>,
    ) -> AppResult<bool> {
        self.submit_active(ContextJob::Save {
            path: path.into(),
            format,
        })
    }

    pub fn metadata(&self) -> AppResult<Option<BTreeMap<String, String>>> {
        match self.active_context() {
            Some(context) => Ok(Some(context.metadata()?)),
            None => Ok(None),
        }
    }

    /// Forgets the image at `path`. Jobs already queued for it still run
    /// against the detached context.
    pub fn close(&mut self, path: &Path) -> bool {
        let Some(index) = self.contexts.iter().position(|(open, _)| open == path) else {
            return false;
        };
        self.contexts.remove(index);
        tracing::info!(path = %path.display(), "closed image");

        if self.active.as_deref() == Some(path) {
            let neighbour = index.min(self.contexts.len().saturating_sub(1));
            self.active = self.contexts.get(neighbour).map(|(open, _)| open.clone());
        }
        self.sync_active_tab();
        self.signals.recompose();
        true
    }

    /// Applies finished background work. Returns how many results were
    /// handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_completion(completion);
            handled += 1;
        }
        handled
    }

    /// Pumps until no background work is outstanding.
    pub fn wait_idle(&mut self, timeout: Duration) -> AppResult<()> {
        let deadline = Instant::now() + timeout;
        self.pump();
        while self.in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(AppError::Timeout {
                    pending: self.in_flight,
                    waited: timeout,
                });
            }
            let wait = ACTION_RESULT_POLL_INTERVAL.min(deadline - now);
            if let Ok(completion) = self.completion_rx.recv_timeout(wait) {
                self.handle_completion(completion);
                self.pump();
            }
        }
        Ok(())
    }

    fn start_load(&mut self, path: PathBuf) -> AppResult<()> {
        self.active = Some(path.clone());
        self.sync_active_tab();
        self.begin_work();

        let loader = Arc::clone(&self.loader);
        let transfer = Arc::clone(&self.transfer);
        let settings = self.settings;
        let worker_path = path.clone();
        let spawned = spawn_worker_action(
            "load-image",
            move || {
                let result = ImageHandle::open(loader.as_ref(), &worker_path, transfer, settings);
                Completion::Loaded {
                    path: worker_path,
                    result,
                }
            },
            self.completion_tx.clone(),
        );
        if let Err(source) = spawned {
            self.finish_work();
            self.signals.error(format!("could not start loading {}", path.display()));
            return Err(AppError::Spawn { path, source });
        }
        tracing::debug!(path = %path.display(), "loading image");
        Ok(())
    }

    fn submit_active(&mut self, job: ContextJob) -> AppResult<bool> {
        let Some(context) = self.active_context() else {
            tracing::debug!(job = %job.label(), "no active image; request ignored");
            return Ok(false);
        };

        let path = context.path().to_path_buf();
        let label = job.label();
        let tx = self.completion_tx.clone();
        let submitted = context.submit(job, {
            let label = label.clone();
            move |result| {
                let _ = tx.send(Completion::Mutation {
                    path,
                    job: label,
                    result,
                });
            }
        });

        match submitted {
            Ok(()) => {
                self.begin_work();
                Ok(true)
            }
            Err(err) => {
                if let ContextError::Queue(QueueError::Full { .. }) = &err {
                    tracing::warn!(job = %label, %err, "mutation queue full; request rejected");
                }
                self.signals.error(format!("{label}: {err}"));
                Err(err.into())
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded { path, result } => match result {
                Ok(handle) => {
                    if let Err(err) = self.initialize_image_specific_states(&path, handle) {
                        tracing::error!(path = %path.display(), ?err, "failed to set up image");
                        self.signals.error(format!("{}: {err}", path.display()));
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to load image");
                    self.signals
                        .error(format!("failed to open {}: {err}", path.display()));
                }
            },
            Completion::Mutation { path, job, result } => match result {
                Ok(MutationOutcome::Reloaded) => {
                    self.sync_active_tab();
                    self.signals.recompose();
                    self.signals.mark_modified(&path);
                }
                Ok(MutationOutcome::Saved(target)) => {
                    self.signals.info(format!("saved {}", target.display()));
                }
                Ok(MutationOutcome::NothingToUndo) => {
                    self.signals.info("nothing to undo");
                }
                Ok(outcome) if outcome.changed() => {
                    self.signals.mark_modified(&path);
                }
                Ok(_) => {}
                Err(err) => {
                    self.signals.error(format!("{job}: {err}"));
                }
            },
        }
        self.finish_work();
    }

    /// Installs a freshly loaded handle: resets the existing context for
    /// `path` (keeping its viewport) or opens a new one.
    fn initialize_image_specific_states(
        &mut self,
        path: &Path,
        handle: ImageHandle,
    ) -> ContextResult<()> {
        let handle = Arc::new(handle);
        match self.context(path) {
            Some(context) => context.reset_states(handle)?,
            None => {
                let context = ImageContext::new(path, handle, self.config.queue_capacity)?;
                self.contexts.push((path.to_path_buf(), Arc::new(context)));
                tracing::info!(path = %path.display(), open = self.contexts.len(), "opened image");
            }
        }

        self.sync_active_tab();
        self.signals.recompose();
        self.signals.mark_modified(path);
        Ok(())
    }

    fn sync_active_tab(&mut self) {
        self.active_tab = self
            .active
            .as_deref()
            .and_then(|active| self.contexts.iter().position(|(open, _)| open == active));
    }

    fn begin_work(&mut self) {
        self.in_flight += 1;
        self.signals.set_busy(true);
    }

    fn finish_work(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            self.signals.set_busy(false);
        }
    }
}
