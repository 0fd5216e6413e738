//! One native image plus the renderer bitmap mirroring it.
//!
//! Two locks guard a handle. The mutation lock (`native`) is held for the
//! whole of an operation: native call, marshal, install. The presentation
//! lock (`bitmap`) is only taken for the final install and by readers, so
//! pan and zoom keep drawing while a slow filter runs.
//!
//! Lock order: mutation, then the shared transfer buffer, then presentation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use image::ImageFormat;
use thiserror::Error;

use crate::config::{AdjustmentEpsilon, PipelineConfig};
use crate::native::{Colorspace, ImageLoader, NativeError, NativeImage, PixelDepth};
use crate::operation::{AdjustmentKind, AdjustmentValues, KernelKind, TransformKind};
use crate::render::{BitmapError, ImageInfo, PixelLayout, RendererBitmap};
use crate::transfer::{TransferBuffer, TransferError};

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("no image is loaded")]
    NotLoaded,
    #[error(transparent)]
    Native(#[from] NativeError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
    #[error("{lock} lock poisoned")]
    LockPoisoned { lock: &'static str },
    /// The native image changed but its bitmap could not be refreshed.
    #[error("image changed but the bitmap was not refreshed: {0}")]
    Unpresented(#[source] Box<HandleError>),
}

impl HandleError {
    /// Allocation failures and broken invariants abort the operation loudly;
    /// everything else is reported to the user and editing continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotLoaded | Self::Native(_) | Self::Transfer(TransferError::Native(_)) => false,
            Self::Transfer(_) | Self::Bitmap(_) | Self::LockPoisoned { .. } => true,
            Self::Unpresented(inner) => inner.is_fatal(),
        }
    }

    /// Whether the native image already carries the requested change.
    pub fn is_unpresented(&self) -> bool {
        matches!(self, Self::Unpresented(_))
    }
}

pub type HandleResult<T> = std::result::Result<T, HandleError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleSettings {
    pub layout: PixelLayout,
    pub epsilon: AdjustmentEpsilon,
    pub black_point: f32,
}

impl From<&PipelineConfig> for HandleSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            layout: config.renderer_layout,
            epsilon: config.epsilon,
            black_point: config.exposure_black_point,
        }
    }
}

impl Default for HandleSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustOutcome {
    /// Delta within epsilon; nothing ran.
    Skipped,
    Applied { delta: f32 },
}

struct NativeSlot {
    image: Option<Box<dyn NativeImage>>,
    applied: AdjustmentValues,
}

pub struct ImageHandle {
    native: Mutex<NativeSlot>,
    bitmap: RwLock<RendererBitmap>,
    version: AtomicU64,
    transfer: Arc<TransferBuffer>,
    settings: HandleSettings,
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle")
            .field("version", &self.version())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ImageHandle {
    pub fn empty(transfer: Arc<TransferBuffer>, settings: HandleSettings) -> Self {
        Self {
            native: Mutex::new(NativeSlot {
                image: None,
                applied: AdjustmentValues::default(),
            }),
            bitmap: RwLock::new(RendererBitmap::new(settings.layout)),
            version: AtomicU64::new(0),
            transfer,
            settings,
        }
    }

    pub fn open(
        loader: &dyn ImageLoader,
        path: &Path,
        transfer: Arc<TransferBuffer>,
        settings: HandleSettings,
    ) -> HandleResult<Self> {
        let handle = Self::empty(transfer, settings);
        handle.load_file(loader, path)?;
        Ok(handle)
    }

    /// Monotonic counter bumped after every successful install.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> HandleSettings {
        self.settings
    }

    pub fn is_loaded(&self) -> HandleResult<bool> {
        Ok(self.lock_native()?.image.is_some())
    }

    pub fn dimensions(&self) -> HandleResult<(u32, u32)> {
        let slot = self.lock_native()?;
        let image = slot.image.as_deref().ok_or(HandleError::NotLoaded)?;
        Ok((image.width(), image.height()))
    }

    pub fn applied_values(&self) -> HandleResult<AdjustmentValues> {
        Ok(self.lock_native()?.applied)
    }

    /// Replaces the native image with the decoded contents of `path`. The
    /// bitmap keeps its storage when the new image needs the same number of
    /// bytes. On failure the previous image stays in place.
    pub fn load_file(&self, loader: &dyn ImageLoader, path: &Path) -> HandleResult<()> {
        let mut slot = self.lock_native()?;
        let mut image = loader.load(path)?;
        image.convert_depth(PixelDepth::Eight)?;
        image.convert_colorspace(Colorspace::Srgb)?;
        self.present(&*image, false)?;

        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded image"
        );
        slot.image = Some(image);
        slot.applied = AdjustmentValues::default();
        Ok(())
    }

    /// Applies the change from the last applied value of `kind` to `value`.
    /// `record` runs inside the locked section directly before the native
    /// call and only when the adjustment is not skipped.
    pub fn apply_point_adjustment<R>(
        &self,
        kind: AdjustmentKind,
        value: f32,
        record: R,
    ) -> HandleResult<AdjustOutcome>
    where
        R: FnOnce() -> HandleResult<()>,
    {
        let mut guard = self.lock_native()?;
        let slot = &mut *guard;
        let previous = slot.applied.get(kind);
        let image = slot.image.as_deref_mut().ok_or(HandleError::NotLoaded)?;

        let delta = value - previous;
        if delta.abs() <= self.settings.epsilon.for_kind(kind) {
            tracing::debug!(
                kind = kind.label(),
                previous,
                value,
                "adjustment within epsilon; skipped"
            );
            return Ok(AdjustOutcome::Skipped);
        }

        record()?;
        self.dispatch_adjustment(image, kind, delta)?;
        slot.applied.set(kind, value);
        self.present(image, false)
            .map_err(|err| HandleError::Unpresented(Box::new(err)))?;
        Ok(AdjustOutcome::Applied { delta })
    }

    /// Moves `kind` back to `value` regardless of epsilon. Used when undoing.
    pub fn restore_adjustment(&self, kind: AdjustmentKind, value: f32) -> HandleResult<()> {
        let mut guard = self.lock_native()?;
        let slot = &mut *guard;
        let delta = value - slot.applied.get(kind);
        let image = slot.image.as_deref_mut().ok_or(HandleError::NotLoaded)?;
        if delta == 0.0 {
            return Ok(());
        }
        self.dispatch_adjustment(image, kind, delta)?;
        slot.applied.set(kind, value);
        self.present(image, false)
            .map_err(|err| HandleError::Unpresented(Box::new(err)))
    }

    pub fn apply_kernel_operation(&self, kind: KernelKind, radius: u32) -> HandleResult<()> {
        let mut slot = self.lock_native()?;
        let image = slot.image.as_deref_mut().ok_or(HandleError::NotLoaded)?;
        tracing::debug!(kind = kind.label(), radius, "dispatching kernel operation");
        image.kernel(kind, radius)?;
        self.present(image, false)
    }

    pub fn apply_geometric_transform(&self, kind: TransformKind) -> HandleResult<()> {
        let mut slot = self.lock_native()?;
        let image = slot.image.as_deref_mut().ok_or(HandleError::NotLoaded)?;
        tracing::debug!(kind = kind.label(), "dispatching geometric transform");
        image.transform(kind)?;
        self.present(image, true)
    }

    pub fn save(&self, path: &Path, format: Option<ImageFormat>) -> HandleResult<()> {
        let slot = self.lock_native()?;
        let image = slot.image.as_deref().ok_or(HandleError::NotLoaded)?;
        image.save(path, format)?;
        tracing::info!(path = %path.display(), ?format, "saved image");
        Ok(())
    }

    pub fn metadata(&self) -> HandleResult<BTreeMap<String, String>> {
        let slot = self.lock_native()?;
        let image = slot.image.as_deref().ok_or(HandleError::NotLoaded)?;
        Ok(image.exif_metadata())
    }

    /// Read access to the renderer bitmap. Blocks only while an install is
    /// in progress, never for the duration of a native operation.
    pub fn current_view(&self) -> HandleResult<RwLockReadGuard<'_, RendererBitmap>> {
        self.bitmap.read().map_err(|_| HandleError::LockPoisoned {
            lock: "presentation",
        })
    }

    /// Deep copy of the native image and bitmap, used as an undo snapshot.
    pub fn duplicate(&self) -> HandleResult<Self> {
        let slot = self.lock_native()?;
        let image = slot.image.as_deref().ok_or(HandleError::NotLoaded)?;
        let copy = image.clone_image();

        let mut bitmap = RendererBitmap::new(self.settings.layout);
        {
            let current = self.current_view()?;
            bitmap.alloc_pixels(current.info())?;
            bitmap.install_pixels(current.pixels())?;
        }

        Ok(Self {
            native: Mutex::new(NativeSlot {
                image: Some(copy),
                applied: slot.applied,
            }),
            bitmap: RwLock::new(bitmap),
            version: AtomicU64::new(self.version()),
            transfer: Arc::clone(&self.transfer),
            settings: self.settings,
        })
    }

    fn lock_native(&self) -> HandleResult<MutexGuard<'_, NativeSlot>> {
        self.native
            .lock()
            .map_err(|_| HandleError::LockPoisoned { lock: "mutation" })
    }

    fn dispatch_adjustment(
        &self,
        image: &mut dyn NativeImage,
        kind: AdjustmentKind,
        delta: f32,
    ) -> HandleResult<()> {
        tracing::debug!(kind = kind.label(), delta, "dispatching point adjustment");
        match kind {
            AdjustmentKind::Contrast => image.contrast(delta)?,
            AdjustmentKind::Brightness => image.brightness(delta)?,
            AdjustmentKind::Exposure => image.exposure(delta, self.settings.black_point)?,
            AdjustmentKind::Hue => image.hsl_adjust(delta, 0.0, 0.0)?,
            AdjustmentKind::Saturation => image.hsl_adjust(0.0, delta, 0.0)?,
            AdjustmentKind::Lightness => image.hsl_adjust(0.0, 0.0, delta)?,
        }
        Ok(())
    }

    /// Marshals `image` through the shared transfer buffer and installs the
    /// result. Caller must hold the mutation lock.
    fn present(&self, image: &dyn NativeImage, force_realloc: bool) -> HandleResult<()> {
        let info = ImageInfo::new(image.width(), image.height(), self.settings.layout);
        let expected = info.min_byte_size()?;
        let mut transfer = self.transfer.lock()?;
        let bytes = transfer.marshal(image, self.settings.layout)?;
        if bytes.len() != expected {
            tracing::error!(bytes = bytes.len(), ?info, "marshaled size does not match image");
            return Err(BitmapError::SizeMismatch {
                bitmap: bytes.len(),
                descriptor: expected,
            }
            .into());
        }

        let mut bitmap = self.bitmap.write().map_err(|_| HandleError::LockPoisoned {
            lock: "presentation",
        })?;
        bitmap.prepare(info, force_realloc)?;
        if let Err(err) = bitmap.install_pixels(bytes) {
            tracing::error!(?err, ?info, "bitmap install precondition violated");
            return Err(err.into());
        }
        drop(bitmap);
        drop(transfer);

        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(version, width = info.width, height = info.height, "installed bitmap");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeImage, FakeLoader};
    use std::path::PathBuf;
    use std::thread;
    use std::time::{Duration, Instant};

    fn rgba_settings() -> HandleSettings {
        HandleSettings {
            layout: PixelLayout::Rgba8888,
            ..HandleSettings::default()
        }
    }

    fn loaded(image: FakeImage) -> ImageHandle {
        let loader = FakeLoader::default().with("/img/a.png", image);
        ImageHandle::open(
            &loader,
            Path::new("/img/a.png"),
            Arc::new(TransferBuffer::new()),
            rgba_settings(),
        )
        .expect("fake image loads")
    }

    fn noop_record() -> HandleResult<()> {
        Ok(())
    }

    #[test]
    fn load_normalizes_and_installs_pixels() {
        let image = FakeImage::solid(2, 2, [10, 20, 30, 255]);
        let probe = image.probe();
        let handle = loaded(image);

        assert_eq!(handle.version(), 1);
        assert_eq!(handle.dimensions().expect("dimensions"), (2, 2));
        let view = handle.current_view().expect("view");
        assert_eq!(&view.pixels()[..4], &[10, 20, 30, 255]);
        assert!(probe.calls().contains(&"convert_depth(Eight)".to_string()));
        assert!(probe.calls().contains(&"convert_colorspace(Srgb)".to_string()));
    }

    #[test]
    fn reload_reuses_bitmap_storage_when_byte_size_is_unchanged() {
        let loader = FakeLoader::default()
            .with("/img/wide.png", FakeImage::solid(4, 2, [1, 1, 1, 255]))
            .with("/img/tall.png", FakeImage::solid(2, 4, [2, 2, 2, 255]))
            .with("/img/square.png", FakeImage::solid(3, 3, [3, 3, 3, 255]));
        let handle = ImageHandle::open(
            &loader,
            Path::new("/img/wide.png"),
            Arc::new(TransferBuffer::new()),
            rgba_settings(),
        )
        .expect("open");

        handle
            .load_file(&loader, Path::new("/img/tall.png"))
            .expect("same size");
        assert_eq!(handle.current_view().expect("view").allocations(), 1);
        assert_eq!(handle.current_view().expect("view").info().height, 4);

        handle
            .load_file(&loader, Path::new("/img/square.png"))
            .expect("different size");
        assert_eq!(handle.current_view().expect("view").allocations(), 2);
    }

    #[test]
    fn failed_load_keeps_previous_image() {
        let loader = FakeLoader::default().with("/img/a.png", FakeImage::solid(2, 2, [5, 5, 5, 255]));
        let handle = ImageHandle::open(
            &loader,
            Path::new("/img/a.png"),
            Arc::new(TransferBuffer::new()),
            rgba_settings(),
        )
        .expect("open");

        let err = handle
            .load_file(&loader, &PathBuf::from("/img/missing.png"))
            .expect_err("missing image");
        assert!(matches!(err, HandleError::Native(NativeError::Decode { .. })));
        assert!(!err.is_fatal());
        assert_eq!(handle.dimensions().expect("still loaded"), (2, 2));
        assert_eq!(handle.version(), 1);
    }

    #[test]
    fn adjustment_within_epsilon_is_a_noop() {
        let image = FakeImage::solid(1, 1, [0, 0, 0, 255]);
        let probe = image.probe();
        let handle = loaded(image);
        let mut recorded = 0;

        let outcome = handle
            .apply_point_adjustment(AdjustmentKind::Contrast, 0.001, || {
                recorded += 1;
                Ok(())
            })
            .expect("skip");
        assert_eq!(outcome, AdjustOutcome::Skipped);
        assert_eq!(recorded, 0);
        assert_eq!(probe.count("contrast"), 0);
        assert_eq!(handle.version(), 1);

        let outcome = handle
            .apply_point_adjustment(AdjustmentKind::Contrast, 0.01, || {
                recorded += 1;
                Ok(())
            })
            .expect("apply");
        assert_eq!(outcome, AdjustOutcome::Applied { delta: 0.01 });
        assert_eq!(recorded, 1);
        assert_eq!(probe.calls().last().map(String::as_str), Some("contrast(0.01)#0"));
        assert_eq!(handle.version(), 2);
        assert_eq!(
            handle
                .applied_values()
                .expect("values")
                .get(AdjustmentKind::Contrast),
            0.01
        );
    }

    #[test]
    fn jitter_below_epsilon_never_reaches_the_native_library() {
        let image = FakeImage::solid(1, 1, [0, 0, 0, 255]);
        let probe = image.probe();
        let handle = loaded(image);

        for value in [0.001, 0.002, 0.003, -0.002, 0.0] {
            let outcome = handle
                .apply_point_adjustment(AdjustmentKind::Brightness, value, noop_record)
                .expect("adjust");
            assert_eq!(outcome, AdjustOutcome::Skipped);
        }
        assert_eq!(probe.count("brightness"), 0);
        assert_eq!(handle.version(), 1);
    }

    #[test]
    fn adjustments_apply_deltas_not_absolute_values() {
        let image = FakeImage::solid(1, 1, [0, 0, 0, 255]);
        let probe = image.probe();
        let handle = loaded(image);

        handle
            .apply_point_adjustment(AdjustmentKind::Exposure, 0.5, noop_record)
            .expect("first");
        handle
            .apply_point_adjustment(AdjustmentKind::Exposure, 0.75, noop_record)
            .expect("second");
        let calls = probe.calls();
        assert_eq!(calls[calls.len() - 2], "exposure(0.5,0)#0");
        assert_eq!(calls[calls.len() - 1], "exposure(0.25,0)#1");
    }

    #[test]
    fn kernel_operations_always_execute() {
        let image = FakeImage::solid(2, 2, [0, 0, 0, 255]);
        let probe = image.probe();
        let handle = loaded(image);

        handle
            .apply_kernel_operation(KernelKind::BoxBlur, 5)
            .expect("first blur");
        handle
            .apply_kernel_operation(KernelKind::BoxBlur, 5)
            .expect("second blur");
        assert_eq!(probe.count("box-blur(5)"), 2);
        assert_eq!(handle.version(), 3);
        assert_eq!(handle.current_view().expect("view").allocations(), 1);
    }

    #[test]
    fn transforms_force_bitmap_reallocation() {
        let handle = loaded(FakeImage::solid(3, 1, [0, 0, 0, 255]));
        handle
            .apply_geometric_transform(TransformKind::Transpose)
            .expect("transpose");

        let view = handle.current_view().expect("view");
        assert_eq!((view.info().width, view.info().height), (1, 3));
        assert_eq!(view.allocations(), 2);
    }

    #[test]
    fn native_failure_leaves_bitmap_and_version_untouched() {
        let handle = loaded(FakeImage::solid(1, 1, [9, 9, 9, 255]).failing_operations());
        let err = handle
            .apply_kernel_operation(KernelKind::MedianBlur, 2)
            .expect_err("fake refuses");
        assert!(!err.is_fatal());
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.current_view().expect("view").pixels(), &[9, 9, 9, 255]);
    }

    #[test]
    fn adjustment_that_cannot_be_presented_still_counts_as_applied() {
        let image = FakeImage::solid(1, 1, [0, 0, 0, 255]).failing_writes_after(1);
        let probe = image.probe();
        let handle = loaded(image);

        let err = handle
            .apply_point_adjustment(AdjustmentKind::Contrast, 0.5, noop_record)
            .expect_err("second write refused");
        assert!(err.is_unpresented());
        assert!(!err.is_fatal());
        assert_eq!(
            handle
                .applied_values()
                .expect("values")
                .get(AdjustmentKind::Contrast),
            0.5
        );
        assert_eq!(handle.version(), 1);

        let outcome = handle
            .apply_point_adjustment(AdjustmentKind::Contrast, 0.5, noop_record)
            .expect("same value again");
        assert_eq!(outcome, AdjustOutcome::Skipped);
        assert_eq!(probe.count("contrast"), 1);
    }

    #[test]
    fn transfer_growth_failure_keeps_previous_bitmap() {
        let loader = FakeLoader::default()
            .with("/img/a.png", FakeImage::solid(1, 1, [9, 9, 9, 255]))
            .with(
                "/img/huge.png",
                FakeImage::solid(2, 2, [1, 1, 1, 255]).with_buffer_size(usize::MAX),
            );
        let handle = ImageHandle::open(
            &loader,
            Path::new("/img/a.png"),
            Arc::new(TransferBuffer::new()),
            rgba_settings(),
        )
        .expect("open");

        let err = handle
            .load_file(&loader, Path::new("/img/huge.png"))
            .expect_err("transfer buffer cannot grow");
        assert!(matches!(
            err,
            HandleError::Transfer(TransferError::Allocation { .. })
        ));
        assert!(err.is_fatal());
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.dimensions().expect("dimensions"), (1, 1));
        let view = handle.current_view().expect("view");
        assert_eq!(view.pixels(), &[9, 9, 9, 255]);
        assert_eq!(view.allocations(), 1);
    }

    #[test]
    fn mismatched_marshal_size_is_rejected_before_reallocating() {
        let loader = FakeLoader::default()
            .with("/img/a.png", FakeImage::solid(1, 1, [9, 9, 9, 255]))
            .with(
                "/img/short.png",
                FakeImage::solid(2, 2, [1, 1, 1, 255]).with_buffer_size(4),
            );
        let handle = ImageHandle::open(
            &loader,
            Path::new("/img/a.png"),
            Arc::new(TransferBuffer::new()),
            rgba_settings(),
        )
        .expect("open");

        let err = handle
            .load_file(&loader, Path::new("/img/short.png"))
            .expect_err("size mismatch");
        assert!(matches!(err, HandleError::Bitmap(BitmapError::SizeMismatch { .. })));
        let view = handle.current_view().expect("view");
        assert_eq!((view.info().width, view.info().height), (1, 1));
        assert_eq!(view.pixels(), &[9, 9, 9, 255]);
        assert_eq!(view.allocations(), 1);
    }

    #[test]
    fn failing_record_aborts_before_native_call() {
        let image = FakeImage::solid(1, 1, [0, 0, 0, 255]);
        let probe = image.probe();
        let handle = loaded(image);
        let err = handle
            .apply_point_adjustment(AdjustmentKind::Hue, 0.5, || {
                Err(HandleError::LockPoisoned { lock: "history" })
            })
            .expect_err("record failed");
        assert!(err.is_fatal());
        assert_eq!(probe.count("hsl"), 0);
    }

    #[test]
    fn empty_handle_reports_not_loaded() {
        let handle = ImageHandle::empty(Arc::new(TransferBuffer::new()), rgba_settings());
        assert!(!handle.is_loaded().expect("lock"));
        assert!(matches!(
            handle.apply_kernel_operation(KernelKind::BoxBlur, 1),
            Err(HandleError::NotLoaded)
        ));
        assert!(matches!(
            handle.apply_point_adjustment(AdjustmentKind::Contrast, 0.5, noop_record),
            Err(HandleError::NotLoaded)
        ));
    }

    #[test]
    fn duplicate_is_independent_of_the_source() {
        let handle = loaded(FakeImage::solid(1, 1, [1, 2, 3, 255]));
        let copy = handle.duplicate().expect("duplicate");
        copy.apply_kernel_operation(KernelKind::GaussianBlur, 1)
            .expect("mutate copy");

        assert_eq!(handle.current_view().expect("view").pixels(), &[1, 2, 3, 255]);
        assert_eq!(copy.current_view().expect("view").pixels(), &[2, 2, 3, 255]);
    }

    #[test]
    fn concurrent_mutations_on_one_handle_are_serialized() {
        let image = FakeImage::solid(2, 2, [0, 0, 0, 255]).with_delay(Duration::from_millis(40));
        let probe = image.probe();
        let handle = Arc::new(loaded(image));

        let workers: Vec<_> = [KernelKind::BoxBlur, KernelKind::MedianBlur]
            .into_iter()
            .map(|kind| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || handle.apply_kernel_operation(kind, 1))
            })
            .collect();
        for worker in workers {
            worker.join().expect("joined").expect("kernel applied");
        }

        assert_eq!(probe.overlaps(), 0);
        let generations: Vec<String> = probe
            .calls()
            .into_iter()
            .filter(|call| call.contains("blur"))
            .map(|call| call.rsplit('#').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(generations, vec!["0", "1"]);
        assert_eq!(handle.current_view().expect("view").pixels()[0], 2);
    }

    #[test]
    fn presentation_reads_do_not_wait_for_native_work() {
        let image = FakeImage::solid(2, 2, [0, 0, 0, 255]).with_delay(Duration::from_millis(400));
        let handle = Arc::new(loaded(image));

        let worker = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || handle.apply_kernel_operation(KernelKind::BilateralBlur, 2))
        };
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let first_byte = handle.current_view().expect("view").pixels()[0];
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(first_byte, 0);

        worker.join().expect("joined").expect("kernel applied");
        assert_eq!(handle.current_view().expect("view").pixels()[0], 1);
    }
}
