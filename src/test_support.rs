//! Scripted native image used by unit tests across the crate.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::ImageFormat;

use crate::native::{
    rgba8_byte_size, Colorspace, ImageLoader, NativeError, NativeImage, NativeResult, PixelDepth,
};
use crate::operation::{KernelKind, TransformKind};

/// Shared record of every native call made by a family of fake images.
#[derive(Debug, Default)]
pub(crate) struct NativeProbe {
    calls: Mutex<Vec<String>>,
    active: AtomicBool,
    overlaps: AtomicUsize,
    writes: AtomicUsize,
}

impl NativeProbe {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("probe lock").clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("probe lock").push(call);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    generation: u64,
    delay: Duration,
    fail_operations: bool,
    panic_operations: bool,
    /// Writes numbered from this one on fail; shared across clones.
    fail_writes_from: Option<usize>,
    buffer_size: Option<usize>,
    probe: Arc<NativeProbe>,
}

impl FakeImage {
    pub(crate) fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(rgba8_byte_size(width, height))
            .collect();
        Self {
            width,
            height,
            pixels,
            generation: 0,
            delay: Duration::ZERO,
            fail_operations: false,
            panic_operations: false,
            fail_writes_from: None,
            buffer_size: None,
            probe: Arc::new(NativeProbe::default()),
        }
    }

    pub(crate) fn with_probe(mut self, probe: &Arc<NativeProbe>) -> Self {
        self.probe = Arc::clone(probe);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing_operations(mut self) -> Self {
        self.fail_operations = true;
        self
    }

    pub(crate) fn panicking_operations(mut self) -> Self {
        self.panic_operations = true;
        self
    }

    pub(crate) fn failing_writes(self) -> Self {
        self.failing_writes_after(0)
    }

    pub(crate) fn failing_writes_after(mut self, successful: usize) -> Self {
        self.fail_writes_from = Some(successful);
        self
    }

    /// Reports `bytes` as the output size regardless of the dimensions.
    pub(crate) fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    pub(crate) fn probe(&self) -> Arc<NativeProbe> {
        Arc::clone(&self.probe)
    }

    fn mutate(&mut self, call: String) -> NativeResult<()> {
        if self.probe.active.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.probe.record(format!("{call}#{}", self.generation));
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        if self.panic_operations {
            self.probe.active.store(false, Ordering::SeqCst);
            panic!("{call} blew up");
        }
        let result = if self.fail_operations {
            Err(NativeError::Operation {
                operation: "fake",
                message: format!("{call} refused"),
            })
        } else {
            for pixel in self.pixels.chunks_exact_mut(4) {
                pixel[0] = pixel[0].wrapping_add(1);
            }
            self.generation += 1;
            Ok(())
        };
        self.probe.active.store(false, Ordering::SeqCst);
        result
    }
}

impl NativeImage for FakeImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn convert_depth(&mut self, depth: PixelDepth) -> NativeResult<()> {
        self.probe.record(format!("convert_depth({depth:?})"));
        Ok(())
    }

    fn convert_colorspace(&mut self, colorspace: Colorspace) -> NativeResult<()> {
        self.probe.record(format!("convert_colorspace({colorspace:?})"));
        Ok(())
    }

    fn contrast(&mut self, delta: f32) -> NativeResult<()> {
        self.mutate(format!("contrast({delta})"))
    }

    fn brightness(&mut self, delta: f32) -> NativeResult<()> {
        self.mutate(format!("brightness({delta})"))
    }

    fn exposure(&mut self, delta: f32, black_point: f32) -> NativeResult<()> {
        self.mutate(format!("exposure({delta},{black_point})"))
    }

    fn hsl_adjust(&mut self, hue: f32, saturation: f32, lightness: f32) -> NativeResult<()> {
        self.mutate(format!("hsl({hue},{saturation},{lightness})"))
    }

    fn kernel(&mut self, kind: KernelKind, radius: u32) -> NativeResult<()> {
        self.mutate(format!("{}({radius})", kind.label()))
    }

    fn transform(&mut self, kind: TransformKind) -> NativeResult<()> {
        self.mutate(kind.label().to_string())?;
        if kind.swaps_dimensions() {
            std::mem::swap(&mut self.width, &mut self.height);
        }
        Ok(())
    }

    fn save(&self, path: &Path, format: Option<ImageFormat>) -> NativeResult<()> {
        self.probe
            .record(format!("save({},{format:?})", path.display()));
        if self.fail_operations {
            return Err(NativeError::Encode {
                path: path.to_path_buf(),
                message: "fake encoder refused".to_string(),
            });
        }
        Ok(())
    }

    fn output_buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(self.pixels.len())
    }

    fn write_to_buffer(&self, buffer: &mut [u8]) -> NativeResult<()> {
        let index = self.probe.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes_from.is_some_and(|from| index >= from) {
            return Err(NativeError::Operation {
                operation: "write_to_buffer",
                message: "fake write refused".to_string(),
            });
        }
        let len = buffer.len().min(self.pixels.len());
        buffer[..len].copy_from_slice(&self.pixels[..len]);
        Ok(())
    }

    fn exif_metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("ImageWidth".to_string(), self.width.to_string()),
            ("ImageHeight".to_string(), self.height.to_string()),
        ])
    }

    fn clone_image(&self) -> Box<dyn NativeImage> {
        self.probe.record("clone".to_string());
        Box::new(self.clone())
    }
}

/// Serves fake images keyed by path; unknown paths fail to decode.
#[derive(Debug, Default)]
pub(crate) struct FakeLoader {
    images: Mutex<HashMap<PathBuf, FakeImage>>,
}

impl FakeLoader {
    pub(crate) fn with(self, path: impl Into<PathBuf>, image: FakeImage) -> Self {
        self.insert(path, image);
        self
    }

    pub(crate) fn insert(&self, path: impl Into<PathBuf>, image: FakeImage) {
        self.images
            .lock()
            .expect("loader lock")
            .insert(path.into(), image);
    }
}

impl ImageLoader for FakeLoader {
    fn load(&self, path: &Path) -> NativeResult<Box<dyn NativeImage>> {
        let images = self.images.lock().expect("loader lock");
        let image = images.get(path).ok_or_else(|| NativeError::Decode {
            path: path.to_path_buf(),
            message: "no such fake image".to_string(),
        })?;
        image.probe.record(format!("load({})", path.display()));
        Ok(Box::new(image.clone()))
    }
}
