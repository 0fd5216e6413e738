//! Boundary to the native image-processing library.
//!
//! The pipeline only schedules and synchronizes calls through [`NativeImage`];
//! the pixel math lives behind it. [`RasterImage`] is the `image`-crate backed
//! implementation used by the application.

mod filters;
mod raster;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::operation::{KernelKind, TransformKind};
use image::ImageFormat;
use thiserror::Error;

pub use raster::{RasterImage, RasterLoader};

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
    #[error("failed to encode {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },
    #[error("cannot infer an output format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
    #[error("output buffer holds {available} bytes, image needs {required}")]
    BufferTooSmall { required: usize, available: usize },
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelDepth {
    Eight,
    Sixteen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Srgb,
    Grayscale,
}

/// One decoded image owned by the native library.
///
/// Implementations are not required to tolerate concurrent access; the
/// pipeline guarantees a single caller at a time.
pub trait NativeImage: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn convert_depth(&mut self, depth: PixelDepth) -> NativeResult<()>;
    fn convert_colorspace(&mut self, colorspace: Colorspace) -> NativeResult<()>;

    fn contrast(&mut self, delta: f32) -> NativeResult<()>;
    fn brightness(&mut self, delta: f32) -> NativeResult<()>;
    fn exposure(&mut self, delta: f32, black_point: f32) -> NativeResult<()>;
    fn hsl_adjust(&mut self, hue: f32, saturation: f32, lightness: f32) -> NativeResult<()>;
    fn kernel(&mut self, kind: KernelKind, radius: u32) -> NativeResult<()>;
    fn transform(&mut self, kind: TransformKind) -> NativeResult<()>;

    fn save(&self, path: &Path, format: Option<ImageFormat>) -> NativeResult<()>;

    /// Bytes needed by [`NativeImage::write_to_buffer`]: tightly packed,
    /// straight-alpha RGBA8.
    fn output_buffer_size(&self) -> usize;
    fn write_to_buffer(&self, buffer: &mut [u8]) -> NativeResult<()>;

    fn exif_metadata(&self) -> BTreeMap<String, String>;

    /// Full deep copy used for snapshots.
    fn clone_image(&self) -> Box<dyn NativeImage>;
}

pub trait ImageLoader: Send + Sync {
    fn load(&self, path: &Path) -> NativeResult<Box<dyn NativeImage>>;
}

pub(crate) fn rgba8_byte_size(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
}
