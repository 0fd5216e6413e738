//! Renderer-owned bitmap that the compositor draws from.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BitmapError {
    #[error("failed to allocate {bytes} bytes of pixel storage")]
    Allocation { bytes: usize },
    #[error("bitmap holds {bitmap} bytes but its descriptor requires {descriptor}")]
    SizeMismatch { bitmap: usize, descriptor: usize },
    #[error("{width}x{height} bitmap does not fit in addressable memory")]
    Overflow { width: u32, height: u32 },
}

pub type BitmapResult<T> = std::result::Result<T, BitmapError>;

/// In-memory pixel layout expected by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    /// Straight alpha, byte order R, G, B, A.
    Rgba8888,
    /// Premultiplied alpha, byte order B, G, R, A (32-bit ARGB on
    /// little-endian hosts).
    #[default]
    Bgra8888Premul,
}

impl PixelLayout {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    /// Reorders straight RGBA8 pixels into this layout. Both slices must
    /// have the same length.
    pub fn encode_from_rgba(self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::Rgba8888 => dst.copy_from_slice(src),
            Self::Bgra8888Premul => {
                for (src_pixel, dst_pixel) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    let [r, g, b, a] = [src_pixel[0], src_pixel[1], src_pixel[2], src_pixel[3]];
                    match a {
                        0 => dst_pixel.copy_from_slice(&[0, 0, 0, 0]),
                        255 => dst_pixel.copy_from_slice(&[b, g, r, 255]),
                        _ => {
                            let alpha = u16::from(a);
                            let premul = |c: u8| ((u16::from(c) * alpha + 127) / 255) as u8;
                            dst_pixel.copy_from_slice(&[premul(b), premul(g), premul(r), a]);
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl ImageInfo {
    pub const fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            layout,
        }
    }

    pub const fn empty(layout: PixelLayout) -> Self {
        Self::new(0, 0, layout)
    }

    pub fn min_row_bytes(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.layout.bytes_per_pixel())
    }

    pub fn compute_byte_size(&self, row_bytes: usize) -> Option<usize> {
        row_bytes.checked_mul(self.height as usize)
    }

    pub fn min_byte_size(&self) -> BitmapResult<usize> {
        self.min_row_bytes()
            .and_then(|row_bytes| self.compute_byte_size(row_bytes))
            .ok_or(BitmapError::Overflow {
                width: self.width,
                height: self.height,
            })
    }
}

#[derive(Debug, Clone)]
pub struct RendererBitmap {
    info: ImageInfo,
    pixels: Vec<u8>,
    allocations: u64,
}

impl RendererBitmap {
    pub fn new(layout: PixelLayout) -> Self {
        Self {
            info: ImageInfo::empty(layout),
            pixels: Vec::new(),
            allocations: 0,
        }
    }

    pub fn info(&self) -> ImageInfo {
        self.info
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn row_bytes(&self) -> usize {
        self.info.min_row_bytes().unwrap_or(0)
    }

    pub fn compute_byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Number of times backing storage has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Replaces the backing storage with a zeroed buffer sized for `info`.
    /// On failure the current storage and descriptor are untouched.
    pub fn alloc_pixels(&mut self, info: ImageInfo) -> BitmapResult<()> {
        let bytes = info.min_byte_size()?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| BitmapError::Allocation { bytes })?;
        pixels.resize(bytes, 0);

        self.pixels = pixels;
        self.info = info;
        self.allocations += 1;
        Ok(())
    }

    /// Adopts `info`, reusing the current storage when its byte size already
    /// matches. Returns whether storage was reallocated.
    pub fn prepare(&mut self, info: ImageInfo, force_realloc: bool) -> BitmapResult<bool> {
        if !force_realloc && info.min_byte_size()? == self.pixels.len() && !self.pixels.is_empty()
        {
            self.info = info;
            return Ok(false);
        }
        self.alloc_pixels(info)?;
        Ok(true)
    }

    pub fn install_pixels(&mut self, bytes: &[u8]) -> BitmapResult<()> {
        let descriptor = self.info.min_byte_size()?;
        if self.compute_byte_size() != descriptor {
            return Err(BitmapError::SizeMismatch {
                bitmap: self.compute_byte_size(),
                descriptor,
            });
        }
        if bytes.len() != descriptor {
            return Err(BitmapError::SizeMismatch {
                bitmap: bytes.len(),
                descriptor,
            });
        }
        self.pixels.copy_from_slice(bytes);
        Ok(())
    }
}
