//! Process-wide staging memory used to move pixels from native images into
//! renderer bitmaps.
//!
//! One [`TransferBuffer`] is shared by every open image so that peak memory
//! is bounded by the largest image marshaled, not by the number of images.

use std::sync::{Mutex, MutexGuard};

use crate::native::{NativeError, NativeImage};
use crate::render::PixelLayout;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to grow transfer buffer to {bytes} bytes")]
    Allocation { bytes: usize },
    #[error("native write into transfer buffer failed: {0}")]
    Native(#[from] NativeError),
    #[error("transfer buffer lock poisoned")]
    LockPoisoned,
}

pub type TransferResult<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Default)]
struct TransferRegions {
    /// Written by the native library.
    boundary: Vec<u8>,
    /// Renderer-ordered copy handed to bitmaps.
    host: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct TransferBuffer {
    regions: Mutex<TransferRegions>,
}

impl TransferBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> TransferResult<Self> {
        let buffer = Self::new();
        buffer.lock()?.ensure_capacity(bytes)?;
        Ok(buffer)
    }

    pub fn lock(&self) -> TransferResult<TransferGuard<'_>> {
        let regions = self
            .regions
            .lock()
            .map_err(|_| TransferError::LockPoisoned)?;
        Ok(TransferGuard { regions })
    }

    pub fn capacity(&self) -> TransferResult<usize> {
        Ok(self.lock()?.capacity())
    }
}

/// Exclusive access to the shared regions. Capacity changes and marshaling
/// are only reachable through this guard.
pub struct TransferGuard<'a> {
    regions: MutexGuard<'a, TransferRegions>,
}

impl TransferGuard<'_> {
    pub fn capacity(&self) -> usize {
        self.regions.boundary.len()
    }

    /// Grows both regions to at least `bytes`. Never shrinks.
    pub fn ensure_capacity(&mut self, bytes: usize) -> TransferResult<()> {
        let current = self.capacity();
        if bytes <= current {
            return Ok(());
        }

        let additional = bytes - current;
        let regions = &mut *self.regions;
        regions
            .boundary
            .try_reserve_exact(additional)
            .map_err(|_| TransferError::Allocation { bytes })?;
        regions
            .host
            .try_reserve_exact(additional)
            .map_err(|_| TransferError::Allocation { bytes })?;
        regions.boundary.resize(bytes, 0);
        regions.host.resize(bytes, 0);

        tracing::debug!(bytes, "grew transfer buffer");
        Ok(())
    }

    /// Writes `image` into the boundary region and returns its pixels in
    /// `layout` order, sized exactly to the image.
    pub fn marshal(
        &mut self,
        image: &dyn NativeImage,
        layout: PixelLayout,
    ) -> TransferResult<&[u8]> {
        let size = image.output_buffer_size();
        self.ensure_capacity(size)?;

        let regions = &mut *self.regions;
        image.write_to_buffer(&mut regions.boundary[..size])?;
        layout.encode_from_rgba(&regions.boundary[..size], &mut regions.host[..size]);
        Ok(&regions.host[..size])
    }
}
