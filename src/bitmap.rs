use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

// Id 0 is reserved for the transparent placeholder.
const PLACEHOLDER_ID: BitmapId = BitmapId(0);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmapId(u64);

impl BitmapId {
    fn next() -> Self {
        BitmapId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BitmapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Alpha8,
    #[default]
    Rgba8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Alpha8 => 1,
            PixelFormat::Rgba8888 => 4,
        }
    }
}

/// A fixed-size pixel surface.
///
/// Storage is allocated once and never shrunk. A bitmap is not `Clone`: its
/// holder owns the pool slot until the bitmap is moved back by a release.
#[derive(Debug, PartialEq, Eq)]
pub struct Bitmap {
    id: BitmapId,
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Allocates a zeroed bitmap.
    ///
    /// Allocation failure is reported as [`PoolError::OutOfMemory`] rather
    /// than aborting the process.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> PoolResult<Self> {
        let bytes = Self::byte_len(width, height, format)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| PoolError::OutOfMemory { bytes })?;
        pixels.resize(bytes, 0);

        Ok(Bitmap {
            id: BitmapId::next(),
            width,
            height,
            format,
            pixels,
        })
    }

    /// The 1x1 transparent bitmap handed out by a disabled pool. Every
    /// placeholder carries the reserved id 0.
    pub fn transparent() -> Self {
        Bitmap {
            id: PLACEHOLDER_ID,
            width: 1,
            height: 1,
            format: PixelFormat::Alpha8,
            pixels: vec![0],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_ID
    }

    pub(crate) fn byte_len(width: u32, height: u32, format: PixelFormat) -> PoolResult<usize> {
        if width == 0 || height == 0 {
            return Err(PoolError::InvalidDimensions { width, height });
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
            .ok_or(PoolError::InvalidDimensions { width, height })
    }

    pub fn id(&self) -> BitmapId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn matches(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        self.width == width && self.height == height && self.format == format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        Some((y as usize * self.width as usize + x as usize) * bpp)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let start = self.offset(x, y)?;
        Some(&self.pixels[start..start + self.format.bytes_per_pixel()])
    }

    /// Writes one pixel. Returns false if the coordinates are out of bounds
    /// or `value` is not exactly one pixel wide.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: &[u8]) -> bool {
        let bpp = self.format.bytes_per_pixel();
        match self.offset(x, y) {
            Some(start) if value.len() == bpp => {
                self.pixels[start..start + bpp].copy_from_slice(value);
                true
            }
            _ => false,
        }
    }

    pub fn fill(&mut self, value: &[u8]) -> bool {
        if value.len() != self.format.bytes_per_pixel() {
            return false;
        }
        for chunk in self.pixels.chunks_exact_mut(value.len()) {
            chunk.copy_from_slice(value);
        }
        true
    }

    pub fn erase(&mut self) {
        self.pixels.fill(0);
    }

    pub fn is_cleared(&self) -> bool {
        self.pixels.iter().all(|&b| b == 0)
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}
