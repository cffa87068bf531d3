use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Decoded ARGB image shared between records, caches and the UI.
///
/// Cloning is cheap; pixel data is reference counted and never mutated.
#[derive(Clone)]
pub struct Image {
    inner: Arc<ImageData>,
}

#[derive(Eq, PartialEq)]
struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Image {
    /// Returns `None` when `pixels` does not hold exactly `width * height` entries.
    pub fn from_argb(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        if pixels.len() != expected {
            return None;
        }
        Some(Self {
            inner: Arc::new(ImageData {
                width,
                height,
                pixels,
            }),
        })
    }

    pub fn solid(width: u32, height: u32, argb: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            inner: Arc::new(ImageData {
                width,
                height,
                pixels: vec![argb; len],
            }),
        }
    }

    pub fn transparent_placeholder() -> Self {
        Self::solid(1, 1, 0x00ff_ffff)
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.inner.pixels
    }

    pub fn same_allocation(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.same_allocation(other) || self.inner == other.inner
    }
}

impl Eq for Image {}

impl Debug for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .finish()
    }
}
