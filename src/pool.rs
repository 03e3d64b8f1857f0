//! Reusable raster buffers for composite rendering
//!
//! `acquire` hands out a guard that derefs to a zero-cleared `RgbaImage`
//! and gives the buffer back when dropped. The guard borrows the pool, so a
//! buffer can never be used after it has been returned.

use image::RgbaImage;
use std::cell::{Cell, RefCell};
use std::ops::{Deref, DerefMut};

const DEFAULT_CAPACITY: usize = 4;

/// Single-threaded pool of RGBA buffers
#[derive(Debug)]
pub struct RasterPool {
    free: RefCell<Vec<RgbaImage>>,
    capacity: usize,
    allocations: Cell<usize>,
}

impl Default for RasterPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RasterPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool that keeps at most `capacity` idle buffers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: RefCell::new(Vec::with_capacity(capacity)),
            capacity,
            allocations: Cell::new(0),
        }
    }

    /// Borrow a transparent `width` x `height` buffer
    pub fn acquire(&self, width: u32, height: u32) -> PooledRaster<'_> {
        let reused = {
            let mut free = self.free.borrow_mut();
            free.iter()
                .position(|img| img.dimensions() == (width, height))
                .map(|i| free.swap_remove(i))
        };

        let image = match reused {
            Some(mut image) => {
                image.fill(0);
                image
            }
            None => {
                self.allocations.set(self.allocations.get() + 1);
                RgbaImage::new(width, height)
            }
        };

        PooledRaster { pool: self, image }
    }

    fn release(&self, image: RgbaImage) {
        let mut free = self.free.borrow_mut();
        if free.len() < self.capacity {
            free.push(image);
        }
    }

    /// Idle buffers ready for reuse
    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }

    /// Buffers allocated over the pool's lifetime
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }
}

/// A pooled buffer, returned to its pool on drop
#[derive(Debug)]
pub struct PooledRaster<'a> {
    pool: &'a RasterPool,
    image: RgbaImage,
}

impl Deref for PooledRaster<'_> {
    type Target = RgbaImage;

    fn deref(&self) -> &RgbaImage {
        &self.image
    }
}

impl DerefMut for PooledRaster<'_> {
    fn deref_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }
}

impl Drop for PooledRaster<'_> {
    fn drop(&mut self) {
        let image = std::mem::replace(&mut self.image, RgbaImage::new(0, 0));
        self.pool.release(image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_buffers_are_reused() {
        let pool = RasterPool::new();
        {
            let _a = pool.acquire(4, 4);
        }
        assert_eq!(pool.available(), 1);
        {
            let _b = pool.acquire(4, 4);
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.allocations(), 1);
    }

    #[test]
    fn test_reused_buffer_is_cleared() {
        let pool = RasterPool::new();
        {
            let mut dirty = pool.acquire(2, 2);
            dirty.put_pixel(1, 1, Rgba([1, 2, 3, 4]));
        }
        let clean = pool.acquire(2, 2);
        assert!(clean.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_dimension_mismatch_allocates() {
        let pool = RasterPool::new();
        drop(pool.acquire(2, 2));
        let other = pool.acquire(3, 3);
        assert_eq!(other.dimensions(), (3, 3));
        assert_eq!(pool.allocations(), 2);
    }

    #[test]
    fn test_capacity_bounds_idle_buffers() {
        let pool = RasterPool::with_capacity(1);
        let a = pool.acquire(1, 1);
        let b = pool.acquire(1, 1);
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_simultaneous_guards() {
        let pool = RasterPool::new();
        let a = pool.acquire(2, 1);
        let b = pool.acquire(2, 1);
        assert_eq!(a.dimensions(), b.dimensions());
        assert_eq!(pool.allocations(), 2);
    }
}
