//! Per-pixel membership masks for layers
//!
//! Packed bitsets over the canvas, one bit per pixel in row-major order.
//! Bits beyond `width * height` in the last word are always zero.

const WORD_BITS: usize = 64;

/// A binary mask with one bit per canvas pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask {
    width: u32,
    height: u32,
    words: Vec<u64>,
}

impl PixelMask {
    /// All-zero mask
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            words: vec![0; len.div_ceil(WORD_BITS)],
        }
    }

    /// All-ones mask
    pub fn full(width: u32, height: u32) -> Self {
        let mut mask = Self::new(width, height);
        mask.fill();
        mask
    }

    /// Mask with the given row-major offsets set
    pub fn from_pixels<I>(width: u32, height: u32, pixels: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut mask = Self::new(width, height);
        for p in pixels {
            mask.set(p);
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels the mask spans
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the mask spans no pixels at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        idx < self.len() && self.words[idx / WORD_BITS] & (1u64 << (idx % WORD_BITS)) != 0
    }

    #[inline]
    pub fn get_xy(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.get(y as usize * self.width as usize + x as usize)
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        if idx < self.len() {
            self.words[idx / WORD_BITS] |= 1u64 << (idx % WORD_BITS);
        }
    }

    /// Set every bit
    pub fn fill(&mut self) {
        self.words.fill(u64::MAX);
        let tail = self.len() % WORD_BITS;
        if tail != 0
            && let Some(last) = self.words.last_mut()
        {
            *last = (1u64 << tail) - 1;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.count_ones() == self.len()
    }

    /// In-place bitwise OR; both masks must share dimensions
    pub fn union_with(&mut self, other: &PixelMask) {
        debug_assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "mask dimensions differ"
        );
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    pub fn union(&self, other: &PixelMask) -> PixelMask {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// True when every bit set here is also set in `other`
    pub fn is_subset_of(&self, other: &PixelMask) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & !b == 0)
    }

    /// Percentage of pixels set, in [0, 100]
    pub fn coverage_percent(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        100.0 * self.count_ones() as f64 / self.len() as f64
    }

    /// Offsets of set bits in ascending order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(wi * WORD_BITS + tz)
            })
        })
    }
}
