//! Packed collision bitmasks

/// Width of one mask word in pixels
const WORD_BITS: usize = 64;

/// Row-major opaque-pixel bitmap, one bit per pixel.
///
/// Each row takes `width / 64 + 1` words; bit `x % 64` of word
/// `y * words_per_row + x / 64` is pixel `(x, y)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMask {
    width: usize,
    height: usize,
    words_per_row: usize,
    words: Vec<u64>,
}

impl BitMask {
    pub fn new(width: usize, height: usize) -> Self {
        let words_per_row = width / WORD_BITS + 1;
        Self {
            width,
            height,
            words_per_row,
            words: vec![0; words_per_row * height],
        }
    }

    /// Mask with every pixel opaque
    pub fn filled(width: usize, height: usize) -> Self {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                mask.set(x, y);
            }
        }
        mask
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn set(&mut self, x: usize, y: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y * self.words_per_row + x / WORD_BITS;
        self.words[index] |= 1u64 << (x % WORD_BITS);
    }

    /// Opaque test; anything outside the frame is transparent
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return false;
        }
        let word = self.words[y * self.words_per_row + x / WORD_BITS];
        (word >> (x % WORD_BITS)) & 1 == 1
    }

    pub fn count_opaque(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }
}

/// 8-bit alpha plane of a sprite sheet
#[derive(Debug, Clone)]
pub struct AlphaSheet {
    pub width: usize,
    pub height: usize,
    pub alpha: Vec<u8>,
}

impl AlphaSheet {
    pub fn new(width: usize, height: usize, alpha: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || alpha.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            alpha,
        })
    }

    #[inline]
    pub fn alpha_at(&self, x: usize, y: usize) -> u8 {
        self.alpha[y * self.width + x]
    }

    /// Nearest-neighbour resample to `width x height`
    pub fn resize_nearest(&self, width: usize, height: usize) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut alpha = Vec::with_capacity(width * height);
        for y in 0..height {
            let src_y = y * self.height / height;
            for x in 0..width {
                let src_x = x * self.width / width;
                alpha.push(self.alpha_at(src_x, src_y));
            }
        }
        Self {
            width,
            height,
            alpha,
        }
    }
}

/// Union of opaque character pixels across every sheet seen so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilhouetteBox {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
    empty: bool,
}

impl Default for SilhouetteBox {
    fn default() -> Self {
        Self {
            min_x: usize::MAX,
            min_y: usize::MAX,
            max_x: 0,
            max_y: 0,
            empty: true,
        }
    }
}

impl SilhouetteBox {
    fn include(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.empty = false;
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// `(x, y, width, height)`, all zero when nothing was opaque
    pub fn rect(&self) -> (u32, u32, u32, u32) {
        if self.empty {
            return (0, 0, 0, 0);
        }
        (
            self.min_x as u32,
            self.min_y as u32,
            (self.max_x - self.min_x + 1) as u32,
            (self.max_y - self.min_y + 1) as u32,
        )
    }

    /// Smaller of the two transparent side margins inside a frame
    pub fn x_boundary(&self, frame_width: u32) -> u32 {
        let (x, _, w, _) = self.rect();
        let right = frame_width.saturating_sub(x + w);
        x.min(right)
    }
}

/// Build the whole-animation mask of a horizontal strip of `frame_count` frames.
///
/// The sheet is first resampled to `frame_width * frame_count x frame_height`.
/// A pixel is opaque if any frame has alpha > 0 there.
pub fn build_mask(
    sheet: &AlphaSheet,
    frame_count: usize,
    frame_width: usize,
    frame_height: usize,
    mut silhouette: Option<&mut SilhouetteBox>,
) -> BitMask {
    let frame_count = frame_count.max(1);
    let sheet = sheet.resize_nearest(frame_width * frame_count, frame_height);
    let mut mask = BitMask::new(frame_width, frame_height);

    for frame in 0..frame_count {
        let offset = frame * frame_width;
        for y in 0..frame_height {
            for x in 0..frame_width {
                if sheet.alpha_at(x + offset, y) > 0 {
                    mask.set(x, y);
                    if let Some(silhouette) = silhouette.as_deref_mut() {
                        silhouette.include(x, y);
                    }
                }
            }
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_layout_uses_one_spare_word() {
        let mask = BitMask::new(64, 3);
        assert_eq!(mask.words().len(), 6);
        let mask = BitMask::new(100, 2);
        assert_eq!(mask.words().len(), 4);
    }

    #[test]
    fn set_and_get_address_the_packed_bit() {
        let mut mask = BitMask::new(130, 4);
        mask.set(129, 3);
        mask.set(0, 0);
        assert!(mask.get(129, 3));
        assert!(mask.get(0, 0));
        assert!(!mask.get(128, 3));
        // words_per_row = 3, word 3*3 + 2 = 11, bit 1
        assert_eq!(mask.words()[11], 0b10);
        assert_eq!(mask.count_opaque(), 2);
    }

    #[test]
    fn out_of_frame_is_transparent() {
        let mask = BitMask::filled(10, 10);
        assert!(mask.get(9, 9));
        assert!(!mask.get(-1, 0));
        assert!(!mask.get(0, -1));
        assert!(!mask.get(10, 0));
        assert!(!mask.get(0, 10));
    }

    #[test]
    fn mask_is_union_of_frames() {
        // Two 2x1 frames: first frame opaque on the left, second on the right
        let sheet = AlphaSheet::new(4, 1, vec![255, 0, 0, 9]).unwrap();
        let mut silhouette = SilhouetteBox::default();
        let mask = build_mask(&sheet, 2, 2, 1, Some(&mut silhouette));
        assert!(mask.get(0, 0));
        assert!(mask.get(1, 0));
        assert_eq!(silhouette.rect(), (0, 0, 2, 1));
    }

    #[test]
    fn sheet_is_resampled_to_frame_size() {
        // One 2x2 frame scaled up to 4x4
        let sheet = AlphaSheet::new(2, 2, vec![0, 1, 0, 0]).unwrap();
        let mask = build_mask(&sheet, 1, 4, 4, None);
        assert!(mask.get(2, 0));
        assert!(mask.get(3, 1));
        assert!(!mask.get(1, 0));
        assert!(!mask.get(2, 2));
        assert_eq!(mask.count_opaque(), 4);
    }

    #[test]
    fn x_boundary_is_smaller_side_margin() {
        let sheet = AlphaSheet::new(10, 2, {
            let mut alpha = vec![0; 20];
            alpha[3] = 255;
            alpha[10 + 7] = 255;
            alpha
        })
        .unwrap();
        let mut silhouette = SilhouetteBox::default();
        build_mask(&sheet, 1, 10, 2, Some(&mut silhouette));
        assert_eq!(silhouette.rect(), (3, 0, 5, 2));
        // left margin 3, right margin 2
        assert_eq!(silhouette.x_boundary(10), 2);
    }

    #[test]
    fn mismatched_alpha_length_is_rejected() {
        assert!(AlphaSheet::new(2, 2, vec![0; 3]).is_none());
        assert!(AlphaSheet::new(0, 2, vec![]).is_none());
    }
}
