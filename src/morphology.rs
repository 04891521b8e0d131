// morphology.rs - Rectangular dilation of binary / grayscale masks.
//
// A rectangular max filter is separable, so a kw×kh dilation runs as a
// horizontal max over kw taps followed by a vertical max over kh taps.
//
// The anchor follows the usual centred convention (kw/2, kh/2): for an
// even size the window reaches one pixel further toward the top-left:
//
//   kw = 3 → taps x-1 ..= x+1
//   kw = 20 → taps x-10 ..= x+9
//
// Taps that fall outside the image are ignored (equivalent to padding
// with the minimum value), so dilation never invents edges at borders.

use crate::image::Image;

/// Reusable rectangular dilation.
#[derive(Debug)]
pub struct Dilation {
    kw: usize,
    kh: usize,
    tmp: Image<u8>,
}

impl Dilation {
    /// # Panics
    /// Panics if either side is zero.
    pub fn new(kw: usize, kh: usize) -> Self {
        assert!(kw > 0 && kh > 0, "structuring element must be at least 1×1 (got {kw}×{kh})");
        Dilation {
            kw,
            kh,
            tmp: Image::default(),
        }
    }

    /// Square structuring element.
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn size(&self) -> (usize, usize) {
        (self.kw, self.kh)
    }

    /// Dilate `src` into `dst` (resized to match).
    pub fn apply(&mut self, src: &Image<u8>, dst: &mut Image<u8>) {
        let (w, h) = (src.width(), src.height());
        if self.kw == 1 && self.kh == 1 {
            dst.reset(w, h, 0);
            for y in 0..h {
                dst.row_mut(y).copy_from_slice(src.row(y));
            }
            return;
        }

        let (ax, ay) = (self.kw / 2, self.kh / 2);

        self.tmp.reset(w, h, 0);
        for y in 0..h {
            let row = src.row(y);
            for (x, out) in self.tmp.row_mut(y).iter_mut().enumerate() {
                let lo = x.saturating_sub(ax);
                let hi = (x + self.kw - ax).min(w);
                *out = row[lo..hi].iter().copied().max().unwrap_or(0);
            }
        }

        dst.reset(w, h, 0);
        for y in 0..h {
            let lo = y.saturating_sub(ay);
            let hi = (y + self.kh - ay).min(h);
            for x in 0..w {
                let mut m = 0u8;
                for sy in lo..hi {
                    m = m.max(self.tmp.get(x, sy));
                }
                dst.set(x, y, m);
            }
        }
    }

    pub fn release(&mut self) {
        self.tmp.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_dot(w: usize, h: usize, x: usize, y: usize) -> Image<u8> {
        let mut img = Image::new(w, h);
        img.set(x, y, 255);
        img
    }

    fn lit(img: &Image<u8>) -> Vec<(usize, usize)> {
        img.pixels().filter(|&(_, _, v)| v != 0).map(|(x, y, _)| (x, y)).collect()
    }

    #[test]
    fn test_identity_for_size_one() {
        let img = Image::from_vec(4, 2, vec![0u8, 7, 0, 255, 1, 0, 0, 3]);
        let mut d = Dilation::square(1);
        let mut out = Image::default();
        d.apply(&img, &mut out);
        assert_eq!(out.as_slice(), img.as_slice());
    }

    #[test]
    fn test_3x3_grows_dot_to_block() {
        let img = single_dot(7, 7, 3, 3);
        let mut d = Dilation::square(3);
        let mut out = Image::default();
        d.apply(&img, &mut out);
        let got = lit(&out);
        assert_eq!(got.len(), 9);
        assert!(got.iter().all(|&(x, y)| (2..=4).contains(&x) && (2..=4).contains(&y)));
    }

    #[test]
    fn test_even_size_anchor() {
        // 4×4 element, anchor (2, 2): a dot at (5,5) covers x,y in 4..=7
        // on the output side (offsets -1..=2 around the dot).
        let img = single_dot(12, 12, 5, 5);
        let mut d = Dilation::square(4);
        let mut out = Image::default();
        d.apply(&img, &mut out);
        let got = lit(&out);
        assert_eq!(got.len(), 16);
        assert!(got.iter().all(|&(x, y)| (4..=7).contains(&x) && (4..=7).contains(&y)));
    }

    #[test]
    fn test_border_taps_ignored() {
        let img = single_dot(5, 5, 0, 0);
        let mut d = Dilation::square(3);
        let mut out = Image::default();
        d.apply(&img, &mut out);
        let got = lit(&out);
        assert_eq!(got, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_band_width_20() {
        // A one-pixel vertical line dilated by 20×20 becomes a 20-wide band.
        let mut img = Image::new(64, 8);
        for y in 0..8 {
            img.set(30, y, 255);
        }
        let mut d = Dilation::square(20);
        let mut out = Image::default();
        d.apply(&img, &mut out);
        for x in 0..64 {
            let expect = if (21..=40).contains(&x) { 255 } else { 0 };
            assert_eq!(out.get(x, 4), expect, "column {x}");
        }
    }

    #[test]
    fn test_zero_area() {
        let img: Image<u8> = Image::new(0, 3);
        let mut d = Dilation::square(20);
        let mut out = Image::new(2, 2);
        d.apply(&img, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    #[should_panic(expected = "at least 1×1")]
    fn test_zero_size_panics() {
        Dilation::new(0, 3);
    }
}
