// canny.rs - Canny edge detector.
//
// Pipeline per frame:
//
//   luma ──Sobel──► dx, dy ──L1──► magnitude
//                                      │
//                         non-maximum suppression (4 sectors)
//                                      │
//              ┌───── m > high ─► STRONG ──┐
//              └─ low < m <= high ► WEAK ──┴─ hysteresis (8-connected) ─► 255 / 0
//
// No pre-blur: the detectors feed raw camera luma, as the preview always
// has. Sector selection uses the tan(22.5°) split on |dx|, |dy| so no
// atan2 is needed:
//
//   |dy| <= |dx|·tan22.5   → gradient ~horizontal → compare left/right
//   |dy| >  |dx|·tan67.5   → gradient ~vertical   → compare up/down
//   otherwise              → diagonal, direction from sign(dx·dy)
//
// Ties are broken toward the earlier pixel (strict > against the
// preceding neighbour, >= against the following one) so a symmetric step
// produces a one-pixel line instead of a two-pixel one.

use crate::gradient::Gradients;
use crate::image::Image;

const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

const NOT_EDGE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Output value for edge pixels.
pub const EDGE: u8 = 255;

/// Canny detector with reusable scratch.
#[derive(Debug)]
pub struct Canny {
    low: f32,
    high: f32,
    grad: Gradients,
    mag: Image<f32>,
    class: Vec<u8>,
    stack: Vec<usize>,
}

impl Canny {
    /// Thresholds are on the L1 gradient magnitude. If `low > high` they
    /// are swapped.
    pub fn new(low: f32, high: f32) -> Self {
        let (low, high) = if low > high { (high, low) } else { (low, high) };
        Canny {
            low,
            high,
            grad: Gradients::new(),
            mag: Image::default(),
            class: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn thresholds(&self) -> (f32, f32) {
        (self.low, self.high)
    }

    /// Write the binary edge map of `src` into `dst` (resized to match).
    pub fn detect(&mut self, src: &Image<u8>, dst: &mut Image<u8>) {
        let (w, h) = (src.width(), src.height());
        dst.reset(w, h, NOT_EDGE);
        if src.is_empty() {
            return;
        }

        self.grad.compute(src);
        self.grad.magnitude_l1(&mut self.mag);
        self.suppress(w, h);
        self.hysteresis(w, h);

        for (out, &c) in dst.as_mut_slice().iter_mut().zip(&self.class) {
            if c == STRONG {
                *out = EDGE;
            }
        }
    }

    /// Release scratch storage. The detector stays usable.
    pub fn release(&mut self) {
        self.grad.release();
        self.mag.release();
        self.class = Vec::new();
        self.stack = Vec::new();
    }

    fn suppress(&mut self, w: usize, h: usize) {
        self.class.clear();
        self.class.resize(w * h, NOT_EDGE);
        self.stack.clear();

        let mag = &self.mag;
        let at = |x: isize, y: isize| -> f32 {
            if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                0.0
            } else {
                mag.get(x as usize, y as usize)
            }
        };

        for y in 0..h {
            for x in 0..w {
                let m = mag.get(x, y);
                if m <= self.low {
                    continue;
                }
                let gx = self.grad.dx.get(x, y);
                let gy = self.grad.dy.get(x, y);
                let (ax, ay) = (gx.abs(), gy.abs());
                let (xi, yi) = (x as isize, y as isize);

                let is_max = if ay <= ax * TAN_22_5 {
                    m > at(xi - 1, yi) && m >= at(xi + 1, yi)
                } else if ay > ax * TAN_67_5 {
                    m > at(xi, yi - 1) && m >= at(xi, yi + 1)
                } else {
                    // Image y points down, so same-sign gradients run along
                    // the main diagonal.
                    let s: isize = if (gx < 0.0) != (gy < 0.0) { -1 } else { 1 };
                    m > at(xi - s, yi - 1) && m > at(xi + s, yi + 1)
                };
                if !is_max {
                    continue;
                }

                let idx = y * w + x;
                if m > self.high {
                    self.class[idx] = STRONG;
                    self.stack.push(idx);
                } else {
                    self.class[idx] = WEAK;
                }
            }
        }
    }

    fn hysteresis(&mut self, w: usize, h: usize) {
        while let Some(idx) = self.stack.pop() {
            let (x, y) = (idx % w, idx / w);
            let (x0, x1) = (x.saturating_sub(1), (x + 1).min(w - 1));
            let (y0, y1) = (y.saturating_sub(1), (y + 1).min(h - 1));
            for ny in y0..=y1 {
                for nx in x0..=x1 {
                    let n = ny * w + nx;
                    if self.class[n] == WEAK {
                        self.class[n] = STRONG;
                        self.stack.push(n);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(img: &Image<u8>, low: f32, high: f32) -> Image<u8> {
        let mut c = Canny::new(low, high);
        let mut out = Image::default();
        c.detect(img, &mut out);
        out
    }

    #[test]
    fn test_constant_image_has_no_edges() {
        let img = Image::from_vec(32, 24, vec![77u8; 32 * 24]);
        let out = edges(&img, 80.0, 90.0);
        assert!(out.pixels().all(|(_, _, v)| v == 0));
    }

    #[test]
    fn test_vertical_step_gives_single_column() {
        let mut img = Image::<u8>::new(20, 12);
        for y in 0..12 {
            for x in 10..20 {
                img.set(x, y, 100);
            }
        }
        let out = edges(&img, 80.0, 90.0);
        for (x, y, v) in out.pixels() {
            let expect = if x == 9 { EDGE } else { 0 };
            assert_eq!(v, expect, "unexpected edge value at ({x}, {y})");
        }
    }

    #[test]
    fn test_weak_step_below_low_threshold() {
        // Step of 15 → magnitude 60, below the low threshold of 80.
        let mut img = Image::<u8>::new(16, 16);
        for y in 0..16 {
            for x in 8..16 {
                img.set(x, y, 15);
            }
        }
        let out = edges(&img, 80.0, 90.0);
        assert!(out.pixels().all(|(_, _, v)| v == 0));
    }

    #[test]
    fn test_hysteresis_keeps_weak_connected_to_strong() {
        // Left half of the step is strong (100), right half weak (22):
        // weak magnitude 88 lies in (80, 90], so it survives only via
        // connection to the strong segment.
        let mut img = Image::<u8>::new(24, 24);
        for y in 12..24 {
            for x in 0..24 {
                img.set(x, y, if x < 12 { 100 } else { 22 });
            }
        }
        let out = edges(&img, 80.0, 90.0);
        assert_eq!(out.get(4, 11), EDGE);
        assert_eq!(out.get(20, 11), EDGE);

        // The weak segment alone does not survive.
        let mut weak_only = Image::<u8>::new(24, 24);
        for y in 12..24 {
            for x in 0..24 {
                weak_only.set(x, y, 22);
            }
        }
        let out = edges(&weak_only, 80.0, 90.0);
        assert!(out.pixels().all(|(_, _, v)| v == 0));
    }

    #[test]
    fn test_swapped_thresholds() {
        let c = Canny::new(90.0, 80.0);
        assert_eq!(c.thresholds(), (80.0, 90.0));
    }

    #[test]
    fn test_zero_area() {
        let img: Image<u8> = Image::new(0, 0);
        let out = edges(&img, 80.0, 90.0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_scratch_reused_across_sizes() {
        let mut c = Canny::new(80.0, 90.0);
        let mut out = Image::default();
        let big = Image::from_vec(40, 30, vec![0u8; 1200]);
        c.detect(&big, &mut out);
        let small = Image::from_vec(5, 4, vec![0u8; 20]);
        c.detect(&small, &mut out);
        assert_eq!((out.width(), out.height()), (5, 4));
        c.release();
        c.detect(&small, &mut out);
        assert_eq!(out.as_slice().len(), 20);
    }
}
