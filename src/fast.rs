// fast.rs - FAST corner detector (Features from Accelerated Segment Test).
//
// Reference: Rosten & Drummond, "Machine learning for high-speed corner
// detection" (ECCV 2006).
//
// For each pixel, sample 16 points on a Bresenham circle of radius 3:
//
//            15  0  1
//         14    .  .   2
//        13  .        .  3
//        12  .   p    .  4
//        11  .        .  5
//         10    .  .   6
//             9  8  7
//
// Each sample is BRIGHTER (> p + t), DARKER (< p - t) or similar. p is a
// corner if >= N contiguous samples (wrapping 15 → 0) are all BRIGHTER or
// all DARKER. Contiguity is tested on a u16 bitmask doubled into a u32 so
// the wrap-around needs no special case.
//
// Corners are emitted in row-major scan order. Pass them through
// `nms::ScoreNms` to keep only local maxima.

use crate::image::Image;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE_OFFSETS: [(isize, isize); 16] = [
    ( 0, -3), ( 1, -3), ( 2, -2), ( 3, -1),
    ( 3,  0), ( 3,  1), ( 2,  2), ( 1,  3),
    ( 0,  3), (-1,  3), (-2,  2), (-3,  1),
    (-3,  0), (-3, -1), (-2, -2), (-1, -3),
];

/// A detected corner in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Column.
    pub x: f32,
    /// Row.
    pub y: f32,
    /// Sum of (|circle[i] - p| - t) over the longest qualifying arc.
    pub score: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Keypoint { x, y, score: 0.0 }
    }
}

/// FAST-N corner detector.
#[derive(Debug, Clone)]
pub struct FastDetector {
    threshold: u8,
    arc_length: usize,
}

impl FastDetector {
    /// # Panics
    /// Panics if `arc_length` is not in 9..=12.
    pub fn new(threshold: u8, arc_length: usize) -> Self {
        assert!(
            (9..=12).contains(&arc_length),
            "arc_length must be 9..=12 (got {arc_length})"
        );
        FastDetector {
            threshold,
            arc_length,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn arc_length(&self) -> usize {
        self.arc_length
    }

    /// All FAST corners of `image`, unsuppressed.
    pub fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        let mut out = Vec::new();
        self.detect_into(image, &mut out);
        out
    }

    /// Like [`detect`](Self::detect), appending to a cleared `out`.
    pub fn detect_into(&self, image: &Image<u8>, out: &mut Vec<Keypoint>) {
        out.clear();
        let (w, h) = (image.width(), image.height());

        // 3-pixel border: the circle must stay inside the image.
        if w <= 6 || h <= 6 {
            return;
        }

        let stride = image.stride() as isize;
        let ring: [isize; 16] = CIRCLE_OFFSETS.map(|(dx, dy)| dy * stride + dx);
        let data = image.as_slice();
        let t = self.threshold as i16;
        // Any arc of >= 9 covers at least 2 of the 4 compass points
        // (3 of them for N = 12).
        let min_compass: u8 = if self.arc_length >= 12 { 3 } else { 2 };

        for y in 3..(h - 3) {
            let row_start = y * image.stride();
            for x in 3..(w - 3) {
                let c = row_start + x;
                let sample = |k: usize| data[(c as isize + ring[k]) as usize] as i16;
                let p = data[c] as i16;

                let compass = [sample(0), sample(4), sample(8), sample(12)];
                let bright = compass.iter().filter(|&&v| v > p + t).count() as u8;
                let dark = compass.iter().filter(|&&v| v < p - t).count() as u8;
                if bright < min_compass && dark < min_compass {
                    continue;
                }

                let mut circle = [0i16; 16];
                for (k, v) in circle.iter_mut().enumerate() {
                    *v = sample(k);
                }

                if let Some(score) = self.corner_score(p, &circle) {
                    out.push(Keypoint {
                        x: x as f32,
                        y: y as f32,
                        score,
                    });
                }
            }
        }
    }

    /// Score of the best qualifying arc, or `None` if `p` is not a corner.
    fn corner_score(&self, p: i16, circle: &[i16; 16]) -> Option<f32> {
        let t = self.threshold as i16;
        let mut bright: u16 = 0;
        let mut dark: u16 = 0;
        for (i, &v) in circle.iter().enumerate() {
            if v - p > t {
                bright |= 1 << i;
            } else if v - p < -t {
                dark |= 1 << i;
            }
        }

        [bright, dark]
            .into_iter()
            .filter(|&mask| has_arc(mask, self.arc_length))
            .map(|mask| arc_score(p, circle, t, mask))
            .reduce(f32::max)
    }
}

/// True if `mask` (circular, 16 bits) has a run of at least `n` set bits.
#[inline]
fn has_arc(mask: u16, n: usize) -> bool {
    if (mask.count_ones() as usize) < n {
        return false;
    }
    let mut acc = (mask as u32) | ((mask as u32) << 16);
    for _ in 1..n {
        acc &= acc >> 1;
    }
    acc != 0
}

/// Score the longest run in `mask`. Only called for confirmed corners.
fn arc_score(p: i16, circle: &[i16; 16], t: i16, mask: u16) -> f32 {
    let m32 = (mask as u32) | ((mask as u32) << 16);
    let (mut best_start, mut best_len) = (0usize, 0usize);
    let mut i = 0usize;
    while i < 16 {
        if m32 & (1 << i) == 0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < 32 && m32 & (1 << i) != 0 {
            i += 1;
        }
        if i - start > best_len {
            best_len = i - start;
            best_start = start;
        }
    }
    // A full ring doubles to 32 bits; only 16 samples exist.
    let best_len = best_len.min(16);

    (best_start..best_start + best_len)
        .map(|j| ((circle[j % 16] - p).abs() - t).max(0) as f32)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat image with all 16 circle samples around the centre set to `ring`.
    fn ring_image(size: usize, center_val: u8, ring_val: u8) -> Image<u8> {
        let mut img = Image::from_vec(size, size, vec![center_val; size * size]);
        let c = (size / 2) as isize;
        for &(dx, dy) in &CIRCLE_OFFSETS {
            img.set((c + dx) as usize, (c + dy) as usize, ring_val);
        }
        img
    }

    #[test]
    fn test_bright_ring() {
        let img = ring_image(20, 50, 200);
        let kps = FastDetector::new(30, 9).detect(&img);
        assert!(kps.iter().any(|k| k.x == 10.0 && k.y == 10.0));
        let centre = kps.iter().find(|k| k.x == 10.0 && k.y == 10.0).unwrap();
        // Full ring: 16 × (150 - 30).
        assert_eq!(centre.score, 16.0 * 120.0);
    }

    #[test]
    fn test_dark_ring() {
        let img = ring_image(20, 200, 20);
        let kps = FastDetector::new(30, 9).detect(&img);
        assert!(kps.iter().any(|k| k.x == 10.0 && k.y == 10.0));
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let img = Image::from_vec(20, 20, vec![128u8; 400]);
        assert!(FastDetector::new(12, 9).detect(&img).is_empty());
    }

    #[test]
    fn test_threshold_sensitivity() {
        let img = ring_image(20, 100, 115);
        assert!(!FastDetector::new(10, 9).detect(&img).is_empty());
        assert!(FastDetector::new(20, 9).detect(&img).is_empty());
    }

    #[test]
    fn test_arc_length_sensitivity() {
        // 10 contiguous bright samples: FAST-9 fires at the centre, FAST-12 does not.
        let mut img = Image::from_vec(20, 20, vec![100u8; 400]);
        for &(dx, dy) in &CIRCLE_OFFSETS[..10] {
            img.set((10 + dx) as usize, (10 + dy) as usize, 200);
        }
        let at_centre = |kps: &[Keypoint]| kps.iter().any(|k| k.x == 10.0 && k.y == 10.0);
        assert!(at_centre(&FastDetector::new(20, 9).detect(&img)));
        assert!(!at_centre(&FastDetector::new(20, 12).detect(&img)));
    }

    #[test]
    fn test_wraparound_arc() {
        // Arc 12..=15,0..=4 crosses the 15 → 0 seam.
        let mut img = Image::from_vec(20, 20, vec![100u8; 400]);
        for k in [12, 13, 14, 15, 0, 1, 2, 3, 4] {
            let (dx, dy) = CIRCLE_OFFSETS[k];
            img.set((10 + dx) as usize, (10 + dy) as usize, 200);
        }
        let kps = FastDetector::new(20, 9).detect(&img);
        assert!(kps.iter().any(|k| k.x == 10.0 && k.y == 10.0));
    }

    #[test]
    fn test_row_major_order_and_border() {
        let img = ring_image(24, 50, 200);
        let kps = FastDetector::new(30, 9).detect(&img);
        for pair in kps.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(a.y < b.y || (a.y == b.y && a.x < b.x));
        }
        for k in &kps {
            assert!(k.x >= 3.0 && k.y >= 3.0 && k.x < 21.0 && k.y < 21.0);
        }
    }

    #[test]
    fn test_image_too_small() {
        let img: Image<u8> = Image::new(6, 6);
        assert!(FastDetector::new(12, 9).detect(&img).is_empty());
        let img: Image<u8> = Image::new(0, 0);
        assert!(FastDetector::new(12, 9).detect(&img).is_empty());
    }

    #[test]
    fn test_score_increases_with_contrast() {
        let det = FastDetector::new(20, 9);
        let low = det.detect(&ring_image(20, 100, 140));
        let high = det.detect(&ring_image(20, 100, 220));
        let centre = |kps: &[Keypoint]| {
            kps.iter().find(|k| k.x == 10.0 && k.y == 10.0).map(|k| k.score).unwrap()
        };
        assert!(centre(&high) > centre(&low));
    }

    #[test]
    #[should_panic(expected = "arc_length")]
    fn test_invalid_arc_length() {
        FastDetector::new(20, 7);
    }
}
