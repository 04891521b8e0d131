// nms.rs - 3×3 score non-maximum suppression for FAST corners.
//
// Corners are splatted into a score image (0 = no corner), then each
// corner survives only if its score is strictly greater than all eight
// neighbours:
//
//   . . .
//   . c .     keep c  ⇔  score(c) > score(n) for every n
//   . . .
//
// Equal-score neighbours suppress each other, so a perfectly symmetric
// blob yields nothing rather than an arbitrary pick. Input order (row-major
// from the detector) is preserved in the output.

use crate::fast::Keypoint;
use crate::image::Image;

/// Reusable 3×3 suppressor.
#[derive(Debug, Default)]
pub struct ScoreNms {
    scores: Image<f32>,
}

impl ScoreNms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the local maxima of `corners` (all inside a `width × height`
    /// image) and append them to a cleared `out`.
    pub fn suppress_into(&mut self, corners: &[Keypoint], width: usize, height: usize, out: &mut Vec<Keypoint>) {
        out.clear();
        if corners.is_empty() {
            return;
        }

        self.scores.reset(width, height, 0.0);
        for k in corners {
            self.scores.set(k.x as usize, k.y as usize, k.score);
        }

        for k in corners {
            let (x, y) = (k.x as usize, k.y as usize);
            let (x0, x1) = (x.saturating_sub(1), (x + 1).min(width - 1));
            let (y0, y1) = (y.saturating_sub(1), (y + 1).min(height - 1));
            let mut is_max = true;
            'scan: for ny in y0..=y1 {
                for nx in x0..=x1 {
                    if (nx, ny) != (x, y) && self.scores.get(nx, ny) >= k.score {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                out.push(*k);
            }
        }
    }

    /// Convenience wrapper returning a new Vec.
    pub fn suppress(&mut self, corners: &[Keypoint], width: usize, height: usize) -> Vec<Keypoint> {
        let mut out = Vec::new();
        self.suppress_into(corners, width, height, &mut out);
        out
    }

    pub fn release(&mut self) {
        self.scores.release();
    }
}
