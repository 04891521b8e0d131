// gradient.rs - Sobel gradients and L1 magnitude for the Canny stage.
//
// Sobel kernels are separable:
//   Sobel_x = col_kernel * row_kernel^T
//     row: [-1, 0, 1]   (derivative along x)
//     col: [ 1, 2, 1]   (smoothing along y)
//
//   Sobel_y = col_kernel * row_kernel^T
//     row: [ 1, 2, 1]   (smoothing along x)
//     col: [-1, 0, 1]   (derivative along y)
//
// Border handling (replicate) comes from convolution.rs. Magnitude is the
// L1 norm |dx| + |dy|, which is what the 80/90 Canny thresholds are tuned
// against.

use crate::convolution::convolve_separable_into;
use crate::image::{Image, Pixel};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Reusable gradient buffers. One instance lives inside each edge
/// detector's scratch and is refilled every frame.
#[derive(Debug, Default)]
pub struct Gradients {
    pub dx: Image<f32>,
    pub dy: Image<f32>,
    tmp: Image<f32>,
}

impl Gradients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute `dx` (positive where intensity increases to the right)
    /// and `dy` (positive downward) for `src`.
    pub fn compute<T: Pixel>(&mut self, src: &Image<T>) {
        convolve_separable_into(src, &SOBEL_DERIV, &SOBEL_SMOOTH, &mut self.tmp, &mut self.dx);
        convolve_separable_into(src, &SOBEL_SMOOTH, &SOBEL_DERIV, &mut self.tmp, &mut self.dy);
    }

    /// L1 magnitude |dx| + |dy| into `dst`.
    pub fn magnitude_l1(&self, dst: &mut Image<f32>) {
        let (w, h) = (self.dx.width(), self.dx.height());
        dst.reset(w, h, 0.0);
        for y in 0..h {
            let (rx, ry) = (self.dx.row(y), self.dy.row(y));
            for ((m, gx), gy) in dst.row_mut(y).iter_mut().zip(rx).zip(ry) {
                *m = gx.abs() + gy.abs();
            }
        }
    }

    /// Drop the buffers' storage.
    pub fn release(&mut self) {
        self.dx.release();
        self.dy.release();
        self.tmp.release();
    }
}
