// convolution.rs - Separable 1D convolution for Image<T>.
//
// The Sobel operators used by the edge detectors are separable, so a 3×3
// stencil becomes two 3-tap passes:
//
//   src ──convolve_rows──► tmp (f32) ──convolve_cols──► dst (f32)
//
// BORDER HANDLING: Clamp (replicate edge pixels), matching the
// BORDER_REPLICATE behaviour edge detection conventionally uses.
//
// All passes write into caller-owned buffers; detectors keep their gradient
// images alive across frames.

use crate::image::{Image, Pixel};

/// Convolve each row of `src` with a centred 1D kernel (horizontal pass).
/// `dst` is resized to match `src`.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_rows_into<T: Pixel>(src: &Image<T>, kernel: &[f32], dst: &mut Image<f32>) {
    check_kernel(kernel);

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    dst.reset(w, h, 0.0);

    let clamped = |x: usize, y: usize| -> f32 {
        let mut acc = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let sx = (x as isize + ki as isize - half as isize).clamp(0, w as isize - 1) as usize;
            acc += src.get(sx, y).to_f32() * kv;
        }
        acc
    };

    for y in 0..h {
        for x in 0..half.min(w) {
            dst.set(x, y, clamped(x, y));
        }

        if w > 2 * half {
            for x in half..(w - half) {
                let mut acc = 0.0f32;
                // SAFETY: x - half >= 0 and x + half < w.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x + ki - half, y).to_f32() * kv;
                    }
                    dst.set_unchecked(x, y, acc);
                }
            }
        }

        let right_start = if w > half { (w - half).max(half) } else { w };
        for x in right_start..w {
            dst.set(x, y, clamped(x, y));
        }
    }
}

/// Vertical counterpart of [`convolve_rows_into`].
pub fn convolve_cols_into(src: &Image<f32>, kernel: &[f32], dst: &mut Image<f32>) {
    check_kernel(kernel);

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    dst.reset(w, h, 0.0);

    let clamped = |x: usize, y: usize| -> f32 {
        let mut acc = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let sy = (y as isize + ki as isize - half as isize).clamp(0, h as isize - 1) as usize;
            acc += src.get(x, sy) * kv;
        }
        acc
    };

    for y in 0..half.min(h) {
        for x in 0..w {
            dst.set(x, y, clamped(x, y));
        }
    }

    if h > 2 * half {
        for y in half..(h - half) {
            for x in 0..w {
                let mut acc = 0.0f32;
                // SAFETY: y - half >= 0 and y + half < h.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x, y + ki - half) * kv;
                    }
                    dst.set_unchecked(x, y, acc);
                }
            }
        }
    }

    let bottom_start = if h > half { (h - half).max(half) } else { h };
    for y in bottom_start..h {
        for x in 0..w {
            dst.set(x, y, clamped(x, y));
        }
    }
}

/// Horizontal pass into `tmp`, then vertical pass into `dst`.
pub fn convolve_separable_into<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
    tmp: &mut Image<f32>,
    dst: &mut Image<f32>,
) {
    convolve_rows_into(src, kernel_row, tmp);
    convolve_cols_into(tmp, kernel_col, dst);
}

fn check_kernel(kernel: &[f32]) {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
}
