// image.rs - Runtime-sized image container, generic over pixel type.
//
// Every stage of the preview pipeline passes pixels around as `Image<T>`:
//
//   camera plane ──► Image<u8> (luma) ──► Image<f32> (Sobel dx/dy)
//                                     ──► Image<u8> (edge map, dilated mask)
//                                     ──► ProcessedImage (RGB bytes for upload)
//
// Layout is row-major with an explicit stride. Every image the pipeline
// builds is packed (stride == width); strided camera planes are packed on
// ingest (see frame.rs).
//
// Detector scratch buffers are long-lived `Image<u8>`s that get resized in
// place each frame (`reset`), which keeps the per-tick allocation count at
// zero once the camera size is stable.

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
///
/// `to_f32`/`from_f32` are *raw* conversions (u8 42 <-> 42.0), which is what
/// the gradient and threshold code expects.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value, clamping and rounding as needed.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D image with runtime dimensions, generic over pixel type `T`.
#[derive(Clone)]
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in elements. stride >= width.
    stride: usize,
}

impl<T: Pixel> Default for Image<T> {
    /// A 0×0 image. Used as the initial state of detector scratch buffers.
    fn default() -> Self {
        Image::new(0, 0)
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image with stride == width.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector (stride == width).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Resize to `width × height` (stride == width) and fill with `value`,
    /// reusing the existing allocation when it is large enough.
    pub fn reset(&mut self, width: usize, height: usize, value: T) {
        self.data.clear();
        self.data.resize(width * height, value);
        self.width = width;
        self.height = height;
        self.stride = width;
    }

    /// Release the pixel storage entirely. The image becomes 0×0.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.width = 0;
        self.height = 0;
        self.stride = 0;
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// True when the image has no pixels (either dimension is zero).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(
            x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        *self.data.get_unchecked(y * self.stride + x)
    }

    /// Set pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.stride + x) = value;
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        self.data[idx] = value;
    }

    /// Borrow a single row (active pixels only, no stride padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Underlying buffer, including stride padding.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}
