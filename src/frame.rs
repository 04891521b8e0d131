// frame.rs - Borrowed camera frames and strided camera planes.
//
// The camera hands us a luma plane whose rows may be padded and whose
// pixels may be interleaved with chroma (pixel stride > 1):
//
//   row_stride
//   ├──────────────────────────────┤
//   Y . Y . Y . Y . ... Y . │pad│     pixel_stride = 2
//   Y . Y . Y . Y . ... Y . │pad│
//
// `LumaPlane::pack_into` gathers the Y samples into a tight `width × height`
// buffer, and `Frame` is the non-owning view over that buffer that a
// detector reads for exactly one `detect` call.

use crate::error::IngestError;
use crate::image::Image;

/// A borrowed single-channel intensity frame, tightly packed.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> Frame<'a> {
    /// Wrap `data` as a `width × height` frame. Extra trailing bytes are
    /// ignored; too few is an error.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self, IngestError> {
        let needed = width
            .checked_mul(height)
            .ok_or(IngestError::TooLarge { width, height })?;
        if data.len() < needed {
            return Err(IngestError::PlaneTooShort {
                needed,
                got: data.len(),
            });
        }
        Ok(Frame {
            data: &data[..needed],
            width,
            height,
        })
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
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copy the frame into a reusable image buffer.
    pub fn copy_into(&self, dst: &mut Image<u8>) {
        dst.reset(self.width, self.height, 0);
        dst.as_mut_slice().copy_from_slice(self.data);
    }
}

/// A strided camera plane as delivered by the capture layer.
#[derive(Debug, Clone, Copy)]
pub struct LumaPlane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row.
    pub pixel_stride: usize,
}

impl<'a> LumaPlane<'a> {
    /// A plane that is already tightly packed.
    pub fn packed(data: &'a [u8], width: usize) -> Self {
        LumaPlane {
            data,
            row_stride: width,
            pixel_stride: 1,
        }
    }

    /// Gather `width × height` samples into `dst` (cleared first).
    pub fn pack_into(&self, width: usize, height: usize, dst: &mut Vec<u8>) -> Result<(), IngestError> {
        dst.clear();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let bad_stride = IngestError::InvalidStride {
            row_stride: self.row_stride,
            pixel_stride: self.pixel_stride,
            width,
        };
        let row_span = match (width - 1).checked_mul(self.pixel_stride) {
            Some(span) if self.pixel_stride > 0 && span < self.row_stride => span + 1,
            _ => return Err(bad_stride),
        };
        let needed = (height - 1)
            .checked_mul(self.row_stride)
            .and_then(|n| n.checked_add(row_span))
            .ok_or(bad_stride)?;
        if self.data.len() < needed {
            return Err(IngestError::PlaneTooShort {
                needed,
                got: self.data.len(),
            });
        }

        dst.reserve(width * height);
        for y in 0..height {
            let row = &self.data[y * self.row_stride..y * self.row_stride + row_span];
            if self.pixel_stride == 1 {
                dst.extend_from_slice(row);
            } else {
                dst.extend(row.iter().step_by(self.pixel_stride).copied());
            }
        }
        Ok(())
    }
}

/// Anything that can hand out one luma plane per tick.
pub trait FrameSource {
    /// Plane dimensions. Constant for the lifetime of the source.
    fn dimensions(&self) -> (usize, usize);

    /// The next plane, or `None` when no frame is ready.
    fn next_plane(&mut self) -> Option<LumaPlane<'_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_short_buffer() {
        let buf = [0u8; 5];
        let err = Frame::new(&buf, 3, 2).unwrap_err();
        assert_eq!(err, IngestError::PlaneTooShort { needed: 6, got: 5 });
    }

    #[test]
    fn test_frame_trims_trailing_bytes() {
        let buf = [1u8, 2, 3, 4, 5, 6, 7];
        let f = Frame::new(&buf, 3, 2).unwrap();
        assert_eq!(f.data(), &[1, 2, 3, 4, 5, 6]);
        let mut img = Image::default();
        f.copy_into(&mut img);
        assert_eq!(img.get(2, 1), 6);
    }

    #[test]
    fn test_zero_area_frame() {
        let f = Frame::new(&[], 0, 480).unwrap();
        assert!(f.is_empty());
    }

    #[test]
    fn test_pack_row_padding() {
        // 3×2 with 2 bytes of padding per row.
        let data = [1u8, 2, 3, 0, 0, 4, 5, 6];
        let plane = LumaPlane { data: &data, row_stride: 5, pixel_stride: 1 };
        let mut out = Vec::new();
        plane.pack_into(3, 2, &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_pack_interleaved() {
        // Pixel stride 2 (Y interleaved with chroma), last row unpadded.
        let data = [10u8, 99, 11, 99, 12, 99, 20, 99, 21, 99, 22];
        let plane = LumaPlane { data: &data, row_stride: 6, pixel_stride: 2 };
        let mut out = Vec::new();
        plane.pack_into(3, 2, &mut out).unwrap();
        assert_eq!(out, vec![10, 11, 12, 20, 21, 22]);
    }

    #[test]
    fn test_pack_short_plane() {
        let data = [0u8; 7];
        let plane = LumaPlane::packed(&data, 4);
        let mut out = vec![42u8];
        let err = plane.pack_into(4, 2, &mut out).unwrap_err();
        assert_eq!(err, IngestError::PlaneTooShort { needed: 8, got: 7 });
        assert!(out.is_empty());
    }

    #[test]
    fn test_pack_bad_stride() {
        let data = [0u8; 16];
        let plane = LumaPlane { data: &data, row_stride: 3, pixel_stride: 1 };
        let mut out = Vec::new();
        assert!(matches!(
            plane.pack_into(4, 2, &mut out),
            Err(IngestError::InvalidStride { .. })
        ));
    }

    #[test]
    fn test_frame_size_overflow_rejected() {
        assert_eq!(
            Frame::new(&[], usize::MAX, 2).unwrap_err(),
            IngestError::TooLarge { width: usize::MAX, height: 2 }
        );
    }

    #[test]
    fn test_pack_stride_overflow_rejected() {
        let data = [0u8; 16];
        let mut out = Vec::new();
        let wide_pixels = LumaPlane { data: &data, row_stride: 8, pixel_stride: usize::MAX / 2 };
        assert!(matches!(
            wide_pixels.pack_into(4, 2, &mut out),
            Err(IngestError::InvalidStride { .. })
        ));
        let wide_rows = LumaPlane { data: &data, row_stride: usize::MAX / 2, pixel_stride: 1 };
        assert!(matches!(
            wide_rows.pack_into(4, 3, &mut out),
            Err(IngestError::InvalidStride { .. })
        ));
    }
}
