// compose.rs - Per-pixel composition of edge maps with the source frame.
//
// All edge detectors emit packed RGB8 so the texture renderer has a single
// upload format. The helpers below produce that layout directly from
// single-channel inputs, without materialising intermediate RGB images:
//
//   blend_to_rgb      a·wa + b·wb, replicated to R=G=B
//   channel_to_rgb    mask into one channel, the other two zero
//   masked_copy_rgb   src where mask != 0, black elsewhere
//
// Every helper clears and refills `dst`, so the caller's Vec keeps its
// capacity between frames.

use crate::image::{Image, Pixel};

/// One of the three RGB channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// Byte offset of this channel inside an RGB8 pixel.
    #[inline]
    pub fn offset(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// Weighted sum of two same-sized single-channel images, saturated to u8
/// and written as grey RGB.
///
/// # Panics
/// Panics if the two inputs differ in size.
pub fn blend_to_rgb(a: &Image<u8>, wa: f32, b: &Image<u8>, wb: f32, dst: &mut Vec<u8>) {
    assert_same_size(a, b);
    dst.clear();
    dst.reserve(a.width() * a.height() * 3);
    for y in 0..a.height() {
        for (&pa, &pb) in a.row(y).iter().zip(b.row(y)) {
            let v = u8::from_f32(pa as f32 * wa + pb as f32 * wb);
            dst.extend_from_slice(&[v, v, v]);
        }
    }
}

/// Place `mask` into `channel`; the other two channels are zero.
pub fn channel_to_rgb(mask: &Image<u8>, channel: Channel, dst: &mut Vec<u8>) {
    let n = mask.width() * mask.height();
    dst.clear();
    dst.resize(n * 3, 0);
    let off = channel.offset();
    let mut px = dst.chunks_exact_mut(3);
    for y in 0..mask.height() {
        for (&m, out) in mask.row(y).iter().zip(&mut px) {
            out[off] = m;
        }
    }
}

/// Copy `src` wherever `mask` is non-zero, black elsewhere.
///
/// # Panics
/// Panics if the two inputs differ in size.
pub fn masked_copy_rgb(src: &Image<u8>, mask: &Image<u8>, dst: &mut Vec<u8>) {
    assert_same_size(src, mask);
    dst.clear();
    dst.reserve(src.width() * src.height() * 3);
    for y in 0..src.height() {
        for (&s, &m) in src.row(y).iter().zip(mask.row(y)) {
            let v = if m != 0 { s } else { 0 };
            dst.extend_from_slice(&[v, v, v]);
        }
    }
}

fn assert_same_size(a: &Image<u8>, b: &Image<u8>) {
    assert!(
        a.width() == b.width() && a.height() == b.height(),
        "size mismatch: {}×{} vs {}×{}",
        a.width(),
        a.height(),
        b.width(),
        b.height(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_half_half() {
        let a = Image::from_vec(2, 1, vec![255u8, 0]);
        let b = Image::from_vec(2, 1, vec![100u8, 0]);
        let mut out = Vec::new();
        blend_to_rgb(&a, 0.5, &b, 0.5, &mut out);
        // 127.5 + 50 = 177.5 → 178
        assert_eq!(out, vec![178, 178, 178, 0, 0, 0]);
    }

    #[test]
    fn test_blend_saturates() {
        let a = Image::from_vec(1, 1, vec![255u8]);
        let mut out = Vec::new();
        blend_to_rgb(&a, 1.0, &a, 1.0, &mut out);
        assert_eq!(out, vec![255, 255, 255]);
    }

    #[test]
    fn test_channel_to_rgb() {
        let m = Image::from_vec(2, 1, vec![255u8, 0]);
        let mut out = vec![9u8; 30];
        channel_to_rgb(&m, Channel::Green, &mut out);
        assert_eq!(out, vec![0, 255, 0, 0, 0, 0]);
        channel_to_rgb(&m, Channel::Blue, &mut out);
        assert_eq!(out, vec![0, 0, 255, 0, 0, 0]);
    }

    #[test]
    fn test_masked_copy() {
        let src = Image::from_vec(3, 1, vec![10u8, 20, 30]);
        let mask = Image::from_vec(3, 1, vec![0u8, 1, 255]);
        let mut out = Vec::new();
        masked_copy_rgb(&src, &mask, &mut out);
        assert_eq!(out, vec![0, 0, 0, 20, 20, 20, 30, 30, 30]);
    }

    #[test]
    #[should_panic(expected = "size mismatch")]
    fn test_blend_size_mismatch() {
        let a = Image::<u8>::new(2, 2);
        let b = Image::<u8>::new(3, 2);
        blend_to_rgb(&a, 0.5, &b, 0.5, &mut Vec::new());
    }
}
