// geometry.rs - Pixel → NDC mapping and marker / quad vertex packing.
//
// The camera sensor is mounted rotated relative to the display, so image
// rows run along NDC x and image columns along NDC y, both flipped:
//
//   ndc_x = -(2·py / height - 1)
//   ndc_y = -(2·px / width  - 1)
//
//   image (0, 0)         → NDC ( 1,  1)
//   image (w/2, h/2)     → NDC ( 0,  0)
//
// Each keypoint becomes an axis-aligned square of half-extent e around its
// NDC position:
//
//   v3 (-e,+e) ── v2 (+e,+e)
//      │       ╲      │          indexed:   0 1 2  2 3 0
//   v0 (-e,-e) ── v1 (+e,-e)     unrolled:  v0 v1 v2 v2 v3 v0
//
// Squares use 4 vertices + 6 u32 indices per point; the line renderer
// unrolls the same two triangles into 6 vertices. Both silently stop at
// their caps.

use log::debug;

use crate::fast::Keypoint;

/// Floats per marker vertex (x, y).
pub const FLOATS_PER_VERTEX: usize = 2;
/// Vertices per square in the indexed layout.
pub const SQUARE_VERTICES: usize = 4;
/// Indices per square, and vertices per square in the unrolled layout.
pub const SQUARE_INDICES: usize = 6;

const SQUARE_PATTERN: [u32; SQUARE_INDICES] = [0, 1, 2, 2, 3, 0];

/// Full-viewport textured quad, interleaved (x, y, u, v). The uv layout is
/// rotated to match the sensor orientation.
pub const TEXTURE_QUAD_VERTICES: [f32; 16] = [
    //  x     y     u    v
     1.0,  1.0, 0.0, 0.0, // top-right
     1.0, -1.0, 1.0, 0.0, // bottom-right
    -1.0, -1.0, 1.0, 1.0, // bottom-left
    -1.0,  1.0, 0.0, 1.0, // top-left
];

/// Two triangles over [`TEXTURE_QUAD_VERTICES`].
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Map an image pixel position to normalized device coordinates.
#[inline]
pub fn pixel_to_ndc(px: f32, py: f32, width: usize, height: usize) -> [f32; 2] {
    let x = -(2.0 * (py / height as f32) - 1.0);
    let y = -(2.0 * (px / width as f32) - 1.0);
    [x, y]
}

/// Corners v0..v3 of the square around `center`.
#[inline]
fn square_corners(center: [f32; 2], e: f32) -> [[f32; 2]; 4] {
    let [cx, cy] = center;
    [
        [cx - e, cy - e],
        [cx + e, cy - e],
        [cx + e, cy + e],
        [cx - e, cy + e],
    ]
}

/// Number of points the line renderer can draw with `max_vertices`.
#[inline]
pub fn line_point_capacity(max_vertices: usize) -> usize {
    max_vertices / SQUARE_INDICES
}

/// Parameters shared by both packers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerGeometry {
    pub width: usize,
    pub height: usize,
    pub half_extent: f32,
}

/// Pack up to `max_points` squares into `vertices` (x, y pairs) and
/// `indices`. Both are cleared first. Returns the number of points packed.
pub fn pack_squares(
    points: &[Keypoint],
    geom: MarkerGeometry,
    max_points: usize,
    vertices: &mut Vec<f32>,
    indices: &mut Vec<u32>,
) -> usize {
    vertices.clear();
    indices.clear();
    let n = points.len().min(max_points);
    if n < points.len() {
        debug!("square markers capped: {} of {} points", n, points.len());
    }

    for (i, p) in points[..n].iter().enumerate() {
        let center = pixel_to_ndc(p.x, p.y, geom.width, geom.height);
        for v in square_corners(center, geom.half_extent) {
            vertices.extend_from_slice(&v);
        }
        let base = (i * SQUARE_VERTICES) as u32;
        indices.extend(SQUARE_PATTERN.iter().map(|&k| base + k));
    }
    n
}

/// Pack squares as unrolled triangles, at most `max_vertices` vertices.
/// Cleared first. Returns the number of points packed.
pub fn pack_triangles(points: &[Keypoint], geom: MarkerGeometry, max_vertices: usize, vertices: &mut Vec<f32>) -> usize {
    vertices.clear();
    let n = points.len().min(line_point_capacity(max_vertices));
    if n < points.len() {
        debug!("line markers capped: {} of {} points", n, points.len());
    }

    for p in &points[..n] {
        let center = pixel_to_ndc(p.x, p.y, geom.width, geom.height);
        let corners = square_corners(center, geom.half_extent);
        for &k in &SQUARE_PATTERN {
            vertices.extend_from_slice(&corners[k as usize]);
        }
    }
    n
}
