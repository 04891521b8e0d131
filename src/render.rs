// render.rs - The three renderer behaviours.
//
//   Texture   ProcessedImage ─► 2D texture ─► indexed full-viewport quad
//   Squares   KeypointSet    ─► 4 verts + 6 indices per point ─► indexed
//   Lines     KeypointSet    ─► 6 verts per point             ─► non-indexed
//
// Lifecycle per renderer:
//
//   activate    check program handle, create buffers (+ texture), upload
//               the static quad, preallocate marker scratch to the caps
//   consume     cache the latest result (replaces the previous one)
//   draw        upload cached data (dynamic), clear, issue one draw
//   deactivate  delete handles, drop cached data and scratch
//
// The two GPU programs are compiled once into a `ProgramSet` shared by all
// renderers. Binding the program is the mode selector's job; `draw` assumes
// the right one is bound.

use std::fmt;

use log::{debug, error, info};

use crate::config::MarkerParams;
use crate::detect::{DetectionResult, KeypointSet, OutputKind, PixelLayout, ProcessedImage};
use crate::geometry::{self, MarkerGeometry, FLOATS_PER_VERTEX, SQUARE_INDICES, SQUARE_VERTICES};
use crate::gpu::shaders::{SOLID, TEXTURED};
use crate::gpu::{
    BufferHandle, BufferKind, BufferUsage, DrawCommand, DrawMode, GpuSubmit, PixelFormat, ProgramHandle,
    TextureHandle,
};

/// Target clear colour (opaque black).
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    Texture,
    Squares,
    Lines,
}

impl RendererKind {
    pub const ALL: [RendererKind; 3] = [RendererKind::Texture, RendererKind::Squares, RendererKind::Lines];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The detection result variant this renderer draws.
    pub fn input(self) -> OutputKind {
        match self {
            RendererKind::Texture => OutputKind::Image,
            RendererKind::Squares | RendererKind::Lines => OutputKind::Points,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RendererKind::Texture => "texture",
            RendererKind::Squares => "squares",
            RendererKind::Lines => "lines",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The solid-colour and textured programs, compiled once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSet {
    pub solid: ProgramHandle,
    pub textured: ProgramHandle,
}

impl ProgramSet {
    /// Compile both programs. Failures are logged and leave the handle
    /// invalid; there is no retry.
    pub fn compile<G: GpuSubmit + ?Sized>(gpu: &mut G) -> Self {
        let solid = gpu.create_program(&SOLID);
        if !solid.is_valid() {
            error!("'{}' program unavailable; marker modes will not draw", SOLID.label);
        }
        let textured = gpu.create_program(&TEXTURED);
        if !textured.is_valid() {
            error!("'{}' program unavailable; image modes will not draw", TEXTURED.label);
        }
        ProgramSet { solid, textured }
    }

    pub fn for_renderer(&self, kind: RendererKind) -> ProgramHandle {
        match kind {
            RendererKind::Texture => self.textured,
            RendererKind::Squares | RendererKind::Lines => self.solid,
        }
    }

    pub fn release<G: GpuSubmit + ?Sized>(&self, gpu: &mut G) {
        for p in [self.solid, self.textured] {
            if p.is_valid() {
                gpu.delete_program(p);
            }
        }
    }
}

/// What one `draw` call submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawStats {
    /// Markers drawn (0 for the texture renderer).
    pub points: usize,
    /// Index count for indexed draws, vertex count otherwise.
    pub elements: u32,
}

#[derive(Debug, Clone, Copy)]
struct GpuResources {
    vertices: BufferHandle,
    indices: Option<BufferHandle>,
    texture: Option<TextureHandle>,
}

enum Cached {
    Nothing,
    Image(ProcessedImage),
    Points(KeypointSet),
}

pub struct Renderer {
    kind: RendererKind,
    markers: MarkerParams,
    resources: Option<GpuResources>,
    cached: Cached,
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl Renderer {
    pub fn new(kind: RendererKind, markers: &MarkerParams) -> Self {
        Renderer {
            kind,
            markers: markers.clone(),
            resources: None,
            cached: Cached::Nothing,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn kind(&self) -> RendererKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.resources.is_some()
    }

    /// The program this renderer draws with.
    pub fn program(&self, programs: &ProgramSet) -> ProgramHandle {
        programs.for_renderer(self.kind)
    }

    /// Allocate GPU resources. Refuses (and logs) when the program is
    /// invalid. Activating an active renderer is a no-op.
    pub fn activate<G: GpuSubmit + ?Sized>(&mut self, gpu: &mut G, programs: &ProgramSet) -> bool {
        if self.is_active() {
            return true;
        }
        if !self.program(programs).is_valid() {
            error!("{} renderer not activated: its program failed to compile", self.kind);
            return false;
        }

        let vertices = gpu.create_buffer(BufferKind::Vertex);
        let resources = match self.kind {
            RendererKind::Texture => {
                let indices = gpu.create_buffer(BufferKind::Index);
                gpu.upload_buffer(vertices, bytemuck::cast_slice(&geometry::TEXTURE_QUAD_VERTICES), BufferUsage::Static);
                gpu.upload_buffer(indices, bytemuck::cast_slice(&geometry::QUAD_INDICES), BufferUsage::Static);
                GpuResources {
                    vertices,
                    indices: Some(indices),
                    texture: Some(gpu.create_texture()),
                }
            }
            RendererKind::Squares => {
                let cap = self.markers.max_square_points;
                self.vertices.reserve(cap * SQUARE_VERTICES * FLOATS_PER_VERTEX);
                self.indices.reserve(cap * SQUARE_INDICES);
                GpuResources {
                    vertices,
                    indices: Some(gpu.create_buffer(BufferKind::Index)),
                    texture: None,
                }
            }
            RendererKind::Lines => {
                self.vertices.reserve(self.markers.max_line_vertices * FLOATS_PER_VERTEX);
                GpuResources {
                    vertices,
                    indices: None,
                    texture: None,
                }
            }
        };
        self.resources = Some(resources);
        info!("{} renderer activated", self.kind);
        true
    }

    /// Release GPU handles and drop cached data.
    pub fn deactivate<G: GpuSubmit + ?Sized>(&mut self, gpu: &mut G) {
        if let Some(res) = self.resources.take() {
            gpu.delete_buffer(res.vertices);
            if let Some(b) = res.indices {
                gpu.delete_buffer(b);
            }
            if let Some(t) = res.texture {
                gpu.delete_texture(t);
            }
            debug!("{} renderer deactivated", self.kind);
        }
        self.cached = Cached::Nothing;
        self.vertices = Vec::new();
        self.indices = Vec::new();
    }

    /// Cache `result` for the next draws. A result of the wrong variant is
    /// a wiring bug: it asserts in debug builds and is dropped otherwise.
    pub fn consume(&mut self, result: DetectionResult) {
        debug_assert_eq!(
            result.kind(),
            self.kind.input(),
            "{} renderer handed a {:?} result",
            self.kind,
            result.kind()
        );
        self.cached = match (self.kind.input(), result) {
            (OutputKind::Image, DetectionResult::ProcessedImage(img)) => Cached::Image(img),
            (OutputKind::Points, DetectionResult::KeypointSet(set)) => Cached::Points(set),
            (_, other) => {
                error!("{} renderer discarding {:?} result", self.kind, other.kind());
                return;
            }
        };
    }

    /// True once something has been consumed since activation.
    pub fn has_data(&self) -> bool {
        !matches!(self.cached, Cached::Nothing)
    }

    /// Upload the cached result and draw it. `None` when inactive or when
    /// nothing has been consumed yet.
    pub fn draw<G: GpuSubmit + ?Sized>(&mut self, gpu: &mut G) -> Option<DrawStats> {
        let res = self.resources?;
        let geom_of = |set: &KeypointSet, e: f32| MarkerGeometry {
            width: set.width,
            height: set.height,
            half_extent: e,
        };

        match &self.cached {
            Cached::Nothing => None,
            Cached::Image(img) => {
                gpu.clear(CLEAR_COLOR);
                let texture = res.texture?;
                if img.is_empty() {
                    return Some(DrawStats::default());
                }
                let format = match img.layout {
                    PixelLayout::Gray8 => PixelFormat::Luminance8,
                    PixelLayout::Rgb8 => PixelFormat::Rgb8,
                };
                gpu.upload_texture(texture, &img.data, img.width as u32, img.height as u32, format);
                let mode = DrawMode::IndexedTriangles {
                    index_count: geometry::QUAD_INDICES.len() as u32,
                };
                gpu.draw(&DrawCommand {
                    vertex_buffer: res.vertices,
                    index_buffer: res.indices,
                    texture: Some(texture),
                    mode,
                });
                Some(DrawStats {
                    points: 0,
                    elements: mode.elements(),
                })
            }
            Cached::Points(set) => {
                let geom = geom_of(set, self.markers.half_extent);
                let (points, mode) = match self.kind {
                    RendererKind::Lines => {
                        let n = geometry::pack_triangles(&set.points, geom, self.markers.max_line_vertices, &mut self.vertices);
                        let vertex_count = (self.vertices.len() / FLOATS_PER_VERTEX) as u32;
                        (n, DrawMode::Triangles { vertex_count })
                    }
                    _ => {
                        let n = geometry::pack_squares(
                            &set.points,
                            geom,
                            self.markers.max_square_points,
                            &mut self.vertices,
                            &mut self.indices,
                        );
                        let index_count = self.indices.len() as u32;
                        (n, DrawMode::IndexedTriangles { index_count })
                    }
                };

                gpu.clear(CLEAR_COLOR);
                if points == 0 {
                    return Some(DrawStats::default());
                }
                gpu.upload_buffer(res.vertices, bytemuck::cast_slice(&self.vertices), BufferUsage::Dynamic);
                if let Some(ib) = res.indices {
                    gpu.upload_buffer(ib, bytemuck::cast_slice(&self.indices), BufferUsage::Dynamic);
                }
                gpu.draw(&DrawCommand {
                    vertex_buffer: res.vertices,
                    index_buffer: res.indices,
                    texture: None,
                    mode,
                });
                Some(DrawStats {
                    points,
                    elements: mode.elements(),
                })
            }
        }
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .field("has_data", &self.has_data())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast::Keypoint;
    use crate::gpu::recorder::{CommandRecorder, GpuCommand};

    fn setup(kind: RendererKind) -> (CommandRecorder, ProgramSet, Renderer) {
        let mut gpu = CommandRecorder::new();
        let programs = ProgramSet::compile(&mut gpu);
        let mut r = Renderer::new(kind, &MarkerParams::default());
        assert!(r.activate(&mut gpu, &programs));
        gpu.take_commands();
        (gpu, programs, r)
    }

    fn points(n: usize) -> DetectionResult {
        DetectionResult::KeypointSet(KeypointSet {
            width: 640,
            height: 480,
            points: (0..n).map(|i| Keypoint::new((i % 600) as f32, (i / 600) as f32)).collect(),
        })
    }

    fn image(w: usize, h: usize) -> DetectionResult {
        DetectionResult::ProcessedImage(ProcessedImage {
            width: w,
            height: h,
            layout: PixelLayout::Rgb8,
            data: vec![7; w * h * 3],
        })
    }

    #[test]
    fn test_input_kinds() {
        assert_eq!(RendererKind::Texture.input(), OutputKind::Image);
        assert_eq!(RendererKind::Squares.input(), OutputKind::Points);
        assert_eq!(RendererKind::Lines.input(), OutputKind::Points);
    }

    #[test]
    fn test_texture_activation_uploads_static_quad() {
        let mut gpu = CommandRecorder::new();
        let programs = ProgramSet::compile(&mut gpu);
        let mut r = Renderer::new(RendererKind::Texture, &MarkerParams::default());
        assert!(r.activate(&mut gpu, &programs));
        let statics = gpu
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::UploadBuffer { usage: BufferUsage::Static, .. }))
            .count();
        assert_eq!(statics, 2);
        assert_eq!(gpu.live_buffers(), 2);
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn test_texture_draw() {
        let (mut gpu, _, mut r) = setup(RendererKind::Texture);
        r.consume(image(64, 48));
        let stats = r.draw(&mut gpu).unwrap();
        assert_eq!(stats, DrawStats { points: 0, elements: 6 });
        assert!(gpu.commands().iter().any(|c| matches!(
            c,
            GpuCommand::UploadTexture { width: 64, height: 48, format: PixelFormat::Rgb8, .. }
        )));
        assert_eq!(gpu.draws().count(), 1);
    }

    #[test]
    fn test_squares_counts_and_cap() {
        let (mut gpu, _, mut r) = setup(RendererKind::Squares);
        r.consume(points(10));
        assert_eq!(r.draw(&mut gpu), Some(DrawStats { points: 10, elements: 60 }));

        r.consume(points(9000));
        assert_eq!(r.draw(&mut gpu), Some(DrawStats { points: 8192, elements: 8192 * 6 }));
    }

    #[test]
    fn test_lines_counts_and_cap() {
        let (mut gpu, _, mut r) = setup(RendererKind::Lines);
        r.consume(points(10));
        assert_eq!(r.draw(&mut gpu), Some(DrawStats { points: 10, elements: 60 }));
        let (_, cmd) = gpu.draws().last().unwrap();
        assert_eq!(cmd.index_buffer, None);

        r.consume(points(5000));
        assert_eq!(r.draw(&mut gpu), Some(DrawStats { points: 2730, elements: 2730 * 6 }));
    }

    #[test]
    fn test_empty_set_clears_without_draw() {
        let (mut gpu, _, mut r) = setup(RendererKind::Squares);
        r.consume(points(0));
        assert_eq!(r.draw(&mut gpu), Some(DrawStats::default()));
        assert_eq!(gpu.commands(), &[GpuCommand::Clear(CLEAR_COLOR)]);
    }

    #[test]
    fn test_nothing_consumed_skips() {
        let (mut gpu, _, mut r) = setup(RendererKind::Lines);
        assert_eq!(r.draw(&mut gpu), None);
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn test_consumed_data_redraws() {
        let (mut gpu, _, mut r) = setup(RendererKind::Squares);
        r.consume(points(3));
        r.draw(&mut gpu);
        r.draw(&mut gpu);
        assert_eq!(gpu.draws().count(), 2);
    }

    #[test]
    fn test_invalid_program_refuses_activation() {
        let mut gpu = CommandRecorder::new();
        gpu.fail_program(SOLID.label);
        let programs = ProgramSet::compile(&mut gpu);
        let mut r = Renderer::new(RendererKind::Squares, &MarkerParams::default());
        assert!(!r.activate(&mut gpu, &programs));
        assert_eq!(gpu.live_buffers(), 0);
        r.consume(points(4));
        assert_eq!(r.draw(&mut gpu), None);
        assert_eq!(gpu.draws().count(), 0);

        let mut t = Renderer::new(RendererKind::Texture, &MarkerParams::default());
        assert!(t.activate(&mut gpu, &programs));
    }

    #[test]
    fn test_deactivate_releases_everything() {
        let (mut gpu, _, mut r) = setup(RendererKind::Texture);
        r.consume(image(4, 4));
        r.deactivate(&mut gpu);
        assert!(!r.is_active() && !r.has_data());
        assert_eq!(gpu.live_buffers(), 0);
        assert_eq!(gpu.live_textures(), 0);
        // Deactivating twice is harmless.
        r.deactivate(&mut gpu);
    }

    #[test]
    fn test_vertex_bytes_uploaded() {
        let (mut gpu, _, mut r) = setup(RendererKind::Squares);
        r.consume(points(2));
        r.draw(&mut gpu);
        let (_, cmd) = gpu.draws().next().unwrap();
        let bytes = gpu.buffer_contents(cmd.vertex_buffer).unwrap();
        assert_eq!(bytes.len(), 2 * SQUARE_VERTICES * FLOATS_PER_VERTEX * 4);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "texture renderer handed")]
    fn test_wrong_variant_asserts_in_debug() {
        let (_, _, mut r) = setup(RendererKind::Texture);
        r.consume(points(1));
    }
}
