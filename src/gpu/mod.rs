// gpu/mod.rs - GPU submission boundary.
//
// Renderers never talk to wgpu directly. They speak a small, GL-shaped
// command vocabulary through the `GpuSubmit` trait:
//
//   program   create / use / delete     (vertex + fragment WGSL pair)
//   buffer    create / upload / delete  (vertex or index, usage hint)
//   texture   create / upload / delete  (bytes + size + pixel format)
//   frame     clear / draw              (draws use the bound program)
//
// Two implementations:
//
//   recorder::CommandRecorder  headless; records every call as a GpuCommand.
//                              Used by tests, benches and CI.
//   canvas::GpuCanvas          wgpu; renders into an offscreen RGBA target
//                              that can be read back.
//
// Handles are small integers and 0 is always invalid. A failed shader
// compile yields `ProgramHandle::INVALID`; the caller checks validity right
// after creation and never retries.

pub mod canvas;
pub mod device;
pub mod recorder;
pub mod shaders;

macro_rules! gpu_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: Self = $name(0);

            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != 0
            }
        }
    };
}

gpu_handle!(
    /// A linked vertex + fragment program.
    ProgramHandle
);
gpu_handle!(
    /// A vertex or index buffer.
    BufferHandle
);
gpu_handle!(
    /// A 2D texture.
    TextureHandle
);

/// What a buffer will be bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Upload frequency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    Static,
    /// Rewritten every frame.
    Dynamic,
}

/// Layout of bytes handed to `upload_texture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Luminance8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Luminance8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Vertex attribute layout a program expects. All attributes are f32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexLayout {
    /// `position: vec2<f32>`
    Position2,
    /// `position: vec2<f32>, uv: vec2<f32>`; the program samples a texture.
    Position2TexCoord2,
}

impl VertexLayout {
    /// Floats per vertex.
    pub fn floats(self) -> usize {
        match self {
            VertexLayout::Position2 => 2,
            VertexLayout::Position2TexCoord2 => 4,
        }
    }

    pub fn stride_bytes(self) -> u64 {
        (self.floats() * std::mem::size_of::<f32>()) as u64
    }

    pub fn is_textured(self) -> bool {
        matches!(self, VertexLayout::Position2TexCoord2)
    }
}

/// Source for one program: a vertex and a fragment stage.
///
/// The vertex module's entry point is `vs_main`, the fragment module's is
/// `fs_main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderPair {
    pub label: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
    pub layout: VertexLayout,
}

/// Primitive assembly. Everything is a triangle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    /// Non-indexed: `vertex_count` vertices straight from the vertex buffer.
    Triangles { vertex_count: u32 },
    /// Indexed with u32 indices from `DrawCommand::index_buffer`.
    IndexedTriangles { index_count: u32 },
}

impl DrawMode {
    /// Vertex count (non-indexed) or index count (indexed).
    pub fn elements(self) -> u32 {
        match self {
            DrawMode::Triangles { vertex_count } => vertex_count,
            DrawMode::IndexedTriangles { index_count } => index_count,
        }
    }
}

/// One draw with the currently bound program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub texture: Option<TextureHandle>,
    pub mode: DrawMode,
}

/// The GPU submission capability.
///
/// Calls never fail loudly: problems are logged by the implementation and
/// surface as invalid handles or skipped draws.
pub trait GpuSubmit {
    /// Compile and link `shaders`. Returns `ProgramHandle::INVALID` on failure.
    fn create_program(&mut self, shaders: &ShaderPair) -> ProgramHandle;
    /// Bind `program` for subsequent draws.
    fn use_program(&mut self, program: ProgramHandle);
    fn delete_program(&mut self, program: ProgramHandle);

    fn create_buffer(&mut self, kind: BufferKind) -> BufferHandle;
    /// Replace the buffer's contents with `data`.
    fn upload_buffer(&mut self, buffer: BufferHandle, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self) -> TextureHandle;
    /// Replace the texture's contents. `data` holds `width × height` pixels
    /// of `format`, tightly packed.
    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32, format: PixelFormat);
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Clear the render target.
    fn clear(&mut self, color: [f32; 4]);
    /// Draw with the bound program.
    fn draw(&mut self, cmd: &DrawCommand);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_zero_is_invalid() {
        assert!(!ProgramHandle::INVALID.is_valid());
        assert!(!BufferHandle::default().is_valid());
        assert!(TextureHandle(3).is_valid());
    }

    #[test]
    fn test_vertex_layout_strides() {
        assert_eq!(VertexLayout::Position2.stride_bytes(), 8);
        assert_eq!(VertexLayout::Position2TexCoord2.stride_bytes(), 16);
        assert!(VertexLayout::Position2TexCoord2.is_textured());
    }

    #[test]
    fn test_draw_mode_elements() {
        assert_eq!(DrawMode::Triangles { vertex_count: 12 }.elements(), 12);
        assert_eq!(DrawMode::IndexedTriangles { index_count: 6 }.elements(), 6);
    }
}
