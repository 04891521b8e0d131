// gpu/shaders.rs - The two programs every renderer draws with.
//
//   SOLID     markers (squares and lines), flat red
//   TEXTURED  full-viewport quad sampling the detector image

use super::{ShaderPair, VertexLayout};

pub const SOLID: ShaderPair = ShaderPair {
    label: "solid",
    vertex: include_str!("../shaders/solid.vert.wgsl"),
    fragment: include_str!("../shaders/solid.frag.wgsl"),
    layout: VertexLayout::Position2,
};

pub const TEXTURED: ShaderPair = ShaderPair {
    label: "textured",
    vertex: include_str!("../shaders/textured.vert.wgsl"),
    fragment: include_str!("../shaders/textured.frag.wgsl"),
    layout: VertexLayout::Position2TexCoord2,
};
