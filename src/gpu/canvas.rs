// gpu/canvas.rs - wgpu implementation of GpuSubmit.
//
// Everything is drawn into an offscreen RGBA8 target:
//
//   clear()  ──► render pass, LoadOp::Clear
//   draw()   ──► render pass, LoadOp::Load, bound pipeline, one draw call
//   readback() ──► copy_texture_to_buffer ──► map ──► tightly packed RGBA
//
// OBJECT TABLES:
// Programs, buffers and textures live in per-kind slot vectors. A handle is
// `slot index + 1`, so 0 stays free as the invalid handle. Deleting frees
// the wgpu object and leaves a `None` hole; slots are never reused, so a
// stale handle can only miss, never alias.
//
// ERRORS:
// Program creation runs inside a Validation error scope; a WGSL or pipeline
// error is logged and yields `ProgramHandle::INVALID`. Draws are scoped the
// same way so an out-of-range index buffer is logged instead of reaching
// the uncaptured-error handler. Anything that still escapes is routed to
// `log::error!` instead of the default panic handler.
//
// TEXTURES:
// Uploads in Luminance8 or Rgb8 are widened to RGBA8 on the CPU (wgpu has
// no 24-bit formats). The texture is recreated only when its size changes.

use log::{debug, error, warn};

use super::device::{GpuDevice, GpuError};
use super::{
    BufferHandle, BufferKind, BufferUsage, DrawCommand, DrawMode, GpuSubmit, PixelFormat,
    ProgramHandle, ShaderPair, TextureHandle, VertexLayout,
};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const POSITION_UV_ATTRS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

struct Program {
    pipeline: wgpu::RenderPipeline,
    layout: VertexLayout,
}

struct Buffer {
    kind: BufferKind,
    buffer: Option<wgpu::Buffer>,
    /// Bytes of valid data (the wgpu buffer may be larger).
    len: u64,
}

struct Texture {
    image: Option<(wgpu::Texture, wgpu::BindGroup)>,
    width: u32,
    height: u32,
}

/// Offscreen wgpu render target implementing [`GpuSubmit`].
pub struct GpuCanvas {
    width: u32,
    height: u32,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    programs: Vec<Option<Program>>,
    buffers: Vec<Option<Buffer>>,
    textures: Vec<Option<Texture>>,
    bound: ProgramHandle,
    upload_scratch: Vec<u8>,
    gpu: GpuDevice,
}

impl GpuCanvas {
    /// Create a `width × height` canvas on `gpu`.
    pub fn new(gpu: GpuDevice, width: u32, height: u32) -> Result<Self, GpuError> {
        if !gpu.supports_texture(width, height) {
            return Err(GpuError::TargetTooLarge {
                width,
                height,
                max: gpu.limits.max_texture_dimension_2d,
            });
        }

        gpu.device.on_uncaptured_error(Box::new(|e: wgpu::Error| error!("uncaptured wgpu error: {e}")));

        let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("GpuCanvas::target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let texture_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuCanvas::texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("GpuCanvas::sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(GpuCanvas {
            width,
            height,
            target,
            target_view,
            texture_layout,
            sampler,
            programs: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            bound: ProgramHandle::INVALID,
            upload_scratch: Vec::new(),
            gpu,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    /// Read the render target back as tightly packed RGBA8 rows.
    ///
    /// Synchronous and slow: for tests, screenshots and the demo window.
    pub fn readback(&self) -> Result<Vec<u8>, GpuError> {
        let row_bytes = self.width * 4;
        let aligned_row = align_to(row_bytes, COPY_ALIGNMENT);

        let staging = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuCanvas::readback"),
            size: (aligned_row * self.height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.encoder("GpuCanvas::readback");
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);
        receiver.recv().map_err(|_| GpuError::ReadbackLost)??;

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity((row_bytes * self.height) as usize);
        for y in 0..self.height as usize {
            let start = y * aligned_row as usize;
            out.extend_from_slice(&mapped[start..start + row_bytes as usize]);
        }
        drop(mapped);
        staging.unmap();
        Ok(out)
    }

    fn encoder(&self, label: &'static str) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn build_pipeline(&self, shaders: &ShaderPair) -> wgpu::RenderPipeline {
        let device = &self.gpu.device;
        let vs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shaders.label),
            source: wgpu::ShaderSource::Wgsl(shaders.vertex.into()),
        });
        let fs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shaders.label),
            source: wgpu::ShaderSource::Wgsl(shaders.fragment.into()),
        });

        let bind_group_layouts: &[&wgpu::BindGroupLayout] = if shaders.layout.is_textured() {
            &[&self.texture_layout]
        } else {
            &[]
        };
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(shaders.label),
            bind_group_layouts,
            push_constant_ranges: &[],
        });

        let attributes: &[wgpu::VertexAttribute] = match shaders.layout {
            VertexLayout::Position2 => &POSITION_ATTRS,
            VertexLayout::Position2TexCoord2 => &POSITION_UV_ATTRS,
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(shaders.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vs,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: shaders.layout.stride_bytes(),
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fs,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        })
    }

    fn pass<'e>(&'e self, encoder: &'e mut wgpu::CommandEncoder, load: wgpu::LoadOp<wgpu::Color>) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("GpuCanvas::pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    fn live_buffer(&self, handle: BufferHandle) -> Option<(&wgpu::Buffer, u64)> {
        let b = slot(&self.buffers, handle.0)?;
        b.buffer.as_ref().filter(|_| b.len > 0).map(|buf| (buf, b.len))
    }

    /// Widen `data` to RGBA8 in `upload_scratch`.
    fn widen_to_rgba(&mut self, data: &[u8], format: PixelFormat) {
        let out = &mut self.upload_scratch;
        out.clear();
        match format {
            PixelFormat::Rgba8 => out.extend_from_slice(data),
            PixelFormat::Rgb8 => {
                for px in data.chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            PixelFormat::Luminance8 => {
                for &v in data {
                    out.extend_from_slice(&[v, v, v, 255]);
                }
            }
        }
    }
}

impl GpuSubmit for GpuCanvas {
    fn create_program(&mut self, shaders: &ShaderPair) -> ProgramHandle {
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.build_pipeline(shaders);
        if let Some(e) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            error!("program '{}' failed to build: {e}", shaders.label);
            return ProgramHandle::INVALID;
        }
        self.programs.push(Some(Program {
            pipeline,
            layout: shaders.layout,
        }));
        debug!("program '{}' created", shaders.label);
        ProgramHandle(self.programs.len() as u32)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if slot(&self.programs, program.0).is_none() {
            warn!("use_program on unknown program {program:?}");
        }
        self.bound = program;
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        free(&mut self.programs, program.0);
        if self.bound == program {
            self.bound = ProgramHandle::INVALID;
        }
    }

    fn create_buffer(&mut self, kind: BufferKind) -> BufferHandle {
        self.buffers.push(Some(Buffer {
            kind,
            buffer: None,
            len: 0,
        }));
        BufferHandle(self.buffers.len() as u32)
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, data: &[u8], usage: BufferUsage) {
        let device = &self.gpu.device;
        let queue = &self.gpu.queue;
        let Some(Some(b)) = buffer.0.checked_sub(1).and_then(|i| self.buffers.get_mut(i as usize)) else {
            warn!("upload to unknown buffer {buffer:?}");
            return;
        };

        b.len = data.len() as u64;
        if data.is_empty() {
            return;
        }

        // write_buffer needs a 4-byte multiple.
        let padded = align_to(data.len() as u32, wgpu::COPY_BUFFER_ALIGNMENT as u32) as u64;
        let fits = b.buffer.as_ref().is_some_and(|buf| buf.size() >= padded);
        if !fits {
            let usage_flags = match b.kind {
                BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
                BufferKind::Index => wgpu::BufferUsages::INDEX,
            } | wgpu::BufferUsages::COPY_DST;
            // Dynamic buffers grow geometrically so per-frame size jitter
            // does not reallocate every tick.
            let size = match usage {
                BufferUsage::Static => padded,
                BufferUsage::Dynamic => padded.next_power_of_two(),
            };
            b.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("GpuCanvas::buffer"),
                size,
                usage: usage_flags,
                mapped_at_creation: false,
            }));
        }

        if let Some(buf) = b.buffer.as_ref() {
            if padded == data.len() as u64 {
                queue.write_buffer(buf, 0, data);
            } else {
                let mut tail = data.to_vec();
                tail.resize(padded as usize, 0);
                queue.write_buffer(buf, 0, &tail);
            }
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        free(&mut self.buffers, buffer.0);
    }

    fn create_texture(&mut self) -> TextureHandle {
        self.textures.push(Some(Texture {
            image: None,
            width: 0,
            height: 0,
        }));
        TextureHandle(self.textures.len() as u32)
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32, format: PixelFormat) {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            error!("texture upload of {} bytes, {width}×{height} {format:?} needs {expected}", data.len());
            return;
        }
        if slot(&self.textures, texture.0).is_none() {
            warn!("upload to unknown texture {texture:?}");
            return;
        }
        if width == 0 || height == 0 {
            debug!("skipping empty texture upload");
            return;
        }

        self.widen_to_rgba(data, format);

        let needs_alloc = slot(&self.textures, texture.0)
            .is_some_and(|t| t.image.is_none() || t.width != width || t.height != height);
        if needs_alloc {
            let tex = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("GpuCanvas::texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("GpuCanvas::texture_bind_group"),
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            if let Some(Some(t)) = self.textures.get_mut(texture.0 as usize - 1) {
                *t = Texture {
                    image: Some((tex, bind_group)),
                    width,
                    height,
                };
            }
        }

        if let Some((tex, _)) = slot(&self.textures, texture.0).and_then(|t| t.image.as_ref()) {
            self.gpu.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: tex,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &self.upload_scratch,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        free(&mut self.textures, texture.0);
    }

    fn clear(&mut self, color: [f32; 4]) {
        let mut encoder = self.encoder("GpuCanvas::clear");
        {
            let [r, g, b, a] = color.map(f64::from);
            let _pass = self.pass(&mut encoder, wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }));
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn draw(&mut self, cmd: &DrawCommand) {
        let Some(program) = slot(&self.programs, self.bound.0) else {
            error!("draw with no valid program bound ({:?})", self.bound);
            return;
        };
        let Some((vertices, vertex_len)) = self.live_buffer(cmd.vertex_buffer) else {
            debug!("draw skipped: vertex buffer {:?} empty or unknown", cmd.vertex_buffer);
            return;
        };
        let bind_group = match (program.layout.is_textured(), cmd.texture) {
            (false, _) => None,
            (true, Some(t)) => match slot(&self.textures, t.0).and_then(|t| t.image.as_ref()) {
                Some((_, bg)) => Some(bg),
                None => {
                    debug!("draw skipped: texture {t:?} has no image");
                    return;
                }
            },
            (true, None) => {
                error!("textured program drawn without a texture");
                return;
            }
        };
        let indices = match cmd.mode {
            DrawMode::IndexedTriangles { .. } => match cmd.index_buffer.and_then(|h| self.live_buffer(h)) {
                Some(ib) => Some(ib),
                None => {
                    error!("indexed draw without a usable index buffer");
                    return;
                }
            },
            DrawMode::Triangles { .. } => None,
        };

        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.encoder("GpuCanvas::draw");
        {
            let mut pass = self.pass(&mut encoder, wgpu::LoadOp::Load);
            pass.set_pipeline(&program.pipeline);
            if let Some(bg) = bind_group {
                pass.set_bind_group(0, bg, &[]);
            }
            pass.set_vertex_buffer(0, vertices.slice(..vertex_len));
            match (cmd.mode, indices) {
                (DrawMode::IndexedTriangles { index_count }, Some((ib, ib_len))) => {
                    pass.set_index_buffer(ib.slice(..ib_len), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..index_count, 0, 0..1);
                }
                (DrawMode::Triangles { vertex_count }, _) => pass.draw(0..vertex_count, 0..1),
                (DrawMode::IndexedTriangles { .. }, None) => {}
            }
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        if let Some(e) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            error!("draw rejected: {e}");
        }
    }
}

fn slot<T>(table: &[Option<T>], id: u32) -> Option<&T> {
    let i = id.checked_sub(1)? as usize;
    table.get(i).and_then(Option::as_ref)
}

fn free<T>(table: &mut [Option<T>], id: u32) {
    if let Some(s) = id.checked_sub(1).and_then(|i| table.get_mut(i as usize)) {
        *s = None;
    }
}

/// Round `value` up to the next multiple of `alignment`.
#[inline]
fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
