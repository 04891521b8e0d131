// gpu/recorder.rs - Headless GpuSubmit that records every call.
//
// The recorder hands out unique non-zero handles, remembers which objects
// are alive, keeps the last bytes uploaded to each buffer, and appends one
// `GpuCommand` per call. Tests assert against the command log; leak checks
// use the live-object counters.
//
// `fail_program(label)` makes later `create_program` calls for that label
// return `ProgramHandle::INVALID`, standing in for a driver compile error.

use std::collections::{HashMap, HashSet};

use log::{error, warn};

use super::{
    BufferHandle, BufferKind, BufferUsage, DrawCommand, GpuSubmit, PixelFormat, ProgramHandle,
    ShaderPair, TextureHandle,
};

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateProgram { label: &'static str, handle: ProgramHandle },
    UseProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    CreateBuffer { kind: BufferKind, handle: BufferHandle },
    UploadBuffer { handle: BufferHandle, bytes: usize, usage: BufferUsage },
    DeleteBuffer(BufferHandle),
    CreateTexture(TextureHandle),
    UploadTexture { handle: TextureHandle, width: u32, height: u32, format: PixelFormat },
    DeleteTexture(TextureHandle),
    Clear([f32; 4]),
    /// A draw, tagged with the program bound at the time.
    Draw { program: ProgramHandle, command: DrawCommand },
}

#[derive(Debug, Default)]
pub struct CommandRecorder {
    commands: Vec<GpuCommand>,
    next_id: u32,
    bound: ProgramHandle,
    failing: HashSet<String>,
    programs: HashSet<u32>,
    buffers: HashMap<u32, Vec<u8>>,
    textures: HashSet<u32>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make compilation of the program labelled `label` fail from now on.
    pub fn fail_program(&mut self, label: &str) {
        self.failing.insert(label.to_string());
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drain the command log (object state is kept).
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Recorded draws, in order.
    pub fn draws(&self) -> impl Iterator<Item = (ProgramHandle, &DrawCommand)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::Draw { program, command } => Some((*program, command)),
            _ => None,
        })
    }

    pub fn bound_program(&self) -> ProgramHandle {
        self.bound
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Bytes most recently uploaded to `buffer`, if it is alive.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    fn next_handle(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GpuSubmit for CommandRecorder {
    fn create_program(&mut self, shaders: &ShaderPair) -> ProgramHandle {
        let handle = if self.failing.contains(shaders.label) {
            error!("program '{}' failed to compile (injected)", shaders.label);
            ProgramHandle::INVALID
        } else {
            let h = ProgramHandle(self.next_handle());
            self.programs.insert(h.0);
            h
        };
        self.commands.push(GpuCommand::CreateProgram {
            label: shaders.label,
            handle,
        });
        handle
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if !self.programs.contains(&program.0) {
            warn!("use_program on unknown program {program:?}");
        }
        self.bound = program;
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        if self.bound == program {
            self.bound = ProgramHandle::INVALID;
        }
        self.commands.push(GpuCommand::DeleteProgram(program));
    }

    fn create_buffer(&mut self, kind: BufferKind) -> BufferHandle {
        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(handle.0, Vec::new());
        self.commands.push(GpuCommand::CreateBuffer { kind, handle });
        handle
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, data: &[u8], usage: BufferUsage) {
        match self.buffers.get_mut(&buffer.0) {
            Some(contents) => {
                contents.clear();
                contents.extend_from_slice(data);
            }
            None => warn!("upload to unknown buffer {buffer:?}"),
        }
        self.commands.push(GpuCommand::UploadBuffer {
            handle: buffer,
            bytes: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        self.commands.push(GpuCommand::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next_handle());
        self.textures.insert(handle.0);
        self.commands.push(GpuCommand::CreateTexture(handle));
        handle
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32, format: PixelFormat) {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            warn!("texture upload of {} bytes, {width}×{height} {format:?} needs {expected}", data.len());
        }
        self.commands.push(GpuCommand::UploadTexture {
            handle: texture,
            width,
            height,
            format,
        });
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.commands.push(GpuCommand::DeleteTexture(texture));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(GpuCommand::Clear(color));
    }

    fn draw(&mut self, cmd: &DrawCommand) {
        self.commands.push(GpuCommand::Draw {
            program: self.bound,
            command: *cmd,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::shaders::{SOLID, TEXTURED};
    use crate::gpu::DrawMode;

    #[test]
    fn test_handles_unique_and_valid() {
        let mut r = CommandRecorder::new();
        let p = r.create_program(&SOLID);
        let b = r.create_buffer(BufferKind::Vertex);
        let t = r.create_texture();
        assert!(p.is_valid() && b.is_valid() && t.is_valid());
        let ids: HashSet<u32> = [p.0, b.0, t.0].into_iter().collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_injected_compile_failure() {
        let mut r = CommandRecorder::new();
        r.fail_program("textured");
        assert!(!r.create_program(&TEXTURED).is_valid());
        assert!(r.create_program(&SOLID).is_valid());
        assert_eq!(r.live_programs(), 1);
    }

    #[test]
    fn test_draw_tagged_with_bound_program() {
        let mut r = CommandRecorder::new();
        let p = r.create_program(&SOLID);
        let vb = r.create_buffer(BufferKind::Vertex);
        r.use_program(p);
        let cmd = DrawCommand {
            vertex_buffer: vb,
            index_buffer: None,
            texture: None,
            mode: DrawMode::Triangles { vertex_count: 6 },
        };
        r.draw(&cmd);
        let draws: Vec<_> = r.draws().collect();
        assert_eq!(draws, vec![(p, &cmd)]);
    }

    #[test]
    fn test_buffer_contents_and_release() {
        let mut r = CommandRecorder::new();
        let b = r.create_buffer(BufferKind::Index);
        r.upload_buffer(b, &[1, 2, 3], BufferUsage::Dynamic);
        assert_eq!(r.buffer_contents(b), Some(&[1u8, 2, 3][..]));
        r.delete_buffer(b);
        assert_eq!(r.live_buffers(), 0);
        assert!(r.buffer_contents(b).is_none());
    }

    #[test]
    fn test_take_commands_drains_log() {
        let mut r = CommandRecorder::new();
        r.clear([0.0, 0.0, 0.0, 1.0]);
        assert_eq!(r.take_commands().len(), 1);
        assert!(r.commands().is_empty());
    }
}
