//! Dummy executor for testing and development.
//!
//! This executor doesn't perform actual GPU operations. It keeps track of
//! the cubemaps it was asked to create and records every command it receives,
//! so the order and parameters of issued passes can be inspected without
//! requiring GPU hardware.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::passes::ShaderProgram;

/// A command recorded by the [`DummyExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutedCommand {
    CreateCubemap {
        texture: TextureHandle,
        desc: CubemapDescriptor,
    },
    DestroyTexture(TextureHandle),
    Draw {
        program: ShaderProgram,
        source: SourceBinding,
        target: TextureSurface,
        uniforms: Vec<u8>,
    },
    Copy {
        src: TextureSurface,
        dst: TextureSurface,
    },
    Write(TextureSurface),
    Read(TextureSurface),
    Flush,
}

#[derive(Debug, Default)]
struct StagedState {
    program: Option<ShaderProgram>,
    source: Option<SourceBinding>,
    target: Option<TextureSurface>,
    uniforms: Vec<u8>,
}

/// Dummy executor.
#[derive(Debug)]
pub struct DummyExecutor {
    textures: HashMap<TextureHandle, CubemapDescriptor>,
    next_texture_id: u64,
    staged: StagedState,
    commands: Vec<ExecutedCommand>,
    fail_allocations: bool,
    draws_left: Option<usize>,
}

impl DummyExecutor {
    /// Create a new dummy executor.
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_texture_id: 1,
            staged: StagedState::default(),
            commands: Vec::new(),
            fail_allocations: false,
            draws_left: None,
        }
    }

    /// Make every following `create_cubemap` call fail with `OutOfMemory`.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Let `count` more draws succeed, then fail every draw with `DeviceLost`.
    pub fn fail_draws_after(&mut self, count: usize) {
        self.draws_left = Some(count);
    }

    /// Commands recorded so far, in submission order.
    pub fn commands(&self) -> &[ExecutedCommand] {
        &self.commands
    }

    /// Forget the recorded commands.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of cubemaps currently alive.
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Recorded draws as `(program, source, target, uniforms)`.
    pub fn draws(
        &self,
    ) -> impl Iterator<Item = (ShaderProgram, SourceBinding, TextureSurface, &[u8])> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            ExecutedCommand::Draw {
                program,
                source,
                target,
                uniforms,
            } => Some((*program, *source, *target, uniforms.as_slice())),
            _ => None,
        })
    }

    fn surface_desc(&self, surface: TextureSurface) -> BackendResult<&CubemapDescriptor> {
        let desc = self.textures.get(&surface.texture).ok_or_else(|| {
            BackendError::InvalidOperation(format!("unknown texture {}", surface.texture.id()))
        })?;
        if surface.face >= 6 || surface.mip_level >= desc.mip_level_count {
            return Err(BackendError::InvalidOperation(format!(
                "surface face {} mip {} out of range",
                surface.face, surface.mip_level
            )));
        }
        Ok(desc)
    }
}

impl Default for DummyExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuExecutor for DummyExecutor {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_cubemap(&mut self, desc: &CubemapDescriptor) -> BackendResult<TextureHandle> {
        if self.fail_allocations {
            log::trace!("DummyExecutor: refusing allocation of {:?}", desc.label);
            return Err(BackendError::OutOfMemory);
        }

        let texture = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;

        log::trace!(
            "DummyExecutor: creating cubemap {:?} ({}x{}, {} mips)",
            desc.label,
            desc.size,
            desc.size,
            desc.mip_level_count
        );

        self.textures.insert(texture, desc.clone());
        self.commands.push(ExecutedCommand::CreateCubemap {
            texture,
            desc: desc.clone(),
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        log::trace!("DummyExecutor: destroying texture {}", texture.id());
        self.textures.remove(&texture);
        self.commands.push(ExecutedCommand::DestroyTexture(texture));
    }

    fn cubemap_descriptor(&self, texture: TextureHandle) -> Option<&CubemapDescriptor> {
        self.textures.get(&texture)
    }

    fn bind_program(&mut self, program: ShaderProgram) {
        self.staged.program = Some(program);
    }

    fn bind_source(&mut self, source: SourceBinding) {
        self.staged.source = Some(source);
    }

    fn bind_render_target(&mut self, target: TextureSurface) {
        self.staged.target = Some(target);
    }

    fn upload_uniforms(&mut self, data: &[u8]) {
        self.staged.uniforms = data.to_vec();
    }

    fn draw_fullscreen(&mut self) -> BackendResult<()> {
        let (Some(program), Some(source), Some(target)) =
            (self.staged.program, self.staged.source, self.staged.target)
        else {
            return Err(BackendError::InvalidOperation(
                "draw without program, source and target bound".into(),
            ));
        };
        self.surface_desc(target)?;

        match self.draws_left {
            Some(0) => return Err(BackendError::DeviceLost),
            Some(ref mut left) => *left -= 1,
            None => {}
        }

        log::trace!(
            "DummyExecutor: draw {:?} into texture {} face {} mip {}",
            program,
            target.texture.id(),
            target.face,
            target.mip_level
        );

        self.commands.push(ExecutedCommand::Draw {
            program,
            source,
            target,
            uniforms: self.staged.uniforms.clone(),
        });
        Ok(())
    }

    fn copy_surface(&mut self, src: TextureSurface, dst: TextureSurface) -> BackendResult<()> {
        let src_size = self.surface_desc(src)?.mip_size(src.mip_level);
        let dst_size = self.surface_desc(dst)?.mip_size(dst.mip_level);
        if src_size != dst_size {
            return Err(BackendError::InvalidOperation(format!(
                "copy between {src_size}x{src_size} and {dst_size}x{dst_size} surfaces"
            )));
        }

        self.commands.push(ExecutedCommand::Copy { src, dst });
        Ok(())
    }

    fn flush(&mut self) {
        self.commands.push(ExecutedCommand::Flush);
    }

    fn write_surface(
        &mut self,
        surface: TextureSurface,
        texels: &[[f32; 4]],
    ) -> BackendResult<()> {
        let expected = self.surface_desc(surface)?.face_texel_count(surface.mip_level);
        if texels.len() != expected {
            return Err(BackendError::InvalidOperation(format!(
                "expected {expected} texels, got {}",
                texels.len()
            )));
        }

        self.commands.push(ExecutedCommand::Write(surface));
        Ok(())
    }

    fn read_surface(&mut self, surface: TextureSurface) -> BackendResult<Vec<[f32; 4]>> {
        let count = self.surface_desc(surface)?.face_texel_count(surface.mip_level);
        self.commands.push(ExecutedCommand::Read(surface));
        // Return zeroed data
        Ok(vec![[0.0; 4]; count])
    }
}
