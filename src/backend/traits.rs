//! Core executor abstraction
//!
//! The filtering code never talks to a graphics API directly. It drives a
//! [`GpuExecutor`], which owns the textures, compiles the pass programs and
//! records/submits the work in program order.

use thiserror::Error;

use crate::backend::types::*;
use crate::passes::ShaderProgram;

/// Executor error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize executor: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Failed to read back texture: {0}")]
    ReadbackFailed(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Narrow interface to the graphics device consumed by the filter passes.
///
/// Binding calls (`bind_*`, `upload_uniforms`) only stage state; nothing is
/// recorded until [`GpuExecutor::draw_fullscreen`]. Work is recorded in call
/// order and the executor is responsible for making writes to a texture
/// visible to later passes that sample it.
pub trait GpuExecutor {
    /// Executor name for logging
    fn name(&self) -> &'static str;

    // Resource management

    /// Create a cubemap with six faces
    fn create_cubemap(&mut self, desc: &CubemapDescriptor) -> BackendResult<TextureHandle>;

    /// Release a cubemap. Pending work that uses it still completes.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Inspect a cubemap created by this executor
    fn cubemap_descriptor(&self, texture: TextureHandle) -> Option<&CubemapDescriptor>;

    // Pass state

    /// Select the program used by the next draw
    fn bind_program(&mut self, program: ShaderProgram);

    /// Select the mip range sampled by the next draw
    fn bind_source(&mut self, source: SourceBinding);

    /// Select the face/mip written by the next draw
    fn bind_render_target(&mut self, target: TextureSurface);

    /// Set the uniform block of the next draw
    fn upload_uniforms(&mut self, data: &[u8]);

    // Submission

    /// Record a full-screen draw with the staged state
    fn draw_fullscreen(&mut self) -> BackendResult<()>;

    /// Record an exact copy of one surface into another of the same size
    fn copy_surface(&mut self, src: TextureSurface, dst: TextureSurface) -> BackendResult<()>;

    /// Submit everything recorded so far without waiting for completion
    fn flush(&mut self);

    // Texel transfer

    /// Upload linear RGBA texels into a surface, row-major from the top-left
    fn write_surface(&mut self, surface: TextureSurface, texels: &[[f32; 4]])
        -> BackendResult<()>;

    /// Read back a surface. Blocks until the GPU has finished.
    fn read_surface(&mut self, surface: TextureSurface) -> BackendResult<Vec<[f32; 4]>>;
}
