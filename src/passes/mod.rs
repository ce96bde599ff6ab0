//! Filter passes
//!
//! Each pass is one full-screen draw into a single face of a single mip:
//!
//! 1. Downsample - bilinear reduction of a source mip (also used for
//!    arbitrary-ratio rescaling)
//! 2. Importance sample - GGX convolution of a pre-filtered mip chain
//!
//! A [`FilterPass`] is plain data: the program to run, the mip range it
//! samples and its uniform record. Executing it stages that state on the
//! executor and issues the draw.

pub mod downsample;
pub mod importance_sample;
pub mod params;
pub mod shaders;

pub use downsample::{downsample, downsample_cubemap};
pub use importance_sample::importance_sample;
pub use params::{DownsampleParams, ImportanceSampleParams};

use crate::backend::{
    BackendResult, CubemapDescriptor, GpuExecutor, SourceBinding, TextureHandle, TextureSurface,
    TextureUsage,
};
use crate::cube::FACE_COUNT;
use crate::error::{FilterError, FilterResult};

/// Programs the executor has to be able to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    Downsample,
    ImportanceSample,
}

impl ShaderProgram {
    pub const ALL: [ShaderProgram; 2] = [ShaderProgram::Downsample, ShaderProgram::ImportanceSample];

    /// Debug label used for pipelines and log output
    pub fn label(&self) -> &'static str {
        match self {
            ShaderProgram::Downsample => "Cubemap Downsample",
            ShaderProgram::ImportanceSample => "Cubemap Importance Sample",
        }
    }

    /// WGSL source of the program
    pub fn source(&self) -> String {
        shaders::source(*self)
    }
}

/// A single draw of one of the filter programs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterPass {
    Downsample {
        source: SourceBinding,
        params: DownsampleParams,
    },
    ImportanceSample {
        source: SourceBinding,
        params: ImportanceSampleParams,
    },
}

impl FilterPass {
    pub fn program(&self) -> ShaderProgram {
        match self {
            FilterPass::Downsample { .. } => ShaderProgram::Downsample,
            FilterPass::ImportanceSample { .. } => ShaderProgram::ImportanceSample,
        }
    }

    pub fn source(&self) -> SourceBinding {
        match self {
            FilterPass::Downsample { source, .. } | FilterPass::ImportanceSample { source, .. } => {
                *source
            }
        }
    }

    /// Raw bytes of the uniform record
    pub fn uniforms(&self) -> &[u8] {
        match self {
            FilterPass::Downsample { params, .. } => bytemuck::bytes_of(params),
            FilterPass::ImportanceSample { params, .. } => bytemuck::bytes_of(params),
        }
    }

    /// Stage the pass on `ctx` and draw into `target`.
    ///
    /// Arguments are not validated here; callers go through [`downsample`]
    /// or [`importance_sample`].
    pub fn execute<E: GpuExecutor + ?Sized>(
        &self,
        ctx: &mut E,
        target: TextureSurface,
    ) -> BackendResult<()> {
        let source = self.source();
        log::trace!(
            "{}: texture {} mips {}..{} -> texture {} face {} mip {}",
            self.program().label(),
            source.texture.id(),
            source.base_mip_level,
            source.base_mip_level + source.mip_level_count,
            target.texture.id(),
            target.face,
            target.mip_level
        );

        ctx.bind_program(self.program());
        ctx.bind_source(source);
        ctx.bind_render_target(target);
        ctx.upload_uniforms(self.uniforms());
        ctx.draw_fullscreen()
    }
}

/// Descriptor of `texture`, checked to carry `usage`.
pub(crate) fn checked_descriptor<E: GpuExecutor + ?Sized>(
    ctx: &E,
    texture: TextureHandle,
    usage: TextureUsage,
) -> FilterResult<CubemapDescriptor> {
    let desc = ctx
        .cubemap_descriptor(texture)
        .ok_or(FilterError::UnknownTexture(texture))?;
    if !desc.usage.contains(usage) {
        return Err(FilterError::MissingUsage { texture, usage });
    }
    Ok(desc.clone())
}

pub(crate) fn check_mip(desc: &CubemapDescriptor, mip: u32) -> FilterResult<()> {
    if mip >= desc.mip_level_count {
        return Err(FilterError::MipOutOfRange {
            mip,
            mip_count: desc.mip_level_count,
        });
    }
    Ok(())
}

pub(crate) fn check_face(face: u32) -> FilterResult<()> {
    if face >= FACE_COUNT {
        return Err(FilterError::FaceOutOfRange(face));
    }
    Ok(())
}
