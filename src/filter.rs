//! Specular reflection probe filtering
//!
//! Turns a cubemap whose mip 0 holds a captured environment into a probe
//! whose mip `k` holds the GGX-filtered radiance for roughness
//! `k / mip_count`:
//!
//! 1. Mip 0 is copied into a scratch cubemap of the same size
//! 2. The scratch chain is built by downsampling level by level
//! 3. Every mip above 0 of the probe is importance-sampled from the whole
//!    scratch chain
//!
//! Mip 0 of the probe is only ever read.

use crate::backend::{
    CubemapDescriptor, GpuExecutor, SourceBinding, TextureHandle, TextureSurface, TextureUsage,
};
use crate::cube::CubeFace;
use crate::error::{FilterError, FilterResult};
use crate::passes::{checked_descriptor, downsample_cubemap, importance_sample};
use crate::rescale::scale_cubemap;

/// Scratch storage of one filter run.
enum Scratch {
    Owned(TextureHandle),
    Borrowed(TextureHandle),
}

impl Scratch {
    fn handle(&self) -> TextureHandle {
        match self {
            Scratch::Owned(handle) | Scratch::Borrowed(handle) => *handle,
        }
    }
}

/// Filter `cubemap` in place for specular image-based lighting.
///
/// `scratch` has to match the cubemap's size and format and hold at least
/// as many mips. Without one, a scratch cubemap is allocated for the call
/// and destroyed before returning, also when filtering fails.
///
/// All arguments are validated before the first pass is issued, so an error
/// other than [`FilterError::Backend`] leaves every texture untouched.
pub fn filter_cubemap_for_specular<E: GpuExecutor + ?Sized>(
    ctx: &mut E,
    cubemap: TextureHandle,
    scratch: Option<TextureHandle>,
) -> FilterResult<()> {
    let desc = checked_descriptor(
        ctx,
        cubemap,
        TextureUsage::COPY_SRC | TextureUsage::RENDER_ATTACHMENT,
    )?;
    if let Some(scratch) = scratch {
        validate_scratch(ctx, &desc, cubemap, scratch)?;
    }

    let num_mips = desc.mip_level_count;
    if num_mips <= 1 {
        log::debug!(
            "Cubemap {} has a single mip level, nothing to filter",
            cubemap.id()
        );
        return Ok(());
    }

    let scratch = match scratch {
        Some(handle) => Scratch::Borrowed(handle),
        None => {
            let scratch_desc = CubemapDescriptor::new(desc.size, desc.format)
                .with_label("Reflection Probe Scratch")
                .with_mip_levels(num_mips)
                .with_usage(TextureUsage::REFLECTION_PROBE);
            Scratch::Owned(ctx.create_cubemap(&scratch_desc)?)
        }
    };

    log::info!(
        "Filtering reflection probe {} ({}x{}, {} mips)",
        cubemap.id(),
        desc.size,
        desc.size,
        num_mips
    );

    let result = run_passes(ctx, cubemap, scratch.handle(), num_mips);

    if let Scratch::Owned(handle) = scratch {
        ctx.destroy_texture(handle);
    }
    result
}

fn validate_scratch<E: GpuExecutor + ?Sized>(
    ctx: &E,
    desc: &CubemapDescriptor,
    cubemap: TextureHandle,
    scratch: TextureHandle,
) -> FilterResult<()> {
    if scratch == cubemap {
        return Err(FilterError::AliasedSourceAndTarget(scratch));
    }

    let scratch_desc = checked_descriptor(ctx, scratch, TextureUsage::REFLECTION_PROBE)?;
    if scratch_desc.size != desc.size {
        return Err(FilterError::ScratchSizeMismatch {
            expected: desc.size,
            actual: scratch_desc.size,
        });
    }
    if scratch_desc.format != desc.format {
        return Err(FilterError::ScratchFormatMismatch {
            expected: desc.format,
            actual: scratch_desc.format,
        });
    }
    if scratch_desc.mip_level_count < desc.mip_level_count {
        return Err(FilterError::ScratchMipCountMismatch {
            expected: desc.mip_level_count,
            actual: scratch_desc.mip_level_count,
        });
    }
    Ok(())
}

fn run_passes<E: GpuExecutor + ?Sized>(
    ctx: &mut E,
    cubemap: TextureHandle,
    scratch: TextureHandle,
    num_mips: u32,
) -> FilterResult<()> {
    scale_cubemap(ctx, cubemap, 0, scratch, 0)?;

    for mip in 1..num_mips {
        log::debug!("Downsampling scratch mip {} -> {}", mip - 1, mip);
        downsample_cubemap(ctx, scratch, mip - 1, scratch, mip)?;
    }

    let source = SourceBinding::mip_chain(scratch, num_mips);
    for mip in 1..num_mips {
        log::debug!("Importance sampling probe mip {}", mip);
        for face in CubeFace::ALL {
            importance_sample(ctx, source, TextureSurface::new(cubemap, face.index(), mip))?;
        }
    }

    ctx.flush();
    log::info!("Reflection probe {} filtered", cubemap.id());
    Ok(())
}
