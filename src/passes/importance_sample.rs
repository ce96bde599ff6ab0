//! GGX importance-sample pass
//!
//! Convolves a box-filtered mip chain with the GGX lobe of the roughness
//! that belongs to the destination mip. Each sample reads the chain at a lod
//! chosen from its PDF, so a fixed sample count covers wide lobes without
//! aliasing.

use crate::backend::{GpuExecutor, SourceBinding, TextureSurface, TextureUsage};
use crate::error::{FilterError, FilterResult};
use crate::passes::{check_face, check_mip, checked_descriptor, FilterPass, ImportanceSampleParams};
use crate::sampling::{precomputed_mip_factor, NUM_SAMPLES};

/// Filter face `destination.face` of mip `destination.mip_level` from the
/// mip chain bound by `source`.
///
/// `source` must not live in the destination texture.
pub fn importance_sample<E: GpuExecutor + ?Sized>(
    ctx: &mut E,
    source: SourceBinding,
    destination: TextureSurface,
) -> FilterResult<()> {
    let src_desc = checked_descriptor(ctx, source.texture, TextureUsage::TEXTURE_BINDING)?;
    if source.mip_level_count == 0 {
        return Err(FilterError::MipOutOfRange {
            mip: source.base_mip_level,
            mip_count: 0,
        });
    }
    check_mip(&src_desc, source.base_mip_level + source.mip_level_count - 1)?;

    let dst_desc = checked_descriptor(ctx, destination.texture, TextureUsage::RENDER_ATTACHMENT)?;
    check_face(destination.face)?;
    check_mip(&dst_desc, destination.mip_level)?;

    if source.texture == destination.texture {
        return Err(FilterError::AliasedSourceAndTarget(source.texture));
    }

    let params = ImportanceSampleParams {
        cube_face: destination.face,
        mip_level: destination.mip_level,
        num_mips: source.mip_level_count,
        precomputed_mip_factor: precomputed_mip_factor(
            src_desc.mip_size(source.base_mip_level),
            NUM_SAMPLES,
        ),
    };

    FilterPass::ImportanceSample { source, params }.execute(ctx, destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CubemapDescriptor, DummyExecutor, TextureHandle};

    fn setup() -> (DummyExecutor, TextureHandle, TextureHandle) {
        let mut executor = DummyExecutor::new();
        let scratch = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(32))
            .unwrap();
        let probe = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(32))
            .unwrap();
        executor.clear_commands();
        (executor, scratch, probe)
    }

    #[test]
    fn test_uniforms_describe_destination() {
        let (mut executor, scratch, probe) = setup();
        importance_sample(
            &mut executor,
            SourceBinding::mip_chain(scratch, 6),
            TextureSurface::new(probe, 4, 2),
        )
        .unwrap();

        let (_, source, _, uniforms) = executor.draws().next().unwrap();
        let params: ImportanceSampleParams = bytemuck::pod_read_unaligned(uniforms);
        assert_eq!(source, SourceBinding::mip_chain(scratch, 6));
        assert_eq!(params.cube_face, 4);
        assert_eq!(params.mip_level, 2);
        assert_eq!(params.num_mips, 6);
        assert_eq!(
            params.precomputed_mip_factor,
            precomputed_mip_factor(32, NUM_SAMPLES)
        );
    }

    #[test]
    fn test_rejects_aliased_source() {
        let (mut executor, _, probe) = setup();
        let result = importance_sample(
            &mut executor,
            SourceBinding::single_mip(probe, 0),
            TextureSurface::new(probe, 0, 1),
        );
        assert_eq!(result, Err(FilterError::AliasedSourceAndTarget(probe)));
        assert_eq!(executor.draws().count(), 0);
    }

    #[test]
    fn test_rejects_chain_past_last_mip() {
        let (mut executor, scratch, probe) = setup();
        let result = importance_sample(
            &mut executor,
            SourceBinding::mip_chain(scratch, 7),
            TextureSurface::new(probe, 0, 1),
        );
        assert_eq!(
            result,
            Err(FilterError::MipOutOfRange {
                mip: 6,
                mip_count: 6
            })
        );
    }

    #[test]
    fn test_rejects_unknown_texture() {
        let (mut executor, scratch, _) = setup();
        let stale = TextureHandle(999);
        let result = importance_sample(
            &mut executor,
            SourceBinding::mip_chain(scratch, 6),
            TextureSurface::new(stale, 0, 1),
        );
        assert_eq!(result, Err(FilterError::UnknownTexture(stale)));
    }
}
