//! Cubemap downsample pass
//!
//! Renders one face of a mip into a surface half its edge by sampling the
//! source at every destination texel's direction with bilinear filtering.

use crate::backend::{GpuExecutor, SourceBinding, TextureHandle, TextureSurface, TextureUsage};
use crate::cube::{self, CubeFace};
use crate::error::{FilterError, FilterResult};
use crate::passes::{check_face, check_mip, checked_descriptor, DownsampleParams, FilterPass};

/// Downsample face `destination.face` of `source` mip `source_mip` into
/// `destination`, which has to be exactly half the source edge (min 1).
pub fn downsample<E: GpuExecutor + ?Sized>(
    ctx: &mut E,
    source: TextureHandle,
    source_mip: u32,
    destination: TextureSurface,
) -> FilterResult<()> {
    let pass = prepare(ctx, source, source_mip, destination)?;
    pass.execute(ctx, destination)?;
    Ok(())
}

/// Downsample all six faces of `source_mip` into `dest_mip` of `destination`.
///
/// Everything is validated before the first face is drawn.
pub fn downsample_cubemap<E: GpuExecutor + ?Sized>(
    ctx: &mut E,
    source: TextureHandle,
    source_mip: u32,
    destination: TextureHandle,
    dest_mip: u32,
) -> FilterResult<()> {
    let passes = CubeFace::ALL
        .iter()
        .map(|face| {
            let target = TextureSurface::new(destination, face.index(), dest_mip);
            prepare(ctx, source, source_mip, target).map(|pass| (pass, target))
        })
        .collect::<FilterResult<Vec<_>>>()?;

    for (pass, target) in passes {
        pass.execute(ctx, target)?;
    }
    Ok(())
}

fn prepare<E: GpuExecutor + ?Sized>(
    ctx: &E,
    source: TextureHandle,
    source_mip: u32,
    destination: TextureSurface,
) -> FilterResult<FilterPass> {
    let src_desc = checked_descriptor(ctx, source, TextureUsage::TEXTURE_BINDING)?;
    check_mip(&src_desc, source_mip)?;

    let dst_desc = checked_descriptor(ctx, destination.texture, TextureUsage::RENDER_ATTACHMENT)?;
    check_face(destination.face)?;
    check_mip(&dst_desc, destination.mip_level)?;

    if source == destination.texture && source_mip == destination.mip_level {
        return Err(FilterError::AliasedSourceAndTarget(source));
    }

    let expected = cube::mip_size(src_desc.mip_size(source_mip), 1);
    let actual = dst_desc.mip_size(destination.mip_level);
    if expected != actual {
        return Err(FilterError::ResolutionMismatch { expected, actual });
    }

    Ok(FilterPass::Downsample {
        source: SourceBinding::single_mip(source, source_mip),
        params: DownsampleParams::new(destination.face),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CubemapDescriptor, DummyExecutor, TextureFormat};
    use crate::passes::ShaderProgram;

    fn setup() -> (DummyExecutor, TextureHandle) {
        let mut executor = DummyExecutor::new();
        let texture = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(16))
            .unwrap();
        executor.clear_commands();
        (executor, texture)
    }

    #[test]
    fn test_downsample_within_chain() {
        let (mut executor, texture) = setup();
        downsample(&mut executor, texture, 0, TextureSurface::new(texture, 2, 1)).unwrap();

        let draws: Vec<_> = executor.draws().collect();
        assert_eq!(draws.len(), 1);
        let (program, source, target, uniforms) = draws[0];
        assert_eq!(program, ShaderProgram::Downsample);
        assert_eq!(source, SourceBinding::single_mip(texture, 0));
        assert_eq!(target, TextureSurface::new(texture, 2, 1));
        assert_eq!(uniforms, bytemuck::bytes_of(&DownsampleParams::new(2)));
    }

    #[test]
    fn test_downsample_rejects_wrong_resolution() {
        let (mut executor, texture) = setup();
        let result = downsample(&mut executor, texture, 0, TextureSurface::new(texture, 0, 2));
        assert_eq!(
            result,
            Err(FilterError::ResolutionMismatch {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(executor.draws().count(), 0);
    }

    #[test]
    fn test_downsample_at_one_texel() {
        let (mut executor, texture) = setup();
        let last = executor.cubemap_descriptor(texture).unwrap().mip_level_count - 1;
        let other = executor
            .create_cubemap(&CubemapDescriptor::new(1, TextureFormat::Rgba16Float))
            .unwrap();

        downsample(&mut executor, texture, last, TextureSurface::new(other, 0, 0)).unwrap();
        assert_eq!(
            downsample(&mut executor, texture, last, TextureSurface::new(texture, 0, last)),
            Err(FilterError::AliasedSourceAndTarget(texture))
        );
    }

    #[test]
    fn test_downsample_requires_render_attachment() {
        let (mut executor, texture) = setup();
        let sampled_only = executor
            .create_cubemap(
                &CubemapDescriptor::new(8, TextureFormat::Rgba16Float)
                    .with_usage(TextureUsage::TEXTURE_BINDING),
            )
            .unwrap();

        let result = downsample(&mut executor, texture, 0, TextureSurface::new(sampled_only, 0, 0));
        assert_eq!(
            result,
            Err(FilterError::MissingUsage {
                texture: sampled_only,
                usage: TextureUsage::RENDER_ATTACHMENT
            })
        );
    }

    #[test]
    fn test_downsample_rejects_bad_indices() {
        let (mut executor, texture) = setup();
        assert_eq!(
            downsample(&mut executor, texture, 0, TextureSurface::new(texture, 6, 1)),
            Err(FilterError::FaceOutOfRange(6))
        );
        assert_eq!(
            downsample(&mut executor, texture, 9, TextureSurface::new(texture, 0, 1)),
            Err(FilterError::MipOutOfRange {
                mip: 9,
                mip_count: 5
            })
        );
    }

    #[test]
    fn test_downsample_cubemap_draws_every_face() {
        let (mut executor, texture) = setup();
        downsample_cubemap(&mut executor, texture, 1, texture, 2).unwrap();

        let faces: Vec<u32> = executor.draws().map(|(_, _, target, _)| target.face).collect();
        assert_eq!(faces, vec![0, 1, 2, 3, 4, 5]);
        assert!(executor
            .draws()
            .all(|(_, source, target, _)| source.base_mip_level == 1 && target.mip_level == 2));
    }
}
