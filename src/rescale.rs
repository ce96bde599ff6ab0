//! Cubemap rescaling
//!
//! Copies one mip of a cubemap into a mip of another cubemap. Equal
//! resolutions use a plain texture copy, anything else draws the downsample
//! program once per face, which samples the source bilinearly at each
//! destination texel center.

use crate::backend::{GpuExecutor, SourceBinding, TextureHandle, TextureSurface, TextureUsage};
use crate::cube::CubeFace;
use crate::error::{FilterError, FilterResult};
use crate::passes::{check_mip, checked_descriptor, DownsampleParams, FilterPass};

/// Scale mip `src_mip` of `src` into mip `dst_mip` of `dst`, all six faces.
///
/// When both mips have the same edge the result is bit-identical to the
/// source, which requires both textures to share a format.
pub fn scale_cubemap<E: GpuExecutor + ?Sized>(
    ctx: &mut E,
    src: TextureHandle,
    src_mip: u32,
    dst: TextureHandle,
    dst_mip: u32,
) -> FilterResult<()> {
    let src_desc = checked_descriptor(ctx, src, TextureUsage::empty())?;
    check_mip(&src_desc, src_mip)?;
    let dst_desc = checked_descriptor(ctx, dst, TextureUsage::empty())?;
    check_mip(&dst_desc, dst_mip)?;

    if src == dst && src_mip == dst_mip {
        return Err(FilterError::AliasedSourceAndTarget(src));
    }

    let src_size = src_desc.mip_size(src_mip);
    let dst_size = dst_desc.mip_size(dst_mip);

    if src_size == dst_size {
        checked_descriptor(ctx, src, TextureUsage::COPY_SRC)?;
        checked_descriptor(ctx, dst, TextureUsage::COPY_DST)?;
        if src_desc.format != dst_desc.format {
            return Err(FilterError::FormatMismatch {
                src: src_desc.format,
                dst: dst_desc.format,
            });
        }

        log::debug!(
            "Copying cubemap {} mip {} into {} mip {} ({src_size}x{src_size})",
            src.id(),
            src_mip,
            dst.id(),
            dst_mip
        );
        for face in CubeFace::ALL {
            ctx.copy_surface(
                TextureSurface::new(src, face.index(), src_mip),
                TextureSurface::new(dst, face.index(), dst_mip),
            )?;
        }
    } else {
        checked_descriptor(ctx, src, TextureUsage::TEXTURE_BINDING)?;
        checked_descriptor(ctx, dst, TextureUsage::RENDER_ATTACHMENT)?;

        log::debug!(
            "Scaling cubemap {} mip {} ({src_size}x{src_size}) into {} mip {} ({dst_size}x{dst_size})",
            src.id(),
            src_mip,
            dst.id(),
            dst_mip
        );
        for face in CubeFace::ALL {
            let pass = FilterPass::Downsample {
                source: SourceBinding::single_mip(src, src_mip),
                params: DownsampleParams::new(face.index()),
            };
            pass.execute(ctx, TextureSurface::new(dst, face.index(), dst_mip))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CubemapDescriptor, DummyExecutor, ExecutedCommand, TextureFormat};
    use crate::passes::ShaderProgram;

    #[test]
    fn test_equal_sizes_copy_every_face() {
        let mut executor = DummyExecutor::new();
        let a = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(16))
            .unwrap();
        let b = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(16))
            .unwrap();
        executor.clear_commands();

        scale_cubemap(&mut executor, a, 0, b, 0).unwrap();

        let expected: Vec<_> = (0..6)
            .map(|face| ExecutedCommand::Copy {
                src: TextureSurface::new(a, face, 0),
                dst: TextureSurface::new(b, face, 0),
            })
            .collect();
        assert_eq!(executor.commands(), expected.as_slice());
    }

    #[test]
    fn test_different_sizes_draw_every_face() {
        let mut executor = DummyExecutor::new();
        let big = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(64))
            .unwrap();
        let small = executor
            .create_cubemap(&CubemapDescriptor::new(24, TextureFormat::Rgba8Unorm))
            .unwrap();
        executor.clear_commands();

        scale_cubemap(&mut executor, big, 0, small, 0).unwrap();

        let draws: Vec<_> = executor.draws().collect();
        assert_eq!(draws.len(), 6);
        for (face, (program, source, target, _)) in draws.into_iter().enumerate() {
            assert_eq!(program, ShaderProgram::Downsample);
            assert_eq!(source, SourceBinding::single_mip(big, 0));
            assert_eq!(target, TextureSurface::new(small, face as u32, 0));
        }
    }

    #[test]
    fn test_copy_requires_matching_format() {
        let mut executor = DummyExecutor::new();
        let hdr = executor
            .create_cubemap(&CubemapDescriptor::new(8, TextureFormat::Rgba16Float))
            .unwrap();
        let ldr = executor
            .create_cubemap(&CubemapDescriptor::new(8, TextureFormat::Rgba8Unorm))
            .unwrap();

        assert_eq!(
            scale_cubemap(&mut executor, hdr, 0, ldr, 0),
            Err(FilterError::FormatMismatch {
                src: TextureFormat::Rgba16Float,
                dst: TextureFormat::Rgba8Unorm
            })
        );
    }

    #[test]
    fn test_same_mip_is_rejected() {
        let mut executor = DummyExecutor::new();
        let texture = executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(8))
            .unwrap();
        assert_eq!(
            scale_cubemap(&mut executor, texture, 1, texture, 1),
            Err(FilterError::AliasedSourceAndTarget(texture))
        );
    }
}
