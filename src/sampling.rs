//! GGX importance sampling math
//!
//! CPU mirror of the kernel evaluated by the importance-sample program. The
//! WGSL in `passes::shaders` follows these functions line for line, so the
//! kernel's properties (normalization, widening with roughness, lod range)
//! can be checked here without a device.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

/// Sample directions drawn per output texel.
pub const NUM_SAMPLES: u32 = 1024;

/// Lower bound applied to the sample PDF before taking its logarithm.
pub const MIN_PDF: f32 = 1.0e-6;

/// Van der Corput radical inverse in base 2.
pub fn radical_inverse(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// Point `index` of an `count`-point Hammersley set in `[0, 1)^2`.
pub fn hammersley(index: u32, count: u32) -> Vec2 {
    Vec2::new(index as f32 / count as f32, radical_inverse(index))
}

/// Roughness filtered into `mip_level` of a chain with `num_mips` levels.
///
/// `mip_level / num_mips`: mip 0 is a perfect mirror and the last mip of an
/// 8-level probe holds roughness 7/8. Shading code picking a probe mip for a
/// material roughness has to invert this same mapping.
pub fn roughness_for_mip(mip_level: u32, num_mips: u32) -> f32 {
    if num_mips == 0 {
        return 0.0;
    }
    (mip_level as f32 / num_mips as f32).clamp(0.0, 1.0)
}

/// GGX half vector in tangent space (normal along +Z).
pub fn importance_sample_ggx(xi: Vec2, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let a2 = a * a;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a2 - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// GGX normal distribution term.
///
/// Undefined at roughness 0, where the lobe collapses to a delta.
pub fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denom * denom)
}

/// PDF of a reflected direction when N = V.
pub fn sample_pdf(n_dot_h: f32, roughness: f32) -> f32 {
    // D * NdotH / (4 * VdotH) with VdotH == NdotH
    distribution_ggx(n_dot_h, roughness) * 0.25
}

/// Mip bias term: half the log2 of the ratio between a source texel's solid
/// angle and the solid angle covered by one sample.
pub fn precomputed_mip_factor(source_size: u32, sample_count: u32) -> f32 {
    let size = source_size.max(1) as f32;
    let texel_solid_angle_inv = 6.0 * size * size / (4.0 * PI);
    0.5 * (texel_solid_angle_inv / sample_count.max(1) as f32).log2()
}

/// Source lod read by a sample with the given PDF.
///
/// A NaN PDF comes from a delta lobe and reads the sharpest level.
pub fn sample_lod(pdf: f32, mip_factor: f32, num_mips: u32) -> f32 {
    if pdf.is_nan() {
        return 0.0;
    }
    let max_lod = num_mips.saturating_sub(1) as f32;
    (mip_factor - 0.5 * pdf.max(MIN_PDF).log2()).clamp(0.0, max_lod)
}

/// Source lod of a sample with half vector at `n_dot_h` for `roughness`.
///
/// A mirror kernel always reads lod 0.
pub fn kernel_lod(n_dot_h: f32, roughness: f32, mip_factor: f32, num_mips: u32) -> f32 {
    if roughness <= 0.0 {
        return 0.0;
    }
    sample_lod(sample_pdf(n_dot_h, roughness), mip_factor, num_mips)
}

/// Orthonormal basis `(tangent, bitangent)` around `normal`.
pub fn tangent_frame(normal: Vec3) -> (Vec3, Vec3) {
    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(normal).normalize();
    let bitangent = normal.cross(tangent);
    (tangent, bitangent)
}

/// Rotate a tangent-space vector into the frame around `normal`.
pub fn tangent_to_world(v: Vec3, normal: Vec3) -> Vec3 {
    let (tangent, bitangent) = tangent_frame(normal);
    tangent * v.x + bitangent * v.y + normal * v.z
}

/// One retained sample of an [`ImportanceKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSample {
    /// Light direction in tangent space (normal along +Z).
    pub direction: Vec3,
    /// Normalized contribution.
    pub weight: f32,
    /// Source lod to read.
    pub lod: f32,
}

/// The full set of samples convolved into one output texel.
///
/// Samples below the horizon are dropped and the remaining weights are
/// normalized, so they always sum to one.
#[derive(Debug, Clone)]
pub struct ImportanceKernel {
    roughness: f32,
    samples: Vec<KernelSample>,
}

impl ImportanceKernel {
    pub fn new(roughness: f32, sample_count: u32, mip_factor: f32, num_mips: u32) -> Self {
        let mut samples = Vec::with_capacity(sample_count as usize);
        let mut total_weight = 0.0;

        for i in 0..sample_count {
            let h = importance_sample_ggx(hammersley(i, sample_count), roughness);
            let l = 2.0 * h.z * h - Vec3::Z;
            let n_dot_l = l.z;
            if n_dot_l <= 0.0 {
                continue;
            }

            let lod = kernel_lod(h.z, roughness, mip_factor, num_mips);
            total_weight += n_dot_l;
            samples.push(KernelSample {
                direction: l,
                weight: n_dot_l,
                lod,
            });
        }

        // Sample 0 is always H = N, so total_weight > 0
        for sample in &mut samples {
            sample.weight /= total_weight;
        }

        Self { roughness, samples }
    }

    /// Kernel for `mip_level` of a `num_mips` chain whose base edge is
    /// `source_size`, with [`NUM_SAMPLES`] samples.
    pub fn for_mip(mip_level: u32, num_mips: u32, source_size: u32) -> Self {
        Self::new(
            roughness_for_mip(mip_level, num_mips),
            NUM_SAMPLES,
            precomputed_mip_factor(source_size, NUM_SAMPLES),
            num_mips,
        )
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn samples(&self) -> &[KernelSample] {
        &self.samples
    }

    pub fn weight_sum(&self) -> f32 {
        self.samples.iter().map(|s| s.weight).sum()
    }

    /// Weighted mean angle in radians between the normal and the samples.
    pub fn mean_angle(&self) -> f32 {
        self.samples
            .iter()
            .map(|s| s.weight * s.direction.z.clamp(-1.0, 1.0).acos())
            .sum()
    }
}
