//! Uniform records of the filter passes
//!
//! Layouts match the `Params` structs declared in the WGSL programs.

use bytemuck::{Pod, Zeroable};

/// Uniforms of the downsample program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DownsampleParams {
    /// Face of the source cubemap to sample (0..6)
    pub cube_face: u32,
    pub _padding: [u32; 3],
}

impl DownsampleParams {
    pub fn new(cube_face: u32) -> Self {
        Self {
            cube_face,
            _padding: [0; 3],
        }
    }
}

/// Uniforms of the importance-sample program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ImportanceSampleParams {
    /// Face being filtered (0..6)
    pub cube_face: u32,
    /// Destination mip level, selects the roughness
    pub mip_level: u32,
    /// Mip levels in the sampled chain
    pub num_mips: u32,
    /// See [`crate::sampling::precomputed_mip_factor`]
    pub precomputed_mip_factor: f32,
}
