//! Common utilities for filter integration tests.
//!
//! Provides a CPU reference executor that runs the filter programs texel by
//! texel, and a test context that hides which executor a test runs on.

use std::collections::HashMap;

use glam::Vec3;
use half::f16;

use reflection_probes::cube::{self, CubeFace};
use reflection_probes::passes::{DownsampleParams, ImportanceSampleParams, ShaderProgram};
use reflection_probes::sampling::{self, ImportanceKernel};
use reflection_probes::{
    BackendError, BackendResult, CubemapDescriptor, GpuExecutor, SourceBinding, TextureFormat,
    TextureHandle, TextureSurface,
};

/// Samples per texel used by the software importance sampler.
///
/// Far below the GPU count to keep debug test runs fast. Weights are still
/// normalized, so uniform inputs stay exact.
pub const SOFTWARE_SAMPLE_COUNT: u32 = 64;

// ============================================================================
// Software Executor
// ============================================================================

/// Texels of one cubemap, indexed `[mip][face][y * size + x]`.
struct SoftwareCubemap {
    desc: CubemapDescriptor,
    mips: Vec<Vec<Vec<[f32; 4]>>>,
}

impl SoftwareCubemap {
    fn new(desc: &CubemapDescriptor) -> Self {
        let mips = (0..desc.mip_level_count)
            .map(|mip| vec![vec![[0.0; 4]; desc.face_texel_count(mip)]; 6])
            .collect();
        Self {
            desc: desc.clone(),
            mips,
        }
    }

    /// Bilinear fetch from one mip, clamped to the face the direction hits.
    fn sample_bilinear(&self, mip: u32, dir: Vec3) -> [f32; 4] {
        let size = self.desc.mip_size(mip);
        let (face, uv) = cube::direction_to_face_uv(dir);
        let texels = &self.mips[mip as usize][face.index() as usize];

        let max = (size - 1) as f32;
        let x = (uv.x * size as f32 - 0.5).clamp(0.0, max);
        let y = (uv.y * size as f32 - 0.5).clamp(0.0, max);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(size - 1);
        let y1 = (y0 + 1).min(size - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let fetch = |x: u32, y: u32| texels[(y * size + x) as usize];
        let top = lerp(fetch(x0, y0), fetch(x1, y0), fx);
        let bottom = lerp(fetch(x0, y1), fetch(x1, y1), fx);
        lerp(top, bottom, fy)
    }

    /// Trilinear fetch from the mips of `binding`, `lod` relative to its base.
    fn sample_trilinear(&self, binding: SourceBinding, dir: Vec3, lod: f32) -> [f32; 4] {
        let max_lod = (binding.mip_level_count - 1) as f32;
        let lod = lod.clamp(0.0, max_lod);
        let lo = lod.floor();
        let hi = lod.ceil();

        let a = self.sample_bilinear(binding.base_mip_level + lo as u32, dir);
        if hi == lo {
            return a;
        }
        let b = self.sample_bilinear(binding.base_mip_level + hi as u32, dir);
        lerp(a, b, lod - lo)
    }
}

fn lerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

/// Round a texel the way storing it in `format` would.
fn quantize(format: TextureFormat, texel: [f32; 4]) -> [f32; 4] {
    texel.map(|c| match format {
        TextureFormat::Rgba8Unorm => (c.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        TextureFormat::Rgba16Float => f16::from_f32(c).to_f32(),
    })
}

#[derive(Default)]
struct Staged {
    program: Option<ShaderProgram>,
    source: Option<SourceBinding>,
    target: Option<TextureSurface>,
    uniforms: Vec<u8>,
}

/// Executor running the filter programs on the CPU, for checking results
/// on machines without a GPU.
pub struct SoftwareExecutor {
    textures: HashMap<TextureHandle, SoftwareCubemap>,
    next_texture_id: u64,
    staged: Staged,
    sample_count: u32,
}

impl SoftwareExecutor {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_texture_id: 1,
            staged: Staged::default(),
            sample_count: SOFTWARE_SAMPLE_COUNT,
        }
    }

    fn cubemap(&self, texture: TextureHandle) -> BackendResult<&SoftwareCubemap> {
        self.textures.get(&texture).ok_or_else(|| {
            BackendError::InvalidOperation(format!("unknown texture {}", texture.id()))
        })
    }

    /// Kernel for an importance-sample draw. The mip factor is recomputed
    /// for this executor's sample count instead of taken from the uniforms.
    pub fn kernel_for(&self, params: &ImportanceSampleParams, source_size: u32) -> ImportanceKernel {
        ImportanceKernel::new(
            sampling::roughness_for_mip(params.mip_level, params.num_mips),
            self.sample_count,
            sampling::precomputed_mip_factor(source_size, self.sample_count),
            params.num_mips,
        )
    }

    fn render(
        &self,
        program: ShaderProgram,
        source: SourceBinding,
        target: TextureSurface,
    ) -> BackendResult<Vec<[f32; 4]>> {
        let src = self.cubemap(source.texture)?;
        let dst = self.cubemap(target.texture)?;
        let size = dst.desc.mip_size(target.mip_level);
        let face_of = |index: u32| {
            CubeFace::from_index(index)
                .ok_or_else(|| BackendError::InvalidOperation("face out of range".into()))
        };

        let mut texels = Vec::with_capacity((size * size) as usize);
        match program {
            ShaderProgram::Downsample => {
                let params: DownsampleParams = bytemuck::pod_read_unaligned(&self.staged.uniforms);
                let face = face_of(params.cube_face)?;
                for y in 0..size {
                    for x in 0..size {
                        let dir = cube::texel_direction(face, x, y, size);
                        texels.push(src.sample_bilinear(source.base_mip_level, dir));
                    }
                }
            }
            ShaderProgram::ImportanceSample => {
                let params: ImportanceSampleParams =
                    bytemuck::pod_read_unaligned(&self.staged.uniforms);
                let face = face_of(params.cube_face)?;
                let kernel = self.kernel_for(&params, src.desc.mip_size(source.base_mip_level));
                for y in 0..size {
                    for x in 0..size {
                        let n = cube::texel_direction(face, x, y, size);
                        let mut color = [0.0; 4];
                        for sample in kernel.samples() {
                            let l = sampling::tangent_to_world(sample.direction, n);
                            let c = src.sample_trilinear(source, l, sample.lod);
                            for (acc, channel) in color.iter_mut().zip(c) {
                                *acc += channel * sample.weight;
                            }
                        }
                        texels.push(color);
                    }
                }
            }
        }

        let format = dst.desc.format;
        Ok(texels.into_iter().map(|t| quantize(format, t)).collect())
    }
}

impl Default for SoftwareExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuExecutor for SoftwareExecutor {
    fn name(&self) -> &'static str {
        "Software"
    }

    fn create_cubemap(&mut self, desc: &CubemapDescriptor) -> BackendResult<TextureHandle> {
        let handle = TextureHandle::from_raw(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(handle, SoftwareCubemap::new(desc));
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn cubemap_descriptor(&self, texture: TextureHandle) -> Option<&CubemapDescriptor> {
        self.textures.get(&texture).map(|c| &c.desc)
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
            return Err(BackendError::InvalidOperation("incomplete draw state".into()));
        };

        let texels = self.render(program, source, target)?;
        let dst = self
            .textures
            .get_mut(&target.texture)
            .ok_or_else(|| BackendError::InvalidOperation("unknown target".into()))?;
        dst.mips[target.mip_level as usize][target.face as usize] = texels;
        Ok(())
    }

    fn copy_surface(&mut self, src: TextureSurface, dst: TextureSurface) -> BackendResult<()> {
        let texels = self.read_surface(src)?;
        let target = self
            .textures
            .get_mut(&dst.texture)
            .ok_or_else(|| BackendError::InvalidOperation("unknown target".into()))?;
        let face = &mut target.mips[dst.mip_level as usize][dst.face as usize];
        if face.len() != texels.len() {
            return Err(BackendError::InvalidOperation("copy size mismatch".into()));
        }
        *face = texels;
        Ok(())
    }

    fn flush(&mut self) {}

    fn write_surface(&mut self, surface: TextureSurface, texels: &[[f32; 4]]) -> BackendResult<()> {
        let cubemap = self
            .textures
            .get_mut(&surface.texture)
            .ok_or_else(|| BackendError::InvalidOperation("unknown texture".into()))?;
        let format = cubemap.desc.format;
        let face = &mut cubemap.mips[surface.mip_level as usize][surface.face as usize];
        if face.len() != texels.len() {
            return Err(BackendError::InvalidOperation("texel count mismatch".into()));
        }
        *face = texels.iter().map(|&t| quantize(format, t)).collect();
        Ok(())
    }

    fn read_surface(&mut self, surface: TextureSurface) -> BackendResult<Vec<[f32; 4]>> {
        Ok(self.cubemap(surface.texture)?.mips[surface.mip_level as usize]
            [surface.face as usize]
            .clone())
    }
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Executors the integration tests run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU reference executor, always available.
    Software,
    /// wgpu executor, needs an adapter.
    WebGpu,
}

// ============================================================================
// Test Context
// ============================================================================

/// An executor plus helpers for filling and inspecting cubemaps.
pub struct TestContext {
    pub executor: Box<dyn GpuExecutor>,
}

impl TestContext {
    /// Create a context for `backend`, `None` when it is not available here.
    pub fn new(backend: Backend) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        match backend {
            Backend::Software => Some(Self {
                executor: Box::new(SoftwareExecutor::new()),
            }),
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => {
                let executor = reflection_probes::WgpuExecutor::new().ok()?;
                if !executor.reads_back_layers() {
                    return None;
                }
                Some(Self {
                    executor: Box::new(executor),
                })
            }
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => None,
        }
    }

    /// Number of live cubemaps. Both executors hand out sequential handles
    /// starting at 1, so probing the first few is enough for a test.
    pub fn live_texture_count(&self) -> usize {
        (1..=64)
            .filter(|&id| {
                self.executor
                    .cubemap_descriptor(TextureHandle::from_raw(id))
                    .is_some()
            })
            .count()
    }

    pub fn create_probe(&mut self, size: u32) -> TextureHandle {
        self.executor
            .create_cubemap(&CubemapDescriptor::reflection_probe(size))
            .expect("Failed to create cubemap")
    }

    /// Fill every face of `mip` with texels from `f(face, x, y)`.
    pub fn fill(
        &mut self,
        texture: TextureHandle,
        mip: u32,
        f: impl Fn(CubeFace, u32, u32) -> [f32; 4],
    ) {
        let size = self
            .executor
            .cubemap_descriptor(texture)
            .expect("Unknown cubemap")
            .mip_size(mip);
        for face in CubeFace::ALL {
            let texels: Vec<[f32; 4]> = (0..size * size)
                .map(|i| f(face, i % size, i / size))
                .collect();
            self.executor
                .write_surface(TextureSurface::new(texture, face.index(), mip), &texels)
                .expect("Failed to upload texels");
        }
    }

    pub fn read(&mut self, texture: TextureHandle, face: u32, mip: u32) -> Vec<[f32; 4]> {
        self.executor
            .read_surface(TextureSurface::new(texture, face, mip))
            .expect("Failed to read back texels")
    }

    /// Every face of every mip, indexed `[mip][face]`.
    pub fn read_all(&mut self, texture: TextureHandle) -> Vec<Vec<Vec<[f32; 4]>>> {
        let mips = self
            .executor
            .cubemap_descriptor(texture)
            .expect("Unknown cubemap")
            .mip_level_count;
        (0..mips)
            .map(|mip| (0..6).map(|face| self.read(texture, face, mip)).collect())
            .collect()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic non-uniform test pattern.
pub fn test_pattern(face: CubeFace, x: u32, y: u32) -> [f32; 4] {
    let f = face.index() as f32;
    [
        ((x * 7 + y * 3) % 11) as f32 / 10.0,
        ((x + y * 5 + face.index()) % 7) as f32 / 6.0,
        f / 5.0,
        1.0,
    ]
}

/// Assert two texels are within `tolerance` per channel.
pub fn assert_texel_near(actual: [f32; 4], expected: [f32; 4], tolerance: f32, context: &str) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a - e).abs() <= tolerance,
            "{context}: got {actual:?}, expected {expected:?}"
        );
    }
}
