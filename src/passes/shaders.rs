//! WGSL sources of the filter programs
//!
//! Both programs share the full-screen triangle vertex stage, the face
//! direction helper and the same bind group layout:
//!
//! - binding 0: `Params` uniform block
//! - binding 1: source `texture_cube<f32>` (view restricted to the bound mips)
//! - binding 2: linear filtering sampler

use crate::backend::{BackendError, BackendResult};
use crate::passes::ShaderProgram;
use crate::sampling::NUM_SAMPLES;

/// Entry point of the vertex stage in every program.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point of the fragment stage in every program.
pub const FRAGMENT_ENTRY: &str = "fs_main";

const COMMON_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}

// Layers are +X, -X, +Y, -Y, +Z, -Z; uv grows right and down
fn face_direction(face: u32, uv: vec2<f32>) -> vec3<f32> {
    let u = uv.x * 2.0 - 1.0;
    let v = uv.y * 2.0 - 1.0;

    if face == 0u {
        return vec3<f32>(1.0, -v, -u);
    }
    if face == 1u {
        return vec3<f32>(-1.0, -v, u);
    }
    if face == 2u {
        return vec3<f32>(u, 1.0, v);
    }
    if face == 3u {
        return vec3<f32>(u, -1.0, -v);
    }
    if face == 4u {
        return vec3<f32>(u, -v, 1.0);
    }
    return vec3<f32>(-u, -v, -1.0);
}
"#;

const DOWNSAMPLE_SHADER: &str = r#"
struct Params {
    cube_face: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var source_texture: texture_cube<f32>;
@group(0) @binding(2) var source_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    // A 2:1 ratio lands between four source texels: bilinear == 2x2 box
    let dir = face_direction(params.cube_face, in.uv);
    return textureSampleLevel(source_texture, source_sampler, dir, 0.0);
}
"#;

const IMPORTANCE_SAMPLE_SHADER: &str = r#"
const PI: f32 = 3.14159265359;
const MIN_PDF: f32 = 1.0e-6;

struct Params {
    cube_face: u32,
    mip_level: u32,
    num_mips: u32,
    precomputed_mip_factor: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var source_texture: texture_cube<f32>;
@group(0) @binding(2) var source_sampler: sampler;

fn radical_inverse(bits: u32) -> f32 {
    return f32(reverseBits(bits)) * 2.3283064365386963e-10;
}

fn hammersley(i: u32, n: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(n), radical_inverse(i));
}

fn roughness_for_mip(mip_level: u32, num_mips: u32) -> f32 {
    if num_mips == 0u {
        return 0.0;
    }
    return clamp(f32(mip_level) / f32(num_mips), 0.0, 1.0);
}

fn importance_sample_ggx(xi: vec2<f32>, n: vec3<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;
    let a2 = a * a;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a2 - 1.0) * xi.y));
    let sin_theta = sqrt(max(1.0 - cos_theta * cos_theta, 0.0));
    let h = vec3<f32>(sin_theta * cos(phi), sin_theta * sin(phi), cos_theta);

    let up = select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 0.0, 1.0), abs(n.z) < 0.999);
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);

    return normalize(tangent * h.x + bitangent * h.y + n * h.z);
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

// A mirror kernel is a delta lobe and always reads lod 0
fn kernel_lod(n_dot_h: f32, roughness: f32, max_lod: f32) -> f32 {
    if roughness <= 0.0 {
        return 0.0;
    }
    let pdf = distribution_ggx(n_dot_h, roughness) * 0.25;
    return clamp(params.precomputed_mip_factor - 0.5 * log2(max(pdf, MIN_PDF)), 0.0, max_lod);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    // N = V = R
    let n = normalize(face_direction(params.cube_face, in.uv));
    let roughness = roughness_for_mip(params.mip_level, params.num_mips);
    let max_lod = f32(params.num_mips - 1u);

    var color = vec4<f32>(0.0);
    var total_weight: f32 = 0.0;

    for (var i = 0u; i < NUM_SAMPLES; i++) {
        let h = importance_sample_ggx(hammersley(i, NUM_SAMPLES), n, roughness);
        let n_dot_h = dot(n, h);
        let l = normalize(2.0 * n_dot_h * h - n);
        let n_dot_l = dot(n, l);

        if n_dot_l > 0.0 {
            let lod = kernel_lod(n_dot_h, roughness, max_lod);
            color += textureSampleLevel(source_texture, source_sampler, l, lod) * n_dot_l;
            total_weight += n_dot_l;
        }
    }

    // Sample 0 is H = N, total_weight is never zero
    return color / total_weight;
}
"#;

/// Full WGSL source of a program.
pub fn source(program: ShaderProgram) -> String {
    match program {
        ShaderProgram::Downsample => format!("{COMMON_SHADER}{DOWNSAMPLE_SHADER}"),
        ShaderProgram::ImportanceSample => format!(
            "const NUM_SAMPLES: u32 = {NUM_SAMPLES}u;\n{COMMON_SHADER}{IMPORTANCE_SAMPLE_SHADER}"
        ),
    }
}

/// Parse and validate a program with naga, checking both entry points exist.
pub fn validate(program: ShaderProgram) -> BackendResult<naga::Module> {
    let source = source(program);

    let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
        BackendError::ShaderCreationFailed(format!(
            "{}: WGSL parse error: {}",
            program.label(),
            e.emit_to_string(&source)
        ))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator.validate(&module).map_err(|e| {
        BackendError::ShaderCreationFailed(format!("{}: validation error: {e}", program.label()))
    })?;

    for (entry_point, stage) in [
        (VERTEX_ENTRY, naga::ShaderStage::Vertex),
        (FRAGMENT_ENTRY, naga::ShaderStage::Fragment),
    ] {
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry_point && ep.stage == stage)
        {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{}: entry point '{entry_point}' not found for stage {stage:?}",
                program.label()
            )));
        }
    }

    Ok(module)
}
