//! Filters a procedural environment into a reflection probe and prints the
//! average color of every mip level.
//!
//! ```text
//! probe_filter --size 128 --environment sky
//! RUST_LOG=debug probe_filter --backend dummy
//! ```

use clap::Parser;
use glam::Vec3;

use reflection_probes::cube::{self, CubeFace};
use reflection_probes::sampling::roughness_for_mip;
use reflection_probes::{
    create_executor, filter_cubemap_for_specular, BackendError, BackendType, CubemapDescriptor,
    ExecutorConfig, FilterResult, GpuExecutor, PowerPreference, TextureHandle, TextureSurface,
    REFLECTION_CUBEMAP_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    /// Use the GPU, fall back to the dummy executor without one.
    #[default]
    Auto,
    /// Require the wgpu executor.
    Wgpu,
    /// Record commands only, read back zeros.
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum Environment {
    /// Bright sky over a dark ground with a small sun.
    #[default]
    Sky,
    /// A different solid color on every face.
    Faces,
    /// A single color everywhere.
    Solid,
}

#[derive(Parser, Debug)]
#[command(
    name = "probe_filter",
    about = "Prefilter a procedural environment into a specular reflection probe",
    version
)]
struct Args {
    /// Executor to run the filter on.
    #[arg(long, default_value = "auto", value_enum)]
    backend: CliBackend,

    /// Graphics APIs wgpu may use (vulkan, metal, dx12, gl). Overrides WGPU_BACKEND.
    #[arg(long, value_delimiter = ',')]
    gpu_api: Vec<String>,

    /// Edge length of the probe in texels.
    #[arg(long, default_value_t = REFLECTION_CUBEMAP_SIZE)]
    size: u32,

    /// Environment written into mip 0.
    #[arg(long, default_value = "sky", value_enum)]
    environment: Environment,

    /// Prefer an integrated GPU.
    #[arg(long)]
    low_power: bool,

    /// Only accept a software adapter.
    #[arg(long)]
    fallback_adapter: bool,

    /// Let the pipeline allocate its own scratch cubemap.
    #[arg(long)]
    no_scratch: bool,
}

impl Args {
    fn executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::from_env();
        config.backend = match self.backend {
            CliBackend::Auto | CliBackend::Wgpu => BackendType::Wgpu,
            CliBackend::Dummy => BackendType::Dummy,
        };
        if !self.gpu_api.is_empty() {
            config.graphics_apis = self.gpu_api.iter().map(|s| s.to_lowercase()).collect();
        }
        if self.low_power {
            config.power_preference = PowerPreference::LowPower;
        }
        config.force_fallback_adapter = self.fallback_adapter;
        config
    }
}

fn environment_color(environment: Environment, face: CubeFace, dir: Vec3) -> [f32; 4] {
    match environment {
        Environment::Solid => [0.8, 0.1, 0.1, 1.0],
        Environment::Faces => {
            let c = match face {
                CubeFace::PositiveX => [1.0, 0.0, 0.0],
                CubeFace::NegativeX => [0.0, 1.0, 1.0],
                CubeFace::PositiveY => [0.0, 1.0, 0.0],
                CubeFace::NegativeY => [1.0, 0.0, 1.0],
                CubeFace::PositiveZ => [0.0, 0.0, 1.0],
                CubeFace::NegativeZ => [1.0, 1.0, 0.0],
            };
            [c[0], c[1], c[2], 1.0]
        }
        Environment::Sky => {
            let sun = Vec3::new(0.3, 0.8, 0.5).normalize();
            if dir.dot(sun) > 0.995 {
                return [20.0, 18.0, 15.0, 1.0];
            }
            if dir.y >= 0.0 {
                let t = dir.y;
                [0.6 - 0.4 * t, 0.7 - 0.3 * t, 1.0, 1.0]
            } else {
                [0.15, 0.12, 0.1, 1.0]
            }
        }
    }
}

fn upload_environment(
    executor: &mut dyn GpuExecutor,
    probe: TextureHandle,
    size: u32,
    environment: Environment,
) -> FilterResult<()> {
    for face in CubeFace::ALL {
        let mut texels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let dir = cube::texel_direction(face, x, y, size);
                texels.push(environment_color(environment, face, dir));
            }
        }
        executor.write_surface(TextureSurface::new(probe, face.index(), 0), &texels)?;
    }
    Ok(())
}

fn average_color(
    executor: &mut dyn GpuExecutor,
    probe: TextureHandle,
    mip: u32,
) -> FilterResult<[f32; 4]> {
    let mut sum = [0.0f64; 4];
    let mut count = 0usize;
    for face in CubeFace::ALL {
        for texel in executor.read_surface(TextureSurface::new(probe, face.index(), mip))? {
            for (acc, channel) in sum.iter_mut().zip(texel) {
                *acc += channel as f64;
            }
            count += 1;
        }
    }
    Ok(sum.map(|c| (c / count.max(1) as f64) as f32))
}

fn run(args: &Args) -> FilterResult<()> {
    let mut executor = create_executor(&args.executor_config());
    if args.backend == CliBackend::Wgpu && executor.name() != "wgpu" {
        return Err(BackendError::InitializationFailed("wgpu executor unavailable".into()).into());
    }
    let executor = executor.as_mut();

    let desc = CubemapDescriptor::reflection_probe(args.size).with_label("Reflection Probe");
    let probe = executor.create_cubemap(&desc)?;
    upload_environment(executor, probe, args.size, args.environment)?;

    let scratch = if args.no_scratch {
        None
    } else {
        Some(executor.create_cubemap(&desc.clone().with_label("Reflection Probe Scratch"))?)
    };

    let start = std::time::Instant::now();
    filter_cubemap_for_specular(&mut *executor, probe, scratch)?;

    println!(
        "{:?} probe {}x{} ({} mips) on {}",
        args.environment,
        args.size,
        args.size,
        desc.mip_level_count,
        executor.name()
    );
    for mip in 0..desc.mip_level_count {
        let [r, g, b, a] = average_color(executor, probe, mip)?;
        println!(
            "  mip {mip} ({0}x{0}, roughness {1:.3}): {r:.4} {g:.4} {b:.4} {a:.4}",
            desc.mip_size(mip),
            roughness_for_mip(mip, desc.mip_level_count)
        );
    }
    log::info!("Filtered and read back in {:.2?}", start.elapsed());

    if let Some(scratch) = scratch {
        executor.destroy_texture(scratch);
    }
    executor.destroy_texture(probe);
    Ok(())
}

fn main() {
    reflection_probes::init_logging();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
