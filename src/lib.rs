//! Reflection probes - GPU specular prefiltering of environment cubemaps
//!
//! Turns a captured environment cubemap into a reflection probe for
//! image-based lighting: mip 0 keeps the sharp capture and every further mip
//! holds the environment convolved with a GGX lobe of increasing roughness.
//!
//! # Features
//! - Bilinear downsample pass building a box-filtered mip chain
//! - GGX importance-sample pass (Hammersley sequence, PDF-driven lod)
//! - Cubemap rescaling between arbitrary resolutions
//! - Executor abstraction with a wgpu implementation and a recording dummy
//!
//! All filtering runs on the executor; nothing is processed on the CPU.
//!
//! ```no_run
//! use reflection_probes::*;
//!
//! let mut executor = create_executor(&ExecutorConfig::default());
//! let probe = executor
//!     .create_cubemap(&CubemapDescriptor::reflection_probe(REFLECTION_CUBEMAP_SIZE))
//!     .unwrap();
//! // ... render the environment into mip 0 ...
//! filter_cubemap_for_specular(&mut *executor, probe, None).unwrap();
//! ```

pub mod backend;
pub mod cube;
pub mod error;
pub mod filter;
pub mod passes;
pub mod rescale;
pub mod sampling;

pub use backend::{
    BackendError, BackendResult, CubemapDescriptor, DummyExecutor, GpuExecutor, SourceBinding,
    TextureFormat, TextureHandle, TextureSurface, TextureUsage,
};
pub use cube::CubeFace;
pub use error::{FilterError, FilterResult};
pub use filter::filter_cubemap_for_specular;
pub use passes::{downsample, downsample_cubemap, importance_sample, FilterPass, ShaderProgram};
pub use rescale::scale_cubemap;

#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuExecutor;

/// Edge length in texels of a reflection probe cubemap.
pub const REFLECTION_CUBEMAP_SIZE: u32 = 128;

/// Executor selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// wgpu executor, falls back to the dummy one without an adapter
    #[default]
    Wgpu,
    /// Dummy executor: records commands, never touches a GPU
    Dummy,
}

/// GPU power preference when picking an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// Configuration for creating an executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Which executor to use
    pub backend: BackendType,
    /// Adapter power preference
    pub power_preference: PowerPreference,
    /// Accept only a software adapter
    pub force_fallback_adapter: bool,
    /// Graphics API names (`vulkan`, `metal`, `dx12`, `gl`, `webgpu`).
    /// Empty means all of them.
    pub graphics_apis: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Wgpu,
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            graphics_apis: Vec::new(),
        }
    }
}

impl ExecutorConfig {
    /// Default config with the graphics APIs taken from `WGPU_BACKEND`
    /// (comma separated) when it is set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("WGPU_BACKEND") {
            config.graphics_apis = value
                .split(',')
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect();
        }
        config
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }
}

/// Create an executor according to `config`.
///
/// Falls back to the [`DummyExecutor`] when the wgpu one cannot be created.
pub fn create_executor(config: &ExecutorConfig) -> Box<dyn GpuExecutor> {
    #[cfg(feature = "wgpu-backend")]
    if config.backend == BackendType::Wgpu {
        match WgpuExecutor::with_config(config) {
            Ok(executor) => {
                log::info!("Using wgpu executor");
                return Box::new(executor);
            }
            Err(e) => {
                log::warn!("Failed to create wgpu executor: {}", e);
            }
        }
    }

    log::info!("Using dummy executor");
    Box::new(DummyExecutor::new())
}

/// Initialize logging from `RUST_LOG`, defaulting to `info`.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
