//! Executor abstraction layer
//!
//! Provides the [`GpuExecutor`] trait the filter passes are written against,
//! plus the executors shipped with the crate:
//!
//! - `dummy`: records commands without touching a GPU (tests, headless tools)
//! - `wgpu_backend`: real GPU execution through wgpu (`wgpu-backend` feature)

pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::{DummyExecutor, ExecutedCommand};
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuExecutor;
