//! Error types of the filtering operations

use thiserror::Error;

use crate::backend::{BackendError, TextureFormat, TextureHandle, TextureUsage};

/// Errors returned by the filter passes and the pipeline.
///
/// Everything except [`FilterError::Backend`] is a caller error detected
/// before any work reaches the executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Texture {0:?} does not belong to this executor")]
    UnknownTexture(TextureHandle),
    #[error("Texture {texture:?} is missing usage {usage:?}")]
    MissingUsage {
        texture: TextureHandle,
        usage: TextureUsage,
    },
    #[error("Mip level {mip} out of range (texture has {mip_count})")]
    MipOutOfRange { mip: u32, mip_count: u32 },
    #[error("Cube face {0} out of range")]
    FaceOutOfRange(u32),
    #[error("Scratch cubemap is {actual}x{actual}, expected {expected}x{expected}")]
    ScratchSizeMismatch { expected: u32, actual: u32 },
    #[error("Scratch cubemap format {actual:?} does not match {expected:?}")]
    ScratchFormatMismatch {
        expected: TextureFormat,
        actual: TextureFormat,
    },
    #[error("Scratch cubemap has {actual} mip levels, expected at least {expected}")]
    ScratchMipCountMismatch { expected: u32, actual: u32 },
    #[error("Destination is {actual}x{actual}, expected {expected}x{expected}")]
    ResolutionMismatch { expected: u32, actual: u32 },
    #[error("Cannot copy {src:?} texels into {dst:?}")]
    FormatMismatch {
        src: TextureFormat,
        dst: TextureFormat,
    },
    #[error("Texture {0:?} is both sampled and rendered to")]
    AliasedSourceAndTarget(TextureHandle),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type FilterResult<T> = Result<T, FilterError>;
