//! Common types shared between executors

use bitflags::bitflags;

use crate::cube;

/// Texel format of a cubemap.
///
/// Only filterable formats are listed: every cubemap the filter touches is
/// sampled with a bilinear sampler at some point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA channels, unsigned normalized.
    Rgba8Unorm,
    /// 16-bit RGBA channels, float.
    #[default]
    Rgba16Float,
}

impl TextureFormat {
    /// Size in bytes of a single texel.
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

bitflags! {
    /// Usage flags for cubemaps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture faces can be bound as render targets.
        const RENDER_ATTACHMENT = 1 << 3;
        /// Everything a reflection probe or its scratch chain needs.
        const REFLECTION_PROBE = Self::COPY_SRC.bits()
            | Self::COPY_DST.bits()
            | Self::TEXTURE_BINDING.bits()
            | Self::RENDER_ATTACHMENT.bits();
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::REFLECTION_PROBE
    }
}

/// Descriptor for creating a cubemap (always six square faces).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CubemapDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Edge length of mip 0, in texels.
    pub size: u32,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl CubemapDescriptor {
    /// Create a single-mip cubemap descriptor.
    pub fn new(size: u32, format: TextureFormat) -> Self {
        Self {
            label: None,
            size,
            mip_level_count: 1,
            format,
            usage: TextureUsage::default(),
        }
    }

    /// Descriptor of a reflection probe: full mip chain, HDR texels.
    pub fn reflection_probe(size: u32) -> Self {
        Self::new(size, TextureFormat::Rgba16Float).with_full_mip_chain()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Use every mip level down to 1x1.
    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_level_count = cube::mip_count_for_size(self.size);
        self
    }

    /// Set the usage flags.
    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Edge length of the given mip level.
    pub fn mip_size(&self, mip_level: u32) -> u32 {
        cube::mip_size(self.size, mip_level)
    }

    /// Number of texels in one face of the given mip level.
    pub fn face_texel_count(&self, mip_level: u32) -> usize {
        let size = self.mip_size(mip_level) as usize;
        size * size
    }
}

/// Handle to a cubemap owned by an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

impl TextureHandle {
    /// Handle from a raw value, for executors living outside this crate.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw handle value, mostly useful for logging.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// One face of one mip level of a cubemap.
///
/// Used both as a render target and as a copy location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSurface {
    pub texture: TextureHandle,
    pub face: u32,
    pub mip_level: u32,
}

impl TextureSurface {
    pub fn new(texture: TextureHandle, face: u32, mip_level: u32) -> Self {
        Self {
            texture,
            face,
            mip_level,
        }
    }
}

/// Range of mip levels of a cubemap visible to a pass's sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceBinding {
    pub texture: TextureHandle,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
}

impl SourceBinding {
    /// Bind a single mip level.
    pub fn single_mip(texture: TextureHandle, mip_level: u32) -> Self {
        Self {
            texture,
            base_mip_level: mip_level,
            mip_level_count: 1,
        }
    }

    /// Bind the first `mip_level_count` levels.
    pub fn mip_chain(texture: TextureHandle, mip_level_count: u32) -> Self {
        Self {
            texture,
            base_mip_level: 0,
            mip_level_count,
        }
    }
}
