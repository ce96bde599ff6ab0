//! Cubemap face layout and mip chain arithmetic
//!
//! Faces follow the WebGPU/D3D convention: layer 0..5 is +X, -X, +Y, -Y, +Z,
//! -Z, and face texture coordinates grow right and down. The WGSL programs
//! use the exact same mapping (see `passes::shaders`).

use glam::{Vec2, Vec3};

/// Number of faces in a cubemap.
pub const FACE_COUNT: u32 = 6;

/// One of the six cubemap faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    /// All faces in layer order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face.
    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Unnormalized direction through face coordinates `uv` in `[0, 1]^2`.
    pub fn direction(self, uv: Vec2) -> Vec3 {
        let u = uv.x * 2.0 - 1.0;
        let v = uv.y * 2.0 - 1.0;

        match self {
            CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
            CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
            CubeFace::PositiveY => Vec3::new(u, 1.0, v),
            CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
            CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
            CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
        }
    }
}

/// Normalized direction through the center of texel `(x, y)` of a face.
pub fn texel_direction(face: CubeFace, x: u32, y: u32, size: u32) -> Vec3 {
    let uv = Vec2::new(
        (x as f32 + 0.5) / size as f32,
        (y as f32 + 0.5) / size as f32,
    );
    face.direction(uv).normalize()
}

/// Face hit by `dir` and the face coordinates of the hit point in `[0, 1]^2`.
pub fn direction_to_face_uv(dir: Vec3) -> (CubeFace, Vec2) {
    let abs = dir.abs();

    let (face, u, v, major) = if abs.x >= abs.y && abs.x >= abs.z {
        if dir.x > 0.0 {
            (CubeFace::PositiveX, -dir.z, -dir.y, abs.x)
        } else {
            (CubeFace::NegativeX, dir.z, -dir.y, abs.x)
        }
    } else if abs.y >= abs.z {
        if dir.y > 0.0 {
            (CubeFace::PositiveY, dir.x, dir.z, abs.y)
        } else {
            (CubeFace::NegativeY, dir.x, -dir.z, abs.y)
        }
    } else if dir.z > 0.0 {
        (CubeFace::PositiveZ, dir.x, -dir.y, abs.z)
    } else {
        (CubeFace::NegativeZ, -dir.x, -dir.y, abs.z)
    };

    let uv = Vec2::new(u / major, v / major) * 0.5 + 0.5;
    (face, uv)
}

/// Edge length of `mip_level` for a chain whose base edge is `size`.
pub fn mip_size(size: u32, mip_level: u32) -> u32 {
    size.checked_shr(mip_level).unwrap_or(0).max(1)
}

/// Number of mip levels from `size` down to 1x1.
pub fn mip_count_for_size(size: u32) -> u32 {
    u32::BITS - size.max(1).leading_zeros()
}
