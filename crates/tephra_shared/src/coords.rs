use std::ops::{Add, AddAssign, Sub, SubAssign};

use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Vertical extent of every chunk column. Chunks tile the XZ plane only;
/// a chunk always spans the full world height.
pub const WORLD_HEIGHT: usize = 128;
pub const DEFAULT_CHUNK_SIZE: usize = 16;
/// Upper bound on the horizontal chunk edge; local coordinates are u8.
pub const MAX_CHUNK_SIZE: usize = 128;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl Add for ChunkPos {
    type Output = ChunkPos;

    fn add(self, rhs: Self) -> Self::Output {
        ChunkPos {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl AddAssign for ChunkPos {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl Sub for ChunkPos {
    type Output = ChunkPos;

    fn sub(self, rhs: Self) -> Self::Output {
        ChunkPos {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl SubAssign for ChunkPos {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.z -= rhs.z;
    }
}

fn div_rem_floor(value: i32, divisor: i32) -> (i32, i32) {
    let mut q = value / divisor;
    let mut r = value % divisor;
    if r < 0 {
        q -= 1;
        r += divisor;
    }
    (q, r)
}

/// Splits a world position into its owning chunk and the position within it.
/// The Y component passes through unchanged and must be in `0..WORLD_HEIGHT`.
pub fn world_to_chunk(world_pos: IVec3, chunk_size: usize) -> (ChunkPos, LocalPos) {
    debug_assert!((0..WORLD_HEIGHT as i32).contains(&world_pos.y));
    let size = chunk_size as i32;

    let (chunk_x, local_x) = div_rem_floor(world_pos.x, size);
    let (chunk_z, local_z) = div_rem_floor(world_pos.z, size);

    (
        ChunkPos {
            x: chunk_x,
            z: chunk_z,
        },
        LocalPos {
            x: local_x as u8,
            y: world_pos.y as u8,
            z: local_z as u8,
        },
    )
}

pub fn chunk_to_world(chunk_pos: ChunkPos, local: LocalPos, chunk_size: usize) -> IVec3 {
    let size = chunk_size as i32;
    IVec3::new(
        chunk_pos.x * size + i32::from(local.x),
        i32::from(local.y),
        chunk_pos.z * size + i32::from(local.z),
    )
}
