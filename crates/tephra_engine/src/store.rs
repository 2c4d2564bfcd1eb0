use std::fmt;

use glam::IVec3;
use rustc_hash::FxHashMap;

use tephra_shared::block::BlockId;
use tephra_shared::chunk::{BlockDetail, BlockGrid};
use tephra_shared::coords::{world_to_chunk, ChunkPos, MAX_CHUNK_SIZE, WORLD_HEIGHT};

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    InvalidChunkSize(usize),
    SizeMismatch { expected: usize, actual: usize },
    /// Terrain must originate from the generator; editing a block in a chunk
    /// that was never generated is refused rather than silently creating one.
    Ungenerated(ChunkPos),
    OutOfWorld(i32),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChunkSize(size) => {
                write!(f, "chunk size must be in 1..={MAX_CHUNK_SIZE}, got {size}")
            }
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "grid size {actual} does not match store chunk size {expected}"
            ),
            Self::Ungenerated(pos) => {
                write!(f, "chunk ({}, {}) has not been generated", pos.x, pos.z)
            }
            Self::OutOfWorld(y) => {
                write!(f, "world y={y} is outside 0..{WORLD_HEIGHT}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Authoritative owner of every generated chunk grid. A coordinate is either
/// fully generated (present) or untouched (absent) — there are no partial
/// states, and nothing is evicted without an explicit `remove`.
pub struct ChunkStore {
    chunk_size: usize,
    chunks: FxHashMap<ChunkPos, BlockGrid>,
}

impl ChunkStore {
    pub fn new(chunk_size: usize) -> Result<Self, StoreError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(StoreError::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            chunk_size,
            chunks: FxHashMap::default(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn has(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    pub fn get(&self, pos: ChunkPos) -> Option<&BlockGrid> {
        self.chunks.get(&pos)
    }

    pub fn insert(&mut self, pos: ChunkPos, grid: BlockGrid) -> Result<Option<BlockGrid>, StoreError> {
        if grid.size() != self.chunk_size {
            return Err(StoreError::SizeMismatch {
                expected: self.chunk_size,
                actual: grid.size(),
            });
        }
        Ok(self.chunks.insert(pos, grid))
    }

    /// Explicit unload; the store never drops chunks on its own.
    pub fn remove(&mut self, pos: ChunkPos) -> Option<BlockGrid> {
        self.chunks.remove(&pos)
    }

    pub fn positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.chunks.keys().copied()
    }

    /// Block at a world position, or None when the position falls outside the
    /// vertical range or inside an ungenerated chunk. The mesher treats None
    /// as "no neighbor" and draws the boundary face.
    pub fn block_at(&self, world_pos: IVec3) -> Option<BlockId> {
        if !(0..WORLD_HEIGHT as i32).contains(&world_pos.y) {
            return None;
        }
        let (chunk_pos, local) = world_to_chunk(world_pos, self.chunk_size);
        self.chunks.get(&chunk_pos).map(|grid| grid.get(local))
    }

    /// Narrow read-only capability handed to the mesher for cross-chunk
    /// face checks.
    pub fn neighbor_lookup(&self) -> impl Fn(IVec3) -> Option<BlockId> + '_ {
        move |world_pos| self.block_at(world_pos)
    }

    /// Mutates one block in an already-generated chunk and returns every
    /// chunk whose mesh the edit invalidates: the owner, plus any loaded
    /// neighbor sharing the edited boundary face.
    pub fn set_block(
        &mut self,
        world_pos: IVec3,
        block: BlockId,
        detail: Option<BlockDetail>,
    ) -> Result<Vec<ChunkPos>, StoreError> {
        if !(0..WORLD_HEIGHT as i32).contains(&world_pos.y) {
            return Err(StoreError::OutOfWorld(world_pos.y));
        }

        let (chunk_pos, local) = world_to_chunk(world_pos, self.chunk_size);
        let grid = self
            .chunks
            .get_mut(&chunk_pos)
            .ok_or(StoreError::Ungenerated(chunk_pos))?;

        grid.set(local, block);
        match detail {
            Some(detail) if block != BlockId::AIR => grid.set_detail(local, detail),
            _ => grid.clear_detail(local),
        }

        let mut remesh = vec![chunk_pos];
        let edge = (self.chunk_size - 1) as u8;
        let mut push_if_loaded = |offset: ChunkPos| {
            let neighbor = chunk_pos + offset;
            if self.chunks.contains_key(&neighbor) {
                remesh.push(neighbor);
            }
        };
        if local.x == 0 {
            push_if_loaded(ChunkPos { x: -1, z: 0 });
        }
        if local.x == edge {
            push_if_loaded(ChunkPos { x: 1, z: 0 });
        }
        if local.z == 0 {
            push_if_loaded(ChunkPos { x: 0, z: -1 });
        }
        if local.z == edge {
            push_if_loaded(ChunkPos { x: 0, z: 1 });
        }

        Ok(remesh)
    }
}
