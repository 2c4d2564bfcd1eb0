use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::coords::{LocalPos, WORLD_HEIGHT};

/// Extra identity for blocks that need more than a bare type code: a named
/// multi-sided identity and/or a custom texture override. Cells without an
/// entry are plain blocks using their registry-default texture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDetail {
    pub name: String,
    pub texture: Option<String>,
}

impl BlockDetail {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            texture: None,
        }
    }

    pub fn textured(name: impl Into<String>, texture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            texture: Some(texture.into()),
        }
    }
}

/// Dense block storage for one chunk column: `size × size` footprint over the
/// full `WORLD_HEIGHT`, plus a sparse per-cell detail map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockGrid {
    size: usize,
    blocks: Vec<BlockId>,
    details: FxHashMap<LocalPos, BlockDetail>,
}

impl BlockGrid {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            blocks: vec![BlockId::AIR; size * size * WORLD_HEIGHT],
            details: FxHashMap::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn height(&self) -> usize {
        WORLD_HEIGHT
    }

    fn index(&self, local: LocalPos) -> usize {
        debug_assert!(usize::from(local.x) < self.size);
        debug_assert!(usize::from(local.z) < self.size);
        usize::from(local.x)
            + usize::from(local.z) * self.size
            + usize::from(local.y) * self.size * self.size
    }

    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        let size = self.size as i32;
        (0..size).contains(&x) && (0..WORLD_HEIGHT as i32).contains(&y) && (0..size).contains(&z)
    }

    pub fn get(&self, local: LocalPos) -> BlockId {
        self.blocks[self.index(local)]
    }

    pub fn set(&mut self, local: LocalPos, block: BlockId) {
        let index = self.index(local);
        self.blocks[index] = block;
        if block == BlockId::AIR {
            self.details.remove(&local);
        }
    }

    pub fn detail(&self, local: LocalPos) -> Option<&BlockDetail> {
        self.details.get(&local)
    }

    pub fn set_detail(&mut self, local: LocalPos, detail: BlockDetail) {
        self.details.insert(local, detail);
    }

    pub fn clear_detail(&mut self, local: LocalPos) {
        self.details.remove(&local);
    }

    pub fn detail_count(&self) -> usize {
        self.details.len()
    }

    /// Iterates every cell as (local, block), skipping nothing.
    pub fn iter(&self) -> impl Iterator<Item = (LocalPos, BlockId)> + '_ {
        let size = self.size;
        self.blocks.iter().enumerate().map(move |(index, &block)| {
            let y = index / (size * size);
            let rem = index % (size * size);
            let z = rem / size;
            let x = rem % size;
            (
                LocalPos {
                    x: x as u8,
                    y: y as u8,
                    z: z as u8,
                },
                block,
            )
        })
    }
}
