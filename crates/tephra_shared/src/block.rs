use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: Self = Self(0);
    pub const STONE: Self = Self(1);
    pub const DIRT: Self = Self(2);
    pub const GRASS: Self = Self(3);
    pub const SAND: Self = Self(4);
    pub const WATER: Self = Self(5);
    pub const GRAVEL: Self = Self(6);
    pub const CLAY: Self = Self(7);
    pub const SNOWCAP: Self = Self(8);
    pub const TIMBER_LOG: Self = Self(9);
    pub const CANOPY_LEAVES: Self = Self(10);
    pub const TALL_GRASS: Self = Self(11);
    pub const WILDFLOWER: Self = Self(12);
    pub const FERN: Self = Self(13);
}

pub fn is_liquid_block(block: BlockId) -> bool {
    block == BlockId::WATER
}

/// Cross-shaped foliage: rendered as two intersecting vertical quads
/// instead of cube faces.
pub fn is_cross_block(block: BlockId) -> bool {
    matches!(
        block,
        BlockId::TALL_GRASS | BlockId::WILDFLOWER | BlockId::FERN
    )
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProperties {
    pub name: String,
    pub solid: bool,
    pub transparent: bool,
}

#[derive(Default, Debug, Clone)]
pub struct BlockRegistry {
    properties: Vec<BlockProperties>,
    by_name: HashMap<String, BlockId>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register(&mut self, props: BlockProperties) -> BlockId {
        if let Some(existing) = self.by_name.get(props.name.as_str()) {
            return *existing;
        }

        let next_index = self.properties.len();
        let id = BlockId(
            u16::try_from(next_index).expect("block registry exceeded BlockId capacity (u16::MAX)"),
        );

        self.by_name.insert(props.name.clone(), id);
        self.properties.push(props);
        id
    }

    pub fn get_properties(&self, id: BlockId) -> &BlockProperties {
        self.properties
            .get(id.0 as usize)
            .or_else(|| self.properties.get(BlockId::AIR.0 as usize))
            .expect("block registry is empty; call register_default_blocks() first")
    }

    pub fn name_of(&self, id: BlockId) -> &str {
        &self.get_properties(id).name
    }

    pub fn get_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

pub fn register_default_blocks() -> BlockRegistry {
    fn block(name: &str, solid: bool, transparent: bool) -> BlockProperties {
        BlockProperties {
            name: name.to_string(),
            solid,
            transparent,
        }
    }

    let mut registry = BlockRegistry::new();

    let defaults = [
        block("air", false, true),
        block("stone", true, false),
        block("dirt", true, false),
        block("grass_block", true, false),
        block("sand", true, false),
        block("water", false, true),
        block("gravel", true, false),
        block("clay", true, false),
        block("snowcap", true, false),
        block("timber_log", true, false),
        block("canopy_leaves", true, true),
        block("tall_grass", false, true),
        block("wildflower", false, true),
        block("fern", false, true),
    ];

    for (idx, props) in defaults.into_iter().enumerate() {
        let id = registry.register(props);
        debug_assert_eq!(id.0 as usize, idx, "default block IDs must be stable");
    }

    registry
}
