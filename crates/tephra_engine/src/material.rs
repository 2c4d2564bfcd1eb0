use rustc_hash::{FxHashMap, FxHashSet};

use tephra_shared::block::{is_cross_block, is_liquid_block, BlockId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaceGroup {
    Top,
    Bottom,
    Sides,
}

/// Per-face-group texture names for a multi-sided block. Unset entries fall
/// back to `sides`, then to the block's own name.
#[derive(Clone, Debug, Default)]
pub struct FaceTextures {
    pub top: Option<String>,
    pub bottom: Option<String>,
    pub sides: Option<String>,
}

impl FaceTextures {
    pub fn new(top: &str, bottom: &str, sides: &str) -> Self {
        Self {
            top: Some(top.to_string()),
            bottom: Some(bottom.to_string()),
            sides: Some(sides.to_string()),
        }
    }
}

/// Immutable-after-load material policy consumed by the mesher: which blocks
/// are special (liquid / cross / multi-sided), which texture belongs to which
/// face group, and which textures are tinted. Constructed explicitly and
/// passed in, never a process-wide singleton, so tests can supply fixtures.
#[derive(Clone, Debug, Default)]
pub struct MaterialCatalog {
    liquid: FxHashSet<BlockId>,
    cross: FxHashSet<BlockId>,
    multi_sided: FxHashMap<String, FaceTextures>,
    tints: FxHashMap<String, [u8; 3]>,
}

impl MaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_liquid(&mut self, block: BlockId) {
        self.liquid.insert(block);
    }

    pub fn register_cross(&mut self, block: BlockId) {
        self.cross.insert(block);
    }

    pub fn register_multi_sided(&mut self, name: &str, faces: FaceTextures) {
        self.multi_sided.insert(name.to_string(), faces);
    }

    pub fn register_tint(&mut self, texture: &str, rgb: [u8; 3]) {
        self.tints.insert(texture.to_string(), rgb);
    }

    pub fn is_liquid(&self, block: BlockId) -> bool {
        self.liquid.contains(&block)
    }

    pub fn is_cross(&self, block: BlockId) -> bool {
        self.cross.contains(&block)
    }

    pub fn is_multi_sided(&self, name: &str) -> bool {
        self.multi_sided.contains_key(name)
    }

    /// Liquid, cross and multi-sided blocks all get special face treatment:
    /// they never cull their neighbors' faces and are never culled themselves.
    pub fn is_special(&self, block: BlockId, name: &str) -> bool {
        self.is_liquid(block) || self.is_cross(block) || self.is_multi_sided(name)
    }

    pub fn is_tinted(&self, texture: &str) -> bool {
        self.tints.contains_key(texture)
    }

    pub fn tint_color_of(&self, texture: &str) -> Option<[u8; 3]> {
        self.tints.get(texture).copied()
    }

    /// Resolves the texture for one face of a named block. Fallback chain:
    /// requested face group entry, then the sides entry, then the block name.
    pub fn face_texture<'a>(&'a self, block_name: &'a str, group: FaceGroup) -> &'a str {
        let Some(faces) = self.multi_sided.get(block_name) else {
            return block_name;
        };
        let requested = match group {
            FaceGroup::Top => faces.top.as_deref(),
            FaceGroup::Bottom => faces.bottom.as_deref(),
            FaceGroup::Sides => faces.sides.as_deref(),
        };
        requested
            .or(faces.sides.as_deref())
            .unwrap_or(block_name)
    }
}

/// The fixed default table for the standard block palette.
pub fn default_catalog() -> MaterialCatalog {
    let mut catalog = MaterialCatalog::new();

    for id in 0..=BlockId::FERN.0 {
        let block = BlockId(id);
        if is_liquid_block(block) {
            catalog.register_liquid(block);
        }
        if is_cross_block(block) {
            catalog.register_cross(block);
        }
    }

    catalog.register_multi_sided(
        "grass_block",
        FaceTextures::new("grass_top", "dirt", "grass_side"),
    );
    catalog.register_multi_sided(
        "timber_log",
        FaceTextures::new("log_top", "log_top", "log_side"),
    );
    catalog.register_multi_sided(
        "snowcap",
        FaceTextures::new("snow_top", "dirt", "snow_side"),
    );

    catalog.register_tint("grass_top", [95, 159, 53]);
    catalog.register_tint("canopy_leaves", [58, 121, 40]);
    catalog.register_tint("tall_grass", [95, 159, 53]);
    catalog.register_tint("fern", [73, 136, 50]);

    catalog
}
